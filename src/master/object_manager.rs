//! The object manager: authoritative key → log-reference state.
//!
//! Owns the mapping from keys to the most recent object (or recovery
//! tombstone) for every tablet this master serves, and coordinates three
//! workloads against it:
//!
//! - client writes, reads, and removes;
//! - recovery replay of segments received from failed peers, which
//!   reconciles out-of-order entries into a side log;
//! - background cleaning, which relocates live entries while reclaiming
//!   segment space.
//!
//! Every operation takes exactly one stripe lock (for the operated key,
//! or for the swept bucket), consults the hash index, and reads or
//! appends entry bytes in the log. Operations on the same key linearize
//! at the point the stripe lock is released after the index mutation.
//!
//! # Locking
//!
//! Stripe locks order above the log's internal locks and are never
//! acquired by the log. The write path holds its stripe lock across the
//! append so the index update and the free of the replaced reference
//! cannot interleave with another writer of the same key.

use crate::core::config::{ChecksumPolicy, MasterConfig};
use crate::core::error::{StrataError, StrataResult};
use crate::core::time::seconds_timestamp;
use crate::master::bucket_locks::{BucketGuard, BucketLockTable};
use crate::master::reject::RejectRules;
use crate::master::tablet::{TabletRegistry, TabletState};
use crate::master::version::VersionAllocator;
use crate::ops::metrics::MasterMetrics;
use crate::storage::entry::{
    encode_object, encode_tombstone, Key, LogEntryType, ObjectView, SafeVersionView,
    TombstoneView, VERSION_NONEXISTENT,
};
use crate::storage::hash_index::HashIndex;
use crate::storage::log::{
    Log, LogEntryHandler, LogEntryRelocator, Reference, SegmentIterator, SideLog,
};
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

/// Hook the replay loop yields to so replication I/O makes progress
/// while a large recovery segment is iterated.
pub trait ReplicationDriver: Send + Sync {
    fn proceed(&self);
}

/// The entry a key currently maps to.
struct CurrentEntry {
    entry_type: LogEntryType,
    bytes: Bytes,
    reference: Reference,
}

/// Bumps the replay return counter on scope exit, covering early
/// returns and the abort path alike.
struct ReturnCountGuard<'a> {
    counter: &'a AtomicU64,
}

impl Drop for ReturnCountGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_add(1, Ordering::AcqRel);
    }
}

/// Locally-aggregated replay counts, flushed into the metrics sink once
/// per segment on scope exit. Keeps atomic traffic off the replay loop.
struct ReplayCounters {
    metrics: Arc<MasterMetrics>,
    entries: u64,
    bytes: u64,
    objects_appended: u64,
    objects_discarded: u64,
    tombstones_appended: u64,
    tombstones_discarded: u64,
    safe_version_recovered: u64,
    safe_version_discarded: u64,
    checksum_failures: u64,
}

impl ReplayCounters {
    fn new(metrics: Arc<MasterMetrics>) -> Self {
        Self {
            metrics,
            entries: 0,
            bytes: 0,
            objects_appended: 0,
            objects_discarded: 0,
            tombstones_appended: 0,
            tombstones_discarded: 0,
            safe_version_recovered: 0,
            safe_version_discarded: 0,
            checksum_failures: 0,
        }
    }
}

impl Drop for ReplayCounters {
    fn drop(&mut self) {
        MasterMetrics::add(&self.metrics.replay_entries, self.entries);
        MasterMetrics::add(&self.metrics.replay_bytes, self.bytes);
        MasterMetrics::add(&self.metrics.objects_appended, self.objects_appended);
        MasterMetrics::add(&self.metrics.objects_discarded, self.objects_discarded);
        MasterMetrics::add(&self.metrics.tombstones_appended, self.tombstones_appended);
        MasterMetrics::add(&self.metrics.tombstones_discarded, self.tombstones_discarded);
        MasterMetrics::add(
            &self.metrics.safe_version_recovered,
            self.safe_version_recovered,
        );
        MasterMetrics::add(
            &self.metrics.safe_version_discarded,
            self.safe_version_discarded,
        );
        MasterMetrics::add(&self.metrics.checksum_failures, self.checksum_failures);
    }
}

/// Object manager for one master.
pub struct ObjectManager {
    log: Arc<Log>,
    index: HashIndex,
    bucket_locks: BucketLockTable,
    versions: VersionAllocator,
    tablets: Arc<TabletRegistry>,
    metrics: Arc<MasterMetrics>,
    replay_yield_bytes: u64,
    replay_checksum_policy: ChecksumPolicy,
    any_writes: AtomicBool,
    warmup: OnceLock<Box<dyn Fn() + Send + Sync>>,
    replication: OnceLock<Arc<dyn ReplicationDriver>>,
    replay_segment_return_count: AtomicU64,
}

impl ObjectManager {
    /// Construct a manager and register it as the log's relocation
    /// target. The cleaner is enabled per configuration.
    pub fn new(
        config: &MasterConfig,
        tablets: Arc<TabletRegistry>,
        metrics: Arc<MasterMetrics>,
    ) -> Arc<Self> {
        let log = Arc::new(Log::new(config.log_byte_budget, config.segment_size_bytes));
        let manager = Arc::new(Self {
            log,
            index: HashIndex::new(config.hash_index_buckets),
            bucket_locks: BucketLockTable::new(config.bucket_lock_stripes),
            versions: VersionAllocator::new(),
            tablets,
            metrics,
            replay_yield_bytes: config.replay_yield_bytes,
            replay_checksum_policy: config.replay_checksum_policy,
            any_writes: AtomicBool::new(false),
            warmup: OnceLock::new(),
            replication: OnceLock::new(),
            replay_segment_return_count: AtomicU64::new(0),
        });

        let handler_arc: Arc<dyn LogEntryHandler> = manager.clone();
        let handler: Weak<dyn LogEntryHandler> = Arc::downgrade(&handler_arc);
        manager.log.set_entry_handler(handler);
        if config.cleaner_enabled {
            manager.log.enable_cleaner();
        }
        manager
    }

    /// The log substrate this manager appends to.
    pub fn log(&self) -> &Arc<Log> {
        &self.log
    }

    /// The tablet registry consulted for ownership.
    pub fn tablets(&self) -> &Arc<TabletRegistry> {
        &self.tablets
    }

    /// Current safe-version floor.
    pub fn safe_version(&self) -> u64 {
        self.versions.safe_version()
    }

    /// Number of hash index buckets, for sweepers.
    pub fn index_bucket_count(&self) -> usize {
        self.index.bucket_count()
    }

    /// Number of references currently indexed.
    pub fn index_entry_count(&self) -> usize {
        self.index.len()
    }

    /// Monotonic count of `replay_segment` entries and exits; the
    /// tombstone reaper uses it to detect replay quiescence.
    pub fn replay_segment_return_count(&self) -> u64 {
        self.replay_segment_return_count.load(Ordering::Acquire)
    }

    /// Install the hook run once at the first write, used by the server
    /// to warm backup sessions lazily.
    pub fn set_warmup_hook(&self, hook: Box<dyn Fn() + Send + Sync>) {
        let _ = self.warmup.set(hook);
    }

    /// Install the replication driver the replay loop yields to.
    pub fn set_replication_driver(&self, driver: Arc<dyn ReplicationDriver>) {
        let _ = self.replication.set(driver);
    }

    // ------------------------------------------------------------------
    // Client operations
    // ------------------------------------------------------------------

    /// Write an object, replacing any previous version of the key.
    ///
    /// Mints the next version, appends the object (atomically paired
    /// with a tombstone for a replaced object), and repoints the index.
    /// Durability on backups is deferred until [`Self::sync_writes`];
    /// until then the master and backup views may diverge.
    ///
    /// Returns the new version on success. The version embedded in a
    /// rejection is the current version the rules were evaluated
    /// against.
    pub fn write(
        &self,
        key: &Key,
        value: &[u8],
        reject_rules: Option<&RejectRules>,
    ) -> StrataResult<u64> {
        self.note_first_write();

        let guard = self.lock_key(key);

        let tablet = self
            .tablets
            .get_tablet(key)
            .ok_or(StrataError::UnknownTablet)?;
        if tablet.state != TabletState::Normal {
            return Err(StrataError::UnknownTablet);
        }

        let mut current_version = VERSION_NONEXISTENT;
        let mut current_object: Option<(ObjectView, Reference)> = None;
        if let Some(current) = self.lookup(&guard, key) {
            match current.entry_type {
                LogEntryType::Tombstone => {
                    // Replay residue; its tablet is NORMAL, so nothing can
                    // replay an older object for this key anymore. Drop it
                    // from the index (the cleaner reclaims the log entry).
                    self.remove_key(&guard, key);
                }
                LogEntryType::Object => {
                    let view = ObjectView::parse(current.bytes.clone())?;
                    current_version = view.version();
                    current_object = Some((view, current.reference));
                }
                LogEntryType::SafeVersion => {}
            }
        }

        if let Some(rules) = reject_rules {
            rules.evaluate(current_version)?;
        }

        let new_version = if current_version == VERSION_NONEXISTENT {
            self.versions.allocate()
        } else {
            current_version + 1
        };
        assert!(
            new_version > current_version,
            "minted version must exceed the replaced version"
        );

        let timestamp = seconds_timestamp();
        let object_bytes = encode_object(key, value, new_version, timestamp);
        let object_len = object_bytes.len();

        // A replaced object needs its tombstone appended atomically with
        // the new object: a replica must never see one without the other.
        let appended = match &current_object {
            Some((view, reference)) => {
                let tombstone = encode_tombstone(view, reference.segment_id(), timestamp);
                self.log
                    .append_pair(
                        (LogEntryType::Object, timestamp, object_bytes),
                        (LogEntryType::Tombstone, timestamp, tombstone),
                    )
                    .map(|(object_ref, _)| object_ref)
            }
            None => self.log.append(LogEntryType::Object, timestamp, object_bytes),
        };
        let new_reference = appended.ok_or(StrataError::Retry)?;

        self.replace_reference(&guard, key, new_reference);
        if let Some((_, old_reference)) = current_object {
            self.log.free(old_reference);
        }

        self.tablets.increment_write_count(key);
        tracing::debug!(%key, version = new_version, bytes = object_len, "object written");
        Ok(new_version)
    }

    /// Read an object's value and version.
    ///
    /// The version is evaluated against the reject rules after lookup,
    /// so a rejected read still reports the current version.
    pub fn read(
        &self,
        key: &Key,
        reject_rules: Option<&RejectRules>,
    ) -> StrataResult<(Bytes, u64)> {
        let guard = self.lock_key(key);

        let tablet = self
            .tablets
            .get_tablet(key)
            .ok_or(StrataError::UnknownTablet)?;
        if tablet.state != TabletState::Normal {
            return Err(StrataError::UnknownTablet);
        }

        let current = self
            .lookup(&guard, key)
            .ok_or(StrataError::ObjectDoesntExist)?;
        if current.entry_type != LogEntryType::Object {
            return Err(StrataError::ObjectDoesntExist);
        }

        let view = ObjectView::parse(current.bytes)?;
        let version = view.version();
        if let Some(rules) = reject_rules {
            rules.evaluate(version)?;
        }

        self.tablets.increment_read_count(key);
        Ok((view.value(), version))
    }

    /// Remove an object: append its tombstone, sync, raise the version
    /// floor past the removed version, and drop the key from the index.
    ///
    /// Removing an absent key evaluates the rules (default all-false)
    /// against `VERSION_NONEXISTENT` and is otherwise a no-op.
    pub fn remove(&self, key: &Key, reject_rules: Option<&RejectRules>) -> StrataResult<u64> {
        let guard = self.lock_key(key);

        let tablet = self
            .tablets
            .get_tablet(key)
            .ok_or(StrataError::UnknownTablet)?;
        if tablet.state != TabletState::Normal {
            return Err(StrataError::UnknownTablet);
        }

        let (view, reference) = match self.lookup(&guard, key) {
            Some(current) if current.entry_type == LogEntryType::Object => {
                (ObjectView::parse(current.bytes)?, current.reference)
            }
            _ => {
                let rules = reject_rules.copied().unwrap_or_default();
                rules.evaluate(VERSION_NONEXISTENT)?;
                return Ok(VERSION_NONEXISTENT);
            }
        };

        let version = view.version();
        if let Some(rules) = reject_rules {
            rules.evaluate(version)?;
        }

        let timestamp = seconds_timestamp();
        let tombstone = encode_tombstone(&view, reference.segment_id(), timestamp);
        self.log
            .append(LogEntryType::Tombstone, timestamp, tombstone)
            .ok_or(StrataError::Retry)?;
        self.log.sync();

        self.versions.raise(version + 1);
        self.log.free(reference);
        self.remove_key(&guard, key);
        Ok(version)
    }

    /// Block until everything appended so far is durable on the
    /// required replicas. Callers batch several writes per sync.
    pub fn sync_writes(&self) {
        self.log.sync();
    }

    // ------------------------------------------------------------------
    // Recovery replay
    // ------------------------------------------------------------------

    /// Replay one recovery segment into a side log.
    ///
    /// Entries arrive in no particular version order, within or across
    /// segments; each is reconciled against the live index under its
    /// stripe lock and discarded when something at least as new is
    /// already indexed. Tombstones encountered here enter the index and
    /// stay until the reaper evicts them after their tablet leaves
    /// RECOVERING.
    ///
    /// Fails only when the side log cannot accept an append (or, under
    /// the abort checksum policy, when an entry is corrupt); the
    /// orchestrator then aborts the side log and re-drives recovery.
    pub fn replay_segment(
        &self,
        side_log: &SideLog<'_>,
        mut it: SegmentIterator,
    ) -> StrataResult<()> {
        self.replay_segment_return_count.fetch_add(1, Ordering::AcqRel);
        let _return_count = ReturnCountGuard {
            counter: &self.replay_segment_return_count,
        };
        let mut counters = ReplayCounters::new(Arc::clone(&self.metrics));
        let mut bytes_since_yield = 0u64;

        while let Some((entry_type, payload)) = it.current().cloned() {
            self.prefetch_next_bucket(&it);

            bytes_since_yield += payload.len() as u64;
            if bytes_since_yield > self.replay_yield_bytes {
                bytes_since_yield = 0;
                if let Some(driver) = self.replication.get() {
                    driver.proceed();
                }
            }

            counters.entries += 1;
            counters.bytes += payload.len() as u64;

            match entry_type {
                LogEntryType::Object => self.replay_object(side_log, payload, &mut counters)?,
                LogEntryType::Tombstone => {
                    self.replay_tombstone(side_log, payload, &mut counters)?
                }
                LogEntryType::SafeVersion => {
                    self.replay_safe_version(side_log, payload, &mut counters)?
                }
            }

            it.advance();
        }
        Ok(())
    }

    fn replay_object(
        &self,
        side_log: &SideLog<'_>,
        payload: Bytes,
        counters: &mut ReplayCounters,
    ) -> StrataResult<()> {
        let view = match ObjectView::parse(payload.clone()) {
            Ok(view) => view,
            Err(error) => return self.note_undecodable(counters, error),
        };
        if !view.verify_checksum() {
            self.note_checksum_failure(counters, "object", view.version())?;
        }
        let key = view.to_key();

        let guard = self.lock_key(&key);

        let mut min_successor = 0;
        let mut free_old: Option<Reference> = None;
        if let Some(current) = self.lookup(&guard, &key) {
            match current.entry_type {
                LogEntryType::Tombstone => {
                    min_successor = TombstoneView::parse(current.bytes)?.object_version() + 1;
                }
                LogEntryType::Object => {
                    min_successor = ObjectView::parse(current.bytes)?.version() + 1;
                    free_old = Some(current.reference);
                }
                LogEntryType::SafeVersion => {}
            }
        }

        if view.version() >= min_successor {
            let reference = side_log
                .append(LogEntryType::Object, view.timestamp(), payload)
                .ok_or(StrataError::ReplayAborted {
                    entries_applied: counters.entries,
                })?;
            counters.objects_appended += 1;
            self.replace_reference(&guard, &key, reference);
            if let Some(old) = free_old {
                side_log.free(old);
            }
        } else {
            counters.objects_discarded += 1;
        }
        Ok(())
    }

    fn replay_tombstone(
        &self,
        side_log: &SideLog<'_>,
        payload: Bytes,
        counters: &mut ReplayCounters,
    ) -> StrataResult<()> {
        let view = match TombstoneView::parse(payload.clone()) {
            Ok(view) => view,
            Err(error) => return self.note_undecodable(counters, error),
        };
        if !view.verify_checksum() {
            self.note_checksum_failure(counters, "tombstone", view.object_version())?;
        }
        let key = view.to_key();

        let guard = self.lock_key(&key);

        let mut min_successor = 0;
        let mut free_old: Option<Reference> = None;
        if let Some(current) = self.lookup(&guard, &key) {
            match current.entry_type {
                LogEntryType::Tombstone => {
                    min_successor = TombstoneView::parse(current.bytes)?.object_version() + 1;
                }
                LogEntryType::Object => {
                    // A tombstone may supersede the equal-versioned object
                    // it deletes, so the bound is the object's version
                    // itself, not its successor.
                    min_successor = ObjectView::parse(current.bytes)?.version();
                    free_old = Some(current.reference);
                }
                LogEntryType::SafeVersion => {}
            }
        }

        if view.object_version() >= min_successor {
            let reference = side_log
                .append(LogEntryType::Tombstone, view.timestamp(), payload)
                .ok_or(StrataError::ReplayAborted {
                    entries_applied: counters.entries,
                })?;
            counters.tombstones_appended += 1;
            self.replace_reference(&guard, &key, reference);
            // Only a replaced object is freed; a replaced tombstone is
            // left for the cleaner.
            if let Some(old) = free_old {
                side_log.free(old);
            }
        } else {
            counters.tombstones_discarded += 1;
        }
        Ok(())
    }

    fn replay_safe_version(
        &self,
        side_log: &SideLog<'_>,
        payload: Bytes,
        counters: &mut ReplayCounters,
    ) -> StrataResult<()> {
        let view = match SafeVersionView::parse(payload.clone()) {
            Ok(view) => view,
            Err(error) => return self.note_undecodable(counters, error),
        };
        if !view.verify_checksum() {
            self.note_checksum_failure(counters, "safe version", view.safe_version())?;
        }

        // Re-staged so a sibling master replaying the same recovery after
        // a crash still observes the floor.
        side_log
            .append(LogEntryType::SafeVersion, 0, payload)
            .ok_or(StrataError::ReplayAborted {
                entries_applied: counters.entries,
            })?;

        if self.versions.raise(view.safe_version()) {
            counters.safe_version_recovered += 1;
            tracing::debug!(safe_version = view.safe_version(), "version floor recovered");
        } else {
            counters.safe_version_discarded += 1;
            tracing::debug!(safe_version = view.safe_version(), "version floor marker discarded");
        }
        Ok(())
    }

    /// An entry that cannot be decoded at all is dropped under the warn
    /// policy and fails the replay under the abort policy.
    fn note_undecodable(
        &self,
        counters: &mut ReplayCounters,
        error: StrataError,
    ) -> StrataResult<()> {
        counters.checksum_failures += 1;
        match self.replay_checksum_policy {
            ChecksumPolicy::Warn => {
                tracing::warn!(%error, "undecodable entry in recovery segment, dropped");
                Ok(())
            }
            ChecksumPolicy::Abort => Err(error),
        }
    }

    /// A decodable entry with a bad checksum is still processed under
    /// the warn policy; the orchestrator may re-replay from another
    /// replica later.
    fn note_checksum_failure(
        &self,
        counters: &mut ReplayCounters,
        kind: &'static str,
        version: u64,
    ) -> StrataResult<()> {
        counters.checksum_failures += 1;
        match self.replay_checksum_policy {
            ChecksumPolicy::Warn => {
                tracing::warn!(kind, version, "bad checksum in recovery segment");
                Ok(())
            }
            ChecksumPolicy::Abort => Err(StrataError::CorruptEntry {
                reason: "checksum mismatch in recovery segment",
            }),
        }
    }

    /// Prefetch the hash bucket of the next entry to be replayed, hiding
    /// the bucket cache miss behind the current entry's work.
    fn prefetch_next_bucket(&self, it: &SegmentIterator) {
        let Some((entry_type, payload)) = it.peek_next() else {
            return;
        };
        let key = match entry_type {
            LogEntryType::Object => ObjectView::parse(payload.clone()).ok().map(|v| v.to_key()),
            LogEntryType::Tombstone => {
                TombstoneView::parse(payload.clone()).ok().map(|v| v.to_key())
            }
            LogEntryType::SafeVersion => None,
        };
        if let Some(key) = key {
            self.index.prefetch_bucket(key.key_hash());
        }
    }

    // ------------------------------------------------------------------
    // Sweeps
    // ------------------------------------------------------------------

    /// Remove every indexed object whose tablet is no longer owned, and
    /// free it in the log. Repairs state after an aborted recovery.
    pub fn remove_orphaned_objects(&self) {
        for bucket in 0..self.index.bucket_count() {
            let _guard = self.bucket_locks.lock_bucket(bucket);
            for raw in self.index.references_in_bucket(bucket) {
                let reference = Reference::from_u64(raw);
                match self.log.get_entry(reference) {
                    Some((LogEntryType::Object, bytes)) => {
                        let Ok(view) = ObjectView::parse(bytes) else {
                            continue;
                        };
                        let key = view.to_key();
                        if self.tablets.get_tablet(&key).is_none() {
                            self.index.remove_in_bucket(bucket, raw);
                            self.log.free(reference);
                            MasterMetrics::inc(&self.metrics.orphaned_objects_removed);
                            tracing::debug!(%key, "orphaned object removed");
                        }
                    }
                    Some(_) => {}
                    None => {
                        // Reference into an aborted side log; the entry is
                        // gone, drop the index slot.
                        self.index.remove_in_bucket(bucket, raw);
                    }
                }
            }
        }
    }

    /// Sweep one bucket, evicting recovery tombstones whose tablet is
    /// not owned or no longer RECOVERING. Returns the number evicted.
    /// The tombstone log entries are left for the cleaner.
    pub(crate) fn reap_bucket(&self, bucket: usize) -> u64 {
        let _guard = self.bucket_locks.lock_bucket(bucket);
        let mut discarded = 0;
        for raw in self.index.references_in_bucket(bucket) {
            let reference = Reference::from_u64(raw);
            let Some((entry_type, bytes)) = self.log.get_entry(reference) else {
                self.index.remove_in_bucket(bucket, raw);
                continue;
            };
            if entry_type != LogEntryType::Tombstone {
                continue;
            }
            let Ok(view) = TombstoneView::parse(bytes) else {
                continue;
            };
            let key = view.to_key();
            let keep = matches!(
                self.tablets.get_tablet(&key),
                Some(tablet) if tablet.state == TabletState::Recovering
            );
            if !keep {
                self.index.remove_in_bucket(bucket, raw);
                discarded += 1;
            }
        }
        if discarded > 0 {
            MasterMetrics::add(&self.metrics.tombstones_reaped, discarded);
        }
        discarded
    }

    /// Synchronously evict every eligible recovery tombstone, equivalent
    /// to one full reaper pass.
    pub fn remove_tombstones(&self) {
        for bucket in 0..self.index.bucket_count() {
            self.reap_bucket(bucket);
        }
    }

    // ------------------------------------------------------------------
    // Index helpers (all require the caller's stripe guard)
    // ------------------------------------------------------------------

    fn lock_key(&self, key: &Key) -> BucketGuard<'_> {
        self.bucket_locks
            .lock_bucket(self.index.bucket_of(key.key_hash()))
    }

    /// Resolve the key's current index entry, if any. Candidates whose
    /// decoded key differs (bucket collisions) or whose reference no
    /// longer resolves are skipped.
    fn lookup(&self, _guard: &BucketGuard<'_>, key: &Key) -> Option<CurrentEntry> {
        for raw in self.index.candidates(key.key_hash()) {
            let reference = Reference::from_u64(raw);
            let Some((entry_type, bytes)) = self.log.get_entry(reference) else {
                continue;
            };
            if Self::entry_matches_key(entry_type, &bytes, key) {
                return Some(CurrentEntry {
                    entry_type,
                    bytes,
                    reference,
                });
            }
        }
        None
    }

    fn entry_matches_key(entry_type: LogEntryType, bytes: &Bytes, key: &Key) -> bool {
        match entry_type {
            LogEntryType::Object => ObjectView::parse(bytes.clone())
                .map(|v| v.table_id() == key.table_id() && v.key_bytes() == key.key_bytes())
                .unwrap_or(false),
            LogEntryType::Tombstone => TombstoneView::parse(bytes.clone())
                .map(|v| v.table_id() == key.table_id() && v.key_bytes() == key.key_bytes())
                .unwrap_or(false),
            LogEntryType::SafeVersion => false,
        }
    }

    /// Point the key at `new_reference`, replacing its existing index
    /// entry if one matches. Returns true on replace, false on insert.
    fn replace_reference(
        &self,
        _guard: &BucketGuard<'_>,
        key: &Key,
        new_reference: Reference,
    ) -> bool {
        for raw in self.index.candidates(key.key_hash()) {
            let reference = Reference::from_u64(raw);
            let Some((entry_type, bytes)) = self.log.get_entry(reference) else {
                continue;
            };
            if Self::entry_matches_key(entry_type, &bytes, key) {
                self.index.swap(key.key_hash(), raw, new_reference.to_u64());
                return true;
            }
        }
        self.index.insert(key.key_hash(), new_reference.to_u64());
        false
    }

    /// Drop the key's index entry. Returns whether one was found.
    fn remove_key(&self, _guard: &BucketGuard<'_>, key: &Key) -> bool {
        for raw in self.index.candidates(key.key_hash()) {
            let reference = Reference::from_u64(raw);
            let Some((entry_type, bytes)) = self.log.get_entry(reference) else {
                continue;
            };
            if Self::entry_matches_key(entry_type, &bytes, key) {
                return self.index.remove_reference(key.key_hash(), raw);
            }
        }
        false
    }

    fn note_first_write(&self) {
        if !self.any_writes.swap(true, Ordering::AcqRel) {
            if let Some(hook) = self.warmup.get() {
                hook();
            }
            tracing::debug!("first write observed, backup sessions warming");
        }
    }

    // ------------------------------------------------------------------
    // Cleaner callbacks
    // ------------------------------------------------------------------

    fn relocate_object(&self, old: &Bytes, relocator: &mut LogEntryRelocator<'_>) {
        let Ok(view) = ObjectView::parse(old.clone()) else {
            return;
        };
        let key = view.to_key();

        let guard = self.lock_key(&key);

        if self.tablets.get_tablet(&key).is_none() {
            // The tablet left this master; drop the index entry instead
            // of relocating.
            self.remove_key(&guard, &key);
            return;
        }

        if let Some(current) = self.lookup(&guard, &key) {
            // Live iff the index still points at these exact bytes; a
            // differing address means this copy is stale.
            let live = current.entry_type == LogEntryType::Object
                && current.bytes.as_ptr() == old.as_ptr();
            if live {
                if !relocator.append(LogEntryType::Object, old, view.timestamp()) {
                    // Out of cleaner memory; the cleaner retries with more.
                    return;
                }
                if let Some(new_reference) = relocator.new_reference() {
                    self.replace_reference(&guard, &key, new_reference);
                }
            }
        }
    }

    fn relocate_tombstone(&self, old: &Bytes, relocator: &mut LogEntryRelocator<'_>) {
        let Ok(view) = TombstoneView::parse(old.clone()) else {
            return;
        };
        // A tombstone stays live exactly as long as the segment holding
        // the object it deleted; once that segment is gone, no replay
        // can resurrect the object, so the tombstone is garbage.
        if self.log.segment_exists(view.segment_id()) {
            relocator.append(LogEntryType::Tombstone, old, view.timestamp());
        }
    }
}

impl LogEntryHandler for ObjectManager {
    fn relocate(
        &self,
        entry_type: LogEntryType,
        old: &Bytes,
        relocator: &mut LogEntryRelocator<'_>,
    ) {
        match entry_type {
            LogEntryType::Object => self.relocate_object(old, relocator),
            LogEntryType::Tombstone => self.relocate_tombstone(old, relocator),
            // Floor markers are only meaningful to replay; they die with
            // their segment.
            LogEntryType::SafeVersion => {}
        }
    }

    fn entry_timestamp(&self, entry_type: LogEntryType, payload: &Bytes) -> u32 {
        match entry_type {
            LogEntryType::Object => ObjectView::parse(payload.clone())
                .map(|v| v.timestamp())
                .unwrap_or(0),
            LogEntryType::Tombstone => TombstoneView::parse(payload.clone())
                .map(|v| v.timestamp())
                .unwrap_or(0),
            LogEntryType::SafeVersion => 0,
        }
    }
}
