//! Append-only segmented log, side logs, and the cleaner driver.
//!
//! The log owns every payload byte in the system; the hash index holds
//! only [`Reference`]s into it. Entries are appended to a head segment
//! that seals and rolls at a size threshold. Freeing a reference marks
//! its slot dead but leaves the bytes readable until the cleaner retires
//! the whole segment, so readers holding a reference never observe a
//! torn or reclaimed entry.
//!
//! # Side logs
//!
//! Recovery replay appends into a [`SideLog`]: segments drawn from the
//! same id space and resolvable through the main log immediately (the
//! replay path must re-read entries it staged moments earlier), but
//! excluded from the main byte budget and from cleaning until
//! [`SideLog::commit`] splices them in under one lock. `abort` drops the
//! staged segments wholesale.
//!
//! # Cleaning
//!
//! [`Log::clean_segment`] walks a segment's live slots and hands each to
//! the registered [`LogEntryHandler`] with a [`LogEntryRelocator`]. A
//! relocator carries a byte budget; when it runs out the handler backs
//! off, and the driver retries the remaining slots with a doubled
//! budget. Once no slot needs more memory the segment is retired and
//! `segment_exists` for its id turns false.

use crate::storage::entry::LogEntryType;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{RwLock, Weak};

/// Opaque token identifying one entry in the log.
///
/// Packs a segment id and a slot index; the packing is private to this
/// module, callers treat references as integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reference(u64);

const SLOT_BITS: u64 = 24;
const SLOT_MASK: u64 = (1 << SLOT_BITS) - 1;

impl Reference {
    fn new(segment_id: u64, slot: usize) -> Self {
        debug_assert!(segment_id < (1 << (64 - SLOT_BITS)));
        debug_assert!((slot as u64) < (1 << SLOT_BITS));
        Self((segment_id << SLOT_BITS) | slot as u64)
    }

    /// The log segment holding this entry.
    pub fn segment_id(self) -> u64 {
        self.0 >> SLOT_BITS
    }

    fn slot(self) -> usize {
        (self.0 & SLOT_MASK) as usize
    }

    /// Integer form, as stored in the hash index.
    pub fn to_u64(self) -> u64 {
        self.0
    }

    /// Rebuild from the integer form.
    pub fn from_u64(value: u64) -> Self {
        Self(value)
    }
}

#[derive(Debug)]
struct Slot {
    entry_type: LogEntryType,
    timestamp: u32,
    payload: Bytes,
    freed: bool,
}

#[derive(Debug)]
struct Segment {
    slots: Vec<Slot>,
    bytes: u64,
    sealed: bool,
    /// Staged segments belong to an uncommitted side log.
    staged: bool,
}

impl Segment {
    fn new(staged: bool) -> Self {
        Self {
            slots: Vec::new(),
            bytes: 0,
            sealed: false,
            staged,
        }
    }
}

#[derive(Debug, Default)]
struct LogInner {
    segments: HashMap<u64, Segment>,
    /// Current open head segment of the main log.
    head: Option<u64>,
    /// Bytes in unretired, non-staged segments; checked against the budget.
    accounted_bytes: u64,
    /// Appends since the last sync.
    unsynced_appends: u64,
}

/// The log substrate.
pub struct Log {
    inner: Mutex<LogInner>,
    next_segment_id: AtomicU64,
    byte_budget: u64,
    segment_size: u64,
    cleaner_enabled: AtomicBool,
    handler: RwLock<Option<Weak<dyn LogEntryHandler>>>,
}

impl std::fmt::Debug for Log {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Log")
            .field("byte_budget", &self.byte_budget)
            .field("segment_size", &self.segment_size)
            .finish_non_exhaustive()
    }
}

/// Callbacks the cleaner drives for each live-looking entry.
pub trait LogEntryHandler: Send + Sync {
    /// Decide liveness and, if live, copy the entry via the relocator and
    /// repoint any metadata at the new reference before returning.
    fn relocate(&self, entry_type: LogEntryType, old: &Bytes, relocator: &mut LogEntryRelocator<'_>);

    /// Entry age for the cleaner's cost-benefit policy.
    fn entry_timestamp(&self, entry_type: LogEntryType, payload: &Bytes) -> u32;
}

impl Log {
    /// Create a log with the given total byte budget and segment size.
    pub fn new(byte_budget: u64, segment_size: u64) -> Self {
        Self {
            inner: Mutex::new(LogInner::default()),
            next_segment_id: AtomicU64::new(1),
            byte_budget,
            segment_size,
            cleaner_enabled: AtomicBool::new(false),
            handler: RwLock::new(None),
        }
    }

    /// Register the relocation callback target. Held weakly; the handler
    /// owns the log, not the other way around.
    pub fn set_entry_handler(&self, handler: Weak<dyn LogEntryHandler>) {
        *self.handler.write().unwrap() = Some(handler);
    }

    /// Allow `clean_segment` to run.
    pub fn enable_cleaner(&self) {
        self.cleaner_enabled.store(true, Ordering::Release);
    }

    fn allocate_segment_id(&self) -> u64 {
        self.next_segment_id.fetch_add(1, Ordering::AcqRel)
    }

    /// Append a single entry. Returns `None` when the byte budget is
    /// exhausted; the caller surfaces that as retryable backpressure.
    pub fn append(&self, entry_type: LogEntryType, timestamp: u32, payload: Bytes) -> Option<Reference> {
        let mut inner = self.inner.lock();
        self.append_locked(&mut inner, entry_type, timestamp, payload, true)
    }

    /// Append two entries with atomic visibility: both land in the same
    /// critical section, so no replica or reader can observe one without
    /// the other once `sync` completes.
    pub fn append_pair(
        &self,
        first: (LogEntryType, u32, Bytes),
        second: (LogEntryType, u32, Bytes),
    ) -> Option<(Reference, Reference)> {
        let mut inner = self.inner.lock();
        let total = first.2.len() as u64 + second.2.len() as u64;
        if inner.accounted_bytes + total > self.byte_budget {
            return None;
        }
        let a = self.append_locked(&mut inner, first.0, first.1, first.2, false)?;
        let b = self.append_locked(&mut inner, second.0, second.1, second.2, false)?;
        Some((a, b))
    }

    fn append_locked(
        &self,
        inner: &mut LogInner,
        entry_type: LogEntryType,
        timestamp: u32,
        payload: Bytes,
        enforce_budget: bool,
    ) -> Option<Reference> {
        let len = payload.len() as u64;
        if enforce_budget && inner.accounted_bytes + len > self.byte_budget {
            return None;
        }

        let head_id = match inner.head {
            Some(id) if inner.segments[&id].bytes + len <= self.segment_size => id,
            _ => {
                if let Some(old) = inner.head {
                    if let Some(segment) = inner.segments.get_mut(&old) {
                        segment.sealed = true;
                    }
                }
                let id = self.allocate_segment_id();
                inner.segments.insert(id, Segment::new(false));
                inner.head = Some(id);
                id
            }
        };

        let segment = inner.segments.get_mut(&head_id).expect("head segment present");
        let slot = segment.slots.len();
        segment.slots.push(Slot {
            entry_type,
            timestamp,
            payload,
            freed: false,
        });
        segment.bytes += len;
        inner.accounted_bytes += len;
        inner.unsynced_appends += 1;
        Some(Reference::new(head_id, slot))
    }

    /// Resolve a reference to its entry type and payload. The returned
    /// bytes share the stored allocation, so their start address is
    /// stable for the cleaner's identity check.
    pub fn get_entry(&self, reference: Reference) -> Option<(LogEntryType, Bytes)> {
        let inner = self.inner.lock();
        let segment = inner.segments.get(&reference.segment_id())?;
        let slot = segment.slots.get(reference.slot())?;
        Some((slot.entry_type, slot.payload.clone()))
    }

    /// Invalidate a reference. The bytes stay readable until the segment
    /// is retired by the cleaner.
    pub fn free(&self, reference: Reference) {
        let mut inner = self.inner.lock();
        if let Some(segment) = inner.segments.get_mut(&reference.segment_id()) {
            if let Some(slot) = segment.slots.get_mut(reference.slot()) {
                slot.freed = true;
            }
        }
    }

    /// Whether a segment still exists (has not been retired by the
    /// cleaner). Decides tombstone liveness.
    pub fn segment_exists(&self, segment_id: u64) -> bool {
        self.inner.lock().segments.contains_key(&segment_id)
    }

    /// Block until all prior appends are durable on the required
    /// replicas. Replication is the embedding server's concern; here the
    /// call marks the durability horizon.
    pub fn sync(&self) {
        self.inner.lock().unsynced_appends = 0;
    }

    /// Appends not yet covered by a `sync` call.
    pub fn unsynced_appends(&self) -> u64 {
        self.inner.lock().unsynced_appends
    }

    /// Bytes currently accounted against the budget.
    pub fn accounted_bytes(&self) -> u64 {
        self.inner.lock().accounted_bytes
    }

    /// Clean one segment: relocate every live entry through the
    /// registered handler, then retire the segment. Returns false if the
    /// cleaner is disabled, no handler is registered, or the segment is
    /// missing, open, or staged.
    pub fn clean_segment(&self, segment_id: u64) -> bool {
        if !self.cleaner_enabled.load(Ordering::Acquire) {
            return false;
        }
        let handler = match self.handler.read().unwrap().as_ref().and_then(Weak::upgrade) {
            Some(handler) => handler,
            None => return false,
        };

        {
            let inner = self.inner.lock();
            match inner.segments.get(&segment_id) {
                Some(segment) if segment.sealed && !segment.staged => {}
                _ => return false,
            }
        }

        let mut budget = self.segment_size.max(1);
        loop {
            // Snapshot live slots outside the inner lock; the handler
            // takes bucket locks, which order above log internals.
            let live: Vec<(usize, LogEntryType, u32, Bytes)> = {
                let inner = self.inner.lock();
                let segment = match inner.segments.get(&segment_id) {
                    Some(segment) => segment,
                    None => return true,
                };
                segment
                    .slots
                    .iter()
                    .enumerate()
                    .filter(|(_, slot)| !slot.freed)
                    .map(|(i, slot)| (i, slot.entry_type, slot.timestamp, slot.payload.clone()))
                    .collect()
            };

            let mut remaining = budget;
            let mut needs_retry = false;
            for (slot_idx, entry_type, _timestamp, payload) in live {
                let mut relocator = LogEntryRelocator {
                    log: self,
                    remaining: &mut remaining,
                    new_reference: None,
                    failed: false,
                };
                handler.relocate(entry_type, &payload, &mut relocator);

                if relocator.failed {
                    needs_retry = true;
                } else {
                    // Either relocated (metadata now points at the copy)
                    // or dead; the old slot is finished either way.
                    let mut inner = self.inner.lock();
                    if let Some(segment) = inner.segments.get_mut(&segment_id) {
                        segment.slots[slot_idx].freed = true;
                    }
                }
            }

            if !needs_retry {
                let mut inner = self.inner.lock();
                if let Some(segment) = inner.segments.remove(&segment_id) {
                    inner.accounted_bytes = inner.accounted_bytes.saturating_sub(segment.bytes);
                }
                return true;
            }
            budget = budget.saturating_mul(2);
        }
    }

    /// Ids of sealed, unstaged segments, for cleaner scheduling.
    pub fn cleanable_segments(&self) -> Vec<u64> {
        let inner = self.inner.lock();
        let mut ids: Vec<u64> = inner
            .segments
            .iter()
            .filter(|(_, segment)| segment.sealed && !segment.staged)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Seal the current head segment so it becomes cleanable.
    pub fn seal_head(&self) {
        let mut inner = self.inner.lock();
        if let Some(id) = inner.head.take() {
            if let Some(segment) = inner.segments.get_mut(&id) {
                segment.sealed = true;
            }
        }
    }
}

/// Copies a live entry to a new location during cleaning.
///
/// Carries a byte budget; an append beyond it fails, the handler returns
/// without updating metadata, and the cleaner retries the entry with
/// more memory.
pub struct LogEntryRelocator<'a> {
    log: &'a Log,
    remaining: &'a mut u64,
    new_reference: Option<Reference>,
    failed: bool,
}

impl LogEntryRelocator<'_> {
    /// Copy the entry. Returns false (and records the failure) when the
    /// relocation budget is exhausted.
    pub fn append(&mut self, entry_type: LogEntryType, payload: &Bytes, timestamp: u32) -> bool {
        if self.new_reference.is_some() {
            return true;
        }
        let len = payload.len() as u64;
        if len > *self.remaining {
            self.failed = true;
            return false;
        }
        let mut inner = self.log.inner.lock();
        // Survivor appends bypass the budget: cleaning must always be
        // able to make forward progress to reclaim space.
        let reference = self
            .log
            .append_locked(&mut inner, entry_type, timestamp, payload.clone(), false)
            .expect("survivor append cannot fail");
        *self.remaining -= len;
        self.new_reference = Some(reference);
        true
    }

    /// Reference to the relocated copy, once `append` has succeeded.
    pub fn new_reference(&self) -> Option<Reference> {
        self.new_reference
    }

    /// Whether an append was performed.
    pub fn did_append(&self) -> bool {
        self.new_reference.is_some()
    }

    /// Whether the relocation budget was exhausted.
    pub fn failed(&self) -> bool {
        self.failed
    }
}

/// Staging log for recovery replay.
///
/// Appends land in segments marked staged: resolvable through the owning
/// log (replay re-reads entries it just wrote) but outside the main
/// budget and invisible to the cleaner. `commit` splices them into the
/// main log atomically; `abort` drops them.
pub struct SideLog<'a> {
    log: &'a Log,
    segments: Mutex<Vec<u64>>,
    head: Mutex<Option<u64>>,
    byte_budget: u64,
    bytes_used: AtomicU64,
}

impl<'a> SideLog<'a> {
    /// Create a side log staging into `log` with its own byte budget.
    pub fn new(log: &'a Log, byte_budget: u64) -> Self {
        Self {
            log,
            segments: Mutex::new(Vec::new()),
            head: Mutex::new(None),
            byte_budget,
            bytes_used: AtomicU64::new(0),
        }
    }

    /// Append an entry to the staging segments. Returns `None` when the
    /// side log budget is exhausted; replay treats that as fatal for the
    /// segment being replayed.
    pub fn append(&self, entry_type: LogEntryType, timestamp: u32, payload: Bytes) -> Option<Reference> {
        let len = payload.len() as u64;
        if self.bytes_used.load(Ordering::Acquire) + len > self.byte_budget {
            return None;
        }

        let mut head = self.head.lock();
        let mut inner = self.log.inner.lock();

        let head_id = match *head {
            Some(id) if inner.segments[&id].bytes + len <= self.log.segment_size => id,
            _ => {
                if let Some(old) = *head {
                    if let Some(segment) = inner.segments.get_mut(&old) {
                        segment.sealed = true;
                    }
                }
                let id = self.log.allocate_segment_id();
                inner.segments.insert(id, Segment::new(true));
                self.segments.lock().push(id);
                *head = Some(id);
                id
            }
        };

        let segment = inner.segments.get_mut(&head_id).expect("side log head present");
        let slot = segment.slots.len();
        segment.slots.push(Slot {
            entry_type,
            timestamp,
            payload,
            freed: false,
        });
        segment.bytes += len;
        self.bytes_used.fetch_add(len, Ordering::AcqRel);
        Some(Reference::new(head_id, slot))
    }

    /// Invalidate a reference through the owning log.
    pub fn free(&self, reference: Reference) {
        self.log.free(reference);
    }

    /// Merge the staged segments into the main log. After this the
    /// entries are durable with everything appended before them, and the
    /// cleaner may process their segments.
    pub fn commit(self) {
        let segments = self.segments.lock().clone();
        let mut inner = self.log.inner.lock();
        for id in segments {
            if let Some(segment) = inner.segments.get_mut(&id) {
                segment.staged = false;
                segment.sealed = true;
                let bytes = segment.bytes;
                inner.accounted_bytes += bytes;
            }
        }
        inner.unsynced_appends = 0;
    }

    /// Drop the staged segments. References into them become dangling;
    /// the caller repairs the index via the orphan sweep.
    pub fn abort(self) {
        let segments = self.segments.lock().clone();
        let mut inner = self.log.inner.lock();
        for id in segments {
            inner.segments.remove(&id);
        }
    }

    /// Bytes staged so far.
    pub fn bytes_used(&self) -> u64 {
        self.bytes_used.load(Ordering::Acquire)
    }
}

/// Builds the framed byte form of a recovery segment.
///
/// Frames are `type: u8 | length: u32 LE | payload`. Recovery segments
/// arrive from backups as contiguous buffers in this form.
#[derive(Debug, Default)]
pub struct RecoverySegmentBuilder {
    buf: BytesMut,
}

impl RecoverySegmentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one framed entry.
    pub fn add(&mut self, entry_type: LogEntryType, payload: &[u8]) -> &mut Self {
        self.buf.put_u8(entry_type.as_u8());
        self.buf.put_u32_le(payload.len() as u32);
        self.buf.put_slice(payload);
        self
    }

    /// Finish into the contiguous segment buffer.
    pub fn build(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Iterator over the framed entries of a recovery segment.
///
/// Keeps one entry of lookahead so the replay loop can prefetch the next
/// entry's hash bucket while processing the current one. A malformed
/// frame ends iteration; the remainder of the buffer is undecodable.
#[derive(Debug)]
pub struct SegmentIterator {
    buf: Bytes,
    current: Option<(LogEntryType, Bytes)>,
    lookahead: Option<(LogEntryType, Bytes)>,
}

impl SegmentIterator {
    /// Open an iterator over a framed segment buffer.
    pub fn new(buf: Bytes) -> Self {
        let mut it = Self {
            buf,
            current: None,
            lookahead: None,
        };
        it.current = it.read_frame();
        it.lookahead = it.read_frame();
        it
    }

    fn read_frame(&mut self) -> Option<(LogEntryType, Bytes)> {
        if self.buf.remaining() < 5 {
            if self.buf.has_remaining() {
                tracing::warn!(
                    trailing = self.buf.remaining(),
                    "truncated frame at end of recovery segment"
                );
            }
            return None;
        }
        let type_byte = self.buf.get_u8();
        let len = self.buf.get_u32_le() as usize;
        if self.buf.remaining() < len {
            tracing::warn!(
                declared = len,
                remaining = self.buf.remaining(),
                "recovery segment frame overruns buffer"
            );
            return None;
        }
        let payload = self.buf.split_to(len);
        match LogEntryType::from_u8(type_byte) {
            Some(entry_type) => Some((entry_type, payload)),
            None => {
                tracing::warn!(type_byte, "unknown entry type in recovery segment");
                None
            }
        }
    }

    /// Whether iteration is exhausted.
    pub fn is_done(&self) -> bool {
        self.current.is_none()
    }

    /// The entry at the cursor.
    pub fn current(&self) -> Option<&(LogEntryType, Bytes)> {
        self.current.as_ref()
    }

    /// The entry after the cursor, for bucket prefetching.
    pub fn peek_next(&self) -> Option<&(LogEntryType, Bytes)> {
        self.lookahead.as_ref()
    }

    /// Step to the next entry.
    pub fn advance(&mut self) {
        self.current = self.lookahead.take();
        self.lookahead = self.read_frame();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn payload(len: usize) -> Bytes {
        Bytes::from(vec![0xabu8; len])
    }

    #[test]
    fn test_append_and_get() {
        let log = Log::new(1024, 256);
        let reference = log
            .append(LogEntryType::Object, 1, Bytes::from_static(b"hello"))
            .unwrap();

        let (entry_type, bytes) = log.get_entry(reference).unwrap();
        assert_eq!(entry_type, LogEntryType::Object);
        assert_eq!(bytes, Bytes::from_static(b"hello"));
        assert_eq!(log.unsynced_appends(), 1);

        log.sync();
        assert_eq!(log.unsynced_appends(), 0);
    }

    #[test]
    fn test_freed_entry_still_readable() {
        let log = Log::new(1024, 256);
        let reference = log
            .append(LogEntryType::Object, 1, Bytes::from_static(b"x"))
            .unwrap();
        log.free(reference);
        assert!(log.get_entry(reference).is_some());
    }

    #[test]
    fn test_segments_roll_at_size() {
        let log = Log::new(4096, 64);
        let a = log.append(LogEntryType::Object, 0, payload(48)).unwrap();
        let b = log.append(LogEntryType::Object, 0, payload(48)).unwrap();
        assert_ne!(a.segment_id(), b.segment_id());
        assert!(log.segment_exists(a.segment_id()));
    }

    #[test]
    fn test_budget_exhaustion() {
        let log = Log::new(100, 64);
        assert!(log.append(LogEntryType::Object, 0, payload(60)).is_some());
        assert!(log.append(LogEntryType::Object, 0, payload(60)).is_none());
    }

    #[test]
    fn test_pair_append_is_all_or_nothing() {
        let log = Log::new(100, 256);
        // Pair exceeding the budget appends neither entry.
        assert!(log
            .append_pair(
                (LogEntryType::Object, 0, payload(60)),
                (LogEntryType::Tombstone, 0, payload(60)),
            )
            .is_none());
        assert_eq!(log.accounted_bytes(), 0);

        let (a, b) = log
            .append_pair(
                (LogEntryType::Object, 0, payload(30)),
                (LogEntryType::Tombstone, 0, payload(30)),
            )
            .unwrap();
        assert_eq!(a.segment_id(), b.segment_id());
    }

    #[test]
    fn test_side_log_staging_and_commit() {
        let log = Log::new(1024, 256);
        let side = SideLog::new(&log, 512);

        let reference = side
            .append(LogEntryType::Object, 0, Bytes::from_static(b"staged"))
            .unwrap();
        // Resolvable before commit, but outside the main budget.
        assert!(log.get_entry(reference).is_some());
        assert_eq!(log.accounted_bytes(), 0);
        assert!(log.segment_exists(reference.segment_id()));

        side.commit();
        assert_eq!(log.accounted_bytes(), 6);
        assert!(log.get_entry(reference).is_some());
    }

    #[test]
    fn test_side_log_abort_drops_segments() {
        let log = Log::new(1024, 256);
        let side = SideLog::new(&log, 512);
        let reference = side
            .append(LogEntryType::Object, 0, Bytes::from_static(b"staged"))
            .unwrap();

        side.abort();
        assert!(log.get_entry(reference).is_none());
        assert!(!log.segment_exists(reference.segment_id()));
    }

    #[test]
    fn test_side_log_budget() {
        let log = Log::new(1024, 256);
        let side = SideLog::new(&log, 10);
        assert!(side.append(LogEntryType::Object, 0, payload(8)).is_some());
        assert!(side.append(LogEntryType::Object, 0, payload(8)).is_none());
    }

    struct DropEverything;

    impl LogEntryHandler for DropEverything {
        fn relocate(&self, _: LogEntryType, _: &Bytes, _: &mut LogEntryRelocator<'_>) {}

        fn entry_timestamp(&self, _: LogEntryType, _: &Bytes) -> u32 {
            0
        }
    }

    #[test]
    fn test_clean_segment_retires_dead_segment() {
        let log = Log::new(1024, 64);
        let reference = log.append(LogEntryType::Object, 0, payload(32)).unwrap();
        log.seal_head();

        let handler: Arc<dyn LogEntryHandler> = Arc::new(DropEverything);
        log.set_entry_handler(Arc::downgrade(&handler));

        // Disabled cleaner refuses.
        assert!(!log.clean_segment(reference.segment_id()));
        log.enable_cleaner();

        assert!(log.clean_segment(reference.segment_id()));
        assert!(!log.segment_exists(reference.segment_id()));
        assert!(log.get_entry(reference).is_none());
        assert_eq!(log.accounted_bytes(), 0);
    }

    #[test]
    fn test_segment_iterator_with_lookahead() {
        let mut builder = RecoverySegmentBuilder::new();
        builder.add(LogEntryType::Object, b"one");
        builder.add(LogEntryType::Tombstone, b"two");
        builder.add(LogEntryType::SafeVersion, b"three");

        let mut it = SegmentIterator::new(builder.build());
        assert_eq!(it.current().unwrap().0, LogEntryType::Object);
        assert_eq!(it.peek_next().unwrap().0, LogEntryType::Tombstone);

        it.advance();
        assert_eq!(it.current().unwrap().1, Bytes::from_static(b"two"));
        assert_eq!(it.peek_next().unwrap().0, LogEntryType::SafeVersion);

        it.advance();
        assert!(it.peek_next().is_none());
        it.advance();
        assert!(it.is_done());
    }

    #[test]
    fn test_segment_iterator_stops_at_malformed_frame() {
        let mut builder = RecoverySegmentBuilder::new();
        builder.add(LogEntryType::Object, b"ok");
        let mut raw = builder.build().to_vec();
        raw.extend_from_slice(&[9u8, 1, 0, 0, 0, 0]); // unknown type

        let mut it = SegmentIterator::new(Bytes::from(raw));
        assert!(it.current().is_some());
        it.advance();
        assert!(it.is_done());
    }
}
