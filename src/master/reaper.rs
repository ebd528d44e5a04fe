//! Background eviction of recovery tombstones.
//!
//! Replay parks tombstones in the hash index so later out-of-order
//! entries reconcile correctly. Once a tablet leaves RECOVERING those
//! tombstones are dead weight; the reaper walks the index one bucket per
//! tick from the dispatch loop and evicts them. Tombstone log entries
//! are not freed here; the cleaner reclaims them by segment liveness.
//!
//! The reaper idles once a full pass has run with no intervening
//! `replay_segment` activity: at bucket zero it compares the manager's
//! replay return counter against the value snapshotted when the pass
//! began, and goes back to sleep when nothing changed.

use crate::master::object_manager::ObjectManager;
use std::sync::{Arc, Weak};

/// Cooperative one-bucket-per-tick tombstone sweeper.
///
/// Holds its owner weakly; the dispatch loop drops the reaper when
/// polling returns false after the manager is gone.
#[derive(Debug)]
pub struct TombstoneReaper {
    owner: Weak<ObjectManager>,
    current_bucket: usize,
    last_replay_count: u64,
    passes: u64,
}

impl TombstoneReaper {
    /// Create a reaper for the given manager.
    pub fn new(owner: &Arc<ObjectManager>) -> Self {
        tracing::debug!("starting background tombstone cleanup");
        Self {
            owner: Arc::downgrade(owner),
            current_bucket: 0,
            last_replay_count: 0,
            passes: 0,
        }
    }

    /// Sweep one bucket and yield. Returns false when there is nothing
    /// to do: replay has been quiescent since the last completed pass,
    /// or the manager is gone.
    pub fn poll(&mut self) -> bool {
        let Some(owner) = self.owner.upgrade() else {
            return false;
        };

        if self.current_bucket == 0 {
            let count = owner.replay_segment_return_count();
            if count == self.last_replay_count {
                return false;
            }
            // Pass start: snapshot the replay count. Passes keep running
            // until the count holds still across an entire pass, so a
            // replay racing the sweep always gets one more pass behind it.
            self.last_replay_count = count;
        }

        owner.reap_bucket(self.current_bucket);

        self.current_bucket += 1;
        if self.current_bucket == owner.index_bucket_count() {
            self.current_bucket = 0;
            self.passes += 1;
            tracing::debug!(passes = self.passes, "tombstone cleanup pass complete");
        }
        true
    }

    /// Completed full passes over the index.
    pub fn passes(&self) -> u64 {
        self.passes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::MasterConfig;
    use crate::master::tablet::{TabletRegistry, TabletState};
    use crate::ops::metrics::MasterMetrics;
    use crate::storage::entry::{encode_object, encode_tombstone, Key, LogEntryType, ObjectView};
    use crate::storage::log::{RecoverySegmentBuilder, SegmentIterator, SideLog};
    use bytes::Bytes;

    const TABLE: u64 = 1;

    fn setup() -> Arc<ObjectManager> {
        let config = MasterConfig {
            hash_index_buckets: 8,
            bucket_lock_stripes: 8,
            log_byte_budget: 1 << 20,
            side_log_byte_budget: 1 << 20,
            segment_size_bytes: 4096,
            ..Default::default()
        };
        let tablets = Arc::new(TabletRegistry::new());
        tablets.add_tablet(TABLE, 0, u64::MAX, TabletState::Recovering);
        ObjectManager::new(&config, tablets, Arc::new(MasterMetrics::new()))
    }

    fn replay_tombstone(manager: &Arc<ObjectManager>, name: &str, version: u64) {
        let key = Key::new(TABLE, Bytes::copy_from_slice(name.as_bytes()));
        let object = ObjectView::parse(encode_object(&key, b"", version, 0)).unwrap();
        let mut builder = RecoverySegmentBuilder::new();
        builder.add(LogEntryType::Tombstone, &encode_tombstone(&object, 1, 0));

        let side = SideLog::new(manager.log(), 1 << 20);
        manager
            .replay_segment(&side, SegmentIterator::new(builder.build()))
            .unwrap();
        side.commit();
    }

    fn run_full_pass(reaper: &mut TombstoneReaper, manager: &Arc<ObjectManager>) {
        for _ in 0..manager.index_bucket_count() {
            assert!(reaper.poll());
        }
    }

    #[test]
    fn test_idle_until_first_replay() {
        let manager = setup();
        let mut reaper = TombstoneReaper::new(&manager);
        assert!(!reaper.poll());
    }

    #[test]
    fn test_tombstones_retained_while_recovering() {
        let manager = setup();
        replay_tombstone(&manager, "a", 3);

        let mut reaper = TombstoneReaper::new(&manager);
        run_full_pass(&mut reaper, &manager);
        assert_eq!(reaper.passes(), 1);
        assert_eq!(manager.index_entry_count(), 1);
    }

    #[test]
    fn test_tombstones_evicted_after_recovery_ends() {
        let manager = setup();
        replay_tombstone(&manager, "a", 3);
        replay_tombstone(&manager, "b", 4);
        manager.tablets().set_state(TABLE, 0, TabletState::Normal);

        let mut reaper = TombstoneReaper::new(&manager);
        run_full_pass(&mut reaper, &manager);
        assert_eq!(manager.index_entry_count(), 0);

        // Replay is quiescent and the pass completed; the reaper idles.
        assert!(!reaper.poll());
    }

    #[test]
    fn test_new_replay_wakes_reaper() {
        let manager = setup();
        replay_tombstone(&manager, "a", 3);
        manager.tablets().set_state(TABLE, 0, TabletState::Normal);

        let mut reaper = TombstoneReaper::new(&manager);
        run_full_pass(&mut reaper, &manager);
        assert!(!reaper.poll());

        manager.tablets().set_state(TABLE, 0, TabletState::Recovering);
        replay_tombstone(&manager, "b", 5);
        assert!(reaper.poll());
    }

    #[test]
    fn test_poll_stops_when_owner_dropped() {
        let manager = setup();
        let mut reaper = TombstoneReaper::new(&manager);
        drop(manager);
        assert!(!reaper.poll());
    }
}
