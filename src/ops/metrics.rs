//! Counter sink for object manager telemetry.
//!
//! The sink is constructed by the embedding server and passed into the
//! object manager; nothing here is process-global. Replay aggregates
//! counts in locals and flushes once per segment, so individual counter
//! bumps stay off the replay hot path.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters exported by the object manager.
#[derive(Debug, Default)]
pub struct MasterMetrics {
    /// Entries iterated across all replayed segments.
    pub replay_entries: AtomicU64,
    /// Bytes iterated across all replayed segments.
    pub replay_bytes: AtomicU64,
    /// Objects appended to a side log during replay.
    pub objects_appended: AtomicU64,
    /// Objects discarded during replay (older than the index entry).
    pub objects_discarded: AtomicU64,
    /// Tombstones appended to a side log during replay.
    pub tombstones_appended: AtomicU64,
    /// Tombstones discarded during replay.
    pub tombstones_discarded: AtomicU64,
    /// SAFEVERSION markers that raised the version floor.
    pub safe_version_recovered: AtomicU64,
    /// SAFEVERSION markers at or below the current floor.
    pub safe_version_discarded: AtomicU64,
    /// Entries that failed their integrity check during replay.
    pub checksum_failures: AtomicU64,
    /// Objects removed by the orphan sweep.
    pub orphaned_objects_removed: AtomicU64,
    /// Recovery tombstones evicted from the index by the reaper.
    pub tombstones_reaped: AtomicU64,
}

/// Point-in-time copy of [`MasterMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub replay_entries: u64,
    pub replay_bytes: u64,
    pub objects_appended: u64,
    pub objects_discarded: u64,
    pub tombstones_appended: u64,
    pub tombstones_discarded: u64,
    pub safe_version_recovered: u64,
    pub safe_version_discarded: u64,
    pub checksum_failures: u64,
    pub orphaned_objects_removed: u64,
    pub tombstones_reaped: u64,
}

impl MasterMetrics {
    /// Create a zeroed counter sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value to a counter.
    pub fn add(counter: &AtomicU64, value: u64) {
        counter.fetch_add(value, Ordering::Relaxed);
    }

    /// Increment a counter by one.
    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            replay_entries: self.replay_entries.load(Ordering::Relaxed),
            replay_bytes: self.replay_bytes.load(Ordering::Relaxed),
            objects_appended: self.objects_appended.load(Ordering::Relaxed),
            objects_discarded: self.objects_discarded.load(Ordering::Relaxed),
            tombstones_appended: self.tombstones_appended.load(Ordering::Relaxed),
            tombstones_discarded: self.tombstones_discarded.load(Ordering::Relaxed),
            safe_version_recovered: self.safe_version_recovered.load(Ordering::Relaxed),
            safe_version_discarded: self.safe_version_discarded.load(Ordering::Relaxed),
            checksum_failures: self.checksum_failures.load(Ordering::Relaxed),
            orphaned_objects_removed: self.orphaned_objects_removed.load(Ordering::Relaxed),
            tombstones_reaped: self.tombstones_reaped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_adds() {
        let metrics = MasterMetrics::new();
        MasterMetrics::inc(&metrics.objects_appended);
        MasterMetrics::add(&metrics.replay_bytes, 128);

        let snap = metrics.snapshot();
        assert_eq!(snap.objects_appended, 1);
        assert_eq!(snap.replay_bytes, 128);
        assert_eq!(snap.tombstones_appended, 0);
    }
}
