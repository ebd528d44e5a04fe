//! Tablet ownership registry.
//!
//! A tablet is a contiguous key-hash range of one table assigned to this
//! master. Client operations are admitted only when the key's tablet is
//! owned in the NORMAL state; replay targets tablets in RECOVERING. The
//! registry also carries per-tablet read/write counters for telemetry.

use crate::storage::entry::Key;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Lifecycle state of an owned tablet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabletState {
    /// Serving client reads and writes.
    Normal,
    /// Receiving replayed data; client operations are refused and
    /// recovery tombstones for the tablet are retained.
    Recovering,
    /// Assigned but not yet serving.
    NotReady,
}

/// Snapshot of one tablet's identity and state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tablet {
    pub table_id: u64,
    /// Inclusive start of the owned key-hash range.
    pub start_key_hash: u64,
    /// Inclusive end of the owned key-hash range.
    pub end_key_hash: u64,
    pub state: TabletState,
}

impl Tablet {
    fn covers(&self, table_id: u64, key_hash: u64) -> bool {
        self.table_id == table_id
            && self.start_key_hash <= key_hash
            && key_hash <= self.end_key_hash
    }
}

#[derive(Debug, Default)]
struct TabletStats {
    read_count: AtomicU64,
    write_count: AtomicU64,
}

#[derive(Debug)]
struct Slot {
    tablet: Tablet,
    stats: Arc<TabletStats>,
}

/// Registry of tablets owned by this master.
#[derive(Debug, Default)]
pub struct TabletRegistry {
    slots: RwLock<Vec<Slot>>,
}

impl TabletRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin owning a tablet. Ranges are not checked for overlap; the
    /// coordinator hands out disjoint assignments.
    pub fn add_tablet(
        &self,
        table_id: u64,
        start_key_hash: u64,
        end_key_hash: u64,
        state: TabletState,
    ) {
        let mut slots = self.slots.write().unwrap();
        slots.push(Slot {
            tablet: Tablet {
                table_id,
                start_key_hash,
                end_key_hash,
                state,
            },
            stats: Arc::new(TabletStats::default()),
        });
    }

    /// Look up the tablet owning a key, if any.
    pub fn get_tablet(&self, key: &Key) -> Option<Tablet> {
        let slots = self.slots.read().unwrap();
        slots
            .iter()
            .find(|slot| slot.tablet.covers(key.table_id(), key.key_hash()))
            .map(|slot| slot.tablet)
    }

    /// Change the state of the tablet starting at `start_key_hash` of
    /// `table_id`. Returns false if no such tablet is owned.
    pub fn set_state(&self, table_id: u64, start_key_hash: u64, state: TabletState) -> bool {
        let mut slots = self.slots.write().unwrap();
        match slots
            .iter_mut()
            .find(|slot| slot.tablet.table_id == table_id && slot.tablet.start_key_hash == start_key_hash)
        {
            Some(slot) => {
                slot.tablet.state = state;
                true
            }
            None => false,
        }
    }

    /// Drop every tablet of a table. Entries left in the index become
    /// orphans; the orphan sweep reclaims them.
    pub fn drop_table(&self, table_id: u64) {
        let mut slots = self.slots.write().unwrap();
        slots.retain(|slot| slot.tablet.table_id != table_id);
    }

    /// Bump the read counter of the key's tablet.
    pub fn increment_read_count(&self, key: &Key) {
        if let Some(stats) = self.stats_for(key) {
            stats.read_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Bump the write counter of the key's tablet.
    pub fn increment_write_count(&self, key: &Key) {
        if let Some(stats) = self.stats_for(key) {
            stats.write_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Read/write counters for the tablet owning `key`.
    pub fn counters(&self, key: &Key) -> Option<(u64, u64)> {
        self.stats_for(key).map(|stats| {
            (
                stats.read_count.load(Ordering::Relaxed),
                stats.write_count.load(Ordering::Relaxed),
            )
        })
    }

    fn stats_for(&self, key: &Key) -> Option<Arc<TabletStats>> {
        let slots = self.slots.read().unwrap();
        slots
            .iter()
            .find(|slot| slot.tablet.covers(key.table_id(), key.key_hash()))
            .map(|slot| Arc::clone(&slot.stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn full_range(registry: &TabletRegistry, table_id: u64, state: TabletState) {
        registry.add_tablet(table_id, 0, u64::MAX, state);
    }

    #[test]
    fn test_lookup_by_key_hash_range() {
        let registry = TabletRegistry::new();
        let key = Key::new(1, Bytes::from_static(b"k"));
        registry.add_tablet(1, 0, key.key_hash() - 1, TabletState::Normal);
        assert!(registry.get_tablet(&key).is_none());

        registry.add_tablet(1, key.key_hash(), u64::MAX, TabletState::Normal);
        let tablet = registry.get_tablet(&key).unwrap();
        assert_eq!(tablet.state, TabletState::Normal);

        let other_table = Key::new(2, Bytes::from_static(b"k"));
        assert!(registry.get_tablet(&other_table).is_none());
    }

    #[test]
    fn test_state_transitions() {
        let registry = TabletRegistry::new();
        full_range(&registry, 1, TabletState::Recovering);
        let key = Key::new(1, Bytes::from_static(b"k"));
        assert_eq!(
            registry.get_tablet(&key).unwrap().state,
            TabletState::Recovering
        );

        assert!(registry.set_state(1, 0, TabletState::Normal));
        assert_eq!(registry.get_tablet(&key).unwrap().state, TabletState::Normal);
        assert!(!registry.set_state(2, 0, TabletState::Normal));
    }

    #[test]
    fn test_drop_table_removes_ownership() {
        let registry = TabletRegistry::new();
        full_range(&registry, 1, TabletState::Normal);
        let key = Key::new(1, Bytes::from_static(b"k"));
        registry.drop_table(1);
        assert!(registry.get_tablet(&key).is_none());
    }

    #[test]
    fn test_telemetry_counters() {
        let registry = TabletRegistry::new();
        full_range(&registry, 1, TabletState::Normal);
        let key = Key::new(1, Bytes::from_static(b"k"));

        registry.increment_read_count(&key);
        registry.increment_write_count(&key);
        registry.increment_write_count(&key);
        assert_eq!(registry.counters(&key), Some((1, 2)));

        // Counters survive state changes.
        registry.set_state(1, 0, TabletState::Recovering);
        assert_eq!(registry.counters(&key), Some((1, 2)));
    }
}
