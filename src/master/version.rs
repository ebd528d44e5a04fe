//! Version allocation over the safe-version floor.
//!
//! The floor is a monotone 64-bit value: every version ever handed out or
//! observed through replay sits below it. New keys draw their first
//! version from the floor; deletions and replayed SAFEVERSION markers
//! raise it. Persisting the floor across recoveries is what keeps a
//! reborn key's versions above anything a client saw before the crash.

use crate::storage::entry::VERSION_NONEXISTENT;
use std::sync::atomic::{AtomicU64, Ordering};

/// Issues monotonic versions and tracks the safe-version floor.
#[derive(Debug)]
pub struct VersionAllocator {
    safe_version: AtomicU64,
}

impl VersionAllocator {
    /// Create an allocator with the floor at its initial value of 1.
    pub fn new() -> Self {
        Self {
            safe_version: AtomicU64::new(VERSION_NONEXISTENT + 1),
        }
    }

    /// Create an allocator with the floor restored from a known value.
    pub fn starting_at(safe_version: u64) -> Self {
        assert!(safe_version > VERSION_NONEXISTENT);
        Self {
            safe_version: AtomicU64::new(safe_version),
        }
    }

    /// Return the current floor and advance it past the returned value.
    /// The result is never `VERSION_NONEXISTENT` and never repeats.
    pub fn allocate(&self) -> u64 {
        self.safe_version.fetch_add(1, Ordering::AcqRel)
    }

    /// Raise the floor to `version` if it is above the current floor.
    /// Returns true when the floor moved.
    pub fn raise(&self, version: u64) -> bool {
        self.safe_version.fetch_max(version, Ordering::AcqRel) < version
    }

    /// The current floor.
    pub fn safe_version(&self) -> u64 {
        self.safe_version.load(Ordering::Acquire)
    }
}

impl Default for VersionAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_is_monotonic_and_nonzero() {
        let allocator = VersionAllocator::new();
        let a = allocator.allocate();
        let b = allocator.allocate();
        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_ne!(a, VERSION_NONEXISTENT);
    }

    #[test]
    fn test_raise_only_moves_forward() {
        let allocator = VersionAllocator::new();
        assert!(allocator.raise(10));
        assert!(!allocator.raise(10));
        assert!(!allocator.raise(5));
        assert_eq!(allocator.safe_version(), 10);
        assert_eq!(allocator.allocate(), 10);
        assert_eq!(allocator.allocate(), 11);
    }

    #[test]
    fn test_floor_is_nondecreasing_under_mixed_use() {
        let allocator = VersionAllocator::starting_at(4);
        let mut last = 0;
        for _ in 0..10 {
            let now = allocator.safe_version();
            assert!(now >= last);
            last = now;
            allocator.allocate();
            allocator.raise(last.saturating_sub(1));
        }
    }
}
