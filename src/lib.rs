//! Strata - Object manager core for a log-structured in-memory KV master.
//!
//! Strata owns the authoritative key → value mapping on one master of a
//! distributed in-memory key-value store. Values live in an append-only,
//! segmented log; a chained hash index maps each key to the log entry
//! holding its most recent object (or, during recovery, its deletion
//! marker). Three workloads share that index concurrently:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Client I/O threads                       │
//! │                     write │ read │ remove                       │
//! └─────────────────────────────────────────────────────────────────┘
//!                                 │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         ObjectManager                           │
//! │   stripe locks │ hash index │ versions │ reject rules │ sweeps  │
//! └─────────────────────────────────────────────────────────────────┘
//!          │                      │                      │
//! ┌──────────────────┐ ┌────────────────────┐ ┌─────────────────────┐
//! │  Recovery thread │ │    Log + SideLog   │ │   Cleaner thread    │
//! │  replay_segment  │ │  segments │ sync   │ │  relocate callbacks │
//! └──────────────────┘ └────────────────────┘ └─────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! ## Core
//! - [`core::config`] - Configuration parsing and validation
//! - [`core::error`] - Error types and wire status mapping
//! - [`core::time`] - Wall-clock timestamps for log entries
//!
//! ## Storage
//! - [`storage::entry`] - Entry wire formats and checksums
//! - [`storage::hash_index`] - Bucketed key-hash → reference index
//! - [`storage::log`] - Segmented log, side logs, cleaner driver
//!
//! ## Master
//! - [`master::object_manager`] - The object manager itself
//! - [`master::bucket_locks`] - Striped bucket locks
//! - [`master::version`] - Safe-version floor and allocation
//! - [`master::tablet`] - Tablet ownership registry
//! - [`master::reject`] - Conditional-operation reject rules
//! - [`master::reaper`] - Recovery tombstone eviction
//!
//! ## Operations
//! - [`ops::metrics`] - Counter sink for telemetry
//!
//! # Key Invariants
//!
//! - **INDEX-UNIQUE**: at most one reference per key in the hash index,
//!   and the referenced entry always decodes back to that key
//! - **VERSION-MONOTONE**: successive versions of a key strictly
//!   increase, across overwrites, deletes, and recoveries
//! - **FLOOR-MONOTONE**: the safe-version floor never decreases and
//!   bounds every version ever issued or replayed
//! - **TOMB-RETAIN**: a recovery tombstone stays indexed while its
//!   tablet is RECOVERING, so out-of-order replay cannot resurrect a
//!   deleted object
//! - **CLEAN-INVISIBLE**: cleaning relocates bytes but never changes the
//!   value or version a concurrent reader observes

// Core infrastructure
pub mod core;

// Storage substrate
pub mod storage;

// Master-side object management
pub mod master;

// Operations and observability
pub mod ops;

// Re-exports for convenience
pub use self::core::config::{ChecksumPolicy, MasterConfig};
pub use self::core::error::{StatusCode, StrataError, StrataResult};
pub use master::{
    ObjectManager, RejectRules, ReplicationDriver, Tablet, TabletRegistry, TabletState,
    TombstoneReaper, VersionAllocator,
};
pub use ops::{MasterMetrics, MetricsSnapshot};
pub use storage::entry::VERSION_NONEXISTENT;
pub use storage::{Key, Log, LogEntryType, Reference, SegmentIterator, SideLog};
