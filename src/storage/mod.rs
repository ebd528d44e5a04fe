//! Storage substrate: entry codecs, the hash index, and the log.
//!
//! # Modules
//!
//! - [`entry`] - Log entry wire formats and checksums
//! - [`hash_index`] - Bucketed key-hash → reference index
//! - [`log`] - Segmented append-only log, side logs, and the cleaner
//!
//! # Invariants
//!
//! - **LOGSOURCE**: every payload byte lives in the log; the index holds
//!   only references
//! - **REF-STABLE**: bytes behind a reference stay readable and at a
//!   stable address until their segment is retired
//! - **PAIR-ATOMIC**: a paired append is never durable or visible by
//!   halves

pub mod entry;
pub mod hash_index;
pub mod log;

// Re-exports for convenience
pub use entry::{Key, LogEntryType, ObjectView, SafeVersionView, TombstoneView};
pub use hash_index::HashIndex;
pub use log::{Log, LogEntryHandler, LogEntryRelocator, Reference, SegmentIterator, SideLog};
