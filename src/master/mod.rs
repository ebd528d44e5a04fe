//! Master-side object management.
//!
//! The object manager coordinates client operations, recovery replay,
//! and cleaner callbacks over one shared hash index. This module
//! contains:
//!
//! - [`object_manager`] - Write/read/remove, replay, cleaner callbacks
//! - [`bucket_locks`] - Striped locks over index buckets
//! - [`version`] - Version allocation over the safe-version floor
//! - [`tablet`] - Tablet ownership registry
//! - [`reject`] - Conditional-operation reject rules
//! - [`reaper`] - Background eviction of recovery tombstones

pub mod bucket_locks;
pub mod object_manager;
pub mod reaper;
pub mod reject;
pub mod tablet;
pub mod version;

pub use object_manager::{ObjectManager, ReplicationDriver};
pub use reaper::TombstoneReaper;
pub use reject::RejectRules;
pub use tablet::{Tablet, TabletRegistry, TabletState};
pub use version::VersionAllocator;
