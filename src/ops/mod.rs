//! Operations and observability.
//!
//! - [`metrics`] - Counter sink for object manager telemetry

pub mod metrics;

pub use metrics::{MasterMetrics, MetricsSnapshot};
