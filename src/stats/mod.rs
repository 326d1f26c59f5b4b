//! Health, listing and relay statistics

pub mod metrics;

pub use metrics::{RelayMetrics, RelaySnapshot, ServerStats, StreamSummary};
