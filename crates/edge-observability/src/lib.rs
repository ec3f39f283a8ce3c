//! Observability infrastructure for the edge cache worker.
//!
//! This crate provides:
//! - `StructuredLogger` - Structured logging with request context
//! - `MetricsCollector` / `RequestMetrics` - Per-request cache timings
//! - `CacheCounters` - Process-wide hit/miss/bypass counters

mod logging;
mod metrics;

pub use logging::*;
pub use metrics::*;

// Re-export RequestId and TimingContext from edge-core for convenience
pub use edge_core::{RequestId, TimingContext};
