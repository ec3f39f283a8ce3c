//! Request lifecycle tracking.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Lifecycle phases for a request passing through the cache worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecyclePhase {
    /// Request received, processing started.
    Received,
    /// Cache lookup finished.
    LookupDone,
    /// Origin response received and buffered.
    OriginFetched,
    /// Response transforms applied.
    Transformed,
    /// Response handed back to the caller.
    Responded,
}

impl LifecyclePhase {
    /// Stable name used in logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::LookupDone => "lookup_done",
            Self::OriginFetched => "origin_fetched",
            Self::Transformed => "transformed",
            Self::Responded => "responded",
        }
    }
}

/// Timing context for observability.
#[derive(Debug, Clone)]
pub struct TimingContext {
    start: Instant,
    marks: HashMap<LifecyclePhase, Instant>,
}

impl TimingContext {
    /// Create a new timing context.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            marks: HashMap::new(),
        }
    }

    /// Record a phase. A later mark for the same phase replaces the earlier one.
    pub fn mark(&mut self, phase: LifecyclePhase) {
        self.marks.insert(phase, Instant::now());
    }

    /// Get elapsed time since start.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Elapsed milliseconds since start, as reported in response headers.
    pub fn elapsed_ms(&self) -> u128 {
        self.elapsed().as_millis()
    }

    /// Time from request start to a phase.
    pub fn time_to(&self, phase: LifecyclePhase) -> Option<Duration> {
        self.marks
            .get(&phase)
            .map(|t| t.duration_since(self.start))
    }
}

impl Default for TimingContext {
    fn default() -> Self {
        Self::new()
    }
}
