//! Cache timing metrics and counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use edge_core::RequestId;
use serde::{Deserialize, Serialize};

/// Metrics for a single request through the cache worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMetrics {
    /// Request ID for correlation.
    pub request_id: String,
    /// Request path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Cache status reported to the client (HIT, MISS, BYPASS).
    pub cache_status: String,
    /// HTTP status code returned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// TTL assigned to the stored entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,
    /// Transform applied before storage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
    /// Cache lookup duration (microseconds).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lookup_us: Option<u64>,
    /// Origin fetch duration including body buffering (microseconds).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_us: Option<u64>,
    /// Transform duration (microseconds).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transform_us: Option<u64>,
    /// Response body size in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_bytes: Option<usize>,
    /// Total request duration (microseconds).
    pub total_duration_us: u64,
}

/// Collector for request metrics.
#[derive(Debug)]
pub struct MetricsCollector {
    request_id: RequestId,
    path: Option<String>,
    start: Instant,
    ttl: Option<Duration>,
    transform: Option<String>,
    lookup: Option<Duration>,
    origin: Option<Duration>,
    transform_duration: Option<Duration>,
    body_bytes: Option<usize>,
}

impl MetricsCollector {
    /// Create a new metrics collector.
    pub fn new(request_id: RequestId) -> Self {
        Self {
            request_id,
            path: None,
            start: Instant::now(),
            ttl: None,
            transform: None,
            lookup: None,
            origin: None,
            transform_duration: None,
            body_bytes: None,
        }
    }

    /// Set request path.
    pub fn set_path(&mut self, path: impl Into<String>) {
        self.path = Some(path.into());
    }

    /// Record the cache lookup duration.
    pub fn record_lookup(&mut self, duration: Duration) {
        self.lookup = Some(duration);
    }

    /// Record the origin fetch duration and body size.
    pub fn record_origin(&mut self, duration: Duration, body_bytes: usize) {
        self.origin = Some(duration);
        self.body_bytes = Some(body_bytes);
    }

    /// Record the transform applied and how long it took.
    pub fn record_transform(&mut self, kind: impl Into<String>, duration: Duration) {
        self.transform = Some(kind.into());
        self.transform_duration = Some(duration);
    }

    /// Record the TTL assigned to the stored entry.
    pub fn record_ttl(&mut self, ttl: Duration) {
        self.ttl = Some(ttl);
    }

    /// Finalize and return the metrics.
    pub fn finalize(self, cache_status: impl Into<String>, status_code: Option<u16>) -> RequestMetrics {
        RequestMetrics {
            request_id: self.request_id.to_string(),
            path: self.path,
            cache_status: cache_status.into(),
            status_code,
            ttl_secs: self.ttl.map(|t| t.as_secs()),
            transform: self.transform,
            lookup_us: self.lookup.map(as_micros),
            origin_us: self.origin.map(as_micros),
            transform_us: self.transform_duration.map(as_micros),
            body_bytes: self.body_bytes,
            total_duration_us: as_micros(self.start.elapsed()),
        }
    }
}

fn as_micros(d: Duration) -> u64 {
    d.as_micros() as u64
}

impl RequestMetrics {
    /// Format as human-readable summary.
    pub fn to_summary(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!(
            "Request: {} [{}]",
            self.request_id, self.cache_status
        ));

        if let Some(ref path) = self.path {
            lines.push(format!("  Path: {}", path));
        }
        if let Some(status) = self.status_code {
            lines.push(format!("  Status: {}", status));
        }
        if let Some(ttl) = self.ttl_secs {
            lines.push(format!("  TTL: {}s", ttl));
        }
        if let Some(lookup) = self.lookup_us {
            lines.push(format!("  Lookup: {}us", lookup));
        }
        if let Some(origin) = self.origin_us {
            lines.push(format!("  Origin: {}us ({:.2}ms)", origin, origin as f64 / 1000.0));
        }
        if let (Some(kind), Some(us)) = (&self.transform, self.transform_us) {
            lines.push(format!("  Transform: {} in {}us", kind, us));
        }
        lines.push(format!(
            "  Total: {}us ({:.2}ms)",
            self.total_duration_us,
            self.total_duration_us as f64 / 1000.0
        ));

        lines.join("\n")
    }
}

/// Process-wide cache counters.
#[derive(Debug, Default)]
pub struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    bypasses: AtomicU64,
    stores: AtomicU64,
    store_failures: AtomicU64,
    lookup_errors: AtomicU64,
}

impl CacheCounters {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bypass(&self) {
        self.bypasses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed background write.
    pub fn record_store(&self) {
        self.stores.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_failure(&self) {
        self.store_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lookup_error(&self) {
        self.lookup_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            bypasses: self.bypasses.load(Ordering::Relaxed),
            stores: self.stores.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
            lookup_errors: self.lookup_errors.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of [`CacheCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub bypasses: u64,
    pub stores: u64,
    pub store_failures: u64,
    pub lookup_errors: u64,
}

impl CounterSnapshot {
    /// Total requests seen.
    pub fn total(&self) -> u64 {
        self.hits + self.misses + self.bypasses
    }

    /// Hits over cacheable lookups (hits + misses). Zero when nothing was looked up.
    pub fn hit_ratio(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}
