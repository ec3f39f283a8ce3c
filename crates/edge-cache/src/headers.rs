//! Cache diagnostic headers.

use std::time::Duration;

use edge_core::BufferedResponse;
use http::header::{HeaderName, HeaderValue, CACHE_CONTROL};
use serde::{Deserialize, Serialize};

use crate::policy::CachePolicy;

/// Header names for cache diagnostics.
pub mod header_names {
    /// Cache status header (HIT, MISS, BYPASS).
    pub const CF_CACHE_STATUS: &str = "cf-cache-status";
    /// Time spent in the worker, in milliseconds.
    pub const CF_RESPONSE_TIME: &str = "cf-response-time";
}

/// Status of a request as reported to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CacheStatus {
    /// Served from the cache store.
    Hit,
    /// Fetched from origin and scheduled for storage.
    Miss,
    /// Fetched from origin and not stored.
    Bypass,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hit => "HIT",
            Self::Miss => "MISS",
            Self::Bypass => "BYPASS",
        }
    }
}

impl std::fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Set `CF-Cache-Status` and `CF-Response-Time` on a response.
pub fn stamp_diagnostics(response: &mut BufferedResponse, status: CacheStatus, elapsed_ms: u128) {
    response.set_header(
        HeaderName::from_static(header_names::CF_CACHE_STATUS),
        HeaderValue::from_static(status.as_str()),
    );
    // Digits only, always a valid header value
    if let Ok(value) = HeaderValue::from_str(&elapsed_ms.to_string()) {
        response.set_header(HeaderName::from_static(header_names::CF_RESPONSE_TIME), value);
    }
}

/// Set `Cache-Control: public, max-age=<ttl>` on a response.
pub fn stamp_cache_control(response: &mut BufferedResponse, ttl: Duration) {
    if let Ok(value) = HeaderValue::from_str(&CachePolicy::cache_control(ttl)) {
        response.set_header(CACHE_CONTROL, value);
    }
}
