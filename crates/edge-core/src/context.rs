//! Inbound request context.

use std::sync::atomic::{AtomicU32, Ordering};

use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::{Method, Uri};
use serde::{Deserialize, Serialize};

use crate::lifecycle::TimingContext;

/// Unique request identifier for tracing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl RequestId {
    /// Generate a new request ID.
    pub fn generate() -> Self {
        static COUNTER: AtomicU32 = AtomicU32::new(0);

        let id = format!(
            "{:x}-{:x}-{:x}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos(),
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        Self(id)
    }

    /// Create from an existing ID string.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Geographic information supplied by the edge location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoInfo {
    /// ISO country code (e.g., "US").
    pub country: Option<String>,
}

impl GeoInfo {
    /// Geo info carrying only a country code.
    pub fn country(code: impl Into<String>) -> Self {
        Self {
            country: Some(code.into()),
        }
    }
}

/// Error building a request.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("Invalid URI: {0}")]
    InvalidUri(#[from] http::uri::InvalidUri),

    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    #[error("Invalid header value for '{0}'")]
    InvalidHeaderValue(String),

    #[error("Invalid method: {0}")]
    InvalidMethod(#[from] http::method::InvalidMethod),
}

/// An inbound request as seen by the edge worker.
#[derive(Debug, Clone)]
pub struct EdgeRequest {
    /// Unique request identifier.
    pub request_id: RequestId,
    /// HTTP method.
    pub method: Method,
    /// Request URI, absolute when the platform provides scheme and host.
    pub uri: Uri,
    /// HTTP headers.
    pub headers: HeaderMap,
    /// Geographic information, if the platform provides it.
    pub geo: Option<GeoInfo>,
    /// Timing context for observability.
    pub timing: TimingContext,
}

impl EdgeRequest {
    /// Create a new request.
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            request_id: RequestId::generate(),
            method,
            uri,
            headers: HeaderMap::new(),
            geo: None,
            timing: TimingContext::new(),
        }
    }

    /// Create a GET request by parsing a URL.
    pub fn get(url: &str) -> Result<Self, RequestError> {
        Ok(Self::new(Method::GET, url.parse()?))
    }

    /// Create a request from string parts.
    pub fn parse(method: &str, url: &str) -> Result<Self, RequestError> {
        let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())?;
        Ok(Self::new(method, url.parse()?))
    }

    /// Add a header.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Add a header from strings.
    pub fn try_with_header(mut self, name: &str, value: &str) -> Result<Self, RequestError> {
        let header_name = HeaderName::from_bytes(name.as_bytes())?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|_| RequestError::InvalidHeaderValue(name.to_string()))?;
        self.headers.insert(header_name, header_value);
        Ok(self)
    }

    /// Set geo information.
    pub fn with_geo(mut self, geo: GeoInfo) -> Self {
        self.geo = Some(geo);
        self
    }

    /// Request path.
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Raw query string, without the leading `?`.
    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// Full URL as received.
    pub fn href(&self) -> String {
        self.uri.to_string()
    }

    /// Get a header value as text. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Country code from geo info, if present and non-empty.
    pub fn geo_country(&self) -> Option<&str> {
        self.geo
            .as_ref()
            .and_then(|g| g.country.as_deref())
            .filter(|c| !c.is_empty())
    }
}
