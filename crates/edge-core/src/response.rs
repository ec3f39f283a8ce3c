//! Origin and cached responses.

use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use http::StatusCode;

use crate::body::{Body, BodyError};

/// A response whose body may still be an unread stream.
#[derive(Debug)]
pub struct EdgeResponse {
    /// HTTP status code.
    pub status: StatusCode,
    /// HTTP headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Body,
}

impl EdgeResponse {
    /// Create an empty response with the given status.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Body::Empty,
        }
    }

    /// Create a 200 response.
    pub fn ok() -> Self {
        Self::new(StatusCode::OK)
    }

    /// Add a header.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set the body.
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Content-Type header value, if present and readable.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    /// Read the body once and return a response that can be cloned freely.
    pub async fn into_buffered(self) -> Result<BufferedResponse, BodyError> {
        let body = self.body.collect().await?;
        Ok(BufferedResponse {
            status: self.status,
            headers: self.headers,
            body,
        })
    }
}

impl From<BufferedResponse> for EdgeResponse {
    fn from(buffered: BufferedResponse) -> Self {
        Self {
            status: buffered.status,
            headers: buffered.headers,
            body: Body::Full(buffered.body),
        }
    }
}

/// A response with its body held in memory.
///
/// Cloning shares the underlying buffer, so one copy can go back to the
/// client while another is written to the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferedResponse {
    /// HTTP status code.
    pub status: StatusCode,
    /// HTTP headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Bytes,
}

impl BufferedResponse {
    /// Create a buffered response.
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Content-Type header value, if present and readable.
    pub fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE.as_str())
    }

    /// Get a header value as text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Set a header, replacing any existing value.
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    /// Body as UTF-8 text, if it is valid UTF-8.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Replace the body and keep `Content-Length` in step with it.
    pub fn replace_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
        if self.headers.contains_key(CONTENT_LENGTH) {
            self.headers
                .insert(CONTENT_LENGTH, HeaderValue::from(self.body.len()));
        }
    }
}
