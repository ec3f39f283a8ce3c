//! Origin fetch capability.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use edge_core::{Body, BodyError, EdgeRequest, EdgeResponse};
use http::header::{HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use http::{Method, StatusCode};
use serde::{Deserialize, Serialize};

/// Error type for origin fetches.
#[derive(Debug, thiserror::Error)]
pub enum OriginError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Invalid origin response: {0}")]
    InvalidResponse(String),
}

/// Retrieves uncached responses from the backing application.
#[async_trait]
pub trait Origin: Send + Sync {
    /// Fetch the response for a request.
    async fn fetch(&self, request: &EdgeRequest) -> Result<EdgeResponse, OriginError>;
}

#[async_trait]
impl<T: Origin + ?Sized> Origin for Arc<T> {
    async fn fetch(&self, request: &EdgeRequest) -> Result<EdgeResponse, OriginError> {
        (**self).fetch(request).await
    }
}

/// A canned origin response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginRoute {
    /// HTTP status code.
    #[serde(default = "default_status")]
    pub status: u16,
    /// Response headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Response body.
    #[serde(default)]
    pub body: String,
    /// Serve the body as a chunked stream instead of a buffered body.
    #[serde(default)]
    pub chunked: bool,
}

fn default_status() -> u16 {
    200
}

impl OriginRoute {
    /// A route with the given status, content type and body.
    pub fn new(status: u16, content_type: &str, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: BTreeMap::from([("content-type".to_string(), content_type.to_string())]),
            body: body.into(),
            chunked: false,
        }
    }

    /// A 200 HTML route.
    pub fn html(body: impl Into<String>) -> Self {
        Self::new(200, "text/html; charset=utf-8", body)
    }

    /// Add a header.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    /// Serve the body as a stream.
    pub fn chunked(mut self) -> Self {
        self.chunked = true;
        self
    }

    /// Build the response for this route.
    pub fn to_response(&self) -> Result<EdgeResponse, OriginError> {
        let status = StatusCode::from_u16(self.status)
            .map_err(|_| OriginError::InvalidResponse(format!("status {}", self.status)))?;

        let mut response = EdgeResponse::new(status);
        for (name, value) in &self.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| OriginError::InvalidResponse(format!("header name '{}'", name)))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|_| OriginError::InvalidResponse(format!("header value for '{}'", name)))?;
            response.headers.insert(header_name, header_value);
        }

        response.body = if self.chunked {
            let chunks: Vec<_> = self
                .body
                .as_bytes()
                .chunks(16)
                .map(|c| Ok::<_, BodyError>(Bytes::copy_from_slice(c)))
                .collect();
            Body::from_stream(futures::stream::iter(chunks))
        } else {
            Body::from(self.body.clone())
        };

        Ok(response)
    }
}

const NOT_FOUND_BODY: &str = "Not Found";

/// Origin serving canned responses by exact path.
///
/// Unknown paths get a 404. HEAD gets the headers and `Content-Length` of
/// the matching GET with no body. Every fetch is counted so callers can
/// check which requests reached the origin.
#[derive(Debug, Default)]
pub struct StaticOrigin {
    routes: HashMap<String, OriginRoute>,
    fetches: AtomicUsize,
}

impl StaticOrigin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route.
    pub fn route(mut self, path: impl Into<String>, route: OriginRoute) -> Self {
        self.routes.insert(path.into(), route);
        self
    }

    /// Build from a path → route map.
    pub fn from_routes(routes: HashMap<String, OriginRoute>) -> Self {
        Self {
            routes,
            fetches: AtomicUsize::new(0),
        }
    }

    /// Number of fetches served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Origin for StaticOrigin {
    async fn fetch(&self, request: &EdgeRequest) -> Result<EdgeResponse, OriginError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let (mut response, length) = match self.routes.get(request.path()) {
            Some(route) => (route.to_response()?, route.body.len()),
            None => (
                EdgeResponse::new(StatusCode::NOT_FOUND)
                    .with_header(CONTENT_TYPE, HeaderValue::from_static("text/plain"))
                    .with_body(NOT_FOUND_BODY),
                NOT_FOUND_BODY.len(),
            ),
        };

        if request.method == Method::HEAD {
            response.headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
            response.body = Body::Empty;
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_known_route() {
        let origin = StaticOrigin::new().route("/about", OriginRoute::html("<h1>About</h1>"));
        let request = EdgeRequest::get("https://example.com/about?ref=nav").unwrap();

        let response = origin.fetch(&request).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.content_type(), Some("text/html; charset=utf-8"));

        let buffered = response.into_buffered().await.unwrap();
        assert_eq!(buffered.text(), Some("<h1>About</h1>"));
        assert_eq!(origin.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let origin = StaticOrigin::new();
        let request = EdgeRequest::get("https://example.com/missing").unwrap();

        let response = origin.fetch(&request).await.unwrap();
        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_head_has_length_but_no_body() {
        let origin = StaticOrigin::new().route("/about", OriginRoute::html("<h1>About</h1>"));
        let request = EdgeRequest::parse("HEAD", "https://example.com/about").unwrap();

        let buffered = origin
            .fetch(&request)
            .await
            .unwrap()
            .into_buffered()
            .await
            .unwrap();
        assert_eq!(buffered.status, StatusCode::OK);
        assert!(buffered.body.is_empty());
        assert_eq!(buffered.header("content-length"), Some("14"));
    }

    #[tokio::test]
    async fn test_chunked_route_streams() {
        let body = "x".repeat(50);
        let route = OriginRoute::new(200, "text/plain", body.clone()).chunked();

        let response = route.to_response().unwrap();
        assert!(matches!(response.body, Body::Stream(_)));

        let buffered = response.into_buffered().await.unwrap();
        assert_eq!(buffered.text(), Some(body.as_str()));
    }

    #[test]
    fn test_invalid_status() {
        let route = OriginRoute {
            status: 1000,
            ..OriginRoute::html("")
        };
        assert!(matches!(
            route.to_response(),
            Err(OriginError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_route_deserialize_defaults() {
        let route: OriginRoute = serde_json::from_str(r#"{"body": "hi"}"#).unwrap();
        assert_eq!(route.status, 200);
        assert!(route.headers.is_empty());
        assert!(!route.chunked);
    }
}
