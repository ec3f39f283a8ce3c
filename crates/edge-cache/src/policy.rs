//! Cacheability and TTL rules.

use std::time::Duration;

use edge_core::{BufferedResponse, EdgeRequest};
use http::{Method, Uri};
use serde::{Deserialize, Serialize};

use crate::key::{compute_cache_key, CacheKey};

const ONE_YEAR_SECS: u64 = 31_536_000;
const THIRTY_DAYS_SECS: u64 = 2_592_000;
const ONE_HOUR_SECS: u64 = 3_600;

/// Path prefixes, TTLs and key defaults for the cache policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CachePolicyConfig {
    /// Paths under these prefixes are never cached (API routes).
    pub excluded_prefixes: Vec<String>,
    /// Fingerprinted build assets; cacheable even with a query string.
    pub static_asset_prefix: String,
    /// Generic static files.
    pub static_prefix: String,
    /// Images.
    pub image_prefix: String,
    /// TTL for fingerprinted build assets.
    pub static_asset_ttl_secs: u64,
    /// TTL for generic static files.
    pub static_ttl_secs: u64,
    /// TTL for images.
    pub image_ttl_secs: u64,
    /// TTL for everything else (HTML pages).
    pub page_ttl_secs: u64,
    /// Country used in the cache key when the platform supplies none.
    pub default_country: String,
    /// Request header consulted for the country when geo info is absent.
    pub country_header: Option<String>,
    /// Methods that may be answered from the cache. Only GET responses are
    /// ever stored.
    pub cacheable_methods: Vec<String>,
}

impl Default for CachePolicyConfig {
    fn default() -> Self {
        Self {
            excluded_prefixes: vec!["/api/".to_string()],
            static_asset_prefix: "/_next/static/".to_string(),
            static_prefix: "/static/".to_string(),
            image_prefix: "/images/".to_string(),
            static_asset_ttl_secs: ONE_YEAR_SECS,
            static_ttl_secs: THIRTY_DAYS_SECS,
            image_ttl_secs: THIRTY_DAYS_SECS,
            page_ttl_secs: ONE_HOUR_SECS,
            default_country: "US".to_string(),
            country_header: Some("cf-ipcountry".to_string()),
            cacheable_methods: vec!["GET".to_string(), "HEAD".to_string()],
        }
    }
}

/// Classification of a request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathClass {
    /// Under an excluded prefix; never cached.
    Excluded,
    /// Fingerprinted build asset.
    StaticAsset,
    /// Generic static file.
    Static,
    /// Image.
    Image,
    /// Anything else, cached only when it is HTML.
    Page,
}

impl PathClass {
    /// Classify a path. Excluded prefixes win over every other class.
    pub fn classify(path: &str, config: &CachePolicyConfig) -> Self {
        if config
            .excluded_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
        {
            Self::Excluded
        } else if path.starts_with(&config.static_asset_prefix) {
            Self::StaticAsset
        } else if path.starts_with(&config.static_prefix) {
            Self::Static
        } else if path.starts_with(&config.image_prefix) {
            Self::Image
        } else {
            Self::Page
        }
    }

    /// Whether the class is cacheable regardless of content type.
    pub fn is_asset(&self) -> bool {
        matches!(self, Self::StaticAsset | Self::Static | Self::Image)
    }

    /// Stable name for logs and CLI output.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Excluded => "excluded",
            Self::StaticAsset => "static_asset",
            Self::Static => "static",
            Self::Image => "image",
            Self::Page => "page",
        }
    }
}

/// Why a response was or was not cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheDecision {
    /// Path under an excluded prefix.
    ExcludedPath,
    /// Status 400 or above.
    ErrorStatus,
    /// Query string on a path outside the static-asset prefix.
    DynamicQuery,
    /// Static, image or build asset path.
    AssetPath,
    /// HTML content.
    HtmlContent,
    /// Nothing made it cacheable.
    NotCacheable,
}

impl CacheDecision {
    /// Whether the decision allows storing the response.
    pub fn is_cacheable(&self) -> bool {
        matches!(self, Self::AssetPath | Self::HtmlContent)
    }

    /// Human-readable reason.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::ExcludedPath => "path is under an excluded prefix",
            Self::ErrorStatus => "origin status is 400 or above",
            Self::DynamicQuery => "query string outside the static-asset prefix",
            Self::AssetPath => "static asset, static file or image path",
            Self::HtmlContent => "HTML content",
            Self::NotCacheable => "not an asset path and not HTML",
        }
    }
}

/// The cache policy evaluator.
#[derive(Debug, Clone, Default)]
pub struct CachePolicy {
    config: CachePolicyConfig,
}

impl CachePolicy {
    /// Create a policy from configuration.
    pub fn new(config: CachePolicyConfig) -> Self {
        Self { config }
    }

    /// Get the configuration.
    pub fn config(&self) -> &CachePolicyConfig {
        &self.config
    }

    /// Compute the cache key for a request.
    pub fn cache_key(&self, request: &EdgeRequest) -> CacheKey {
        compute_cache_key(request, &self.config)
    }

    /// Classify a path.
    pub fn classify(&self, path: &str) -> PathClass {
        PathClass::classify(path, &self.config)
    }

    /// Whether requests with this method take part in caching at all.
    pub fn is_cacheable_method(&self, method: &Method) -> bool {
        self.config
            .cacheable_methods
            .iter()
            .any(|m| m.eq_ignore_ascii_case(method.as_str()))
    }

    /// Whether a response to this method may be written to the cache.
    ///
    /// HEAD responses have no body, so only GET fills entries; HEAD is
    /// answered from those entries with the body stripped.
    pub fn is_storable_method(&self, method: &Method) -> bool {
        method == Method::GET && self.is_cacheable_method(method)
    }

    /// Decide whether a response may be stored, with the reason.
    pub fn decide(&self, uri: &Uri, response: &BufferedResponse) -> CacheDecision {
        let class = self.classify(uri.path());

        if class == PathClass::Excluded {
            return CacheDecision::ExcludedPath;
        }

        if response.status.as_u16() >= 400 {
            return CacheDecision::ErrorStatus;
        }

        let has_query = uri.query().is_some();
        if has_query && class != PathClass::StaticAsset {
            return CacheDecision::DynamicQuery;
        }

        if class.is_asset() {
            return CacheDecision::AssetPath;
        }

        let is_html = response
            .content_type()
            .map(|ct| ct.to_ascii_lowercase().contains("text/html"))
            .unwrap_or(false);
        if is_html {
            return CacheDecision::HtmlContent;
        }

        CacheDecision::NotCacheable
    }

    /// Whether a response may be stored.
    pub fn should_cache(&self, uri: &Uri, response: &BufferedResponse) -> bool {
        self.decide(uri, response).is_cacheable()
    }

    /// TTL for a cacheable path.
    pub fn ttl_for_path(&self, path: &str) -> Duration {
        let secs = match self.classify(path) {
            PathClass::StaticAsset => self.config.static_asset_ttl_secs,
            PathClass::Static => self.config.static_ttl_secs,
            PathClass::Image => self.config.image_ttl_secs,
            PathClass::Page | PathClass::Excluded => self.config.page_ttl_secs,
        };
        Duration::from_secs(secs)
    }

    /// Cache-Control value stamped on stored responses.
    pub fn cache_control(ttl: Duration) -> String {
        format!("public, max-age={}", ttl.as_secs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
    use http::StatusCode;

    fn response(status: u16, content_type: Option<&'static str>) -> BufferedResponse {
        let mut headers = HeaderMap::new();
        if let Some(ct) = content_type {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(ct));
        }
        BufferedResponse::new(StatusCode::from_u16(status).unwrap(), headers, Bytes::new())
    }

    fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }

    #[test]
    fn test_classify() {
        let config = CachePolicyConfig::default();
        assert_eq!(PathClass::classify("/api/health", &config), PathClass::Excluded);
        assert_eq!(
            PathClass::classify("/_next/static/chunk.js", &config),
            PathClass::StaticAsset
        );
        assert_eq!(PathClass::classify("/static/logo.svg", &config), PathClass::Static);
        assert_eq!(PathClass::classify("/images/a.png", &config), PathClass::Image);
        assert_eq!(PathClass::classify("/about", &config), PathClass::Page);
        // Prefix match needs the trailing slash
        assert_eq!(PathClass::classify("/api", &config), PathClass::Page);
    }

    #[test]
    fn test_api_paths_never_cached() {
        let policy = CachePolicy::default();
        for status in [200, 204, 301, 404, 500] {
            assert!(!policy.should_cache(
                &uri("https://example.com/api/health"),
                &response(status, Some("text/html"))
            ));
        }
        assert!(!policy.should_cache(
            &uri("https://example.com/api/users/1"),
            &response(200, Some("application/json"))
        ));
    }

    #[test]
    fn test_error_statuses_never_cached() {
        let policy = CachePolicy::default();
        for path in ["/_next/static/app.js", "/images/a.png", "/about"] {
            for status in [400, 404, 500, 503] {
                let target = format!("https://example.com{}", path);
                assert!(!policy.should_cache(&uri(&target), &response(status, Some("text/html"))));
            }
        }
        assert_eq!(
            policy.decide(&uri("https://example.com/about"), &response(404, Some("text/html"))),
            CacheDecision::ErrorStatus
        );
    }

    #[test]
    fn test_html_is_cached() {
        let policy = CachePolicy::default();
        let decision = policy.decide(
            &uri("https://example.com/about"),
            &response(200, Some("text/html; charset=utf-8")),
        );
        assert_eq!(decision, CacheDecision::HtmlContent);
        assert!(decision.is_cacheable());
    }

    #[test]
    fn test_non_html_page_not_cached() {
        let policy = CachePolicy::default();
        assert_eq!(
            policy.decide(
                &uri("https://example.com/feed"),
                &response(200, Some("application/json"))
            ),
            CacheDecision::NotCacheable
        );
        assert!(!policy.should_cache(&uri("https://example.com/about"), &response(200, None)));
    }

    #[test]
    fn test_query_string_only_allowed_on_static_assets() {
        let policy = CachePolicy::default();

        assert!(policy.should_cache(
            &uri("https://example.com/_next/static/app.js?v=3"),
            &response(200, Some("application/javascript"))
        ));
        assert_eq!(
            policy.decide(
                &uri("https://example.com/images/a.png?w=200"),
                &response(200, Some("image/png"))
            ),
            CacheDecision::DynamicQuery
        );
        assert!(!policy.should_cache(
            &uri("https://example.com/search?q=shoes"),
            &response(200, Some("text/html"))
        ));
    }

    #[test]
    fn test_asset_paths_cached_regardless_of_content_type() {
        let policy = CachePolicy::default();
        assert_eq!(
            policy.decide(
                &uri("https://example.com/static/robots.txt"),
                &response(200, Some("text/plain"))
            ),
            CacheDecision::AssetPath
        );
        assert!(policy.should_cache(
            &uri("https://example.com/images/a.png"),
            &response(304, None)
        ));
    }

    #[test]
    fn test_ttl_for_path() {
        let policy = CachePolicy::default();
        assert_eq!(policy.ttl_for_path("/_next/static/chunk.js").as_secs(), 31_536_000);
        assert_eq!(policy.ttl_for_path("/static/font.woff2").as_secs(), 2_592_000);
        assert_eq!(policy.ttl_for_path("/images/a.png").as_secs(), 2_592_000);
        assert_eq!(policy.ttl_for_path("/about").as_secs(), 3_600);
    }

    #[test]
    fn test_cache_control() {
        assert_eq!(
            CachePolicy::cache_control(Duration::from_secs(3600)),
            "public, max-age=3600"
        );
    }

    #[test]
    fn test_cacheable_methods() {
        let policy = CachePolicy::default();
        assert!(policy.is_cacheable_method(&Method::GET));
        assert!(policy.is_cacheable_method(&Method::HEAD));
        assert!(!policy.is_cacheable_method(&Method::POST));
        assert!(!policy.is_cacheable_method(&Method::DELETE));
    }

    #[test]
    fn test_only_get_is_storable() {
        let policy = CachePolicy::default();
        assert!(policy.is_storable_method(&Method::GET));
        assert!(!policy.is_storable_method(&Method::HEAD));
        assert!(!policy.is_storable_method(&Method::POST));

        let head_only = CachePolicy::new(CachePolicyConfig {
            cacheable_methods: vec!["HEAD".to_string()],
            ..Default::default()
        });
        assert!(!head_only.is_storable_method(&Method::GET));
    }

    #[test]
    fn test_custom_prefixes() {
        let config = CachePolicyConfig {
            excluded_prefixes: vec!["/api/".to_string(), "/admin/".to_string()],
            page_ttl_secs: 60,
            ..Default::default()
        };
        let policy = CachePolicy::new(config);

        assert!(!policy.should_cache(
            &uri("https://example.com/admin/users"),
            &response(200, Some("text/html"))
        ));
        assert_eq!(policy.ttl_for_path("/pricing").as_secs(), 60);
    }

    #[test]
    fn test_config_deserialize_partial() {
        let config: CachePolicyConfig =
            serde_json::from_str(r#"{"page_ttl_secs": 120, "default_country": "DE"}"#).unwrap();

        assert_eq!(config.page_ttl_secs, 120);
        assert_eq!(config.default_country, "DE");
        assert_eq!(config.static_asset_prefix, "/_next/static/");
        assert_eq!(config.excluded_prefixes, vec!["/api/".to_string()]);
    }
}
