//! Cache key composition.

use edge_core::EdgeRequest;
use http::header::{ACCEPT, USER_AGENT};
use serde::{Deserialize, Serialize};

use crate::policy::CachePolicyConfig;

/// Device class used to partition cache entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Desktop,
    Mobile,
    Tablet,
}

impl DeviceType {
    /// Detect device type from a User-Agent header.
    ///
    /// Tablet markers win over mobile ones, since iPad and Android tablet
    /// agents also carry "Mobile".
    pub fn from_user_agent(ua: &str) -> Self {
        let ua_lower = ua.to_lowercase();

        if ua_lower.contains("ipad") || ua_lower.contains("tablet") {
            return Self::Tablet;
        }

        if ua_lower.contains("mobile")
            || ua_lower.contains("android")
            || ua_lower.contains("iphone")
        {
            return Self::Mobile;
        }

        Self::Desktop
    }

    /// Detect device type from an optional header; absent means desktop.
    pub fn from_header(ua: Option<&str>) -> Self {
        ua.map(Self::from_user_agent).unwrap_or(Self::Desktop)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Desktop => "desktop",
            Self::Mobile => "mobile",
            Self::Tablet => "tablet",
        }
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The request fields a cache key is derived from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyParts {
    /// Absolute URL including the query string.
    pub url: String,
    /// ISO country code.
    pub country: String,
    /// Device class.
    pub device: DeviceType,
    /// Whether the client accepts WebP images.
    pub accepts_webp: bool,
}

/// A cache key uniquely identifying a cached response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// The computed key string.
    key: String,
    /// Fields the key was derived from.
    parts: KeyParts,
}

impl CacheKey {
    /// Build a key from its parts.
    pub fn from_parts(parts: KeyParts) -> Self {
        let key = format!(
            "{}:{}:{}:{}",
            parts.url, parts.country, parts.device, parts.accepts_webp
        );
        Self { key, parts }
    }

    /// Get the key string.
    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// Get the fields the key was derived from.
    pub fn parts(&self) -> &KeyParts {
        &self.parts
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key)
    }
}

/// Whether a value is a two-letter ASCII country code.
pub(crate) fn is_country_code(value: &str) -> bool {
    value.len() == 2 && value.bytes().all(|b| b.is_ascii_alphabetic())
}

fn country_code(value: &str) -> Option<String> {
    let value = value.trim();
    is_country_code(value).then(|| value.to_ascii_uppercase())
}

/// Compute the cache key for a request.
///
/// Missing or unreadable headers fall back to defaults: the configured
/// country, desktop, and no WebP support. A country that is not a
/// two-letter code is ignored, so the key suffix after the URL always has
/// the same shape.
pub fn compute_cache_key(request: &EdgeRequest, config: &CachePolicyConfig) -> CacheKey {
    let country = request
        .geo_country()
        .and_then(country_code)
        .or_else(|| {
            config
                .country_header
                .as_deref()
                .and_then(|name| request.header(name))
                .and_then(country_code)
        })
        .unwrap_or_else(|| config.default_country.to_ascii_uppercase());

    let device = DeviceType::from_header(request.header(USER_AGENT.as_str()));

    let accepts_webp = request
        .header(ACCEPT.as_str())
        .map(|accept| accept.contains("image/webp"))
        .unwrap_or(false);

    CacheKey::from_parts(KeyParts {
        url: request.href(),
        country,
        device,
        accepts_webp,
    })
}
