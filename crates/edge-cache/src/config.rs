//! Worker configuration file.

use std::path::{Path, PathBuf};

use edge_observability::{LogFormat, LogLevel};
use http::Method;
use serde::{Deserialize, Serialize};

use crate::key::is_country_code;
use crate::policy::CachePolicyConfig;
use crate::transform::TransformConfig;

/// Errors loading, saving or validating a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML config: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("failed to encode TOML config: {0}")]
    TomlEncode(#[from] toml::ser::Error),

    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Logging settings for the worker's summary lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum level emitted.
    pub level: LogLevel,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Json,
        }
    }
}

/// Complete worker configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeCacheConfig {
    /// Cacheability, TTL and key rules.
    pub policy: CachePolicyConfig,
    /// Response transforms.
    pub transforms: TransformConfig,
    /// Summary log output.
    pub logging: LoggingConfig,
}

impl EdgeCacheConfig {
    /// Load and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a config file without validating it. `.json` files are JSON,
    /// anything else TOML.
    pub fn read(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        if is_json(path) {
            Self::from_json(&content)
        } else {
            Self::from_toml(&content)
        }
    }

    /// Parse a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Parse a JSON document.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Write the config, choosing the format from the extension.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = if is_json(path) {
            serde_json::to_string_pretty(self)?
        } else {
            toml::to_string_pretty(self)?
        };

        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Every problem found in the config. Empty when valid.
    pub fn problems(&self) -> Vec<String> {
        let policy = &self.policy;
        let mut problems = Vec::new();

        let prefixes = policy
            .excluded_prefixes
            .iter()
            .map(|p| ("excluded_prefixes", p))
            .chain([
                ("static_asset_prefix", &policy.static_asset_prefix),
                ("static_prefix", &policy.static_prefix),
                ("image_prefix", &policy.image_prefix),
            ]);
        for (field, prefix) in prefixes {
            if !prefix.starts_with('/') {
                problems.push(format!("policy.{} '{}' must start with '/'", field, prefix));
            }
        }

        for (field, ttl) in [
            ("static_asset_ttl_secs", policy.static_asset_ttl_secs),
            ("static_ttl_secs", policy.static_ttl_secs),
            ("image_ttl_secs", policy.image_ttl_secs),
            ("page_ttl_secs", policy.page_ttl_secs),
        ] {
            if ttl == 0 {
                problems.push(format!("policy.{} must be greater than zero", field));
            }
        }

        let country = &policy.default_country;
        if !is_country_code(country) {
            problems.push(format!(
                "policy.default_country '{}' must be a two-letter country code",
                country
            ));
        }

        for method in &policy.cacheable_methods {
            let problem = if Method::from_bytes(method.as_bytes()).is_err() {
                "is not an HTTP method"
            } else if !["GET", "HEAD"].iter().any(|m| m.eq_ignore_ascii_case(method)) {
                "must be GET or HEAD"
            } else {
                continue;
            };
            problems.push(format!("policy.cacheable_methods '{}' {}", method, problem));
        }

        problems
    }

    /// Fail with every problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let problems = self.problems();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().map(|ext| ext == "json").unwrap_or(false)
}
