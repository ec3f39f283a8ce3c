//! Config file discovery and templates.

use std::path::{Path, PathBuf};

/// File names searched for, in order, in each directory.
pub const CONFIG_NAMES: [&str; 3] = ["edge-cache.toml", ".edge-cache.toml", "edge-cache.json"];

/// Find a config file in `start` or its parent directories.
pub fn find_config(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        for name in &CONFIG_NAMES {
            let candidate = current.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Generate a default edge-cache.toml with every setting spelled out.
pub fn generate_default_config() -> String {
    r#"# Edge cache configuration

[policy]
# Never cached
excluded_prefixes = ["/api/"]
# Fingerprinted build output; cached even with a query string
static_asset_prefix = "/_next/static/"
static_prefix = "/static/"
image_prefix = "/images/"
static_asset_ttl_secs = 31536000
static_ttl_secs = 2592000
image_ttl_secs = 2592000
page_ttl_secs = 3600
# Used when neither geo info nor the country header is present
default_country = "US"
country_header = "cf-ipcountry"
cacheable_methods = ["GET", "HEAD"]

[transforms]
enabled = true
image_vary = true
html_hints = true
dns_prefetch = ["//fonts.googleapis.com", "//www.googletagmanager.com"]
preconnect = ["https://vitals.vercel-analytics.com"]
preload_stylesheet = "/_next/static/css/app.css"
minify_css = true
minify_js = true

[logging]
# trace, debug, info, warn, error
level = "info"
# json or human
format = "json"
"#
    .to_string()
}
