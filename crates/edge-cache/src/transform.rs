//! Response transforms applied before a response is stored.
//!
//! These are plain text rewrites, not parsers. The HTML hints are inserted
//! at the first literal `<head>` / `</head>`, and the CSS/JS minifier only
//! strips comments and collapses whitespace. The JavaScript pass drops
//! everything after `//` on a line, including inside string literals, so it
//! is only suitable for bundles that are already minified.

use std::sync::LazyLock;

use edge_core::BufferedResponse;
use http::header::{HeaderValue, VARY};
use regex::Regex;
use serde::{Deserialize, Serialize};

static BLOCK_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/\*[\s\S]*?\*/").expect("block comment pattern"));
static LINE_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)//.*$").expect("line comment pattern"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern"));

/// Transform settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    /// Master switch.
    pub enabled: bool,
    /// Add `Vary: Accept` to images.
    pub image_vary: bool,
    /// Inject resource hints into HTML.
    pub html_hints: bool,
    /// Hosts for `<link rel="dns-prefetch">`.
    pub dns_prefetch: Vec<String>,
    /// Origins for `<link rel="preconnect">`.
    pub preconnect: Vec<String>,
    /// Stylesheet preloaded before `</head>`.
    pub preload_stylesheet: Option<String>,
    /// Strip comments and whitespace from CSS.
    pub minify_css: bool,
    /// Strip comments and whitespace from JavaScript.
    pub minify_js: bool,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            image_vary: true,
            html_hints: true,
            dns_prefetch: vec![
                "//fonts.googleapis.com".to_string(),
                "//www.googletagmanager.com".to_string(),
            ],
            preconnect: vec!["https://vitals.vercel-analytics.com".to_string()],
            preload_stylesheet: Some("/_next/static/css/app.css".to_string()),
            minify_css: true,
            minify_js: true,
        }
    }
}

/// Kind of content, derived from Content-Type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Image,
    Html,
    Css,
    JavaScript,
    Other,
}

impl ContentKind {
    /// Classify a Content-Type value.
    pub fn classify(content_type: &str) -> Self {
        let ct = content_type.to_ascii_lowercase();

        if ct.starts_with("image/") {
            Self::Image
        } else if ct.contains("text/html") {
            Self::Html
        } else if ct.contains("text/css") {
            Self::Css
        } else if ct.contains("application/javascript") || ct.contains("text/javascript") {
            Self::JavaScript
        } else {
            Self::Other
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Html => "html",
            Self::Css => "css",
            Self::JavaScript => "javascript",
            Self::Other => "none",
        }
    }
}

/// Applies content-specific rewrites to a buffered response.
#[derive(Debug, Clone, Default)]
pub struct Transformer {
    config: TransformConfig,
}

impl Transformer {
    pub fn new(config: TransformConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TransformConfig {
        &self.config
    }

    /// Transform a response according to its content type.
    ///
    /// Bodies that are not valid UTF-8 pass through unchanged.
    pub fn apply(
        &self,
        mut response: BufferedResponse,
        content_type: &str,
    ) -> (BufferedResponse, ContentKind) {
        let kind = ContentKind::classify(content_type);
        if !self.config.enabled {
            return (response, kind);
        }

        match kind {
            // Re-encoding is left to an external image optimizer.
            ContentKind::Image if self.config.image_vary => add_vary_accept(&mut response),
            ContentKind::Html if self.config.html_hints => {
                if let Some(html) = response.text() {
                    let rewritten = self.inject_hints(html);
                    response.replace_body(rewritten);
                }
            }
            ContentKind::Css if self.config.minify_css => {
                if let Some(css) = response.text() {
                    let minified = minify_css(css);
                    response.replace_body(minified);
                }
            }
            ContentKind::JavaScript if self.config.minify_js => {
                if let Some(js) = response.text() {
                    let minified = minify_js(js);
                    response.replace_body(minified);
                }
            }
            _ => {}
        }

        (response, kind)
    }

    /// Insert resource hints into an HTML document.
    pub fn inject_hints(&self, html: &str) -> String {
        let mut out = html.to_string();

        if !out.contains("dns-prefetch") {
            let mut hints = String::new();
            for host in &self.config.dns_prefetch {
                hints.push_str(&format!("\n    <link rel=\"dns-prefetch\" href=\"{}\">", host));
            }
            for origin in &self.config.preconnect {
                hints.push_str(&format!("\n    <link rel=\"preconnect\" href=\"{}\">", origin));
            }
            out = out.replacen("<head>", &format!("<head>{}", hints), 1);
        }

        if let Some(href) = &self.config.preload_stylesheet {
            let preload = format!(
                "  <link rel=\"preload\" href=\"{}\" as=\"style\" onload=\"this.onload=null;this.rel='stylesheet'\">\n",
                href
            );
            out = out.replacen("</head>", &format!("{}</head>", preload), 1);
        }

        out
    }
}

/// Transform a response with the default settings.
pub fn apply_transforms(response: BufferedResponse, content_type: &str) -> BufferedResponse {
    Transformer::default().apply(response, content_type).0
}

/// Strip `/* */` comments and collapse whitespace.
pub fn minify_css(css: &str) -> String {
    let stripped = BLOCK_COMMENT.replace_all(css, "");
    WHITESPACE.replace_all(&stripped, " ").trim().to_string()
}

/// Strip `//` and `/* */` comments and collapse whitespace.
pub fn minify_js(js: &str) -> String {
    let stripped = LINE_COMMENT.replace_all(js, "");
    let stripped = BLOCK_COMMENT.replace_all(&stripped, "");
    WHITESPACE.replace_all(&stripped, " ").trim().to_string()
}

fn add_vary_accept(response: &mut BufferedResponse) {
    let existing = response.header(VARY.as_str()).map(str::to_string);

    let value = match existing {
        Some(v) if v.split(',').any(|p| p.trim().eq_ignore_ascii_case("accept")) => return,
        Some(v) if !v.trim().is_empty() => format!("{}, Accept", v),
        _ => "Accept".to_string(),
    };

    if let Ok(value) = HeaderValue::from_str(&value) {
        response.set_header(VARY, value);
    }
}
