//! Explain how a single request would be cached.

use anyhow::{Context as _, Result};
use edge_cache::{CacheDecision, CachePolicy, ContentKind, KeyParts, PathClass};
use edge_core::{BufferedResponse, EdgeRequest, EdgeResponse, GeoInfo};
use http::header::{HeaderValue, CONTENT_TYPE};
use http::StatusCode;
use serde::Serialize;

use super::ExplainArgs;
use crate::context::Context;
use crate::output::format_ttl;

/// Everything the policy decides for one request/response pair.
#[derive(Debug, Serialize)]
pub struct Explanation {
    pub method: String,
    pub url: String,
    pub key: String,
    pub key_parts: KeyParts,
    pub path_class: PathClass,
    pub method_cacheable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<CacheDecision>,
    pub cacheable: bool,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transform: Option<ContentKind>,
}

/// Run the explain command.
pub async fn run(args: ExplainArgs, ctx: &Context) -> Result<()> {
    ctx.config.validate().context("Invalid configuration")?;

    let mut request = EdgeRequest::parse(&args.method, &args.url)
        .with_context(|| format!("Invalid request: {} {}", args.method, args.url))?;
    if let Some(ua) = &args.user_agent {
        request = request.try_with_header("user-agent", ua)?;
    }
    if let Some(accept) = &args.accept {
        request = request.try_with_header("accept", accept)?;
    }
    if let Some(country) = &args.country {
        request = request.with_geo(GeoInfo::country(country.to_uppercase()));
    }

    let status = StatusCode::from_u16(args.status)
        .with_context(|| format!("Invalid status code: {}", args.status))?;
    let content_type = HeaderValue::from_str(&args.content_type)
        .with_context(|| format!("Invalid content type: {}", args.content_type))?;
    let response = EdgeResponse::new(status)
        .with_header(CONTENT_TYPE, content_type)
        .into_buffered()
        .await?;

    let policy = CachePolicy::new(ctx.config.policy.clone());
    let explanation = explain(&policy, &request, &response);

    if ctx.output.is_json() {
        ctx.output.json(&explanation);
        return Ok(());
    }

    print_explanation(&explanation, ctx);
    Ok(())
}

/// Evaluate the policy for a request and the origin response it would get.
pub fn explain(policy: &CachePolicy, request: &EdgeRequest, response: &BufferedResponse) -> Explanation {
    let key = policy.cache_key(request);
    let path_class = policy.classify(request.path());
    let method_cacheable = policy.is_cacheable_method(&request.method);

    let storable = policy.is_storable_method(&request.method);

    let decision = method_cacheable.then(|| policy.decide(&request.uri, response));
    let cacheable = storable && decision.map(|d| d.is_cacheable()).unwrap_or(false);
    let reason = match decision {
        Some(d) if d.is_cacheable() && !storable => {
            format!("{} is answered from stored GET entries but never stored", request.method)
        }
        Some(d) => d.describe().to_string(),
        None => format!("{} requests bypass the cache", request.method),
    };

    let ttl = cacheable.then(|| policy.ttl_for_path(request.path()));
    let transform = cacheable.then(|| ContentKind::classify(response.content_type().unwrap_or_default()));

    Explanation {
        method: request.method.to_string(),
        url: request.href(),
        key: key.as_str().to_string(),
        key_parts: key.parts().clone(),
        path_class,
        method_cacheable,
        decision,
        cacheable,
        reason,
        ttl_secs: ttl.map(|t| t.as_secs()),
        cache_control: ttl.map(CachePolicy::cache_control),
        transform,
    }
}

fn print_explanation(explanation: &Explanation, ctx: &Context) {
    ctx.output.header(&format!("{} {}", explanation.method, explanation.url));

    ctx.output.kv("Cache key", &explanation.key);
    let parts = &explanation.key_parts;
    ctx.output.list_item(&format!("country: {}", parts.country));
    ctx.output.list_item(&format!("device: {}", parts.device));
    ctx.output.list_item(&format!("webp: {}", parts.accepts_webp));

    ctx.output.kv("Path class", explanation.path_class.name());

    if explanation.cacheable {
        ctx.output.success(&format!("Cacheable: {}", explanation.reason));
    } else {
        ctx.output.warn(&format!("Not cached: {}", explanation.reason));
    }

    if let Some(ttl) = explanation.ttl_secs {
        ctx.output.kv("TTL", &format!("{} ({})", ttl, format_ttl(ttl)));
    }
    if let Some(cc) = &explanation.cache_control {
        ctx.output.kv("Cache-Control", cc);
    }
    if let Some(kind) = explanation.transform {
        ctx.output.kv("Transform", kind.name());
    }
}
