//! Run a scenario of requests through the cache worker.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use edge_cache::{CacheWorker, EdgeCacheConfig, Handled, InMemoryStore, OriginRoute, StaticOrigin};
use edge_core::{EdgeRequest, GeoInfo};
use edge_observability::{CounterSnapshot, LogSink, RequestMetrics};
use serde::{Deserialize, Serialize};

use super::SimulateArgs;
use crate::context::Context;
use crate::output::{format_bytes, format_ttl, status_badge};

/// A scenario file: canned origin routes and the requests to send.
#[derive(Debug, Deserialize)]
pub struct Scenario {
    /// Origin routes by exact path.
    #[serde(default)]
    pub routes: HashMap<String, OriginRoute>,
    /// Requests in send order.
    pub requests: Vec<ScenarioRequest>,
}

/// One request in a scenario.
#[derive(Debug, Deserialize)]
pub struct ScenarioRequest {
    /// Absolute URL.
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Country supplied by the edge platform.
    #[serde(default)]
    pub country: Option<String>,
    /// Send the request this many times.
    #[serde(default = "default_repeat")]
    pub repeat: usize,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_repeat() -> usize {
    1
}

impl ScenarioRequest {
    fn to_request(&self) -> Result<EdgeRequest> {
        let mut request = EdgeRequest::parse(&self.method, &self.url)
            .with_context(|| format!("Invalid request: {} {}", self.method, self.url))?;
        for (name, value) in &self.headers {
            request = request.try_with_header(name, value)?;
        }
        if let Some(country) = &self.country {
            request = request.with_geo(GeoInfo::country(country.clone()));
        }
        Ok(request)
    }
}

/// Outcome of one simulated request.
#[derive(Debug, Serialize)]
pub struct SimulationRow {
    pub index: usize,
    pub method: String,
    pub url: String,
    pub cache_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_bytes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_us: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<RequestMetrics>,
}

/// Full simulation report.
#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub rows: Vec<SimulationRow>,
    pub counters: CounterSnapshot,
    pub origin_fetches: usize,
    pub entries: usize,
}

/// Run the simulate command.
pub async fn run(args: SimulateArgs, ctx: &Context) -> Result<()> {
    ctx.config.validate().context("Invalid configuration")?;

    let path = ctx.resolve_path(&args.scenario);
    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read scenario: {}", path.display()))?;
    let scenario: Scenario = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse scenario: {}", path.display()))?;

    ctx.output.debug(&format!(
        "{} route(s), {} request(s)",
        scenario.routes.len(),
        scenario.requests.len()
    ));

    let sink = if args.logs { LogSink::Stderr } else { LogSink::Discard };
    let report = simulate(scenario, &ctx.config, sink, |total| {
        ctx.output.progress(total as u64, "Simulating")
    })
    .await?;

    if ctx.output.is_json() {
        ctx.output.json(&report);
        return Ok(());
    }

    print_report(&report, ctx);
    Ok(())
}

/// Send every scenario request through a fresh worker and in-memory store.
///
/// Each cache write completes before the next request is sent, so repeated
/// requests observe earlier misses.
pub async fn simulate<F>(
    scenario: Scenario,
    config: &EdgeCacheConfig,
    sink: LogSink,
    progress: F,
) -> Result<SimulationReport>
where
    F: FnOnce(usize) -> indicatif::ProgressBar,
{
    let origin = Arc::new(StaticOrigin::from_routes(scenario.routes));
    let store = Arc::new(InMemoryStore::new());
    let worker = CacheWorker::from_config(Arc::clone(&origin), Arc::clone(&store), config)
        .with_log_sink(sink);

    let total: usize = scenario.requests.iter().map(|r| r.repeat).sum();
    let bar = progress(total);
    let mut rows = Vec::with_capacity(total);

    for entry in &scenario.requests {
        for _ in 0..entry.repeat {
            let index = rows.len() + 1;
            let request = entry.to_request()?;

            let row = match worker.handle(request).await {
                Ok(mut handled) => {
                    if let Some(write) = handled.pending_write.take() {
                        write.run().await;
                    }
                    row_for(index, entry, &handled)
                }
                Err(e) => SimulationRow {
                    index,
                    method: entry.method.to_uppercase(),
                    url: entry.url.clone(),
                    cache_status: "ERROR".to_string(),
                    status_code: None,
                    ttl_secs: None,
                    body_bytes: None,
                    key: None,
                    error: Some(e.to_string()),
                    duration_us: 0,
                    metrics: None,
                },
            };

            rows.push(row);
            bar.inc(1);
        }
    }

    bar.finish_and_clear();

    Ok(SimulationReport {
        rows,
        counters: worker.counters().snapshot(),
        origin_fetches: origin.fetch_count(),
        entries: store.len(),
    })
}

fn row_for(index: usize, entry: &ScenarioRequest, handled: &Handled) -> SimulationRow {
    SimulationRow {
        index,
        method: entry.method.to_uppercase(),
        url: entry.url.clone(),
        cache_status: handled.status.as_str().to_string(),
        status_code: Some(handled.response.status.as_u16()),
        ttl_secs: handled.ttl.map(|t| t.as_secs()),
        body_bytes: Some(handled.response.body.len()),
        key: Some(handled.key.as_str().to_string()),
        error: None,
        duration_us: handled.metrics.total_duration_us,
        metrics: Some(handled.metrics.clone()),
    }
}

const COLUMN_WIDTHS: [usize; 7] = [4, 6, 44, 6, 10, 10, 0];

fn print_report(report: &SimulationReport, ctx: &Context) {
    ctx.output.header("Simulation");

    ctx.output
        .table_row(&["#", "METHOD", "URL", "CODE", "SIZE", "TTL", "CACHE"], &COLUMN_WIDTHS);
    for row in &report.rows {
        let index = row.index.to_string();
        let code = row.status_code.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string());
        let size = row
            .body_bytes
            .map(|b| format_bytes(b as u64))
            .unwrap_or_else(|| "-".to_string());
        let ttl = row.ttl_secs.map(format_ttl).unwrap_or_else(|| "-".to_string());
        let badge = status_badge(&row.cache_status);

        ctx.output.table_row(
            &[
                index.as_str(),
                row.method.as_str(),
                row.url.as_str(),
                code.as_str(),
                size.as_str(),
                ttl.as_str(),
                badge.as_str(),
            ],
            &COLUMN_WIDTHS,
        );

        if let Some(error) = &row.error {
            ctx.output.warn(&format!("request {}: {}", row.index, error));
        }
        if let Some(key) = &row.key {
            ctx.output.debug(&format!("key: {}", key));
        }
        if let Some(metrics) = &row.metrics {
            for line in metrics.to_summary().lines() {
                ctx.output.debug(line);
            }
        }
    }

    let c = &report.counters;
    ctx.output.info("");
    ctx.output.kv("Hits", &c.hits.to_string());
    ctx.output.kv("Misses", &c.misses.to_string());
    ctx.output.kv("Bypasses", &c.bypasses.to_string());
    ctx.output.kv("Hit ratio", &format!("{:.1}%", c.hit_ratio() * 100.0));
    ctx.output.kv("Stored entries", &report.entries.to_string());
    ctx.output.kv("Origin fetches", &report.origin_fetches.to_string());
    if c.store_failures > 0 || c.lookup_errors > 0 {
        ctx.output.warn(&format!(
            "{} store failure(s), {} lookup error(s)",
            c.store_failures, c.lookup_errors
        ));
    }
}
