//! End-to-end tests for the cache worker.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use edge_cache::{
    CacheError, CacheKey, CacheResult, CacheStatus, CacheStore, CacheWorker, CachedEntry,
    InMemoryStore, OriginRoute, StaticOrigin,
};
use edge_core::{BufferedResponse, EdgeRequest, GeoInfo};
use edge_observability::LogSink;
use http::header::{HeaderValue, USER_AGENT};
use http::{Method, StatusCode};

const IPHONE_UA: &str =
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 Mobile/15E148";

const PAGE: &str = "<html><head><title>Home</title></head><body>hi</body></html>";

fn site() -> StaticOrigin {
    StaticOrigin::new()
        .route("/", OriginRoute::html(PAGE))
        .route(
            "/_next/static/app.css",
            OriginRoute::new(200, "text/css", "body {\n    color: red;   /* brand */\n}\n"),
        )
        .route(
            "/_next/static/chunks/main.js",
            OriginRoute::new(200, "application/javascript", "// banner\nconst a = 1;\n\nconst b = 2;"),
        )
        .route(
            "/images/hero.png",
            OriginRoute::new(200, "image/png", "PNGDATA").with_header("vary", "Origin"),
        )
        .route(
            "/api/health",
            OriginRoute::new(200, "application/json", r#"{"ok":true}"#),
        )
        .route(
            "/feed.json",
            OriginRoute::new(200, "application/json", "[]"),
        )
}

fn setup(origin: StaticOrigin) -> (Arc<StaticOrigin>, CacheWorker<StaticOrigin, InMemoryStore>) {
    let origin = Arc::new(origin);
    let worker = CacheWorker::new(Arc::clone(&origin), Arc::new(InMemoryStore::new()))
        .with_log_sink(LogSink::Discard);
    (origin, worker)
}

fn get(url: &str) -> EdgeRequest {
    EdgeRequest::get(url).unwrap()
}

/// Handle a request and persist any scheduled write before returning.
async fn handle(
    worker: &CacheWorker<StaticOrigin, InMemoryStore>,
    request: EdgeRequest,
) -> edge_cache::Handled {
    let mut handled = worker.handle(request).await.unwrap();
    if let Some(write) = handled.pending_write.take() {
        write.run().await;
    }
    handled
}

#[tokio::test]
async fn test_miss_then_hit() {
    let (origin, worker) = setup(site());

    let first = handle(&worker, get("https://shop.example.com/")).await;
    assert_eq!(first.status, CacheStatus::Miss);
    assert_eq!(first.response.header("cf-cache-status"), Some("MISS"));
    assert_eq!(first.response.header("cache-control"), Some("public, max-age=3600"));
    assert!(first.response.header("cf-response-time").is_some());
    assert_eq!(first.ttl, Some(Duration::from_secs(3600)));
    assert_eq!(origin.fetch_count(), 1);

    let second = handle(&worker, get("https://shop.example.com/")).await;
    assert_eq!(second.status, CacheStatus::Hit);
    assert_eq!(second.response.header("cf-cache-status"), Some("HIT"));
    assert_eq!(second.response.body, first.response.body);
    assert!(second.pending_write.is_none());
    assert_eq!(origin.fetch_count(), 1);

    let counters = worker.counters().snapshot();
    assert_eq!(counters.misses, 1);
    assert_eq!(counters.hits, 1);
    assert_eq!(counters.stores, 1);
    assert_eq!(counters.hit_ratio(), 0.5);
}

#[tokio::test]
async fn test_static_css_cached_for_a_year_and_minified() {
    let (_, worker) = setup(site());

    let handled = handle(&worker, get("https://shop.example.com/_next/static/app.css")).await;

    assert_eq!(handled.status, CacheStatus::Miss);
    assert_eq!(handled.ttl, Some(Duration::from_secs(31_536_000)));
    assert_eq!(
        handled.response.header("cache-control"),
        Some("public, max-age=31536000")
    );
    assert_eq!(handled.response.text(), Some("body { color: red; }"));

    let entry = worker.store().lookup(&handled.key).await.unwrap().unwrap();
    assert_eq!(entry.ttl, Duration::from_secs(31_536_000));
    assert_eq!(entry.response.text(), Some("body { color: red; }"));
}

#[tokio::test]
async fn test_static_asset_with_query_is_cached() {
    let (_, worker) = setup(site());

    let handled = handle(&worker, get("https://shop.example.com/_next/static/chunks/main.js?v=3")).await;

    assert_eq!(handled.status, CacheStatus::Miss);
    assert_eq!(handled.response.text(), Some("const a = 1; const b = 2;"));
    assert!(worker.store().contains(handled.key.as_str()));
}

#[tokio::test]
async fn test_html_gets_resource_hints() {
    let (_, worker) = setup(site());

    let handled = handle(&worker, get("https://shop.example.com/")).await;
    let html = handled.response.text().unwrap();

    assert!(html.contains(r#"<link rel="dns-prefetch" href="//fonts.googleapis.com">"#));
    assert!(html.contains(r#"<link rel="preconnect" href="https://vitals.vercel-analytics.com">"#));
    assert!(html.contains(r#"href="/_next/static/css/app.css" as="style""#));
    assert!(html.find("dns-prefetch").unwrap() < html.find("<title>").unwrap());
}

#[tokio::test]
async fn test_image_gets_vary_accept() {
    let (_, worker) = setup(site());

    let handled = handle(&worker, get("https://shop.example.com/images/hero.png")).await;

    assert_eq!(handled.ttl, Some(Duration::from_secs(2_592_000)));
    assert_eq!(handled.response.header("vary"), Some("Origin, Accept"));
    assert_eq!(handled.response.text(), Some("PNGDATA"));
}

#[tokio::test]
async fn test_api_path_always_bypasses() {
    let (origin, worker) = setup(site());

    for _ in 0..2 {
        let handled = handle(&worker, get("https://shop.example.com/api/health")).await;
        assert_eq!(handled.status, CacheStatus::Bypass);
        assert_eq!(handled.response.header("cf-cache-status"), Some("BYPASS"));
        assert!(handled.response.header("cache-control").is_none());
        assert_eq!(handled.response.text(), Some(r#"{"ok":true}"#));
    }

    assert_eq!(origin.fetch_count(), 2);
    assert!(worker.store().is_empty());
    assert_eq!(worker.counters().snapshot().bypasses, 2);
}

#[tokio::test]
async fn test_error_status_bypasses() {
    let (_, worker) = setup(site());

    let handled = handle(&worker, get("https://shop.example.com/missing")).await;

    assert_eq!(handled.status, CacheStatus::Bypass);
    assert_eq!(handled.response.status, StatusCode::NOT_FOUND);
    assert!(worker.store().is_empty());
}

#[tokio::test]
async fn test_page_with_query_bypasses() {
    let (_, worker) = setup(site());

    let handled = handle(&worker, get("https://shop.example.com/?utm_source=mail")).await;

    assert_eq!(handled.status, CacheStatus::Bypass);
    assert!(worker.store().is_empty());
}

#[tokio::test]
async fn test_non_html_page_bypasses_untransformed() {
    let (_, worker) = setup(site());

    let handled = handle(&worker, get("https://shop.example.com/feed.json")).await;

    assert_eq!(handled.status, CacheStatus::Bypass);
    assert_eq!(handled.response.text(), Some("[]"));
    assert!(handled.metrics.transform.is_none());
}

#[tokio::test]
async fn test_post_skips_lookup() {
    let (origin, worker) = setup(site());

    handle(&worker, get("https://shop.example.com/")).await;
    let post = EdgeRequest::new(Method::POST, "https://shop.example.com/".parse().unwrap());
    let handled = handle(&worker, post).await;

    assert_eq!(handled.status, CacheStatus::Bypass);
    assert_eq!(origin.fetch_count(), 2);
    assert!(handled.metrics.lookup_us.is_none());
}

fn head(url: &str) -> EdgeRequest {
    EdgeRequest::parse("HEAD", url).unwrap()
}

#[tokio::test]
async fn test_head_miss_does_not_fill_get_entry() {
    let (origin, worker) = setup(site());

    let head_only = worker.handle(head("https://shop.example.com/")).await.unwrap();
    assert_eq!(head_only.status, CacheStatus::Miss);
    assert!(head_only.pending_write.is_none());
    assert!(head_only.ttl.is_none());
    assert!(head_only.response.body.is_empty());
    let page_len = PAGE.len().to_string();
    assert_eq!(head_only.response.header("content-length"), Some(page_len.as_str()));
    assert!(worker.store().is_empty());

    let page = handle(&worker, get("https://shop.example.com/")).await;
    assert_eq!(page.status, CacheStatus::Miss);
    assert!(!page.response.body.is_empty());
    assert_eq!(origin.fetch_count(), 2);

    let again = handle(&worker, get("https://shop.example.com/")).await;
    assert_eq!(again.status, CacheStatus::Hit);
    assert_eq!(again.response.body, page.response.body);
}

#[tokio::test]
async fn test_head_served_from_get_entry_without_body() {
    let (origin, worker) = setup(site());

    let page = handle(&worker, get("https://shop.example.com/")).await;
    let handled = handle(&worker, head("https://shop.example.com/")).await;

    assert_eq!(handled.status, CacheStatus::Hit);
    assert!(handled.response.body.is_empty());
    let stored_len = page.response.body.len().to_string();
    assert_eq!(handled.response.header("content-length"), Some(stored_len.as_str()));
    assert_eq!(handled.response.header("cache-control"), Some("public, max-age=3600"));
    assert_eq!(origin.fetch_count(), 1);

    // The stored entry keeps its body
    let get_again = handle(&worker, get("https://shop.example.com/")).await;
    assert_eq!(get_again.response.body, page.response.body);
}

#[tokio::test]
async fn test_device_partitions_entries() {
    let (origin, worker) = setup(site());

    handle(&worker, get("https://shop.example.com/")).await;
    let phone = get("https://shop.example.com/")
        .with_header(USER_AGENT, HeaderValue::from_static(IPHONE_UA));
    let handled = handle(&worker, phone).await;

    assert_eq!(handled.status, CacheStatus::Miss);
    assert!(handled.key.as_str().ends_with(":US:mobile:false"));
    assert_eq!(origin.fetch_count(), 2);
    assert_eq!(worker.store().len(), 2);
}

#[tokio::test]
async fn test_country_partitions_entries() {
    let (_, worker) = setup(site());

    let fr = handle(&worker, get("https://shop.example.com/").with_geo(GeoInfo::country("FR"))).await;
    let de = handle(&worker, get("https://shop.example.com/").with_geo(GeoInfo::country("DE"))).await;

    assert_eq!(fr.status, CacheStatus::Miss);
    assert_eq!(de.status, CacheStatus::Miss);
    assert_ne!(fr.key, de.key);
}

#[tokio::test]
async fn test_chunked_origin_body_is_buffered_once() {
    let body = format!("<html><head></head><body>{}</body></html>", "x".repeat(100));
    let (_, worker) = setup(StaticOrigin::new().route("/long", OriginRoute::html(body).chunked()));

    let miss = handle(&worker, get("https://shop.example.com/long")).await;
    let hit = handle(&worker, get("https://shop.example.com/long")).await;

    assert_eq!(miss.status, CacheStatus::Miss);
    assert_eq!(hit.status, CacheStatus::Hit);
    assert!(miss.response.text().unwrap().contains(&"x".repeat(100)));
    assert_eq!(hit.response.body, miss.response.body);
}

/// Store whose lookups and writes can be made to fail.
#[derive(Default)]
struct FlakyStore {
    inner: InMemoryStore,
    fail_lookups: bool,
    fail_writes: bool,
    writes: AtomicUsize,
}

#[async_trait]
impl CacheStore for FlakyStore {
    async fn lookup(&self, key: &CacheKey) -> CacheResult<Option<CachedEntry>> {
        if self.fail_lookups {
            return Err(CacheError::Storage("lookup timed out".to_string()));
        }
        self.inner.lookup(key).await
    }

    async fn store(&self, key: &CacheKey, response: BufferedResponse, ttl: Duration) -> CacheResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes {
            return Err(CacheError::Storage("quota exceeded".to_string()));
        }
        self.inner.store(key, response, ttl).await
    }
}

#[tokio::test]
async fn test_failed_write_is_counted_not_surfaced() {
    let store = Arc::new(FlakyStore {
        fail_writes: true,
        ..Default::default()
    });
    let worker = CacheWorker::new(Arc::new(site()), Arc::clone(&store))
        .with_log_sink(LogSink::Discard);

    let handled = worker.handle(get("https://shop.example.com/")).await.unwrap();
    assert_eq!(handled.status, CacheStatus::Miss);
    assert_eq!(handled.response.status, StatusCode::OK);

    handled.pending_write.unwrap().run().await;

    let counters = worker.counters().snapshot();
    assert_eq!(counters.store_failures, 1);
    assert_eq!(counters.stores, 0);
    assert_eq!(store.writes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_lookup_error_degrades_to_miss() {
    let store = Arc::new(FlakyStore {
        fail_lookups: true,
        ..Default::default()
    });
    let origin = Arc::new(site());
    let worker = CacheWorker::new(Arc::clone(&origin), Arc::clone(&store))
        .with_log_sink(LogSink::Discard);

    for _ in 0..2 {
        let handled = worker.handle(get("https://shop.example.com/")).await.unwrap();
        assert_eq!(handled.status, CacheStatus::Miss);
        if let Some(write) = handled.pending_write {
            write.run().await;
        }
    }

    assert_eq!(origin.fetch_count(), 2);
    let counters = worker.counters().snapshot();
    assert_eq!(counters.lookup_errors, 2);
    assert_eq!(counters.misses, 2);
}

#[tokio::test]
async fn test_shared_counters_across_workers() {
    let counters = Arc::new(edge_observability::CacheCounters::new());
    let store = Arc::new(InMemoryStore::new());
    let a = CacheWorker::new(Arc::new(site()), Arc::clone(&store))
        .with_counters(Arc::clone(&counters))
        .with_log_sink(LogSink::Discard);
    let b = CacheWorker::new(Arc::new(site()), Arc::clone(&store))
        .with_counters(Arc::clone(&counters))
        .with_log_sink(LogSink::Discard);

    let miss = a.handle(get("https://shop.example.com/")).await.unwrap();
    miss.pending_write.unwrap().run().await;
    let hit = b.handle(get("https://shop.example.com/")).await.unwrap();

    assert_eq!(hit.status, CacheStatus::Hit);
    let snapshot = counters.snapshot();
    assert_eq!(snapshot.misses, 1);
    assert_eq!(snapshot.hits, 1);
}
