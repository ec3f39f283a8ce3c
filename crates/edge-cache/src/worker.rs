//! Request handler: cache lookup, origin fetch and background cache write.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use edge_core::{BodyError, BufferedResponse, EdgeRequest, LifecyclePhase};
use edge_observability::{
    CacheCounters, LogSink, MetricsCollector, RequestMetrics, StructuredLogger,
};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use http::header::{HeaderValue, CONTENT_LENGTH};
use http::Method;

use crate::config::{EdgeCacheConfig, LoggingConfig};
use crate::headers::{stamp_cache_control, stamp_diagnostics, CacheStatus};
use crate::key::CacheKey;
use crate::origin::{Origin, OriginError};
use crate::policy::CachePolicy;
use crate::store::CacheStore;
use crate::transform::Transformer;

/// Errors surfaced by [`CacheWorker::handle`].
///
/// Cache store failures never appear here; lookups degrade to a miss and
/// writes are only logged and counted.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("origin fetch failed: {0}")]
    Origin(#[from] OriginError),

    #[error("failed to read origin body: {0}")]
    Body(#[from] BodyError),
}

/// A cache write scheduled after the response is produced.
///
/// Nothing is written until the write is run or spawned. Dropping it
/// discards the write.
pub struct PendingWrite {
    key: CacheKey,
    ttl: Duration,
    future: BoxFuture<'static, ()>,
}

impl PendingWrite {
    /// Key the entry will be stored under.
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// TTL the entry will be stored with.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Perform the write on the current task.
    pub async fn run(self) {
        self.future.await
    }

    /// Perform the write on the tokio runtime without waiting for it.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.future)
    }
}

impl fmt::Debug for PendingWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingWrite")
            .field("key", &self.key.as_str())
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

/// Outcome of handling one request.
#[derive(Debug)]
pub struct Handled {
    /// Response for the client, diagnostic headers included.
    pub response: BufferedResponse,
    /// Cache status reported in `CF-Cache-Status`.
    pub status: CacheStatus,
    /// Key the request mapped to.
    pub key: CacheKey,
    /// TTL assigned on a miss that will be stored.
    pub ttl: Option<Duration>,
    /// Timings for this request.
    pub metrics: RequestMetrics,
    /// Write to run after the response is sent. Only set on a storable miss.
    pub pending_write: Option<PendingWrite>,
}

/// Applies the cache policy around an origin.
///
/// One `handle` call per request. The worker is `Send + Sync` and meant to
/// be shared behind an `Arc`; concurrent misses for the same key each
/// reach the origin.
pub struct CacheWorker<O, S> {
    origin: Arc<O>,
    store: Arc<S>,
    policy: CachePolicy,
    transformer: Transformer,
    counters: Arc<CacheCounters>,
    logging: LoggingConfig,
    sink: LogSink,
}

impl<O, S> CacheWorker<O, S>
where
    O: Origin + 'static,
    S: CacheStore + 'static,
{
    /// Create a worker with the default policy and transforms.
    pub fn new(origin: Arc<O>, store: Arc<S>) -> Self {
        Self::from_config(origin, store, &EdgeCacheConfig::default())
    }

    /// Create a worker from a loaded configuration.
    pub fn from_config(origin: Arc<O>, store: Arc<S>, config: &EdgeCacheConfig) -> Self {
        Self {
            origin,
            store,
            policy: CachePolicy::new(config.policy.clone()),
            transformer: Transformer::new(config.transforms.clone()),
            counters: Arc::new(CacheCounters::new()),
            logging: config.logging.clone(),
            sink: LogSink::default(),
        }
    }

    /// Share counters with other workers.
    pub fn with_counters(mut self, counters: Arc<CacheCounters>) -> Self {
        self.counters = counters;
        self
    }

    /// Send summary lines somewhere other than stderr.
    pub fn with_log_sink(mut self, sink: LogSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn counters(&self) -> &Arc<CacheCounters> {
        &self.counters
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// Handle a request.
    ///
    /// On a storable miss the returned [`Handled`] carries a
    /// [`PendingWrite`]; the caller decides when it runs.
    pub async fn handle(&self, mut request: EdgeRequest) -> Result<Handled, WorkerError> {
        request.timing.mark(LifecyclePhase::Received);

        let logger = self.logger(&request);
        let mut metrics = MetricsCollector::new(request.request_id.clone());
        metrics.set_path(request.path());

        let key = self.policy.cache_key(&request);

        if !self.policy.is_cacheable_method(&request.method) {
            let response = self.fetch_origin(&request, &mut metrics).await?;
            return Ok(self.bypass(request, key, response, metrics, &logger));
        }

        let lookup_start = Instant::now();
        let cached = match self.store.lookup(&key).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache lookup failed, treating as miss");
                logger
                    .warn_builder("cache lookup failed")
                    .field("error", e.to_string())
                    .emit();
                self.counters.record_lookup_error();
                None
            }
        };
        metrics.record_lookup(lookup_start.elapsed());
        request.timing.mark(LifecyclePhase::LookupDone);

        if let Some(entry) = cached {
            let mut response = entry.response;
            if request.method == Method::HEAD {
                strip_body(&mut response);
            }
            request.timing.mark(LifecyclePhase::Responded);
            stamp_diagnostics(&mut response, CacheStatus::Hit, request.timing.elapsed_ms());
            self.counters.record_hit();

            return Ok(self.finish(request, key, response, CacheStatus::Hit, None, None, metrics, &logger));
        }

        let response = self.fetch_origin(&request, &mut metrics).await?;
        request.timing.mark(LifecyclePhase::OriginFetched);

        if !self.policy.should_cache(&request.uri, &response) {
            return Ok(self.bypass(request, key, response, metrics, &logger));
        }

        if !self.policy.is_storable_method(&request.method) {
            // HEAD: pass the origin headers through; a later GET fills the entry.
            let mut response = response;
            request.timing.mark(LifecyclePhase::Responded);
            stamp_diagnostics(&mut response, CacheStatus::Miss, request.timing.elapsed_ms());
            self.counters.record_miss();
            return Ok(self.finish(request, key, response, CacheStatus::Miss, None, None, metrics, &logger));
        }

        let transform_start = Instant::now();
        let content_type = response.content_type().unwrap_or_default().to_string();
        let (mut response, kind) = self.transformer.apply(response, &content_type);
        metrics.record_transform(kind.name(), transform_start.elapsed());
        request.timing.mark(LifecyclePhase::Transformed);

        let ttl = self.policy.ttl_for_path(request.path());
        metrics.record_ttl(ttl);
        stamp_cache_control(&mut response, ttl);
        request.timing.mark(LifecyclePhase::Responded);
        stamp_diagnostics(&mut response, CacheStatus::Miss, request.timing.elapsed_ms());
        self.counters.record_miss();

        let write = self.schedule_write(key.clone(), response.clone(), ttl);

        Ok(self.finish(request, key, response, CacheStatus::Miss, Some(ttl), Some(write), metrics, &logger))
    }

    /// Handle a request and spawn the cache write on the tokio runtime.
    ///
    /// The returned [`Handled`] never carries a pending write.
    pub async fn handle_detached(&self, request: EdgeRequest) -> Result<Handled, WorkerError> {
        let mut handled = self.handle(request).await?;
        if let Some(write) = handled.pending_write.take() {
            write.spawn();
        }
        Ok(handled)
    }

    async fn fetch_origin(
        &self,
        request: &EdgeRequest,
        metrics: &mut MetricsCollector,
    ) -> Result<BufferedResponse, WorkerError> {
        let start = Instant::now();
        let response = self.origin.fetch(request).await?;
        // Single-consumption body: buffer once, then clone the bytes.
        let buffered = response.into_buffered().await?;
        metrics.record_origin(start.elapsed(), buffered.body.len());
        Ok(buffered)
    }

    fn bypass(
        &self,
        mut request: EdgeRequest,
        key: CacheKey,
        mut response: BufferedResponse,
        metrics: MetricsCollector,
        logger: &StructuredLogger,
    ) -> Handled {
        request.timing.mark(LifecyclePhase::Responded);
        stamp_diagnostics(&mut response, CacheStatus::Bypass, request.timing.elapsed_ms());
        self.counters.record_bypass();
        self.finish(request, key, response, CacheStatus::Bypass, None, None, metrics, logger)
    }

    fn schedule_write(&self, key: CacheKey, response: BufferedResponse, ttl: Duration) -> PendingWrite {
        let store = Arc::clone(&self.store);
        let counters = Arc::clone(&self.counters);
        let write_key = key.clone();

        let future = async move {
            match store.store(&write_key, response, ttl).await {
                Ok(()) => counters.record_store(),
                Err(e) => {
                    counters.record_store_failure();
                    tracing::warn!(key = %write_key, error = %e, "background cache write failed");
                }
            }
        }
        .boxed();

        PendingWrite { key, ttl, future }
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        request: EdgeRequest,
        key: CacheKey,
        response: BufferedResponse,
        status: CacheStatus,
        ttl: Option<Duration>,
        pending_write: Option<PendingWrite>,
        metrics: MetricsCollector,
        logger: &StructuredLogger,
    ) -> Handled {
        let metrics = metrics.finalize(status.as_str(), Some(response.status.as_u16()));

        let mut line = logger
            .info_builder("request handled")
            .field("method", request.method.as_str())
            .field("cache_status", status.as_str())
            .field("key", key.as_str())
            .field_u64("status", u64::from(response.status.as_u16()))
            .duration_ms("response_time_ms", request.timing.elapsed());
        if let Some(ttl) = ttl {
            line = line.field_u64("ttl_secs", ttl.as_secs());
        }
        for phase in [
            LifecyclePhase::LookupDone,
            LifecyclePhase::OriginFetched,
            LifecyclePhase::Transformed,
        ] {
            if let Some(offset) = request.timing.time_to(phase) {
                line = line.duration_ms(&format!("{}_ms", phase.name()), offset);
            }
        }
        line.emit();

        Handled {
            response,
            status,
            key,
            ttl,
            metrics,
            pending_write,
        }
    }

    fn logger(&self, request: &EdgeRequest) -> StructuredLogger {
        StructuredLogger::new(request.request_id.clone())
            .with_component("edge-cache")
            .with_path(request.path())
            .with_min_level(self.logging.level)
            .with_format(self.logging.format)
            .with_sink(self.sink.clone())
    }
}

/// Drop the body of a stored GET response for a HEAD request, keeping the
/// length the GET would have.
fn strip_body(response: &mut BufferedResponse) {
    let length = response.body.len();
    response.headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
    response.body = Bytes::new();
}
