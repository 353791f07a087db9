//! Cache → breaker-guarded fetch → cache population.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use crate::cache::{CacheSummary, TtlCache};
use crate::fetch::error::{DataError, FetchResult};
use crate::fetch::key::CacheKeyed;
use crate::observability::metrics::{self, MetricsSink};
use crate::resilience::{CallError, CircuitBreaker, CircuitState};

/// The operation that actually talks to the upstream provider.
///
/// Implementations own request construction, their timeout and response
/// parsing, including any "not enough data" policy.
pub trait RawFetch: Send + Sync {
    type Request: CacheKeyed + Send + Sync;
    type Output: Clone + Send + Sync + 'static;

    fn fetch(&self, request: &Self::Request) -> impl Future<Output = FetchResult<Self::Output>> + Send;
}

/// Times one raw fetch. A fetch dropped before `finish` is counted as failed.
struct Attempt<'a> {
    sink: &'a dyn MetricsSink,
    start: Instant,
    finished: bool,
}

impl<'a> Attempt<'a> {
    fn start(sink: &'a dyn MetricsSink) -> Self {
        Self {
            sink,
            start: Instant::now(),
            finished: false,
        }
    }

    fn finish(mut self) {
        self.finished = true;
    }
}

impl Drop for Attempt<'_> {
    fn drop(&mut self) {
        self.sink
            .observe_histogram(metrics::EXTERNAL_CALL_DURATION, self.start.elapsed().as_secs_f64());
        if !self.finished {
            self.sink.increment_counter(metrics::EXTERNAL_CALL_FAILURES);
            tracing::warn!("Upstream fetch abandoned before completing");
        }
    }
}

/// Single-call read API over one upstream dependency.
pub struct ResilientFetcher<F: RawFetch> {
    fetcher: F,
    cache: TtlCache<F::Output>,
    breaker: Arc<CircuitBreaker>,
    sink: Arc<dyn MetricsSink>,
}

impl<F: RawFetch> ResilientFetcher<F> {
    pub fn new(
        fetcher: F,
        cache: TtlCache<F::Output>,
        breaker: Arc<CircuitBreaker>,
        sink: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            fetcher,
            cache,
            breaker,
            sink,
        }
    }

    /// Serve `request` from cache, or fetch it through the breaker.
    ///
    /// Failed fetches and rejections never touch the cache. Concurrent misses
    /// for the same key each fetch; the last completed write wins.
    pub async fn get_data(&self, request: &F::Request) -> Result<F::Output, DataError> {
        let key = request.cache_key();

        if let Some(value) = self.cache.get(key.as_str()) {
            self.sink.increment_counter(metrics::CACHE_HITS);
            tracing::debug!(key = %key, "Cache hit");
            return Ok(value);
        }

        self.sink.increment_counter(metrics::CACHE_MISSES);
        tracing::debug!(key = %key, "Cache miss");

        let outcome = self
            .breaker
            .call(|| async {
                self.sink.increment_counter(metrics::EXTERNAL_CALLS);
                let attempt = Attempt::start(self.sink.as_ref());
                let result = self.fetcher.fetch(request).await;
                attempt.finish();
                result
            })
            .await;

        match outcome {
            Ok(value) => {
                tracing::info!(key = %key, ttl_secs = self.cache.ttl().as_secs(), "Cached fresh data");
                self.cache.set(key, value.clone());
                Ok(value)
            }
            Err(CallError::Open) => {
                self.sink.increment_counter(metrics::BREAKER_REJECTIONS);
                tracing::warn!(key = %key, breaker = %self.breaker.name(), "Upstream call rejected, circuit open");
                Err(DataError::BreakerOpen)
            }
            Err(CallError::Inner(e)) => {
                self.sink.increment_counter(metrics::EXTERNAL_CALL_FAILURES);
                tracing::error!(key = %key, error = %e, "Upstream fetch failed");
                Err(DataError::Fetch(e))
            }
        }
    }

    /// Read-only breaker state for health/status surfaces.
    pub fn breaker_state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn cache_summary(&self) -> CacheSummary {
        self.cache.summary()
    }

    pub fn cache(&self) -> &TtlCache<F::Output> {
        &self.cache
    }
}
