//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize all subsystems in dependency order
//! - Start background tasks (cache sweeper)
//! - Bind listeners and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::cache::{CacheSweeper, TtlCache};
use crate::config::ServiceConfig;
use crate::fetch::{FetchError, ResilientFetcher};
use crate::http::{AppState, HttpServer};
use crate::lifecycle::Shutdown;
use crate::observability::metrics::{MetricsSink, NoopSink, RecorderSink};
use crate::resilience::CircuitBreaker;
use crate::upstream::{AlphaVantageClient, RequestError};

const UPSTREAM_NAME: &str = "alpha_vantage";

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to build upstream client: {0}")]
    Upstream(#[from] FetchError),

    #[error("invalid default request: {0}")]
    DefaultRequest(#[from] RequestError),

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Wire cache, breaker, upstream client and orchestrator into handler state.
///
/// With a metrics handle the core reports to the installed recorder,
/// otherwise its metrics are discarded.
pub fn build_state(
    config: &ServiceConfig,
    metrics: Option<PrometheusHandle>,
) -> Result<AppState, StartupError> {
    let sink: Arc<dyn MetricsSink> = if metrics.is_some() {
        Arc::new(RecorderSink)
    } else {
        Arc::new(NoopSink)
    };

    let client = AlphaVantageClient::new(&config.upstream)?;
    let cache = TtlCache::new(config.cache.ttl());
    let breaker = CircuitBreaker::new(
        config.circuit_breaker.failure_threshold,
        config.circuit_breaker.success_threshold,
        config.circuit_breaker.timeout(),
    )
    .with_observer(UPSTREAM_NAME, sink.clone());

    let fetcher = ResilientFetcher::new(client, cache, Arc::new(breaker), sink);
    let state = AppState::new(Arc::new(fetcher), &config.upstream, metrics)?;

    tracing::info!(
        symbol = %state.default_request.symbol(),
        ndays = state.default_request.ndays(),
        cache_ttl_secs = config.cache.ttl_secs,
        failure_threshold = config.circuit_breaker.failure_threshold,
        success_threshold = config.circuit_breaker.success_threshold,
        breaker_timeout_secs = config.circuit_breaker.timeout_secs,
        "Read path initialized"
    );
    Ok(state)
}

/// Start the sweeper and serve until `shutdown` is triggered.
pub async fn serve(
    config: &ServiceConfig,
    listener: TcpListener,
    state: AppState,
    shutdown: &Shutdown,
) -> Result<(), StartupError> {
    if let Some(interval) = config.cache.sweep_interval() {
        let sweeper = CacheSweeper::new(state.fetcher.cache().clone(), interval);
        tokio::spawn(sweeper.run(shutdown.subscribe()));
    }

    HttpServer::new(state, &config.listener)
        .run(listener, shutdown.signalled())
        .await?;
    Ok(())
}
