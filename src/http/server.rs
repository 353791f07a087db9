//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (timeout, request ID, tracing, metrics)
//! - Bind server to listener
//! - Drain in-flight requests on shutdown

use axum::{
    body::Body,
    http::Request,
    middleware,
    routing::get,
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{ListenerConfig, UpstreamConfig};
use crate::http::handlers;
use crate::http::middleware::track_metrics;
use crate::http::request::{RequestIdExt, UuidRequestId};
use crate::upstream::{RequestError, StockFetcher, StockRequest};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub fetcher: Arc<StockFetcher>,
    /// Served by `GET /`; its day count is the default for `GET /{symbol}`.
    pub default_request: StockRequest,
    /// One-day read of the default symbol used by `GET /ready`.
    pub readiness_probe: StockRequest,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        fetcher: Arc<StockFetcher>,
        upstream: &UpstreamConfig,
        metrics: Option<PrometheusHandle>,
    ) -> Result<Self, RequestError> {
        Ok(Self {
            fetcher,
            default_request: StockRequest::new(&upstream.symbol, upstream.ndays)?,
            readiness_probe: StockRequest::new(&upstream.symbol, 1)?,
            metrics,
        })
    }
}

/// HTTP server for the stock service.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(state: AppState, config: &ListenerConfig) -> Self {
        Self {
            router: Self::build_router(state, config),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(state: AppState, config: &ListenerConfig) -> Router {
        Router::new()
            .route("/", get(handlers::default_stock))
            .route("/health", get(handlers::health))
            .route("/ready", get(handlers::ready))
            .route("/status", get(handlers::status))
            .route("/metrics", get(handlers::metrics))
            .route("/{symbol}", get(handlers::stock_by_symbol))
            .route("/{symbol}/{days}", get(handlers::stock_by_symbol_and_days))
            .route_layer(middleware::from_fn(track_metrics))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                    .layer(TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                        tracing::info_span!(
                            "http_request",
                            method = %req.method(),
                            uri = %req.uri(),
                            request_id = %req.headers().request_id(),
                        )
                    }))
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(TimeoutLayer::new(config.request_timeout())),
            )
    }

    /// The fully layered router, for driving in-process.
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Serve on `listener` until `shutdown` resolves, then drain in-flight requests.
    pub async fn run<S>(self, listener: TcpListener, shutdown: S) -> Result<(), std::io::Error>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TtlCache;
    use crate::fetch::{FetchError, ResilientFetcher};
    use crate::http::request::X_REQUEST_ID;
    use crate::observability::metrics::NoopSink;
    use crate::resilience::{CircuitBreaker, CircuitState};
    use crate::upstream::AlphaVantageClient;
    use axum::http::{header, StatusCode};
    use std::time::Duration;
    use tower::ServiceExt;

    /// State whose upstream refuses connections.
    fn test_state(failure_threshold: u32) -> AppState {
        let upstream = UpstreamConfig {
            base_url: "http://127.0.0.1:9/query".to_string(),
            timeout_secs: 2,
            ..UpstreamConfig::default()
        };
        let client = AlphaVantageClient::new(&upstream).unwrap();
        let fetcher = ResilientFetcher::new(
            client,
            TtlCache::new(Duration::from_secs(60)),
            Arc::new(CircuitBreaker::new(failure_threshold, 1, Duration::from_secs(30))),
            Arc::new(NoopSink),
        );
        AppState::new(Arc::new(fetcher), &upstream, None).unwrap()
    }

    fn router(state: AppState) -> Router {
        HttpServer::new(state, &ListenerConfig::default()).into_router()
    }

    async fn get(router: Router, uri: &str) -> axum::response::Response {
        router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = get(router(test_state(5)), "/health").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(X_REQUEST_ID));

        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "stock-service");
    }

    #[tokio::test]
    async fn test_client_request_id_is_propagated() {
        let response = router(test_state(5))
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header(X_REQUEST_ID, "req-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()[X_REQUEST_ID], "req-42");
    }

    #[tokio::test]
    async fn test_status_reports_breaker_and_cache() {
        let response = get(router(test_state(5)), "/status").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["breaker"]["state"], "closed");
        assert_eq!(body["breaker"]["failures"], 0);
        assert_eq!(body["cache"]["live"], 0);
        assert_eq!(body["ttl_secs"], 60);
    }

    #[tokio::test]
    async fn test_invalid_days_is_bad_request() {
        let response = get(router(test_state(5)), "/MSFT/abc").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = json_body(response).await;
        assert_eq!(body["error"], "Invalid request");
        assert_eq!(body["symbol"], "MSFT");
        assert!(body["ndays"].is_null());
    }

    #[tokio::test]
    async fn test_out_of_range_days_is_bad_request() {
        let response = get(router(test_state(5)), "/MSFT/0").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["ndays"], 0);
    }

    #[tokio::test]
    async fn test_invalid_symbol_is_bad_request() {
        let response = get(router(test_state(5)), "/MS%7CFT").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_bad_gateway() {
        let state = test_state(5);
        let response = get(router(state.clone()), "/AAPL/3").await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let body = json_body(response).await;
        assert_eq!(body["error"], "Failed to fetch stock data");
        assert_eq!(body["symbol"], "AAPL");
        assert_eq!(body["ndays"], 3);
        assert_eq!(state.fetcher.breaker().counters().failures, 1);
        assert!(state.fetcher.cache().is_empty());
    }

    #[tokio::test]
    async fn test_open_breaker_is_service_unavailable() {
        let state = test_state(1);
        let _ = state
            .fetcher
            .breaker()
            .call(|| async { Err::<(), _>(FetchError::NoData) })
            .await;
        assert_eq!(state.fetcher.breaker_state(), CircuitState::Open);

        let response = get(router(state), "/").await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::RETRY_AFTER], "30");

        let body = json_body(response).await;
        assert_eq!(body["symbol"], "MSFT");
        assert_eq!(body["ndays"], 7);
    }

    #[tokio::test]
    async fn test_ready_fails_while_breaker_open() {
        let state = test_state(1);
        let _ = state
            .fetcher
            .breaker()
            .call(|| async { Err::<(), _>(FetchError::NoData) })
            .await;

        let response = get(router(state), "/ready").await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json_body(response).await["status"], "not ready");
    }

    #[tokio::test]
    async fn test_metrics_disabled() {
        let response = get(router(test_state(5)), "/metrics").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
