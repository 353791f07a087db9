//! Route handlers. Thin adapters over the read path.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::cache::CacheSummary;
use crate::http::request::RequestIdExt;
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::resilience::BreakerCounters;
use crate::upstream::StockRequest;

pub const SERVICE_NAME: &str = "stock-service";

/// `GET /`: configured symbol and day count.
pub async fn default_stock(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
    let request = state.default_request.clone();
    read_stock(&state, &headers, request).await
}

/// `GET /{symbol}`: configured day count.
pub async fn stock_by_symbol(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(symbol): Path<String>,
) -> Result<Response, ApiError> {
    let ndays = state.default_request.ndays();
    let request = StockRequest::new(&symbol, ndays)
        .map_err(|e| ApiError::bad_request(&e, &symbol, Some(ndays)))?;
    read_stock(&state, &headers, request).await
}

/// `GET /{symbol}/{days}`.
pub async fn stock_by_symbol_and_days(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((symbol, days)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let request = StockRequest::parse(&symbol, &days)
        .map_err(|e| ApiError::bad_request(&e, &symbol, days.parse().ok()))?;
    read_stock(&state, &headers, request).await
}

async fn read_stock(state: &AppState, headers: &HeaderMap, request: StockRequest) -> Result<Response, ApiError> {
    tracing::info!(
        request_id = %headers.request_id(),
        symbol = %request.symbol(),
        ndays = request.ndays(),
        "Fetching stock data"
    );

    match state.fetcher.get_data(&request).await {
        Ok(data) => Ok(Json(data.as_ref()).into_response()),
        Err(e) => {
            tracing::error!(
                request_id = %headers.request_id(),
                symbol = %request.symbol(),
                error = %e,
                retryable = e.is_retryable(),
                "Failed to get stock data"
            );
            Err(ApiError::data(&e, &request, state.fetcher.breaker().timeout()))
        }
    }
}

/// `GET /health`: liveness only, never touches the upstream.
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "timestamp": unix_timestamp(),
    }))
}

/// `GET /ready`: one-day read of the default symbol through the full read path.
pub async fn ready(State(state): State<AppState>) -> Response {
    match state.fetcher.get_data(&state.readiness_probe).await {
        Ok(_) => Json(json!({
            "status": "ready",
            "service": SERVICE_NAME,
            "timestamp": unix_timestamp(),
        }))
        .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "not ready",
                    "error": "unable to fetch stock data",
                    "details": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub breaker: BreakerCounters,
    pub cache: CacheSummary,
    pub ttl_secs: u64,
}

/// `GET /status`: breaker and cache introspection.
pub async fn status(State(state): State<AppState>) -> Json<StatusReport> {
    Json(StatusReport {
        breaker: state.fetcher.breaker().counters(),
        cache: state.fetcher.cache_summary(),
        ttl_secs: state.fetcher.cache().ttl().as_secs(),
    })
}

/// `GET /metrics`: Prometheus text exposition.
pub async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
