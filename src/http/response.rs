//! Error responses.
//!
//! # Responsibilities
//! - Map read-path and request errors to HTTP status codes
//! - Render the JSON error body clients already parse
//! - Tell clients when to come back while the circuit is open
//!
//! # Design Decisions
//! - Open circuit → 503 + `Retry-After`; the upstream failing → 502
//! - Bad path input → 400 before the read path is touched

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::time::Duration;

use crate::fetch::DataError;
use crate::upstream::{RequestError, StockRequest};

/// JSON body of every error response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub details: String,
    pub symbol: String,
    pub ndays: Option<u32>,
}

/// Handler error carrying its status and body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
    retry_after: Option<Duration>,
}

impl ApiError {
    /// A failed read of `request`. `retry_after` is the breaker's open timeout.
    pub fn data(err: &DataError, request: &StockRequest, retry_after: Duration) -> Self {
        let (status, error, retry_after) = match err {
            DataError::BreakerOpen => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Upstream temporarily unavailable",
                Some(retry_after),
            ),
            DataError::Fetch(_) => (StatusCode::BAD_GATEWAY, "Failed to fetch stock data", None),
        };
        Self {
            status,
            body: ErrorBody {
                error,
                details: err.to_string(),
                symbol: request.symbol().to_string(),
                ndays: Some(request.ndays()),
            },
            retry_after,
        }
    }

    /// Path parameters that never reach the read path.
    pub fn bad_request(err: &RequestError, symbol: &str, ndays: Option<u32>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorBody {
                error: "Invalid request",
                details: err.to_string(),
                symbol: symbol.to_string(),
                ndays,
            },
            retry_after: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &ErrorBody {
        &self.body
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.body)).into_response();
        if let Some(retry_after) = self.retry_after {
            let secs = retry_after_secs(retry_after);
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

/// Whole seconds, rounded up, never zero.
fn retry_after_secs(d: Duration) -> u64 {
    let secs = d.as_secs() + u64::from(d.subsec_nanos() > 0);
    secs.max(1)
}
