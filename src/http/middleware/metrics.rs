//! Per-request HTTP metrics.
//! Labels by matched route template, never the raw path, to bound cardinality.

use axum::{
    body::Body,
    extract::MatchedPath,
    http::Request,
    middleware::Next,
    response::Response,
};
use std::time::Instant;

use crate::observability::metrics;

pub async fn track_metrics(req: Request<Body>, next: Next) -> Response {
    let start_time = Instant::now();
    let method = req.method().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;

    metrics::record_request(&method, &route, response.status().as_u16(), start_time);
    response
}
