//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define the service's metric names (one `stock_service_` prefix)
//! - Provide the [`MetricsSink`] capability the data-access core reports into
//! - Install the Prometheus recorder and record HTTP request metrics
//!
//! # Metrics
//! - `stock_service_cache_hits_total` (counter)
//! - `stock_service_cache_misses_total` (counter)
//! - `stock_service_circuit_breaker_rejections_total` (counter)
//! - `stock_service_circuit_breaker_trips_total` (counter)
//! - `stock_service_circuit_breaker_state` (gauge): 0=closed, 1=open, 2=half-open
//! - `stock_service_external_calls_total` (counter): raw fetch attempts
//! - `stock_service_external_call_failures_total` (counter)
//! - `stock_service_external_call_duration_seconds` (histogram)
//! - `stock_service_http_requests_total` (counter): by method, route, status
//! - `stock_service_http_request_duration_seconds` (histogram): by method, route
//!
//! # Design Decisions
//! - The core only sees the sink trait; the exposition format belongs to the exporter
//! - Histogram buckets tuned for upstream API latencies

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use metrics::Unit;
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

pub const CACHE_HITS: &str = "stock_service_cache_hits_total";
pub const CACHE_MISSES: &str = "stock_service_cache_misses_total";
pub const BREAKER_REJECTIONS: &str = "stock_service_circuit_breaker_rejections_total";
pub const BREAKER_TRIPS: &str = "stock_service_circuit_breaker_trips_total";
pub const BREAKER_STATE: &str = "stock_service_circuit_breaker_state";
pub const EXTERNAL_CALLS: &str = "stock_service_external_calls_total";
pub const EXTERNAL_CALL_FAILURES: &str = "stock_service_external_call_failures_total";
pub const EXTERNAL_CALL_DURATION: &str = "stock_service_external_call_duration_seconds";
pub const HTTP_REQUESTS: &str = "stock_service_http_requests_total";
pub const HTTP_REQUEST_DURATION: &str = "stock_service_http_request_duration_seconds";

const LATENCY_BUCKETS: [f64; 11] = [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Increment/observe capability injected into the data-access core.
pub trait MetricsSink: Send + Sync {
    fn increment_counter(&self, name: &'static str);
    fn observe_histogram(&self, name: &'static str, value: f64);
    fn set_gauge(&self, name: &'static str, value: f64);
}

/// Forwards to whatever global `metrics` recorder is installed.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecorderSink;

impl MetricsSink for RecorderSink {
    fn increment_counter(&self, name: &'static str) {
        metrics::counter!(name).increment(1);
    }

    fn observe_histogram(&self, name: &'static str, value: f64) {
        metrics::histogram!(name).record(value);
    }

    fn set_gauge(&self, name: &'static str, value: f64) {
        metrics::gauge!(name).set(value);
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn increment_counter(&self, _name: &'static str) {}
    fn observe_histogram(&self, _name: &'static str, _value: f64) {}
    fn set_gauge(&self, _name: &'static str, _value: f64) {}
}

/// In-process sink that keeps the latest values, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    counters: Mutex<HashMap<&'static str, u64>>,
    histograms: Mutex<HashMap<&'static str, Vec<f64>>>,
    gauges: Mutex<HashMap<&'static str, f64>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a counter (0 if never incremented).
    pub fn counter(&self, name: &str) -> u64 {
        let counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        counters.get(name).copied().unwrap_or(0)
    }

    /// All observations recorded for a histogram.
    pub fn observations(&self, name: &str) -> Vec<f64> {
        let histograms = self.histograms.lock().unwrap_or_else(PoisonError::into_inner);
        histograms.get(name).cloned().unwrap_or_default()
    }

    /// Last value set on a gauge.
    pub fn gauge(&self, name: &str) -> Option<f64> {
        let gauges = self.gauges.lock().unwrap_or_else(PoisonError::into_inner);
        gauges.get(name).copied()
    }
}

impl MetricsSink for MemorySink {
    fn increment_counter(&self, name: &'static str) {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        *counters.entry(name).or_insert(0) += 1;
    }

    fn observe_histogram(&self, name: &'static str, value: f64) {
        let mut histograms = self.histograms.lock().unwrap_or_else(PoisonError::into_inner);
        histograms.entry(name).or_default().push(value);
    }

    fn set_gauge(&self, name: &'static str, value: f64) {
        let mut gauges = self.gauges.lock().unwrap_or_else(PoisonError::into_inner);
        gauges.insert(name, value);
    }
}

/// Install the Prometheus recorder as the global `metrics` recorder.
///
/// The returned handle renders the text exposition for `/metrics`.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &LATENCY_BUCKETS,
        )?
        .install_recorder()?;

    describe();
    tracing::info!("Prometheus metrics recorder installed");
    Ok(handle)
}

fn describe() {
    metrics::describe_counter!(CACHE_HITS, "Total number of cache hits");
    metrics::describe_counter!(CACHE_MISSES, "Total number of cache misses");
    metrics::describe_counter!(BREAKER_REJECTIONS, "Calls rejected by an open circuit breaker");
    metrics::describe_counter!(BREAKER_TRIPS, "Transitions of the circuit breaker into open");
    metrics::describe_gauge!(BREAKER_STATE, "Circuit breaker state (0=closed, 1=open, 2=half-open)");
    metrics::describe_counter!(EXTERNAL_CALLS, "Total number of external API calls");
    metrics::describe_counter!(EXTERNAL_CALL_FAILURES, "External API calls that returned an error");
    metrics::describe_histogram!(
        EXTERNAL_CALL_DURATION,
        Unit::Seconds,
        "Duration of external API calls in seconds"
    );
    metrics::describe_counter!(HTTP_REQUESTS, "Total number of HTTP requests");
    metrics::describe_histogram!(
        HTTP_REQUEST_DURATION,
        Unit::Seconds,
        "Duration of HTTP requests in seconds"
    );
}

/// Record a completed HTTP request.
pub fn record_request(method: &str, route: &str, status: u16, start_time: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("route", route.to_string()),
        ("status", status.to_string()),
    ];
    metrics::counter!(HTTP_REQUESTS, &labels).increment(1);
    metrics::histogram!(
        HTTP_REQUEST_DURATION,
        "method" => method.to_string(),
        "route" => route.to_string()
    )
    .record(start_time.elapsed().as_secs_f64());
}
