//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (TTL > 0, thresholds ≥ 1, ports valid)
//! - Check the default request is one the service would accept
//! - Keep the request deadline longer than the upstream deadline
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;
use url::Url;

use crate::config::schema::ServiceConfig;
use crate::upstream::StockRequest;

/// A single semantic problem with a config value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a valid socket address", config.listener.bind_address),
        ));
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::new("listener.request_timeout_secs", "must be greater than 0"));
    }

    match Url::parse(&config.upstream.base_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => errors.push(ValidationError::new(
            "upstream.base_url",
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new("upstream.base_url", e.to_string())),
    }
    if config.upstream.api_key.trim().is_empty() {
        errors.push(ValidationError::new("upstream.api_key", "must not be empty"));
    }
    if config.upstream.timeout_secs == 0 {
        errors.push(ValidationError::new("upstream.timeout_secs", "must be greater than 0"));
    }
    if config.upstream.timeout_secs > 0
        && config.listener.request_timeout_secs <= config.upstream.timeout_secs
    {
        errors.push(ValidationError::new(
            "listener.request_timeout_secs",
            format!(
                "must exceed upstream.timeout_secs ({}s)",
                config.upstream.timeout_secs
            ),
        ));
    }
    if let Err(e) = StockRequest::new(&config.upstream.symbol, config.upstream.ndays) {
        errors.push(ValidationError::new("upstream.symbol/ndays", e.to_string()));
    }

    if config.cache.ttl_secs == 0 {
        errors.push(ValidationError::new("cache.ttl_secs", "must be greater than 0"));
    }

    if config.circuit_breaker.failure_threshold == 0 {
        errors.push(ValidationError::new("circuit_breaker.failure_threshold", "must be at least 1"));
    }
    if config.circuit_breaker.success_threshold == 0 {
        errors.push(ValidationError::new("circuit_breaker.success_threshold", "must be at least 1"));
    }
    if config.circuit_breaker.timeout_secs == 0 {
        errors.push(ValidationError::new("circuit_breaker.timeout_secs", "must be greater than 0"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
