//! Configuration loading from disk and environment.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::config::schema::{LogFormat, ServiceConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value '{value}' for {var}: {reason}")]
    Env {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, override from the process environment, and validate.
///
/// Without a path the built-in defaults are the base layer.
pub fn load_config(path: Option<&Path>) -> ConfigResult<ServiceConfig> {
    load_config_with(path, |var| std::env::var(var).ok())
}

/// [`load_config`] with an injectable environment lookup.
pub fn load_config_with<F>(path: Option<&Path>, env: F) -> ConfigResult<ServiceConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str(&content)?
        }
        None => ServiceConfig::default(),
    };

    apply_env_overrides(&mut config, env)?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply the deployment environment variables on top of `config`.
///
/// Unset or empty variables leave the value untouched.
pub fn apply_env_overrides<F>(config: &mut ServiceConfig, env: F) -> ConfigResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    let lookup = |var: &str| env(var).filter(|v| !v.trim().is_empty());

    if let Some(port) = lookup("PORT") {
        let port: u16 = parse_var("PORT", &port)?;
        config.listener.bind_address = format!("0.0.0.0:{}", port);
    }
    if let Some(symbol) = lookup("SYMBOL") {
        config.upstream.symbol = symbol;
    }
    if let Some(ndays) = lookup("NDAYS") {
        config.upstream.ndays = parse_var("NDAYS", &ndays)?;
    }
    if let Some(api_key) = lookup("APIKEY") {
        config.upstream.api_key = api_key;
    }
    if let Some(ttl) = lookup("CACHE_TTL") {
        config.cache.ttl_secs = parse_var("CACHE_TTL", &ttl)?;
    }
    if let Some(timeout) = lookup("CIRCUIT_BREAKER_TIMEOUT") {
        config.circuit_breaker.timeout_secs = parse_var("CIRCUIT_BREAKER_TIMEOUT", &timeout)?;
    }
    if let Some(threshold) = lookup("CIRCUIT_BREAKER_THRESHOLD") {
        config.circuit_breaker.failure_threshold = parse_var("CIRCUIT_BREAKER_THRESHOLD", &threshold)?;
    }
    if let Some(threshold) = lookup("CIRCUIT_BREAKER_SUCCESS_THRESHOLD") {
        config.circuit_breaker.success_threshold =
            parse_var("CIRCUIT_BREAKER_SUCCESS_THRESHOLD", &threshold)?;
    }
    if let Some(level) = lookup("LOG_LEVEL") {
        config.observability.log_level = level;
    }
    if let Some(format) = lookup("LOG_FORMAT") {
        config.observability.log_format = parse_var::<LogFormat>("LOG_FORMAT", &format)?;
    }

    Ok(())
}

fn parse_var<T>(var: &'static str, value: &str) -> ConfigResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Env {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}
