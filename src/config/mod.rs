//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize, defaults for missing fields)
//!     → loader.rs (environment overrides: PORT, SYMBOL, CACHE_TTL, ...)
//!     → validation.rs (semantic checks)
//!     → ServiceConfig (validated, immutable)
//!     → read once at startup to build the subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError, ConfigResult};
pub use schema::{
    CacheConfig, CircuitBreakerConfig, ListenerConfig, LogFormat, ObservabilityConfig, ServiceConfig,
    UpstreamConfig,
};
