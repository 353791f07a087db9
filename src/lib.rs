//! Stock price service library

pub mod cache;
pub mod config;
pub mod fetch;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod upstream;

pub use cache::TtlCache;
pub use config::schema::ServiceConfig;
pub use fetch::{DataError, FetchError, RawFetch, ResilientFetcher};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use resilience::{CircuitBreaker, CircuitState};
pub use upstream::{StockData, StockRequest};
