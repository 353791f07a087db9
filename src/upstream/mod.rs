//! Upstream market data provider.
//!
//! # Data Flow
//! ```text
//! StockRequest (validated symbol + ndays)
//!     → alpha_vantage.rs GET ?function=TIME_SERIES_DAILY
//!     → payload classification (error / notice / empty)
//!     → newest ndays closes, average
//!     → Arc<StockData> handed to the orchestrator for caching
//! ```
//!
//! # Design Decisions
//! - The client is the `RawFetch` for the orchestrator; it knows nothing of
//!   caching or the breaker
//! - Short series are served as-is, with `ndays` reporting what was used

pub mod alpha_vantage;
pub mod types;

pub use alpha_vantage::AlphaVantageClient;
pub use types::{PricePoint, RequestError, StockData, StockRequest, MAX_NDAYS};

/// The service's read path: Alpha Vantage behind cache and breaker.
pub type StockFetcher = crate::fetch::ResilientFetcher<AlphaVantageClient>;
