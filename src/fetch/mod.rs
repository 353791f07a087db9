//! Resilient read path.
//!
//! # Data Flow
//! ```text
//! caller → orchestrator.rs get_data(request)
//!     → key.rs (request → deterministic cache key)
//!     → cache::TtlCache get
//!         hit  → return cached value
//!         miss → resilience::CircuitBreaker call(raw fetch)
//!                 ok       → cache set, return value
//!                 rejected → DataError::BreakerOpen
//!                 failed   → DataError::Fetch
//! ```
//!
//! # Design Decisions
//! - Raw fetch and metrics sink are injected, so tests need no network
//! - No single-flight: concurrent misses for one key each fetch
//! - No stale fallback; expired entries are gone from the reader's view
//! - Errors are never swallowed, only counted alongside propagation

pub mod error;
pub mod key;
pub mod orchestrator;

pub use error::{DataError, FetchError, FetchResult};
pub use key::{CacheKey, CacheKeyed};
pub use orchestrator::{RawFetch, ResilientFetcher};
