//! Error types for the read path.

use std::time::Duration;
use thiserror::Error;

use crate::resilience::CallError;

/// Whatever the raw fetch reported. Propagated unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Connection failure or other transport-level error.
    #[error("upstream request failed: {0}")]
    Transport(String),

    /// The whole request/response exchange exceeded its deadline.
    #[error("upstream request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Non-success HTTP status.
    #[error("upstream returned status {0}")]
    Status(u16),

    /// Body could not be decoded.
    #[error("failed to decode upstream response: {0}")]
    Decode(String),

    /// Provider reported an error in an otherwise valid response.
    #[error("upstream API error: {0}")]
    Api(String),

    /// Provider throttled us and returned no data.
    #[error("upstream rate limit reached: {0}")]
    RateLimited(String),

    /// Response carried no time series.
    #[error("no time series data returned")]
    NoData,

    /// Time series present but no close price could be parsed.
    #[error("no valid price data found")]
    NoValidPrices,
}

impl FetchError {
    /// True if the same request may succeed later without changes.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Transport(_) | FetchError::Timeout(_) | FetchError::RateLimited(_) => true,
            FetchError::Status(code) => *code == 429 || *code >= 500,
            _ => false,
        }
    }
}

/// Result type for raw fetches.
pub type FetchResult<T> = Result<T, FetchError>;

/// Error returned by the resilient read path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataError {
    /// Upstream is presumed unhealthy; try again later.
    #[error("circuit breaker is open: upstream temporarily unavailable")]
    BreakerOpen,

    /// The raw fetch ran and failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl DataError {
    /// Whether retrying later is reasonable.
    pub fn is_retryable(&self) -> bool {
        match self {
            DataError::BreakerOpen => true,
            DataError::Fetch(e) => e.is_transient(),
        }
    }
}

impl From<CallError<FetchError>> for DataError {
    fn from(err: CallError<FetchError>) -> Self {
        match err {
            CallError::Open => DataError::BreakerOpen,
            CallError::Inner(e) => DataError::Fetch(e),
        }
    }
}
