//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Cache miss in the orchestrator:
//!     → circuit_breaker.rs admits or rejects the call
//!     → raw fetch runs (it enforces its own timeout)
//!     → outcome recorded, breaker opens/closes on thresholds
//! ```
//!
//! # Design Decisions
//! - The breaker adds no retries; callers or the fetch function own retry policy
//! - Rejection is a control-flow signal ("try later"), not a defect
//! - Circuit breaker prevents a failing upstream from amplifying load

pub mod circuit_breaker;

pub use circuit_breaker::{BreakerCounters, CallError, CircuitBreaker, CircuitState};
