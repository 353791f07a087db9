//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, JSON or pretty)
//!     → Metrics endpoint (Prometheus scrape of /metrics)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows through the HTTP trace span
//! - Metrics are cheap (atomic increments)
//! - The data-access core reports through an injected sink, never the global recorder

pub mod logging;
pub mod metrics;
