//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, trace span, timeout)
//!     → middleware/ (per-route request metrics)
//!     → handlers.rs (path → StockRequest, call the read path)
//!     → response.rs (error → status + JSON body)
//!     → Send to client
//! ```

pub mod handlers;
pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestIdExt, UuidRequestId, X_REQUEST_ID};
pub use response::ApiError;
pub use server::{AppState, HttpServer};
