//! Request identification.
//!
//! # Responsibilities
//! - Generate unique request ID (UUID v4) for requests that arrive without one
//! - Read the ID back for logging and the trace span
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - A client-supplied `x-request-id` is kept, not replaced

use axum::http::{HeaderMap, HeaderValue};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

/// Header carrying the correlation ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// [`MakeRequestId`] producing random UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Access to the request ID on a header map.
pub trait RequestIdExt {
    fn request_id(&self) -> &str;
}

impl RequestIdExt for HeaderMap {
    fn request_id(&self) -> &str {
        self.get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[test]
    fn test_generated_ids_are_uuids_and_unique() {
        let req = Request::new(());
        let mut maker = UuidRequestId;
        let a = maker.make_request_id(&req).unwrap();
        let b = maker.make_request_id(&req).unwrap();

        let a = a.header_value().to_str().unwrap().to_string();
        assert!(Uuid::parse_str(&a).is_ok());
        assert_ne!(a, b.header_value().to_str().unwrap());
    }

    #[test]
    fn test_request_id_ext() {
        let mut headers = HeaderMap::new();
        assert_eq!(headers.request_id(), "unknown");
        headers.insert(X_REQUEST_ID, HeaderValue::from_static("abc-123"));
        assert_eq!(headers.request_id(), "abc-123");
    }
}
