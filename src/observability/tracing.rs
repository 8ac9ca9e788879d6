//! Request spans.
//!
//! Every request gets one span carrying its correlation id, so log lines
//! from the limiter, the forwarder and the breaker can be joined per request.

use axum::http::Request;
use tower_http::trace::MakeSpan;

use crate::http::request::X_REQUEST_ID;

/// Span factory for `TraceLayer`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestSpan;

impl<B> MakeSpan<B> for RequestSpan {
    fn make_span(&mut self, request: &Request<B>) -> ::tracing::Span {
        let request_id = request
            .headers()
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-");

        ::tracing::info_span!(
            "request",
            method = %request.method(),
            path = %request.uri().path(),
            request_id = %request_id,
        )
    }
}
