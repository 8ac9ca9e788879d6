//! Client-facing error translation.
//!
//! Every failure that reaches a handler is a [`GatewayError`]; its
//! `IntoResponse` impl is the only place statuses and bodies are chosen.
//! Internal detail is logged, never sent to the client.

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::security::AuthError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GatewayError {
    /// Malformed or incomplete request payload.
    #[error("validation failed: {0}")]
    Validation(&'static str),

    #[error("unauthorized: {0}")]
    Unauthorized(#[from] AuthError),

    #[error("rate limit exceeded")]
    RateLimited,

    /// The backend's circuit breaker short-circuited the call.
    #[error("{service} circuit breaker rejected the call")]
    Unavailable { service: String },

    /// The backend was reached but failed.
    #[error("{service} backend error")]
    Backend {
        service: String,
        body: Option<Bytes>,
        /// Message used when the backend sent no body.
        fallback: String,
    },

    /// The backend reported the requested resource as missing.
    #[error("upstream resource not found")]
    UpstreamNotFound { body: Bytes },

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            GatewayError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Backend { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::UpstreamNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn raw_json(status: StatusCode, body: Bytes) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            GatewayError::Validation(reason) => json_error(status, reason),
            GatewayError::Unauthorized(reason) => json_error(status, &reason.to_string()),
            GatewayError::RateLimited => json_error(status, "rate limit exceeded"),
            GatewayError::Unavailable { service } => {
                json_error(status, &format!("{} service temporarily unavailable", service))
            }
            GatewayError::Backend {
                body: Some(body), ..
            } if !body.is_empty() => raw_json(status, body),
            GatewayError::Backend { fallback, .. } => json_error(status, &fallback),
            GatewayError::UpstreamNotFound { body } => raw_json(status, body),
            GatewayError::Internal(detail) => {
                tracing::error!(error = %detail, "Internal error");
                json_error(status, "Internal server error")
            }
        }
    }
}
