//! Outbound request execution.
//!
//! # Responsibilities
//! - Build the outbound request (target URI, allow-listed headers, JSON content type)
//! - Admit it through the backend's circuit breaker under the upstream deadline
//! - Classify failures as rejection, transport error, timeout or oversized body
//!
//! # Data Flow
//! ```text
//! handler → forward()/fetch()
//!     → build_request (allow-list: X-Request-ID, Authorization, Accept)
//!     → CallBreaker::acquire → CallPermit
//!     → Deadline::run(hyper client)
//!     → forward: Response<UpstreamBody> (streamed, permit settled at end of body)
//!       fetch:   Fetched (buffered up to the body limit, permit settled here)
//! ```
//!
//! # Design Decisions
//! - Any HTTP response counts as a breaker success; only transport errors
//!   and timeouts count as failures
//! - A body over the buffering limit is the gateway's limit, not a backend
//!   fault: the breaker records a success and the client gets a 500
//! - Headers and body share one deadline
//! - No retries; a rejected or failed call is reported once

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, Request, Response, StatusCode},
};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::error::GatewayError;
use crate::observability::metrics;
use crate::resilience::timeouts::{Deadline, Elapsed};
use crate::resilience::{BreakerError, CallBreaker, CallPermit};
use crate::upstream::body::UpstreamBody;
use crate::upstream::Backend;

/// Headers copied from the inbound request.
const FORWARDED_HEADERS: [HeaderName; 3] = [
    HeaderName::from_static("x-request-id"),
    header::AUTHORIZATION,
    header::ACCEPT,
];

/// Default upper bound on a backend body buffered by [`RequestForwarder::fetch`].
const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Why a forwarded call produced no response.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("could not build request to {backend}: {reason}")]
    Build { backend: String, reason: String },

    #[error("{backend} circuit breaker rejected the call")]
    Rejected { backend: String },

    #[error("{backend} request failed: {reason}")]
    Transport { backend: String, reason: String },

    #[error("{backend} did not respond within {limit:?}")]
    Timeout { backend: String, limit: Duration },

    #[error("{backend} response body exceeds {limit} bytes")]
    Oversized { backend: String, limit: usize },
}

impl ForwardError {
    pub fn backend(&self) -> &str {
        match self {
            ForwardError::Build { backend, .. }
            | ForwardError::Rejected { backend }
            | ForwardError::Transport { backend, .. }
            | ForwardError::Timeout { backend, .. }
            | ForwardError::Oversized { backend, .. } => backend,
        }
    }
}

impl From<ForwardError> for GatewayError {
    fn from(err: ForwardError) -> Self {
        match err {
            ForwardError::Rejected { backend } => GatewayError::Unavailable { service: backend },
            other => GatewayError::Internal(other.to_string()),
        }
    }
}

// Failures counted by the breaker.
#[derive(Debug, thiserror::Error)]
enum CallFailure {
    #[error(transparent)]
    Transport(#[from] hyper_util::client::legacy::Error),

    #[error("failed to read response body: {0}")]
    Body(#[source] BoxError),

    #[error(transparent)]
    Timeout(#[from] Elapsed),
}

/// A fully buffered backend response.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub status: StatusCode,
    pub body: Bytes,
}

/// Executes backend calls.
#[derive(Clone)]
pub struct RequestForwarder {
    client: Client<HttpConnector, Body>,
    timeout: Duration,
    body_limit: usize,
}

impl RequestForwarder {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            client,
            timeout,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    /// Limit on buffered response bodies.
    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    /// Forward one request, returning the backend response with its body unread.
    ///
    /// The body stays under the call deadline while it is relayed, and the
    /// breaker learns the outcome when the body ends.
    pub async fn forward(
        &self,
        backend: &Backend,
        method: Method,
        path_and_query: &str,
        body: Option<Bytes>,
        inbound: &HeaderMap,
    ) -> Result<Response<UpstreamBody>, ForwardError> {
        let request = build_request(backend, method, path_and_query, body, inbound)?;
        let permit = admit(backend)?;
        let deadline = Deadline::after(self.timeout);

        let result = match deadline.run(self.client.request(request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(CallFailure::from(e)),
            Err(elapsed) => Err(CallFailure::from(elapsed)),
        };

        match result {
            Ok(response) => {
                let (parts, incoming) = response.into_parts();
                let body = UpstreamBody::new(incoming, deadline, backend.name(), permit);
                Ok(Response::from_parts(parts, body))
            }
            Err(failure) => Err(failed(backend, permit, failure)),
        }
    }

    /// Forward one request and buffer the whole response body.
    ///
    /// The body is read inside the deadline, so a backend that stalls
    /// mid-body counts as a failure.
    pub async fn fetch(
        &self,
        backend: &Backend,
        method: Method,
        path_and_query: &str,
        inbound: &HeaderMap,
    ) -> Result<Fetched, ForwardError> {
        let request = build_request(backend, method, path_and_query, None, inbound)?;
        let permit = admit(backend)?;
        let deadline = Deadline::after(self.timeout);
        let limit = self.body_limit;
        let client = self.client.clone();

        let exchange = async move {
            let response = client.request(request).await?;
            let status = response.status();
            match Limited::new(response.into_body(), limit).collect().await {
                Ok(collected) => Ok(Some(Fetched {
                    status,
                    body: collected.to_bytes(),
                })),
                Err(e) if e.is::<LengthLimitError>() => Ok(None),
                Err(e) => Err(CallFailure::Body(e)),
            }
        };

        let result = match deadline.run(exchange).await {
            Ok(outcome) => outcome,
            Err(elapsed) => Err(CallFailure::from(elapsed)),
        };

        match result {
            Ok(Some(fetched)) => {
                metrics::record_upstream(backend.name(), "success");
                permit.success();
                Ok(fetched)
            }
            Ok(None) => {
                tracing::warn!(backend = %backend.name(), limit, "Upstream body over limit");
                metrics::record_upstream(backend.name(), "oversized");
                permit.success();
                Err(ForwardError::Oversized {
                    backend: backend.display_name().to_string(),
                    limit,
                })
            }
            Err(failure) => Err(failed(backend, permit, failure)),
        }
    }
}

// Take a breaker slot for `backend` or report the rejection.
fn admit(backend: &Backend) -> Result<CallPermit<Arc<CallBreaker>>, ForwardError> {
    match backend.breaker().acquire::<Infallible>() {
        Ok(permit) => Ok(permit),
        Err(BreakerError::Open) | Err(BreakerError::TooManyRequests) => {
            metrics::record_upstream(backend.name(), "rejected");
            Err(ForwardError::Rejected {
                backend: backend.display_name().to_string(),
            })
        }
        Err(BreakerError::Inner(never)) => match never {},
    }
}

// Record a failed exchange against the breaker and classify it.
fn failed(
    backend: &Backend,
    permit: CallPermit<Arc<CallBreaker>>,
    failure: CallFailure,
) -> ForwardError {
    permit.failure();
    let service = backend.display_name().to_string();
    match failure {
        CallFailure::Timeout(Elapsed(limit)) => {
            tracing::warn!(backend = %backend.name(), ?limit, "Upstream timed out");
            metrics::record_upstream(backend.name(), "timeout");
            ForwardError::Timeout {
                backend: service,
                limit,
            }
        }
        failure => {
            tracing::warn!(backend = %backend.name(), error = %failure, "Upstream request failed");
            metrics::record_upstream(backend.name(), "transport_error");
            ForwardError::Transport {
                backend: service,
                reason: failure.to_string(),
            }
        }
    }
}

fn build_request(
    backend: &Backend,
    method: Method,
    path_and_query: &str,
    body: Option<Bytes>,
    inbound: &HeaderMap,
) -> Result<Request<Body>, ForwardError> {
    let build_error = |reason: String| ForwardError::Build {
        backend: backend.display_name().to_string(),
        reason,
    };

    let uri = backend
        .target(path_and_query)
        .map_err(|e| build_error(e.to_string()))?;

    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

    for name in FORWARDED_HEADERS.iter() {
        for value in inbound.get_all(name) {
            builder = builder.header(name, value.clone());
        }
    }

    builder
        .body(body.map(Body::from).unwrap_or_else(Body::empty))
        .map_err(|e| build_error(e.to_string()))
}
