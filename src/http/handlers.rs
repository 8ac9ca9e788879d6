//! Route handlers.
//!
//! Single-backend routes forward the inbound path and query unchanged to the
//! owning backend. The details route goes through the aggregation coordinator.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, Path, State},
    Extension,
    http::{HeaderMap, Method, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;

use crate::error::GatewayError;
use crate::http::request::RequestIdExt;
use crate::http::response::relay;
use crate::resilience::{CircuitState, RollingCounts};
use crate::security::{PayloadRules, Subject};
use crate::upstream::{AggregationCoordinator, Backend, RequestForwarder};

const STATUS_MESSAGE: &str = "API Gateway is running";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<Backend>,
    pub orders: Arc<Backend>,
    pub forwarder: RequestForwarder,
    pub aggregator: AggregationCoordinator,
    pub payload_rules: Arc<PayloadRules>,
}

/// Forward to the users service.
pub async fn users_proxy(
    State(state): State<AppState>,
    subject: Option<Extension<Subject>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, GatewayError> {
    let backend = state.users.clone();
    let inbound = Inbound {
        subject: subject.map(|Extension(s)| s),
        method,
        uri,
        headers,
    };
    forward(&state, &backend, inbound, body).await
}

/// Forward to the orders service.
pub async fn orders_proxy(
    State(state): State<AppState>,
    subject: Option<Extension<Subject>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, GatewayError> {
    let backend = state.orders.clone();
    let inbound = Inbound {
        subject: subject.map(|Extension(s)| s),
        method,
        uri,
        headers,
    };
    forward(&state, &backend, inbound, body).await
}

// Request parts a proxied call carries to the backend.
struct Inbound {
    subject: Option<Subject>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
}

async fn forward(
    state: &AppState,
    backend: &Backend,
    inbound: Inbound,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, GatewayError> {
    let Inbound {
        subject,
        method,
        uri,
        headers,
    } = inbound;
    let body = body.map_err(|rejection| {
        tracing::debug!(error = %rejection, "Failed to read request body");
        GatewayError::Validation("invalid body")
    })?;
    state.payload_rules.check(backend.name(), &method, &body)?;

    let path_and_query = uri
        .path_and_query()
        .map(|p| p.as_str())
        .unwrap_or_else(|| uri.path());

    tracing::debug!(
        request_id = headers.request_id().unwrap_or("-"),
        subject = subject.as_ref().map(|s| s.0.as_str()).unwrap_or("-"),
        backend = %backend.name(),
        method = %method,
        path = %path_and_query,
        "Forwarding request"
    );

    let body = if body.is_empty() { None } else { Some(body) };
    let response = state
        .forwarder
        .forward(backend, method, path_and_query, body, &headers)
        .await?;

    Ok(relay(response))
}

/// `GET /users/{userId}/details`
pub async fn user_details(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, GatewayError> {
    state.aggregator.aggregate(&user_id, &headers).await.map(Json)
}

#[derive(Debug, Serialize)]
pub struct CircuitView {
    pub state: CircuitState,
    pub stats: RollingCounts,
}

#[derive(Debug, Serialize)]
pub struct CircuitsView {
    pub users: CircuitView,
    pub orders: CircuitView,
}

#[derive(Debug, Serialize)]
pub struct HealthView {
    pub status: &'static str,
    pub circuits: CircuitsView,
}

fn circuit(backend: &Backend) -> CircuitView {
    let (state, stats) = backend.breaker().snapshot();
    CircuitView { state, stats }
}

/// `GET /health`: liveness plus a breaker snapshot per backend.
pub async fn health(State(state): State<AppState>) -> Json<HealthView> {
    Json(HealthView {
        status: STATUS_MESSAGE,
        circuits: CircuitsView {
            users: circuit(&state.users),
            orders: circuit(&state.orders),
        },
    })
}

/// `GET /status`
pub async fn status() -> impl IntoResponse {
    Json(serde_json::json!({ "status": STATUS_MESSAGE }))
}
