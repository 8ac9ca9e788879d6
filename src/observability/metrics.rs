//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (requests, latency, admission, breaker state)
//! - Expose a Prometheus-compatible scrape endpoint
//! - Track per-backend call outcomes
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, route, status
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_rate_limited_total` (counter): requests denied by the limiter
//! - `gateway_upstream_requests_total` (counter): backend calls by outcome
//! - `gateway_breaker_transitions_total` (counter): breaker state changes
//! - `gateway_breaker_state` (gauge): 0=closed, 1=half-open, 2=open
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Route label is the matched route template, never the raw path

use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder};

use crate::resilience::CircuitState;

const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full("gateway_request_duration_seconds".to_string()),
            LATENCY_BUCKETS,
        )?
        .install()?;

    ::metrics::describe_counter!("gateway_requests_total", "Requests handled by the gateway");
    ::metrics::describe_histogram!(
        "gateway_request_duration_seconds",
        ::metrics::Unit::Seconds,
        "End-to-end request latency"
    );
    ::metrics::describe_counter!(
        "gateway_rate_limited_total",
        "Requests rejected by the rate limiter"
    );
    ::metrics::describe_counter!(
        "gateway_upstream_requests_total",
        "Backend calls by outcome"
    );
    ::metrics::describe_counter!(
        "gateway_breaker_transitions_total",
        "Circuit breaker state transitions"
    );
    ::metrics::describe_gauge!(
        "gateway_breaker_state",
        "Circuit breaker state (0=closed, 1=half-open, 2=open)"
    );

    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(method: &str, route: &str, status: u16, started: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("route", route.to_string()),
        ("status", status.to_string()),
    ];
    ::metrics::counter!("gateway_requests_total", &labels).increment(1);
    ::metrics::histogram!(
        "gateway_request_duration_seconds",
        "method" => method.to_string(),
        "route" => route.to_string()
    )
    .record(started.elapsed().as_secs_f64());
}

pub fn record_rate_limited() {
    ::metrics::counter!("gateway_rate_limited_total").increment(1);
}

/// Outcome is one of `success`, `rejected`, `timeout`, `transport_error`, `oversized`.
pub fn record_upstream(backend: &str, outcome: &'static str) {
    ::metrics::counter!(
        "gateway_upstream_requests_total",
        "backend" => backend.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Breaker observer: counts the transition and updates the state gauge.
pub fn record_breaker_transition(backend: &str, from: CircuitState, to: CircuitState) {
    ::metrics::counter!(
        "gateway_breaker_transitions_total",
        "backend" => backend.to_string(),
        "from" => from.as_str(),
        "to" => to.as_str()
    )
    .increment(1);
    record_breaker_state(backend, to);
}

pub fn record_breaker_state(backend: &str, state: CircuitState) {
    ::metrics::gauge!("gateway_breaker_state", "backend" => backend.to_string())
        .set(state.as_gauge());
}

/// Route-level middleware recording count and latency per matched route.
pub async fn track_requests(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;
    record_request(&method, &route, response.status().as_u16(), started);
    response
}
