//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resilience::BreakerSettings;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// The two backend services.
    pub backends: BackendsConfig,

    /// Circuit breaker thresholds, shared by both backends.
    pub breaker: BreakerConfig,

    /// Per-client rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Bearer token verification.
    pub auth: AuthConfig,

    /// Composite endpoint settings.
    pub aggregation: AggregationConfig,

    /// Request payload rules.
    pub validation: ValidationConfig,

    /// Request size limits.
    pub security: SecurityConfig,

    /// Cross-origin settings.
    pub cors: CorsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
        }
    }
}

/// Backend service locations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendsConfig {
    pub users: BackendConfig,
    pub orders: BackendConfig,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            users: BackendConfig {
                base_url: "http://service_users:8000".to_string(),
            },
            orders: BackendConfig {
                base_url: "http://service_orders:8000".to_string(),
            },
        }
    }
}

/// A single backend service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Base URL, e.g. "http://127.0.0.1:3000".
    pub base_url: String,
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Calls required in the current window before the failure ratio is evaluated.
    pub min_requests: u32,

    /// Failure ratio (0, 1] at which the circuit opens.
    pub failure_ratio: f64,

    /// Time the circuit stays open before a probe is admitted, in milliseconds.
    pub open_timeout_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            min_requests: 5,
            failure_ratio: 0.5,
            open_timeout_ms: 3_000,
        }
    }
}

impl BreakerConfig {
    pub fn settings(&self) -> BreakerSettings {
        BreakerSettings {
            min_requests: self.min_requests,
            failure_ratio: self.failure_ratio,
            open_timeout: Duration::from_millis(self.open_timeout_ms),
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Token refill rate per client, per second.
    pub requests_per_second: f64,

    /// Bucket capacity.
    pub burst_size: u32,

    /// Evict buckets idle for longer than this. 0 keeps buckets forever.
    pub idle_ttl_secs: u64,

    /// How often the idle sweep runs when eviction is enabled.
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_second: 5.0,
            burst_size: 10,
            idle_ttl_secs: 0,
            sweep_interval_secs: 60,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for a single backend call in milliseconds.
    pub upstream_ms: u64,

    /// Overall inbound request timeout in seconds.
    pub request_secs: u64,

    /// How long in-flight requests may drain after a shutdown signal.
    pub shutdown_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            upstream_ms: 3_000,
            request_secs: 30,
            shutdown_secs: 5,
        }
    }
}

/// Bearer token verification.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// Require a valid bearer token on resource routes.
    pub enabled: bool,

    /// Shared HMAC secret used to verify tokens.
    pub secret: String,
}

/// Composite endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Primary lookup path; `{id}` is replaced by the requested identifier.
    pub primary_path: String,

    /// Secondary collection path, fetched unfiltered.
    pub secondary_path: String,

    /// Field of each secondary record that references the primary.
    pub foreign_key: String,

    /// Output field holding the primary record.
    pub primary_field: String,

    /// Output field holding the matching secondary records.
    pub secondary_field: String,

    /// Noun used in synthesized primary errors ("failed to fetch user").
    pub primary_noun: String,

    /// Noun used in synthesized secondary errors ("failed to fetch orders").
    pub secondary_noun: String,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            primary_path: "/users/{id}".to_string(),
            secondary_path: "/orders".to_string(),
            foreign_key: "userId".to_string(),
            primary_field: "user".to_string(),
            secondary_field: "orders".to_string(),
            primary_noun: "user".to_string(),
            secondary_noun: "orders".to_string(),
        }
    }
}

/// Payload validation rules for write requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub rules: Vec<PayloadRule>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            rules: vec![
                PayloadRule::new("users", "POST", &["name", "email"]),
                PayloadRule::new("users", "PUT", &["id", "name"]),
                PayloadRule::new("orders", "POST", &["name", "status", "userId"]),
            ],
        }
    }
}

/// Fields required in the JSON body of one backend/method pair.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct PayloadRule {
    /// Backend name ("users" or "orders").
    pub backend: String,

    /// HTTP method, case-insensitive.
    pub method: String,

    /// Fields that must be present and non-empty.
    pub required: Vec<String>,
}

impl PayloadRule {
    pub fn new(backend: &str, method: &str, required: &[&str]) -> Self {
        Self {
            backend: backend.to_string(),
            method: method.to_string(),
            required: required.iter().map(|f| f.to_string()).collect(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum inbound request body size in bytes.
    pub max_body_size: usize,

    /// Maximum backend response body the gateway buffers, in bytes.
    ///
    /// Only the aggregated route buffers; a larger body fails that request
    /// with 500 and is not held against the backend's breaker.
    pub max_upstream_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024,           // 2MB
            max_upstream_body_size: 16 * 1024 * 1024, // 16MB
        }
    }
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed origins; "*" allows any.
    pub allowed_origins: Vec<String>,

    /// Preflight cache lifetime in seconds.
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            max_age_secs: 300,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive.
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
