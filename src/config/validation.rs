//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ratios in range)
//! - Check that addresses and URLs parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use url::Url;

use crate::config::schema::GatewayConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    for (name, backend) in [
        ("users", &config.backends.users),
        ("orders", &config.backends.orders),
    ] {
        let field = format!("backends.{}.base_url", name);
        match Url::parse(&backend.base_url) {
            // The backend client speaks plain HTTP only.
            Ok(url) if url.scheme() == "http" => {}
            Ok(url) => errors.push(ValidationError::new(
                &field,
                format!("unsupported scheme '{}', expected 'http'", url.scheme()),
            )),
            Err(e) => errors.push(ValidationError::new(&field, e.to_string())),
        }
    }

    let breaker = &config.breaker;
    if breaker.min_requests == 0 {
        errors.push(ValidationError::new("breaker.min_requests", "must be at least 1"));
    }
    if !(breaker.failure_ratio > 0.0 && breaker.failure_ratio <= 1.0) {
        errors.push(ValidationError::new("breaker.failure_ratio", "must be in (0, 1]"));
    }
    if breaker.open_timeout_ms == 0 {
        errors.push(ValidationError::new("breaker.open_timeout_ms", "must be positive"));
    }

    let limit = &config.rate_limit;
    if limit.enabled {
        if !(limit.requests_per_second > 0.0 && limit.requests_per_second.is_finite()) {
            errors.push(ValidationError::new(
                "rate_limit.requests_per_second",
                "must be a positive number",
            ));
        }
        if limit.burst_size == 0 {
            errors.push(ValidationError::new("rate_limit.burst_size", "must be at least 1"));
        }
        if limit.idle_ttl_secs > 0 && limit.sweep_interval_secs == 0 {
            errors.push(ValidationError::new(
                "rate_limit.sweep_interval_secs",
                "must be positive when idle eviction is enabled",
            ));
        }
    }

    if config.timeouts.upstream_ms == 0 {
        errors.push(ValidationError::new("timeouts.upstream_ms", "must be positive"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be positive"));
    }

    if config.auth.enabled && config.auth.secret.is_empty() {
        errors.push(ValidationError::new(
            "auth.secret",
            "must be set when auth is enabled",
        ));
    }

    if !config.aggregation.primary_path.contains("{id}") {
        errors.push(ValidationError::new(
            "aggregation.primary_path",
            "must contain the {id} placeholder",
        ));
    }
    if !config.aggregation.secondary_path.starts_with('/') {
        errors.push(ValidationError::new(
            "aggregation.secondary_path",
            "must start with '/'",
        ));
    }

    for (i, rule) in config.validation.rules.iter().enumerate() {
        if rule.backend != "users" && rule.backend != "orders" {
            errors.push(ValidationError::new(
                &format!("validation.rules[{}].backend", i),
                format!("unknown backend '{}'", rule.backend),
            ));
        }
    }

    if config.security.max_body_size == 0 {
        errors.push(ValidationError::new("security.max_body_size", "must be positive"));
    }
    if config.security.max_upstream_body_size == 0 {
        errors.push(ValidationError::new(
            "security.max_upstream_body_size",
            "must be positive",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
