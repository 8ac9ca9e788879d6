//! Request payload validation.
//!
//! # Responsibilities
//! - Reject write bodies that are not JSON objects when a rule applies
//! - Enforce the configured required fields per backend and method
//!
//! # Design Decisions
//! - Rules come from configuration; revisions of the backends disagree on
//!   which fields are mandatory, so no single rule set is hard-coded
//! - A rejected payload never reaches a backend

use axum::http::Method;
use serde_json::Value;

use crate::config::PayloadRule;
use crate::error::GatewayError;

/// Compiled rule set.
#[derive(Debug, Clone, Default)]
pub struct PayloadRules {
    rules: Vec<PayloadRule>,
}

impl PayloadRules {
    pub fn new(rules: Vec<PayloadRule>) -> Self {
        Self { rules }
    }

    fn required_fields(&self, backend: &str, method: &Method) -> Option<&[String]> {
        self.rules
            .iter()
            .find(|r| r.backend == backend && r.method.eq_ignore_ascii_case(method.as_str()))
            .map(|r| r.required.as_slice())
    }

    /// Check `body` for a write to `backend`.
    pub fn check(&self, backend: &str, method: &Method, body: &[u8]) -> Result<(), GatewayError> {
        let Some(required) = self.required_fields(backend, method) else {
            return Ok(());
        };

        let document: Value = serde_json::from_slice(body)
            .map_err(|_| GatewayError::Validation("invalid JSON"))?;
        let object = document
            .as_object()
            .ok_or(GatewayError::Validation("invalid JSON"))?;

        let missing: Vec<&str> = required
            .iter()
            .filter(|field| object.get(field.as_str()).map_or(true, is_blank))
            .map(String::as_str)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            tracing::debug!(backend, method = %method, ?missing, "Payload missing required fields");
            Err(GatewayError::Validation("missing required fields"))
        }
    }
}

// Zero values count as absent, as the backends treat them.
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::Array(items) => items.is_empty(),
        Value::Bool(_) | Value::Object(_) => false,
    }
}
