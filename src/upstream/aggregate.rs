//! Composite endpoint: one primary record joined with its secondary records.
//!
//! # Data Flow
//! ```text
//! GET /users/{id}/details
//!     → validate id
//!     → tokio::join!(fetch primary, fetch secondary)   (both always complete)
//!     → resolve() by fixed priority:
//!         1. primary 404           → 404, primary body verbatim
//!         2. primary failure       → 503 (breaker) / 500 (oversized body) / 502 (anything else)
//!         3. secondary failure     → 503 (breaker) / 500 (oversized body) / 502 (anything else)
//!         4. decode + filter by foreign key → {"user": .., "orders": [..]}
//! ```
//!
//! # Design Decisions
//! - Resolution depends only on the two outcomes, never on completion order
//! - Neither branch is cancelled when the other fails
//! - Records stay opaque; only the foreign key is inspected

use std::sync::Arc;

use axum::http::{HeaderMap, Method};
use serde_json::{Map, Value};

use crate::config::AggregationConfig;
use crate::error::GatewayError;
use crate::upstream::document::{Document, RecordKey};
use crate::upstream::forwarder::{Fetched, ForwardError, RequestForwarder};
use crate::upstream::Backend;

/// Result of one aggregation branch.
pub type BranchOutcome = Result<Fetched, ForwardError>;

/// Joins a primary record with the secondary records that reference it.
#[derive(Clone)]
pub struct AggregationCoordinator {
    forwarder: RequestForwarder,
    primary: Arc<Backend>,
    secondary: Arc<Backend>,
    config: AggregationConfig,
}

impl AggregationCoordinator {
    pub fn new(
        forwarder: RequestForwarder,
        primary: Arc<Backend>,
        secondary: Arc<Backend>,
        config: AggregationConfig,
    ) -> Self {
        Self {
            forwarder,
            primary,
            secondary,
            config,
        }
    }

    /// Fetch both sides concurrently and merge them.
    pub async fn aggregate(&self, id: &str, inbound: &HeaderMap) -> Result<Value, GatewayError> {
        // The segment goes into the backend path verbatim, so it must be a bare integer.
        let key = match id.parse::<i64>() {
            Ok(value) if !id.starts_with('+') => RecordKey::Int(value),
            _ => return Err(GatewayError::Validation("invalid userId")),
        };

        let primary_path = self.config.primary_path.replace("{id}", id);
        let (primary, secondary) = tokio::join!(
            self.forwarder
                .fetch(&self.primary, Method::GET, &primary_path, inbound),
            self.forwarder
                .fetch(&self.secondary, Method::GET, &self.config.secondary_path, inbound),
        );

        tracing::debug!(
            id = %id,
            primary_ok = primary.is_ok(),
            secondary_ok = secondary.is_ok(),
            "Aggregation branches completed"
        );

        self.resolve(&key, primary, secondary)
    }

    /// Combine two branch outcomes into the client response.
    pub fn resolve(
        &self,
        key: &RecordKey,
        primary: BranchOutcome,
        secondary: BranchOutcome,
    ) -> Result<Value, GatewayError> {
        if let Ok(fetched) = &primary {
            if fetched.status == axum::http::StatusCode::NOT_FOUND {
                return Err(GatewayError::UpstreamNotFound {
                    body: fetched.body.clone(),
                });
            }
        }

        let primary = successful(primary, &self.primary, &self.config.primary_noun)?;
        let secondary = successful(secondary, &self.secondary, &self.config.secondary_noun)?;

        let record: Document = serde_json::from_slice(&primary.body).map_err(|e| {
            GatewayError::Internal(format!("failed to parse {}: {}", self.config.primary_noun, e))
        })?;
        let related: Vec<Document> = serde_json::from_slice(&secondary.body).map_err(|e| {
            GatewayError::Internal(format!("failed to parse {}: {}", self.config.secondary_noun, e))
        })?;

        let total = related.len();
        let matching: Vec<Document> = related
            .into_iter()
            .filter(|doc| doc.key(&self.config.foreign_key).as_ref() == Some(key))
            .collect();

        tracing::debug!(total, matched = matching.len(), "Filtered secondary records");

        let mut merged = Map::new();
        merged.insert(
            self.config.primary_field.clone(),
            serde_json::to_value(record).map_err(internal)?,
        );
        merged.insert(
            self.config.secondary_field.clone(),
            serde_json::to_value(matching).map_err(internal)?,
        );
        Ok(Value::Object(merged))
    }
}

// A branch counts as successful only with a 2xx response.
fn successful(
    outcome: BranchOutcome,
    backend: &Backend,
    noun: &str,
) -> Result<Fetched, GatewayError> {
    let fallback = format!("failed to fetch {}", noun);
    match outcome {
        Ok(fetched) if fetched.status.is_success() => Ok(fetched),
        Ok(fetched) => {
            tracing::warn!(
                backend = %backend.name(),
                status = %fetched.status,
                "Backend returned an error status"
            );
            Err(GatewayError::Backend {
                service: backend.display_name().to_string(),
                body: Some(fetched.body),
                fallback,
            })
        }
        Err(ForwardError::Rejected { backend: service }) => {
            Err(GatewayError::Unavailable { service })
        }
        Err(err @ ForwardError::Oversized { .. }) => Err(GatewayError::Internal(err.to_string())),
        Err(err) => Err(GatewayError::Backend {
            service: err.backend().to_string(),
            body: None,
            fallback,
        }),
    }
}

fn internal(err: serde_json::Error) -> GatewayError {
    GatewayError::Internal(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::body::Bytes;
    use axum::http::StatusCode;
    use serde_json::json;
    use url::Url;

    use crate::resilience::{BreakerSettings, CallBreaker};

    fn backend(name: &str) -> Arc<Backend> {
        Arc::new(Backend::new(
            name,
            Url::parse("http://127.0.0.1:9").unwrap(),
            Arc::new(CallBreaker::new(name, BreakerSettings::default())),
        ))
    }

    fn coordinator() -> AggregationCoordinator {
        AggregationCoordinator::new(
            RequestForwarder::new(Duration::from_secs(1)),
            backend("users"),
            backend("orders"),
            AggregationConfig::default(),
        )
    }

    fn ok(status: StatusCode, body: Value) -> BranchOutcome {
        Ok(Fetched {
            status,
            body: Bytes::from(serde_json::to_vec(&body).unwrap()),
        })
    }

    fn raw(status: StatusCode, body: &'static [u8]) -> BranchOutcome {
        Ok(Fetched {
            status,
            body: Bytes::from_static(body),
        })
    }

    fn rejected(service: &str) -> BranchOutcome {
        Err(ForwardError::Rejected {
            backend: service.to_string(),
        })
    }

    #[test]
    fn test_filters_secondary_by_foreign_key() {
        let merged = coordinator()
            .resolve(
                &RecordKey::parse("2"),
                ok(StatusCode::OK, json!({"id": 2, "name": "Ann"})),
                ok(
                    StatusCode::OK,
                    json!([
                        {"id": 1, "userId": 2},
                        {"id": 2, "userId": 5},
                        {"id": 3, "userId": "2"},
                        {"id": 4}
                    ]),
                ),
            )
            .unwrap();

        assert_eq!(
            merged,
            json!({
                "user": {"id": 2, "name": "Ann"},
                "orders": [{"id": 1, "userId": 2}, {"id": 3, "userId": "2"}]
            })
        );
    }

    #[test]
    fn test_empty_match_is_empty_array() {
        let merged = coordinator()
            .resolve(
                &RecordKey::parse("9"),
                ok(StatusCode::OK, json!({"id": 9})),
                ok(StatusCode::OK, json!([{"id": 1, "userId": 2}])),
            )
            .unwrap();
        assert_eq!(merged["orders"], json!([]));
    }

    #[test]
    fn test_primary_not_found_wins_over_everything() {
        let body: &'static [u8] = b"{\"error\": \"User not found\"}\n";

        let err = coordinator()
            .resolve(
                &RecordKey::parse("2"),
                raw(StatusCode::NOT_FOUND, body),
                ok(StatusCode::OK, json!([])),
            )
            .unwrap_err();
        assert_eq!(
            err,
            GatewayError::UpstreamNotFound {
                body: Bytes::from_static(body)
            }
        );

        let err = coordinator()
            .resolve(&RecordKey::parse("2"), raw(StatusCode::NOT_FOUND, body), rejected("Orders"))
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_primary_failure_precedes_secondary_failure() {
        let err = coordinator()
            .resolve(&RecordKey::parse("2"), rejected("Users"), rejected("Orders"))
            .unwrap_err();
        assert_eq!(
            err,
            GatewayError::Unavailable {
                service: "Users".into()
            }
        );
    }

    #[test]
    fn test_secondary_backend_error_is_502() {
        let err = coordinator()
            .resolve(
                &RecordKey::parse("2"),
                ok(StatusCode::OK, json!({"id": 2})),
                raw(StatusCode::INTERNAL_SERVER_ERROR, b""),
            )
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert!(matches!(
            err,
            GatewayError::Backend { ref fallback, .. } if fallback == "failed to fetch orders"
        ));

        let err = coordinator()
            .resolve(
                &RecordKey::parse("2"),
                ok(StatusCode::OK, json!({"id": 2})),
                Err(ForwardError::Timeout {
                    backend: "Orders".into(),
                    limit: Duration::from_secs(3),
                }),
            )
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_malformed_payload_is_internal() {
        let err = coordinator()
            .resolve(
                &RecordKey::parse("2"),
                raw(StatusCode::OK, b"<html>"),
                ok(StatusCode::OK, json!([])),
            )
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let err = coordinator()
            .resolve(
                &RecordKey::parse("2"),
                ok(StatusCode::OK, json!({"id": 2})),
                ok(StatusCode::OK, json!({"not": "a list"})),
            )
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_oversized_branch_is_internal() {
        let err = coordinator()
            .resolve(
                &RecordKey::parse("2"),
                ok(StatusCode::OK, json!({"id": 2})),
                Err(ForwardError::Oversized {
                    backend: "Orders".into(),
                    limit: 10,
                }),
            )
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(matches!(err, GatewayError::Internal(_)));
    }

    #[tokio::test]
    async fn test_non_numeric_id_is_rejected_before_fetching() {
        let err = coordinator()
            .aggregate("abc", &HeaderMap::new())
            .await
            .unwrap_err();
        assert_eq!(err, GatewayError::Validation("invalid userId"));
    }

    #[tokio::test]
    async fn test_padded_or_signed_id_is_rejected() {
        for id in [" 2", "2 ", "\t2", "+2"] {
            let err = coordinator()
                .aggregate(id, &HeaderMap::new())
                .await
                .unwrap_err();
            assert_eq!(err, GatewayError::Validation("invalid userId"), "id {:?}", id);
        }
    }
}
