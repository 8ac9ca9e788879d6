//! Backend service descriptor.
//!
//! # Responsibilities
//! - Represent one backend service (name, base URL)
//! - Own the backend's circuit breaker, shared by every request to it
//! - Build target URIs for forwarded paths

use std::sync::Arc;

use axum::http::Uri;
use url::Url;

use crate::config::BackendConfig;
use crate::observability::metrics;
use crate::resilience::{BreakerSettings, CallBreaker};

/// A single backend service. Immutable after construction.
#[derive(Debug)]
pub struct Backend {
    /// Routing key ("users").
    name: String,
    /// Name used in client-facing messages ("Users").
    display_name: String,
    base_url: Url,
    breaker: Arc<CallBreaker>,
}

impl Backend {
    pub fn new(name: &str, base_url: Url, breaker: Arc<CallBreaker>) -> Self {
        Self {
            name: name.to_string(),
            display_name: capitalize(name),
            base_url,
            breaker,
        }
    }

    /// Build a backend whose breaker reports transitions to the metrics layer.
    pub fn from_config(
        name: &str,
        config: &BackendConfig,
        settings: BreakerSettings,
    ) -> Result<Self, url::ParseError> {
        let base_url = Url::parse(&config.base_url)?;
        let breaker = CallBreaker::new(name, settings)
            .with_observer(Arc::new(metrics::record_breaker_transition));
        metrics::record_breaker_state(name, breaker.state());

        Ok(Self::new(name, base_url, Arc::new(breaker)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn breaker(&self) -> &Arc<CallBreaker> {
        &self.breaker
    }

    /// Absolute URI for `path_and_query` on this backend.
    ///
    /// The base URL's own path, if any, is kept as a prefix.
    pub fn target(&self, path_and_query: &str) -> Result<Uri, axum::http::uri::InvalidUri> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let suffix = if path_and_query.starts_with('/') {
            path_and_query.to_string()
        } else {
            format!("/{}", path_and_query)
        };
        format!("{}{}", base, suffix).parse()
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(base: &str) -> Backend {
        Backend::new(
            "orders",
            Url::parse(base).unwrap(),
            Arc::new(CallBreaker::new("orders", BreakerSettings::default())),
        )
    }

    #[test]
    fn test_display_name() {
        assert_eq!(backend("http://service_orders:8000").display_name(), "Orders");
    }

    #[test]
    fn test_target_keeps_query_and_prefix() {
        let b = backend("http://service_orders:8000");
        assert_eq!(
            b.target("/orders?status=new").unwrap().to_string(),
            "http://service_orders:8000/orders?status=new"
        );

        let prefixed = backend("http://10.0.0.5:9000/api/");
        assert_eq!(
            prefixed.target("/orders/7").unwrap().to_string(),
            "http://10.0.0.5:9000/api/orders/7"
        );
    }

    #[test]
    fn test_from_config_rejects_bad_url() {
        let config = BackendConfig {
            base_url: "not a url".to_string(),
        };
        assert!(Backend::from_config("users", &config, BreakerSettings::default()).is_err());
    }
}
