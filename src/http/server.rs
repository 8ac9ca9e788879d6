//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build backends, breakers, forwarder and aggregator from configuration
//! - Create the Axum router with the route table
//! - Wire up middleware (request ID, CORS, tracing, limits, admission, auth)
//! - Serve with graceful shutdown and a bounded drain
//!
//! # Middleware Order (outermost first)
//! ```text
//! SetRequestId → CORS → PropagateRequestId → Trace → CatchPanic → Timeout
//!     → BodyLimit → RateLimit → [route] Metrics → [protected] Auth → handler
//! ```

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{CorsConfig, GatewayConfig};
use crate::error::GatewayError;
use crate::http::handlers::{self, AppState};
use crate::http::request::{propagate_request_id_layer, set_request_id_layer, X_REQUEST_ID};
use crate::observability::metrics;
use crate::observability::tracing::RequestSpan;
use crate::security::auth::require_bearer;
use crate::security::rate_limit::rate_limit_middleware;
use crate::security::{HmacJwtVerifier, PayloadRules, TokenBucketLimiter, TokenVerifier};
use crate::upstream::{AggregationCoordinator, Backend, RequestForwarder};

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid base URL for backend {name}: {source}")]
    InvalidBackendUrl {
        name: &'static str,
        #[source]
        source: url::ParseError,
    },
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
    limiter: Option<Arc<TokenBucketLimiter>>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: GatewayConfig) -> Result<Self, ServerError> {
        let settings = config.breaker.settings();
        let users = Backend::from_config("users", &config.backends.users, settings.clone())
            .map_err(|source| ServerError::InvalidBackendUrl {
                name: "users",
                source,
            })?;
        let orders = Backend::from_config("orders", &config.backends.orders, settings)
            .map_err(|source| ServerError::InvalidBackendUrl {
                name: "orders",
                source,
            })?;
        let users = Arc::new(users);
        let orders = Arc::new(orders);

        let forwarder = RequestForwarder::new(Duration::from_millis(config.timeouts.upstream_ms))
            .with_body_limit(config.security.max_upstream_body_size);
        let aggregator = AggregationCoordinator::new(
            forwarder.clone(),
            users.clone(),
            orders.clone(),
            config.aggregation.clone(),
        );

        let state = AppState {
            users,
            orders,
            forwarder,
            aggregator,
            payload_rules: Arc::new(PayloadRules::new(config.validation.rules.clone())),
        };

        let limiter = config
            .rate_limit
            .enabled
            .then(|| Arc::new(TokenBucketLimiter::from_config(&config.rate_limit)));

        let verifier: Option<Arc<dyn TokenVerifier>> = config.auth.enabled.then(|| {
            Arc::new(HmacJwtVerifier::new(config.auth.secret.as_bytes())) as Arc<dyn TokenVerifier>
        });

        let router = Self::build_router(&config, state, limiter.clone(), verifier);
        Ok(Self {
            router,
            config,
            limiter,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(
        config: &GatewayConfig,
        state: AppState,
        limiter: Option<Arc<TokenBucketLimiter>>,
        verifier: Option<Arc<dyn TokenVerifier>>,
    ) -> Router {
        let mut protected = Router::new()
            .route(
                "/users",
                get(handlers::users_proxy)
                    .post(handlers::users_proxy)
                    .put(handlers::users_proxy),
            )
            .route(
                "/users/{userId}",
                get(handlers::users_proxy).delete(handlers::users_proxy),
            )
            .route("/users/{userId}/details", get(handlers::user_details))
            .route(
                "/orders",
                get(handlers::orders_proxy).post(handlers::orders_proxy),
            )
            .route("/orders/status", get(handlers::orders_proxy))
            .route("/orders/health", get(handlers::orders_proxy))
            .route(
                "/orders/{orderId}",
                get(handlers::orders_proxy)
                    .put(handlers::orders_proxy)
                    .delete(handlers::orders_proxy),
            );

        if let Some(verifier) = verifier {
            protected = protected.route_layer(middleware::from_fn_with_state(verifier, require_bearer));
        }

        let mut router = Router::new()
            .route("/health", get(handlers::health))
            .route("/status", get(handlers::status))
            .merge(protected)
            .route_layer(middleware::from_fn(metrics::track_requests))
            .with_state(state);

        if let Some(limiter) = limiter {
            router = router.layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));
        }

        router
            .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(TraceLayer::new_for_http().make_span_with(RequestSpan))
            .layer(propagate_request_id_layer())
            .layer(cors_layer(&config.cors))
            .layer(set_request_id_layer())
    }

    /// The fully layered router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Run the server until `shutdown` fires, then drain for at most
    /// `timeouts.shutdown_secs`.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        if let Some(limiter) = &self.limiter {
            let rl = &self.config.rate_limit;
            if rl.idle_ttl_secs > 0 {
                tokio::spawn(limiter.clone().run_sweeper(
                    Duration::from_secs(rl.idle_ttl_secs),
                    Duration::from_secs(rl.sweep_interval_secs.max(1)),
                    shutdown.resubscribe(),
                ));
            }
        }

        let drain = Duration::from_secs(self.config.timeouts.shutdown_secs);
        let (draining_tx, mut draining_rx) = watch::channel(false);

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let serve = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
                let _ = draining_tx.send(true);
            })
            .into_future();

        let drain_deadline = async move {
            let signalled = draining_rx.wait_for(|draining| *draining).await.is_ok();
            if !signalled {
                std::future::pending::<()>().await;
            }
            tokio::time::sleep(drain).await;
        };

        tokio::select! {
            result = serve => result?,
            _ = drain_deadline => {
                tracing::warn!(drain_secs = drain.as_secs(), "Drain timeout elapsed, dropping in-flight requests");
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origins = if config.allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            config
                .allowed_origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::ACCEPT,
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            X_REQUEST_ID,
        ])
        .expose_headers([X_REQUEST_ID])
        .max_age(Duration::from_secs(config.max_age_secs))
}

fn panic_response(panic: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    GatewayError::Internal(format!("handler panicked: {}", detail)).into_response()
}
