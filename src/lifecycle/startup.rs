//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize subsystems in dependency order from a validated config
//! - Start the metrics exporter when enabled
//! - Bind the listener and serve until a termination signal or a server error
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listener binds last, so traffic only arrives once the router is built

use std::future::Future;
use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::GatewayConfig;
use crate::http::{HttpServer, ServerError};
use crate::lifecycle::{signals, Shutdown};
use crate::observability::metrics;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Server(#[from] ServerError),

    #[error("invalid metrics address {0:?}")]
    MetricsAddress(String),

    #[error("failed to start metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Run the gateway until SIGINT/SIGTERM.
pub async fn run(config: GatewayConfig) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        let addr: SocketAddr = config
            .observability
            .metrics_address
            .parse()
            .map_err(|_| StartupError::MetricsAddress(config.observability.metrics_address.clone()))?;
        metrics::init_metrics(addr)?;
    }

    let server = HttpServer::new(config)?;
    let config = server.config();

    tracing::info!(
        users = %config.backends.users.base_url,
        orders = %config.backends.orders.base_url,
        rate_limit = config.rate_limit.enabled,
        auth = config.auth.enabled,
        upstream_timeout_ms = config.timeouts.upstream_ms,
        "Gateway configured"
    );

    let address = config.listener.bind_address.clone();
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| StartupError::Bind { address, source })?;

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let serving = tokio::spawn(server.run(listener, server_shutdown));

    supervise(serving, signals::forward_signals(&shutdown)).await
}

/// Wait for the server task, or for `stop` and then the drained server.
///
/// A server that ends on its own returns at once, without waiting for `stop`.
async fn supervise<F>(
    mut serving: JoinHandle<std::io::Result<()>>,
    stop: F,
) -> Result<(), StartupError>
where
    F: Future<Output = ()>,
{
    let finished = tokio::select! {
        finished = &mut serving => finished,
        _ = stop => serving.await,
    };

    match finished {
        Ok(result) => result?,
        Err(e) => tracing::error!(error = %e, "Server task failed"),
    }
    Ok(())
}
