//! Edge API Gateway
//!
//! # Architecture Overview
//!
//! ```text
//!                       ┌──────────────────────────────────────────────────┐
//!                       │                   EDGE GATEWAY                   │
//!                       │                                                  │
//!   Client Request      │  ┌──────────┐   ┌──────────┐   ┌─────────────┐   │
//!   ────────────────────┼─▶│  rate    │──▶│  auth    │──▶│  handlers   │   │
//!                       │  │  limit   │   │ (bearer) │   │  + payload  │   │
//!                       │  └──────────┘   └──────────┘   └──────┬──────┘   │
//!                       │                                       │          │
//!                       │                  ┌────────────────────┤          │
//!                       │                  ▼                    ▼          │
//!                       │          ┌──────────────┐    ┌──────────────┐    │
//!                       │          │  aggregate   │───▶│  forwarder   │    │
//!                       │          │ (join+filter)│    │ breaker +    │    │
//!                       │          └──────────────┘    │ deadline     │    │
//!                       │                              └──────┬───────┘    │
//!   Client Response     │  ┌──────────────┐                   │            │
//!   ◀───────────────────┼──│ GatewayError │◀──────────────────┴────────────┼──▶ users / orders
//!                       │  │  translation │                                │
//!                       │  └──────────────┘                                │
//!                       └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use edge_gateway::config::load_config;
use edge_gateway::lifecycle::startup;
use edge_gateway::observability::logging;

#[derive(Parser)]
#[command(name = "edge-gateway", version, about = "Edge API gateway for the users and orders services")]
struct Cli {
    /// Path to a TOML configuration file. Defaults apply when omitted.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    logging::init_logging(&config.observability)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        "edge-gateway starting"
    );

    startup::run(config).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
