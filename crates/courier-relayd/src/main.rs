//! # courier-relayd
//!
//! The relay server binary: parses the CLI, installs logging and metrics,
//! wires the broker into the server, and runs until interrupted.

#![deny(unsafe_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use courier_broker::{MemoryBroker, MessageBroker};
use courier_server::config::ServerConfig;
use courier_server::metrics;
use courier_server::server::RelayServer;

/// Real-time chat relay server.
#[derive(Parser, Debug)]
#[command(name = "courier-relayd", about = "Real-time chat relay server")]
struct Cli {
    /// Host to bind.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to bind (0 for auto-assign).
    #[arg(long, default_value = "8080")]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = ServerConfig {
        host: cli.host,
        port: cli.port,
        ..ServerConfig::default()
    };
    config.apply_env_overrides();

    let metrics_handle = metrics::install_recorder();

    // Single-process deployment: the broker lives in-process. Multi-process
    // deployments supply their own `MessageBroker` over a shared transport.
    let broker: Arc<dyn MessageBroker> = Arc::new(MemoryBroker::new());

    let shutdown_timeout = config.shutdown_timeout();
    let server = RelayServer::new(config, broker, metrics_handle);

    let bridge_task = server
        .bridge()
        .clone()
        .start_inbound(server.shutdown().token())
        .await
        .context("failed to start the broker inbound subscription")?;

    let (addr, serve_task) = server
        .listen()
        .await
        .context("failed to bind the relay listener")?;
    info!(%addr, "courier relay started");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for the shutdown signal")?;
    info!("shutdown signal received");

    server
        .shutdown()
        .drain(vec![bridge_task, serve_task], shutdown_timeout)
        .await;

    Ok(())
}
