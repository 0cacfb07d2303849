//! cmdsock: a local command server on a Unix domain socket
//!
//! Clients send newline-delimited JSON requests naming one of a fixed set
//! of commands and receive one JSON response per request.
//!
//! Features:
//! - Utility commands: echo, time, calculate, ping, help
//! - Shared key-value storage: store, retrieve, list_keys, delete
//! - Concurrent connections with in-order responses per connection
//! - Graceful shutdown on Ctrl-C or SIGTERM
//! - Configuration via CLI arguments or TOML file

mod commands;
mod config;
mod connection;
mod dispatch;
mod framer;
mod protocol;
mod server;
mod storage;

use config::Config;
use server::Server;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        socket = %config.socket_path.display(),
        read_buffer_size = config.read_buffer_size,
        shutdown_grace_secs = config.shutdown_grace.as_secs(),
        workers = ?config.workers,
        "Starting cmdsock server"
    );

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    if let Some(workers) = config.workers {
        builder.worker_threads(workers);
    }
    let runtime = builder.enable_all().build()?;

    runtime.block_on(Server::new(config).run(shutdown_signal()))?;
    Ok(())
}

/// Resolves on the first Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
