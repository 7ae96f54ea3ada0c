//! Process entry point: bind, log, spawn tickers, accept connections until
//! shutdown. Everything with actual protocol behavior lives in the library
//! crate; this is the listener glue that owns the process lifecycle.

use std::process::ExitCode;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use colony_relay::config::Config;
use colony_relay::connection::handle_connection;
use colony_relay::server::ServerState;
use colony_relay::ticker;

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(?err, "exiting after fatal error");
            ExitCode::FAILURE
        }
    }
}

/// Aggregates startup failures through `anyhow`: named leaf errors (this
/// crate's `RelayError`, per connection) vs. `anyhow::Result` for the
/// one-shot failures that actually end the process
/// (`valence_network::connect`'s accept loop takes the same approach).
async fn run() -> anyhow::Result<()> {
    let config = Config::from_env();

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, "listening");

    let server = ServerState::new();
    let (shutdown_tx, _) = broadcast::channel(1);

    let idle_reaper = tokio::spawn(ticker::run_idle_reaper(
        server.clone(),
        config.idle_timeout,
        shutdown_tx.subscribe(),
    ));
    let lobby_ping = tokio::spawn(ticker::run_lobby_ping(
        server.clone(),
        shutdown_tx.subscribe(),
    ));

    let accept_loop = {
        let server = server.clone();
        let shutdown_tx = shutdown_tx.clone();
        async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer_addr)) => {
                        info!(%peer_addr, "accepted connection");
                        let server = server.clone();
                        let shutdown_rx = shutdown_tx.subscribe();
                        tokio::spawn(handle_connection(server, stream, shutdown_rx));
                    }
                    Err(err) => {
                        error!(%err, "accept failed, continuing");
                    }
                }
            }
        }
    };

    tokio::select! {
        _ = accept_loop => {}
        result = tokio::signal::ctrl_c() => {
            result.context("failed to install ctrl-c handler")?;
            info!("shutdown signal received, draining connections");
        }
    }

    let _ = shutdown_tx.send(());
    let _ = idle_reaper.await;
    let _ = lobby_ping.await;

    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
