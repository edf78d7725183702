//! Prop Hunt Server - Authoritative hide-and-seek match server
//!
//! This is the main entry point. It runs:
//! - The game listener (newline-delimited text protocol over TCP)
//! - The HTTP status endpoint
//!
//! A single match cycles WAITING -> HIDING -> PLAYING -> ENDED -> WAITING for
//! as long as the process lives.

mod app;
mod config;
mod game;
mod http;
mod net;
mod util;

use std::future::Future;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::AppState;
use crate::config::Config;
use crate::http::build_router;
use crate::util::time::init_server_time;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    // Initialize server time tracking
    init_server_time();

    info!("Starting Prop Hunt Server");
    info!(
        max_players = config.max_players,
        hide_ms = config.timings.hide_duration.as_millis() as u64,
        round_ms = config.timings.round_time_limit.as_millis() as u64,
        "Match configuration"
    );

    // Create application state
    let state = AppState::new(config.clone());

    let game_listener = TcpListener::bind(config.server_addr).await?;
    let http_listener = TcpListener::bind(config.http_addr).await?;

    info!("Game server listening on {}", config.server_addr);
    info!("Health check: http://{}/health", config.http_addr);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let game_task = tokio::spawn(net::serve(
        game_listener,
        state.clone(),
        stopped(shutdown_rx.clone()),
    ));

    axum::serve(http_listener, build_router(state))
        .with_graceful_shutdown(stopped(shutdown_rx))
        .await?;

    game_task.await??;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Resolves once the shutdown flag flips
fn stopped(mut rx: watch::Receiver<bool>) -> impl Future<Output = ()> + Send + 'static {
    async move {
        let _ = rx.wait_for(|stop| *stop).await;
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
