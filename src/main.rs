//! Shootout Room Server - Authoritative room server for a betting shooter
//!
//! One process hosts one room. It handles:
//! - WebSocket connections for players
//! - The command dispatcher that owns all game state
//! - Simulation and betting clocks, bot drivers
//! - An operator console and phase reports to matchmaking

mod app;
mod config;
mod console;
mod game;
mod http;
mod matchmaking;
mod util;
mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::AppState;
use crate::config::Config;
use crate::game::timers::{run_betting_clock, run_simulation_clock};
use crate::game::{channel, Dispatcher, IdAllocator, Outbox, Session};
use crate::http::build_router;
use crate::matchmaking::PhaseReporter;
use crate::util::time::init_server_time;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Arc::new(Config::from_env()?);

    // Initialize tracing
    init_tracing(&config.log_level);

    // Initialize server time tracking
    init_server_time();

    info!("Starting Shootout Room Server");
    info!(
        room_id = %config.room_id,
        max_rounds = config.max_rounds,
        accuracy_mode = ?config.accuracy_mode,
        "Room configuration"
    );

    let seed = config.game_seed.unwrap_or_else(rand::random);
    let (commands, rx) = channel();
    let outbox = Outbox::new();
    let ids = IdAllocator::new();
    let reporter = PhaseReporter::new(config.matchmaking_callback_url.clone(), config.room_id.clone());

    let session = Session::new(
        config.room_id.clone(),
        config.rules(),
        outbox.clone(),
        commands.clone(),
        reporter,
        ids.clone(),
        seed,
    );
    let (dispatcher, status) = Dispatcher::new(session, rx);
    tokio::spawn(dispatcher.run());

    tokio::spawn(run_simulation_clock(commands.clone()));
    tokio::spawn(run_betting_clock(commands.clone(), config.bet_interval()));

    let shutdown = Arc::new(Notify::new());
    if config.admin_console {
        tokio::spawn(console::run(
            console::spawn_stdin_reader(),
            commands.clone(),
            status.clone(),
            shutdown.clone(),
        ));
    }

    // Create application state
    let state = AppState::new(config.clone(), commands, outbox, ids, status);

    // Build router
    let router = build_router(state);

    // Start server
    let addr: SocketAddr = config.server_addr;
    let listener = TcpListener::bind(addr).await?;

    info!("Server listening on {}", addr);
    info!("Health check: http://{}/health", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

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

/// Resolves on Ctrl+C, SIGTERM or a console `quit`
async fn shutdown_signal(console_quit: Arc<Notify>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
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
        _ = console_quit.notified() => {
            info!("Console quit, starting graceful shutdown");
        }
    }
}
