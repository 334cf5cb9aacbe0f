//! Call Controller
//!
//! Stateful WebSocket signaling relay for two-party audio/video calls.
//!
//! # Startup flow
//!
//! 1. Load configuration from environment
//! 2. Spawn the registry actor (directory, sessions, supervision timers)
//! 3. Serve the WebSocket and health endpoints
//! 4. Wait for SIGINT, then cancel the actor and drain the server

#![warn(clippy::pedantic)]

use call_controller::actors::RegistryActorHandle;
use call_controller::config::Config;
use call_controller::server;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "call_controller=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting call controller");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        dial_timeout_seconds = config.dial_timeout_seconds,
        connect_timeout_seconds = config.connect_timeout_seconds,
        sweep_interval_seconds = config.sweep_interval_seconds,
        session_max_age_seconds = config.session_max_age_seconds,
        "Configuration loaded successfully"
    );

    let registry = RegistryActorHandle::new(&config);
    let shutdown = registry.child_token();

    let signal_registry = registry.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            signal_registry.cancel();
        }
    });

    server::serve(&config.bind_address, registry, shutdown).await?;

    info!("Call controller stopped");
    Ok(())
}
