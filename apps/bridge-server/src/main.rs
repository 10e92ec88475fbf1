//! # Fiscal Bridge
//!
//! Webhook receiver and admin API for commerce → fiscal document issuance.
//!
//! ## Startup
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  tracing (EnvFilter, default info)                                      │
//! │     ▼                                                                   │
//! │  BridgeConfig::load  (bridge.toml ◄ FISCAL_BRIDGE_* env)                │
//! │     ▼                                                                   │
//! │  SQLite (migrations) ──► EventProcessor ──► ReplayWorker (spawned)      │
//! │     ▼                                                                   │
//! │  axum::serve ── ctrl-c / SIGTERM ──► stop worker ──► close pool         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use fiscal_bridge_server::{build_router, AppState};
use fiscal_db::{Database, DbConfig};
use fiscal_sync::{BridgeConfig, EventProcessor, HttpClientFactory, ReplayWorker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    info!("Starting fiscal bridge...");

    let config_path = std::env::var_os("FISCAL_BRIDGE_CONFIG").map(PathBuf::from);
    let config = BridgeConfig::load(config_path).context("loading configuration")?;
    info!(
        bind = %config.server.bind_address(),
        fiscal_url = %config.fiscal.base_url,
        replay = config.replay.enabled,
        "Configuration loaded"
    );

    let db_path = config.database_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }
    let db = Database::new(
        DbConfig::new(&db_path).max_connections(config.database.max_connections),
    )
    .await
    .context("opening database")?;
    info!(path = %db_path.display(), "Database ready");

    let clients = Arc::new(HttpClientFactory::new(&config)?);
    let processor = EventProcessor::new(db.clone(), clients, config.replay.clone());

    let replay = if config.replay.enabled {
        let (worker, handle) =
            ReplayWorker::new(processor.clone(), db.clone(), config.replay.clone());
        tokio::spawn(worker.run());
        Some(handle)
    } else {
        warn!("Replay worker disabled; failed events will not be retried");
        None
    };

    let state = AppState::new(
        db.clone(),
        processor,
        &config.commerce.webhook_secret,
        config.admin.token.as_deref(),
    );
    if state.admin_token.is_none() {
        warn!("No admin token configured; /api routes will reject every request");
    }

    let addr = config.server.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "Listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    if let Some(handle) = replay {
        if let Err(e) = handle.shutdown().await {
            error!(?e, "Failed to stop replay worker");
        }
    }
    db.close().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(?e, "Failed to install Ctrl+C handler");
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
                error!(?e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
