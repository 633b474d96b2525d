//! Order entry system gateway
//!
//! Builds the service graph, restores or clears persisted state, starts
//! the background tasks (matching tick, snapshot broadcaster, latency
//! heartbeat, session sweep), and serves the REST + WebSocket surface.

mod config;
mod error;
mod handlers;
mod models;
mod router;
mod state;

use std::sync::Arc;

use book::OrderBook;
use config::Config;
use engine::MatchingEngine;
use feed::{EventBus, SessionConfig, SessionRegistry};
use ledger::AccountLedger;
use router::create_router;
use state::AppState;
use store::MemoryStore;
use tokio::net::TcpListener;
use types::time::now_nanos;

/// Keyspaces wiped on a fresh start (accounts and their history stay).
const CLEAR_PATTERNS: &[&str] = &["order:*", "book:*", "acct-orders:*", "trade:*", "trades:*"];

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt::init();

    let config = Arc::new(Config::from_env());
    tracing::info!(
        store_host = %config.store_host,
        store_port = config.store_port,
        "Starting order entry system (in-process store)"
    );

    let store = Arc::new(MemoryStore::new());

    // Restore a disk snapshot when configured, then honor the
    // clear-on-start policy.
    if let Some(path) = &config.snapshot_path {
        if path.exists() {
            match store.load_snapshot(path) {
                Ok(()) => tracing::info!(path = %path.display(), "Restored store snapshot"),
                Err(err) => tracing::warn!(path = %path.display(), error = %err, "Snapshot restore failed, starting empty"),
            }
        }
    }
    if !config.no_clear_data {
        for pattern in CLEAR_PATTERNS {
            store.clear(pattern)?;
        }
    } else {
        tracing::info!("OES_NO_CLEAR_DATA=1: keeping persisted orders and books");
    }

    let book = Arc::new(OrderBook::new(store.clone()));
    let ledger = Arc::new(AccountLedger::new(store.clone()));
    ledger.seed_sample_accounts(now_nanos())?;

    // Reconcile holds with whatever survived restore + clear: restored
    // resting orders get their reservations back, and holds whose
    // orders were wiped return to available funds before any traffic.
    let resting = book.all_resting_orders()?;
    ledger.rebuild_reservations(&resting, now_nanos())?;

    let engine = Arc::new(MatchingEngine::new(
        store.clone(),
        book.clone(),
        ledger.clone(),
        config.limits.clone(),
    ));
    let sessions = Arc::new(SessionRegistry::new(SessionConfig::default()));
    let bus = Arc::new(EventBus::new(store.clone(), sessions.clone()));

    // Long-lived background tasks.
    let tick_task = tokio::spawn(engine.clone().run_tick(config.match_tick));
    let snapshot_task = tokio::spawn(feed::broadcast::run_snapshot_broadcaster(
        store.clone(),
        book.clone(),
        sessions.clone(),
        config.snapshot_interval,
    ));
    let latency_task = tokio::spawn(feed::broadcast::run_latency_heartbeat(
        store.clone(),
        config.latency_interval,
    ));
    let sweep_task = tokio::spawn(feed::broadcast::run_session_sweeper(
        sessions.clone(),
        std::time::Duration::from_secs(5),
    ));

    let app_state = AppState {
        store: store.clone(),
        book,
        ledger,
        engine: engine.clone(),
        bus,
        sessions,
        config: config.clone(),
    };
    let app = create_router(app_state);

    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "Listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // End of session: cancel day orders, stop tasks, snapshot to disk.
    let swept = engine.sweep_day_orders(now_nanos())?;
    tracing::info!(swept, "Shutdown sweep complete");

    tick_task.abort();
    snapshot_task.abort();
    latency_task.abort();
    sweep_task.abort();

    if let Some(path) = &config.snapshot_path {
        store.save_snapshot(path)?;
        tracing::info!(path = %path.display(), "Saved store snapshot");
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "Failed to listen for shutdown signal");
    }
}
