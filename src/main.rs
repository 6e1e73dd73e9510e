//! ==============================================================================
//! main.rs - water monitoring hub entry point
//! ==============================================================================
//!
//! purpose:
//!     subscribes to the MQTT broker, normalizes heterogeneous sensor topics
//!     into one canonical reading model, keeps a bounded diagnostic log, and
//!     persists per-topic snapshots so the model survives connection gaps
//!     and restarts.
//!
//! responsibilities:
//!     - load configuration (host.toml) and initialize logging
//!     - open the snapshot store on the persistent medium
//!     - start the broker session (connect, subscribe, reconnect forever)
//!     - run the periodic snapshot reload so storage stays the last truth
//!     - serve the JSON status API for the presentation layer
//!     - tear down the session and the timer on ctrl-c, unconditionally
//!
//! architecture:
//!
//!     ┌──────────────────────────────────────────────────────────────┐
//!     │                     hub process (this file)                  │
//!     │  ┌──────────────┐  ┌───────────────┐  ┌───────────────────┐  │
//!     │  │ mqtt session │  │ reload timer  │  │ status api        │  │
//!     │  │ (event loop) │  │ (5s cycle)    │  │ (port 3000)       │  │
//!     │  └──────┬───────┘  └──────┬────────┘  └─────────┬─────────┘  │
//!     │         │                 │                     │            │
//!     │         └────────────┬────┴─────────────────────┘            │
//!     │                      │                                       │
//!     │                ┌─────┴─────┐         ┌───────────────┐       │
//!     │                │ water hub │ ──────► │ snapshot store│       │
//!     │                │ (model +  │         │ (file-backed  │       │
//!     │                │  msg log) │         │  key-value)   │       │
//!     │                └───────────┘         └───────────────┘       │
//!     └──────────────────────────────────────────────────────────────┘
//!
//! ==============================================================================

mod config;
mod connection;
mod domain;
mod hub;
mod message_log;
mod payload;
mod router;
mod server;
mod storage;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // step 1: load configuration and bring up logging
    let config = config::HostConfig::load_or_default();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone())),
        )
        .init();
    config.print_summary();

    // step 2: open the snapshot store and build the hub
    let medium = storage::FsMedium::new(&config.storage.dir)
        .context("failed to open snapshot storage")?;
    let store = storage::SnapshotStore::new(Box::new(medium));
    let router = router::TopicRouter::new(config.topics.primary_prefix.clone());
    let hub = Arc::new(hub::WaterHub::new(router, store));

    // step 3: seed the model from whatever the last session persisted
    hub.reload_from_store().await;
    info!("model seeded from snapshot store ({} keys)", hub.store().key_count());

    // step 4: start the broker session
    let connection = Arc::new(connection::ConnectionManager::start(
        &config.mqtt,
        &config.topics,
        hub.clone(),
    ));

    // step 5: periodic snapshot reload, cancelled on shutdown
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
    let reload_hub = hub.clone();
    let reload_secs = config.reload.interval_seconds;
    let reload_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(reload_secs));
        ticker.tick().await; // first tick fires immediately; the model is already seeded
        loop {
            tokio::select! {
                _ = ticker.tick() => reload_hub.reload_from_store().await,
                _ = shutdown_rx.changed() => break,
            }
        }
    });

    // step 6: status api in the background
    let api_state = server::ApiState {
        hub: hub.clone(),
        connection: connection.clone(),
        reload_interval_secs: reload_secs,
    };
    let bind = config.server.bind.clone();
    tokio::spawn(async move {
        info!("status api live at http://{}", bind);
        if let Err(e) = server::run(&bind, api_state).await {
            error!("status api error: {}", e);
        }
    });

    // step 7: run until ctrl-c, then tear everything down
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutting down");
    let _ = shutdown_tx.send(true);
    let _ = reload_task.await;
    connection.stop().await;
    Ok(())
}
