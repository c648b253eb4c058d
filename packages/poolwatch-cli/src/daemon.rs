//! Long-running reconciliation daemon
//!
//! Runs the link-layer and echo cycles on their timers until SIGTERM,
//! SIGINT or Ctrl+C.

use anyhow::Result;
use poolwatch_core::config::PoolwatchConfig;
use poolwatch_core::probe::{self, SystemPing};
use poolwatch_core::store::JsonFileStore;
use poolwatch_core::ReconciliationEngine;
use std::sync::Arc;
use tokio::sync::watch;

/// Run the reconciliation daemon in the foreground
pub async fn run_daemon(config: PoolwatchConfig) -> Result<()> {
    let store = Arc::new(JsonFileStore::open(&config.data_file).await?);

    if config.discovery.source == poolwatch_core::config::DiscoverySource::ArpScan
        && !config.discovery.use_sudo
        && !probe::privileges::is_elevated()
    {
        tracing::warn!(
            "Not running as root; {}",
            probe::privileges::elevation_hint(&config.discovery.command)
        );
    }

    tracing::info!(
        "Starting daemon: pool file {:?}, discovery via {:?}{}",
        store.path(),
        config.discovery.source,
        config
            .discovery
            .interface
            .as_deref()
            .map(|i| format!(" on {}", i))
            .unwrap_or_default()
    );

    let engine = Arc::new(ReconciliationEngine::new(
        store,
        config.discovery.link_sweep(),
        Arc::new(SystemPing),
        config.engine,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runner = tokio::spawn(engine.run(shutdown_rx));

    wait_for_shutdown().await;
    let _ = shutdown_tx.send(true);
    runner.await?;

    tracing::info!("Daemon stopped");
    Ok(())
}

/// Resolve once SIGTERM, SIGINT or Ctrl+C arrives
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down"),
                    _ = tokio::signal::ctrl_c() => tracing::info!("Received Ctrl+C, shutting down"),
                }
                return;
            }
            Err(e) => tracing::warn!("Failed to register SIGTERM handler: {}", e),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Received Ctrl+C, shutting down");
}
