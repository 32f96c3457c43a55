//! Daemon lifecycle: startup, health checks, systemd notify, sweep loop

use anyhow::{Context, Result};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

use sdmsg_core::config::SdmsgConfig;
use sdmsg_vault::Vault;

use crate::metrics::{DaemonMetrics, HealthState};
use crate::sweeper;

pub async fn run(config: SdmsgConfig) -> Result<()> {
    info!("daemon starting");

    let vault = Arc::new(open_vault(&config)?);
    check_stores(&vault, &config).await;

    // Prometheus registry is frozen once the server starts
    let mut registry = Registry::default();
    let metrics = DaemonMetrics::new(&mut registry);
    let registry = Arc::new(registry);

    if let Some(addr) = config.daemon.metrics_addr.clone() {
        let state = HealthState {
            registry: registry.clone(),
            vault: vault.clone(),
        };
        tokio::spawn(async move {
            if let Err(e) = crate::metrics::serve(addr, state).await {
                error!("metrics server failed: {e}");
            }
        });
    }

    // Shutdown signal
    let mut sigterm = signal(SignalKind::terminate()).context("registering SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("registering SIGINT handler")?;
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    let recorder = tokio::spawn(sweeper::record_events(
        vault.subscribe(),
        metrics.clone(),
        shutdown_tx.subscribe(),
    ));

    let interval = Duration::from_secs(config.daemon.sweep_interval_secs);
    info!(interval_secs = interval.as_secs(), "housekeeping: scheduled");
    let sweeper = tokio::spawn(sweeper::run_sweeper(
        vault.clone(),
        metrics,
        interval,
        shutdown_tx.subscribe(),
    ));

    notify_ready();

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM"),
        _ = sigint.recv() => info!("received SIGINT"),
    }
    let _ = shutdown_tx.send(());
    let clean = joined("sweeper", sweeper.await) & joined("event recorder", recorder.await);

    if !clean {
        anyhow::bail!("daemon task terminated abnormally");
    }
    info!("daemon exiting cleanly");
    Ok(())
}

/// Log how a background task ended. False if it panicked or was cancelled.
fn joined(task: &str, result: Result<(), tokio::task::JoinError>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) if e.is_panic() => {
            error!(task, "task panicked: {e}");
            false
        }
        Err(e) => {
            error!(task, "task did not finish: {e}");
            false
        }
    }
}

/// Single sweep, for cron-style deployments.
pub async fn run_once(config: SdmsgConfig) -> Result<()> {
    let vault = open_vault(&config)?;
    let mut registry = Registry::default();
    let metrics = DaemonMetrics::new(&mut registry);

    let report = sweeper::sweep_once(&vault, &metrics).await?;
    info!(
        scanned = report.scanned,
        destroyed = report.destroyed,
        orphaned = report.orphaned,
        failed = report.failed,
        "housekeeping complete"
    );
    Ok(())
}

fn open_vault(config: &SdmsgConfig) -> Result<Vault> {
    Vault::from_config(config).context("opening vault")
}

async fn check_stores(vault: &Vault, config: &SdmsgConfig) {
    match sdmsg_storage::check_health(vault.records().operator()).await {
        Ok(()) => info!(backend = ?config.records.backend, "record store: connected"),
        Err(e) => warn!(backend = ?config.records.backend, "record store: {e}"),
    }
    match sdmsg_storage::check_health(vault.fragments().operator()).await {
        Ok(()) => info!(backend = ?config.fragments.backend, "fragment store: connected"),
        Err(e) => warn!(backend = ?config.fragments.backend, "fragment store: {e}"),
    }
}

fn notify_ready() {
    // sd_notify(READY=1) via $NOTIFY_SOCKET; no-op outside systemd
    if let Ok(socket) = std::env::var("NOTIFY_SOCKET") {
        use std::os::unix::net::UnixDatagram;
        if let Ok(sock) = UnixDatagram::unbound() {
            let _ = sock.send_to(b"READY=1\n", &socket);
            tracing::debug!(notify_socket = %socket, "sent systemd READY=1");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_joined_reports_finished_task() {
        let handle = tokio::spawn(async {});
        assert!(joined("noop", handle.await));
    }

    #[tokio::test]
    async fn test_joined_reports_panicked_task() {
        let handle = tokio::spawn(async { panic!("sweep blew up") });
        assert!(!joined("sweeper", handle.await));
    }

    #[tokio::test]
    async fn test_joined_reports_cancelled_task() {
        let handle = tokio::spawn(tokio::time::sleep(Duration::from_secs(3600)));
        handle.abort();
        assert!(!joined("sweeper", handle.await));
    }
}
