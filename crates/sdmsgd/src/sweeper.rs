//! Periodic housekeeping and vault event accounting

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use sdmsg_vault::{SweepReport, Vault, VaultEvent};

use crate::metrics::DaemonMetrics;

/// Run one sweep and record it.
pub async fn sweep_once(vault: &Vault, metrics: &DaemonMetrics) -> anyhow::Result<SweepReport> {
    let started = Instant::now();
    match vault.housekeeping(vault.now()).await {
        Ok(report) => {
            let secs = started.elapsed().as_secs_f64();
            metrics.record_sweep(&report, secs);
            if report.destroyed + report.orphaned + report.failed > 0 {
                info!(
                    scanned = report.scanned,
                    destroyed = report.destroyed,
                    orphaned = report.orphaned,
                    failed = report.failed,
                    secs,
                    "housekeeping sweep"
                );
            } else {
                debug!(scanned = report.scanned, secs, "housekeeping sweep: nothing to purge");
            }
            Ok(report)
        }
        Err(e) => {
            metrics.sweep_failures.inc();
            Err(e.into())
        }
    }
}

/// Sweep every `interval` until `shutdown` fires. The first sweep runs immediately.
pub async fn run_sweeper(
    vault: Arc<Vault>,
    metrics: DaemonMetrics,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => {
                info!("sweeper: shutdown signal received");
                break;
            }
            _ = ticker.tick() => {
                if let Err(e) = sweep_once(&vault, &metrics).await {
                    warn!("housekeeping sweep failed: {e}");
                }
            }
        }
    }
}

/// Count and log vault events until `shutdown` fires or the bus closes.
pub async fn record_events(
    mut events: broadcast::Receiver<VaultEvent>,
    metrics: DaemonMetrics,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            event = events.recv() => match event {
                Ok(event) => {
                    debug!(id = %event.id(), ?event, "vault event");
                    metrics.record_event(&event);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "vault event receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}
