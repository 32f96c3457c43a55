//! Prometheus /metrics + health check HTTP endpoints
//!
//! Endpoints:
//!   GET /metrics  - Prometheus text format
//!   GET /healthz  - Liveness probe (always 200 if process is running)
//!   GET /readyz   - Readiness probe (200 if both stores are reachable)

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus_client::{
    encoding::text::encode,
    metrics::{counter::Counter, family::Family, histogram::Histogram},
    registry::Registry,
};
use std::sync::Arc;

use sdmsg_vault::{SweepReport, Vault, VaultEvent};

type Labels = Vec<(String, String)>;

#[derive(Clone)]
pub struct DaemonMetrics {
    pub sweeps: Counter,
    pub sweep_failures: Counter,
    pub sweep_duration: Histogram,
    pub purged: Family<Labels, Counter>,
    pub unreadable: Counter,
    pub events: Family<Labels, Counter>,
}

impl DaemonMetrics {
    pub fn new(registry: &mut Registry) -> Self {
        let sweeps = Counter::default();
        let sweep_failures = Counter::default();
        let sweep_duration = Histogram::new([0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0]);
        let purged = Family::default();
        let unreadable = Counter::default();
        let events = Family::default();

        registry.register(
            "sdmsg_sweeps",
            "Housekeeping sweeps completed",
            sweeps.clone(),
        );
        registry.register(
            "sdmsg_sweep_failures",
            "Housekeeping sweeps that could not list records",
            sweep_failures.clone(),
        );
        registry.register(
            "sdmsg_sweep_duration_seconds",
            "Housekeeping sweep duration in seconds",
            sweep_duration.clone(),
        );
        registry.register(
            "sdmsg_messages_purged",
            "Messages removed by housekeeping",
            purged.clone(),
        );
        registry.register(
            "sdmsg_messages_unreadable",
            "Records housekeeping could not inspect",
            unreadable.clone(),
        );
        registry.register(
            "sdmsg_vault_events",
            "Vault lifecycle events observed",
            events.clone(),
        );

        DaemonMetrics {
            sweeps,
            sweep_failures,
            sweep_duration,
            purged,
            unreadable,
            events,
        }
    }

    pub fn record_sweep(&self, report: &SweepReport, secs: f64) {
        self.sweeps.inc();
        self.sweep_duration.observe(secs);
        self.purged
            .get_or_create(&labels("reason", "dead"))
            .inc_by(report.destroyed);
        self.purged
            .get_or_create(&labels("reason", "orphaned"))
            .inc_by(report.orphaned);
        self.unreadable.inc_by(report.failed);
    }

    pub fn record_event(&self, event: &VaultEvent) {
        self.events
            .get_or_create(&labels("kind", event_kind(event)))
            .inc();
    }
}

fn labels(key: &str, value: &str) -> Labels {
    vec![(key.to_string(), value.to_string())]
}

fn event_kind(event: &VaultEvent) -> &'static str {
    match event {
        VaultEvent::DecryptionFailed { .. } => "decryption_failed",
        VaultEvent::HitPointLimitReached { .. } => "hit_point_limit_reached",
        VaultEvent::Expired { .. } => "expired",
        VaultEvent::Destroyed { .. } => "destroyed",
    }
}

/// Shared health state for the HTTP handlers
#[derive(Clone)]
pub struct HealthState {
    pub registry: Arc<Registry>,
    pub vault: Arc<Vault>,
}

fn router(state: HealthState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .with_state(state)
}

/// Serve Prometheus metrics and health endpoints on `addr` (e.g. "127.0.0.1:9190")
pub async fn serve(addr: String, state: HealthState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("metrics bind {addr}: {e}"))?;

    tracing::info!(addr = %addr, "metrics: listening on /metrics, /healthz, /readyz");

    axum::serve(listener, router(state))
        .await
        .map_err(|e| anyhow::anyhow!("metrics server: {e}"))
}

async fn metrics_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let mut body = String::new();
    match encode(&mut body, &state.registry) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        ),
        Err(e) => {
            tracing::error!("metrics encode failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                e.to_string(),
            )
        }
    }
}

/// Liveness probe: returns 200 if the process is running.
async fn healthz_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness probe: 200 only if both the record and fragment stores answer.
async fn readyz_handler(State(state): State<HealthState>) -> impl IntoResponse {
    if let Err(e) = sdmsg_storage::check_health(state.vault.records().operator()).await {
        tracing::debug!("readyz: records: {e}");
        return (StatusCode::SERVICE_UNAVAILABLE, "record store unreachable");
    }
    if let Err(e) = sdmsg_storage::check_health(state.vault.fragments().operator()).await {
        tracing::debug!("readyz: fragments: {e}");
        return (StatusCode::SERVICE_UNAVAILABLE, "fragment store unreachable");
    }
    (StatusCode::OK, "ready")
}
