// src/metrics.rs
use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tower_http::cors::CorsLayer;

/// Register series descriptions once per process.
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("sync_runs_total", "Sync runs by source and final status.");
        describe_counter!(
            "sync_location_failures_total",
            "Locations whose fetch failed during a sync run."
        );
        describe_counter!(
            "sync_readings_created_total",
            "Readings persisted by sync runs."
        );
        describe_counter!("sync_ticks_total", "Scheduler ticks that started a sync run.");
        describe_histogram!("sync_run_duration_ms", "Sync run wall time in milliseconds.");
        describe_histogram!("ingest_fetch_ms", "Single location fetch time in milliseconds.");
        describe_histogram!("ingest_parse_ms", "Provider payload parse time in milliseconds.");
        describe_gauge!(
            "sync_last_run_ts",
            "Unix timestamp (seconds) of the last finished sync run."
        );
        describe_counter!("validation_runs_total", "Validation runs by source.");
        describe_counter!(
            "validation_warnings_total",
            "Readings flagged as outliers by validation."
        );
        describe_counter!(
            "status_publish_failures_total",
            "Status events a channel failed to deliver."
        );
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Installs the Prometheus recorder. Later calls reuse the first handle.
    pub fn init() -> Result<Self> {
        static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();
        let handle = HANDLE
            .get_or_try_init(|| {
                PrometheusBuilder::new()
                    .install_recorder()
                    .context("prometheus: install recorder")
            })?
            .clone();
        ensure_metrics_described();
        Ok(Self { handle })
    }

    /// `/metrics` in Prometheus exposition format plus a `/health` check.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new()
            .route("/health", get(|| async { "ok" }))
            .route(
                "/metrics",
                get(move || {
                    let h = handle.clone();
                    async move { h.render() }
                }),
            )
            .layer(CorsLayer::very_permissive())
    }
}
