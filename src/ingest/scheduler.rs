// src/ingest/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::model::{ActorId, SourceCategory};
use crate::sync::SyncOrchestrator;
use crate::validate::{Thresholds, ValidationEngine, ValidationWindow};

#[derive(Clone, Copy, Debug)]
pub struct SyncScheduleCfg {
    pub interval_secs: u64,
    pub actor: ActorId,
}

#[derive(Clone, Copy, Debug)]
pub struct ValidationScheduleCfg {
    pub interval_secs: u64,
    pub window: ValidationWindow,
}

/// One periodic task per source. The first tick fires immediately.
/// A slow run delays only its own source; missed ticks are skipped.
pub fn spawn_sync_schedulers(
    orchestrator: Arc<SyncOrchestrator>,
    sources: Vec<String>,
    cfg: SyncScheduleCfg,
) -> Vec<JoinHandle<()>> {
    sources
        .into_iter()
        .map(|source| {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_secs(cfg.interval_secs));
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    counter!("sync_ticks_total").increment(1);
                    match orchestrator.run_sync(&source, cfg.actor).await {
                        Ok(summary) => tracing::info!(
                            target: "scheduler",
                            source = %source,
                            status = ?summary.status,
                            success = summary.success,
                            failed = summary.failed,
                            "sync tick"
                        ),
                        Err(e) => {
                            tracing::warn!(target: "scheduler", source = %source, "sync tick failed: {e}")
                        }
                    }
                }
            })
        })
        .collect()
}

/// One periodic validation task covering every category in `categories`.
pub fn spawn_validation_scheduler(
    engine: Arc<ValidationEngine>,
    categories: Vec<(SourceCategory, Thresholds)>,
    cfg: ValidationScheduleCfg,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(cfg.interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            for (category, thresholds) in &categories {
                let summary = engine.run_validation(*category, cfg.window, thresholds).await;
                tracing::debug!(
                    target: "scheduler",
                    source = %category,
                    warnings = summary.warnings.len(),
                    "validation tick"
                );
            }
        }
    })
}
