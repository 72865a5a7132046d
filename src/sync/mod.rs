//! # Sync Orchestrator
//! Drives one synchronization run for a named data source.
//!
//! A run resolves the source and the location set, opens a call, fetches
//! every location concurrently, records each outcome under the call and
//! closes the call with a status derived from the outcome counts. A failed
//! location is recorded and counted; it never aborts the run.
//!
//! Each fetch task owns its result slot. Slots are reduced into the store
//! and the counters in one pass after every fetch has finished.

pub mod lease;
pub mod summary;
pub mod tracker;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use futures::FutureExt;
use metrics::{counter, gauge, histogram};

use crate::ingest::types::{FetchError, ReadingFetcher};
use crate::ingest::{fetch_bounded, FetcherRegistry};
use crate::model::{
    ActorId, CallId, CallStatus, DataSource, Location, LocationId, NewReading, ReadingPayload,
    SourceCategory,
};
use crate::notify::{ChannelMux, StatusEvent};
use crate::store::{bounded, DataStore, StoreError};
use lease::SourceLeases;
use tracker::CallTracker;

pub use summary::{OpCounts, RunSummary};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("data source `{0}` not found")]
    SourceNotFound(String),
    #[error("no locations registered")]
    NoLocations,
    #[error("a run for `{0}` is already in progress")]
    RunInProgress(String),
    #[error("no fetcher registered for category `{0}`")]
    NoFetcher(SourceCategory),
    #[error("data store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("sync run aborted: {0}")]
    Aborted(String),
}

impl From<StoreError> for SyncError {
    fn from(e: StoreError) -> Self {
        SyncError::StoreUnavailable(e.to_string())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SyncSettings {
    pub fetch_timeout: Duration,
    pub store_timeout: Duration,
    pub max_concurrent_fetches: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(10),
            store_timeout: Duration::from_secs(5),
            max_concurrent_fetches: 4,
        }
    }
}

/// Private result slot of one location's fetch.
struct LocationOutcome {
    location_id: LocationId,
    result: Result<ReadingPayload, FetchError>,
}

/// What is known about a run so far; read by the fatal path.
#[derive(Default)]
struct RunProgress {
    category: Option<SourceCategory>,
    call_id: Option<CallId>,
    location_count: usize,
    ops: OpCounts,
}

pub struct SyncOrchestrator {
    store: Arc<dyn DataStore>,
    fetchers: FetcherRegistry,
    channel: ChannelMux,
    tracker: CallTracker,
    leases: SourceLeases,
    settings: SyncSettings,
}

impl SyncOrchestrator {
    pub fn new(
        store: Arc<dyn DataStore>,
        fetchers: FetcherRegistry,
        channel: ChannelMux,
        settings: SyncSettings,
    ) -> Self {
        let tracker = CallTracker::new(store.clone(), settings.store_timeout);
        Self {
            store,
            fetchers,
            channel,
            tracker,
            leases: SourceLeases::new(),
            settings,
        }
    }

    pub fn leases(&self) -> &SourceLeases {
        &self.leases
    }

    /// Runs one sync for `source_name` on behalf of `actor`.
    ///
    /// The summary is published in every case, including failures. On a
    /// failure after the call was opened the call is forced to `FAILED`
    /// before the error is returned.
    pub async fn run_sync(&self, source_name: &str, actor: ActorId) -> Result<RunSummary, SyncError> {
        let t0 = Instant::now();
        let mut progress = RunProgress::default();
        let res = AssertUnwindSafe(self.drive(source_name, actor, &mut progress))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(SyncError::Aborted(panic_message(panic.as_ref()))));

        let source_tag = progress
            .category
            .map(|c| c.as_str().to_string())
            .unwrap_or_else(|| source_name.to_string());

        let outcome = match res {
            Ok(summary) => Ok(summary),
            Err(err) => {
                if let Some(call_id) = progress.call_id {
                    match self.tracker.finish(call_id, CallStatus::Failed).await {
                        Ok(()) => progress.ops.update += 1,
                        Err(e) => tracing::error!(
                            call_id = %call_id,
                            "could not force call to FAILED: {e}"
                        ),
                    }
                }
                tracing::error!(source = source_name, error = %err, "sync run failed");
                let summary = RunSummary::fatal(
                    &source_tag,
                    source_name,
                    progress.call_id,
                    progress.ops,
                    progress.location_count,
                    err.to_string(),
                );
                self.channel.publish(&StatusEvent::RunSummary(summary)).await;
                Err(err)
            }
        };

        let status_label = match &outcome {
            Ok(s) => s.status.map(|s| s.as_str()).unwrap_or("UNKNOWN"),
            Err(_) => "FAILED",
        };
        counter!("sync_runs_total", "source" => source_tag.clone(), "status" => status_label)
            .increment(1);
        histogram!("sync_run_duration_ms", "source" => source_tag.clone())
            .record(t0.elapsed().as_secs_f64() * 1_000.0);
        gauge!("sync_last_run_ts", "source" => source_tag)
            .set(chrono::Utc::now().timestamp().max(0) as f64);

        if let Ok(summary) = &outcome {
            self.channel
                .publish(&StatusEvent::RunSummary(summary.clone()))
                .await;
        }
        outcome
    }

    async fn drive(
        &self,
        source_name: &str,
        actor: ActorId,
        progress: &mut RunProgress,
    ) -> Result<RunSummary, SyncError> {
        let _lease = self
            .leases
            .try_acquire(source_name)
            .ok_or_else(|| SyncError::RunInProgress(source_name.to_string()))?;

        let timeout = self.settings.store_timeout;
        let source = bounded(timeout, self.store.get_source(source_name)).await?;
        progress.ops.read += 1;
        let source = source.ok_or_else(|| SyncError::SourceNotFound(source_name.to_string()))?;
        progress.category = Some(source.category);

        let fetcher = self
            .fetchers
            .get(source.category)
            .ok_or(SyncError::NoFetcher(source.category))?;

        let locations = bounded(timeout, self.store.list_locations()).await?;
        progress.ops.read += 1;
        if locations.is_empty() {
            return Err(SyncError::NoLocations);
        }
        progress.location_count = locations.len();

        let call_id = self.tracker.start(source.id, actor, source.category).await?;
        progress.ops.create += 1;
        progress.call_id = Some(call_id);

        tracing::info!(
            source = %source.name,
            category = %source.category,
            call_id = %call_id,
            locations = locations.len(),
            "sync run started"
        );

        let mut outcomes = self.fetch_all(&fetcher, &source, &locations).await;
        progress.ops.read += outcomes.len() as u64;
        outcomes.sort_by_key(|o| o.location_id);

        let (success, failed) = self
            .record_outcomes(&source, actor, call_id, outcomes, &mut progress.ops)
            .await?;

        let status = CallStatus::from_counts(success, failed);
        self.tracker.finish(call_id, status).await?;
        progress.ops.update += 1;

        tracing::info!(
            source = %source.name,
            call_id = %call_id,
            status = %status,
            success,
            failed,
            "sync run finished"
        );

        Ok(RunSummary::completed(
            source.category.as_str(),
            &source.name,
            call_id,
            status,
            progress.ops,
            success,
            failed,
        ))
    }

    /// Each task owns its location, source and fetcher handle. A panic in
    /// a fetcher becomes that location's failure.
    async fn fetch_all(
        &self,
        fetcher: &Arc<dyn ReadingFetcher>,
        source: &DataSource,
        locations: &[Location],
    ) -> Vec<LocationOutcome> {
        let fetch_timeout = self.settings.fetch_timeout;
        let tasks: Vec<_> = locations
            .iter()
            .cloned()
            .map(|loc| {
                let fetcher = fetcher.clone();
                let source = source.clone();
                async move {
                    let result = AssertUnwindSafe(fetch_bounded(
                        fetcher.as_ref(),
                        &loc,
                        &source,
                        fetch_timeout,
                    ))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        Err(FetchError::Panicked(panic_message(panic.as_ref())))
                    });
                    LocationOutcome {
                        location_id: loc.id,
                        result,
                    }
                }
            })
            .collect();

        stream::iter(tasks)
            .buffer_unordered(self.settings.max_concurrent_fetches.max(1))
            .collect()
            .await
    }

    /// Single reduction step: persist every slot and count outcomes.
    async fn record_outcomes(
        &self,
        source: &DataSource,
        actor: ActorId,
        call_id: CallId,
        outcomes: Vec<LocationOutcome>,
        ops: &mut OpCounts,
    ) -> Result<(usize, usize), SyncError> {
        let mut success = 0usize;
        let mut failed = 0usize;
        for o in outcomes {
            match o.result {
                Ok(payload) => {
                    let reading = NewReading {
                        source_id: source.id,
                        location_id: o.location_id,
                        actor,
                        payload,
                        call_id,
                    };
                    bounded(self.settings.store_timeout, self.store.insert_reading(reading))
                        .await?;
                    ops.create += 1;
                    success += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        source = %source.name,
                        call_id = %call_id,
                        location_id = %o.location_id,
                        error = %e,
                        "location fetch failed"
                    );
                    let message = format!("Location {}: {}", o.location_id, e);
                    self.tracker.fail_location(call_id, e.tag(), &message).await?;
                    ops.create += 1;
                    failed += 1;
                }
            }
        }
        counter!("sync_readings_created_total", "source" => source.category.as_str())
            .increment(success as u64);
        counter!("sync_location_failures_total", "source" => source.category.as_str())
            .increment(failed as u64);
        Ok((success, failed))
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
