//! # Statistical Validation
//! Flags recent readings that sit too far from a historical baseline.
//!
//! The baseline (mean, sample standard deviation) is computed over the last
//! `history` readings of a category, and the newest `recent` readings of
//! that same window are tested against it. The tested readings are part of
//! their own baseline; pick a history window large enough that a single
//! outlier cannot drag the statistics along with it.
//!
//! Validation is read-only and never fails its caller: store errors turn
//! into an empty `ok` summary carrying the error text.

pub mod stats;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};

use crate::model::{LocationId, Metric, Reading, ReadingId, SourceCategory};
use crate::notify::{ChannelMux, StatusEvent};
use crate::store::DataStore;
use stats::{round_to, Baseline};

pub const DEFAULT_HISTORY_WINDOW: usize = 500;
pub const DEFAULT_RECENT_WINDOW: usize = 20;
pub const DEFAULT_THRESHOLD: f64 = 3.0;
/// Decimal places for published deviations and means.
const PRECISION: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationWindow {
    pub history: usize,
    pub recent: usize,
}

impl Default for ValidationWindow {
    fn default() -> Self {
        Self {
            history: DEFAULT_HISTORY_WINDOW,
            recent: DEFAULT_RECENT_WINDOW,
        }
    }
}

impl ValidationWindow {
    /// `recent` never exceeds `history`.
    pub fn new(history: usize, recent: usize) -> Self {
        Self {
            history,
            recent: recent.min(history),
        }
    }
}

/// Per-metric multiplier of the standard deviation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Thresholds(pub BTreeMap<Metric, f64>);

impl Thresholds {
    pub fn uniform(category: SourceCategory, k: f64) -> Self {
        Self(category.metrics().iter().map(|m| (*m, k)).collect())
    }

    pub fn set(mut self, metric: Metric, k: f64) -> Self {
        self.0.insert(metric, k);
        self
    }

    /// Thresholds for every metric tracked by `category`; unset or invalid
    /// entries fall back to `DEFAULT_THRESHOLD`.
    pub fn effective(&self, category: SourceCategory) -> BTreeMap<Metric, f64> {
        category
            .metrics()
            .iter()
            .map(|m| {
                let k = self
                    .0
                    .get(m)
                    .copied()
                    .filter(|k| k.is_finite() && *k >= 0.0)
                    .unwrap_or(DEFAULT_THRESHOLD);
                (*m, k)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationStatus {
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "WARNING")]
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub reading_id: ReadingId,
    pub location_id: LocationId,
    pub recorded_at: DateTime<Utc>,
    pub values: BTreeMap<Metric, f64>,
    /// Absolute distance from the mean, rounded.
    pub deviations: BTreeMap<Metric, f64>,
    /// Metrics whose deviation crossed their threshold.
    pub flagged: Vec<Metric>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub source: SourceCategory,
    pub status: ValidationStatus,
    pub thresholds: BTreeMap<Metric, f64>,
    pub warnings: Vec<ValidationWarning>,
    /// Baseline means, rounded.
    pub avg: BTreeMap<Metric, f64>,
    pub stdev: BTreeMap<Metric, f64>,
    pub sample_count: usize,
    pub tested_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidationSummary {
    /// The "nothing to validate" result.
    pub fn empty(source: SourceCategory) -> Self {
        Self {
            source,
            status: ValidationStatus::Ok,
            thresholds: BTreeMap::new(),
            warnings: Vec::new(),
            avg: BTreeMap::new(),
            stdev: BTreeMap::new(),
            sample_count: 0,
            tested_count: 0,
            error: None,
        }
    }
}

/// Pure validation over `readings`, which must be ordered newest-first.
pub fn evaluate(
    category: SourceCategory,
    readings: &[Reading],
    window: ValidationWindow,
    thresholds: &Thresholds,
) -> ValidationSummary {
    let window = ValidationWindow::new(window.history, window.recent);
    let effective = thresholds.effective(category);

    let history: Vec<&Reading> = readings
        .iter()
        .filter(|r| r.measurements.category() == category)
        .take(window.history)
        .collect();

    let mut out = ValidationSummary::empty(category);
    out.thresholds = effective.clone();
    if history.is_empty() {
        return out;
    }

    let mut baselines: BTreeMap<Metric, Baseline> = BTreeMap::new();
    for metric in category.metrics() {
        let samples: Vec<f64> = history
            .iter()
            .filter_map(|r| r.measurements.get(*metric))
            .filter(|v| v.is_finite())
            .collect();
        if let Some(b) = Baseline::from_samples(&samples) {
            baselines.insert(*metric, b);
        }
    }

    // newest readings, i.e. the head of a newest-first window
    let tested = &history[..window.recent.min(history.len())];
    for r in tested {
        let mut values = BTreeMap::new();
        let mut deviations = BTreeMap::new();
        let mut flagged = Vec::new();
        for (metric, b) in &baselines {
            let Some(v) = r.measurements.get(*metric).filter(|v| v.is_finite()) else {
                continue;
            };
            let k = effective.get(metric).copied().unwrap_or(DEFAULT_THRESHOLD);
            values.insert(*metric, v);
            deviations.insert(*metric, round_to(b.deviation(v), PRECISION));
            if b.is_outlier(v, k) {
                flagged.push(*metric);
            }
        }
        if !flagged.is_empty() {
            out.warnings.push(ValidationWarning {
                reading_id: r.id,
                location_id: r.location_id,
                recorded_at: r.recorded_at,
                values,
                deviations,
                flagged,
            });
        }
    }

    out.avg = baselines
        .iter()
        .map(|(m, b)| (*m, round_to(b.mean, PRECISION)))
        .collect();
    out.stdev = baselines
        .iter()
        .map(|(m, b)| (*m, round_to(b.stdev, PRECISION)))
        .collect();
    out.sample_count = history.len();
    out.tested_count = tested.len();
    out.status = if out.warnings.is_empty() {
        ValidationStatus::Ok
    } else {
        ValidationStatus::Warning
    };
    out
}

/// Loads readings from the store, evaluates them and publishes the summary.
pub struct ValidationEngine {
    store: Arc<dyn DataStore>,
    channel: ChannelMux,
    store_timeout: Duration,
}

impl ValidationEngine {
    pub fn new(store: Arc<dyn DataStore>, channel: ChannelMux) -> Self {
        Self {
            store,
            channel,
            store_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub async fn run_validation(
        &self,
        category: SourceCategory,
        window: ValidationWindow,
        thresholds: &Thresholds,
    ) -> ValidationSummary {
        let window = ValidationWindow::new(window.history, window.recent);
        let loaded = tokio::time::timeout(
            self.store_timeout,
            self.store.list_recent_readings(category, window.history),
        )
        .await;

        let summary = match loaded {
            Ok(Ok(rows)) => evaluate(category, &rows, window, thresholds),
            Ok(Err(e)) => self.degraded(category, thresholds, e.to_string()),
            Err(_) => self.degraded(
                category,
                thresholds,
                format!("store read timed out after {:?}", self.store_timeout),
            ),
        };

        counter!(
            "validation_runs_total",
            "source" => category.as_str(),
            "status" => status_label(summary.status)
        )
        .increment(1);
        counter!("validation_warnings_total", "source" => category.as_str())
            .increment(summary.warnings.len() as u64);

        if summary.sample_count == 0 && summary.error.is_none() {
            tracing::info!(source = %category, "no data to validate");
        } else {
            tracing::info!(
                source = %category,
                status = status_label(summary.status),
                warnings = summary.warnings.len(),
                samples = summary.sample_count,
                "validation complete"
            );
        }

        self.channel
            .publish(&StatusEvent::ValidationSummary(summary.clone()))
            .await;
        summary
    }

    fn degraded(
        &self,
        category: SourceCategory,
        thresholds: &Thresholds,
        error: String,
    ) -> ValidationSummary {
        tracing::warn!(source = %category, "validation skipped: {error}");
        let mut s = ValidationSummary::empty(category);
        s.thresholds = thresholds.effective(category);
        s.error = Some(error);
        s
    }
}

fn status_label(s: ValidationStatus) -> &'static str {
    match s {
        ValidationStatus::Ok => "ok",
        ValidationStatus::Warning => "WARNING",
    }
}
