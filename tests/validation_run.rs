// tests/validation_run.rs
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use datawatch::model::{
    ActorId, Call, CallId, CallStatus, DataSource, ErrorId, ErrorLog, Location, LocationId,
    Measurements, Metric, NewReading, Reading, ReadingId, ReadingPayload, SourceCategory,
    SourceId,
};
use datawatch::notify::{BusChannel, ChannelMux, StatusEvent};
use datawatch::store::{DataStore, MemoryStore, StoreError, StoreResult};
use datawatch::validate::stats::Baseline;
use datawatch::validate::{Thresholds, ValidationStatus, ValidationWindow};
use datawatch::ValidationEngine;

/// Stores `temps` oldest-first under one call; returns the reading ids in
/// the same order.
async fn seed(store: &MemoryStore, temps: &[f64]) -> Vec<ReadingId> {
    let source = store
        .add_source("OpenWeather", SourceCategory::Weather, "http://x", None)
        .await
        .unwrap();
    let loc = store
        .add_location("Beverly Hills", "US", 34.09, -118.41, Some("90210".into()))
        .await
        .unwrap();
    let call = store
        .create_call(source, ActorId(1), SourceCategory::Weather)
        .await
        .unwrap();

    let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    let mut ids = Vec::new();
    for (i, t) in temps.iter().enumerate() {
        let id = store
            .insert_reading(NewReading {
                source_id: source,
                location_id: loc,
                actor: ActorId(1),
                payload: ReadingPayload {
                    measurements: Measurements::Weather {
                        temperature: *t,
                        humidity: 40.0,
                        wind_speed: 2.5,
                    },
                    recorded_at: t0 + chrono::Duration::hours(i as i64),
                },
                call_id: call,
            })
            .await
            .unwrap();
        ids.push(id);
    }
    ids
}

fn steady(n: usize) -> Vec<f64> {
    (0..n).map(|i| if i % 2 == 0 { 10.0 } else { 12.0 }).collect()
}

fn engine(store: Arc<dyn DataStore>) -> (ValidationEngine, BusChannel) {
    let bus = BusChannel::new(16);
    let mux = ChannelMux::new(Duration::from_secs(1)).with(Arc::new(bus.clone()));
    (ValidationEngine::new(store, mux), bus)
}

#[tokio::test]
async fn readings_within_band_raise_no_warning() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, &steady(30)).await;
    let (engine, _bus) = engine(store);

    // every value is 1.0 from the mean; the sample stdev is slightly above 1
    for k in [1.0, 2.0, 3.0] {
        let s = engine
            .run_validation(
                SourceCategory::Weather,
                ValidationWindow::default(),
                &Thresholds::uniform(SourceCategory::Weather, k),
            )
            .await;
        assert_eq!(s.status, ValidationStatus::Ok, "k = {k}");
        assert!(s.warnings.is_empty());
        assert_eq!(s.sample_count, 30);
        assert_eq!(s.tested_count, 20);
        assert_eq!(s.avg[&Metric::Temperature], 11.0);
    }
}

#[tokio::test]
async fn injected_outlier_is_the_only_warning() {
    let store = Arc::new(MemoryStore::new());
    let mut temps = steady(40);
    temps.push(100.0);
    let ids = seed(&store, &temps).await;
    let outlier = *ids.last().unwrap();
    let (engine, bus) = engine(store);
    let mut rx = bus.subscribe();

    let s = engine
        .run_validation(
            SourceCategory::Weather,
            ValidationWindow::default(),
            &Thresholds::default(),
        )
        .await;
    assert_eq!(s.status, ValidationStatus::Warning);
    assert_eq!(s.warnings.len(), 1);
    assert_eq!(s.warnings[0].reading_id, outlier);
    assert_eq!(s.warnings[0].flagged, vec![Metric::Temperature]);
    assert_eq!(s.warnings[0].values[&Metric::Temperature], 100.0);

    let published = rx.recv().await.unwrap();
    assert_eq!(published, StatusEvent::ValidationSummary(s.clone()));
    let v = serde_json::to_value(&published).unwrap();
    assert_eq!(v["payload"]["status"], "WARNING");
}

#[tokio::test]
async fn full_window_flags_one_band_past_threshold() {
    let store = Arc::new(MemoryStore::new());
    let mut temps = steady(499);
    let prior = Baseline::from_samples(&temps).unwrap();
    // one stdev past the default threshold of 3.0, against the prior baseline
    let spike = prior.mean + 4.0 * prior.stdev;
    temps.push(spike);
    let ids = seed(&store, &temps).await;
    let (engine, _bus) = engine(store);

    let s = engine
        .run_validation(
            SourceCategory::Weather,
            ValidationWindow::default(),
            &Thresholds::default(),
        )
        .await;
    assert_eq!(s.sample_count, 500);
    assert_eq!(s.tested_count, 20);
    assert_eq!(s.status, ValidationStatus::Warning);
    assert_eq!(s.warnings.len(), 1, "{:?}", s.warnings);
    assert_eq!(s.warnings[0].reading_id, ids[499]);
    assert_eq!(s.warnings[0].flagged, vec![Metric::Temperature]);
    assert_eq!(s.warnings[0].values[&Metric::Temperature], spike);
}

#[tokio::test]
async fn repeated_runs_are_identical() {
    let store = Arc::new(MemoryStore::new());
    let mut temps = steady(25);
    temps.push(-40.0);
    seed(&store, &temps).await;
    let (engine, _bus) = engine(store);

    let window = ValidationWindow::new(100, 10);
    let t = Thresholds::default().set(Metric::Temperature, 2.5);
    let a = engine.run_validation(SourceCategory::Weather, window, &t).await;
    let b = engine.run_validation(SourceCategory::Weather, window, &t).await;
    assert_eq!(a, b);
    assert_eq!(
        serde_json::to_string(&a).unwrap(),
        serde_json::to_string(&b).unwrap()
    );
}

#[tokio::test]
async fn empty_store_is_ok() {
    let (engine, _bus) = engine(Arc::new(MemoryStore::new()));
    let s = engine
        .run_validation(
            SourceCategory::Earthquake,
            ValidationWindow::default(),
            &Thresholds::default(),
        )
        .await;
    assert_eq!(s.status, ValidationStatus::Ok);
    assert!(s.warnings.is_empty());
    assert_eq!(s.sample_count, 0);
    assert!(s.error.is_none());
}

/// Every operation reports the store as down.
struct Down;

fn down<T>() -> StoreResult<T> {
    Err(StoreError::Unavailable("connection reset".into()))
}

#[async_trait::async_trait]
impl DataStore for Down {
    async fn get_source(&self, _: &str) -> StoreResult<Option<DataSource>> {
        down()
    }
    async fn list_locations(&self) -> StoreResult<Vec<Location>> {
        down()
    }
    async fn create_call(&self, _: SourceId, _: ActorId, _: SourceCategory) -> StoreResult<CallId> {
        down()
    }
    async fn update_call_status(&self, _: CallId, _: CallStatus) -> StoreResult<u64> {
        down()
    }
    async fn insert_reading(&self, _: NewReading) -> StoreResult<ReadingId> {
        down()
    }
    async fn insert_error(&self, _: CallId, _: &str, _: &str) -> StoreResult<ErrorId> {
        down()
    }
    async fn list_recent_readings(&self, _: SourceCategory, _: usize) -> StoreResult<Vec<Reading>> {
        down()
    }
    async fn add_source(
        &self,
        _: &str,
        _: SourceCategory,
        _: &str,
        _: Option<String>,
    ) -> StoreResult<SourceId> {
        down()
    }
    async fn add_location(
        &self,
        _: &str,
        _: &str,
        _: f64,
        _: f64,
        _: Option<String>,
    ) -> StoreResult<LocationId> {
        down()
    }
    async fn get_call(&self, _: CallId) -> StoreResult<Option<Call>> {
        down()
    }
    async fn readings_for_call(&self, _: CallId) -> StoreResult<Vec<Reading>> {
        down()
    }
    async fn errors_for_call(&self, _: CallId) -> StoreResult<Vec<ErrorLog>> {
        down()
    }
}

#[tokio::test]
async fn unavailable_store_degrades_to_ok_with_error() {
    let (engine, bus) = engine(Arc::new(Down));
    let mut rx = bus.subscribe();
    let s = engine
        .run_validation(
            SourceCategory::Weather,
            ValidationWindow::default(),
            &Thresholds::default(),
        )
        .await;
    assert_eq!(s.status, ValidationStatus::Ok);
    assert!(s.warnings.is_empty());
    assert!(s.error.as_deref().unwrap().contains("connection reset"));
    assert_eq!(s.thresholds.len(), 3);
    assert!(matches!(rx.recv().await.unwrap(), StatusEvent::ValidationSummary(_)));
}
