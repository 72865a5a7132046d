// tests/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use datawatch::bootstrap::{seed_store, Runtime};
use datawatch::ingest::providers::{OpenWeatherFetcher, UsgsQuakeFetcher};
use datawatch::ingest::FetcherRegistry;
use datawatch::model::{CallId, CallStatus};
use datawatch::{AppConfig, DataStore, MemoryStore, StatusEvent};

const OPENWEATHER: &str = include_str!("fixtures/openweather.json");
const USGS: &str = include_str!("fixtures/usgs_quake.geojson");

const CONFIG: &str = r#"
[sync]
actor_id = 5
interval_secs = 60

[validation]
interval_secs = 60

[[sources]]
name = "OpenWeather"
category = "weather"
base_url = "https://api.openweathermap.org/data/2.5/weather"

[[sources]]
name = "USGSEarthquake"
category = "earthquake"
base_url = "https://earthquake.usgs.gov/fdsnws/event/1/query"

[[locations]]
city = "Chicago"
country = "US"
lat = 41.8781
lon = -87.6298
"#;

async fn fixture_runtime() -> Runtime {
    let cfg = AppConfig::from_toml_str(CONFIG).unwrap();
    let store: Arc<dyn DataStore> = Arc::new(MemoryStore::new());
    seed_store(store.as_ref(), &cfg).await.unwrap();
    let fetchers = FetcherRegistry::new()
        .with(Arc::new(OpenWeatherFetcher::from_fixture(OPENWEATHER)))
        .with(Arc::new(UsgsQuakeFetcher::from_fixture(USGS)));
    Runtime::assemble(cfg, store, fetchers)
}

fn assert_send<T: Send>(_: &T) {}

#[tokio::test]
async fn run_sync_future_is_send() {
    let rt = fixture_runtime().await;
    let fut = rt.orchestrator.run_sync("OpenWeather", rt.cfg.actor());
    assert_send(&fut);
    assert!(fut.await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn schedulers_sync_and_validate_on_their_intervals() {
    let rt = fixture_runtime().await;
    let mut rx = rt.bus.subscribe();
    let handles = rt.spawn_schedulers();
    assert_eq!(handles.len(), 3);

    // first tick is immediate; go past one full interval
    tokio::time::sleep(Duration::from_secs(61)).await;

    let first = rt.store.get_call(CallId(1)).await.unwrap().unwrap();
    assert_eq!(first.status, CallStatus::Success);
    // two sources, two ticks each
    assert!(rt.store.get_call(CallId(4)).await.unwrap().is_some());

    let mut runs = 0;
    let mut validations = 0;
    while let Ok(ev) = rx.try_recv() {
        match ev {
            StatusEvent::RunSummary(s) => {
                assert!(!s.is_error(), "{s:?}");
                runs += 1;
            }
            StatusEvent::ValidationSummary(_) => validations += 1,
        }
    }
    assert!(runs >= 4, "runs = {runs}");
    assert!(validations >= 4, "validations = {validations}");

    for h in handles {
        h.abort();
    }
}
