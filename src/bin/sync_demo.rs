//! Offline demo: fixture-backed fetchers, in-memory store, one sync per
//! source followed by validation. Prints every status event it sees.

use std::sync::Arc;

use datawatch::bootstrap::{seed_store, Runtime};
use datawatch::ingest::providers::{OpenWeatherFetcher, UsgsQuakeFetcher};
use datawatch::ingest::FetcherRegistry;
use datawatch::{AppConfig, DataStore, MemoryStore};

const OPENWEATHER: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/tests/fixtures/openweather.json"
));
const USGS: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/tests/fixtures/usgs_quake.geojson"
));

const DEMO_CONFIG: &str = r#"
[sync]
actor_id = 1

[[sources]]
name = "OpenWeather"
category = "weather"
base_url = "https://api.openweathermap.org/data/2.5/weather"

[[sources]]
name = "USGSEarthquake"
category = "earthquake"
base_url = "https://earthquake.usgs.gov/fdsnws/event/1/query"

[[locations]]
city = "Beverly Hills"
country = "US"
lat = 34.0901
lon = -118.4065

[[locations]]
city = "Los Angeles"
country = "US"
lat = 34.0522
lon = -118.2437
"#;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let cfg = AppConfig::from_toml_str(DEMO_CONFIG)?;
    let store: Arc<dyn DataStore> = Arc::new(MemoryStore::new());
    seed_store(store.as_ref(), &cfg).await?;

    let fetchers = FetcherRegistry::new()
        .with(Arc::new(OpenWeatherFetcher::from_fixture(OPENWEATHER)))
        .with(Arc::new(UsgsQuakeFetcher::from_fixture(USGS)));
    let rt = Runtime::assemble(cfg, store, fetchers);
    let mut rx = rt.bus.subscribe();

    let actor = rt.cfg.actor();
    for source in rt.cfg.scheduled_sources() {
        if let Err(e) = rt.orchestrator.run_sync(&source, actor).await {
            println!("sync {source} failed: {e}");
        }
    }
    for category in rt.cfg.categories() {
        rt.validator
            .run_validation(category, rt.cfg.validation_window(), &rt.cfg.thresholds_for(category))
            .await;
    }

    while let Ok(ev) = rx.try_recv() {
        println!("{}", serde_json::to_string_pretty(&ev)?);
    }
    println!("sync-demo done");
    Ok(())
}
