// src/ingest/mod.rs
pub mod providers;
pub mod scheduler;
pub mod types;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::histogram;

use crate::ingest::types::{FetchError, ReadingFetcher};
use crate::model::{DataSource, Location, ReadingPayload, SourceCategory};

/// Fetchers keyed by the source category they serve.
#[derive(Clone, Default)]
pub struct FetcherRegistry {
    by_category: HashMap<SourceCategory, Arc<dyn ReadingFetcher>>,
}

impl FetcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `fetcher` under its own category, replacing any previous one.
    pub fn with(mut self, fetcher: Arc<dyn ReadingFetcher>) -> Self {
        self.by_category.insert(fetcher.category(), fetcher);
        self
    }

    pub fn get(&self, category: SourceCategory) -> Option<Arc<dyn ReadingFetcher>> {
        self.by_category.get(&category).cloned()
    }
}

/// One fetch bounded by `timeout`. A timeout is reported like any other
/// fetch failure.
pub async fn fetch_bounded(
    fetcher: &dyn ReadingFetcher,
    location: &Location,
    source: &DataSource,
    timeout: Duration,
) -> Result<ReadingPayload, FetchError> {
    let t0 = Instant::now();
    let res = match tokio::time::timeout(timeout, fetcher.fetch(location, source)).await {
        Ok(res) => res,
        Err(_) => Err(FetchError::Timeout(timeout)),
    };
    histogram!("ingest_fetch_ms", "provider" => fetcher.name())
        .record(t0.elapsed().as_secs_f64() * 1_000.0);
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LocationId, SourceId};

    struct Stalled;

    #[async_trait::async_trait]
    impl ReadingFetcher for Stalled {
        async fn fetch(&self, _: &Location, _: &DataSource) -> Result<ReadingPayload, FetchError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(FetchError::NoData("unreachable".into()))
        }
        fn category(&self) -> SourceCategory {
            SourceCategory::Weather
        }
        fn name(&self) -> &'static str {
            "stalled"
        }
    }

    fn loc() -> Location {
        Location {
            id: LocationId(7),
            city: "Denver".into(),
            country: "US".into(),
            lat: 39.7,
            lon: -104.9,
            postal_code: None,
        }
    }

    fn src() -> DataSource {
        DataSource {
            id: SourceId(1),
            name: "OpenWeather".into(),
            category: SourceCategory::Weather,
            base_url: "http://localhost".into(),
            api_key: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_fetch_times_out() {
        let err = fetch_bounded(&Stalled, &loc(), &src(), Duration::from_secs(10))
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::Timeout(Duration::from_secs(10)));
        assert_eq!(err.tag(), "FetchTimeout");
    }

    #[test]
    fn registry_keys_by_category() {
        let reg = FetcherRegistry::new().with(Arc::new(Stalled));
        assert!(reg.get(SourceCategory::Weather).is_some());
        assert!(reg.get(SourceCategory::Earthquake).is_none());
    }
}
