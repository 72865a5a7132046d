// src/ingest/providers/openweather.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::histogram;
use serde::Deserialize;

use crate::ingest::types::{FetchError, ReadingFetcher};
use crate::model::{DataSource, Location, Measurements, ReadingPayload, SourceCategory};

#[derive(Debug, Deserialize)]
struct CurrentWeather {
    main: Main,
    wind: Wind,
    /// unix seconds
    dt: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Main {
    temp: f64,
    humidity: f64,
}

#[derive(Debug, Deserialize)]
struct Wind {
    speed: f64,
}

/// Current conditions from the OpenWeather `weather` endpoint, queried by
/// the location's coordinates.
pub struct OpenWeatherFetcher {
    mode: Mode,
    units: String,
}

enum Mode {
    // Same body for every location; used by tests and the demo.
    Fixture(String),
    Http { client: reqwest::Client },
}

impl OpenWeatherFetcher {
    pub fn from_fixture(body: &str) -> Self {
        Self {
            mode: Mode::Fixture(body.to_string()),
            units: "metric".into(),
        }
    }

    pub fn http(client: reqwest::Client) -> Self {
        Self {
            mode: Mode::Http { client },
            units: "metric".into(),
        }
    }

    /// "standard" | "metric" | "imperial"
    pub fn with_units(mut self, units: &str) -> Self {
        self.units = units.to_string();
        self
    }

    pub fn parse_payload(body: &str) -> Result<ReadingPayload, FetchError> {
        let t0 = std::time::Instant::now();
        let cw: CurrentWeather =
            serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))?;

        let recorded_at = match cw.dt {
            Some(ts) => DateTime::<Utc>::from_timestamp(ts, 0)
                .ok_or_else(|| FetchError::Malformed(format!("bad dt {ts}")))?,
            None => Utc::now(),
        };

        let out = ReadingPayload {
            measurements: Measurements::Weather {
                temperature: cw.main.temp,
                humidity: cw.main.humidity,
                wind_speed: cw.wind.speed,
            },
            recorded_at,
        };

        histogram!("ingest_parse_ms", "provider" => "openweather")
            .record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(out)
    }
}

#[async_trait]
impl ReadingFetcher for OpenWeatherFetcher {
    async fn fetch(
        &self,
        location: &Location,
        source: &DataSource,
    ) -> Result<ReadingPayload, FetchError> {
        match &self.mode {
            Mode::Fixture(body) => Self::parse_payload(body),
            Mode::Http { client } => {
                let mut query = vec![
                    ("lat", location.lat.to_string()),
                    ("lon", location.lon.to_string()),
                    ("units", self.units.clone()),
                ];
                if let Some(key) = &source.api_key {
                    query.push(("appid", key.clone()));
                }
                let resp = client
                    .get(&source.base_url)
                    .query(&query)
                    .send()
                    .await?
                    .error_for_status()?;
                let body = resp.text().await?;
                Self::parse_payload(&body)
            }
        }
    }

    fn category(&self) -> SourceCategory {
        SourceCategory::Weather
    }

    fn name(&self) -> &'static str {
        "openweather"
    }
}
