// src/ingest/providers/usgs.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::histogram;
use serde::Deserialize;

use crate::ingest::types::{FetchError, ReadingFetcher};
use crate::model::{DataSource, Location, Measurements, ReadingPayload, SourceCategory};

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    properties: Properties,
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Properties {
    mag: Option<f64>,
    /// unix milliseconds
    time: i64,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    /// [lon, lat, depth_km]
    coordinates: Vec<f64>,
}

/// Query window around each location, in degrees.
const DEFAULT_BOX_DEG: f64 = 0.5;
const DEFAULT_MIN_MAGNITUDE: f64 = 1.0;
/// Upper bound for the search window, in days.
pub const MAX_LOOKBACK_DAYS: i64 = 3650;

/// Seismic events from the USGS FDSN event service (GeoJSON), searched in a
/// box around the location. The most recent event in the box becomes the
/// reading; an empty box is reported as `NoData`.
pub struct UsgsQuakeFetcher {
    mode: Mode,
    box_deg: f64,
    min_magnitude: f64,
    lookback_days: i64,
}

enum Mode {
    Fixture(String),
    Http { client: reqwest::Client },
}

impl UsgsQuakeFetcher {
    pub fn from_fixture(body: &str) -> Self {
        Self::with_mode(Mode::Fixture(body.to_string()))
    }

    pub fn http(client: reqwest::Client) -> Self {
        Self::with_mode(Mode::Http { client })
    }

    fn with_mode(mode: Mode) -> Self {
        Self {
            mode,
            box_deg: DEFAULT_BOX_DEG,
            min_magnitude: DEFAULT_MIN_MAGNITUDE,
            lookback_days: 30,
        }
    }

    pub fn with_lookback_days(mut self, days: i64) -> Self {
        self.lookback_days = days.clamp(1, MAX_LOOKBACK_DAYS);
        self
    }

    pub fn with_min_magnitude(mut self, mag: f64) -> Self {
        self.min_magnitude = mag;
        self
    }

    pub fn parse_payload(body: &str) -> Result<ReadingPayload, FetchError> {
        let t0 = std::time::Instant::now();
        let fc: FeatureCollection =
            serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))?;

        let mut latest: Option<ReadingPayload> = None;
        for f in fc.features {
            let Some(magnitude) = f.properties.mag else {
                continue;
            };
            let Some(&depth) = f.geometry.coordinates.get(2) else {
                return Err(FetchError::Malformed("geometry without depth".into()));
            };
            let recorded_at = DateTime::<Utc>::from_timestamp_millis(f.properties.time)
                .ok_or_else(|| FetchError::Malformed(format!("bad time {}", f.properties.time)))?;

            if latest.as_ref().map_or(true, |l| recorded_at > l.recorded_at) {
                latest = Some(ReadingPayload {
                    measurements: Measurements::Earthquake { magnitude, depth },
                    recorded_at,
                });
            }
        }

        histogram!("ingest_parse_ms", "provider" => "usgs")
            .record(t0.elapsed().as_secs_f64() * 1_000.0);
        latest.ok_or_else(|| FetchError::NoData("no events in search box".into()))
    }

    fn query_for(&self, location: &Location) -> Vec<(&'static str, String)> {
        let end = Utc::now();
        let start = end - chrono::Duration::days(self.lookback_days);
        vec![
            ("format", "geojson".into()),
            ("starttime", start.format("%Y-%m-%d").to_string()),
            ("endtime", end.format("%Y-%m-%d").to_string()),
            ("minmagnitude", self.min_magnitude.to_string()),
            ("minlatitude", (location.lat - self.box_deg).to_string()),
            ("maxlatitude", (location.lat + self.box_deg).to_string()),
            ("minlongitude", (location.lon - self.box_deg).to_string()),
            ("maxlongitude", (location.lon + self.box_deg).to_string()),
            ("orderby", "time".into()),
        ]
    }
}

#[async_trait]
impl ReadingFetcher for UsgsQuakeFetcher {
    async fn fetch(
        &self,
        location: &Location,
        source: &DataSource,
    ) -> Result<ReadingPayload, FetchError> {
        match &self.mode {
            Mode::Fixture(body) => Self::parse_payload(body),
            Mode::Http { client } => {
                let body = client
                    .get(&source.base_url)
                    .query(&self.query_for(location))
                    .send()
                    .await?
                    .error_for_status()?
                    .text()
                    .await?;
                Self::parse_payload(&body)
            }
        }
    }

    fn category(&self) -> SourceCategory {
        SourceCategory::Earthquake
    }

    fn name(&self) -> &'static str {
        "usgs"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LocationId;

    #[test]
    fn picks_most_recent_event() {
        let body = r#"{"features":[
            {"properties":{"mag":2.1,"time":1700000000000},"geometry":{"coordinates":[-118.1,34.0,12.5]}},
            {"properties":{"mag":3.4,"time":1700000500000},"geometry":{"coordinates":[-118.2,34.1,8.0]}}
        ]}"#;
        let p = UsgsQuakeFetcher::parse_payload(body).unwrap();
        assert_eq!(
            p.measurements,
            Measurements::Earthquake {
                magnitude: 3.4,
                depth: 8.0
            }
        );
    }

    #[test]
    fn empty_collection_is_no_data() {
        let err = UsgsQuakeFetcher::parse_payload(r#"{"features":[]}"#).unwrap_err();
        assert_eq!(err.tag(), "NoData");
    }

    #[test]
    fn query_boxes_location() {
        let f = UsgsQuakeFetcher::from_fixture("{}");
        let loc = Location {
            id: LocationId(1),
            city: "Los Angeles".into(),
            country: "US".into(),
            lat: 34.0,
            lon: -118.0,
            postal_code: Some("90001".into()),
        };
        let q = f.query_for(&loc);
        let get = |k: &str| q.iter().find(|(n, _)| *n == k).map(|(_, v)| v.clone());
        assert_eq!(get("minlatitude").as_deref(), Some("33.5"));
        assert_eq!(get("maxlongitude").as_deref(), Some("-117.5"));
        assert_eq!(get("format").as_deref(), Some("geojson"));
    }

    #[test]
    fn huge_lookback_is_clamped() {
        let f = UsgsQuakeFetcher::from_fixture("{}").with_lookback_days(i64::MAX);
        assert_eq!(f.lookback_days, MAX_LOOKBACK_DAYS);
        let loc = Location {
            id: LocationId(2),
            city: "Anchorage".into(),
            country: "US".into(),
            lat: 61.2,
            lon: -149.9,
            postal_code: None,
        };
        let q = f.query_for(&loc);
        assert!(q.iter().any(|(k, _)| *k == "starttime"));
    }
}
