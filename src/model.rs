//! # Data Model
//! Entities persisted by the store and passed through the pipeline.
//!
//! Locations and data sources are read-only to the pipeline. Calls are
//! created at run start and receive one terminal status; readings and error
//! logs are append-only children of exactly one call.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(LocationId);
id_type!(SourceId);
id_type!(CallId);
id_type!(ReadingId);
id_type!(ErrorId);
id_type!(
    /// Identity of whoever initiated a call (scheduler, operator, demo).
    ActorId
);

/// Kind of telemetry a source produces; decides fetcher and tracked metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceCategory {
    Weather,
    Earthquake,
}

impl SourceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceCategory::Weather => "weather",
            SourceCategory::Earthquake => "earthquake",
        }
    }

    /// Numeric metrics the validation engine tracks for this category.
    pub fn metrics(&self) -> &'static [Metric] {
        match self {
            SourceCategory::Weather => &[Metric::Temperature, Metric::Humidity, Metric::WindSpeed],
            SourceCategory::Earthquake => &[Metric::Magnitude, Metric::Depth],
        }
    }
}

impl fmt::Display for SourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub city: String,
    pub country: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub postal_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    pub id: SourceId,
    pub name: String,
    pub category: SourceCategory,
    pub base_url: String,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

/// Lifecycle of a call. Only `Started` is non-terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CallStatus {
    Started,
    Success,
    Partial,
    Failed,
}

impl CallStatus {
    /// Terminal status derived from per-location outcome counts.
    ///
    /// `FAILED` when nothing succeeded and something failed, `SUCCESS` when
    /// nothing failed, `PARTIAL` otherwise.
    pub fn from_counts(success_count: usize, failure_count: usize) -> Self {
        if success_count == 0 && failure_count > 0 {
            CallStatus::Failed
        } else if failure_count == 0 {
            CallStatus::Success
        } else {
            CallStatus::Partial
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, CallStatus::Started)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Started => "STARTED",
            CallStatus::Success => "SUCCESS",
            CallStatus::Partial => "PARTIAL",
            CallStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub id: CallId,
    pub source_id: SourceId,
    pub actor: ActorId,
    pub category: SourceCategory,
    pub status: CallStatus,
    pub created_at: DateTime<Utc>,
}

/// Measurement fields of one reading, shaped by the source category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Measurements {
    Weather {
        temperature: f64,
        humidity: f64,
        wind_speed: f64,
    },
    Earthquake {
        magnitude: f64,
        depth: f64,
    },
}

impl Measurements {
    pub fn category(&self) -> SourceCategory {
        match self {
            Measurements::Weather { .. } => SourceCategory::Weather,
            Measurements::Earthquake { .. } => SourceCategory::Earthquake,
        }
    }

    /// Value of `metric`, or `None` when the metric belongs to another category.
    pub fn get(&self, metric: Metric) -> Option<f64> {
        match (self, metric) {
            (Measurements::Weather { temperature, .. }, Metric::Temperature) => Some(*temperature),
            (Measurements::Weather { humidity, .. }, Metric::Humidity) => Some(*humidity),
            (Measurements::Weather { wind_speed, .. }, Metric::WindSpeed) => Some(*wind_speed),
            (Measurements::Earthquake { magnitude, .. }, Metric::Magnitude) => Some(*magnitude),
            (Measurements::Earthquake { depth, .. }, Metric::Depth) => Some(*depth),
            _ => None,
        }
    }
}

/// A tracked numeric metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Temperature,
    Humidity,
    WindSpeed,
    Magnitude,
    Depth,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Temperature => "temperature",
            Metric::Humidity => "humidity",
            Metric::WindSpeed => "wind_speed",
            Metric::Magnitude => "magnitude",
            Metric::Depth => "depth",
        }
    }
}

/// Normalized output of one successful fetch, before it gets an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingPayload {
    pub measurements: Measurements,
    pub recorded_at: DateTime<Utc>,
}

/// Everything the store needs to insert a reading.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReading {
    pub source_id: SourceId,
    pub location_id: LocationId,
    pub actor: ActorId,
    pub payload: ReadingPayload,
    pub call_id: CallId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub id: ReadingId,
    pub source_id: SourceId,
    pub location_id: LocationId,
    pub actor: ActorId,
    pub measurements: Measurements,
    pub recorded_at: DateTime<Utc>,
    pub call_id: CallId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorLog {
    pub id: ErrorId,
    pub call_id: CallId,
    pub category: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_rule_matches_counts() {
        assert_eq!(CallStatus::from_counts(0, 3), CallStatus::Failed);
        assert_eq!(CallStatus::from_counts(3, 0), CallStatus::Success);
        assert_eq!(CallStatus::from_counts(2, 1), CallStatus::Partial);
        // nothing attempted counts as clean
        assert_eq!(CallStatus::from_counts(0, 0), CallStatus::Success);
    }

    #[test]
    fn status_serializes_uppercase() {
        let s = serde_json::to_string(&CallStatus::Partial).unwrap();
        assert_eq!(s, "\"PARTIAL\"");
    }

    #[test]
    fn measurements_expose_only_own_metrics() {
        let m = Measurements::Earthquake {
            magnitude: 4.2,
            depth: 11.0,
        };
        assert_eq!(m.get(Metric::Magnitude), Some(4.2));
        assert_eq!(m.get(Metric::Temperature), None);
        assert_eq!(m.category(), SourceCategory::Earthquake);
    }
}
