//! In-memory `DataStore`.
//!
//! Keeps every entity behind one mutex. Id allocation is a per-entity
//! counter bumped under the same lock, so ids are unique and strictly
//! increasing per entity kind. Readings are kept per category, ordered by
//! `(recorded_at, id)`, so recent-window reads never sort.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;

use super::{DataStore, StoreError, StoreResult};
use crate::model::{
    ActorId, Call, CallId, CallStatus, DataSource, ErrorId, ErrorLog, Location, LocationId,
    NewReading, Reading, ReadingId, SourceCategory, SourceId,
};

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    counters: Counters,
    sources: Vec<DataSource>,
    locations: Vec<Location>,
    calls: Vec<Call>,
    readings: BTreeMap<SourceCategory, Vec<Reading>>,
    errors: Vec<ErrorLog>,
}

#[derive(Debug, Default)]
struct Counters {
    source: u64,
    location: u64,
    call: u64,
    reading: u64,
    error: u64,
}

fn bump(counter: &mut u64) -> u64 {
    *counter += 1;
    *counter
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store mutex poisoned".into()))
    }

    /// Number of calls ever created (handy for audits and tests).
    pub fn call_count(&self) -> usize {
        self.lock().map(|g| g.calls.len()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl DataStore for MemoryStore {
    async fn get_source(&self, name: &str) -> StoreResult<Option<DataSource>> {
        let g = self.lock()?;
        Ok(g.sources.iter().find(|s| s.name == name).cloned())
    }

    async fn list_locations(&self) -> StoreResult<Vec<Location>> {
        Ok(self.lock()?.locations.clone())
    }

    async fn create_call(
        &self,
        source_id: SourceId,
        actor: ActorId,
        category: SourceCategory,
    ) -> StoreResult<CallId> {
        let mut g = self.lock()?;
        let id = CallId(bump(&mut g.counters.call));
        g.calls.push(Call {
            id,
            source_id,
            actor,
            category,
            status: CallStatus::Started,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn update_call_status(&self, call_id: CallId, status: CallStatus) -> StoreResult<u64> {
        let mut g = self.lock()?;
        match g.calls.iter_mut().find(|c| c.id == call_id) {
            Some(call) => {
                call.status = status;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn insert_reading(&self, reading: NewReading) -> StoreResult<ReadingId> {
        let mut g = self.lock()?;
        if !g.calls.iter().any(|c| c.id == reading.call_id) {
            return Err(StoreError::NotFound {
                entity: "call",
                id: reading.call_id.0,
            });
        }
        let id = ReadingId(bump(&mut g.counters.reading));
        let row = Reading {
            id,
            source_id: reading.source_id,
            location_id: reading.location_id,
            actor: reading.actor,
            measurements: reading.payload.measurements,
            recorded_at: reading.payload.recorded_at,
            call_id: reading.call_id,
        };
        let rows = g.readings.entry(row.measurements.category()).or_default();
        // the new id is the largest, so it goes after equal timestamps;
        // in-order arrivals append
        let at = rows.partition_point(|r| r.recorded_at <= row.recorded_at);
        rows.insert(at, row);
        Ok(id)
    }

    async fn insert_error(
        &self,
        call_id: CallId,
        category: &str,
        message: &str,
    ) -> StoreResult<ErrorId> {
        let mut g = self.lock()?;
        if !g.calls.iter().any(|c| c.id == call_id) {
            return Err(StoreError::NotFound {
                entity: "call",
                id: call_id.0,
            });
        }
        let id = ErrorId(bump(&mut g.counters.error));
        g.errors.push(ErrorLog {
            id,
            call_id,
            category: category.to_string(),
            message: message.to_string(),
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn list_recent_readings(
        &self,
        category: SourceCategory,
        limit: usize,
    ) -> StoreResult<Vec<Reading>> {
        let g = self.lock()?;
        Ok(g.readings
            .get(&category)
            .map(|rows| rows.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn add_source(
        &self,
        name: &str,
        category: SourceCategory,
        base_url: &str,
        api_key: Option<String>,
    ) -> StoreResult<SourceId> {
        let mut g = self.lock()?;
        if g.sources.iter().any(|s| s.name == name) {
            return Err(StoreError::Duplicate {
                entity: "data source",
                key: name.to_string(),
            });
        }
        let id = SourceId(bump(&mut g.counters.source));
        g.sources.push(DataSource {
            id,
            name: name.to_string(),
            category,
            base_url: base_url.to_string(),
            api_key,
        });
        Ok(id)
    }

    async fn add_location(
        &self,
        city: &str,
        country: &str,
        lat: f64,
        lon: f64,
        postal_code: Option<String>,
    ) -> StoreResult<LocationId> {
        let mut g = self.lock()?;
        let id = LocationId(bump(&mut g.counters.location));
        g.locations.push(Location {
            id,
            city: city.to_string(),
            country: country.to_string(),
            lat,
            lon,
            postal_code,
        });
        Ok(id)
    }

    async fn get_call(&self, call_id: CallId) -> StoreResult<Option<Call>> {
        let g = self.lock()?;
        Ok(g.calls.iter().find(|c| c.id == call_id).cloned())
    }

    async fn readings_for_call(&self, call_id: CallId) -> StoreResult<Vec<Reading>> {
        let g = self.lock()?;
        let mut out: Vec<Reading> = g
            .readings
            .values()
            .flatten()
            .filter(|r| r.call_id == call_id)
            .cloned()
            .collect();
        out.sort_by_key(|r| r.id);
        Ok(out)
    }

    async fn errors_for_call(&self, call_id: CallId) -> StoreResult<Vec<ErrorLog>> {
        let g = self.lock()?;
        Ok(g.errors
            .iter()
            .filter(|e| e.call_id == call_id)
            .cloned()
            .collect())
    }
}
