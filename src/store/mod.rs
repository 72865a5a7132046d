// src/store/mod.rs
pub mod memory;

use crate::model::{
    ActorId, Call, CallId, CallStatus, DataSource, ErrorId, ErrorLog, Location, LocationId,
    NewReading, Reading, ReadingId, SourceCategory, SourceId,
};

pub use memory::MemoryStore;

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("data store unavailable: {0}")]
    Unavailable(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },
    #[error("duplicate {entity}: {key}")]
    Duplicate { entity: &'static str, key: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable storage behind the pipeline.
///
/// Implementations allocate ids from per-entity monotonic counters.
/// `list_recent_readings` returns newest-first by `recorded_at`.
#[async_trait::async_trait]
pub trait DataStore: Send + Sync {
    async fn get_source(&self, name: &str) -> StoreResult<Option<DataSource>>;
    async fn list_locations(&self) -> StoreResult<Vec<Location>>;

    async fn create_call(
        &self,
        source_id: SourceId,
        actor: ActorId,
        category: SourceCategory,
    ) -> StoreResult<CallId>;
    /// Returns the number of affected calls (0 when the id is unknown).
    async fn update_call_status(&self, call_id: CallId, status: CallStatus) -> StoreResult<u64>;
    async fn insert_reading(&self, reading: NewReading) -> StoreResult<ReadingId>;
    async fn insert_error(
        &self,
        call_id: CallId,
        category: &str,
        message: &str,
    ) -> StoreResult<ErrorId>;

    async fn list_recent_readings(
        &self,
        category: SourceCategory,
        limit: usize,
    ) -> StoreResult<Vec<Reading>>;

    // --- bootstrap ---
    async fn add_source(
        &self,
        name: &str,
        category: SourceCategory,
        base_url: &str,
        api_key: Option<String>,
    ) -> StoreResult<SourceId>;
    async fn add_location(
        &self,
        city: &str,
        country: &str,
        lat: f64,
        lon: f64,
        postal_code: Option<String>,
    ) -> StoreResult<LocationId>;

    // --- auditing ---
    async fn get_call(&self, call_id: CallId) -> StoreResult<Option<Call>>;
    async fn readings_for_call(&self, call_id: CallId) -> StoreResult<Vec<Reading>>;
    async fn errors_for_call(&self, call_id: CallId) -> StoreResult<Vec<ErrorLog>>;
}

/// Runs one store operation bounded by `timeout`; a timeout reports the
/// store as unavailable.
pub async fn bounded<T>(
    timeout: std::time::Duration,
    fut: impl std::future::Future<Output = StoreResult<T>>,
) -> StoreResult<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(res) => res,
        Err(_) => Err(StoreError::Unavailable(format!(
            "store call timed out after {timeout:?}"
        ))),
    }
}
