// src/lib.rs
// Public library surface for the service binary, demos and integration tests.

pub mod config;
pub mod ingest;
pub mod metrics;
pub mod model;
pub mod notify;
pub mod store;
pub mod sync;
pub mod validate;

pub mod bootstrap;

// ---- Re-exports for stable public API ----
pub use crate::bootstrap::Runtime;
pub use crate::config::AppConfig;
pub use crate::notify::{ChannelMux, StatusChannel, StatusEvent};
pub use crate::store::{DataStore, MemoryStore};
pub use crate::sync::{RunSummary, SyncError, SyncOrchestrator};
pub use crate::validate::{ValidationEngine, ValidationSummary};
