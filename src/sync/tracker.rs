// src/sync/tracker.rs
use std::sync::Arc;
use std::time::Duration;

use crate::model::{ActorId, CallId, CallStatus, ErrorId, SourceCategory, SourceId};
use crate::store::{bounded, DataStore, StoreResult};

/// Records the lifecycle of one call: start, per-location failures, finish.
///
/// Holds no state of its own; every operation goes straight to the store,
/// bounded by `timeout`. `finish` is last-write-wins, so the fatal path may
/// call it again after a happy-path finish.
#[derive(Clone)]
pub struct CallTracker {
    store: Arc<dyn DataStore>,
    timeout: Duration,
}

impl CallTracker {
    pub fn new(store: Arc<dyn DataStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub async fn start(
        &self,
        source: SourceId,
        actor: ActorId,
        category: SourceCategory,
    ) -> StoreResult<CallId> {
        let id = bounded(self.timeout, self.store.create_call(source, actor, category)).await?;
        tracing::debug!(call_id = %id, source_id = %source, actor = %actor, "call started");
        Ok(id)
    }

    pub async fn fail_location(
        &self,
        call_id: CallId,
        category_tag: &str,
        message: &str,
    ) -> StoreResult<ErrorId> {
        bounded(self.timeout, self.store.insert_error(call_id, category_tag, message))
            .await
    }

    pub async fn finish(&self, call_id: CallId, status: CallStatus) -> StoreResult<()> {
        debug_assert!(status.is_terminal(), "finish with non-terminal {status}");
        let affected =
            bounded(self.timeout, self.store.update_call_status(call_id, status)).await?;
        if affected == 0 {
            tracing::warn!(call_id = %call_id, status = %status, "finish touched no call");
        } else {
            tracing::debug!(call_id = %call_id, status = %status, "call finished");
        }
        Ok(())
    }
}
