use anyhow::Result;
use tokio::sync::broadcast;

use super::{StatusChannel, StatusEvent};

/// In-process event bus dashboards subscribe to.
///
/// Sending with no subscribers is not an error; slow subscribers lag and
/// lose the oldest events.
#[derive(Clone)]
pub struct BusChannel {
    tx: broadcast::Sender<StatusEvent>,
}

impl BusChannel {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait::async_trait]
impl StatusChannel for BusChannel {
    async fn publish(&self, ev: &StatusEvent) -> Result<()> {
        match self.tx.send(ev.clone()) {
            Ok(n) => tracing::debug!(event = ev.name(), subscribers = n, "bus publish"),
            Err(_) => tracing::trace!(event = ev.name(), "bus publish without subscribers"),
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "bus"
    }
}
