//! Status channel: where run and validation summaries go.
//!
//! Delivery is best-effort and at-most-once. `ChannelMux::publish` never
//! returns an error; every failure is logged and counted instead.

pub mod bus;
pub mod webhook;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use metrics::counter;
use serde::{Deserialize, Serialize};

use crate::sync::RunSummary;
use crate::validate::ValidationSummary;

pub use bus::BusChannel;
pub use webhook::WebhookChannel;

/// One published event. Serialized as `{"event": "...", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum StatusEvent {
    RunSummary(RunSummary),
    ValidationSummary(ValidationSummary),
}

impl StatusEvent {
    pub fn name(&self) -> &'static str {
        match self {
            StatusEvent::RunSummary(_) => "run-summary",
            StatusEvent::ValidationSummary(_) => "validation-summary",
        }
    }
}

#[async_trait::async_trait]
pub trait StatusChannel: Send + Sync {
    async fn publish(&self, ev: &StatusEvent) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Writes the summary as a structured log line.
pub struct LogChannel;

#[async_trait::async_trait]
impl StatusChannel for LogChannel {
    async fn publish(&self, ev: &StatusEvent) -> Result<()> {
        let payload = serde_json::to_string(ev)?;
        tracing::info!(target: "status", event = ev.name(), %payload, "status event");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Fans one event out to every configured channel.
#[derive(Clone)]
pub struct ChannelMux {
    channels: Vec<Arc<dyn StatusChannel>>,
    timeout: Duration,
}

impl ChannelMux {
    pub fn new(timeout: Duration) -> Self {
        Self {
            channels: Vec::new(),
            timeout,
        }
    }

    pub fn with(mut self, ch: Arc<dyn StatusChannel>) -> Self {
        self.channels.push(ch);
        self
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Publish to all channels, each bounded by the mux timeout.
    /// Returns how many channels accepted the event.
    pub async fn publish(&self, ev: &StatusEvent) -> usize {
        let mut delivered = 0usize;
        for ch in &self.channels {
            match tokio::time::timeout(self.timeout, ch.publish(ev)).await {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    tracing::warn!(channel = ch.name(), event = ev.name(), "publish failed: {e:#}");
                    counter!("status_publish_failures_total", "channel" => ch.name()).increment(1);
                }
                Err(_) => {
                    tracing::warn!(
                        channel = ch.name(),
                        event = ev.name(),
                        timeout_ms = self.timeout.as_millis() as u64,
                        "publish timed out"
                    );
                    counter!("status_publish_failures_total", "channel" => ch.name()).increment(1);
                }
            }
        }
        delivered
    }
}
