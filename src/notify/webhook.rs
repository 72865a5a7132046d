use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use std::time::Duration;

use super::{StatusChannel, StatusEvent};

/// POSTs each event as JSON to a dashboard webhook.
#[derive(Clone)]
pub struct WebhookChannel {
    url: String,
    client: Client,
    timeout: Duration,
    max_attempts: u8,
}

impl WebhookChannel {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_attempts: 1,
        }
    }

    /// Reads `DATAWATCH_WEBHOOK_URL`; `None` when unset or empty.
    pub fn from_env() -> Option<Self> {
        std::env::var("DATAWATCH_WEBHOOK_URL")
            .ok()
            .filter(|u| !u.trim().is_empty())
            .map(Self::new)
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs.max(1));
        self
    }

    pub fn with_attempts(mut self, attempts: u8) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl StatusChannel for WebhookChannel {
    async fn publish(&self, ev: &StatusEvent) -> Result<()> {
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.url)
                .timeout(self.timeout)
                .json(ev)
                .send()
                .await
                .context("webhook post")
                .and_then(|rsp| rsp.error_for_status().context("webhook non-2xx"));

            match res {
                Ok(_) => return Ok(()),
                Err(e) if attempt < self.max_attempts => {
                    tracing::debug!(attempt, "webhook attempt failed: {e:#}");
                    tokio::time::sleep(Duration::from_millis(250u64 << (attempt - 1))).await;
                }
                Err(e) => return Err(anyhow!("webhook gave up after {attempt} attempt(s): {e:#}")),
            }
        }
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}
