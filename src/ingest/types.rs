// src/ingest/types.rs
use std::time::Duration;

use crate::model::{DataSource, Location, ReadingPayload, SourceCategory};

/// Why a single per-location fetch failed. Never fatal to a run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),
    #[error("http error: {0}")]
    Http(String),
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("no data: {0}")]
    NoData(String),
    #[error("fetcher panicked: {0}")]
    Panicked(String),
}

impl FetchError {
    /// Category tag stored on the error log.
    pub fn tag(&self) -> &'static str {
        match self {
            FetchError::Timeout(_) => "FetchTimeout",
            FetchError::Http(_) => "FetchHttpError",
            FetchError::Malformed(_) => "MalformedPayload",
            FetchError::NoData(_) => "NoData",
            FetchError::Panicked(_) => "FetchPanic",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            FetchError::Malformed(e.to_string())
        } else {
            FetchError::Http(e.to_string())
        }
    }
}

/// One external fetch for one location.
#[async_trait::async_trait]
pub trait ReadingFetcher: Send + Sync {
    async fn fetch(
        &self,
        location: &Location,
        source: &DataSource,
    ) -> Result<ReadingPayload, FetchError>;
    fn category(&self) -> SourceCategory;
    fn name(&self) -> &'static str;
}
