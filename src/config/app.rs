// src/config/app.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use crate::ingest::providers::usgs::MAX_LOOKBACK_DAYS;
use crate::model::{ActorId, SourceCategory};
use crate::sync::SyncSettings;
use crate::validate::{
    Thresholds, ValidationWindow, DEFAULT_HISTORY_WINDOW, DEFAULT_RECENT_WINDOW,
};

pub const ENV_CONFIG_PATH: &str = "DATAWATCH_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/datawatch.toml";

fn default_fetch_timeout_secs() -> u64 {
    10
}
fn default_store_timeout_secs() -> u64 {
    5
}
fn default_max_concurrent() -> usize {
    4
}
fn default_sync_interval_secs() -> u64 {
    60
}
fn default_validation_interval_secs() -> u64 {
    300
}
fn default_history() -> usize {
    DEFAULT_HISTORY_WINDOW
}
fn default_recent() -> usize {
    DEFAULT_RECENT_WINDOW
}
fn default_publish_timeout_secs() -> u64 {
    5
}
fn default_bus_capacity() -> usize {
    100
}
fn default_bind() -> String {
    "127.0.0.1:8080".into()
}
fn default_webhook_attempts() -> u8 {
    1
}
fn default_units() -> String {
    "metric".into()
}
fn default_quake_lookback_days() -> i64 {
    30
}
fn default_quake_min_magnitude() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub sync: SyncSection,
    #[serde(default)]
    pub fetch: FetchSection,
    #[serde(default)]
    pub validation: ValidationSection,
    #[serde(default)]
    pub status: StatusSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub sources: Vec<SourceEntry>,
    #[serde(default)]
    pub locations: Vec<LocationEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSection {
    /// Identity recorded on every call; no implicit default.
    pub actor_id: u64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_store_timeout_secs")]
    pub store_timeout_secs: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_fetches: usize,
    #[serde(default = "default_sync_interval_secs")]
    pub interval_secs: u64,
    /// Source names to schedule; empty means every configured source.
    #[serde(default)]
    pub sources: Vec<String>,
}

/// Provider query knobs for the HTTP fetchers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchSection {
    /// OpenWeather units: "standard" | "metric" | "imperial".
    #[serde(default = "default_units")]
    pub units: String,
    #[serde(default = "default_quake_lookback_days")]
    pub quake_lookback_days: i64,
    #[serde(default = "default_quake_min_magnitude")]
    pub quake_min_magnitude: f64,
}

impl Default for FetchSection {
    fn default() -> Self {
        Self {
            units: default_units(),
            quake_lookback_days: default_quake_lookback_days(),
            quake_min_magnitude: default_quake_min_magnitude(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationSection {
    #[serde(default = "default_validation_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_history")]
    pub history_window: usize,
    #[serde(default = "default_recent")]
    pub recent_window: usize,
    /// Per category ("weather", "earthquake"), per metric std-dev multipliers.
    #[serde(default)]
    pub thresholds: BTreeMap<String, BTreeMap<String, f64>>,
}

impl Default for ValidationSection {
    fn default() -> Self {
        Self {
            interval_secs: default_validation_interval_secs(),
            history_window: default_history(),
            recent_window: default_recent(),
            thresholds: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSection {
    #[serde(default = "default_publish_timeout_secs")]
    pub publish_timeout_secs: u64,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_webhook_attempts")]
    pub webhook_attempts: u8,
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,
}

impl Default for StatusSection {
    fn default() -> Self {
        Self {
            publish_timeout_secs: default_publish_timeout_secs(),
            webhook_url: None,
            webhook_attempts: default_webhook_attempts(),
            bus_capacity: default_bus_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEntry {
    pub name: String,
    pub category: SourceCategory,
    pub base_url: String,
    /// Literal key, or "ENV" to read it from `api_key_env`.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationEntry {
    pub city: String,
    pub country: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub postal_code: Option<String>,
}

impl AppConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&data)
    }

    /// 1) $DATAWATCH_CONFIG_PATH
    /// 2) config/datawatch.toml
    pub fn load_default() -> Result<Self> {
        let path = match env::var(ENV_CONFIG_PATH) {
            Ok(p) => {
                let pb = PathBuf::from(p);
                if !pb.exists() {
                    return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
                }
                pb
            }
            Err(_) => PathBuf::from(DEFAULT_CONFIG_PATH),
        };
        Self::load_from_file(path)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: AppConfig = toml::from_str(s).context("parsing datawatch config")?;
        cfg.sanitize();
        for src in &mut cfg.sources {
            src.resolve_api_key()?;
        }
        Ok(cfg)
    }

    fn sanitize(&mut self) {
        let s = &mut self.sync;
        s.fetch_timeout_secs = s.fetch_timeout_secs.max(1);
        s.store_timeout_secs = s.store_timeout_secs.max(1);
        s.max_concurrent_fetches = s.max_concurrent_fetches.max(1);
        s.interval_secs = s.interval_secs.max(1);

        let f = &mut self.fetch;
        f.quake_lookback_days = f.quake_lookback_days.clamp(1, MAX_LOOKBACK_DAYS);

        let v = &mut self.validation;
        v.interval_secs = v.interval_secs.max(1);
        v.history_window = v.history_window.max(1);
        if v.recent_window > v.history_window {
            tracing::warn!(
                recent = v.recent_window,
                history = v.history_window,
                "recent_window larger than history_window; clamping"
            );
            v.recent_window = v.history_window;
        }

        self.status.publish_timeout_secs = self.status.publish_timeout_secs.max(1);
        self.status.webhook_attempts = self.status.webhook_attempts.max(1);
        self.status.bus_capacity = self.status.bus_capacity.max(1);
    }

    pub fn actor(&self) -> ActorId {
        ActorId(self.sync.actor_id)
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            fetch_timeout: Duration::from_secs(self.sync.fetch_timeout_secs),
            store_timeout: Duration::from_secs(self.sync.store_timeout_secs),
            max_concurrent_fetches: self.sync.max_concurrent_fetches,
        }
    }

    pub fn validation_window(&self) -> ValidationWindow {
        ValidationWindow::new(self.validation.history_window, self.validation.recent_window)
    }

    pub fn thresholds_for(&self, category: SourceCategory) -> Thresholds {
        let mut out = Thresholds::default();
        let Some(table) = self.validation.thresholds.get(category.as_str()) else {
            return out;
        };
        for (key, k) in table {
            match category.metrics().iter().find(|m| m.as_str() == key) {
                Some(metric) => out = out.set(*metric, *k),
                None => tracing::warn!(
                    category = %category,
                    metric = %key,
                    "ignoring threshold for untracked metric"
                ),
            }
        }
        out
    }

    /// Source names the scheduler should sync.
    pub fn scheduled_sources(&self) -> Vec<String> {
        if self.sync.sources.is_empty() {
            self.sources.iter().map(|s| s.name.clone()).collect()
        } else {
            self.sync.sources.clone()
        }
    }

    /// Distinct categories among configured sources.
    pub fn categories(&self) -> Vec<SourceCategory> {
        let mut v: Vec<SourceCategory> = self.sources.iter().map(|s| s.category).collect();
        v.sort();
        v.dedup();
        v
    }
}

impl SourceEntry {
    fn resolve_api_key(&mut self) -> Result<()> {
        let wants_env = self
            .api_key
            .as_deref()
            .is_some_and(|k| k.trim().eq_ignore_ascii_case("env"));
        if wants_env {
            let var = self
                .api_key_env
                .clone()
                .ok_or_else(|| anyhow!("source `{}`: api_key = \"ENV\" needs api_key_env", self.name))?;
            let key = env::var(&var)
                .map_err(|_| anyhow!("Missing {var} env var for source `{}`", self.name))?;
            self.api_key = Some(key);
        }
        Ok(())
    }
}
