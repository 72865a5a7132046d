// src/bootstrap.rs
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::app::FetchSection;
use crate::config::AppConfig;
use crate::ingest::scheduler::{
    spawn_sync_schedulers, spawn_validation_scheduler, SyncScheduleCfg, ValidationScheduleCfg,
};
use crate::ingest::providers::{OpenWeatherFetcher, UsgsQuakeFetcher};
use crate::ingest::FetcherRegistry;
use crate::notify::{BusChannel, ChannelMux, LogChannel, WebhookChannel};
use crate::store::{DataStore, MemoryStore, StoreError};
use crate::sync::SyncOrchestrator;
use crate::validate::ValidationEngine;

/// Everything the service needs, wired from one config.
pub struct Runtime {
    pub cfg: AppConfig,
    pub store: Arc<dyn DataStore>,
    pub bus: BusChannel,
    pub orchestrator: Arc<SyncOrchestrator>,
    pub validator: Arc<ValidationEngine>,
}

impl Runtime {
    /// In-memory store seeded from config, HTTP fetchers.
    pub async fn from_config(cfg: AppConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.sync.fetch_timeout_secs))
            .build()
            .context("building http client")?;
        let store: Arc<dyn DataStore> = Arc::new(MemoryStore::new());
        seed_store(store.as_ref(), &cfg).await?;
        let fetchers = http_fetchers(client, &cfg.fetch);
        Ok(Self::assemble(cfg, store, fetchers))
    }

    /// Wire an already populated store with the given fetchers.
    pub fn assemble(cfg: AppConfig, store: Arc<dyn DataStore>, fetchers: FetcherRegistry) -> Self {
        let bus = BusChannel::new(cfg.status.bus_capacity);
        let mux = build_mux(&cfg, bus.clone());
        info!(
            channels = mux.len(),
            sources = cfg.sources.len(),
            locations = cfg.locations.len(),
            actor = %cfg.actor(),
            "runtime assembled"
        );

        let orchestrator = Arc::new(SyncOrchestrator::new(
            store.clone(),
            fetchers,
            mux.clone(),
            cfg.sync_settings(),
        ));
        let validator = Arc::new(
            ValidationEngine::new(store.clone(), mux)
                .with_store_timeout(Duration::from_secs(cfg.sync.store_timeout_secs)),
        );

        Self {
            cfg,
            store,
            bus,
            orchestrator,
            validator,
        }
    }

    pub fn spawn_schedulers(&self) -> Vec<JoinHandle<()>> {
        let mut handles = spawn_sync_schedulers(
            self.orchestrator.clone(),
            self.cfg.scheduled_sources(),
            SyncScheduleCfg {
                interval_secs: self.cfg.sync.interval_secs,
                actor: self.cfg.actor(),
            },
        );
        let categories = self
            .cfg
            .categories()
            .into_iter()
            .map(|c| (c, self.cfg.thresholds_for(c)))
            .collect();
        handles.push(spawn_validation_scheduler(
            self.validator.clone(),
            categories,
            ValidationScheduleCfg {
                interval_secs: self.cfg.validation.interval_secs,
                window: self.cfg.validation_window(),
            },
        ));
        handles
    }
}

/// HTTP-backed fetchers for every supported category, sharing one client.
pub fn http_fetchers(client: reqwest::Client, fetch: &FetchSection) -> FetcherRegistry {
    FetcherRegistry::new()
        .with(Arc::new(
            OpenWeatherFetcher::http(client.clone()).with_units(&fetch.units),
        ))
        .with(Arc::new(
            UsgsQuakeFetcher::http(client)
                .with_lookback_days(fetch.quake_lookback_days)
                .with_min_magnitude(fetch.quake_min_magnitude),
        ))
}

fn build_mux(cfg: &AppConfig, bus: BusChannel) -> ChannelMux {
    let mut mux = ChannelMux::new(Duration::from_secs(cfg.status.publish_timeout_secs))
        .with(Arc::new(LogChannel))
        .with(Arc::new(bus));

    let webhook = cfg
        .status
        .webhook_url
        .clone()
        .filter(|u| !u.trim().is_empty())
        .map(WebhookChannel::new)
        .or_else(WebhookChannel::from_env);
    if let Some(hook) = webhook {
        info!(url = hook.url(), "webhook status channel enabled");
        let hook = hook
            .with_timeout(cfg.status.publish_timeout_secs)
            .with_attempts(cfg.status.webhook_attempts);
        mux = mux.with(Arc::new(hook));
    }
    mux
}

/// Register configured sources and locations. Sources already present are
/// kept as they are.
pub async fn seed_store(store: &dyn DataStore, cfg: &AppConfig) -> Result<()> {
    for s in &cfg.sources {
        match store
            .add_source(&s.name, s.category, &s.base_url, s.api_key.clone())
            .await
        {
            Ok(id) => info!(source = %s.name, id = %id, "registered data source"),
            Err(StoreError::Duplicate { .. }) => {
                warn!(source = %s.name, "data source already registered")
            }
            Err(e) => return Err(e).with_context(|| format!("registering source {}", s.name)),
        }
    }
    for l in &cfg.locations {
        store
            .add_location(&l.city, &l.country, l.lat, l.lon, l.postal_code.clone())
            .await
            .with_context(|| format!("registering location {}, {}", l.city, l.country))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeding_is_tolerant_of_existing_sources() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [sync]
            actor_id = 1

            [[sources]]
            name = "USGSEarthquake"
            category = "earthquake"
            base_url = "https://earthquake.usgs.gov/fdsnws/event/1/query"

            [[locations]]
            city = "Seattle"
            country = "US"
            lat = 47.6062
            lon = -122.3321
            postal_code = "98101"
            "#,
        )
        .unwrap();
        let store = MemoryStore::new();
        seed_store(&store, &cfg).await.unwrap();
        seed_store(&store, &cfg).await.unwrap();
        assert!(store.get_source("USGSEarthquake").await.unwrap().is_some());
        // locations have no natural key and are registered on every seed
        assert_eq!(store.list_locations().await.unwrap().len(), 2);
    }
}
