//! datawatch service entrypoint.
//! Loads config, seeds the in-memory store, starts the sync and validation
//! schedulers and serves `/health` + `/metrics`.

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use datawatch::metrics::Metrics;
use datawatch::{AppConfig, Runtime};

/// Compact logs by default; JSON lines when DATAWATCH_LOG_JSON=1.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("datawatch=info,warn"));
    let json = std::env::var("DATAWATCH_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; OPENWEATHER_API_KEY etc. may come from there.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::load_default()?;
    let bind = cfg.server.bind.clone();

    let metrics = Metrics::init()?;
    let runtime = Runtime::from_config(cfg).await?;
    let handles = runtime.spawn_schedulers();
    tracing::info!(tasks = handles.len(), "schedulers started");

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    tracing::info!(%bind, "ops server listening");

    axum::serve(listener, metrics.router())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await
        .context("ops server")?;

    for h in handles {
        h.abort();
    }
    Ok(())
}
