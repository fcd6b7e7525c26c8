//! Scout - chain discovery & classification server
//!
//! # Usage
//!
//! ```bash
//! # Serve the API and scan the last 40k blocks right away
//! scout --hypersync-url https://eth.hypersync.xyz --scan-on-start
//!
//! # One-off scan into a Postgres store
//! DATABASE_URL=postgres://localhost/scout scout --scan-once
//! ```

mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::get;
use clap::Parser;
use config::Config;
use metrics_exporter_prometheus::PrometheusBuilder;
use scout::etl::extractor::HyperSyncClient;
use scout::{Scout, ScoutConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("scout=info")),
        )
        .with_target(true)
        .init();

    tracing::info!("Starting Scout");
    tracing::info!("Indexing backend: {}", config.hypersync_url);
    if let Some(rpc_url) = &config.rpc_url {
        tracing::info!("RPC fallback: {}", rpc_url);
    }
    tracing::info!("Database: {}", config.database_url);
    tracing::info!(
        "Scan depth: {} blocks in units of {}",
        config.scan_depth,
        config.unit_size
    );

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")?;

    let chain = Arc::new(HyperSyncClient::new(config.hypersync())?);

    let scout_config = ScoutConfig::builder()
        .host(config.host.clone())
        .port(config.port)
        .database_url(config.database_url.clone())
        .with_chain(chain)
        .orchestrator(config.orchestrator())
        .maintenance(config.maintenance())
        .scan_on_start(config.scan_on_start)
        .shutdown_timeout(config.shutdown_timeout)
        .with_routes(axum::Router::new().route(
            "/metrics",
            get(move || {
                let prometheus = prometheus.clone();
                async move { prometheus.render() }
            }),
        ))
        .build();

    if config.scan_once {
        return scan_once(&scout_config).await;
    }

    tracing::info!("HTTP API available at {}:{}", config.host, config.port);
    tracing::info!("  - GET  /applications, /applications/trending, /stats");
    tracing::info!("  - POST /discovery/start, /discovery/stop");
    tracing::info!("  - GET  /discovery/events (Server-Sent Events)");

    // Run Scout (blocks until shutdown)
    scout::run(scout_config).await
}

async fn scan_once(config: &ScoutConfig) -> Result<()> {
    let scout = Scout::init(config).await?;
    let progress = scout.orchestrator.start()?.wait().await?;

    tracing::info!("Scan finished: {:?}", progress.status);
    if let Some(error) = &progress.error {
        tracing::warn!("Scan error: {}", error);
    }
    tracing::info!("  Units: {}/{}", progress.current_unit, progress.total_units);
    tracing::info!("  Contracts found: {}", progress.contracts_found);
    tracing::info!("  Applications discovered: {}", progress.discovered_count);

    let stats = scout.db.get_stats().await?;
    tracing::info!("  Total applications: {}", stats.total_applications);
    tracing::info!("  Active applications: {}", stats.active_applications);
    if let Some(block) = stats.last_scanned_block {
        tracing::info!("  Last scanned block: {}", block);
    }

    Ok(())
}
