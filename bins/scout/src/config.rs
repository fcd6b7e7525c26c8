//! Command line configuration for the discovery server

use std::time::Duration;

use clap::Parser;
use scout::etl::extractor::{HyperSyncConfig, RetryPolicy};
use scout::etl::{MaintenanceConfig, OrchestratorConfig};

/// Chain discovery & classification server
///
/// Scans recent blocks for contract deployments, groups them into
/// applications and serves the results over HTTP.
#[derive(Parser, Debug)]
#[command(name = "scout")]
#[command(about = "Discover and classify applications deployed on an EVM chain", long_about = None)]
pub struct Config {
    /// HyperSync-compatible indexing backend URL
    #[arg(long, env = "HYPERSYNC_URL", default_value = "https://eth.hypersync.xyz")]
    pub hypersync_url: String,

    /// JSON-RPC endpoint used for height fallback and bytecode reads
    #[arg(long, env = "CHAIN_RPC_URL")]
    pub rpc_url: Option<String>,

    /// Bearer token for the indexing backend
    #[arg(long, env = "HYPERSYNC_API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,

    /// Engine database (file path, sqlite: or postgres:// URL)
    #[arg(long, env = "DATABASE_URL", default_value = "./scout.db")]
    pub database_url: String,

    /// Host for the HTTP API
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Port for the HTTP API
    #[arg(long, default_value = "8080")]
    pub port: u16,

    /// Blocks behind the chain head a scan may reach
    #[arg(long, default_value = "40000")]
    pub scan_depth: u64,

    /// Blocks per unit of work
    #[arg(long, default_value = "1000")]
    pub unit_size: u64,

    /// Trailing blocks used for activity measurement
    #[arg(long, default_value = "10000")]
    pub activity_window: u64,

    /// Parallel remote calls
    #[arg(long, default_value = "8")]
    pub concurrency: usize,

    /// Largest block window per backend query
    #[arg(long, default_value = "5000")]
    pub max_blocks_per_query: u64,

    /// Only record contracts whose deployment is seen in range
    #[arg(long)]
    pub no_active_contracts: bool,

    /// Start a scan as soon as the server is up
    #[arg(long)]
    pub scan_on_start: bool,

    /// Run a single scan, print a summary and exit (no HTTP server)
    #[arg(long)]
    pub scan_once: bool,

    /// Minutes between activity refreshes
    #[arg(long, default_value = "10")]
    pub refresh_interval_mins: u64,

    /// Days of activity snapshots to keep
    #[arg(long, default_value = "90")]
    pub retention_days: u32,

    /// Graceful shutdown timeout in seconds
    #[arg(long, default_value = "30")]
    pub shutdown_timeout: u64,
}

impl Config {
    pub fn hypersync(&self) -> HyperSyncConfig {
        HyperSyncConfig {
            url: self.hypersync_url.clone(),
            rpc_url: self.rpc_url.clone(),
            api_token: self.api_token.clone(),
            max_blocks_per_query: self.max_blocks_per_query,
            retry_policy: RetryPolicy::default(),
            ..HyperSyncConfig::default()
        }
    }

    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            scan_depth: self.scan_depth,
            unit_size: self.unit_size,
            activity_window_blocks: self.activity_window,
            concurrency: self.concurrency,
            discover_active_contracts: !self.no_active_contracts,
            ..OrchestratorConfig::default()
        }
    }

    pub fn maintenance(&self) -> MaintenanceConfig {
        MaintenanceConfig {
            refresh_interval: Duration::from_secs(self.refresh_interval_mins.max(1) * 60),
            retention_days: self.retention_days,
            ..MaintenanceConfig::default()
        }
    }
}
