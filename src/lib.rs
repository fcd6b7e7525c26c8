//! Scout - chain discovery and classification engine.
//!
//! Scans recent blocks of an EVM chain for contract deployments, classifies
//! each contract by standard and business domain, groups contracts into
//! applications by deployer, and keeps activity, status and quality scores
//! up to date. Progress is published to subscribers and exposed over HTTP.

pub mod error;
pub mod etl;
pub mod http;

pub use async_trait::async_trait;
pub use axum;
pub use tokio;

pub use error::{ChainError, DiscoveryError, DiscoveryResult};

use anyhow::Context;
use axum::Router as AxumRouter;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any as CorsAny, CorsLayer};

use etl::engine_db::EngineDbConfig;
use etl::extractor::{ChainDataClient, SampleChain};
use etl::maintenance::{spawn_maintenance, Maintenance, MaintenanceConfig};
use etl::{DiscoveryOrchestrator, EngineDb, OrchestratorConfig, ProgressPublisher};
use http::{create_http_router, HttpState};

/// Configuration for the Scout server.
pub struct ScoutConfig {
    /// Port to listen on.
    pub port: u16,

    /// Host to bind to.
    pub host: String,

    /// Engine database: file path, `:memory:`, `sqlite:` or `postgres://` URL.
    pub database_url: String,

    /// Chain data source.
    ///
    /// If None, an empty [`SampleChain`] is used and scans find nothing.
    pub chain: Option<Arc<dyn ChainDataClient>>,

    pub orchestrator: OrchestratorConfig,

    pub maintenance: MaintenanceConfig,

    /// Interval between SSE heartbeat events.
    pub heartbeat_interval: Duration,

    /// Per-subscriber event buffer.
    pub subscriber_capacity: usize,

    /// Start a discovery scan as soon as the server is up.
    pub scan_on_start: bool,

    /// Extra routes merged into the HTTP router (e.g. `/metrics`).
    pub extra_routes: Option<AxumRouter>,

    /// Graceful shutdown timeout in seconds (default: 30).
    ///
    /// On shutdown the running scan is asked to stop after its current unit;
    /// this bounds how long the server waits for it.
    pub shutdown_timeout: u64,
}

impl ScoutConfig {
    pub fn builder() -> ScoutConfigBuilder {
        ScoutConfigBuilder::default()
    }
}

/// Builder for ScoutConfig.
#[derive(Default)]
pub struct ScoutConfigBuilder {
    port: Option<u16>,
    host: Option<String>,
    database_url: Option<String>,
    chain: Option<Arc<dyn ChainDataClient>>,
    orchestrator: Option<OrchestratorConfig>,
    maintenance: Option<MaintenanceConfig>,
    heartbeat_interval: Option<Duration>,
    subscriber_capacity: Option<usize>,
    scan_on_start: bool,
    extra_routes: Option<AxumRouter>,
    shutdown_timeout: Option<u64>,
}

impl ScoutConfigBuilder {
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn host(mut self, host: String) -> Self {
        self.host = Some(host);
        self
    }

    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    /// Sets the chain data source.
    pub fn with_chain(mut self, chain: Arc<dyn ChainDataClient>) -> Self {
        self.chain = Some(chain);
        self
    }

    pub fn orchestrator(mut self, config: OrchestratorConfig) -> Self {
        self.orchestrator = Some(config);
        self
    }

    pub fn maintenance(mut self, config: MaintenanceConfig) -> Self {
        self.maintenance = Some(config);
        self
    }

    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    pub fn subscriber_capacity(mut self, capacity: usize) -> Self {
        self.subscriber_capacity = Some(capacity);
        self
    }

    pub fn scan_on_start(mut self, enabled: bool) -> Self {
        self.scan_on_start = enabled;
        self
    }

    /// Merges additional routes into the HTTP server.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let metrics = axum::Router::new().route("/metrics", get(move || async move { handle.render() }));
    /// let config = ScoutConfig::builder().with_routes(metrics).build();
    /// ```
    pub fn with_routes(mut self, routes: AxumRouter) -> Self {
        self.extra_routes = Some(match self.extra_routes.take() {
            Some(existing) => existing.merge(routes),
            None => routes,
        });
        self
    }

    /// Sets the graceful shutdown timeout in seconds.
    pub fn shutdown_timeout(mut self, seconds: u64) -> Self {
        self.shutdown_timeout = Some(seconds);
        self
    }

    pub fn build(self) -> ScoutConfig {
        ScoutConfig {
            port: self.port.unwrap_or(8080),
            host: self.host.unwrap_or_else(|| "0.0.0.0".to_string()),
            database_url: self
                .database_url
                .unwrap_or_else(|| "./scout.db".to_string()),
            chain: self.chain,
            orchestrator: self.orchestrator.unwrap_or_default(),
            maintenance: self.maintenance.unwrap_or_default(),
            heartbeat_interval: self
                .heartbeat_interval
                .unwrap_or(Duration::from_secs(30))
                .max(http::MIN_HEARTBEAT),
            subscriber_capacity: self
                .subscriber_capacity
                .unwrap_or(etl::publisher::DEFAULT_SUBSCRIBER_CAPACITY),
            scan_on_start: self.scan_on_start,
            extra_routes: self.extra_routes,
            shutdown_timeout: self.shutdown_timeout.unwrap_or(30),
        }
    }
}

/// Engine components shared by the server, maintenance and embedders.
pub struct Scout {
    pub db: Arc<EngineDb>,
    pub publisher: Arc<ProgressPublisher>,
    pub orchestrator: Arc<DiscoveryOrchestrator>,
    pub maintenance: Arc<Maintenance>,
}

impl Scout {
    /// Opens the store and wires the engine together.
    pub async fn init(config: &ScoutConfig) -> anyhow::Result<Self> {
        let chain = match &config.chain {
            Some(chain) => chain.clone(),
            None => {
                tracing::warn!(
                    target: "scout::main",
                    "No chain client configured, using an empty SampleChain"
                );
                Arc::new(SampleChain::new(0)) as Arc<dyn ChainDataClient>
            }
        };

        let db = EngineDb::new(EngineDbConfig {
            path: config.database_url.clone(),
        })
        .await
        .with_context(|| format!("failed to open engine database '{}'", config.database_url))?;
        let db = Arc::new(db);

        let publisher = Arc::new(ProgressPublisher::new(config.subscriber_capacity));
        let orchestrator = Arc::new(DiscoveryOrchestrator::new(
            chain,
            db.clone(),
            publisher.clone(),
            config.orchestrator.clone(),
        ));
        let maintenance = Arc::new(Maintenance::new(
            orchestrator.clone(),
            config.maintenance.clone(),
        ));

        let stats = db.get_stats().await?;
        tracing::info!(
            target: "scout::main",
            applications = stats.total_applications,
            contracts = stats.total_contracts,
            last_scanned_block = ?stats.last_scanned_block,
            "Engine initialized"
        );

        Ok(Self {
            db,
            publisher,
            orchestrator,
            maintenance,
        })
    }

    pub fn http_state(&self, heartbeat: Duration) -> HttpState {
        HttpState::new(
            self.db.clone(),
            self.orchestrator.clone(),
            self.publisher.clone(),
        )
        .with_heartbeat(heartbeat)
    }

    /// Stops a running scan and waits up to `timeout` for it to wind down.
    ///
    /// Returns false if the scan was still running when the timeout expired.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        if !self.orchestrator.stop() {
            return true;
        }
        tracing::info!(target: "scout::main", "Waiting for the running scan to stop...");

        let orchestrator = self.orchestrator.clone();
        let stopped = tokio::time::timeout(timeout, async move {
            while orchestrator.is_running() {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await;
        stopped.is_ok()
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(target: "scout::main", error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(target: "scout::main", error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!(target: "scout::main", "Received SIGINT (Ctrl+C), initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!(target: "scout::main", "Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

/// Starts the Scout server and runs until SIGINT or SIGTERM.
///
/// NOTE: The caller is responsible for initializing the tracing subscriber before calling this function.
pub async fn run(config: ScoutConfig) -> anyhow::Result<()> {
    let shutdown_token = CancellationToken::new();

    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    run_until(config, shutdown_token).await
}

/// Starts the Scout server and runs until `shutdown_token` is cancelled.
pub async fn run_until(
    mut config: ScoutConfig,
    shutdown_token: CancellationToken,
) -> anyhow::Result<()> {
    let scout = Scout::init(&config).await?;

    let mut http_router = create_http_router(scout.http_state(config.heartbeat_interval));
    if let Some(extra) = config.extra_routes.take() {
        http_router = http_router.merge(extra);
    }

    let cors = CorsLayer::new()
        .allow_origin(CorsAny)
        .allow_methods(CorsAny)
        .allow_headers(CorsAny);
    let app = http_router.layer(cors);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(target: "scout::main", "Server listening on {}", listener.local_addr()?);

    let maintenance_handle = spawn_maintenance(scout.maintenance.clone(), shutdown_token.clone());

    if config.scan_on_start {
        if let Err(e) = scout.orchestrator.start() {
            tracing::warn!(target: "scout::main", error = %e, "Initial scan not started");
        }
    }

    let server_token = shutdown_token.clone();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_token.cancelled().await });

    // Event streams stay open until the client leaves; force-close them after this.
    const SERVER_SHUTDOWN_TIMEOUT_SECS: u64 = 15;
    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!(target: "scout::main", "Server error: {}", e);
            }
        }
        _ = async {
            shutdown_token.cancelled().await;
            tokio::time::sleep(Duration::from_secs(SERVER_SHUTDOWN_TIMEOUT_SECS)).await;
        } => {
            tracing::warn!(
                target: "scout::main",
                "Server connections did not close within {}s, forcing shutdown",
                SERVER_SHUTDOWN_TIMEOUT_SECS
            );
        }
    }

    // The server may also stop on its own error.
    shutdown_token.cancel();
    tracing::info!(target: "scout::main", "HTTP server stopped, stopping discovery...");

    let shutdown_timeout = Duration::from_secs(config.shutdown_timeout);
    if !scout.shutdown(shutdown_timeout).await {
        tracing::warn!(
            target: "scout::main",
            "Scan did not stop within {}s timeout, forcing shutdown",
            config.shutdown_timeout
        );
    }

    match tokio::time::timeout(shutdown_timeout, maintenance_handle).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::error!(target: "scout::main", "Maintenance task panicked: {}", e);
        }
        Err(_) => {
            tracing::warn!(
                target: "scout::main",
                "Maintenance did not complete within {}s timeout",
                config.shutdown_timeout
            );
        }
    }

    tracing::info!(target: "scout::main", "Scout shutdown complete");

    Ok(())
}
