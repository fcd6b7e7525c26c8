//! Periodic upkeep running alongside discovery scans.
//!
//! Two loops share one cancellation token: an activity refresh over every
//! known application, and a daily retention cleanup of old snapshots.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::DiscoveryResult;
use crate::etl::extractor::BlockRange;
use crate::etl::orchestrator::DiscoveryOrchestrator;

#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    pub refresh_interval: Duration,
    pub cleanup_interval: Duration,
    /// Snapshots older than this many days are deleted.
    pub retention_days: u32,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(10 * 60),
            cleanup_interval: Duration::from_secs(24 * 60 * 60),
            retention_days: 90,
        }
    }
}

pub struct Maintenance {
    orchestrator: Arc<DiscoveryOrchestrator>,
    config: MaintenanceConfig,
}

impl Maintenance {
    pub fn new(orchestrator: Arc<DiscoveryOrchestrator>, config: MaintenanceConfig) -> Self {
        Self {
            orchestrator,
            config,
        }
    }

    /// Refreshes activity, status and score of every application.
    ///
    /// Returns `None` without touching anything while a scan is running.
    /// An application that fails to refresh is logged and skipped.
    pub async fn refresh_all(&self) -> DiscoveryResult<Option<usize>> {
        if self.orchestrator.is_running() {
            tracing::debug!(
                target: "scout::etl::maintenance",
                "Scan in progress, skipping activity refresh"
            );
            return Ok(None);
        }

        let height = self.orchestrator.chain().get_height().await?;
        let window = BlockRange::trailing(
            height,
            self.orchestrator.config().activity_window_blocks,
        );
        let ids = self.orchestrator.db().list_application_ids().await?;

        let mut refreshed = 0;
        for id in &ids {
            let result = async {
                self.orchestrator.activity().refresh(id, window).await?;
                self.orchestrator.scorer().score_and_store(id).await
            }
            .await;

            match result {
                Ok(_) => refreshed += 1,
                Err(e) => tracing::warn!(
                    target: "scout::etl::maintenance",
                    application_id = %id,
                    error = %e,
                    "Activity refresh failed"
                ),
            }
        }

        tracing::info!(
            target: "scout::etl::maintenance",
            refreshed,
            total = ids.len(),
            %window,
            "Activity refresh complete"
        );
        Ok(Some(refreshed))
    }

    /// Deletes expired snapshots and logs global stats.
    pub async fn cleanup(&self) -> DiscoveryResult<u64> {
        let removed = self
            .orchestrator
            .activity()
            .cleanup_old_activity(self.config.retention_days)
            .await?;

        let stats = self.orchestrator.db().get_stats().await?;
        tracing::info!(
            target: "scout::etl::maintenance",
            applications = stats.total_applications,
            contracts = stats.total_contracts,
            active = stats.active_applications,
            today_tx_count = stats.today_tx_count,
            last_scanned_block = ?stats.last_scanned_block,
            "Engine stats"
        );
        Ok(removed)
    }
}

/// Runs both maintenance loops until `shutdown` is cancelled.
///
/// The first refresh happens one interval after start.
pub fn spawn_maintenance(
    maintenance: Arc<Maintenance>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut refresh = tokio::time::interval(maintenance.config.refresh_interval);
        let mut cleanup = tokio::time::interval(maintenance.config.cleanup_interval);
        refresh.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        cleanup.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // Both intervals fire immediately on the first tick.
        refresh.tick().await;
        cleanup.tick().await;

        tracing::info!(target: "scout::etl::maintenance", "Maintenance tasks started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = refresh.tick() => {
                    if let Err(e) = maintenance.refresh_all().await {
                        tracing::warn!(target: "scout::etl::maintenance", error = %e, "Activity refresh failed");
                    }
                }
                _ = cleanup.tick() => {
                    if let Err(e) = maintenance.cleanup().await {
                        tracing::warn!(target: "scout::etl::maintenance", error = %e, "Activity cleanup failed");
                    }
                }
            }
        }

        tracing::info!(target: "scout::etl::maintenance", "Maintenance tasks stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::etl::engine_db::{EngineDb, EngineDbConfig};
    use crate::etl::extractor::SampleChain;
    use crate::etl::model::{ActivitySnapshot, ApplicationStatus};
    use crate::etl::orchestrator::OrchestratorConfig;
    use crate::etl::publisher::ProgressPublisher;
    use scout_common::DAY_SECS;

    const DEPLOYER: &str = "0x1111111111111111111111111111111111111111";
    const TOKEN: &str = "0x2222222222222222222222222222222222222222";
    const ALICE: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

    async fn setup(chain: Arc<SampleChain>) -> (Arc<DiscoveryOrchestrator>, Arc<EngineDb>) {
        let db = Arc::new(EngineDb::new(EngineDbConfig::in_memory()).await.unwrap());
        let config = OrchestratorConfig {
            scan_depth: 100,
            unit_size: 50,
            activity_window_blocks: 100,
            discover_active_contracts: false,
            ..OrchestratorConfig::default()
        };
        let orchestrator = Arc::new(DiscoveryOrchestrator::new(
            chain,
            db.clone(),
            Arc::new(ProgressPublisher::default()),
            config,
        ));
        (orchestrator, db)
    }

    #[tokio::test]
    async fn test_refresh_all_updates_status() {
        let chain = Arc::new(SampleChain::new(99));
        chain.deploy(DEPLOYER, TOKEN, 5, "0x6080");
        let (orchestrator, db) = setup(chain.clone()).await;
        orchestrator.start().unwrap().wait().await.unwrap();

        let app_id = db
            .get_contract(TOKEN)
            .await
            .unwrap()
            .unwrap()
            .application_id
            .unwrap();

        for block in 60..75 {
            chain.call(ALICE, TOKEN, block, 21_000);
        }

        let maintenance = Maintenance::new(orchestrator, MaintenanceConfig::default());
        assert_eq!(maintenance.refresh_all().await.unwrap(), Some(1));

        let app = db.get_application(&app_id).await.unwrap().unwrap();
        assert_eq!(app.status, ApplicationStatus::Active);
        assert!(app.activity_score > 0.0);
    }

    #[tokio::test]
    async fn test_refresh_skipped_while_scanning() {
        let chain = Arc::new(SampleChain::new(99));
        chain.set_latency(Duration::from_millis(20));
        let (orchestrator, _db) = setup(chain).await;

        let handle = orchestrator.start().unwrap();
        let maintenance = Maintenance::new(orchestrator.clone(), MaintenanceConfig::default());
        assert_eq!(maintenance.refresh_all().await.unwrap(), None);

        orchestrator.stop();
        handle.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_cleanup_removes_expired_snapshots() {
        let chain = Arc::new(SampleChain::new(99));
        let (orchestrator, db) = setup(chain).await;
        let today = scout_common::today_start();

        for day in [today - 120 * DAY_SECS, today - 2 * DAY_SECS] {
            db.upsert_snapshot(&ActivitySnapshot {
                application_id: "app_0000000000000000".to_string(),
                day,
                tx_count: 1,
                user_count: 1,
                event_count: 0,
                gas_used: 0,
            })
            .await
            .unwrap();
        }

        let maintenance = Maintenance::new(orchestrator, MaintenanceConfig::default());
        assert_eq!(maintenance.cleanup().await.unwrap(), 1);
        assert_eq!(
            db.snapshots_since("app_0000000000000000", 0).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_spawned_loops_stop_on_cancel() {
        let chain = Arc::new(SampleChain::new(99));
        let (orchestrator, _db) = setup(chain).await;
        let maintenance = Arc::new(Maintenance::new(
            orchestrator,
            MaintenanceConfig {
                refresh_interval: Duration::from_millis(10),
                cleanup_interval: Duration::from_millis(15),
                retention_days: 90,
            },
        ));

        let shutdown = CancellationToken::new();
        let handle = spawn_maintenance(maintenance, shutdown.clone());
        tokio::time::sleep(Duration::from_millis(40)).await;
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("maintenance loop did not stop")
            .unwrap();
    }
}
