//! Activity aggregation.
//!
//! Pulls the transactions and events of an application's contracts over a
//! block window and folds them into one snapshot per UTC day.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use crate::error::{DiscoveryError, DiscoveryResult};
use crate::etl::engine_db::EngineDb;
use crate::etl::extractor::{BlockRange, ChainDataClient, LogFilter, TxFilter};
use crate::etl::model::{ActivitySnapshot, Application, ApplicationStatus};
use scout_common::DAY_SECS;

/// Days of snapshots considered when deriving status.
pub const STATUS_WINDOW_DAYS: u32 = 7;

/// First day of the trailing status window, today included.
pub fn status_window_start() -> i64 {
    scout_common::today_start() - (i64::from(STATUS_WINDOW_DAYS) - 1) * DAY_SECS
}

/// Average daily transactions above which an application is active.
const ACTIVE_TX_PER_DAY: f64 = 10.0;
/// Average daily transactions above which an application is dormant rather than inactive.
const DORMANT_TX_PER_DAY: f64 = 1.0;

/// Status from the trailing daily snapshots, in any order.
pub fn status_from_snapshots(snapshots: &[ActivitySnapshot]) -> ApplicationStatus {
    if snapshots.is_empty() {
        return ApplicationStatus::Inactive;
    }

    let total: u64 = snapshots.iter().map(|s| s.tx_count).sum();
    let avg = total as f64 / snapshots.len() as f64;

    if avg > ACTIVE_TX_PER_DAY {
        ApplicationStatus::Active
    } else if avg > DORMANT_TX_PER_DAY {
        ApplicationStatus::Dormant
    } else {
        ApplicationStatus::Inactive
    }
}

/// One day of an application's activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyActivity {
    /// `YYYY-MM-DD`
    pub date: String,
    pub day: i64,
    pub tx_count: u64,
    pub user_count: u64,
    pub event_count: u64,
    pub gas_used: u64,
}

impl From<&ActivitySnapshot> for DailyActivity {
    fn from(s: &ActivitySnapshot) -> Self {
        Self {
            date: scout_common::format_day(s.day),
            day: s.day,
            tx_count: s.tx_count,
            user_count: s.user_count,
            event_count: s.event_count,
            gas_used: s.gas_used,
        }
    }
}

/// Activity totals of an application over recent days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationStats {
    pub application_id: String,
    pub days: u32,
    pub total_transactions: u64,
    pub total_users: u64,
    pub total_events: u64,
    pub total_gas_used: u64,
    pub avg_daily_transactions: f64,
    pub avg_daily_users: f64,
    pub daily: Vec<DailyActivity>,
}

/// An application ranked by recent transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendingApplication {
    #[serde(flatten)]
    pub application: Application,
    pub recent_tx_count: u64,
    pub recent_user_count: u64,
}

pub struct ActivityAggregator {
    chain: Arc<dyn ChainDataClient>,
    db: Arc<EngineDb>,
    concurrency: usize,
}

#[derive(Default)]
struct ContractActivity {
    txs: u64,
    events: u64,
    gas: u64,
    senders: HashSet<String>,
}

impl ActivityAggregator {
    pub fn new(chain: Arc<dyn ChainDataClient>, db: Arc<EngineDb>, concurrency: usize) -> Self {
        Self {
            chain,
            db,
            concurrency: concurrency.max(1),
        }
    }

    /// Upserts today's snapshot from the application's usage in `window`.
    ///
    /// A contract whose data cannot be pulled is skipped.
    pub async fn update_activity(
        &self,
        application_id: &str,
        window: BlockRange,
    ) -> DiscoveryResult<ActivitySnapshot> {
        let contracts = self.db.contracts_for_application(application_id).await?;
        if contracts.is_empty() && self.db.get_application(application_id).await?.is_none() {
            return Err(DiscoveryError::LookupNotFound(format!(
                "application {application_id}"
            )));
        }

        let addresses: Vec<String> = contracts.into_iter().map(|c| c.address).collect();
        let pulled: Vec<Option<ContractActivity>> = stream::iter(addresses)
            .map(|address| async move { self.pull_contract(&address, window).await })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut senders = HashSet::new();
        let mut snapshot = ActivitySnapshot {
            application_id: application_id.to_string(),
            day: scout_common::today_start(),
            tx_count: 0,
            user_count: 0,
            event_count: 0,
            gas_used: 0,
        };
        for activity in pulled.into_iter().flatten() {
            snapshot.tx_count += activity.txs;
            snapshot.event_count += activity.events;
            snapshot.gas_used += activity.gas;
            senders.extend(activity.senders);
        }
        snapshot.user_count = senders.len() as u64;

        self.db.upsert_snapshot(&snapshot).await?;

        tracing::debug!(
            target: "scout::etl::activity",
            application_id,
            %window,
            tx_count = snapshot.tx_count,
            user_count = snapshot.user_count,
            event_count = snapshot.event_count,
            "Activity snapshot updated"
        );

        Ok(snapshot)
    }

    async fn pull_contract(&self, address: &str, window: BlockRange) -> Option<ContractActivity> {
        let tx_filter = TxFilter::sent_to([address.to_string()]);
        let log_filter = LogFilter::for_addresses([address.to_string()]);

        let (txs, logs) = tokio::join!(
            self.chain.query_transactions(window, Some(&tx_filter)),
            self.chain.query_logs(window, Some(&log_filter)),
        );

        let (txs, logs) = match (txs, logs) {
            (Ok(txs), Ok(logs)) => (txs, logs),
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(
                    target: "scout::etl::activity",
                    address,
                    error = %e,
                    "Skipping contract activity"
                );
                return None;
            }
        };

        if let Some(partial) = txs.partial.as_ref().or(logs.partial.as_ref()) {
            tracing::warn!(
                target: "scout::etl::activity",
                address,
                failed = %partial.failed,
                error = %partial.error,
                "Contract activity is incomplete"
            );
        }

        Some(ContractActivity {
            txs: txs.items.len() as u64,
            events: logs.items.len() as u64,
            gas: txs.items.iter().map(|t| t.gas_used).sum(),
            senders: txs
                .items
                .iter()
                .map(|t| t.from.to_ascii_lowercase())
                .collect(),
        })
    }

    /// Status from the snapshots of the last [`STATUS_WINDOW_DAYS`] days.
    pub async fn derive_status(&self, application_id: &str) -> DiscoveryResult<ApplicationStatus> {
        let recent = self
            .db
            .snapshots_since(application_id, status_window_start())
            .await?;
        Ok(status_from_snapshots(&recent))
    }

    /// Updates the snapshot, then derives and stores the status.
    pub async fn refresh(
        &self,
        application_id: &str,
        window: BlockRange,
    ) -> DiscoveryResult<ApplicationStatus> {
        self.update_activity(application_id, window).await?;
        let status = self.derive_status(application_id).await?;
        self.db
            .update_application_status(application_id, status)
            .await?;
        Ok(status)
    }

    /// Totals, daily averages and the daily series over the last `days` days.
    ///
    /// Averages are per recorded day.
    pub async fn application_stats(
        &self,
        application_id: &str,
        days: u32,
    ) -> DiscoveryResult<ApplicationStats> {
        let since = scout_common::today_start() - i64::from(days) * DAY_SECS;
        let snapshots = self.db.snapshots_since(application_id, since).await?;

        let total_transactions = snapshots.iter().map(|s| s.tx_count).sum();
        let total_users = snapshots.iter().map(|s| s.user_count).sum();
        let recorded = snapshots.len().max(1) as f64;

        Ok(ApplicationStats {
            application_id: application_id.to_string(),
            days,
            total_transactions,
            total_users,
            total_events: snapshots.iter().map(|s| s.event_count).sum(),
            total_gas_used: snapshots.iter().map(|s| s.gas_used).sum(),
            avg_daily_transactions: total_transactions as f64 / recorded,
            avg_daily_users: total_users as f64 / recorded,
            daily: snapshots.iter().map(DailyActivity::from).collect(),
        })
    }

    /// Applications with the most transactions since yesterday.
    pub async fn trending(&self, limit: u32) -> DiscoveryResult<Vec<TrendingApplication>> {
        let since = scout_common::today_start() - DAY_SECS;
        let ranked = self.db.top_by_transactions(since, limit).await?;

        let mut trending = Vec::with_capacity(ranked.len());
        for entry in ranked {
            if let Some(application) = self.db.get_application(&entry.application_id).await? {
                trending.push(TrendingApplication {
                    application,
                    recent_tx_count: entry.tx_count,
                    recent_user_count: entry.user_count,
                });
            }
        }
        Ok(trending)
    }

    /// Deletes snapshots older than `days_to_keep` days.
    pub async fn cleanup_old_activity(&self, days_to_keep: u32) -> DiscoveryResult<u64> {
        let cutoff = scout_common::today_start() - i64::from(days_to_keep) * DAY_SECS;
        let removed = self.db.delete_snapshots_before(cutoff).await?;
        tracing::info!(
            target: "scout::etl::activity",
            removed,
            days_to_keep,
            "Old activity snapshots removed"
        );
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::etl::engine_db::{EngineDbConfig, NewContract};
    use crate::etl::extractor::SampleChain;
    use crate::etl::grouping::ApplicationGrouper;
    use crate::etl::model::{Category, Confidence};
    use crate::etl::scoring::QualityScorer;

    const DEPLOYER: &str = "0x1111111111111111111111111111111111111111";
    const TOKEN: &str = "0x2222222222222222222222222222222222222222";
    const POOL: &str = "0x3333333333333333333333333333333333333333";
    const ALICE: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const BOB: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    fn snapshot(day: i64, tx_count: u64) -> ActivitySnapshot {
        ActivitySnapshot {
            application_id: "app".to_string(),
            day,
            tx_count,
            user_count: 0,
            event_count: 0,
            gas_used: 0,
        }
    }

    #[test]
    fn test_status_thresholds() {
        assert_eq!(status_from_snapshots(&[]), ApplicationStatus::Inactive);

        let week = |tx: u64| -> Vec<ActivitySnapshot> {
            (0..7).map(|d| snapshot(d * DAY_SECS, tx)).collect()
        };
        assert_eq!(status_from_snapshots(&week(15)), ApplicationStatus::Active);
        assert_eq!(status_from_snapshots(&week(5)), ApplicationStatus::Dormant);
        assert_eq!(status_from_snapshots(&week(0)), ApplicationStatus::Inactive);

        // Thresholds are strict
        assert_eq!(status_from_snapshots(&week(10)), ApplicationStatus::Dormant);
        assert_eq!(status_from_snapshots(&week(1)), ApplicationStatus::Inactive);

        // 3 transactions over a full week
        let mut quiet = week(0);
        quiet[2].tx_count = 3;
        assert_eq!(status_from_snapshots(&quiet), ApplicationStatus::Inactive);

        // Averages over the days recorded, not the window length
        let partial = [snapshot(0, 30), snapshot(DAY_SECS, 0)];
        assert_eq!(status_from_snapshots(&partial), ApplicationStatus::Active);
    }

    async fn setup() -> (Arc<SampleChain>, Arc<EngineDb>, ActivityAggregator, String) {
        let chain = Arc::new(SampleChain::new(1_000));
        let db = Arc::new(EngineDb::new(EngineDbConfig::in_memory()).await.unwrap());
        let grouper = ApplicationGrouper::new(db.clone(), 3);

        let mut app_id = String::new();
        for address in [TOKEN, POOL] {
            db.insert_contract_if_absent(&NewContract {
                address: address.to_string(),
                creator_address: Some(DEPLOYER.to_string()),
                creator_confidence: Confidence::Exact,
                deployment_block: 1,
                deployment_time: None,
            })
            .await
            .unwrap();
            let contract = db.get_contract(address).await.unwrap().unwrap();
            app_id = grouper
                .group_contract(&contract, Category::Dex, 1.0)
                .await
                .unwrap()
                .application
                .id;
        }

        let aggregator = ActivityAggregator::new(chain.clone(), db.clone(), 4);
        (chain, db, aggregator, app_id)
    }

    #[tokio::test]
    async fn test_update_activity_sums_contracts() {
        let (chain, db, aggregator, app_id) = setup().await;
        chain.call(ALICE, TOKEN, 10, 21_000);
        chain.call(BOB, TOKEN, 11, 21_000);
        chain.call(ALICE, POOL, 12, 50_000);
        chain.emit(POOL, &["0xaa"], 12);
        // Outside the window
        chain.call(BOB, POOL, 500, 50_000);

        let window = BlockRange::new(0, 100).unwrap();
        let snapshot = aggregator.update_activity(&app_id, window).await.unwrap();
        assert_eq!(snapshot.tx_count, 3);
        assert_eq!(snapshot.user_count, 2);
        assert_eq!(snapshot.event_count, 1);
        assert_eq!(snapshot.gas_used, 92_000);

        // Second write for the same day replaces the first
        chain.call(BOB, POOL, 13, 1);
        let snapshot = aggregator.update_activity(&app_id, window).await.unwrap();
        assert_eq!(snapshot.tx_count, 4);
        let stored = db.snapshots_since(&app_id, 0).await.unwrap();
        assert_eq!(stored, vec![snapshot]);
    }

    #[tokio::test]
    async fn test_refresh_persists_status() {
        let (chain, db, aggregator, app_id) = setup().await;
        for block in 0..15 {
            chain.call(ALICE, TOKEN, block, 1);
        }

        let status = aggregator
            .refresh(&app_id, BlockRange::new(0, 100).unwrap())
            .await
            .unwrap();
        assert_eq!(status, ApplicationStatus::Active);
        let stored = db.get_application(&app_id).await.unwrap().unwrap();
        assert_eq!(stored.status, ApplicationStatus::Active);
    }

    #[tokio::test]
    async fn test_stale_history_outside_window() {
        let (_chain, db, aggregator, app_id) = setup().await;
        let scorer = QualityScorer::new(db.clone());
        let today = scout_common::today_start();

        let mut stale: Vec<ActivitySnapshot> =
            (30..37).map(|d| snapshot(today - d * DAY_SECS, 15)).collect();
        // The day before the window opens
        stale.push(snapshot(status_window_start() - DAY_SECS, 1_000));
        for s in &mut stale {
            s.application_id = app_id.clone();
            db.upsert_snapshot(s).await.unwrap();
        }

        assert_eq!(
            aggregator.derive_status(&app_id).await.unwrap(),
            ApplicationStatus::Inactive
        );
        let inputs = scorer.inputs(&app_id).await.unwrap();
        assert_eq!(inputs.recent_transactions, 0);
        assert_eq!(scorer.score(&app_id).await.unwrap().activity, 0.0);

        let mut edge = snapshot(status_window_start(), 22);
        edge.application_id = app_id.clone();
        db.upsert_snapshot(&edge).await.unwrap();

        assert_eq!(
            aggregator.derive_status(&app_id).await.unwrap(),
            ApplicationStatus::Active
        );
        let inputs = scorer.inputs(&app_id).await.unwrap();
        assert_eq!(inputs.recent_transactions, 22);
        // Age still counts from the oldest snapshot
        assert!(inputs.age_days >= 36.0);
    }

    #[tokio::test]
    async fn test_unknown_application() {
        let (_chain, _db, aggregator, _app_id) = setup().await;
        let err = aggregator
            .update_activity("app_missing", BlockRange::new(0, 1).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::LookupNotFound(_)));
    }

    #[tokio::test]
    async fn test_stats_trending_and_cleanup() {
        let (_chain, db, aggregator, app_id) = setup().await;
        let today = scout_common::today_start();

        let mut recent = snapshot(today, 20);
        recent.application_id = app_id.clone();
        recent.user_count = 4;
        let mut older = snapshot(today - 3 * DAY_SECS, 10);
        older.application_id = app_id.clone();
        let mut ancient = snapshot(today - 200 * DAY_SECS, 99);
        ancient.application_id = app_id.clone();
        for s in [&recent, &older, &ancient] {
            db.upsert_snapshot(s).await.unwrap();
        }

        let stats = aggregator.application_stats(&app_id, 30).await.unwrap();
        assert_eq!(stats.total_transactions, 30);
        assert_eq!(stats.daily.len(), 2);
        assert!((stats.avg_daily_transactions - 15.0).abs() < 1e-9);
        assert!((stats.avg_daily_users - 2.0).abs() < 1e-9);

        let trending = aggregator.trending(10).await.unwrap();
        assert_eq!(trending.len(), 1);
        assert_eq!(trending[0].recent_tx_count, 20);
        assert_eq!(trending[0].application.id, app_id);

        assert_eq!(aggregator.cleanup_old_activity(90).await.unwrap(), 1);
        assert_eq!(db.snapshots_since(&app_id, 0).await.unwrap().len(), 2);
    }
}
