//! Discovery orchestration.
//!
//! A scan walks the block range between the stored cursor and the chain head
//! in fixed-size units. Each unit is detected, classified, grouped and scored
//! before the cursor moves past it. Only one scan runs per orchestrator.
//!
//! ```text
//! Idle ──start()──> Scanning ──> Completed | Stopped | Error ──> Idle
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use futures::stream::{self, StreamExt};
use itertools::Itertools;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{DiscoveryError, DiscoveryResult};
use crate::etl::activity::ActivityAggregator;
use crate::etl::detector::{ContractDetector, Deployment};
use crate::etl::engine_db::EngineDb;
use crate::etl::extractor::{BlockRange, ChainDataClient, Log, PartialFailure};
use crate::etl::grouping::ApplicationGrouper;
use crate::etl::identification::{CategoryClassifier, TypeClassifier};
use crate::etl::model::{ScanProgress, ScanStatus};
use crate::etl::publisher::{DiscoveredApplication, ProgressPublisher, ScanEvent};
use crate::etl::scoring::QualityScorer;

/// Scan tuning.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// How many blocks behind the head a scan may reach.
    pub scan_depth: u64,
    /// Blocks per unit of work.
    pub unit_size: u64,
    /// Trailing blocks used when refreshing an application's activity.
    pub activity_window_blocks: u64,
    /// Parallel remote calls for bytecode, creator and activity lookups.
    pub concurrency: usize,
    pub max_consecutive_failures: u32,
    /// Also record busy log emitters whose deployment was not seen.
    pub discover_active_contracts: bool,
    pub max_active_contracts_per_unit: usize,
    pub max_conflict_retries: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            scan_depth: 40_000,
            unit_size: 1_000,
            activity_window_blocks: 10_000,
            concurrency: 8,
            max_consecutive_failures: 3,
            discover_active_contracts: true,
            max_active_contracts_per_unit: 50,
            max_conflict_retries: 3,
        }
    }
}

#[derive(Default)]
struct RunState {
    running: bool,
    progress: ScanProgress,
    cancel: Option<CancellationToken>,
}

enum Outcome {
    Completed,
    Stopped,
}

#[derive(Default)]
struct UnitReport {
    contracts_created: u64,
    partial: Option<PartialFailure>,
}

/// Handle on a running scan.
pub struct ScanHandle {
    task: JoinHandle<ScanProgress>,
}

impl ScanHandle {
    /// Waits for the scan to finish and returns its final progress.
    pub async fn wait(self) -> DiscoveryResult<ScanProgress> {
        self.task
            .await
            .map_err(|e| DiscoveryError::Fatal(format!("scan task failed: {e}")))
    }
}

/// Blocks to scan: after the cursor, at most `scan_depth` blocks behind `height`.
pub fn scan_range(height: u64, cursor: Option<u64>, scan_depth: u64) -> Option<BlockRange> {
    let floor = height.saturating_sub(scan_depth);
    let from = cursor.map_or(floor, |c| c.saturating_add(1).max(floor));
    BlockRange::new(from, height)
}

pub struct DiscoveryOrchestrator {
    chain: Arc<dyn ChainDataClient>,
    db: Arc<EngineDb>,
    publisher: Arc<ProgressPublisher>,
    detector: ContractDetector,
    types: TypeClassifier,
    categories: CategoryClassifier,
    grouper: ApplicationGrouper,
    activity: ActivityAggregator,
    scorer: QualityScorer,
    config: OrchestratorConfig,
    state: Mutex<RunState>,
}

impl DiscoveryOrchestrator {
    pub fn new(
        chain: Arc<dyn ChainDataClient>,
        db: Arc<EngineDb>,
        publisher: Arc<ProgressPublisher>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            detector: ContractDetector::new(
                chain.clone(),
                db.clone(),
                config.concurrency,
                config.scan_depth,
            ),
            types: TypeClassifier::default(),
            categories: CategoryClassifier,
            grouper: ApplicationGrouper::new(db.clone(), config.max_conflict_retries),
            activity: ActivityAggregator::new(chain.clone(), db.clone(), config.concurrency),
            scorer: QualityScorer::new(db.clone()),
            chain,
            db,
            publisher,
            config,
            state: Mutex::new(RunState::default()),
        }
    }

    /// Replaces the type classifier, e.g. to add custom rules.
    pub fn with_type_classifier(mut self, types: TypeClassifier) -> Self {
        self.types = types;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn chain(&self) -> &Arc<dyn ChainDataClient> {
        &self.chain
    }

    pub fn db(&self) -> &Arc<EngineDb> {
        &self.db
    }

    pub fn activity(&self) -> &ActivityAggregator {
        &self.activity
    }

    pub fn scorer(&self) -> &QualityScorer {
        &self.scorer
    }

    fn state(&self) -> std::sync::MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts a scan in the background.
    ///
    /// Fails with [`DiscoveryError::AlreadyRunning`] while another scan is in
    /// progress, leaving its progress untouched.
    pub fn start(self: &Arc<Self>) -> DiscoveryResult<ScanHandle> {
        let cancel = {
            let mut state = self.state();
            if state.running {
                return Err(DiscoveryError::AlreadyRunning);
            }
            let cancel = CancellationToken::new();
            state.running = true;
            state.cancel = Some(cancel.clone());
            state.progress = ScanProgress {
                status: ScanStatus::Scanning,
                ..ScanProgress::default()
            };
            cancel
        };

        tracing::info!(target: "scout::etl::orchestrator", "Discovery scan started");

        let this = Arc::clone(self);
        let task = tokio::spawn(async move { this.run(cancel).await });
        Ok(ScanHandle { task })
    }

    /// Asks the running scan to stop after its current unit.
    ///
    /// Returns false when no scan is running.
    pub fn stop(&self) -> bool {
        let state = self.state();
        match (&state.cancel, state.running) {
            (Some(cancel), true) => {
                tracing::info!(target: "scout::etl::orchestrator", "Stop requested");
                cancel.cancel();
                true
            }
            _ => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state().running
    }

    pub fn get_progress(&self) -> ScanProgress {
        self.state().progress.clone()
    }

    fn update_progress(&self, f: impl FnOnce(&mut ScanProgress)) -> ScanProgress {
        let mut state = self.state();
        f(&mut state.progress);
        state.progress.clone()
    }

    async fn run(self: Arc<Self>, cancel: CancellationToken) -> ScanProgress {
        self.publisher
            .publish(ScanEvent::Progress(self.get_progress()));

        let result = self.scan(&cancel).await;

        let progress = {
            let mut state = self.state();
            match &result {
                Ok(Outcome::Completed) => {
                    state.progress.status = ScanStatus::Completed;
                    state.progress.percent = 100.0;
                }
                Ok(Outcome::Stopped) => state.progress.status = ScanStatus::Stopped,
                Err(e) => {
                    state.progress.status = ScanStatus::Error;
                    state.progress.error = Some(e.to_string());
                }
            }
            state.running = false;
            state.cancel = None;
            state.progress.clone()
        };

        match result {
            Ok(Outcome::Completed) => {
                tracing::info!(
                    target: "scout::etl::orchestrator",
                    units = progress.current_unit,
                    applications = progress.discovered_count,
                    contracts = progress.contracts_found,
                    "Discovery scan completed"
                );
                self.publisher
                    .publish(ScanEvent::Progress(progress.clone()));
                self.publisher
                    .publish(ScanEvent::Completed(progress.clone()));
            }
            Ok(Outcome::Stopped) => {
                tracing::info!(
                    target: "scout::etl::orchestrator",
                    units = progress.current_unit,
                    "Discovery scan stopped"
                );
                self.publisher.publish(ScanEvent::Stopped(progress.clone()));
            }
            Err(e) => {
                tracing::error!(
                    target: "scout::etl::orchestrator",
                    error = %e,
                    "Discovery scan failed"
                );
                self.publisher.publish(ScanEvent::Error(progress.clone()));
            }
        }

        progress
    }

    async fn scan(&self, cancel: &CancellationToken) -> DiscoveryResult<Outcome> {
        let height = self
            .chain
            .get_height()
            .await
            .map_err(|e| DiscoveryError::Fatal(format!("chain height unavailable: {e}")))?;
        let cursor = self.db.get_cursor().await?;

        let Some(range) = scan_range(height, cursor, self.config.scan_depth) else {
            tracing::info!(
                target: "scout::etl::orchestrator",
                height,
                cursor,
                "Nothing to scan"
            );
            return Ok(Outcome::Completed);
        };

        let units: Vec<BlockRange> = range.chunks(self.config.unit_size).collect();
        let total_units = units.len() as u64;
        self.update_progress(|p| {
            p.total_units = total_units;
            p.current_block = range.from;
        });

        tracing::info!(
            target: "scout::etl::orchestrator",
            %range,
            units = total_units,
            "Scanning"
        );

        let mut announced = HashSet::new();
        let mut consecutive_failures = 0u32;
        let mut cursor_frozen = false;

        for (index, unit) in units.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return Ok(Outcome::Stopped);
            }

            let failure = match self.process_unit(unit, &mut announced).await {
                Ok(report) => {
                    self.update_progress(|p| p.contracts_found += report.contracts_created);
                    match report.partial {
                        Some(partial) => Some(DiscoveryError::PartialFailure {
                            failed: partial.failed,
                            source: partial.error,
                        }),
                        None if cursor_frozen => None,
                        None => self.db.advance_cursor(unit.to).await.err().map(Into::into),
                    }
                }
                Err(e) => Some(e),
            };

            match failure {
                None => consecutive_failures = 0,
                Some(e) => {
                    consecutive_failures += 1;
                    cursor_frozen = true;
                    metrics::counter!("scout_unit_failures_total").increment(1);
                    tracing::warn!(
                        target: "scout::etl::orchestrator",
                        %unit,
                        consecutive_failures,
                        error = %e,
                        "Unit failed"
                    );
                    if consecutive_failures >= self.config.max_consecutive_failures {
                        return Err(DiscoveryError::Fatal(format!(
                            "{consecutive_failures} consecutive units failed, last at {unit}: {e}"
                        )));
                    }
                }
            }

            metrics::counter!("scout_units_processed_total").increment(1);
            let done = index as u64 + 1;
            let progress = self.update_progress(|p| {
                p.current_unit = done;
                p.current_block = unit.to;
                p.percent = (done as f64 * 1000.0 / total_units as f64).round() / 10.0;
            });
            self.publisher.publish(ScanEvent::Progress(progress));
        }

        Ok(Outcome::Completed)
    }

    /// Detects, classifies and groups one unit, then refreshes the
    /// applications it touched.
    async fn process_unit(
        &self,
        unit: BlockRange,
        announced: &mut HashSet<String>,
    ) -> DiscoveryResult<UnitReport> {
        let detection = self.detector.detect_in_range(unit).await?;
        let logs = self.chain.query_logs(unit, None).await?;
        let mut partial = detection.partial.or(logs.partial);

        let mut deployments = detection.deployments;
        if self.config.discover_active_contracts {
            let active = self
                .detector
                .detect_active_from_logs(unit, &logs.items, self.config.max_active_contracts_per_unit)
                .await?;
            partial = partial.or(active.partial);
            deployments.extend(active.deployments);
        }

        let report = UnitReport {
            contracts_created: deployments.iter().filter(|d| d.created).count() as u64,
            partial,
        };

        let mut logs_by_address: HashMap<String, Vec<Log>> = HashMap::new();
        for log in logs.items {
            logs_by_address
                .entry(log.address.to_ascii_lowercase())
                .or_default()
                .push(log);
        }

        let pending = self.ungrouped(deployments).await?;
        let codes = self.fetch_bytecode(&pending).await;

        let mut touched: Vec<String> = Vec::new();
        for deployment in &pending {
            let Some(mut contract) = self.db.get_contract(&deployment.address).await? else {
                continue;
            };
            let events = logs_by_address
                .get(&contract.address)
                .map(Vec::as_slice)
                .unwrap_or_default();
            let code = codes
                .get(&contract.address)
                .map(String::as_str)
                .unwrap_or("0x");

            contract.contract_type = self.types.classify(&contract.address, code, events);
            self.db
                .set_contract_type(&contract.address, contract.contract_type)
                .await?;

            let topics: Vec<String> = events
                .iter()
                .filter_map(|l| l.topic0().map(str::to_ascii_lowercase))
                .sorted()
                .dedup()
                .collect();
            let (category, confidence) = self
                .categories
                .classify(topics.iter().map(String::as_str));

            let grouped = self
                .grouper
                .group_contract(&contract, category, confidence)
                .await?;
            let application = grouped.application;
            self.db.record_topics(&application.id, &topics).await?;

            if !touched.contains(&application.id) {
                touched.push(application.id.clone());
            }

            if announced.insert(application.id.clone()) {
                let contracts = self.db.contracts_for_application(&application.id).await?;
                metrics::counter!("scout_applications_discovered_total").increment(1);
                self.update_progress(|p| p.discovered_count += 1);
                self.publisher.publish(ScanEvent::ApplicationDiscovered(
                    DiscoveredApplication::new(&application, &contracts),
                ));
            }
        }

        let window = BlockRange::trailing(unit.to, self.config.activity_window_blocks);
        for application_id in &touched {
            if let Err(e) = self.activity.refresh(application_id, window).await {
                tracing::warn!(
                    target: "scout::etl::orchestrator",
                    application_id,
                    error = %e,
                    "Activity refresh failed"
                );
            }
            if let Err(e) = self.scorer.score_and_store(application_id).await {
                tracing::warn!(
                    target: "scout::etl::orchestrator",
                    application_id,
                    error = %e,
                    "Scoring failed"
                );
            }
        }

        tracing::debug!(
            target: "scout::etl::orchestrator",
            %unit,
            grouped = pending.len(),
            applications = touched.len(),
            "Unit processed"
        );

        Ok(report)
    }

    /// Deployments created now or left ungrouped by an earlier run, oldest first.
    async fn ungrouped(&self, deployments: Vec<Deployment>) -> DiscoveryResult<Vec<Deployment>> {
        let mut pending = Vec::new();
        let mut seen = HashSet::new();
        for deployment in deployments {
            if !seen.insert(deployment.address.clone()) {
                continue;
            }
            if deployment.created {
                pending.push(deployment);
                continue;
            }
            let ungrouped = self
                .db
                .get_contract(&deployment.address)
                .await?
                .is_some_and(|c| c.application_id.is_none());
            if ungrouped {
                pending.push(deployment);
            }
        }
        pending.sort_by(|a, b| {
            a.block_number
                .cmp(&b.block_number)
                .then_with(|| a.address.cmp(&b.address))
        });
        Ok(pending)
    }

    /// Bytecode per address. Failed lookups are logged and left out.
    async fn fetch_bytecode(&self, deployments: &[Deployment]) -> HashMap<String, String> {
        let addresses: Vec<String> = deployments.iter().map(|d| d.address.clone()).collect();
        stream::iter(addresses)
            .map(|address| async move {
                match self.chain.get_code(&address).await {
                    Ok(code) => Some((address, code)),
                    Err(e) => {
                        tracing::warn!(
                            target: "scout::etl::orchestrator",
                            address = %address,
                            error = %e,
                            "Bytecode unavailable, classifying from events"
                        );
                        None
                    }
                }
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .filter_map(std::future::ready)
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::etl::engine_db::EngineDbConfig;
    use crate::etl::extractor::SampleChain;
    use crate::etl::identification::signatures::topics;
    use crate::etl::model::{Category, ContractType};
    use crate::etl::publisher::EventName;
    use std::time::Duration;

    const DEPLOYER: &str = "0x1111111111111111111111111111111111111111";
    const TOKEN: &str = "0x2222222222222222222222222222222222222222";
    const POOL: &str = "0x3333333333333333333333333333333333333333";
    const ERC20_CODE: &str = "0x60806370a082311463a9059cbb1463095ea7b31400";

    fn config() -> OrchestratorConfig {
        OrchestratorConfig {
            scan_depth: 100,
            unit_size: 10,
            activity_window_blocks: 100,
            concurrency: 4,
            max_consecutive_failures: 3,
            discover_active_contracts: false,
            max_active_contracts_per_unit: 10,
            max_conflict_retries: 3,
        }
    }

    async fn orchestrator(
        chain: Arc<SampleChain>,
        config: OrchestratorConfig,
    ) -> (Arc<DiscoveryOrchestrator>, Arc<EngineDb>, Arc<ProgressPublisher>) {
        let db = Arc::new(EngineDb::new(EngineDbConfig::in_memory()).await.unwrap());
        let publisher = Arc::new(ProgressPublisher::new(1_024));
        let orchestrator = Arc::new(DiscoveryOrchestrator::new(
            chain,
            db.clone(),
            publisher.clone(),
            config,
        ));
        (orchestrator, db, publisher)
    }

    #[test]
    fn test_scan_range_bounds() {
        assert_eq!(scan_range(1_000, None, 100), BlockRange::new(900, 1_000));
        assert_eq!(scan_range(1_000, Some(950), 100), BlockRange::new(951, 1_000));
        // A stale cursor never reaches further back than the depth
        assert_eq!(scan_range(1_000, Some(10), 100), BlockRange::new(900, 1_000));
        assert_eq!(scan_range(1_000, Some(1_000), 100), None);
        assert_eq!(scan_range(50, None, 100), BlockRange::new(0, 50));
    }

    #[tokio::test]
    async fn test_full_scan_groups_and_classifies() {
        let chain = Arc::new(SampleChain::new(99));
        chain.deploy(DEPLOYER, TOKEN, 5, ERC20_CODE);
        chain.deploy(DEPLOYER, POOL, 25, "0x6080");
        chain.emit(POOL, &[topics::SWAP], 26);
        chain.emit(POOL, &[topics::SYNC], 26);

        let (orchestrator, db, publisher) = orchestrator(chain, config()).await;
        let mut events = publisher.subscribe(&EventName::ALL);

        let progress = orchestrator.start().unwrap().wait().await.unwrap();
        assert_eq!(progress.status, ScanStatus::Completed);
        assert_eq!(progress.total_units, 10);
        assert_eq!(progress.current_unit, 10);
        assert_eq!(progress.contracts_found, 2);
        assert_eq!(progress.discovered_count, 1);
        assert_eq!(progress.percent, 100.0);
        assert_eq!(db.get_cursor().await.unwrap(), Some(99));

        let token = db.get_contract(TOKEN).await.unwrap().unwrap();
        let pool = db.get_contract(POOL).await.unwrap().unwrap();
        assert_eq!(token.contract_type, ContractType::Erc20);
        assert_eq!(pool.contract_type, ContractType::Custom);
        assert_eq!(token.application_id, pool.application_id);

        let app_id = token.application_id.unwrap();
        let app = db.get_application(&app_id).await.unwrap().unwrap();
        assert_eq!(app.category, Category::Dex);

        let mut names = Vec::new();
        while let Ok(event) = events.events.try_recv() {
            names.push(event.name());
        }
        assert_eq!(
            names.iter().filter(|n| **n == EventName::ApplicationDiscovered).count(),
            1
        );
        assert_eq!(names.last(), Some(&EventName::Completed));
        assert!(!orchestrator.is_running());
    }

    #[tokio::test]
    async fn test_already_running_keeps_progress() {
        let chain = Arc::new(SampleChain::new(99));
        chain.set_latency(Duration::from_millis(20));
        let (orchestrator, _db, _publisher) = orchestrator(chain, config()).await;

        let handle = orchestrator.start().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let before = orchestrator.get_progress();

        assert!(matches!(
            orchestrator.start(),
            Err(DiscoveryError::AlreadyRunning)
        ));
        let after = orchestrator.get_progress();
        assert_eq!(after.total_units, before.total_units);
        assert!(after.current_unit >= before.current_unit);
        assert_eq!(after.status, ScanStatus::Scanning);

        orchestrator.stop();
        handle.wait().await.unwrap();
        // Idle again: a new scan can start
        orchestrator.start().unwrap().wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_ends_without_later_announcements() {
        let chain = Arc::new(SampleChain::new(99));
        for block in (0..100).step_by(10) {
            let deployer = format!("0x{:040x}", 0x1000 + block);
            let contract = format!("0x{:040x}", 0x2000 + block);
            chain.deploy(&deployer, &contract, block, "0x6080");
        }
        chain.set_latency(Duration::from_millis(20));

        let (orchestrator, _db, publisher) = orchestrator(chain, config()).await;
        let mut events = publisher.subscribe(&EventName::ALL);

        let handle = orchestrator.start().unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(orchestrator.stop());
        let progress = handle.wait().await.unwrap();

        assert_eq!(progress.status, ScanStatus::Stopped);
        assert!(progress.current_unit < progress.total_units);

        let mut names = Vec::new();
        while let Ok(event) = events.events.try_recv() {
            names.push(event.name());
        }
        let stopped_at = names
            .iter()
            .position(|n| *n == EventName::Stopped)
            .unwrap();
        assert_eq!(stopped_at, names.len() - 1);
        assert!(!orchestrator.stop());
    }

    #[tokio::test]
    async fn test_partial_unit_freezes_cursor() {
        let chain = Arc::new(SampleChain::new(99));
        chain.deploy(DEPLOYER, TOKEN, 45, "0x6080");
        chain.fail_range(BlockRange::new(20, 20).unwrap());

        let (orchestrator, db, _publisher) = orchestrator(chain.clone(), config()).await;
        let progress = orchestrator.start().unwrap().wait().await.unwrap();

        // An isolated failure does not end the scan
        assert_eq!(progress.status, ScanStatus::Completed);
        assert_eq!(db.get_cursor().await.unwrap(), Some(19));
        assert!(db.get_contract(TOKEN).await.unwrap().is_some());

        // The next run resumes at the failed unit
        chain.clear_failures();
        let progress = orchestrator.start().unwrap().wait().await.unwrap();
        assert_eq!(progress.total_units, 8);
        assert_eq!(db.get_cursor().await.unwrap(), Some(99));
    }

    #[tokio::test]
    async fn test_consecutive_failures_end_in_error() {
        let chain = Arc::new(SampleChain::new(99));
        chain.fail_range(BlockRange::new(10, 39).unwrap());

        let (orchestrator, _db, publisher) = orchestrator(chain, config()).await;
        let mut errors = publisher.subscribe(&[EventName::Error]);

        let progress = orchestrator.start().unwrap().wait().await.unwrap();
        assert_eq!(progress.status, ScanStatus::Error);
        assert!(progress.error.is_some());
        assert_eq!(progress.current_unit, 3);
        assert_eq!(errors.events.recv().await.unwrap().name(), EventName::Error);
    }

    #[tokio::test]
    async fn test_height_unavailable_is_fatal() {
        let chain = Arc::new(SampleChain::new(99));
        chain.set_height_unavailable(true);

        let (orchestrator, _db, _publisher) = orchestrator(chain, config()).await;
        let progress = orchestrator.start().unwrap().wait().await.unwrap();
        assert_eq!(progress.status, ScanStatus::Error);
        assert_eq!(orchestrator.get_progress().status, ScanStatus::Error);
    }

    #[tokio::test]
    async fn test_active_contracts_are_grouped() {
        let chain = Arc::new(SampleChain::new(99));
        chain.emit(POOL, &[topics::TRANSFER, "0x01", "0x02"], 50);

        let config = OrchestratorConfig {
            discover_active_contracts: true,
            ..config()
        };
        let (orchestrator, db, _publisher) = orchestrator(chain, config).await;
        orchestrator.start().unwrap().wait().await.unwrap();

        let pool = db.get_contract(POOL).await.unwrap().unwrap();
        assert_eq!(pool.contract_type, ContractType::Erc20);
        let app = db
            .get_application(pool.application_id.as_deref().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(app.group_key, POOL);
        assert_eq!(app.category, Category::Token);
    }
}
