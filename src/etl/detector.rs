//! Contract detection.
//!
//! Finds deployments in a block range and records each new contract exactly
//! once, keyed on its normalized address.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use itertools::Itertools;

use crate::error::DiscoveryResult;
use crate::etl::engine_db::{EngineDb, NewContract};
use crate::etl::extractor::{
    BlockRange, ChainDataClient, CreatorLookup, Log, PartialFailure, TxFilter,
};
use crate::etl::model::Confidence;

/// A contract deployment seen during detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub address: String,
    pub deployer: String,
    pub confidence: Confidence,
    pub block_number: u64,
    pub timestamp: Option<i64>,
    /// True if this call created the contract row.
    pub created: bool,
}

/// Deployments found in a range.
#[derive(Debug, Clone, Default)]
pub struct Detection {
    pub deployments: Vec<Deployment>,
    pub partial: Option<PartialFailure>,
}

impl Detection {
    pub fn created(&self) -> impl Iterator<Item = &Deployment> {
        self.deployments.iter().filter(|d| d.created)
    }
}

pub struct ContractDetector {
    chain: Arc<dyn ChainDataClient>,
    db: Arc<EngineDb>,
    concurrency: usize,
    /// How far back creator lookups search.
    creator_search_depth: u64,
}

impl ContractDetector {
    pub fn new(
        chain: Arc<dyn ChainDataClient>,
        db: Arc<EngineDb>,
        concurrency: usize,
        creator_search_depth: u64,
    ) -> Self {
        Self {
            chain,
            db,
            concurrency: concurrency.max(1),
            creator_search_depth,
        }
    }

    /// Records every contract deployed in `range`.
    ///
    /// Rows with malformed addresses are skipped. Contracts already stored are
    /// reported with `created == false`.
    pub async fn detect_in_range(&self, range: BlockRange) -> DiscoveryResult<Detection> {
        let fetched = self
            .chain
            .query_transactions(range, Some(&TxFilter::contract_creations()))
            .await?;

        let mut deployments = Vec::with_capacity(fetched.items.len());
        for tx in &fetched.items {
            let Some(raw) = tx.contract_address.as_deref() else {
                continue;
            };
            let (address, deployer) = match (
                scout_common::normalize_address(raw),
                scout_common::normalize_address(&tx.from),
            ) {
                (Ok(address), Ok(deployer)) => (address, deployer),
                (Err(e), _) | (_, Err(e)) => {
                    tracing::warn!(
                        target: "scout::etl::detector",
                        tx = %tx.hash,
                        error = %e,
                        "Skipping deployment with malformed address"
                    );
                    continue;
                }
            };

            let lookup = CreatorLookup {
                creator: deployer,
                confidence: Confidence::Exact,
                block_number: Some(tx.block_number),
                timestamp: tx.timestamp,
            };
            deployments.push(self.record(address, lookup).await?);
        }

        let detection = Detection {
            deployments,
            partial: fetched.partial,
        };

        tracing::debug!(
            target: "scout::etl::detector",
            %range,
            found = detection.deployments.len(),
            created = detection.created().count(),
            "Detected deployments"
        );

        Ok(detection)
    }

    /// Queries the range's logs and records its busiest unknown emitters.
    pub async fn detect_active_in_range(
        &self,
        range: BlockRange,
        limit: usize,
    ) -> DiscoveryResult<Detection> {
        let fetched = self.chain.query_logs(range, None).await?;
        let mut detection = self.detect_active_from_logs(range, &fetched.items, limit).await?;
        detection.partial = fetched.partial;
        Ok(detection)
    }

    /// Records the `limit` most active emitters in `logs` not yet stored.
    ///
    /// Creators are resolved with bounded concurrency; an emitter whose lookup
    /// fails stands in for its own creator.
    pub async fn detect_active_from_logs(
        &self,
        range: BlockRange,
        logs: &[Log],
        limit: usize,
    ) -> DiscoveryResult<Detection> {
        if limit == 0 || logs.is_empty() {
            return Ok(Detection::default());
        }

        let counts: HashMap<String, usize> = logs
            .iter()
            .filter_map(|log| scout_common::normalize_address(&log.address).ok())
            .counts();

        let candidates: Vec<String> = counts.keys().cloned().collect();
        let known = self.db.known_contracts(&candidates).await?;

        let mut ranked: Vec<(String, usize)> = counts
            .into_iter()
            .filter(|(address, _)| !known.contains(address))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(limit);

        let search = BlockRange::trailing(range.to, self.creator_search_depth);
        let lookups: Vec<(String, CreatorLookup)> = stream::iter(ranked)
            .map(|(address, _)| async move {
                let lookup = self.lookup_creator(&address, search).await;
                (address, lookup)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut deployments = Vec::with_capacity(lookups.len());
        for (address, mut lookup) in lookups {
            if let Ok(creator) = scout_common::normalize_address(&lookup.creator) {
                lookup.creator = creator;
            }
            if lookup.block_number.is_none() {
                lookup.block_number = logs
                    .iter()
                    .filter(|l| l.address.eq_ignore_ascii_case(&address))
                    .map(|l| l.block_number)
                    .min();
            }
            deployments.push(self.record(address, lookup).await?);
        }
        deployments.sort_by(|a, b| {
            a.block_number
                .cmp(&b.block_number)
                .then_with(|| a.address.cmp(&b.address))
        });

        tracing::debug!(
            target: "scout::etl::detector",
            %range,
            found = deployments.len(),
            "Detected active contracts"
        );

        Ok(Detection {
            deployments,
            partial: None,
        })
    }

    async fn lookup_creator(&self, address: &str, search: BlockRange) -> CreatorLookup {
        match self.chain.find_creator(address, search).await {
            Ok(lookup) => lookup,
            Err(e) => {
                tracing::warn!(
                    target: "scout::etl::detector",
                    address,
                    error = %e,
                    "Creator lookup failed, using contract address"
                );
                CreatorLookup {
                    creator: address.to_string(),
                    confidence: Confidence::Approximated,
                    block_number: None,
                    timestamp: None,
                }
            }
        }
    }

    async fn record(&self, address: String, lookup: CreatorLookup) -> DiscoveryResult<Deployment> {
        let block_number = lookup.block_number.unwrap_or_default();
        let created = self
            .db
            .insert_contract_if_absent(&NewContract {
                address: address.clone(),
                creator_address: Some(lookup.creator.clone()),
                creator_confidence: lookup.confidence,
                deployment_block: block_number,
                deployment_time: lookup.timestamp,
            })
            .await?;

        if created {
            metrics::counter!("scout_contracts_detected_total").increment(1);
            tracing::debug!(
                target: "scout::etl::detector",
                address = %address,
                creator = %lookup.creator,
                confidence = %lookup.confidence,
                "New contract"
            );
        }

        Ok(Deployment {
            address,
            deployer: lookup.creator,
            confidence: lookup.confidence,
            block_number,
            timestamp: lookup.timestamp,
            created,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::etl::engine_db::EngineDbConfig;
    use crate::etl::extractor::SampleChain;

    const DEPLOYER: &str = "0x1111111111111111111111111111111111111111";
    const TOKEN: &str = "0x2222222222222222222222222222222222222222";
    const POOL: &str = "0x3333333333333333333333333333333333333333";

    async fn setup() -> (Arc<SampleChain>, Arc<EngineDb>, ContractDetector) {
        let chain = Arc::new(SampleChain::new(1_000));
        let db = Arc::new(EngineDb::new(EngineDbConfig::in_memory()).await.unwrap());
        let detector = ContractDetector::new(chain.clone(), db.clone(), 4, 10_000);
        (chain, db, detector)
    }

    #[tokio::test]
    async fn test_detect_is_idempotent() {
        let (chain, db, detector) = setup().await;
        chain.deploy(DEPLOYER, TOKEN, 10, "0x6080");
        chain.deploy(DEPLOYER, POOL, 20, "0x6080");

        let first = detector
            .detect_in_range(BlockRange::new(0, 100).unwrap())
            .await
            .unwrap();
        assert_eq!(first.created().count(), 2);

        // Overlapping rescan
        let second = detector
            .detect_in_range(BlockRange::new(15, 200).unwrap())
            .await
            .unwrap();
        assert_eq!(second.deployments.len(), 1);
        assert_eq!(second.created().count(), 0);
        assert_eq!(db.count_contracts().await.unwrap(), 2);

        let stored = db.get_contract(POOL).await.unwrap().unwrap();
        assert_eq!(stored.creator_address.as_deref(), Some(DEPLOYER));
        assert_eq!(stored.deployment_block, 20);
    }

    #[tokio::test]
    async fn test_malformed_addresses_skipped() {
        let (chain, db, detector) = setup().await;
        chain.deploy(DEPLOYER, "0xnot-an-address", 10, "0x");
        chain.deploy(DEPLOYER, TOKEN, 11, "0x");

        let detection = detector
            .detect_in_range(BlockRange::new(0, 100).unwrap())
            .await
            .unwrap();
        assert_eq!(detection.deployments.len(), 1);
        assert_eq!(detection.deployments[0].address, TOKEN);
        assert!(db.get_contract(TOKEN).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_partial_failure_is_reported() {
        let (chain, _db, detector) = setup().await;
        chain.deploy(DEPLOYER, TOKEN, 10, "0x");
        chain.fail_range(BlockRange::new(50, 60).unwrap());

        let detection = detector
            .detect_in_range(BlockRange::new(0, 100).unwrap())
            .await
            .unwrap();
        assert_eq!(detection.created().count(), 1);
        assert_eq!(detection.partial.unwrap().failed.from, 50);
    }

    #[tokio::test]
    async fn test_active_contracts_with_approximated_creator() {
        let (chain, db, detector) = setup().await;
        // POOL has no deployment in the search window
        chain.emit(POOL, &["0xaa"], 900);
        chain.emit(POOL, &["0xaa"], 901);
        chain.emit(TOKEN, &["0xbb"], 902);
        chain.deploy(DEPLOYER, TOKEN, 950, "0x");

        let detector = ContractDetector::new(chain.clone(), db.clone(), 2, 100);
        let detection = detector
            .detect_active_in_range(BlockRange::new(900, 999).unwrap(), 10)
            .await
            .unwrap();
        assert_eq!(detection.deployments.len(), 2);

        let pool = db.get_contract(POOL).await.unwrap().unwrap();
        assert_eq!(pool.creator_confidence, Confidence::Approximated);
        assert_eq!(pool.creator_address.as_deref(), Some(POOL));
        assert_eq!(pool.deployment_block, 900);

        let token = db.get_contract(TOKEN).await.unwrap().unwrap();
        assert_eq!(token.creator_confidence, Confidence::Exact);
        assert_eq!(token.creator_address.as_deref(), Some(DEPLOYER));

        // Known contracts are not reported again
        let again = detector
            .detect_active_in_range(BlockRange::new(900, 999).unwrap(), 10)
            .await
            .unwrap();
        assert!(again.deployments.is_empty());
    }

    #[tokio::test]
    async fn test_active_contracts_respect_limit() {
        let (chain, _db, detector) = setup().await;
        chain.emit(POOL, &["0xaa"], 10);
        chain.emit(POOL, &["0xaa"], 11);
        chain.emit(TOKEN, &["0xbb"], 12);

        let detection = detector
            .detect_active_in_range(BlockRange::new(0, 100).unwrap(), 1)
            .await
            .unwrap();
        assert_eq!(detection.deployments.len(), 1);
        assert_eq!(detection.deployments[0].address, POOL);
    }
}
