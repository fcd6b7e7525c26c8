//! In-memory chain for demos and tests
//!
//! Holds transactions, logs and bytecode pushed by the caller and answers
//! [`ChainDataClient`] queries from them. Outages and failing block ranges can
//! be injected to exercise partial-failure handling.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use super::{BlockRange, ChainDataClient, Fetched, Log, LogFilter, PartialFailure, Tx, TxFilter};
use crate::error::ChainError;

/// Timestamp of block 0; block `n` is `n` seconds later.
pub const SAMPLE_GENESIS_TIME: i64 = 1_700_000_000;

#[derive(Default)]
struct SampleState {
    height: u64,
    txs: Vec<Tx>,
    logs: Vec<Log>,
    code: HashMap<String, String>,
    height_down: bool,
    failing: Vec<BlockRange>,
    latency: Duration,
    next_tx: u64,
}

/// Chain data served from memory.
#[derive(Default)]
pub struct SampleChain {
    state: RwLock<SampleState>,
}

impl SampleChain {
    pub fn new(height: u64) -> Self {
        let chain = Self::default();
        chain.set_height(height);
        chain
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, SampleState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, SampleState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn block_timestamp(block: u64) -> i64 {
        SAMPLE_GENESIS_TIME + block as i64
    }

    pub fn set_height(&self, height: u64) {
        self.write().height = height;
    }

    /// Makes `get_height` fail with [`ChainError::Unavailable`].
    pub fn set_height_unavailable(&self, down: bool) {
        self.write().height_down = down;
    }

    /// Every query touching `range` fails from its first block in `range` on.
    pub fn fail_range(&self, range: BlockRange) {
        self.write().failing.push(range);
    }

    pub fn clear_failures(&self) {
        self.write().failing.clear();
    }

    /// Delay applied to every range query.
    pub fn set_latency(&self, latency: Duration) {
        self.write().latency = latency;
    }

    fn next_hash(state: &mut SampleState) -> String {
        state.next_tx += 1;
        format!("0x{:064x}", state.next_tx)
    }

    /// Records a contract creation by `deployer` and the contract's bytecode.
    pub fn deploy(&self, deployer: &str, contract: &str, block: u64, code: &str) {
        let mut state = self.write();
        let hash = Self::next_hash(&mut state);
        state.txs.push(Tx {
            hash,
            from: deployer.to_string(),
            to: None,
            contract_address: Some(contract.to_string()),
            block_number: block,
            timestamp: Some(Self::block_timestamp(block)),
            gas_used: 500_000,
        });
        state.code.insert(contract.to_string(), code.to_string());
    }

    /// Records a call from `from` to `to`.
    pub fn call(&self, from: &str, to: &str, block: u64, gas_used: u64) {
        let mut state = self.write();
        let hash = Self::next_hash(&mut state);
        state.txs.push(Tx {
            hash,
            from: from.to_string(),
            to: Some(to.to_string()),
            contract_address: None,
            block_number: block,
            timestamp: Some(Self::block_timestamp(block)),
            gas_used,
        });
    }

    /// Records an event emitted by `address`.
    pub fn emit(&self, address: &str, topics: &[&str], block: u64) {
        let mut state = self.write();
        let log_index = state.logs.len() as u64;
        state.logs.push(Log {
            address: address.to_string(),
            topics: topics.iter().map(|t| (*t).to_string()).collect(),
            data: "0x".to_string(),
            block_number: block,
            transaction_hash: None,
            log_index: Some(log_index),
        });
    }

    pub fn push_tx(&self, tx: Tx) {
        self.write().txs.push(tx);
    }

    pub fn push_log(&self, log: Log) {
        self.write().logs.push(log);
    }

    /// Range actually served and the failure for the rest, if any.
    fn served(state: &SampleState, range: BlockRange) -> (Option<BlockRange>, Option<PartialFailure>) {
        let first_failure = state
            .failing
            .iter()
            .filter(|f| f.from <= range.to && f.to >= range.from)
            .map(|f| f.from.max(range.from))
            .min();

        match first_failure {
            None => (Some(range), None),
            Some(block) => (
                BlockRange::new(range.from, block.saturating_sub(1)).filter(|_| block > range.from),
                Some(PartialFailure {
                    failed: BlockRange {
                        from: block,
                        to: range.to,
                    },
                    error: ChainError::Transient(format!("injected failure at block {block}")),
                }),
            ),
        }
    }

    async fn delay(&self) {
        let latency = self.read().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl ChainDataClient for SampleChain {
    async fn get_height(&self) -> Result<u64, ChainError> {
        let state = self.read();
        if state.height_down {
            return Err(ChainError::Unavailable("sample chain height disabled".into()));
        }
        Ok(state.height)
    }

    async fn query_logs(
        &self,
        range: BlockRange,
        filter: Option<&LogFilter>,
    ) -> Result<Fetched<Log>, ChainError> {
        self.delay().await;
        let state = self.read();
        let (served, partial) = Self::served(&state, range);

        let mut items: Vec<Log> = served
            .map(|served| {
                state
                    .logs
                    .iter()
                    .filter(|l| served.contains(l.block_number))
                    .filter(|l| filter.is_none_or(|f| f.matches(l)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        items.sort_by_key(|l| (l.block_number, l.log_index));
        if let Some(limit) = filter.and_then(|f| f.limit) {
            items.truncate(limit);
        }

        Ok(Fetched { items, partial })
    }

    async fn query_transactions(
        &self,
        range: BlockRange,
        filter: Option<&TxFilter>,
    ) -> Result<Fetched<Tx>, ChainError> {
        self.delay().await;
        let state = self.read();
        let (served, partial) = Self::served(&state, range);

        let mut items: Vec<Tx> = served
            .map(|served| {
                state
                    .txs
                    .iter()
                    .filter(|t| served.contains(t.block_number))
                    .filter(|t| filter.is_none_or(|f| f.matches(t)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        items.sort_by_key(|t| t.block_number);
        if let Some(limit) = filter.and_then(|f| f.limit) {
            items.truncate(limit);
        }

        Ok(Fetched { items, partial })
    }

    async fn get_code(&self, address: &str) -> Result<String, ChainError> {
        Ok(self
            .read()
            .code
            .get(address)
            .cloned()
            .unwrap_or_else(|| "0x".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::etl::model::Confidence;

    const DEPLOYER: &str = "0x1111111111111111111111111111111111111111";
    const CONTRACT: &str = "0x2222222222222222222222222222222222222222";

    #[tokio::test]
    async fn test_injected_failure_is_partial() {
        let chain = SampleChain::new(100);
        chain.deploy(DEPLOYER, CONTRACT, 10, "0x");
        chain.deploy(DEPLOYER, "0x3333333333333333333333333333333333333333", 60, "0x");
        chain.fail_range(BlockRange::new(50, 70).unwrap());

        let fetched = chain
            .query_transactions(BlockRange::new(0, 100).unwrap(), None)
            .await
            .unwrap();

        assert_eq!(fetched.items.len(), 1);
        let partial = fetched.partial.unwrap();
        assert_eq!(partial.failed, BlockRange { from: 50, to: 100 });

        let fully_failed = chain
            .query_transactions(BlockRange::new(55, 60).unwrap(), None)
            .await
            .unwrap();
        assert!(fully_failed.items.is_empty());
        assert_eq!(fully_failed.partial.unwrap().failed.from, 55);
    }

    #[tokio::test]
    async fn test_default_find_creator() {
        let chain = SampleChain::new(100);
        chain.deploy(DEPLOYER, CONTRACT, 10, "0x6080");

        let lookup = chain
            .find_creator(CONTRACT, BlockRange::new(0, 100).unwrap())
            .await
            .unwrap();
        assert_eq!(lookup.creator, DEPLOYER);
        assert_eq!(lookup.confidence, Confidence::Exact);
        assert_eq!(lookup.timestamp, Some(SampleChain::block_timestamp(10)));

        let lookup = chain
            .find_creator(CONTRACT, BlockRange::new(11, 100).unwrap())
            .await
            .unwrap();
        assert_eq!(lookup.creator, CONTRACT);
        assert_eq!(lookup.confidence, Confidence::Approximated);
    }

    #[tokio::test]
    async fn test_find_creator_ignores_address_case() {
        let chain = SampleChain::new(100);
        let checksummed = "0xAbCdEf0000000000000000000000000000000001";
        chain.deploy(DEPLOYER, checksummed, 10, "0x6080");

        let range = BlockRange::new(0, 100).unwrap();
        let lookup = chain
            .find_creator(&checksummed.to_ascii_lowercase(), range)
            .await
            .unwrap();
        assert_eq!(lookup.creator, DEPLOYER);
        assert_eq!(lookup.confidence, Confidence::Exact);
        assert_eq!(lookup.block_number, Some(10));
    }
}
