//! Chain data access for discovery
//!
//! [`ChainDataClient`] is the only way the engine reads the chain: logs,
//! transactions, chain height, creator lookups and runtime bytecode. Range
//! queries report partial results instead of failing outright, so callers can
//! keep what was fetched and resume from the first failed window.

pub mod block_range;
pub mod hypersync;
pub mod retry;
pub mod sample;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ChainError;
use crate::etl::model::Confidence;

pub use block_range::BlockRange;
pub use hypersync::{HyperSyncClient, HyperSyncConfig};
pub use retry::RetryPolicy;
pub use sample::SampleChain;

/// An emitted event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    pub address: String,
    /// `topics[0]` is the event signature hash when present.
    pub topics: Vec<String>,
    pub data: String,
    pub block_number: u64,
    pub transaction_hash: Option<String>,
    pub log_index: Option<u64>,
}

impl Log {
    pub fn topic0(&self) -> Option<&str> {
        self.topics.first().map(String::as_str)
    }
}

/// A transaction, with the deployed address for contract creations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tx {
    pub hash: String,
    pub from: String,
    pub to: Option<String>,
    pub contract_address: Option<String>,
    pub block_number: u64,
    pub timestamp: Option<i64>,
    pub gas_used: u64,
}

impl Tx {
    pub fn is_contract_creation(&self) -> bool {
        self.contract_address.is_some()
    }
}

/// Log selection. Empty lists match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFilter {
    pub addresses: Vec<String>,
    pub topics0: Vec<String>,
    pub limit: Option<usize>,
}

impl LogFilter {
    pub fn for_addresses(addresses: impl IntoIterator<Item = String>) -> Self {
        Self {
            addresses: addresses.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, log: &Log) -> bool {
        (self.addresses.is_empty() || self.addresses.iter().any(|a| a == &log.address))
            && (self.topics0.is_empty()
                || log
                    .topic0()
                    .is_some_and(|t| self.topics0.iter().any(|s| s == t)))
    }
}

/// Transaction selection. Empty lists match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxFilter {
    pub from: Vec<String>,
    pub to: Vec<String>,
    /// Only transactions that deployed a contract.
    pub contract_creations: bool,
    pub limit: Option<usize>,
}

impl TxFilter {
    pub fn contract_creations() -> Self {
        Self {
            contract_creations: true,
            ..Self::default()
        }
    }

    pub fn sent_to(addresses: impl IntoIterator<Item = String>) -> Self {
        Self {
            to: addresses.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn matches(&self, tx: &Tx) -> bool {
        (!self.contract_creations || tx.is_contract_creation())
            && (self.from.is_empty() || self.from.iter().any(|a| a == &tx.from))
            && (self.to.is_empty()
                || tx
                    .to
                    .as_ref()
                    .is_some_and(|to| self.to.iter().any(|a| a == to)))
    }
}

/// Blocks a range query could not fetch after exhausting retries.
#[derive(Debug, Clone)]
pub struct PartialFailure {
    /// First failed block through the end of the requested range.
    pub failed: BlockRange,
    pub error: ChainError,
}

/// Result of a range query: everything fetched, plus what was not.
#[derive(Debug, Clone)]
pub struct Fetched<T> {
    pub items: Vec<T>,
    pub partial: Option<PartialFailure>,
}

impl<T> Fetched<T> {
    pub fn complete(items: Vec<T>) -> Self {
        Self {
            items,
            partial: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.partial.is_none()
    }
}

/// Outcome of a creator lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatorLookup {
    pub creator: String,
    pub confidence: Confidence,
    pub block_number: Option<u64>,
    pub timestamp: Option<i64>,
}

/// Read access to chain history and state.
#[async_trait]
pub trait ChainDataClient: Send + Sync {
    /// Current chain head.
    async fn get_height(&self) -> Result<u64, ChainError>;

    async fn query_logs(
        &self,
        range: BlockRange,
        filter: Option<&LogFilter>,
    ) -> Result<Fetched<Log>, ChainError>;

    async fn query_transactions(
        &self,
        range: BlockRange,
        filter: Option<&TxFilter>,
    ) -> Result<Fetched<Tx>, ChainError>;

    /// Runtime bytecode as `0x`-hex (`0x` when the account has no code).
    async fn get_code(&self, address: &str) -> Result<String, ChainError>;

    /// Deployer of `address`, searched among creation transactions in `range`.
    ///
    /// Falls back to the contract's own address with
    /// [`Confidence::Approximated`] when no deployment is found.
    async fn find_creator(
        &self,
        address: &str,
        range: BlockRange,
    ) -> Result<CreatorLookup, ChainError> {
        let fetched = self
            .query_transactions(range, Some(&TxFilter::contract_creations()))
            .await?;

        let found = fetched
            .items
            .iter()
            .find(|tx| {
                tx.contract_address
                    .as_deref()
                    .is_some_and(|deployed| deployed.eq_ignore_ascii_case(address))
            });

        Ok(match found {
            Some(tx) => CreatorLookup {
                creator: tx.from.clone(),
                confidence: Confidence::Exact,
                block_number: Some(tx.block_number),
                timestamp: tx.timestamp,
            },
            None => {
                tracing::debug!(
                    target: "scout::etl::extractor",
                    address,
                    %range,
                    "Creator not found, using contract address"
                );
                CreatorLookup {
                    creator: address.to_string(),
                    confidence: Confidence::Approximated,
                    block_number: None,
                    timestamp: None,
                }
            }
        })
    }
}
