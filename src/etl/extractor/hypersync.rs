//! HyperSync-compatible indexing backend client
//!
//! Range queries go to `POST {url}/query`, which answers one page at a time
//! and reports `next_block` to continue from. Chain height comes from
//! `GET {url}/height` with a JSON-RPC `eth_blockNumber` fallback, and bytecode
//! from JSON-RPC `eth_getCode`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use scout_common::{deserialize_opt_quantity, deserialize_quantity, parse_quantity};

use super::{
    BlockRange, ChainDataClient, Fetched, Log, LogFilter, PartialFailure, RetryPolicy, Tx,
    TxFilter,
};
use crate::error::ChainError;

const LOG_FIELDS: &[&str] = &[
    "address",
    "topic0",
    "topic1",
    "topic2",
    "topic3",
    "data",
    "block_number",
    "transaction_hash",
    "log_index",
];
const TX_FIELDS: &[&str] = &[
    "hash",
    "from",
    "to",
    "contract_address",
    "block_number",
    "gas_used",
];
const BLOCK_FIELDS: &[&str] = &["number", "timestamp"];

/// HyperSync client configuration
#[derive(Debug, Clone)]
pub struct HyperSyncConfig {
    /// Indexing backend base URL
    pub url: String,

    /// JSON-RPC endpoint for height fallback and bytecode reads
    pub rpc_url: Option<String>,

    /// Bearer token sent to the indexing backend
    pub api_token: Option<String>,

    /// Largest block window requested in one query
    pub max_blocks_per_query: u64,

    /// Per-call timeout
    pub request_timeout: Duration,

    /// Retry policy for transient failures
    pub retry_policy: RetryPolicy,
}

impl Default for HyperSyncConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:1131".to_string(),
            rpc_url: None,
            api_token: None,
            max_blocks_per_query: 5_000,
            request_timeout: Duration::from_secs(60),
            retry_policy: RetryPolicy::default(),
        }
    }
}

// ===== Wire schemas =====

#[derive(Debug, Serialize)]
struct QueryRequest {
    from_block: u64,
    /// Exclusive upper bound.
    to_block: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    logs: Vec<LogSelection>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    transactions: Vec<TxSelection>,
    field_selection: FieldSelection,
}

#[derive(Debug, Default, Serialize)]
struct LogSelection {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    address: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    topics: Vec<Vec<String>>,
}

#[derive(Debug, Default, Serialize)]
struct TxSelection {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    from: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    to: Vec<String>,
}

#[derive(Debug, Default, Serialize)]
struct FieldSelection {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    log: Vec<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    transaction: Vec<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    block: Vec<&'static str>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    data: Vec<DataBatch>,
    #[serde(deserialize_with = "deserialize_quantity")]
    next_block: u64,
    #[serde(default, deserialize_with = "deserialize_opt_quantity")]
    #[allow(dead_code)]
    archive_height: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DataBatch {
    logs: Vec<RawLog>,
    transactions: Vec<RawTx>,
    blocks: Vec<RawBlock>,
}

#[derive(Debug, Deserialize)]
struct RawLog {
    address: String,
    #[serde(default)]
    topics: Vec<Option<String>>,
    #[serde(default)]
    topic0: Option<String>,
    #[serde(default)]
    topic1: Option<String>,
    #[serde(default)]
    topic2: Option<String>,
    #[serde(default)]
    topic3: Option<String>,
    #[serde(default)]
    data: Option<String>,
    #[serde(deserialize_with = "deserialize_quantity")]
    block_number: u64,
    #[serde(default)]
    transaction_hash: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_quantity")]
    log_index: Option<u64>,
}

impl RawLog {
    fn into_log(self) -> Log {
        // Backends answer either with a `topics` array or with topic0..topic3.
        let topics: Vec<String> = if self.topics.is_empty() {
            [self.topic0, self.topic1, self.topic2, self.topic3]
                .into_iter()
                .map_while(|t| t)
                .collect()
        } else {
            self.topics.into_iter().map_while(|t| t).collect()
        };

        Log {
            address: self.address.to_ascii_lowercase(),
            topics: topics.into_iter().map(|t| t.to_ascii_lowercase()).collect(),
            data: self.data.unwrap_or_else(|| "0x".to_string()),
            block_number: self.block_number,
            transaction_hash: self.transaction_hash,
            log_index: self.log_index,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawTx {
    hash: String,
    from: String,
    #[serde(default)]
    to: Option<String>,
    #[serde(default)]
    contract_address: Option<String>,
    #[serde(deserialize_with = "deserialize_quantity")]
    block_number: u64,
    #[serde(default, deserialize_with = "deserialize_opt_quantity")]
    gas_used: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawBlock {
    #[serde(deserialize_with = "deserialize_quantity")]
    number: u64,
    #[serde(deserialize_with = "deserialize_quantity")]
    timestamp: u64,
}

#[derive(Debug, Deserialize)]
struct HeightResponse {
    #[serde(deserialize_with = "deserialize_quantity")]
    height: u64,
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: serde_json::Value,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// Records gathered by a paged query.
#[derive(Debug, Default)]
struct Paged {
    logs: Vec<Log>,
    txs: Vec<Tx>,
    partial: Option<PartialFailure>,
}

/// Which records a paged query collects.
#[derive(Debug, Clone, Copy)]
enum Records {
    Logs,
    Transactions,
}

/// Chain data client backed by a HyperSync-compatible service.
pub struct HyperSyncClient {
    http: reqwest::Client,
    config: HyperSyncConfig,
}

impl HyperSyncClient {
    pub fn new(config: HyperSyncConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        tracing::info!(
            target: "scout::etl::extractor::hypersync",
            url = %config.url,
            rpc_fallback = config.rpc_url.is_some(),
            max_blocks_per_query = config.max_blocks_per_query,
            "HyperSync client configured"
        );

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &HyperSyncConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.url.trim_end_matches('/'), path)
    }

    fn map_http_error(&self, e: reqwest::Error) -> ChainError {
        if e.is_timeout() {
            ChainError::Timeout(self.config.request_timeout)
        } else {
            ChainError::from(e)
        }
    }

    fn with_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn read_json<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ChainError> {
        let response = response
            .error_for_status()
            .map_err(|e| self.map_http_error(e))?;
        let body = response.bytes().await.map_err(|e| self.map_http_error(e))?;
        serde_json::from_slice(&body).map_err(|e| ChainError::Schema(e.to_string()))
    }

    async fn post_query(&self, query: &QueryRequest) -> Result<QueryResponse, ChainError> {
        let response = self
            .with_auth(self.http.post(self.endpoint("query")))
            .json(query)
            .send()
            .await
            .map_err(|e| self.map_http_error(e))?;
        self.read_json(response).await
    }

    async fn fetch_backend_height(&self) -> Result<u64, ChainError> {
        let response = self
            .with_auth(self.http.get(self.endpoint("height")))
            .send()
            .await
            .map_err(|e| self.map_http_error(e))?;
        let height: HeightResponse = self.read_json(response).await?;
        Ok(height.height)
    }

    async fn rpc_call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, ChainError> {
        let url = self
            .config
            .rpc_url
            .as_deref()
            .ok_or_else(|| ChainError::Unavailable(format!("no RPC endpoint for {method}")))?;

        let request = RpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: 1,
        };
        let response = self
            .http
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_http_error(e))?;
        let body: RpcResponse = self.read_json(response).await?;

        if let Some(err) = body.error {
            return Err(ChainError::Rejected {
                status: 200,
                message: format!("{method}: {} ({})", err.message, err.code),
            });
        }
        body.result
            .ok_or_else(|| ChainError::Schema(format!("{method}: missing result")))
    }

    fn build_query(
        &self,
        window_from: u64,
        window_to: u64,
        records: Records,
        log_filter: Option<&LogFilter>,
        tx_filter: Option<&TxFilter>,
    ) -> QueryRequest {
        let mut query = QueryRequest {
            from_block: window_from,
            to_block: window_to.saturating_add(1),
            logs: Vec::new(),
            transactions: Vec::new(),
            field_selection: FieldSelection::default(),
        };

        match records {
            Records::Logs => {
                let filter = log_filter.cloned().unwrap_or_default();
                query.logs.push(LogSelection {
                    address: filter.addresses,
                    topics: if filter.topics0.is_empty() {
                        Vec::new()
                    } else {
                        vec![filter.topics0]
                    },
                });
                query.field_selection.log = LOG_FIELDS.to_vec();
            }
            Records::Transactions => {
                let filter = tx_filter.cloned().unwrap_or_default();
                query.transactions.push(TxSelection {
                    from: filter.from,
                    to: filter.to,
                });
                query.field_selection.transaction = TX_FIELDS.to_vec();
                query.field_selection.block = BLOCK_FIELDS.to_vec();
            }
        }

        query
    }

    /// Walks `range` window by window, paging on `next_block` inside each window.
    ///
    /// Stops at the first page that still fails after retries and reports the
    /// rest of the range as failed.
    async fn fetch_paged(
        &self,
        range: BlockRange,
        records: Records,
        log_filter: Option<&LogFilter>,
        tx_filter: Option<&TxFilter>,
    ) -> Paged {
        let limit = match records {
            Records::Logs => log_filter.and_then(|f| f.limit),
            Records::Transactions => tx_filter.and_then(|f| f.limit),
        };
        let mut logs = Vec::new();
        let mut txs = Vec::new();

        for window in range.chunks(self.config.max_blocks_per_query) {
            let mut from = window.from;

            while from <= window.to {
                let query = self.build_query(from, window.to, records, log_filter, tx_filter);
                let page = self
                    .config
                    .retry_policy
                    .execute(|| self.post_query(&query))
                    .await
                    .and_then(|page| {
                        if page.next_block <= from {
                            Err(ChainError::Schema(format!(
                                "next_block {} does not advance past {from}",
                                page.next_block
                            )))
                        } else {
                            Ok(page)
                        }
                    });

                let page = match page {
                    Ok(page) => page,
                    Err(error) => {
                        let failed = BlockRange { from, to: range.to };
                        tracing::warn!(
                            target: "scout::etl::extractor::hypersync",
                            %failed,
                            error = %error,
                            "Range query failed, returning partial results"
                        );
                        return Paged {
                            logs,
                            txs,
                            partial: Some(PartialFailure { failed, error }),
                        };
                    }
                };

                for batch in page.data {
                    let timestamps: HashMap<u64, i64> = batch
                        .blocks
                        .iter()
                        .map(|b| (b.number, b.timestamp as i64))
                        .collect();

                    match records {
                        Records::Logs => logs.extend(
                            batch
                                .logs
                                .into_iter()
                                .map(RawLog::into_log)
                                .filter(|l| log_filter.is_none_or(|f| f.matches(l))),
                        ),
                        Records::Transactions => txs.extend(
                            batch
                                .transactions
                                .into_iter()
                                .map(|raw| Tx {
                                    hash: raw.hash,
                                    from: raw.from.to_ascii_lowercase(),
                                    to: raw.to.map(|a| a.to_ascii_lowercase()),
                                    contract_address: raw
                                        .contract_address
                                        .map(|a| a.to_ascii_lowercase()),
                                    block_number: raw.block_number,
                                    timestamp: timestamps.get(&raw.block_number).copied(),
                                    gas_used: raw.gas_used.unwrap_or(0),
                                })
                                .filter(|t| tx_filter.is_none_or(|f| f.matches(t))),
                        ),
                    }
                }

                if let Some(limit) = limit {
                    if logs.len() + txs.len() >= limit {
                        logs.truncate(limit);
                        txs.truncate(limit);
                        return Paged {
                            logs,
                            txs,
                            partial: None,
                        };
                    }
                }

                from = page.next_block;
            }
        }

        Paged {
            logs,
            txs,
            partial: None,
        }
    }
}

#[async_trait]
impl ChainDataClient for HyperSyncClient {
    async fn get_height(&self) -> Result<u64, ChainError> {
        let primary = self
            .config
            .retry_policy
            .execute(|| self.fetch_backend_height())
            .await;

        let primary_err = match primary {
            Ok(height) => return Ok(height),
            Err(e) => e,
        };

        tracing::warn!(
            target: "scout::etl::extractor::hypersync",
            error = %primary_err,
            "Backend height query failed, trying RPC fallback"
        );

        let fallback = self
            .config
            .retry_policy
            .execute(|| async {
                let result = self
                    .rpc_call("eth_blockNumber", serde_json::json!([]))
                    .await?;
                let hex = result
                    .as_str()
                    .ok_or_else(|| ChainError::Schema("eth_blockNumber: not a string".into()))?;
                parse_quantity(hex).map_err(|e| ChainError::Schema(e.to_string()))
            })
            .await;

        fallback.map_err(|fallback_err| {
            ChainError::Unavailable(format!(
                "backend: {primary_err}; rpc fallback: {fallback_err}"
            ))
        })
    }

    async fn query_logs(
        &self,
        range: BlockRange,
        filter: Option<&LogFilter>,
    ) -> Result<Fetched<Log>, ChainError> {
        let paged = self.fetch_paged(range, Records::Logs, filter, None).await;
        Ok(Fetched {
            items: paged.logs,
            partial: paged.partial,
        })
    }

    async fn query_transactions(
        &self,
        range: BlockRange,
        filter: Option<&TxFilter>,
    ) -> Result<Fetched<Tx>, ChainError> {
        let paged = self
            .fetch_paged(range, Records::Transactions, None, filter)
            .await;
        Ok(Fetched {
            items: paged.txs,
            partial: paged.partial,
        })
    }

    async fn get_code(&self, address: &str) -> Result<String, ChainError> {
        let result = self
            .config
            .retry_policy
            .execute(|| self.rpc_call("eth_getCode", serde_json::json!([address, "latest"])))
            .await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ChainError::Schema("eth_getCode: not a string".into()))
    }
}
