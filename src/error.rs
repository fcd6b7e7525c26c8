use std::time::Duration;

use crate::etl::extractor::BlockRange;

/// Failures talking to the chain indexing backend.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChainError {
    #[error("Chain data unavailable: {0}")]
    Unavailable(String),
    #[error("Transient backend error: {0}")]
    Transient(String),
    #[error("Backend call timed out after {0:?}")]
    Timeout(Duration),
    #[error("Backend rejected request (status {status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Unexpected backend response: {0}")]
    Schema(String),
}

impl ChainError {
    /// Whether another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Timeout(_))
    }
}

impl From<reqwest::Error> for ChainError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return Self::Timeout(Duration::ZERO);
        }
        if e.is_decode() {
            return Self::Schema(e.to_string());
        }
        match e.status() {
            Some(status) if status.is_server_error() || status.as_u16() == 429 => {
                Self::Transient(e.to_string())
            }
            Some(status) => Self::Rejected {
                status: status.as_u16(),
                message: e.to_string(),
            },
            None => Self::Transient(e.to_string()),
        }
    }
}

/// Errors surfaced by discovery components.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("A discovery scan is already running")]
    AlreadyRunning,
    #[error("Remote call failed: {0}")]
    TransientRemote(ChainError),
    #[error("Blocks {failed} could not be fetched: {source}")]
    PartialFailure {
        failed: BlockRange,
        source: ChainError,
    },
    #[error("Not found: {0}")]
    LookupNotFound(String),
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Gave up creating group '{key}' after {attempts} conflicting attempts")]
    ConcurrencyConflict { key: String, attempts: u32 },
    #[error("Fatal: {0}")]
    Fatal(String),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl From<ChainError> for DiscoveryError {
    fn from(e: ChainError) -> Self {
        match e {
            ChainError::Unavailable(msg) => Self::Fatal(msg),
            other => Self::TransientRemote(other),
        }
    }
}

impl From<scout_common::FormatError> for DiscoveryError {
    fn from(e: scout_common::FormatError) -> Self {
        Self::Validation(e.to_string())
    }
}

pub type DiscoveryResult<T> = Result<T, DiscoveryError>;
