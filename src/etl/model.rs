//! Domain records persisted by the engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Technical standard a contract implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractType {
    #[serde(rename = "ERC20")]
    Erc20,
    #[serde(rename = "ERC721")]
    Erc721,
    #[serde(rename = "ERC1155")]
    Erc1155,
    #[serde(rename = "CUSTOM")]
    Custom,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl ContractType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Erc20 => "ERC20",
            Self::Erc721 => "ERC721",
            Self::Erc1155 => "ERC1155",
            Self::Custom => "CUSTOM",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// Business domain of an application.
///
/// `GameFi`, `Bridge`, `Social` and `Infra` are part of the vocabulary but no
/// rule currently scores them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "DEX")]
    Dex,
    #[serde(rename = "TOKEN")]
    Token,
    #[serde(rename = "NFT")]
    Nft,
    #[serde(rename = "DEFI")]
    Defi,
    #[serde(rename = "GOVERNANCE")]
    Governance,
    #[serde(rename = "GAMEFI")]
    GameFi,
    #[serde(rename = "BRIDGE")]
    Bridge,
    #[serde(rename = "SOCIAL")]
    Social,
    #[serde(rename = "INFRA")]
    Infra,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dex => "DEX",
            Self::Token => "TOKEN",
            Self::Nft => "NFT",
            Self::Defi => "DEFI",
            Self::Governance => "GOVERNANCE",
            Self::GameFi => "GAMEFI",
            Self::Bridge => "BRIDGE",
            Self::Social => "SOCIAL",
            Self::Infra => "INFRA",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Label used when naming a freshly grouped application.
    pub fn name_label(&self) -> &'static str {
        match self {
            Self::Unknown => "Contract",
            other => other.as_str(),
        }
    }
}

/// Usage status derived from the trailing activity window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApplicationStatus {
    #[serde(rename = "ACTIVE")]
    Active,
    #[serde(rename = "DORMANT")]
    Dormant,
    #[serde(rename = "INACTIVE")]
    Inactive,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Dormant => "DORMANT",
            Self::Inactive => "INACTIVE",
        }
    }
}

/// How a contract's creator (and so its grouping) was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Confidence {
    /// Creator read from the deployment transaction.
    #[serde(rename = "EXACT")]
    Exact,
    /// No deployment found; the contract stands in for its own creator.
    #[serde(rename = "APPROXIMATED")]
    Approximated,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "EXACT",
            Self::Approximated => "APPROXIMATED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

macro_rules! impl_str_enum {
    ($ty:ty, $kind:literal, [$($variant:expr),+ $(,)?]) => {
        impl FromStr for $ty {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                [$($variant),+]
                    .into_iter()
                    .find(|v| v.as_str() == s)
                    .ok_or_else(|| ParseEnumError { kind: $kind, value: s.to_string() })
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

impl_str_enum!(
    ContractType,
    "contract type",
    [
        ContractType::Erc20,
        ContractType::Erc721,
        ContractType::Erc1155,
        ContractType::Custom,
        ContractType::Unknown,
    ]
);
impl_str_enum!(
    Category,
    "category",
    [
        Category::Dex,
        Category::Token,
        Category::Nft,
        Category::Defi,
        Category::Governance,
        Category::GameFi,
        Category::Bridge,
        Category::Social,
        Category::Infra,
        Category::Unknown,
    ]
);
impl_str_enum!(
    ApplicationStatus,
    "status",
    [
        ApplicationStatus::Active,
        ApplicationStatus::Dormant,
        ApplicationStatus::Inactive,
    ]
);
impl_str_enum!(
    Confidence,
    "confidence",
    [Confidence::Exact, Confidence::Approximated]
);

/// A deployed contract known to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub address: String,
    pub contract_type: ContractType,
    pub creator_address: Option<String>,
    pub creator_confidence: Confidence,
    pub deployment_block: u64,
    pub deployment_time: Option<i64>,
    pub application_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A logical product made of one or more contracts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: String,
    pub group_key: String,
    pub name: String,
    pub category: Category,
    pub category_confidence: f64,
    pub status: ApplicationStatus,
    pub quality_score: f64,
    pub activity_score: f64,
    pub diversity_score: f64,
    pub age_score: f64,
    pub grouping_confidence: Confidence,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Usage of one application over one UTC day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivitySnapshot {
    pub application_id: String,
    /// Unix seconds of the UTC midnight opening the day.
    pub day: i64,
    pub tx_count: u64,
    pub user_count: u64,
    pub event_count: u64,
    pub gas_used: u64,
}

/// Lifecycle of a discovery scan as reported to observers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    #[default]
    Idle,
    Scanning,
    Completed,
    Error,
    Stopped,
}

/// Snapshot of the current (or last) scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanProgress {
    pub current_unit: u64,
    pub total_units: u64,
    /// Applications announced during this run.
    pub discovered_count: u64,
    /// Contracts first recorded during this run.
    pub contracts_found: u64,
    pub current_block: u64,
    pub percent: f64,
    pub status: ScanStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
