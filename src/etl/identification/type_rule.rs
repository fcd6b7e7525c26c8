//! Contract type identification.
//!
//! Rules inspect runtime bytecode and recent events. They run in registration
//! order and the first one that recognizes the contract decides its type.

use crate::etl::extractor::Log;
use crate::etl::model::ContractType;

use super::signatures::{count_selectors, selectors, topics};

/// What a rule gets to look at.
#[derive(Debug, Clone, Copy)]
pub struct TypeEvidence<'a> {
    pub address: &'a str,
    /// Decoded runtime bytecode (empty for accounts without code).
    pub code: &'a [u8],
    pub events: &'a [Log],
}

impl TypeEvidence<'_> {
    pub fn is_empty(&self) -> bool {
        self.code.is_empty() && self.events.is_empty()
    }
}

/// Pluggable contract type rule.
///
/// # Example
///
/// ```rust,ignore
/// struct WethRule;
///
/// impl TypeRule for WethRule {
///     fn name(&self) -> &str { "weth" }
///
///     fn identify(&self, evidence: &TypeEvidence<'_>) -> Option<ContractType> {
///         (evidence.address == WETH).then_some(ContractType::Erc20)
///     }
/// }
/// ```
pub trait TypeRule: Send + Sync {
    /// Unique name for this rule (for logging).
    fn name(&self) -> &str;

    /// Returns the type if this rule recognizes the contract.
    fn identify(&self, evidence: &TypeEvidence<'_>) -> Option<ContractType>;
}

/// Matches when at least `threshold` of `selectors` appear in the bytecode.
pub struct SelectorRule {
    name: &'static str,
    contract_type: ContractType,
    selectors: &'static [[u8; 4]],
    threshold: usize,
}

impl SelectorRule {
    pub const fn new(
        name: &'static str,
        contract_type: ContractType,
        selectors: &'static [[u8; 4]],
        threshold: usize,
    ) -> Self {
        Self {
            name,
            contract_type,
            selectors,
            threshold,
        }
    }

    pub const fn erc20() -> Self {
        Self::new("erc20_selectors", ContractType::Erc20, &selectors::ERC20, 3)
    }

    pub const fn erc721() -> Self {
        Self::new("erc721_selectors", ContractType::Erc721, &selectors::ERC721, 3)
    }

    pub const fn erc1155() -> Self {
        Self::new("erc1155_selectors", ContractType::Erc1155, &selectors::ERC1155, 2)
    }
}

impl TypeRule for SelectorRule {
    fn name(&self) -> &str {
        self.name
    }

    fn identify(&self, evidence: &TypeEvidence<'_>) -> Option<ContractType> {
        (count_selectors(evidence.code, self.selectors) >= self.threshold)
            .then_some(self.contract_type)
    }
}

/// Reads the standard off the contract's own transfer events.
///
/// The latest `Transfer` decides by arity: ERC721 indexes the token id, so it
/// carries three topics after the signature where ERC20 carries two.
/// `TransferSingle` / `TransferBatch` mean ERC1155.
pub struct TransferEventRule;

impl TypeRule for TransferEventRule {
    fn name(&self) -> &str {
        "transfer_events"
    }

    fn identify(&self, evidence: &TypeEvidence<'_>) -> Option<ContractType> {
        let latest_transfer = evidence
            .events
            .iter()
            .filter(|log| log.topic0() == Some(topics::TRANSFER))
            .max_by_key(|log| (log.block_number, log.log_index));

        if let Some(log) = latest_transfer {
            match log.topics.len() {
                4 => return Some(ContractType::Erc721),
                3 => return Some(ContractType::Erc20),
                _ => {}
            }
        }

        evidence
            .events
            .iter()
            .any(|log| {
                matches!(
                    log.topic0(),
                    Some(topics::TRANSFER_SINGLE) | Some(topics::TRANSFER_BATCH)
                )
            })
            .then_some(ContractType::Erc1155)
    }
}

/// Runs type rules in order.
pub struct TypeClassifier {
    rules: Vec<Box<dyn TypeRule>>,
}

impl Default for TypeClassifier {
    /// Bytecode rules (ERC20 before ERC721 before ERC1155), then events.
    fn default() -> Self {
        Self::empty()
            .with_rule(Box::new(SelectorRule::erc20()))
            .with_rule(Box::new(SelectorRule::erc721()))
            .with_rule(Box::new(SelectorRule::erc1155()))
            .with_rule(Box::new(TransferEventRule))
    }
}

impl TypeClassifier {
    /// A classifier without rules.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn with_rule(mut self, rule: Box<dyn TypeRule>) -> Self {
        self.rules.push(rule);
        self
    }

    /// Classifies a contract from its `0x`-hex bytecode and recent events.
    ///
    /// Undecodable bytecode is treated as absent. Never fails: with nothing
    /// recognized the result is `Custom` when there is code or events, and
    /// `Unknown` otherwise.
    pub fn classify(&self, address: &str, bytecode: &str, recent_events: &[Log]) -> ContractType {
        let code = scout_common::decode_hex(bytecode).unwrap_or_else(|e| {
            tracing::debug!(
                target: "scout::etl::identification",
                address,
                error = %e,
                "Ignoring undecodable bytecode"
            );
            Vec::new()
        });

        let evidence = TypeEvidence {
            address,
            code: &code,
            events: recent_events,
        };

        for rule in &self.rules {
            if let Some(contract_type) = rule.identify(&evidence) {
                tracing::debug!(
                    target: "scout::etl::identification",
                    address,
                    rule = rule.name(),
                    contract_type = %contract_type,
                    "Identified contract type"
                );
                return contract_type;
            }
        }

        if evidence.is_empty() {
            ContractType::Unknown
        } else {
            ContractType::Custom
        }
    }
}
