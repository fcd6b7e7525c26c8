//! Contract identification.
//!
//! Two independent classifiers:
//! - [`TypeClassifier`] decides the technical standard from bytecode and events
//! - [`CategoryClassifier`] scores the business domain from observed event signatures
//!
//! # Usage
//!
//! ```rust,ignore
//! use scout::etl::identification::{CategoryClassifier, TypeClassifier};
//!
//! let contract_type = TypeClassifier::default().classify(&address, &bytecode, &logs);
//! let (category, confidence) = CategoryClassifier.classify(topics.iter().map(String::as_str));
//! ```

pub mod category;
pub mod signatures;
pub mod type_rule;

pub use category::{CategoryClassifier, CategorySignal};
pub use type_rule::{SelectorRule, TransferEventRule, TypeClassifier, TypeEvidence, TypeRule};
