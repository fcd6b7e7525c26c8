//! Application grouping.
//!
//! Contracts sharing a creator belong to the same application. Contracts
//! deployed through a shared generic factory are grouped together even when
//! they belong to unrelated products.

use std::sync::Arc;

use crate::error::{DiscoveryError, DiscoveryResult};
use crate::etl::engine_db::EngineDb;
use crate::etl::model::{Application, ApplicationStatus, Category, Confidence, Contract};

/// Deterministic application id for a group key.
pub fn application_id(group_key: &str) -> String {
    let hash = blake3::hash(group_key.as_bytes()).to_hex();
    format!("app_{}", &hash[..16])
}

/// Display name given to a new application.
pub fn application_name(category: Category, group_key: &str) -> String {
    format!(
        "{} {}",
        category.name_label(),
        scout_common::short_address(group_key)
    )
}

/// Result of attaching a contract to its application.
#[derive(Debug, Clone)]
pub struct Grouped {
    pub application: Application,
    /// True if the application was created by this call.
    pub created: bool,
}

pub struct ApplicationGrouper {
    db: Arc<EngineDb>,
    max_conflict_retries: u32,
}

impl ApplicationGrouper {
    pub fn new(db: Arc<EngineDb>, max_conflict_retries: u32) -> Self {
        Self {
            db,
            max_conflict_retries: max_conflict_retries.max(1),
        }
    }

    /// Attaches `contract` to the application keyed by its creator.
    ///
    /// Creates the application on first sight. An existing application still
    /// in `Unknown` adopts `category`, and its grouping confidence becomes
    /// exact once an exactly attributed contract joins.
    pub async fn group_contract(
        &self,
        contract: &Contract,
        category: Category,
        category_confidence: f64,
    ) -> DiscoveryResult<Grouped> {
        let group_key = contract
            .creator_address
            .clone()
            .unwrap_or_else(|| contract.address.clone());

        let (mut application, created) = self
            .find_or_create(&group_key, contract, category, category_confidence)
            .await?;

        if !created {
            if application.category == Category::Unknown && category != Category::Unknown {
                self.db
                    .update_application_category(&application.id, category, category_confidence)
                    .await?;
                application.category = category;
                application.category_confidence = category_confidence;
                tracing::debug!(
                    target: "scout::etl::grouping",
                    application_id = %application.id,
                    %category,
                    "Application category resolved"
                );
            }

            if contract.creator_confidence == Confidence::Exact
                && application.grouping_confidence == Confidence::Approximated
            {
                self.db
                    .update_grouping_confidence(&application.id, Confidence::Exact)
                    .await?;
                application.grouping_confidence = Confidence::Exact;
            }
        }

        self.db
            .assign_contract(&contract.address, &application.id)
            .await?;

        Ok(Grouped {
            application,
            created,
        })
    }

    async fn find_or_create(
        &self,
        group_key: &str,
        contract: &Contract,
        category: Category,
        category_confidence: f64,
    ) -> DiscoveryResult<(Application, bool)> {
        for attempt in 1..=self.max_conflict_retries {
            if let Some(existing) = self.db.get_application_by_key(group_key).await? {
                return Ok((existing, false));
            }

            let now = chrono::Utc::now().timestamp();
            let candidate = Application {
                id: application_id(group_key),
                group_key: group_key.to_string(),
                name: application_name(category, group_key),
                category,
                category_confidence,
                status: ApplicationStatus::Inactive,
                quality_score: 0.0,
                activity_score: 0.0,
                diversity_score: 0.0,
                age_score: 0.0,
                grouping_confidence: contract.creator_confidence,
                created_at: now,
                updated_at: now,
            };

            if self.db.insert_application_if_absent(&candidate).await? {
                tracing::info!(
                    target: "scout::etl::grouping",
                    application_id = %candidate.id,
                    name = %candidate.name,
                    "New application"
                );
                return Ok((candidate, true));
            }

            tracing::debug!(
                target: "scout::etl::grouping",
                group_key,
                attempt,
                "Application insert lost a race, re-reading"
            );
        }

        Err(DiscoveryError::ConcurrencyConflict {
            key: group_key.to_string(),
            attempts: self.max_conflict_retries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::etl::engine_db::{EngineDbConfig, NewContract};

    const DEPLOYER: &str = "0x1111111111111111111111111111111111111111";
    const TOKEN: &str = "0x2222222222222222222222222222222222222222";
    const POOL: &str = "0x3333333333333333333333333333333333333333";
    const LONER: &str = "0x4444444444444444444444444444444444444444";

    async fn store_contract(db: &EngineDb, address: &str, creator: &str, confidence: Confidence) -> Contract {
        db.insert_contract_if_absent(&NewContract {
            address: address.to_string(),
            creator_address: Some(creator.to_string()),
            creator_confidence: confidence,
            deployment_block: 1,
            deployment_time: None,
        })
        .await
        .unwrap();
        db.get_contract(address).await.unwrap().unwrap()
    }

    #[test]
    fn test_id_and_name() {
        let id = application_id(DEPLOYER);
        assert!(id.starts_with("app_"));
        assert_eq!(id.len(), 20);
        assert_eq!(id, application_id(DEPLOYER));

        assert_eq!(application_name(Category::Defi, DEPLOYER), "DEFI 0x1111...1111");
        assert_eq!(
            application_name(Category::Unknown, DEPLOYER),
            "Contract 0x1111...1111"
        );
    }

    #[tokio::test]
    async fn test_shared_creator_shares_application() {
        let db = Arc::new(EngineDb::new(EngineDbConfig::in_memory()).await.unwrap());
        let grouper = ApplicationGrouper::new(db.clone(), 3);

        let token = store_contract(&db, TOKEN, DEPLOYER, Confidence::Exact).await;
        let pool = store_contract(&db, POOL, DEPLOYER, Confidence::Exact).await;

        let first = grouper.group_contract(&token, Category::Unknown, 0.0).await.unwrap();
        assert!(first.created);
        assert_eq!(first.application.name, "Contract 0x1111...1111");

        let second = grouper.group_contract(&pool, Category::Dex, 1.0).await.unwrap();
        assert!(!second.created);
        assert_eq!(second.application.id, first.application.id);
        assert_eq!(second.application.category, Category::Dex);

        let stored = db.get_application(&first.application.id).await.unwrap().unwrap();
        assert_eq!(stored.category, Category::Dex);
        assert_eq!(db.contracts_for_application(&stored.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_known_category_is_kept() {
        let db = Arc::new(EngineDb::new(EngineDbConfig::in_memory()).await.unwrap());
        let grouper = ApplicationGrouper::new(db.clone(), 3);

        let token = store_contract(&db, TOKEN, DEPLOYER, Confidence::Exact).await;
        let pool = store_contract(&db, POOL, DEPLOYER, Confidence::Exact).await;

        grouper.group_contract(&token, Category::Token, 1.0).await.unwrap();
        let grouped = grouper.group_contract(&pool, Category::Dex, 1.0).await.unwrap();
        assert_eq!(grouped.application.category, Category::Token);
    }

    #[tokio::test]
    async fn test_approximated_creator_upgrades() {
        let db = Arc::new(EngineDb::new(EngineDbConfig::in_memory()).await.unwrap());
        let grouper = ApplicationGrouper::new(db.clone(), 3);

        // Stands in for its own creator
        let loner = store_contract(&db, LONER, LONER, Confidence::Approximated).await;
        let grouped = grouper.group_contract(&loner, Category::Unknown, 0.0).await.unwrap();
        assert_eq!(grouped.application.group_key, LONER);
        assert_eq!(grouped.application.grouping_confidence, Confidence::Approximated);

        // A contract deployed by the same address attaches exactly
        let child = store_contract(&db, TOKEN, LONER, Confidence::Exact).await;
        let grouped = grouper.group_contract(&child, Category::Unknown, 0.0).await.unwrap();
        assert_eq!(grouped.application.grouping_confidence, Confidence::Exact);
        let stored = db.get_application(&grouped.application.id).await.unwrap().unwrap();
        assert_eq!(stored.grouping_confidence, Confidence::Exact);
    }

    #[tokio::test]
    async fn test_concurrent_grouping_creates_one_application() {
        let db = Arc::new(EngineDb::new(EngineDbConfig::in_memory()).await.unwrap());
        let grouper = Arc::new(ApplicationGrouper::new(db.clone(), 3));

        let mut contracts = Vec::new();
        for i in 0..8u8 {
            let address = format!("0x{:040x}", 0x100 + u32::from(i));
            contracts.push(store_contract(&db, &address, DEPLOYER, Confidence::Exact).await);
        }

        let handles: Vec<_> = contracts
            .into_iter()
            .map(|contract| {
                let grouper = grouper.clone();
                tokio::spawn(async move {
                    grouper.group_contract(&contract, Category::Unknown, 0.0).await
                })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().created {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(db.count_applications(None).await.unwrap(), 1);
    }
}
