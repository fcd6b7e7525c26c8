//! Application quality scoring.
//!
//! Three components on a 0-10 scale, weighted into a total:
//! - activity: transactions and events over the trailing week, log-scaled
//! - diversity: distinct event signatures and contract types
//! - age: days since first activity, saturating at 90 days

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::DiscoveryResult;
use crate::etl::activity::status_window_start;
use crate::etl::engine_db::{EngineDb, StoredScores};
use crate::etl::model::ContractType;
use scout_common::DAY_SECS;

const MAX_COMPONENT: f64 = 10.0;
const ACTIVITY_WEIGHT: f64 = 0.5;
const DIVERSITY_WEIGHT: f64 = 0.3;
const AGE_WEIGHT: f64 = 0.2;

/// Raw measurements a score is computed from.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScoreInputs {
    pub recent_transactions: u64,
    pub recent_events: u64,
    pub distinct_topics: usize,
    /// Distinct identified types (`Unknown` excluded).
    pub distinct_types: usize,
    pub age_days: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    pub activity: f64,
    pub diversity: f64,
    pub age: f64,
    pub total: f64,
}

impl From<QualityScore> for StoredScores {
    fn from(s: QualityScore) -> Self {
        Self {
            quality: s.total,
            activity: s.activity,
            diversity: s.diversity,
            age: s.age,
        }
    }
}

pub struct QualityScorer {
    db: Arc<EngineDb>,
}

impl QualityScorer {
    pub fn new(db: Arc<EngineDb>) -> Self {
        Self { db }
    }

    /// Combines inputs into a score. Every component is non-decreasing in
    /// its inputs and capped at 10.
    pub fn combine(inputs: ScoreInputs) -> QualityScore {
        let volume = (inputs.recent_transactions + inputs.recent_events) as f64;
        let activity = (2.5 * (1.0 + volume).log10()).min(MAX_COMPONENT);
        let diversity = (1.5 * inputs.distinct_topics as f64 + inputs.distinct_types as f64)
            .min(MAX_COMPONENT);
        let age = (inputs.age_days.max(0.0) / 9.0).min(MAX_COMPONENT);

        QualityScore {
            activity,
            diversity,
            age,
            total: ACTIVITY_WEIGHT * activity + DIVERSITY_WEIGHT * diversity + AGE_WEIGHT * age,
        }
    }

    /// Gathers the application's measurements from the store.
    pub async fn inputs(&self, application_id: &str) -> DiscoveryResult<ScoreInputs> {
        let recent = self
            .db
            .snapshots_since(application_id, status_window_start())
            .await?;
        let topics = self.db.application_topics(application_id).await?;
        let contracts = self.db.contracts_for_application(application_id).await?;

        let distinct_types = contracts
            .iter()
            .map(|c| c.contract_type)
            .filter(|t| *t != ContractType::Unknown)
            .collect::<HashSet<_>>()
            .len();

        let first_deployment = contracts.iter().filter_map(|c| c.deployment_time).min();
        let first_snapshot = self.db.first_snapshot_day(application_id).await?;
        let first_activity = match (first_deployment, first_snapshot) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        let age_days = first_activity.map_or(0.0, |first| {
            (chrono::Utc::now().timestamp() - first).max(0) as f64 / DAY_SECS as f64
        });

        Ok(ScoreInputs {
            recent_transactions: recent.iter().map(|s| s.tx_count).sum(),
            recent_events: recent.iter().map(|s| s.event_count).sum(),
            distinct_topics: topics.len(),
            distinct_types,
            age_days,
        })
    }

    pub async fn score(&self, application_id: &str) -> DiscoveryResult<QualityScore> {
        Ok(Self::combine(self.inputs(application_id).await?))
    }

    /// Scores the application and stores all four values.
    pub async fn score_and_store(&self, application_id: &str) -> DiscoveryResult<QualityScore> {
        let score = self.score(application_id).await?;
        self.db
            .update_application_scores(application_id, score.into())
            .await?;
        tracing::debug!(
            target: "scout::etl::scoring",
            application_id,
            quality = score.total,
            "Quality score updated"
        );
        Ok(score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::etl::engine_db::{EngineDbConfig, NewContract};
    use crate::etl::grouping::ApplicationGrouper;
    use crate::etl::model::{ActivitySnapshot, Category, Confidence};

    #[test]
    fn test_zero_inputs() {
        let score = QualityScorer::combine(ScoreInputs::default());
        assert_eq!(score.total, 0.0);
    }

    #[test]
    fn test_components_saturate() {
        let score = QualityScorer::combine(ScoreInputs {
            recent_transactions: 10_000_000,
            recent_events: 10_000_000,
            distinct_topics: 50,
            distinct_types: 5,
            age_days: 365.0,
        });
        assert_eq!(score.activity, 10.0);
        assert_eq!(score.diversity, 10.0);
        assert_eq!(score.age, 10.0);
        assert!((score.total - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_known_values() {
        let score = QualityScorer::combine(ScoreInputs {
            recent_transactions: 90,
            recent_events: 9,
            distinct_topics: 2,
            distinct_types: 1,
            age_days: 45.0,
        });
        assert!((score.activity - 5.0).abs() < 1e-9);
        assert!((score.diversity - 4.0).abs() < 1e-9);
        assert!((score.age - 5.0).abs() < 1e-9);
        assert!((score.total - 4.7).abs() < 1e-9);
    }

    #[test]
    fn test_monotonic_in_each_input() {
        let base = ScoreInputs {
            recent_transactions: 10,
            recent_events: 3,
            distinct_topics: 1,
            distinct_types: 1,
            age_days: 4.0,
        };
        let base_total = QualityScorer::combine(base).total;

        let bumps = [
            ScoreInputs { recent_transactions: 11, ..base },
            ScoreInputs { recent_events: 30, ..base },
            ScoreInputs { distinct_topics: 2, ..base },
            ScoreInputs { distinct_types: 2, ..base },
            ScoreInputs { age_days: 5.0, ..base },
        ];
        for bumped in bumps {
            assert!(QualityScorer::combine(bumped).total >= base_total);
        }
    }

    #[tokio::test]
    async fn test_score_and_store() {
        let db = Arc::new(EngineDb::new(EngineDbConfig::in_memory()).await.unwrap());
        let deployer = "0x1111111111111111111111111111111111111111";
        let token = "0x2222222222222222222222222222222222222222";

        db.insert_contract_if_absent(&NewContract {
            address: token.to_string(),
            creator_address: Some(deployer.to_string()),
            creator_confidence: Confidence::Exact,
            deployment_block: 1,
            deployment_time: Some(chrono::Utc::now().timestamp() - 18 * DAY_SECS),
        })
        .await
        .unwrap();
        db.set_contract_type(token, ContractType::Erc20).await.unwrap();
        let contract = db.get_contract(token).await.unwrap().unwrap();
        let app = ApplicationGrouper::new(db.clone(), 3)
            .group_contract(&contract, Category::Token, 1.0)
            .await
            .unwrap()
            .application;

        db.record_topics(&app.id, &["0xaa".to_string(), "0xbb".to_string()])
            .await
            .unwrap();
        db.upsert_snapshot(&ActivitySnapshot {
            application_id: app.id.clone(),
            day: scout_common::today_start(),
            tx_count: 99,
            user_count: 3,
            event_count: 0,
            gas_used: 0,
        })
        .await
        .unwrap();

        let scorer = QualityScorer::new(db.clone());
        let score = scorer.score_and_store(&app.id).await.unwrap();
        assert!((score.activity - 5.0).abs() < 1e-9);
        assert!((score.diversity - 4.0).abs() < 1e-9);
        assert!((score.age - 2.0).abs() < 0.01);

        let stored = db.get_application(&app.id).await.unwrap().unwrap();
        assert!((stored.quality_score - score.total).abs() < 1e-9);
        assert!((stored.age_score - score.age).abs() < 1e-9);
    }
}
