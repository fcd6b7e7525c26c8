//! Business category scoring from observed event signatures.

use std::collections::HashSet;

use crate::etl::model::Category;

use super::signatures::topics;

/// Points awarded to `category` when every topic in `all_of` was observed.
#[derive(Debug, Clone, Copy)]
pub struct CategorySignal {
    pub category: Category,
    pub all_of: &'static [&'static str],
    pub points: u32,
}

const fn signal(category: Category, all_of: &'static [&'static str], points: u32) -> CategorySignal {
    CategorySignal {
        category,
        all_of,
        points,
    }
}

/// Categories that can win, in tie-break order.
///
/// `GameFi`, `Bridge`, `Social` and `Infra` have no signals yet.
pub const SCORED_CATEGORIES: [Category; 5] = [
    Category::Dex,
    Category::Token,
    Category::Nft,
    Category::Defi,
    Category::Governance,
];

pub const SIGNALS: &[CategorySignal] = &[
    signal(Category::Dex, &[topics::SWAP], 10),
    signal(Category::Dex, &[topics::SYNC], 5),
    signal(Category::Dex, &[topics::MINT, topics::BURN], 5),
    signal(Category::Token, &[topics::TRANSFER], 10),
    signal(Category::Token, &[topics::APPROVAL], 5),
    signal(Category::Nft, &[topics::TRANSFER_SINGLE], 10),
    signal(Category::Nft, &[topics::TRANSFER_BATCH], 10),
    signal(Category::Defi, &[topics::DEPOSIT], 7),
    signal(Category::Defi, &[topics::WITHDRAW], 7),
    signal(Category::Defi, &[topics::STAKE], 8),
    signal(Category::Governance, &[topics::PROPOSAL_CREATED], 10),
    signal(Category::Governance, &[topics::VOTE_CAST], 10),
];

/// Scores a set of `topic0` values against [`SIGNALS`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CategoryClassifier;

impl CategoryClassifier {
    /// Per-category points, in [`SCORED_CATEGORIES`] order.
    pub fn scores<'a>(&self, topic_set: impl IntoIterator<Item = &'a str>) -> [u32; 5] {
        let observed: HashSet<&str> = topic_set.into_iter().collect();
        let mut scores = [0u32; SCORED_CATEGORIES.len()];

        for s in SIGNALS {
            if s.all_of.iter().all(|t| observed.contains(t)) {
                if let Some(i) = SCORED_CATEGORIES.iter().position(|c| *c == s.category) {
                    scores[i] += s.points;
                }
            }
        }

        scores
    }

    /// Best category and a confidence in `[0, 1]`.
    ///
    /// The earlier category wins a tie. No matching signal gives
    /// `(Unknown, 0.0)`.
    pub fn classify<'a>(&self, topic_set: impl IntoIterator<Item = &'a str>) -> (Category, f64) {
        let scores = self.scores(topic_set);

        let mut best = (Category::Unknown, 0u32);
        for (category, score) in SCORED_CATEGORIES.iter().zip(scores) {
            if score > best.1 {
                best = (*category, score);
            }
        }

        let confidence = (f64::from(best.1) / 10.0).min(1.0);
        (best.0, confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_sync_is_dex() {
        let (category, confidence) =
            CategoryClassifier.classify([topics::SWAP, topics::SYNC, topics::TRANSFER]);
        assert_eq!(category, Category::Dex);
        assert_eq!(confidence, 1.0);
    }

    #[test]
    fn test_mint_needs_burn() {
        let scores = CategoryClassifier.scores([topics::MINT]);
        assert_eq!(scores[0], 0);
        let scores = CategoryClassifier.scores([topics::MINT, topics::BURN]);
        assert_eq!(scores[0], 5);
    }

    #[test]
    fn test_tie_goes_to_earlier_category() {
        // TOKEN 10 vs NFT 10
        let (category, _) = CategoryClassifier.classify([topics::TRANSFER, topics::TRANSFER_SINGLE]);
        assert_eq!(category, Category::Token);
    }

    #[test]
    fn test_partial_confidence_and_unknown() {
        let (category, confidence) = CategoryClassifier.classify([topics::DEPOSIT]);
        assert_eq!(category, Category::Defi);
        assert!((confidence - 0.7).abs() < 1e-9);

        assert_eq!(CategoryClassifier.classify(["0xdeadbeef"]), (Category::Unknown, 0.0));
        assert_eq!(CategoryClassifier.classify([]), (Category::Unknown, 0.0));
    }

    #[test]
    fn test_deterministic_regardless_of_order() {
        let a = CategoryClassifier.classify([topics::STAKE, topics::VOTE_CAST, topics::APPROVAL]);
        let b = CategoryClassifier.classify([topics::APPROVAL, topics::VOTE_CAST, topics::STAKE]);
        assert_eq!(a, b);
        assert_eq!(a.0, Category::Governance);
    }
}
