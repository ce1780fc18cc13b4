//! Candidate generators
//!
//! Each strategy reads one signal source and proposes upcoming catalog items
//! the user has never interacted with. Exclusion of already-seen items is
//! delegated to the catalog store through `CatalogQuery::exclude_seen_by`.
//! Strategies are independent of each other and side-effect free, so the
//! recommendation service runs them concurrently.

use std::{collections::HashMap, sync::Arc};

#[cfg(test)]
use mockall::automock;

use crate::{
    db::Stores,
    error::AppResult,
    models::{Candidate, Item, StrategyKind},
};

mod category;
mod collaborative;
mod content_based;
mod location;
mod popularity;
mod social;

pub use category::CategoryStrategy;
pub use collaborative::CollaborativeStrategy;
pub use content_based::ContentBasedStrategy;
pub use location::LocationStrategy;
pub use crate::models::PopularityWeights;
pub use popularity::PopularityStrategy;
pub use social::SocialStrategy;

/// A single recommendation signal source
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait Strategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Proposes at most `limit` candidates, best first.
    ///
    /// Returns an empty list when the user has no usable signal.
    async fn generate(&self, user_id: &str, limit: usize) -> AppResult<Vec<Candidate>>;
}

/// Wraps a catalog item as a candidate, clamping the score into [0, 1]
pub fn to_candidate(item: Item, strategy: StrategyKind, score: f64, reason: String) -> Candidate {
    let score = if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    };
    Candidate {
        target_id: item.id.clone(),
        strategy,
        score,
        reason,
        item,
    }
}

/// Counts occurrences, ordered by count desc then first appearance
pub(crate) fn rank_by_frequency<I, S>(values: I) -> Vec<(String, usize)>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    for (position, value) in values.into_iter().enumerate() {
        let entry = counts.entry(value.into()).or_insert((0, position));
        entry.0 += 1;
    }

    let mut ranked: Vec<(String, usize, usize)> = counts
        .into_iter()
        .map(|(value, (count, first_seen))| (value, count, first_seen))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.2.cmp(&b.2)));
    ranked
        .into_iter()
        .map(|(value, count, _)| (value, count))
        .collect()
}

/// Reorders `items` to follow `ranked_ids`, dropping items not listed
pub(crate) fn order_by_rank(items: Vec<Item>, ranked_ids: &[String]) -> Vec<Item> {
    let mut by_id: HashMap<String, Item> = items.into_iter().map(|i| (i.id.clone(), i)).collect();
    ranked_ids.iter().filter_map(|id| by_id.remove(id)).collect()
}

/// Builds the six production strategies over the given stores
pub fn default_strategies(
    stores: &Stores,
    weights: PopularityWeights,
    category_top_n: usize,
) -> Vec<Arc<dyn Strategy>> {
    vec![
        Arc::new(CollaborativeStrategy::new(stores.clone())),
        Arc::new(ContentBasedStrategy::new(stores.clone())),
        Arc::new(PopularityStrategy::new(stores.clone(), weights)),
        Arc::new(LocationStrategy::new(stores.clone())),
        Arc::new(CategoryStrategy::new(stores.clone(), category_top_n)),
        Arc::new(SocialStrategy::new(stores.clone())),
    ]
}
