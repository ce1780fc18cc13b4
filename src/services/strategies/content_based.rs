use chrono::Utc;

use super::{to_candidate, Strategy};
use crate::{
    db::Stores,
    error::AppResult,
    models::{Candidate, CatalogQuery, StrategyKind},
};

const SCORE: f64 = 0.9;

/// Upcoming items in the user's declared favorite categories
pub struct ContentBasedStrategy {
    stores: Stores,
}

impl ContentBasedStrategy {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }
}

#[async_trait::async_trait]
impl Strategy for ContentBasedStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ContentBased
    }

    async fn generate(&self, user_id: &str, limit: usize) -> AppResult<Vec<Candidate>> {
        let favorites = self.stores.preferences.favorite_categories(user_id).await?;
        if favorites.is_empty() {
            return Ok(Vec::new());
        }

        let items = self
            .stores
            .catalog
            .query_items(&CatalogQuery {
                categories: favorites,
                ..CatalogQuery::unseen_upcoming(user_id, Utc::now()).limit(limit)
            })
            .await?;

        Ok(items
            .into_iter()
            .map(|item| {
                let reason = format!("Matches your interest in {}", item.category);
                to_candidate(item, StrategyKind::ContentBased, SCORE, reason)
            })
            .collect())
    }
}
