use chrono::Utc;

use super::{rank_by_frequency, to_candidate, Strategy};
use crate::{
    db::Stores,
    error::AppResult,
    models::{ActionType, BehaviorOrder, BehaviorQuery, Candidate, CatalogQuery, StrategyKind},
};

const SCORE: f64 = 0.85;

/// Upcoming items in the categories the user browses the most
pub struct CategoryStrategy {
    stores: Stores,
    top_n: usize,
}

impl CategoryStrategy {
    pub fn new(stores: Stores, top_n: usize) -> Self {
        Self { stores, top_n }
    }

    /// Most viewed categories; ties keep the order they were first viewed in
    async fn top_categories(&self, user_id: &str) -> AppResult<Vec<String>> {
        let views = self
            .stores
            .behaviors
            .query_events(
                &BehaviorQuery::for_user(user_id)
                    .actions(&[ActionType::View])
                    .order(BehaviorOrder::OldestFirst),
            )
            .await?;
        if views.is_empty() {
            return Ok(Vec::new());
        }

        let target_ids: Vec<String> = views.iter().map(|e| e.target_id.clone()).collect();
        let viewed = self
            .stores
            .catalog
            .query_items(&CatalogQuery {
                ids: target_ids.clone(),
                ..Default::default()
            })
            .await?;

        let categories = target_ids.iter().filter_map(|id| {
            viewed
                .iter()
                .find(|item| &item.id == id)
                .map(|item| item.category.clone())
                .filter(|c| !c.is_empty())
        });
        Ok(rank_by_frequency(categories)
            .into_iter()
            .take(self.top_n)
            .map(|(category, _)| category)
            .collect())
    }
}

#[async_trait::async_trait]
impl Strategy for CategoryStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Category
    }

    async fn generate(&self, user_id: &str, limit: usize) -> AppResult<Vec<Candidate>> {
        let categories = self.top_categories(user_id).await?;
        if categories.is_empty() {
            return Ok(Vec::new());
        }
        tracing::debug!(user_id = %user_id, categories = ?categories, "Top viewed categories");

        let items = self
            .stores
            .catalog
            .query_items(&CatalogQuery {
                categories,
                ..CatalogQuery::unseen_upcoming(user_id, Utc::now()).limit(limit)
            })
            .await?;

        Ok(items
            .into_iter()
            .map(|item| {
                let reason = format!("Because you often browse {}", item.category);
                to_candidate(item, StrategyKind::Category, SCORE, reason)
            })
            .collect())
    }
}
