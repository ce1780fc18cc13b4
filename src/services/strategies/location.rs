use chrono::Utc;

use super::{rank_by_frequency, to_candidate, Strategy};
use crate::{
    db::Stores,
    error::AppResult,
    models::{ActionType, BehaviorQuery, Candidate, CatalogQuery, StrategyKind},
};

const SCORE: f64 = 0.8;

/// Upcoming items in cities where the user has bought tickets or attended before
pub struct LocationStrategy {
    stores: Stores,
}

impl LocationStrategy {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    /// Cities of the user's presence targets, most visited first
    async fn visited_cities(&self, user_id: &str) -> AppResult<Vec<String>> {
        let events = self
            .stores
            .behaviors
            .query_events(&BehaviorQuery::for_user(user_id).actions(&ActionType::PRESENCE))
            .await?;
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let target_ids: Vec<String> = events.iter().map(|e| e.target_id.clone()).collect();
        // Past and future targets both count as presence
        let targets = self
            .stores
            .catalog
            .query_items(&CatalogQuery {
                ids: target_ids.clone(),
                ..Default::default()
            })
            .await?;

        let cities = target_ids.iter().filter_map(|id| {
            targets
                .iter()
                .find(|item| &item.id == id)
                .map(|item| item.city.clone())
                .filter(|city| !city.is_empty())
        });
        Ok(rank_by_frequency(cities)
            .into_iter()
            .map(|(city, _)| city)
            .collect())
    }
}

#[async_trait::async_trait]
impl Strategy for LocationStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Location
    }

    async fn generate(&self, user_id: &str, limit: usize) -> AppResult<Vec<Candidate>> {
        let cities = self.visited_cities(user_id).await?;
        if cities.is_empty() {
            return Ok(Vec::new());
        }

        let items = self
            .stores
            .catalog
            .query_items(&CatalogQuery {
                cities,
                ..CatalogQuery::unseen_upcoming(user_id, Utc::now()).limit(limit)
            })
            .await?;

        Ok(items
            .into_iter()
            .map(|item| {
                let reason = format!("Near places you've been in {}", item.city);
                to_candidate(item, StrategyKind::Location, SCORE, reason)
            })
            .collect())
    }
}
