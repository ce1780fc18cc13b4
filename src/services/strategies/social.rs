use chrono::Utc;
use std::collections::HashMap;

use super::{order_by_rank, rank_by_frequency, to_candidate, Strategy};
use crate::{
    db::{ConnectionStatus, Stores},
    error::AppResult,
    models::{ActionType, BehaviorQuery, Candidate, CatalogQuery, StrategyKind},
};

const SCORE: f64 = 0.9;

/// Upcoming items the user's accepted connections are going to or went to
pub struct SocialStrategy {
    stores: Stores,
}

impl SocialStrategy {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }
}

#[async_trait::async_trait]
impl Strategy for SocialStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Social
    }

    async fn generate(&self, user_id: &str, limit: usize) -> AppResult<Vec<Candidate>> {
        let friends = self
            .stores
            .social
            .connections(user_id, ConnectionStatus::Accepted)
            .await?;
        if friends.is_empty() {
            return Ok(Vec::new());
        }

        let events = self
            .stores
            .behaviors
            .query_events(&BehaviorQuery::for_users(friends).actions(&ActionType::PRESENCE))
            .await?;
        let ranked = rank_by_frequency(events.into_iter().map(|e| e.target_id));
        if ranked.is_empty() {
            return Ok(Vec::new());
        }

        let ranked_ids: Vec<String> = ranked.iter().map(|(id, _)| id.clone()).collect();
        let items = self
            .stores
            .catalog
            .query_items(&CatalogQuery {
                ids: ranked_ids.clone(),
                ..CatalogQuery::unseen_upcoming(user_id, Utc::now())
            })
            .await?;

        let going: HashMap<String, usize> = ranked.into_iter().collect();
        Ok(order_by_rank(items, &ranked_ids)
            .into_iter()
            .take(limit)
            .map(|item| {
                let reason = match going.get(&item.id).copied().unwrap_or(1) {
                    1 => "A friend is going".to_string(),
                    n => format!("{} friends are going", n),
                };
                to_candidate(item, StrategyKind::Social, SCORE, reason)
            })
            .collect())
    }
}
