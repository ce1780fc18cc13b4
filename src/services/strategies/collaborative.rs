use chrono::Utc;
use std::collections::HashSet;

use super::{order_by_rank, rank_by_frequency, to_candidate, Strategy};
use crate::{
    db::Stores,
    error::AppResult,
    models::{ActionType, BehaviorQuery, Candidate, CatalogQuery, StrategyKind},
};

const SCORE: f64 = 0.8;
/// Most-similar users whose history is consulted
const MAX_PEERS: usize = 50;
const PEER_SCAN_LIMIT: usize = 1000;

/// "People who went to what you went to also went to..."
pub struct CollaborativeStrategy {
    stores: Stores,
}

impl CollaborativeStrategy {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }
}

#[async_trait::async_trait]
impl Strategy for CollaborativeStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Collaborative
    }

    async fn generate(&self, user_id: &str, limit: usize) -> AppResult<Vec<Candidate>> {
        let mine = self
            .stores
            .behaviors
            .query_events(&BehaviorQuery::for_user(user_id).actions(&ActionType::HIGH_VALUE))
            .await?;
        if mine.is_empty() {
            return Ok(Vec::new());
        }

        let my_targets: Vec<String> = mine
            .iter()
            .map(|e| e.target_id.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        // Users sharing high-value actions on the same targets, most overlap first
        let overlaps = self
            .stores
            .behaviors
            .query_events(&BehaviorQuery {
                target_ids: my_targets.clone(),
                actions: ActionType::HIGH_VALUE.to_vec(),
                exclude_user: Some(user_id.to_string()),
                limit: Some(PEER_SCAN_LIMIT),
                ..Default::default()
            })
            .await?;
        let peers: Vec<String> = rank_by_frequency(overlaps.into_iter().map(|e| e.user_id))
            .into_iter()
            .take(MAX_PEERS)
            .map(|(peer, _)| peer)
            .collect();
        if peers.is_empty() {
            return Ok(Vec::new());
        }

        let peer_events = self
            .stores
            .behaviors
            .query_events(&BehaviorQuery::for_users(peers).actions(&ActionType::HIGH_VALUE))
            .await?;
        let ranked = rank_by_frequency(
            peer_events
                .into_iter()
                .map(|e| e.target_id)
                .filter(|t| !my_targets.contains(t)),
        );
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

        let peer_counts: std::collections::HashMap<String, usize> = ranked.into_iter().collect();
        let candidates = order_by_rank(items, &ranked_ids)
            .into_iter()
            .take(limit)
            .map(|item| {
                let count = peer_counts.get(&item.id).copied().unwrap_or(1);
                let reason = if count == 1 {
                    "Popular with someone who shares your taste".to_string()
                } else {
                    format!("Popular with {} people who share your taste", count)
                };
                to_candidate(item, StrategyKind::Collaborative, SCORE, reason)
            })
            .collect();

        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::db::MemoryStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_recommends_peer_targets_ranked_by_overlap() {
        let store = Arc::new(MemoryStore::new());
        for id in ["A", "B", "C", "D"] {
            store.insert_item(upcoming(id, "Music", "Madrid", 2)).await;
        }

        log(&store, "me", "A", ActionType::Purchase).await;
        // Two peers liked A; both also went to C, one went to D
        log(&store, "p1", "A", ActionType::Like).await;
        log(&store, "p2", "A", ActionType::Attend).await;
        log(&store, "p1", "C", ActionType::Purchase).await;
        log(&store, "p2", "C", ActionType::Attend).await;
        log(&store, "p2", "D", ActionType::Like).await;
        // Views are not a co-occurrence signal
        log(&store, "p3", "A", ActionType::View).await;
        log(&store, "p3", "B", ActionType::Purchase).await;

        let strategy = CollaborativeStrategy::new(stores(&store));
        let candidates = strategy.generate("me", 10).await.unwrap();

        let ids: Vec<_> = candidates.iter().map(|c| c.target_id.as_str()).collect();
        assert_eq!(ids, vec!["C", "D"]);
        assert!(candidates.iter().all(|c| c.score == 0.8));
        assert_eq!(candidates[0].reason, "Popular with 2 people who share your taste");
    }

    #[tokio::test]
    async fn test_views_alone_give_no_signal() {
        let store = Arc::new(MemoryStore::new());
        store.insert_item(upcoming("A", "Music", "Madrid", 2)).await;
        log(&store, "me", "A", ActionType::View).await;

        let strategy = CollaborativeStrategy::new(stores(&store));
        assert!(strategy.generate("me", 10).await.unwrap().is_empty());
    }
}
