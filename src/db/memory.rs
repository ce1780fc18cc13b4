use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    BehaviorStore, CatalogStore, ConnectionStatus, PreferenceStore, QueryLogStore,
    SocialGraphStore,
};
use crate::{
    error::AppResult,
    models::{
        BehaviorEvent, BehaviorOrder, BehaviorQuery, CatalogOrder, CatalogQuery, Item,
        NewBehaviorEvent,
    },
};

struct LoggedQuery {
    text: String,
    at: DateTime<Utc>,
}

#[derive(Default)]
struct MemoryInner {
    items: BTreeMap<String, Item>,
    behaviors: Vec<BehaviorEvent>,
    connections: Vec<(String, String, ConnectionStatus)>,
    favorites: HashMap<String, Vec<String>>,
    queries: Vec<LoggedQuery>,
}

/// In-process implementation of every store trait
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a catalog item
    pub async fn insert_item(&self, item: Item) {
        self.inner.write().await.items.insert(item.id.clone(), item);
    }

    /// Records a connection between two users; connections are symmetric
    pub async fn connect(&self, user_id: &str, other_id: &str, status: ConnectionStatus) {
        self.inner.write().await.connections.push((
            user_id.to_string(),
            other_id.to_string(),
            status,
        ));
    }

    pub async fn set_favorite_categories(&self, user_id: &str, categories: Vec<String>) {
        self.inner
            .write()
            .await
            .favorites
            .insert(user_id.to_string(), categories);
    }

    /// Appends a query log entry with an explicit timestamp
    pub async fn log_query_at(&self, text: &str, at: DateTime<Utc>) {
        self.inner.write().await.queries.push(LoggedQuery {
            text: normalize_query(text),
            at,
        });
    }
}

fn normalize_query(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Sorts `(term, count)` pairs by count desc then term, and truncates
fn top_counts(counts: HashMap<String, u64>, limit: usize) -> Vec<(String, u64)> {
    let mut counts: Vec<(String, u64)> = counts.into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    counts.truncate(limit);
    counts
}

#[async_trait::async_trait]
impl BehaviorStore for MemoryStore {
    async fn append(&self, event: NewBehaviorEvent) -> AppResult<Uuid> {
        let id = Uuid::new_v4();
        self.inner.write().await.behaviors.push(BehaviorEvent {
            id,
            user_id: event.user_id,
            target_id: event.target_id,
            action_type: event.action_type,
            metadata: event.metadata,
            session_id: event.session_id,
            timestamp: Utc::now(),
        });
        Ok(id)
    }

    async fn query_events(&self, query: &BehaviorQuery) -> AppResult<Vec<BehaviorEvent>> {
        let inner = self.inner.read().await;
        let matching = inner.behaviors.iter().filter(|e| query.matches(e)).cloned();

        // The log is stored in append order
        let mut events: Vec<BehaviorEvent> = match query.order {
            BehaviorOrder::OldestFirst => matching.collect(),
            BehaviorOrder::NewestFirst => {
                let mut events: Vec<_> = matching.collect();
                events.reverse();
                events
            }
        };

        if let Some(limit) = query.limit {
            events.truncate(limit);
        }
        Ok(events)
    }
}

#[async_trait::async_trait]
impl CatalogStore for MemoryStore {
    async fn query_items(&self, query: &CatalogQuery) -> AppResult<Vec<Item>> {
        let inner = self.inner.read().await;

        let seen: HashSet<&str> = match &query.exclude_seen_by {
            Some(user_id) => inner
                .behaviors
                .iter()
                .filter(|e| &e.user_id == user_id)
                .map(|e| e.target_id.as_str())
                .collect(),
            None => HashSet::new(),
        };

        let mut items: Vec<Item> = inner
            .items
            .values()
            .filter(|item| !seen.contains(item.id.as_str()) && query.matches(item))
            .cloned()
            .collect();

        match query.order_by {
            CatalogOrder::StartTimeAsc => {
                items.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)))
            }
            CatalogOrder::Popularity {
                weights,
                unmeasured,
            } => items.sort_by(|a, b| {
                let key = |item: &Item| CatalogOrder::popularity_key(&weights, unmeasured, item);
                key(b)
                    .total_cmp(&key(a))
                    .then_with(|| a.start_time.cmp(&b.start_time))
                    .then_with(|| a.id.cmp(&b.id))
            }),
            CatalogOrder::CreatedAtDesc => {
                items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)))
            }
        }

        let items = items
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .collect();
        Ok(items)
    }

    async fn category_counts(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<(String, u64)>> {
        let inner = self.inner.read().await;
        let mut counts: HashMap<String, u64> = HashMap::new();
        for item in inner.items.values().filter(|i| i.created_at >= since) {
            *counts.entry(item.category.clone()).or_insert(0) += 1;
        }
        Ok(top_counts(counts, limit))
    }
}

#[async_trait::async_trait]
impl SocialGraphStore for MemoryStore {
    async fn connections(
        &self,
        user_id: &str,
        status: ConnectionStatus,
    ) -> AppResult<Vec<String>> {
        let inner = self.inner.read().await;
        let mut ids = Vec::new();
        for (a, b, s) in &inner.connections {
            if *s != status {
                continue;
            }
            let other = if a == user_id {
                b
            } else if b == user_id {
                a
            } else {
                continue;
            };
            if !ids.contains(other) {
                ids.push(other.clone());
            }
        }
        Ok(ids)
    }
}

#[async_trait::async_trait]
impl PreferenceStore for MemoryStore {
    async fn favorite_categories(&self, user_id: &str) -> AppResult<Vec<String>> {
        Ok(self
            .inner
            .read()
            .await
            .favorites
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl QueryLogStore for MemoryStore {
    async fn record(&self, _user_id: Option<&str>, text: &str) -> AppResult<()> {
        self.log_query_at(text, Utc::now()).await;
        Ok(())
    }

    async fn counts(
        &self,
        since: DateTime<Utc>,
        prefix: Option<&str>,
        limit: usize,
    ) -> AppResult<Vec<(String, u64)>> {
        let prefix = prefix.map(normalize_query);
        let inner = self.inner.read().await;
        let mut counts: HashMap<String, u64> = HashMap::new();
        for query in inner.queries.iter().filter(|q| q.at >= since) {
            if let Some(prefix) = &prefix {
                if !query.text.starts_with(prefix.as_str()) {
                    continue;
                }
            }
            *counts.entry(query.text.clone()).or_insert(0) += 1;
        }
        Ok(top_counts(counts, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActionType;
    use chrono::Duration;

    fn upcoming(id: &str, category: &str) -> Item {
        Item::event(id, id, category, "Madrid", Utc::now() + Duration::days(3))
    }

    #[tokio::test]
    async fn test_exclude_seen_by_filters_touched_items() {
        let store = MemoryStore::new();
        store.insert_item(upcoming("e1", "Music")).await;
        store.insert_item(upcoming("e2", "Music")).await;
        store
            .append(NewBehaviorEvent::new("u1", "e1", ActionType::View))
            .await
            .unwrap();

        let query = CatalogQuery {
            exclude_seen_by: Some("u1".to_string()),
            ..Default::default()
        };
        let items = store.query_items(&query).await.unwrap();
        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["e2"]);

        // Other users still see both
        let query = CatalogQuery {
            exclude_seen_by: Some("u2".to_string()),
            ..Default::default()
        };
        assert_eq!(store.query_items(&query).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_query_events_newest_first_with_limit() {
        let store = MemoryStore::new();
        for target in ["e1", "e2", "e3"] {
            store
                .append(NewBehaviorEvent::new("u1", target, ActionType::View))
                .await
                .unwrap();
        }

        let events = store
            .query_events(&BehaviorQuery::for_user("u1").limit(2))
            .await
            .unwrap();
        let targets: Vec<_> = events.iter().map(|e| e.target_id.as_str()).collect();
        assert_eq!(targets, vec!["e3", "e2"]);

        let events = store
            .query_events(&BehaviorQuery::for_user("u1").order(BehaviorOrder::OldestFirst))
            .await
            .unwrap();
        assert_eq!(events[0].target_id, "e1");
    }

    #[tokio::test]
    async fn test_connections_are_symmetric_and_filtered_by_status() {
        let store = MemoryStore::new();
        store.connect("u1", "u2", ConnectionStatus::Accepted).await;
        store.connect("u3", "u1", ConnectionStatus::Accepted).await;
        store.connect("u1", "u4", ConnectionStatus::Pending).await;

        let accepted = store
            .connections("u1", ConnectionStatus::Accepted)
            .await
            .unwrap();
        assert_eq!(accepted, vec!["u2".to_string(), "u3".to_string()]);
    }

    #[tokio::test]
    async fn test_query_log_counts_prefix_and_window() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.log_query_at("Jazz Night", now).await;
        store.log_query_at("jazz  night", now).await;
        store.log_query_at("jazz brunch", now).await;
        store.log_query_at("rock", now).await;
        store.log_query_at("jazz old", now - Duration::days(10)).await;

        let counts = store
            .counts(now - Duration::days(7), Some("Jazz"), 10)
            .await
            .unwrap();
        assert_eq!(
            counts,
            vec![("jazz night".to_string(), 2), ("jazz brunch".to_string(), 1)]
        );
    }

    #[tokio::test]
    async fn test_popularity_order_applies_weights() {
        let store = MemoryStore::new();
        let mut viewed = upcoming("a", "Music");
        viewed.engagement = Some(crate::models::EngagementMetrics {
            views: 12,
            ..Default::default()
        });
        let mut featured = upcoming("b", "Music");
        featured.engagement = Some(crate::models::EngagementMetrics {
            attendees: 1,
            ..Default::default()
        });
        featured.featured = true;
        store.insert_item(viewed).await;
        store.insert_item(featured).await;
        store.insert_item(upcoming("c", "Music")).await;

        let order = CatalogOrder::Popularity {
            weights: crate::models::PopularityWeights::default(),
            unmeasured: 20.0,
        };
        let items = store
            .query_items(&CatalogQuery::default().order_by(order))
            .await
            .unwrap();
        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }
}
