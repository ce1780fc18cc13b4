//! Persistence boundary
//!
//! Every data source the ranking pipeline reads is reached through one of the
//! store traits below, so the pipeline never depends on a concrete backend.
//! `postgres` and `redis` back production; `memory` backs development and tests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{BehaviorEvent, BehaviorQuery, CatalogQuery, Item, NewBehaviorEvent},
};

pub mod cache;
pub mod memory;
pub mod postgres;
pub mod redis;

pub use cache::{CacheKey, CacheStore, MemoryCacheStore};
pub use memory::MemoryStore;
pub use postgres::{create_pool, PgStore};
pub use redis::{create_redis_client, CacheWriterHandle, RedisCacheStore};

/// Append-only log of user actions
#[async_trait::async_trait]
pub trait BehaviorStore: Send + Sync {
    /// Persists a new event and returns its generated id
    async fn append(&self, event: NewBehaviorEvent) -> AppResult<Uuid>;

    /// Reads events matching every populated filter of `query`
    async fn query_events(&self, query: &BehaviorQuery) -> AppResult<Vec<BehaviorEvent>>;
}

/// Read access to the item catalog
#[async_trait::async_trait]
pub trait CatalogStore: Send + Sync {
    async fn query_items(&self, query: &CatalogQuery) -> AppResult<Vec<Item>>;

    /// Number of items per category created since `since`, highest first
    async fn category_counts(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<(String, u64)>>;
}

/// State of a connection between two users
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Pending,
    Accepted,
    Blocked,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Pending => "pending",
            ConnectionStatus::Accepted => "accepted",
            ConnectionStatus::Blocked => "blocked",
        }
    }
}

#[async_trait::async_trait]
pub trait SocialGraphStore: Send + Sync {
    /// Ids of the users connected to `user_id` with the given status
    async fn connections(&self, user_id: &str, status: ConnectionStatus)
        -> AppResult<Vec<String>>;
}

/// Declared user preferences
#[async_trait::async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn favorite_categories(&self, user_id: &str) -> AppResult<Vec<String>>;
}

/// Log of submitted search texts
#[async_trait::async_trait]
pub trait QueryLogStore: Send + Sync {
    async fn record(&self, user_id: Option<&str>, text: &str) -> AppResult<()>;

    /// Normalized query texts seen since `since` with their frequency, highest first.
    /// When `prefix` is set only texts starting with it are counted.
    async fn counts(
        &self,
        since: DateTime<Utc>,
        prefix: Option<&str>,
        limit: usize,
    ) -> AppResult<Vec<(String, u64)>>;
}

/// Bundle of every store the services read from
#[derive(Clone)]
pub struct Stores {
    pub behaviors: Arc<dyn BehaviorStore>,
    pub catalog: Arc<dyn CatalogStore>,
    pub social: Arc<dyn SocialGraphStore>,
    pub preferences: Arc<dyn PreferenceStore>,
    pub query_log: Arc<dyn QueryLogStore>,
}

impl Stores {
    /// Wires every store to the same in-memory backend
    pub fn in_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            behaviors: store.clone(),
            catalog: store.clone(),
            social: store.clone(),
            preferences: store.clone(),
            query_log: store,
        }
    }

    /// Wires every store to PostgreSQL
    pub fn postgres(store: Arc<PgStore>) -> Self {
        Self {
            behaviors: store.clone(),
            catalog: store.clone(),
            social: store.clone(),
            preferences: store.clone(),
            query_log: store,
        }
    }
}
