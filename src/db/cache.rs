use std::{collections::HashMap, fmt::Display, time::Duration};

use tokio::{sync::RwLock, time::Instant};

use crate::{error::AppResult, models::RecommendationType};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Recommendations {
        user_id: String,
        kind: RecommendationType,
        limit: usize,
    },
    SearchPage(String),
    Suggestions { prefix: String, limit: usize },
    Trending { window_hours: i64, limit: usize },
}

impl CacheKey {
    /// Prefix under which every entry owned by the same subject lives.
    ///
    /// A fresh write clears the whole prefix first, so a user never ends up
    /// with a new merged ranking next to stale per-strategy lists.
    pub fn owner_prefix(&self) -> String {
        match self {
            CacheKey::Recommendations { user_id, .. } => Self::user_prefix(user_id),
            _ => self.to_string(),
        }
    }

    /// Prefix of every recommendation entry cached for `user_id`
    pub fn user_prefix(user_id: &str) -> String {
        format!("recs:{}:", user_id)
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Recommendations {
                user_id,
                kind,
                limit,
            } => write!(f, "recs:{}:{}:{}", user_id, kind, limit),
            CacheKey::SearchPage(hash) => write!(f, "search:{}", hash),
            CacheKey::Suggestions { prefix, limit } => {
                write!(f, "suggest:{}:{}", limit, prefix.trim().to_lowercase())
            }
            CacheKey::Trending {
                window_hours,
                limit,
            } => write!(f, "trending:{}:{}", window_hours, limit),
        }
    }
}

/// Key/value store holding serialized cache payloads
#[async_trait::async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Stores `value`, replacing any previous payload. `None` never expires.
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> AppResult<()>;

    async fn delete_prefix(&self, prefix: &str) -> AppResult<()>;
}

/// A cached payload with its validity window
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub payload: String,
    pub created_at: Instant,
    pub ttl: Option<Duration>,
}

impl CacheEntry {
    pub fn is_expired(&self, now: Instant) -> bool {
        match self.ttl {
            Some(ttl) => now.duration_since(self.created_at) >= ttl,
            None => false,
        }
    }
}

/// Process-local cache store.
///
/// Expiry is measured with `tokio::time::Instant`, so tests can drive it with
/// a paused clock.
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait::async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.payload.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        // Expired: drop it lazily
        self.entries.write().await.remove(key);
        Ok(None)
    }

    /// Drops every expired entry before inserting
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> AppResult<()> {
        let now = Instant::now();
        let entry = CacheEntry {
            payload: value,
            created_at: now,
            ttl,
        };

        let mut entries = self.entries.write().await;
        entries.retain(|_, existing| !existing.is_expired(now));
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> AppResult<()> {
        self.entries
            .write()
            .await
            .retain(|key, _| !key.starts_with(prefix));
        Ok(())
    }
}
