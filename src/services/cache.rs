use serde::{de::DeserializeOwned, Serialize};
use std::{future::Future, sync::Arc, time::Duration};

use crate::{
    db::{CacheKey, CacheStore},
    error::{AppError, AppResult},
    services::metrics::MetricsCollector,
};

/// Outcome of a cache write. Callers may inspect it but must never escalate it.
pub type CacheWrite = Result<(), AppError>;

/// Best-effort cache in front of expensive computations
#[derive(Clone)]
pub struct CacheManager {
    store: Arc<dyn CacheStore>,
    metrics: Arc<MetricsCollector>,
}

impl CacheManager {
    pub fn new(store: Arc<dyn CacheStore>, metrics: Arc<MetricsCollector>) -> Self {
        Self { store, metrics }
    }

    /// Reads and decodes a cached value. Any failure counts as a miss.
    pub async fn lookup<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let timer = self.metrics.start("cache", "get");
        let raw = match self.store.get(&key.to_string()).await {
            Ok(raw) => raw,
            Err(e) => {
                timer.finish(false);
                tracing::warn!(key = %key, error = %e, "Cache read failed");
                return None;
            }
        };
        timer.finish(true);

        let json = raw?;
        match serde_json::from_str(&json) {
            Ok(value) => {
                tracing::debug!(key = %key, "Cache hit");
                Some(value)
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache deserialization error");
                None
            }
        }
    }

    /// Replaces everything cached under the key's owner with `value`
    pub async fn store<T: Serialize>(
        &self,
        key: &CacheKey,
        value: &T,
        ttl: Option<Duration>,
    ) -> CacheWrite {
        let json = serde_json::to_string(value)
            .map_err(|e| AppError::Cache(format!("Cache serialization error: {}", e)))?;

        let key_str = key.to_string();
        let owner = key.owner_prefix();
        let timer = self.metrics.start("cache", "set");

        let result = async {
            if owner != key_str {
                self.store.delete_prefix(&owner).await?;
            }
            self.store.set(&key_str, json, ttl).await
        }
        .await;

        timer.finish(result.is_ok());
        result
    }

    /// Returns the cached value for `key`, computing and storing it on a miss
    pub async fn get_or_compute<T, F, Fut>(
        &self,
        key: &CacheKey,
        ttl: Option<Duration>,
        compute: F,
    ) -> AppResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        self.get_or_compute_if(key, ttl, compute, |_| true).await
    }

    /// Like [`Self::get_or_compute`], but only stores values accepted by `cacheable`
    pub async fn get_or_compute_if<T, F, Fut, P>(
        &self,
        key: &CacheKey,
        ttl: Option<Duration>,
        compute: F,
        cacheable: P,
    ) -> AppResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<T>>,
        P: FnOnce(&T) -> bool,
    {
        if let Some(cached) = self.lookup(key).await {
            return Ok(cached);
        }

        tracing::debug!(key = %key, "Cache miss");
        let value = compute().await?;

        if cacheable(&value) {
            if let Err(e) = self.store(key, &value, ttl).await {
                tracing::warn!(key = %key, error = %e, "Cache write failed");
            }
        }
        Ok(value)
    }

    /// Drops every entry owned by the same subject as `key`
    pub async fn invalidate(&self, key: &CacheKey) -> CacheWrite {
        self.invalidate_prefix(&key.owner_prefix()).await
    }

    /// Drops every cached recommendation set of `user_id`
    pub async fn invalidate_user(&self, user_id: &str) -> CacheWrite {
        self.invalidate_prefix(&CacheKey::user_prefix(user_id)).await
    }

    async fn invalidate_prefix(&self, prefix: &str) -> CacheWrite {
        let result = self.store.delete_prefix(prefix).await;
        if let Err(e) = &result {
            tracing::warn!(prefix = %prefix, error = %e, "Cache invalidation failed");
        }
        result
    }
}
