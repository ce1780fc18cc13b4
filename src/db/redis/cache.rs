use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use redis::Client;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use crate::db::CacheStore;
use crate::error::{AppError, AppResult};

/// Creates a Redis client for caching
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// Message for the cache writer task
///
/// Messages are applied in send order, so a prefix delete never removes a
/// value queued after it and always removes values queued before it.
#[derive(Debug)]
enum CacheWriteMessage {
    Set {
        key: String,
        value: String,
        ttl: Option<u64>,
    },
    /// Acknowledged through `done` once the keys are gone
    DeletePrefix {
        prefix: String,
        done: oneshot::Sender<AppResult<()>>,
    },
}

/// Redis-backed cache store
///
/// Reads go straight to Redis. Sets are fire-and-forget, while prefix deletes
/// wait for the writer so an invalidation is visible as soon as it returns.
#[derive(Clone)]
pub struct RedisCacheStore {
    conn: ConnectionManager,
    write_tx: mpsc::UnboundedSender<CacheWriteMessage>,
}

/// Handle for gracefully shutting down the cache writer
pub struct CacheWriterHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl CacheWriterHandle {
    /// Signals the writer task and waits until it has flushed pending writes
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        tracing::info!("Cache writer shutdown signal sent");
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Cache writer task failed");
        }
    }
}

/// Escapes glob metacharacters for use in a SCAN MATCH pattern
fn scan_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('*');
    pattern
}

impl RedisCacheStore {
    /// Connects to Redis and spawns the background writer task
    pub async fn new(redis_client: Client) -> AppResult<(Self, CacheWriterHandle)> {
        let conn = ConnectionManager::new(redis_client).await?;
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let writer_conn = conn.clone();
        let task = tokio::spawn(async move {
            Self::cache_writer_task(writer_conn, write_rx, shutdown_rx).await;
        });

        let store = Self { conn, write_tx };
        Ok((store, CacheWriterHandle { shutdown_tx, task }))
    }

    /// Background task that applies cache messages in order
    ///
    /// On shutdown signal, flushes all remaining messages before exiting.
    async fn cache_writer_task(
        mut conn: ConnectionManager,
        mut write_rx: mpsc::UnboundedReceiver<CacheWriteMessage>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!("Cache writer task started");
        let mut failed_writes: u64 = 0;

        loop {
            tokio::select! {
                Some(msg) = write_rx.recv() => {
                    if let Err(e) = Self::apply(&mut conn, msg).await {
                        failed_writes += 1;
                        tracing::warn!(error = %e, failed_writes, "Failed to write to Redis cache");
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Cache writer shutting down, flushing remaining writes");

                    write_rx.close();
                    while let Some(msg) = write_rx.recv().await {
                        if let Err(e) = Self::apply(&mut conn, msg).await {
                            tracing::warn!(error = %e, "Failed to flush cache write during shutdown");
                        }
                    }

                    tracing::info!("Cache writer task stopped");
                    break;
                }
            }
        }
    }

    /// Applies a single message to Redis
    async fn apply(conn: &mut ConnectionManager, msg: CacheWriteMessage) -> AppResult<()> {
        match msg {
            CacheWriteMessage::Set {
                key,
                value,
                ttl: Some(ttl),
            } => {
                let _: () = conn.set_ex(key, value, ttl).await?;
            }
            CacheWriteMessage::Set {
                key,
                value,
                ttl: None,
            } => {
                let _: () = conn.set(key, value).await?;
            }
            CacheWriteMessage::DeletePrefix { prefix, done } => {
                // The waiting caller reports the outcome
                let _ = done.send(Self::delete_matching(conn, &prefix).await);
            }
        }
        Ok(())
    }

    async fn delete_matching(conn: &mut ConnectionManager, prefix: &str) -> AppResult<()> {
        let keys: Vec<String> = {
            let mut iter = conn.scan_match::<_, String>(scan_pattern(prefix)).await?;
            let mut keys = Vec::new();
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
            keys
        };
        if !keys.is_empty() {
            let _: () = conn.del(&keys).await?;
        }
        tracing::debug!(prefix = %prefix, deleted = keys.len(), "Cleared cache prefix");
        Ok(())
    }

    fn enqueue(&self, msg: CacheWriteMessage) -> AppResult<()> {
        self.write_tx
            .send(msg)
            .map_err(|e| AppError::Cache(format!("cache writer unavailable: {}", e)))
    }
}

#[async_trait::async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.conn.clone();
        let cached: Option<String> = conn.get(key).await?;
        Ok(cached)
    }

    /// Queues the write; it lands once the writer task processes it
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> AppResult<()> {
        self.enqueue(CacheWriteMessage::Set {
            key: key.to_string(),
            value,
            ttl: ttl.map(|t| t.as_secs().max(1)),
        })
    }

    /// Returns once every matching key, including queued ones, is deleted
    async fn delete_prefix(&self, prefix: &str) -> AppResult<()> {
        let (done, applied) = oneshot::channel();
        self.enqueue(CacheWriteMessage::DeletePrefix {
            prefix: prefix.to_string(),
            done,
        })?;
        applied
            .await
            .map_err(|_| AppError::Cache("cache writer stopped before deleting".to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_pattern_appends_wildcard() {
        assert_eq!(scan_pattern("recs:u1:"), "recs:u1:*");
    }

    #[test]
    fn test_scan_pattern_escapes_glob_characters() {
        assert_eq!(scan_pattern("recs:u*1?:"), "recs:u\\*1\\?:*");
    }

    #[tokio::test]
    #[ignore = "requires a running Redis at REDIS_URL"]
    async fn test_invalidation_visible_immediately() {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());

        let client = create_redis_client(&redis_url).unwrap();
        let (store, handle) = RedisCacheStore::new(client).await.unwrap();

        store
            .set("recs:test-user:all:10", "[]".to_string(), Some(Duration::from_secs(60)))
            .await
            .unwrap();
        store
            .set("recs:test-user:social:5", "[]".to_string(), None)
            .await
            .unwrap();

        // Both sets are still queued; the delete must run after them
        store.delete_prefix("recs:test-user:").await.unwrap();
        assert_eq!(store.get("recs:test-user:all:10").await.unwrap(), None);
        assert_eq!(store.get("recs:test-user:social:5").await.unwrap(), None);

        store
            .set("recs:test-user:all:10", "[1]".to_string(), None)
            .await
            .unwrap();
        handle.shutdown().await;
        assert_eq!(
            store.get("recs:test-user:all:10").await.unwrap(),
            Some("[1]".to_string())
        );
        store.delete_prefix("recs:test-user:").await.unwrap_err();
    }
}
