use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    db::BehaviorStore,
    error::{AppError, AppResult},
    models::{ActionType, NewBehaviorEvent},
    services::{cache::CacheManager, metrics::MetricsCollector},
};

/// Raw behavior payload as submitted by clients
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BehaviorInput {
    pub target_id: Option<String>,
    pub action_type: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    pub session_id: Option<String>,
}

/// Validates and appends user actions to the behavior log
#[derive(Clone)]
pub struct BehaviorService {
    store: Arc<dyn BehaviorStore>,
    cache: CacheManager,
    metrics: Arc<MetricsCollector>,
}

impl BehaviorService {
    pub fn new(
        store: Arc<dyn BehaviorStore>,
        cache: CacheManager,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            store,
            cache,
            metrics,
        }
    }

    /// Records one action for `user_id` and returns the new event id.
    ///
    /// Nothing is written when validation fails. On success the user's cached
    /// recommendation sets are dropped so the next request sees the new action.
    pub async fn record_behavior(&self, user_id: &str, input: BehaviorInput) -> AppResult<Uuid> {
        let event = validate(user_id, input)?;
        let action = event.action_type;
        let target_id = event.target_id.clone();

        let timer = self.metrics.start("behavior", "record");
        let result = self.store.append(event).await;
        timer.finish(result.is_ok());
        let id = result?;

        tracing::info!(
            user_id = %user_id,
            target_id = %target_id,
            action = %action,
            behavior_id = %id,
            "Behavior recorded"
        );

        // Failures are logged by the cache manager
        let _ = self.cache.invalidate_user(user_id).await;

        Ok(id)
    }
}

fn required(value: Option<String>, field: &str) -> AppResult<String> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AppError::Validation(format!("{} is required", field))),
    }
}

fn validate(user_id: &str, input: BehaviorInput) -> AppResult<NewBehaviorEvent> {
    if user_id.trim().is_empty() {
        return Err(AppError::Validation("user_id is required".to_string()));
    }
    let target_id = required(input.target_id, "target_id")?;
    let action_type: ActionType = required(input.action_type, "action_type")?
        .parse()
        .map_err(AppError::Validation)?;

    Ok(NewBehaviorEvent {
        user_id: user_id.to_string(),
        target_id,
        action_type,
        metadata: input.metadata.unwrap_or(serde_json::Value::Null),
        session_id: input.session_id.filter(|s| !s.trim().is_empty()),
    })
}
