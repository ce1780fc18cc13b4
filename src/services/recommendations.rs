use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::{Duration, Instant},
};

use crate::{
    config::Config,
    db::CacheKey,
    error::{AppError, AppResult},
    models::{
        Candidate, RecommendationEntry, RecommendationResponse, RecommendationType, StrategyKind,
    },
    services::{
        aggregator::aggregate,
        cache::{CacheManager, CacheWrite},
        metrics::MetricsCollector,
        strategies::Strategy,
    },
};

/// Limits and timeouts applied to every recommendation request
#[derive(Debug, Clone, Copy)]
pub struct RecommendationSettings {
    pub generator_timeout: Duration,
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for RecommendationSettings {
    fn default() -> Self {
        Self {
            generator_timeout: Duration::from_millis(2000),
            default_limit: 10,
            max_limit: 50,
        }
    }
}

impl From<&Config> for RecommendationSettings {
    fn from(config: &Config) -> Self {
        Self {
            generator_timeout: Duration::from_millis(config.generator_timeout_ms),
            default_limit: config.default_recommendation_limit,
            max_limit: config.max_recommendation_limit,
        }
    }
}

/// Outcome of running the requested strategies concurrently
struct FanOut {
    candidates: HashMap<StrategyKind, Vec<Candidate>>,
    degraded: Vec<StrategyKind>,
}

/// Runs the strategies, merges their output and caches the result per user
#[derive(Clone)]
pub struct RecommendationService {
    strategies: Vec<Arc<dyn Strategy>>,
    cache: CacheManager,
    metrics: Arc<MetricsCollector>,
    settings: RecommendationSettings,
}

impl RecommendationService {
    pub fn new(
        strategies: Vec<Arc<dyn Strategy>>,
        cache: CacheManager,
        metrics: Arc<MetricsCollector>,
        settings: RecommendationSettings,
    ) -> Self {
        Self {
            strategies,
            cache,
            metrics,
            settings,
        }
    }

    /// Resolves the requested page size, falling back to the configured default
    pub fn resolve_limit(&self, limit: Option<usize>) -> AppResult<usize> {
        match limit {
            None => Ok(self.settings.default_limit),
            Some(n) if n == 0 || n > self.settings.max_limit => Err(AppError::Validation(format!(
                "limit must be between 1 and {}",
                self.settings.max_limit
            ))),
            Some(n) => Ok(n),
        }
    }

    /// Returns recommendations for `user_id`, served from cache when available.
    ///
    /// Failing or slow strategies contribute nothing and are listed in
    /// `degraded`; such partial results are returned but never cached.
    pub async fn get_recommendations(
        &self,
        user_id: &str,
        limit: Option<usize>,
        kind: RecommendationType,
    ) -> AppResult<RecommendationResponse> {
        if user_id.trim().is_empty() {
            return Err(AppError::Validation("user_id is required".to_string()));
        }
        let limit = self.resolve_limit(limit)?;

        let key = CacheKey::Recommendations {
            user_id: user_id.to_string(),
            kind,
            limit,
        };

        let timer = self.metrics.start("recommendations", "get");
        let result = self
            .cache
            .get_or_compute_if(
                &key,
                None,
                || self.compute(user_id, limit, kind),
                |response: &RecommendationResponse| response.degraded.is_empty(),
            )
            .await;
        timer.finish(result.is_ok());
        result
    }

    /// Drops every cached recommendation set of `user_id`
    pub async fn invalidate(&self, user_id: &str) -> CacheWrite {
        tracing::info!(user_id = %user_id, "Invalidating cached recommendations");
        self.cache.invalidate_user(user_id).await
    }

    async fn compute(
        &self,
        user_id: &str,
        limit: usize,
        kind: RecommendationType,
    ) -> AppResult<RecommendationResponse> {
        let requested = kind.strategies();
        let FanOut {
            candidates,
            degraded,
        } = self.fan_out(user_id, limit, &requested).await;

        let strategies: BTreeMap<StrategyKind, Vec<RecommendationEntry>> = requested
            .iter()
            .map(|k| {
                let entries = candidates
                    .get(k)
                    .map(|list| list.iter().map(RecommendationEntry::from).collect())
                    .unwrap_or_default();
                (*k, entries)
            })
            .collect();

        let merged = match kind {
            RecommendationType::All => Some(
                aggregate(candidates)?
                    .iter()
                    .take(limit)
                    .map(RecommendationEntry::from)
                    .collect(),
            ),
            RecommendationType::Only(_) => None,
        };

        tracing::info!(
            user_id = %user_id,
            kind = %kind,
            degraded = degraded.len(),
            "Recommendations computed"
        );

        Ok(RecommendationResponse {
            user_id: user_id.to_string(),
            strategies,
            merged,
            degraded,
        })
    }

    /// Runs each requested strategy as its own task under the generator timeout
    async fn fan_out(&self, user_id: &str, limit: usize, requested: &[StrategyKind]) -> FanOut {
        let mut tasks = Vec::new();

        for strategy in self
            .strategies
            .iter()
            .filter(|s| requested.contains(&s.kind()))
        {
            let strategy = strategy.clone();
            let kind = strategy.kind();
            let user_id = user_id.to_string();
            let timeout = self.settings.generator_timeout;
            let metrics = self.metrics.clone();

            let task = tokio::spawn(async move {
                let started = Instant::now();
                let result = tokio::time::timeout(timeout, strategy.generate(&user_id, limit)).await;
                let ok = matches!(result, Ok(Ok(_)));
                metrics.record("strategy", kind.as_str(), started.elapsed(), ok);
                result
            });
            tasks.push((kind, task));
        }

        let mut candidates = HashMap::new();
        let mut degraded = Vec::new();

        for (kind, task) in tasks {
            match task.await {
                Ok(Ok(Ok(mut list))) => {
                    list.truncate(limit);
                    candidates.insert(kind, list);
                }
                Ok(Ok(Err(e))) => {
                    tracing::warn!(strategy = %kind, error = %e, "Strategy failed");
                    degraded.push(kind);
                }
                Ok(Err(_)) => {
                    tracing::warn!(
                        strategy = %kind,
                        timeout_ms = self.settings.generator_timeout.as_millis() as u64,
                        "Strategy timed out"
                    );
                    degraded.push(kind);
                }
                Err(e) => {
                    tracing::error!(strategy = %kind, error = %e, "Strategy task panicked");
                    degraded.push(kind);
                }
            }
        }

        if !degraded.is_empty() {
            tracing::warn!(
                success_count = candidates.len(),
                error_count = degraded.len(),
                "Partial recommendation failure"
            );
        }

        degraded.sort();
        FanOut {
            candidates,
            degraded,
        }
    }
}
