use std::sync::Arc;

use crate::{
    config::Config,
    db::{CacheStore, MemoryCacheStore, MemoryStore, Stores},
    services::{
        strategies::default_strategies, BehaviorService, CacheManager, MetricsCollector,
        RecommendationService, SearchEngine,
    },
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub inner: Arc<AppStateInner>,
}

/// Services wired once at startup and shared by every request
pub struct AppStateInner {
    pub recommendations: RecommendationService,
    pub search: SearchEngine,
    pub behaviors: BehaviorService,
    pub metrics: Arc<MetricsCollector>,
}

impl AppState {
    /// Wires every service over the given stores and cache backend
    pub fn new(config: &Config, stores: Stores, cache_store: Arc<dyn CacheStore>) -> Self {
        let metrics = Arc::new(MetricsCollector::new());
        let cache = CacheManager::new(cache_store, metrics.clone());

        let strategies = default_strategies(
            &stores,
            config.popularity_weights(),
            config.category_top_n,
        );

        Self {
            inner: Arc::new(AppStateInner {
                recommendations: RecommendationService::new(
                    strategies,
                    cache.clone(),
                    metrics.clone(),
                    config.into(),
                ),
                search: SearchEngine::new(&stores, cache.clone(), metrics.clone(), config.into()),
                behaviors: BehaviorService::new(stores.behaviors.clone(), cache, metrics.clone()),
                metrics,
            }),
        }
    }

    /// State backed entirely by in-process stores
    pub fn in_memory(config: &Config, store: Arc<MemoryStore>) -> Self {
        Self::new(
            config,
            Stores::in_memory(store),
            Arc::new(MemoryCacheStore::new()),
        )
    }
}
