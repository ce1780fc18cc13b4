pub mod aggregator;
pub mod behavior;
pub mod cache;
pub mod metrics;
pub mod recommendations;
pub mod search;
pub mod strategies;

pub use behavior::{BehaviorInput, BehaviorService};
pub use cache::{CacheManager, CacheWrite};
pub use metrics::MetricsCollector;
pub use recommendations::{RecommendationService, RecommendationSettings};
pub use search::{SearchEngine, SearchSettings};
