mod behavior;
mod item;
mod recommendation;
mod search;

pub use behavior::{ActionType, BehaviorEvent, BehaviorOrder, BehaviorQuery, NewBehaviorEvent};
pub use item::{
    text_matches, CatalogOrder, CatalogQuery, EngagementMetrics, GeoPoint, Item, ItemKind,
    PopularityWeights,
};
pub use recommendation::{
    Candidate, RankedResult, RecommendationEntry, RecommendationResponse, RecommendationType,
    StrategyKind,
};
pub use search::{
    DateBucket, Facet, FacetDimension, Facets, MatchTier, SearchPage, SearchRequest,
    SearchResponse, SearchResult, SortBy, Suggestion, SuggestionSource, TrendingTerm,
};
