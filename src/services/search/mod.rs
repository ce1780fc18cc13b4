//! Catalog search: matching, relevance tiers, geo radius, facets, pagination,
//! prefix suggestions and trending terms

use chrono::{DateTime, Utc};
use std::{sync::Arc, time::Duration};

use crate::{
    config::Config,
    db::{CacheKey, CatalogStore, QueryLogStore, Stores},
    error::{AppError, AppResult},
    models::{
        CatalogQuery, GeoPoint, ItemKind, SearchPage, SearchRequest, SearchResponse, SortBy,
    },
    services::{cache::CacheManager, metrics::MetricsCollector},
};

pub mod facets;
pub mod matching;
pub mod suggestions;

use facets::{build_facets, ActiveFilters};
use matching::{sort_results, to_result};

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy)]
pub struct SearchSettings {
    pub cache_ttl: Duration,
    pub suggestion_limit: usize,
    pub suggestion_window_days: i64,
    pub trending_window_hours: i64,
    pub trending_limit: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(30),
            suggestion_limit: 5,
            suggestion_window_days: 7,
            trending_window_hours: 24,
            trending_limit: 10,
        }
    }
}

impl From<&Config> for SearchSettings {
    fn from(config: &Config) -> Self {
        Self {
            cache_ttl: Duration::from_secs(config.search_cache_ttl_secs),
            suggestion_limit: config.suggestion_limit,
            suggestion_window_days: config.suggestion_window_days,
            trending_window_hours: config.trending_window_hours,
            trending_limit: config.trending_limit,
        }
    }
}

/// Request parameters after validation
#[derive(Debug, Clone)]
struct ValidatedSearch {
    limit: usize,
    offset: usize,
    kinds: Vec<ItemKind>,
    origin: Option<GeoPoint>,
    category: Option<String>,
    location: Option<String>,
}

#[derive(Clone)]
pub struct SearchEngine {
    catalog: Arc<dyn CatalogStore>,
    query_log: Arc<dyn QueryLogStore>,
    cache: CacheManager,
    metrics: Arc<MetricsCollector>,
    settings: SearchSettings,
}

impl SearchEngine {
    pub fn new(
        stores: &Stores,
        cache: CacheManager,
        metrics: Arc<MetricsCollector>,
        settings: SearchSettings,
    ) -> Self {
        Self {
            catalog: stores.catalog.clone(),
            query_log: stores.query_log.clone(),
            cache,
            metrics,
            settings,
        }
    }

    /// Runs a search and decorates the page with suggestions and trending terms.
    ///
    /// Only the result page is fatal; suggestion, trending and query-log
    /// failures are logged and leave their part empty.
    pub async fn search(
        &self,
        request: SearchRequest,
        caller: Option<&str>,
    ) -> AppResult<SearchResponse> {
        let validated = validate(&request)?;
        let text = request.query.trim().to_string();

        let key = CacheKey::SearchPage(request_hash(&request)?);
        let timer = self.metrics.start("search", "query");
        let page = self
            .cache
            .get_or_compute(&key, Some(self.settings.cache_ttl), || {
                self.search_page(&request, &validated, Utc::now())
            })
            .await;
        timer.finish(page.is_ok());
        let page = page?;

        let suggestions = if text.is_empty() {
            Vec::new()
        } else {
            self.suggestions(&text, None).await.unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Suggestions unavailable");
                Vec::new()
            })
        };
        let trending = self.trending().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Trending terms unavailable");
            Vec::new()
        });

        // Logged last so this search never suggests itself
        if !text.is_empty() {
            if let Err(e) = self.query_log.record(caller, &text).await {
                tracing::warn!(error = %e, "Failed to log search query");
            }
        }

        tracing::info!(
            query = %text,
            total = page.total,
            returned = page.results.len(),
            "Search completed"
        );

        Ok(SearchResponse {
            results: page.results,
            facets: page.facets,
            suggestions,
            trending,
            total: page.total,
        })
    }

    /// Filters, scores, facets, sorts and paginates catalog items
    async fn search_page(
        &self,
        request: &SearchRequest,
        validated: &ValidatedSearch,
        now: DateTime<Utc>,
    ) -> AppResult<SearchPage> {
        let query = catalog_query(request, validated, now);
        let items = self.catalog.query_items(&query).await?;

        let radius = request.radius_km;
        let candidates: Vec<_> = items
            .into_iter()
            .map(|item| to_result(item, &request.query, validated.origin.as_ref(), now))
            .filter(|r| match (validated.origin, radius) {
                (Some(_), Some(radius)) => r.distance_km.is_some_and(|d| d <= radius),
                _ => true,
            })
            .collect();

        let active = ActiveFilters {
            category: validated.category.as_deref(),
            location: validated.location.as_deref(),
            date_bucket: request.date_bucket,
        };
        let facets = build_facets(&candidates, active);

        let mut results: Vec<_> = candidates.into_iter().filter(|r| active.admits(r)).collect();
        sort_results(&mut results, request.sort_by);
        let total = results.len();
        let results = results
            .into_iter()
            .skip(validated.offset)
            .take(validated.limit)
            .collect();

        Ok(SearchPage {
            results,
            facets,
            total,
        })
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn validate(request: &SearchRequest) -> AppResult<ValidatedSearch> {
    let limit = request.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    if limit == 0 || limit > MAX_PAGE_SIZE {
        return Err(AppError::Validation(format!(
            "limit must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }

    let kinds = request
        .types
        .iter()
        .map(|t| {
            ItemKind::parse(t.trim())
                .ok_or_else(|| AppError::Validation(format!("unknown type '{}'", t)))
        })
        .collect::<AppResult<Vec<_>>>()?;

    let origin = match (request.latitude, request.longitude) {
        (Some(lat), Some(lon)) => {
            let point = GeoPoint::new(lat, lon);
            if !point.is_valid() {
                return Err(AppError::Validation(
                    "latitude/longitude out of range".to_string(),
                ));
            }
            Some(point)
        }
        (None, None) => None,
        _ => {
            return Err(AppError::Validation(
                "latitude and longitude must be given together".to_string(),
            ))
        }
    };

    if let Some(radius) = request.radius_km {
        if origin.is_none() {
            return Err(AppError::Validation(
                "radius_km requires latitude and longitude".to_string(),
            ));
        }
        if !radius.is_finite() || radius <= 0.0 {
            return Err(AppError::Validation("radius_km must be positive".to_string()));
        }
    }
    if request.sort_by == SortBy::Distance && origin.is_none() {
        return Err(AppError::Validation(
            "sort_by=distance requires latitude and longitude".to_string(),
        ));
    }

    if request.price_min.is_some_and(|p| p < 0.0) || request.price_max.is_some_and(|p| p < 0.0) {
        return Err(AppError::Validation("prices must not be negative".to_string()));
    }
    if let (Some(min), Some(max)) = (request.price_min, request.price_max) {
        if min > max {
            return Err(AppError::Validation(
                "price_min must not exceed price_max".to_string(),
            ));
        }
    }
    if let (Some(from), Some(to)) = (request.date_from, request.date_to) {
        if from > to {
            return Err(AppError::Validation(
                "date_from must not be after date_to".to_string(),
            ));
        }
    }

    Ok(ValidatedSearch {
        limit,
        offset: request.offset.unwrap_or(0),
        kinds,
        origin,
        category: non_blank(&request.category),
        location: non_blank(&request.location),
    })
}

/// Maps the non-facet filters onto a catalog query. Radius and the facet
/// filters (category, location, date bucket) are applied afterwards, since
/// facets count the results each of them removes.
fn catalog_query(
    request: &SearchRequest,
    validated: &ValidatedSearch,
    now: DateTime<Utc>,
) -> CatalogQuery {
    let mut starts_after = request.date_from;
    if !request.include_past {
        starts_after = Some(starts_after.map_or(now, |from| from.max(now)));
    }

    CatalogQuery {
        kinds: validated.kinds.clone(),
        text: Some(request.query.trim().to_string()).filter(|t| !t.is_empty()),
        starts_after,
        starts_before: request.date_to,
        price_min: request.price_min,
        price_max: request.price_max,
        tags: request
            .tags
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
        organizer: non_blank(&request.organizer_filter),
        verified_only: request.verified_only,
        ..Default::default()
    }
}

/// blake3 digest of the normalized request, used as the page cache key
fn request_hash(request: &SearchRequest) -> AppResult<String> {
    let mut normalized = request.clone();
    normalized.query = normalized.query.trim().to_lowercase();
    let payload = serde_json::to_vec(&normalized)
        .map_err(|e| AppError::Internal(format!("Failed to encode search cache key: {}", e)))?;

    Ok(blake3::hash(&payload).to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryCacheStore, MemoryStore};
    use crate::models::{DateBucket, EngagementMetrics, Item, MatchTier};
    use chrono::Duration as ChronoDuration;

    fn event(id: &str, title: &str, category: &str, city: &str, days: i64) -> Item {
        Item::event(id, title, category, city, Utc::now() + ChronoDuration::days(days))
    }

    async fn engine_with(items: Vec<Item>) -> (SearchEngine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        for item in items {
            store.insert_item(item).await;
        }
        let metrics = Arc::new(MetricsCollector::new());
        let cache = CacheManager::new(Arc::new(MemoryCacheStore::new()), metrics.clone());
        let engine = SearchEngine::new(
            &Stores::in_memory(store.clone()),
            cache,
            metrics,
            SearchSettings::default(),
        );
        (engine, store)
    }

    fn request(query: &str) -> SearchRequest {
        SearchRequest {
            query: query.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_title_match_ranks_above_description_match() {
        let mut described = event("e1", "Open Air Evening", "Festival", "Madrid", 1);
        described.description = "The best music of the summer".to_string();
        let titled = event("e2", "Live Music Night", "Concert", "Madrid", 5);
        let unrelated = event("e3", "Chess Open", "Games", "Madrid", 2);
        let (engine, _) = engine_with(vec![described, titled, unrelated]).await;

        let response = engine.search(request("music"), None).await.unwrap();

        assert_eq!(response.total, 2);
        assert_eq!(response.results[0].item.title, "Live Music Night");
        assert_eq!(response.results[0].match_tier, MatchTier::Title);
        assert_eq!(response.results[1].match_tier, MatchTier::Description);
    }

    #[tokio::test]
    async fn test_category_filter_marks_facet_selected() {
        let (engine, _) = engine_with(vec![
            event("a", "Gig", "Music", "Madrid", 1),
            event("b", "Concert", "Music", "Bilbao", 2),
            event("c", "Match", "Sports", "Madrid", 3),
        ])
        .await;

        let response = engine
            .search(
                SearchRequest {
                    category: Some("music".to_string()),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();

        assert_eq!(response.total, 2);
        let categories: Vec<_> = response
            .facets
            .categories
            .iter()
            .map(|f| (f.value.as_str(), f.count, f.selected))
            .collect();
        assert_eq!(categories, vec![("Music", 2, true), ("Sports", 1, false)]);
        assert_eq!(response.facets.locations.len(), 2);
        assert!(response.results.iter().all(|r| r.category == "Music"));
    }

    #[tokio::test]
    async fn test_radius_excludes_far_and_unlocated_items() {
        let mut near = event("near", "Gig", "Music", "Madrid", 1);
        near.location = Some(GeoPoint::new(40.42, -3.70));
        let mut far = event("far", "Gig", "Music", "Barcelona", 1);
        far.location = Some(GeoPoint::new(41.3874, 2.1686));
        let unlocated = event("unknown", "Gig", "Music", "Madrid", 1);
        let (engine, _) = engine_with(vec![near, far, unlocated]).await;

        let response = engine
            .search(
                SearchRequest {
                    latitude: Some(40.4168),
                    longitude: Some(-3.7038),
                    radius_km: Some(50.0),
                    sort_by: SortBy::Distance,
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();

        let ids: Vec<_> = response.results.iter().map(|r| r.target_id.as_str()).collect();
        assert_eq!(ids, vec!["near"]);
        assert!(response.results[0].distance_km.is_some());
    }

    #[tokio::test]
    async fn test_past_items_hidden_unless_requested() {
        let past = Item::event("old", "Old Gig", "Music", "Madrid", Utc::now() - ChronoDuration::days(3));
        let (engine, _) = engine_with(vec![past, event("new", "New Gig", "Music", "Madrid", 3)]).await;

        let upcoming = engine.search(request("gig"), None).await.unwrap();
        assert_eq!(upcoming.total, 1);

        let everything = engine
            .search(
                SearchRequest {
                    query: "gig".to_string(),
                    include_past: true,
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(everything.total, 2);
    }

    #[tokio::test]
    async fn test_pagination_and_total() {
        let items = (0..5)
            .map(|i| event(&format!("e{}", i), "Gig", "Music", "Madrid", i + 1))
            .collect();
        let (engine, _) = engine_with(items).await;

        let response = engine
            .search(
                SearchRequest {
                    limit: Some(2),
                    offset: Some(2),
                    sort_by: SortBy::Date,
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();

        assert_eq!(response.total, 5);
        let ids: Vec<_> = response.results.iter().map(|r| r.target_id.as_str()).collect();
        assert_eq!(ids, vec!["e2", "e3"]);
    }

    #[tokio::test]
    async fn test_popularity_sort_and_date_bucket_filter() {
        let mut busy = event("busy", "Gig", "Music", "Madrid", 3);
        busy.engagement = Some(EngagementMetrics {
            views: 100,
            ..Default::default()
        });
        let quiet = event("quiet", "Gig", "Music", "Madrid", 2);
        let distant = event("distant", "Gig", "Music", "Madrid", 60);
        let (engine, _) = engine_with(vec![busy, quiet, distant]).await;

        let response = engine
            .search(
                SearchRequest {
                    date_bucket: Some(DateBucket::ThisWeek),
                    sort_by: SortBy::Popularity,
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();

        let ids: Vec<_> = response.results.iter().map(|r| r.target_id.as_str()).collect();
        assert_eq!(ids, vec!["busy", "quiet"]);
        let week = response
            .facets
            .dates
            .iter()
            .find(|f| f.value == "this_week")
            .unwrap();
        assert!(week.selected);
    }

    #[tokio::test]
    async fn test_invalid_requests_rejected() {
        let (engine, _) = engine_with(vec![]).await;

        let bad = [
            SearchRequest {
                limit: Some(0),
                ..Default::default()
            },
            SearchRequest {
                limit: Some(101),
                ..Default::default()
            },
            SearchRequest {
                radius_km: Some(5.0),
                ..Default::default()
            },
            SearchRequest {
                latitude: Some(95.0),
                longitude: Some(0.0),
                ..Default::default()
            },
            SearchRequest {
                price_min: Some(50.0),
                price_max: Some(10.0),
                ..Default::default()
            },
            SearchRequest {
                types: vec!["planet".to_string()],
                ..Default::default()
            },
        ];
        for request in bad {
            let result = engine.search(request, None).await;
            assert!(matches!(result, Err(AppError::Validation(_))));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_searches_feed_suggestions_and_trending() {
        let (engine, _) = engine_with(vec![
            event("a", "Music Night", "Music", "Madrid", 1),
            event("b", "Museum Tour", "Culture", "Madrid", 1),
        ])
        .await;

        engine.search(request("jazz"), Some("u1")).await.unwrap();
        engine.search(request("Jazz "), Some("u2")).await.unwrap();
        engine.search(request("mus"), None).await.unwrap();

        let suggestions = engine.suggestions("MU", None).await.unwrap();
        let texts: Vec<_> = suggestions.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["Museum Tour", "Music Night", "mus", "Music"]);

        // Let the trending entry cached by the first search expire
        tokio::time::advance(Duration::from_secs(31)).await;
        let trending = engine.trending().await.unwrap();
        assert_eq!(trending[0].term, "jazz");
        assert_eq!(trending[0].count, 2);
        assert_eq!(trending[0].window, 24);
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_never_suggests_its_own_text() {
        let (engine, _) = engine_with(vec![]).await;

        let first = engine.search(request("zzqx"), None).await.unwrap();
        assert!(first.suggestions.is_empty());

        tokio::time::advance(Duration::from_secs(31)).await;
        let again = engine.search(request("ZZQX "), None).await.unwrap();
        assert!(again.suggestions.is_empty());

        let completions = engine.suggestions("zz", None).await.unwrap();
        let texts: Vec<_> = completions.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["zzqx"]);
    }

    #[tokio::test]
    async fn test_trending_falls_back_to_catalog_categories() {
        let (engine, _) = engine_with(vec![
            event("a", "Gig", "Music", "Madrid", 1),
            event("b", "Concert", "Music", "Madrid", 1),
            event("c", "Match", "Sports", "Madrid", 1),
        ])
        .await;

        let trending = engine.trending().await.unwrap();
        let terms: Vec<_> = trending.iter().map(|t| (t.term.as_str(), t.count)).collect();
        assert_eq!(terms, vec![("Music", 2), ("Sports", 1)]);
    }

    #[test]
    fn test_request_hash_ignores_query_case() {
        let hash = |r: SearchRequest| request_hash(&r).unwrap();
        assert_eq!(hash(request("Music ")), hash(request("music")));
        assert_ne!(hash(request("music")), hash(request("jazz")));
        assert_eq!(hash(request("music")).len(), 64);

        let filtered = SearchRequest {
            category: Some("Music".to_string()),
            ..request("music")
        };
        assert_ne!(hash(filtered), hash(request("music")));
    }
}
