use chrono::{Duration, Utc};
use std::collections::HashMap;

use super::SearchEngine;
use crate::{
    db::CacheKey,
    error::AppResult,
    models::{CatalogQuery, Suggestion, SuggestionSource, TrendingTerm},
};

const TITLE_SCORE: f64 = 0.9;
const RECENT_QUERY_SCORE: f64 = 0.8;
const CATEGORY_SCORE: f64 = 0.7;
/// Catalog rows scanned per requested suggestion
const TITLE_POOL_FACTOR: usize = 10;

/// Deduplicates case-insensitively keeping the best score, then orders by
/// score desc and text
pub fn merge_suggestions(candidates: Vec<Suggestion>, limit: usize) -> Vec<Suggestion> {
    let mut best: HashMap<String, Suggestion> = HashMap::new();
    for suggestion in candidates {
        let key = suggestion.text.to_lowercase();
        match best.get(&key) {
            Some(existing) if existing.score >= suggestion.score => {}
            _ => {
                best.insert(key, suggestion);
            }
        }
    }

    let mut merged: Vec<Suggestion> = best.into_values().collect();
    merged.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.text.cmp(&b.text)));
    merged.truncate(limit);
    merged
}

impl SearchEngine {
    /// Completions for a partially typed query: upcoming titles, categories and
    /// recent popular searches starting with `prefix`
    pub async fn suggestions(&self, prefix: &str, limit: Option<usize>) -> AppResult<Vec<Suggestion>> {
        let prefix = prefix.trim().to_lowercase();
        let limit = limit.unwrap_or(self.settings.suggestion_limit);
        if prefix.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let key = CacheKey::Suggestions {
            prefix: prefix.clone(),
            limit,
        };
        self.cache
            .get_or_compute(&key, Some(self.settings.cache_ttl), || {
                self.compute_suggestions(prefix.clone(), limit)
            })
            .await
    }

    async fn compute_suggestions(&self, prefix: String, limit: usize) -> AppResult<Vec<Suggestion>> {
        let timer = self.metrics.start("search", "suggestions");
        let now = Utc::now();

        let items = self
            .catalog
            .query_items(&CatalogQuery {
                text: Some(prefix.clone()),
                starts_after: Some(now),
                limit: Some(limit.saturating_mul(TITLE_POOL_FACTOR)),
                ..Default::default()
            })
            .await;
        let items = match items {
            Ok(items) => items,
            Err(e) => {
                timer.finish(false);
                return Err(e);
            }
        };

        let mut candidates = Vec::new();
        for item in &items {
            if item.title.to_lowercase().starts_with(&prefix) {
                candidates.push(Suggestion {
                    text: item.title.clone(),
                    score: TITLE_SCORE,
                    source: SuggestionSource::Title,
                });
            }
            if item.category.to_lowercase().starts_with(&prefix) {
                candidates.push(Suggestion {
                    text: item.category.clone(),
                    score: CATEGORY_SCORE,
                    source: SuggestionSource::Category,
                });
            }
        }

        // The typed text itself is not a completion
        let since = now - Duration::days(self.settings.suggestion_window_days);
        match self.query_log.counts(since, Some(&prefix), limit + 1).await {
            Ok(recent) => candidates.extend(
                recent
                    .into_iter()
                    .filter(|(text, _)| *text != prefix)
                    .map(|(text, _)| Suggestion {
                        text,
                        score: RECENT_QUERY_SCORE,
                        source: SuggestionSource::RecentQuery,
                    }),
            ),
            Err(e) => tracing::warn!(error = %e, "Recent query lookup failed"),
        }

        timer.finish(true);
        Ok(merge_suggestions(candidates, limit))
    }

    /// Most searched terms over the trending window, falling back to the
    /// categories of newly created items when nobody searched
    pub async fn trending(&self) -> AppResult<Vec<TrendingTerm>> {
        let key = CacheKey::Trending {
            window_hours: self.settings.trending_window_hours,
            limit: self.settings.trending_limit,
        };
        self.cache
            .get_or_compute(&key, Some(self.settings.cache_ttl), || self.compute_trending())
            .await
    }

    async fn compute_trending(&self) -> AppResult<Vec<TrendingTerm>> {
        let timer = self.metrics.start("search", "trending");
        let window = self.settings.trending_window_hours;
        let limit = self.settings.trending_limit;
        let since = Utc::now() - Duration::hours(window);

        let result = async {
            let queries = self.query_log.counts(since, None, limit).await?;
            if !queries.is_empty() {
                return Ok(queries);
            }
            tracing::debug!("No recent searches, using catalog categories for trending");
            self.catalog.category_counts(since, limit).await
        }
        .await;
        timer.finish(result.is_ok());

        let mut terms: Vec<TrendingTerm> = result?
            .into_iter()
            .map(|(term, count)| TrendingTerm {
                term,
                count,
                window,
            })
            .collect();
        terms.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.term.cmp(&b.term)));
        terms.truncate(limit);
        Ok(terms)
    }
}
