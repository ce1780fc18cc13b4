use chrono::{DateTime, Utc};
use std::cmp::Ordering;

use crate::models::{DateBucket, GeoPoint, Item, MatchTier, SearchResult, SortBy};

/// Determines the best matching tier and every matched field for `text`.
///
/// Fields are checked in tier order; tags only ever produce the baseline tier.
/// Blank text matches everything at the baseline.
pub fn match_item(item: &Item, text: &str) -> (MatchTier, Vec<String>) {
    let needle = text.trim().to_lowercase();
    if needle.is_empty() {
        return (MatchTier::Other, Vec::new());
    }

    let fields = [
        ("title", MatchTier::Title, item.title.to_lowercase().contains(&needle)),
        (
            "description",
            MatchTier::Description,
            item.description.to_lowercase().contains(&needle),
        ),
        (
            "category",
            MatchTier::Category,
            item.category.to_lowercase().contains(&needle),
        ),
        (
            "tags",
            MatchTier::Other,
            item.tags.iter().any(|t| t.to_lowercase().contains(&needle)),
        ),
    ];

    let mut tier = MatchTier::Other;
    let mut highlights = Vec::new();
    for (field, field_tier, matched) in fields {
        if matched {
            if highlights.is_empty() {
                tier = field_tier;
            }
            highlights.push(field.to_string());
        }
    }
    (tier, highlights)
}

/// Scores one filtered item. `origin` is the search point, when one was given.
pub fn to_result(
    item: Item,
    text: &str,
    origin: Option<&GeoPoint>,
    now: DateTime<Utc>,
) -> SearchResult {
    let (tier, highlights) = match_item(&item, text);
    let distance_km = match (origin, item.location.as_ref()) {
        (Some(origin), Some(location)) => Some(origin.distance_km(location)),
        _ => None,
    };

    SearchResult {
        target_id: item.id.clone(),
        relevance_score: tier.score(),
        match_tier: tier,
        highlights,
        distance_km,
        category: item.category.clone(),
        city: item.city.clone(),
        date_bucket: DateBucket::classify(now, item.start_time),
        item,
    }
}

fn by_distance(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Orders results in place. Every mode falls back to `target_id` so pages are stable.
pub fn sort_results(results: &mut [SearchResult], sort_by: SortBy) {
    results.sort_by(|a, b| {
        let primary = match sort_by {
            SortBy::Relevance => a
                .match_tier
                .rank()
                .cmp(&b.match_tier.rank())
                .then_with(|| a.item.start_time.cmp(&b.item.start_time)),
            SortBy::Date => a.item.start_time.cmp(&b.item.start_time),
            SortBy::Popularity => b.item.popularity_total().cmp(&a.item.popularity_total()),
            SortBy::Distance => by_distance(a.distance_km, b.distance_km),
        };
        primary.then_with(|| a.target_id.cmp(&b.target_id))
    });
}
