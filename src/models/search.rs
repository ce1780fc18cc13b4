use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::Item;

/// Result ordering requested by the client
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    #[default]
    Relevance,
    Date,
    Popularity,
    Distance,
}

/// Fixed date windows offered as facets, anchored at the start of the current day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateBucket {
    Today,
    ThisWeek,
    ThisMonth,
}

impl DateBucket {
    pub const ALL: [DateBucket; 3] = [DateBucket::Today, DateBucket::ThisWeek, DateBucket::ThisMonth];

    pub fn as_str(&self) -> &'static str {
        match self {
            DateBucket::Today => "today",
            DateBucket::ThisWeek => "this_week",
            DateBucket::ThisMonth => "this_month",
        }
    }

    /// Half-open `[start, end)` range of the bucket relative to `now`
    pub fn range(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|d| d.and_utc())
            .unwrap_or(now);
        let days = match self {
            DateBucket::Today => 1,
            DateBucket::ThisWeek => 7,
            DateBucket::ThisMonth => 30,
        };
        (start, start + Duration::days(days))
    }

    pub fn contains(&self, now: DateTime<Utc>, at: DateTime<Utc>) -> bool {
        let (start, end) = self.range(now);
        at >= start && at < end
    }

    /// Narrowest bucket containing `at`, if any
    pub fn classify(now: DateTime<Utc>, at: DateTime<Utc>) -> Option<DateBucket> {
        Self::ALL.into_iter().find(|b| b.contains(now, at))
    }
}

/// Search request body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchRequest {
    pub query: String,
    pub types: Vec<String>,
    pub category: Option<String>,
    /// City filter
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub radius_km: Option<f64>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub date_bucket: Option<DateBucket>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub sort_by: SortBy,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub tags: Vec<String>,
    pub organizer_filter: Option<String>,
    pub verified_only: bool,
    pub include_past: bool,
}

/// Which field produced the relevance score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchTier {
    Title,
    Description,
    Category,
    Other,
}

impl MatchTier {
    /// 1 for title through 4 for anything else
    pub fn rank(&self) -> u8 {
        match self {
            MatchTier::Title => 1,
            MatchTier::Description => 2,
            MatchTier::Category => 3,
            MatchTier::Other => 4,
        }
    }

    pub fn score(&self) -> f64 {
        match self {
            MatchTier::Title => 0.9,
            MatchTier::Description => 0.7,
            MatchTier::Category => 0.6,
            MatchTier::Other => 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub target_id: String,
    pub relevance_score: f64,
    pub match_tier: MatchTier,
    /// Names of the fields the query text matched
    pub highlights: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
    pub category: String,
    pub city: String,
    pub date_bucket: Option<DateBucket>,
    pub item: Item,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacetDimension {
    Category,
    Location,
    DateBucket,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facet {
    pub dimension: FacetDimension,
    pub value: String,
    pub count: usize,
    pub selected: bool,
}

/// Facets grouped per dimension
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Facets {
    pub categories: Vec<Facet>,
    pub locations: Vec<Facet>,
    pub dates: Vec<Facet>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionSource {
    Title,
    Category,
    RecentQuery,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub text: String,
    pub score: f64,
    pub source: SuggestionSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendingTerm {
    pub term: String,
    pub count: u64,
    /// Look-back window in hours
    pub window: i64,
}

/// Filtered, sorted and paginated results with their facets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
    pub results: Vec<SearchResult>,
    pub facets: Facets,
    /// Size of the filtered set before pagination
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub facets: Facets,
    pub suggestions: Vec<Suggestion>,
    pub trending: Vec<TrendingTerm>,
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_date_bucket_classify() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 15, 0, 0).unwrap();

        let tonight = Utc.with_ymd_and_hms(2026, 3, 10, 21, 0, 0).unwrap();
        let in_three_days = Utc.with_ymd_and_hms(2026, 3, 13, 12, 0, 0).unwrap();
        let in_two_weeks = Utc.with_ymd_and_hms(2026, 3, 24, 12, 0, 0).unwrap();
        let next_quarter = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();

        assert_eq!(DateBucket::classify(now, tonight), Some(DateBucket::Today));
        assert_eq!(DateBucket::classify(now, in_three_days), Some(DateBucket::ThisWeek));
        assert_eq!(DateBucket::classify(now, in_two_weeks), Some(DateBucket::ThisMonth));
        assert_eq!(DateBucket::classify(now, next_quarter), None);
    }

    #[test]
    fn test_search_request_defaults() {
        let request: SearchRequest = serde_json::from_str(r#"{"query": "jazz"}"#).unwrap();
        assert_eq!(request.query, "jazz");
        assert_eq!(request.sort_by, SortBy::Relevance);
        assert!(!request.include_past);
        assert!(request.types.is_empty());
    }

    #[test]
    fn test_match_tier_scores() {
        assert_eq!(MatchTier::Title.score(), 0.9);
        assert_eq!(MatchTier::Description.score(), 0.7);
        assert_eq!(MatchTier::Category.score(), 0.6);
        assert_eq!(MatchTier::Other.score(), 0.3);
        assert!(MatchTier::Title.rank() < MatchTier::Other.rank());
    }
}
