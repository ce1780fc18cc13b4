use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt::Display, str::FromStr};

use super::Item;

/// One independent signal source feeding the aggregator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Collaborative,
    ContentBased,
    Popularity,
    Location,
    Category,
    Social,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 6] = [
        StrategyKind::Collaborative,
        StrategyKind::ContentBased,
        StrategyKind::Popularity,
        StrategyKind::Location,
        StrategyKind::Category,
        StrategyKind::Social,
    ];

    /// Tie-break rank; lower wins
    pub fn priority(&self) -> u8 {
        match self {
            StrategyKind::Social => 0,
            StrategyKind::ContentBased => 1,
            StrategyKind::Category => 2,
            StrategyKind::Location => 3,
            StrategyKind::Collaborative => 4,
            StrategyKind::Popularity => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Collaborative => "collaborative",
            StrategyKind::ContentBased => "content_based",
            StrategyKind::Popularity => "popularity",
            StrategyKind::Location => "location",
            StrategyKind::Category => "category",
            StrategyKind::Social => "social",
        }
    }
}

impl Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "collaborative" => Ok(StrategyKind::Collaborative),
            "content_based" | "content" => Ok(StrategyKind::ContentBased),
            "popularity" | "popular" => Ok(StrategyKind::Popularity),
            "location" => Ok(StrategyKind::Location),
            "category" => Ok(StrategyKind::Category),
            "social" => Ok(StrategyKind::Social),
            other => Err(format!("unknown recommendation type '{}'", other)),
        }
    }
}

/// An item proposed by one strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub target_id: String,
    pub strategy: StrategyKind,
    /// Always within [0, 1]
    pub score: f64,
    pub reason: String,
    pub item: Item,
}

/// A merged, deduplicated entry of the final ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    pub target_id: String,
    pub final_score: f64,
    /// Ordered by strategy priority
    pub contributing_strategies: Vec<StrategyKind>,
    pub reason_text: String,
    pub item: Item,
}

/// Requested slice of the recommendation pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecommendationType {
    All,
    Only(StrategyKind),
}

impl RecommendationType {
    pub fn strategies(&self) -> Vec<StrategyKind> {
        match self {
            RecommendationType::All => StrategyKind::ALL.to_vec(),
            RecommendationType::Only(kind) => vec![*kind],
        }
    }
}

impl Display for RecommendationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecommendationType::All => f.write_str("all"),
            RecommendationType::Only(kind) => write!(f, "{}", kind),
        }
    }
}

impl FromStr for RecommendationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            return Ok(RecommendationType::All);
        }
        s.parse().map(RecommendationType::Only)
    }
}

/// Client-facing shape of a single recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationEntry {
    pub id: String,
    pub title: String,
    pub description: String,
    pub start_at: chrono::DateTime<chrono::Utc>,
    pub venue: Option<String>,
    pub city: String,
    pub cover_image_url: Option<String>,
    pub category: String,
    pub organizer: Option<String>,
    pub recommendation_score: f64,
    pub recommendation_type: String,
    pub reason: String,
}

impl RecommendationEntry {
    fn from_item(item: &Item, score: f64, kind: String, reason: String) -> Self {
        Self {
            id: item.id.clone(),
            title: item.title.clone(),
            description: item.description.clone(),
            start_at: item.start_time,
            venue: item.venue.clone(),
            city: item.city.clone(),
            cover_image_url: item.cover_image_url.clone(),
            category: item.category.clone(),
            organizer: item.organizer_name.clone(),
            recommendation_score: score,
            recommendation_type: kind,
            reason,
        }
    }
}

impl From<&Candidate> for RecommendationEntry {
    fn from(candidate: &Candidate) -> Self {
        Self::from_item(
            &candidate.item,
            candidate.score,
            candidate.strategy.to_string(),
            candidate.reason.clone(),
        )
    }
}

impl From<&RankedResult> for RecommendationEntry {
    fn from(result: &RankedResult) -> Self {
        let kind = result
            .contributing_strategies
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(",");
        Self::from_item(
            &result.item,
            result.final_score,
            kind,
            result.reason_text.clone(),
        )
    }
}

/// Per-strategy lists plus the merged ranking when every strategy was requested
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResponse {
    pub user_id: String,
    pub strategies: BTreeMap<StrategyKind, Vec<RecommendationEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged: Option<Vec<RecommendationEntry>>,
    /// Strategies that failed or timed out and contributed nothing
    pub degraded: Vec<StrategyKind>,
}
