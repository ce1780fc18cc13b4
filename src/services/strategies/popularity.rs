use chrono::{DateTime, Utc};

use super::{to_candidate, Strategy};
use crate::{
    db::Stores,
    error::AppResult,
    models::{Candidate, CatalogOrder, CatalogQuery, PopularityWeights, StrategyKind},
};

/// Catalog-wide trending items.
///
/// Scores are normalized against the most popular upcoming item in the whole
/// catalog, so an item's score does not depend on `limit` or on what the
/// user has already seen.
pub struct PopularityStrategy {
    stores: Stores,
    weights: PopularityWeights,
}

impl PopularityStrategy {
    pub fn new(stores: Stores, weights: PopularityWeights) -> Self {
        Self { stores, weights }
    }

    /// Highest raw score among upcoming items, or 0 when nothing is measured
    async fn catalog_max(&self, now: DateTime<Utc>) -> AppResult<f64> {
        let query = CatalogQuery {
            starts_after: Some(now),
            ..Default::default()
        }
        .order_by(CatalogOrder::Popularity {
            weights: self.weights,
            unmeasured: 0.0,
        })
        .limit(1);

        let top = self.stores.catalog.query_items(&query).await?;
        Ok(top
            .first()
            .and_then(|item| self.weights.raw_score(item))
            .unwrap_or(0.0)
            .max(0.0))
    }

    fn normalize(&self, raw: Option<f64>, max: f64) -> f64 {
        match raw {
            Some(s) if max > 0.0 => (s / max).clamp(0.0, 1.0),
            Some(_) => 0.0,
            None => self.weights.default_score,
        }
    }
}

#[async_trait::async_trait]
impl Strategy for PopularityStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Popularity
    }

    async fn generate(&self, user_id: &str, limit: usize) -> AppResult<Vec<Candidate>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let max = self.catalog_max(now).await?;

        // Unmeasured items sort where their default score lands after normalization
        let unmeasured = if max > 0.0 {
            self.weights.default_score * max
        } else {
            self.weights.default_score
        };

        let items = self
            .stores
            .catalog
            .query_items(
                &CatalogQuery::unseen_upcoming(user_id, now)
                    .order_by(CatalogOrder::Popularity {
                        weights: self.weights,
                        unmeasured,
                    })
                    .limit(limit),
            )
            .await?;

        Ok(items
            .into_iter()
            .map(|item| {
                let score = self.normalize(self.weights.raw_score(&item), max);
                to_candidate(
                    item,
                    StrategyKind::Popularity,
                    score,
                    "Trending in your area".to_string(),
                )
            })
            .collect())
    }
}
