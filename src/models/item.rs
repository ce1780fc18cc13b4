use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// What kind of catalog entry an item is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Event,
    Venue,
    Organizer,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Event => "event",
            ItemKind::Venue => "venue",
            ItemKind::Organizer => "organizer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "event" | "events" => Some(ItemKind::Event),
            "venue" | "venues" => Some(ItemKind::Venue),
            "organizer" | "organizers" => Some(ItemKind::Organizer),
            _ => None,
        }
    }
}

impl Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latitude/longitude pair in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    const EARTH_RADIUS_KM: f64 = 6371.0;

    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle distance in kilometres (haversine)
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        Self::EARTH_RADIUS_KM * c
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Raw engagement counters tracked for an item
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EngagementMetrics {
    pub views: u64,
    pub likes: u64,
    pub attendees: u64,
    pub shares: u64,
}

impl EngagementMetrics {
    /// Unweighted interaction total, used for catalog ordering
    pub fn total(&self) -> u64 {
        self.views + self.likes + self.attendees + self.shares
    }
}

/// A catalog entry that can be recommended or searched
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub id: String,
    pub kind: ItemKind,
    pub title: String,
    pub description: String,
    pub category: String,
    pub city: String,
    pub venue: Option<String>,
    pub location: Option<GeoPoint>,
    pub tags: Vec<String>,
    pub start_time: DateTime<Utc>,
    pub price: Option<f64>,
    pub cover_image_url: Option<String>,
    pub organizer_ref: Option<String>,
    pub organizer_name: Option<String>,
    pub engagement: Option<EngagementMetrics>,
    pub featured: bool,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
}

impl Item {
    /// Creates an event with only the required fields populated
    pub fn event(
        id: impl Into<String>,
        title: impl Into<String>,
        category: impl Into<String>,
        city: impl Into<String>,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: ItemKind::Event,
            title: title.into(),
            description: String::new(),
            category: category.into(),
            city: city.into(),
            venue: None,
            location: None,
            tags: Vec::new(),
            start_time,
            price: None,
            cover_image_url: None,
            organizer_ref: None,
            organizer_name: None,
            engagement: None,
            featured: false,
            verified: false,
            created_at: Utc::now(),
        }
    }

    pub fn popularity_total(&self) -> u64 {
        self.engagement.map(|m| m.total()).unwrap_or(0)
    }
}

/// Weights of the engagement formula
///
/// `views*view + likes*like + attendees*attend + shares*share`, plus the flat
/// bonuses for featured and verified items. Items without any engagement
/// counters get `default_score` instead of a normalized value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PopularityWeights {
    pub view: f64,
    pub like: f64,
    pub attend: f64,
    pub share: f64,
    pub featured_bonus: f64,
    pub verified_bonus: f64,
    pub default_score: f64,
}

impl Default for PopularityWeights {
    fn default() -> Self {
        Self {
            view: 1.0,
            like: 2.0,
            attend: 3.0,
            share: 1.5,
            featured_bonus: 10.0,
            verified_bonus: 5.0,
            default_score: 0.5,
        }
    }
}

impl PopularityWeights {
    /// Unnormalized popularity, or `None` when the item carries no counters
    pub fn raw_score(&self, item: &Item) -> Option<f64> {
        let metrics = item.engagement?;
        let mut score = metrics.views as f64 * self.view
            + metrics.likes as f64 * self.like
            + metrics.attendees as f64 * self.attend
            + metrics.shares as f64 * self.share;
        if item.featured {
            score += self.featured_bonus;
        }
        if item.verified {
            score += self.verified_bonus;
        }
        Some(score)
    }
}

/// Ordering applied by the catalog store
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum CatalogOrder {
    #[default]
    StartTimeAsc,
    /// Weighted engagement desc, then start time and id. Items without
    /// counters sort as if their raw score were `unmeasured`.
    Popularity {
        weights: PopularityWeights,
        unmeasured: f64,
    },
    CreatedAtDesc,
}

impl CatalogOrder {
    /// Sort key of `item` under [`CatalogOrder::Popularity`]
    pub fn popularity_key(weights: &PopularityWeights, unmeasured: f64, item: &Item) -> f64 {
        weights.raw_score(item).unwrap_or(unmeasured)
    }
}

/// Parameterized catalog filter shared by every strategy and the search engine
///
/// `exclude_seen_by` removes every item the given user has any logged behavior
/// against; stores resolve it themselves so callers never assemble exclusion
/// lists by hand.
#[derive(Debug, Clone, Default)]
pub struct CatalogQuery {
    pub ids: Vec<String>,
    pub kinds: Vec<ItemKind>,
    pub categories: Vec<String>,
    pub cities: Vec<String>,
    pub text: Option<String>,
    pub starts_after: Option<DateTime<Utc>>,
    pub starts_before: Option<DateTime<Utc>>,
    pub created_after: Option<DateTime<Utc>>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub tags: Vec<String>,
    pub organizer: Option<String>,
    pub verified_only: bool,
    pub exclude_seen_by: Option<String>,
    pub limit: Option<usize>,
    pub offset: usize,
    pub order_by: CatalogOrder,
}

impl CatalogQuery {
    /// Upcoming items the user has never interacted with
    pub fn unseen_upcoming(user_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            starts_after: Some(now),
            exclude_seen_by: Some(user_id.to_string()),
            ..Default::default()
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn order_by(mut self, order: CatalogOrder) -> Self {
        self.order_by = order;
        self
    }

    /// Checks every filter except `exclude_seen_by`, which needs behavior data
    pub fn matches(&self, item: &Item) -> bool {
        if !self.ids.is_empty() && !self.ids.contains(&item.id) {
            return false;
        }
        if !self.kinds.is_empty() && !self.kinds.contains(&item.kind) {
            return false;
        }
        if !self.categories.is_empty()
            && !self
                .categories
                .iter()
                .any(|c| c.eq_ignore_ascii_case(&item.category))
        {
            return false;
        }
        if !self.cities.is_empty() && !self.cities.iter().any(|c| c.eq_ignore_ascii_case(&item.city))
        {
            return false;
        }
        if let Some(text) = &self.text {
            if !text_matches(item, text) {
                return false;
            }
        }
        if let Some(after) = self.starts_after {
            if item.start_time < after {
                return false;
            }
        }
        if let Some(before) = self.starts_before {
            if item.start_time > before {
                return false;
            }
        }
        if let Some(created_after) = self.created_after {
            if item.created_at < created_after {
                return false;
            }
        }
        if self.price_min.is_some() || self.price_max.is_some() {
            let price = item.price.unwrap_or(0.0);
            if self.price_min.is_some_and(|min| price < min) {
                return false;
            }
            if self.price_max.is_some_and(|max| price > max) {
                return false;
            }
        }
        if !self.tags.is_empty()
            && !self
                .tags
                .iter()
                .any(|tag| item.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)))
        {
            return false;
        }
        if let Some(organizer) = &self.organizer {
            let by_ref = item.organizer_ref.as_deref() == Some(organizer.as_str());
            let by_name = item
                .organizer_name
                .as_deref()
                .is_some_and(|n| n.eq_ignore_ascii_case(organizer));
            if !by_ref && !by_name {
                return false;
            }
        }
        if self.verified_only && !item.verified {
            return false;
        }
        true
    }
}

/// Case-insensitive substring match over title, description, category and tags
pub fn text_matches(item: &Item, text: &str) -> bool {
    let needle = text.trim().to_lowercase();
    if needle.is_empty() {
        return true;
    }
    item.title.to_lowercase().contains(&needle)
        || item.description.to_lowercase().contains(&needle)
        || item.category.to_lowercase().contains(&needle)
        || item.tags.iter().any(|t| t.to_lowercase().contains(&needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_distance_km_known_pair() {
        // Madrid to Barcelona is roughly 505 km
        let madrid = GeoPoint::new(40.4168, -3.7038);
        let barcelona = GeoPoint::new(41.3874, 2.1686);
        let d = madrid.distance_km(&barcelona);
        assert!((d - 505.0).abs() < 10.0, "got {}", d);
    }

    #[test]
    fn test_distance_km_same_point_is_zero() {
        let p = GeoPoint::new(28.1, -15.4);
        assert!(p.distance_km(&p) < 1e-9);
    }

    #[test]
    fn test_item_kind_parse_plural() {
        assert_eq!(ItemKind::parse("Events"), Some(ItemKind::Event));
        assert_eq!(ItemKind::parse("venue"), Some(ItemKind::Venue));
        assert_eq!(ItemKind::parse("people"), None);
    }

    #[test]
    fn test_catalog_query_text_matches_tags() {
        let mut item = Item::event("e1", "Open Air", "Festival", "Lisbon", Utc::now());
        item.tags = vec!["Jazz".to_string()];

        let query = CatalogQuery {
            text: Some("jazz".to_string()),
            ..Default::default()
        };
        assert!(query.matches(&item));
    }

    #[test]
    fn test_catalog_query_price_and_dates() {
        let now = Utc::now();
        let mut item = Item::event("e1", "Gig", "Music", "Porto", now + Duration::days(2));
        item.price = Some(25.0);

        let in_range = CatalogQuery {
            price_min: Some(10.0),
            price_max: Some(30.0),
            starts_after: Some(now),
            ..Default::default()
        };
        assert!(in_range.matches(&item));

        let too_cheap = CatalogQuery {
            price_max: Some(20.0),
            ..Default::default()
        };
        assert!(!too_cheap.matches(&item));

        let past_only = CatalogQuery {
            starts_before: Some(now),
            ..Default::default()
        };
        assert!(!past_only.matches(&item));
    }

    #[test]
    fn test_catalog_query_category_case_insensitive() {
        let item = Item::event("e1", "Gig", "Music", "Porto", Utc::now());
        let query = CatalogQuery {
            categories: vec!["music".to_string()],
            ..Default::default()
        };
        assert!(query.matches(&item));
    }
}
