use std::collections::HashMap;

use crate::models::{DateBucket, Facet, FacetDimension, Facets, SearchResult};

/// Values currently applied as filters, used to flag selected facets
#[derive(Debug, Clone, Copy, Default)]
pub struct ActiveFilters<'a> {
    pub category: Option<&'a str>,
    pub location: Option<&'a str>,
    pub date_bucket: Option<DateBucket>,
}

impl ActiveFilters<'_> {
    fn category_admits(&self, result: &SearchResult) -> bool {
        self.category
            .map_or(true, |c| c.trim().eq_ignore_ascii_case(&result.category))
    }

    fn location_admits(&self, result: &SearchResult) -> bool {
        self.location
            .map_or(true, |l| l.trim().eq_ignore_ascii_case(&result.city))
    }

    fn date_admits(&self, result: &SearchResult) -> bool {
        match (self.date_bucket, result.date_bucket) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(active), Some(narrowest)) => DateBucket::ALL
                .iter()
                .skip_while(|b| **b != narrowest)
                .any(|b| *b == active),
        }
    }

    /// Whether `result` passes every facet filter
    pub fn admits(&self, result: &SearchResult) -> bool {
        self.category_admits(result) && self.location_admits(result) && self.date_admits(result)
    }
}

fn is_selected(active: Option<&str>, value: &str) -> bool {
    active.is_some_and(|a| a.trim().eq_ignore_ascii_case(value))
}

fn to_facets(
    dimension: FacetDimension,
    counts: HashMap<String, usize>,
    active: Option<&str>,
) -> Vec<Facet> {
    let mut facets: Vec<Facet> = counts
        .into_iter()
        .map(|(value, count)| Facet {
            dimension,
            selected: is_selected(active, &value),
            value,
            count,
        })
        .collect();
    facets.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
    facets
}

/// Builds category, city and date facets over results not yet narrowed by
/// the facet filters.
///
/// Each dimension counts the results passing every *other* active facet
/// filter, so sibling values stay visible next to the selected one. Date
/// buckets nest, so an event today is counted in all three.
pub fn build_facets(results: &[SearchResult], active: ActiveFilters<'_>) -> Facets {
    let mut categories: HashMap<String, usize> = HashMap::new();
    let mut locations: HashMap<String, usize> = HashMap::new();
    let mut dates: HashMap<String, usize> = HashMap::new();

    for result in results {
        let category_ok = active.category_admits(result);
        let location_ok = active.location_admits(result);
        let date_ok = active.date_admits(result);

        if location_ok && date_ok && !result.category.is_empty() {
            *categories.entry(result.category.clone()).or_insert(0) += 1;
        }
        if category_ok && date_ok && !result.city.is_empty() {
            *locations.entry(result.city.clone()).or_insert(0) += 1;
        }
        if !(category_ok && location_ok) {
            continue;
        }
        if let Some(narrowest) = result.date_bucket {
            for bucket in DateBucket::ALL.iter().skip_while(|b| **b != narrowest) {
                *dates.entry(bucket.as_str().to_string()).or_insert(0) += 1;
            }
        }
    }

    Facets {
        categories: to_facets(FacetDimension::Category, categories, active.category),
        locations: to_facets(FacetDimension::Location, locations, active.location),
        dates: to_facets(
            FacetDimension::DateBucket,
            dates,
            active.date_bucket.map(|b| b.as_str()),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Item;
    use crate::services::search::matching::to_result;
    use chrono::{Duration, Utc};

    fn result(id: &str, category: &str, city: &str, days: i64) -> SearchResult {
        let now = Utc::now();
        to_result(
            Item::event(id, id, category, city, now + Duration::days(days)),
            "",
            None,
            now,
        )
    }

    #[test]
    fn test_category_facet_selected_case_insensitive() {
        let results = vec![
            result("a", "Music", "Madrid", 2),
            result("b", "Music", "Madrid", 3),
            result("c", "Sports", "Bilbao", 20),
        ];
        let facets = build_facets(
            &results,
            ActiveFilters {
                category: Some("music"),
                ..Default::default()
            },
        );

        assert_eq!(facets.categories.len(), 2);
        assert_eq!(facets.categories[0].value, "Music");
        assert_eq!(facets.categories[0].count, 2);
        assert!(facets.categories[0].selected);
        assert!(!facets.categories[1].selected);
        assert!(facets.locations.iter().all(|f| !f.selected));
    }

    #[test]
    fn test_each_dimension_ignores_its_own_filter() {
        let results = vec![
            result("a", "Music", "Madrid", 2),
            result("b", "Music", "Bilbao", 3),
            result("c", "Sports", "Madrid", 20),
            result("d", "Theatre", "Bilbao", 20),
        ];
        let active = ActiveFilters {
            category: Some("Music"),
            location: Some("madrid"),
            ..Default::default()
        };
        let facets = build_facets(&results, active);

        let categories: Vec<_> = facets
            .categories
            .iter()
            .map(|f| (f.value.as_str(), f.count, f.selected))
            .collect();
        assert_eq!(categories, vec![("Music", 1, true), ("Sports", 1, false)]);

        let cities: Vec<_> = facets
            .locations
            .iter()
            .map(|f| (f.value.as_str(), f.count, f.selected))
            .collect();
        assert_eq!(cities, vec![("Bilbao", 1, false), ("Madrid", 1, true)]);

        let month = facets.dates.iter().find(|f| f.value == "this_month").unwrap();
        assert_eq!(month.count, 1);

        let admitted: Vec<_> = results
            .iter()
            .filter(|r| active.admits(r))
            .map(|r| r.target_id.as_str())
            .collect();
        assert_eq!(admitted, vec!["a"]);
    }

    #[test]
    fn test_facets_ordered_by_count_then_value() {
        let results = vec![
            result("a", "Theatre", "Porto", 40),
            result("b", "Comedy", "Lisbon", 40),
            result("c", "Comedy", "Lisbon", 40),
            result("d", "Art", "Porto", 40),
        ];
        let facets = build_facets(&results, ActiveFilters::default());

        let values: Vec<_> = facets.categories.iter().map(|f| f.value.as_str()).collect();
        assert_eq!(values, vec!["Comedy", "Art", "Theatre"]);
        let cities: Vec<_> = facets.locations.iter().map(|f| f.value.as_str()).collect();
        assert_eq!(cities, vec!["Lisbon", "Porto"]);
        assert!(facets.dates.is_empty());
    }

    #[test]
    fn test_date_buckets_nest() {
        let results = vec![result("soon", "Music", "Madrid", 3), result("later", "Music", "Madrid", 20)];
        let facets = build_facets(
            &results,
            ActiveFilters {
                date_bucket: Some(DateBucket::ThisMonth),
                ..Default::default()
            },
        );

        let month = facets.dates.iter().find(|f| f.value == "this_month").unwrap();
        assert_eq!(month.count, 2);
        assert!(month.selected);
        let week = facets.dates.iter().find(|f| f.value == "this_week").unwrap();
        assert_eq!(week.count, 1);
        assert!(facets.dates.iter().all(|f| f.value != "today"));
    }
}
