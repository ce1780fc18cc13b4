use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{
    BehaviorStore, CatalogStore, ConnectionStatus, PreferenceStore, QueryLogStore,
    SocialGraphStore,
};
use crate::{
    error::{AppError, AppResult},
    models::{
        BehaviorEvent, BehaviorOrder, BehaviorQuery, CatalogOrder, CatalogQuery,
        EngagementMetrics, GeoPoint, Item, ItemKind, NewBehaviorEvent, PopularityWeights,
    },
};

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// The pool automatically manages connection lifecycle and limits.
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(pool)
}

const ITEM_COLUMNS: &str = "i.id, i.kind, i.title, i.description, i.category, i.city, i.venue, \
     i.latitude, i.longitude, i.tags, i.start_time, i.price, i.cover_image_url, \
     i.organizer_id, i.organizer_name, i.view_count, i.like_count, i.attendee_count, \
     i.share_count, i.featured, i.verified, i.created_at";

#[derive(sqlx::FromRow)]
struct ItemRow {
    id: String,
    kind: String,
    title: String,
    description: Option<String>,
    category: String,
    city: String,
    venue: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    tags: Vec<String>,
    start_time: DateTime<Utc>,
    price: Option<f64>,
    cover_image_url: Option<String>,
    organizer_id: Option<String>,
    organizer_name: Option<String>,
    view_count: Option<i64>,
    like_count: Option<i64>,
    attendee_count: Option<i64>,
    share_count: Option<i64>,
    featured: bool,
    verified: bool,
    created_at: DateTime<Utc>,
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        let counters = [
            row.view_count,
            row.like_count,
            row.attendee_count,
            row.share_count,
        ];
        // No counters at all means the item was never measured
        let engagement = counters.iter().any(Option::is_some).then(|| {
            let count = |c: Option<i64>| c.unwrap_or(0).max(0) as u64;
            EngagementMetrics {
                views: count(row.view_count),
                likes: count(row.like_count),
                attendees: count(row.attendee_count),
                shares: count(row.share_count),
            }
        });

        let location = match (row.latitude, row.longitude) {
            (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)),
            _ => None,
        };

        Item {
            id: row.id,
            kind: ItemKind::parse(&row.kind).unwrap_or(ItemKind::Event),
            title: row.title,
            description: row.description.unwrap_or_default(),
            category: row.category,
            city: row.city,
            venue: row.venue,
            location,
            tags: row.tags,
            start_time: row.start_time,
            price: row.price,
            cover_image_url: row.cover_image_url,
            organizer_ref: row.organizer_id,
            organizer_name: row.organizer_name,
            engagement,
            featured: row.featured,
            verified: row.verified,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct BehaviorRow {
    id: Uuid,
    user_id: String,
    target_id: String,
    action_type: String,
    metadata: Option<serde_json::Value>,
    session_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<BehaviorRow> for BehaviorEvent {
    type Error = AppError;

    fn try_from(row: BehaviorRow) -> Result<Self, Self::Error> {
        let action_type = row
            .action_type
            .parse()
            .map_err(|e: String| AppError::Internal(format!("Corrupt behavior row {}: {}", row.id, e)))?;

        Ok(BehaviorEvent {
            id: row.id,
            user_id: row.user_id,
            target_id: row.target_id,
            action_type,
            metadata: row.metadata.unwrap_or(serde_json::Value::Null),
            session_id: row.session_id,
            timestamp: row.created_at,
        })
    }
}

/// Escapes LIKE wildcards so user text is matched literally
fn like_pattern(text: &str) -> String {
    let escaped = text
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn lowercase_all(values: &[String]) -> Vec<String> {
    values.iter().map(|v| v.to_lowercase()).collect()
}

/// PostgreSQL implementation of every store trait
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Appends the WHERE clauses of `query` to `qb`
    fn push_catalog_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &CatalogQuery) {
        if !query.ids.is_empty() {
            qb.push(" AND i.id = ANY(").push_bind(query.ids.clone()).push(")");
        }
        if !query.kinds.is_empty() {
            let kinds: Vec<String> = query.kinds.iter().map(|k| k.as_str().to_string()).collect();
            qb.push(" AND i.kind = ANY(").push_bind(kinds).push(")");
        }
        if !query.categories.is_empty() {
            qb.push(" AND LOWER(i.category) = ANY(")
                .push_bind(lowercase_all(&query.categories))
                .push(")");
        }
        if !query.cities.is_empty() {
            qb.push(" AND LOWER(i.city) = ANY(")
                .push_bind(lowercase_all(&query.cities))
                .push(")");
        }
        if let Some(text) = query.text.as_deref().filter(|t| !t.trim().is_empty()) {
            let pattern = like_pattern(text);
            qb.push(" AND (i.title ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR i.description ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR i.category ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR EXISTS (SELECT 1 FROM unnest(i.tags) t WHERE t ILIKE ")
                .push_bind(pattern)
                .push("))");
        }
        if let Some(after) = query.starts_after {
            qb.push(" AND i.start_time >= ").push_bind(after);
        }
        if let Some(before) = query.starts_before {
            qb.push(" AND i.start_time <= ").push_bind(before);
        }
        if let Some(created_after) = query.created_after {
            qb.push(" AND i.created_at >= ").push_bind(created_after);
        }
        if let Some(min) = query.price_min {
            qb.push(" AND COALESCE(i.price, 0) >= ").push_bind(min);
        }
        if let Some(max) = query.price_max {
            qb.push(" AND COALESCE(i.price, 0) <= ").push_bind(max);
        }
        if !query.tags.is_empty() {
            qb.push(" AND EXISTS (SELECT 1 FROM unnest(i.tags) t WHERE LOWER(t) = ANY(")
                .push_bind(lowercase_all(&query.tags))
                .push("))");
        }
        if let Some(organizer) = &query.organizer {
            qb.push(" AND (i.organizer_id = ")
                .push_bind(organizer.clone())
                .push(" OR LOWER(i.organizer_name) = ")
                .push_bind(organizer.to_lowercase())
                .push(")");
        }
        if query.verified_only {
            qb.push(" AND i.verified");
        }
        if let Some(user_id) = &query.exclude_seen_by {
            qb.push(
                " AND NOT EXISTS (SELECT 1 FROM user_behaviors b WHERE b.target_id = i.id AND b.user_id = ",
            )
            .push_bind(user_id.clone())
            .push(")");
        }
    }
}

impl PgStore {
    /// Weighted engagement expression matching `PopularityWeights::raw_score`
    fn push_popularity_key(
        qb: &mut QueryBuilder<'_, Postgres>,
        weights: &PopularityWeights,
        unmeasured: f64,
    ) {
        qb.push(
            "(CASE WHEN i.view_count IS NULL AND i.like_count IS NULL \
             AND i.attendee_count IS NULL AND i.share_count IS NULL THEN ",
        )
        .push_bind(unmeasured)
        .push("::float8 ELSE COALESCE(i.view_count, 0)::float8 * ")
        .push_bind(weights.view)
        .push("::float8 + COALESCE(i.like_count, 0)::float8 * ")
        .push_bind(weights.like)
        .push("::float8 + COALESCE(i.attendee_count, 0)::float8 * ")
        .push_bind(weights.attend)
        .push("::float8 + COALESCE(i.share_count, 0)::float8 * ")
        .push_bind(weights.share)
        .push("::float8 + CASE WHEN i.featured THEN ")
        .push_bind(weights.featured_bonus)
        .push("::float8 ELSE 0 END + CASE WHEN i.verified THEN ")
        .push_bind(weights.verified_bonus)
        .push("::float8 ELSE 0 END END)");
    }
}

#[async_trait::async_trait]
impl BehaviorStore for PgStore {
    async fn append(&self, event: NewBehaviorEvent) -> AppResult<Uuid> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO user_behaviors (id, user_id, target_id, action_type, metadata, session_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&event.user_id)
        .bind(&event.target_id)
        .bind(event.action_type.as_str())
        .bind(&event.metadata)
        .bind(&event.session_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn query_events(&self, query: &BehaviorQuery) -> AppResult<Vec<BehaviorEvent>> {
        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(
            "SELECT id, user_id, target_id, action_type, metadata, session_id, created_at \
             FROM user_behaviors WHERE TRUE",
        );

        if let Some(user_id) = &query.user_id {
            qb.push(" AND user_id = ").push_bind(user_id.clone());
        }
        if !query.user_ids.is_empty() {
            qb.push(" AND user_id = ANY(")
                .push_bind(query.user_ids.clone())
                .push(")");
        }
        if let Some(excluded) = &query.exclude_user {
            qb.push(" AND user_id <> ").push_bind(excluded.clone());
        }
        if !query.target_ids.is_empty() {
            qb.push(" AND target_id = ANY(")
                .push_bind(query.target_ids.clone())
                .push(")");
        }
        if !query.actions.is_empty() {
            let actions: Vec<String> = query.actions.iter().map(|a| a.as_str().to_string()).collect();
            qb.push(" AND action_type = ANY(").push_bind(actions).push(")");
        }
        if let Some(since) = query.since {
            qb.push(" AND created_at >= ").push_bind(since);
        }
        qb.push(match query.order {
            BehaviorOrder::NewestFirst => " ORDER BY created_at DESC, id",
            BehaviorOrder::OldestFirst => " ORDER BY created_at ASC, id",
        });
        if let Some(limit) = query.limit {
            qb.push(" LIMIT ").push_bind(limit as i64);
        }

        let rows: Vec<BehaviorRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(BehaviorEvent::try_from).collect()
    }
}

#[async_trait::async_trait]
impl CatalogStore for PgStore {
    async fn query_items(&self, query: &CatalogQuery) -> AppResult<Vec<Item>> {
        let mut qb: QueryBuilder<'_, Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM items i WHERE TRUE", ITEM_COLUMNS));

        Self::push_catalog_filters(&mut qb, query);

        match query.order_by {
            CatalogOrder::StartTimeAsc => {
                qb.push(" ORDER BY i.start_time ASC, i.id");
            }
            CatalogOrder::Popularity {
                weights,
                unmeasured,
            } => {
                qb.push(" ORDER BY ");
                Self::push_popularity_key(&mut qb, &weights, unmeasured);
                qb.push(" DESC, i.start_time ASC, i.id");
            }
            CatalogOrder::CreatedAtDesc => {
                qb.push(" ORDER BY i.created_at DESC, i.id");
            }
        }
        if let Some(limit) = query.limit {
            qb.push(" LIMIT ").push_bind(limit as i64);
        }
        if query.offset > 0 {
            qb.push(" OFFSET ").push_bind(query.offset as i64);
        }

        let rows: Vec<ItemRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Item::from).collect())
    }

    async fn category_counts(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<(String, u64)>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT category, COUNT(*) AS count
            FROM items
            WHERE created_at >= $1
            GROUP BY category
            ORDER BY count DESC, category ASC
            LIMIT $2
            "#,
        )
        .bind(since)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(category, count)| (category, count.max(0) as u64))
            .collect())
    }
}

#[async_trait::async_trait]
impl SocialGraphStore for PgStore {
    async fn connections(
        &self,
        user_id: &str,
        status: ConnectionStatus,
    ) -> AppResult<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT CASE WHEN user_id = $1 THEN connected_user_id ELSE user_id END
            FROM user_connections
            WHERE (user_id = $1 OR connected_user_id = $1) AND status = $2
            "#,
        )
        .bind(user_id)
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }
}

#[async_trait::async_trait]
impl PreferenceStore for PgStore {
    async fn favorite_categories(&self, user_id: &str) -> AppResult<Vec<String>> {
        let categories: Option<Vec<String>> = sqlx::query_scalar(
            "SELECT favorite_categories FROM user_preferences WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(categories.unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl QueryLogStore for PgStore {
    async fn record(&self, user_id: Option<&str>, text: &str) -> AppResult<()> {
        sqlx::query("INSERT INTO search_queries (id, user_id, query) VALUES ($1, $2, $3)")
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn counts(
        &self,
        since: DateTime<Utc>,
        prefix: Option<&str>,
        limit: usize,
    ) -> AppResult<Vec<(String, u64)>> {
        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(
            "SELECT query, COUNT(*) AS count FROM search_queries WHERE created_at >= ",
        );
        qb.push_bind(since);
        if let Some(prefix) = prefix {
            let escaped = prefix
                .trim()
                .to_lowercase()
                .replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_");
            qb.push(" AND query LIKE ").push_bind(format!("{}%", escaped));
        }
        qb.push(" GROUP BY query ORDER BY count DESC, query ASC LIMIT ")
            .push_bind(limit as i64);

        let rows: Vec<(String, i64)> = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|(query, count)| (query, count.max(0) as u64))
            .collect())
    }
}
