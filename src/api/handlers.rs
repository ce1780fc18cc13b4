use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        RecommendationResponse, RecommendationType, SearchRequest, SearchResponse, Suggestion,
        TrendingTerm,
    },
    services::{metrics::OperationStats, BehaviorInput},
};

use super::{auth::Caller, AppState};

// Request/Response types

/// Success envelope shared by every endpoint
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct RecommendationParams {
    pub user_id: Option<String>,
    pub limit: Option<usize>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InvalidationResponse {
    pub user_id: String,
    pub invalidated: bool,
}

#[derive(Debug, Deserialize)]
pub struct SuggestionParams {
    #[serde(default)]
    pub q: String,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct BehaviorCreated {
    pub id: Uuid,
}

// Handlers

pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// GET /api/v1/recommendations
pub async fn get_recommendations(
    State(state): State<AppState>,
    caller: Caller,
    Query(params): Query<RecommendationParams>,
) -> AppResult<Json<ApiResponse<RecommendationResponse>>> {
    let user_id = params
        .user_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| caller.id().to_string());
    caller.ensure_is(&user_id)?;

    let kind = match params.kind.as_deref().map(str::trim) {
        None | Some("") => RecommendationType::All,
        Some(raw) => raw.parse().map_err(AppError::Validation)?,
    };

    let response = state
        .inner
        .recommendations
        .get_recommendations(&user_id, params.limit, kind)
        .await?;
    Ok(ApiResponse::ok(response))
}

/// DELETE /api/v1/recommendations/cache
pub async fn invalidate_recommendations(
    State(state): State<AppState>,
    caller: Caller,
) -> Json<ApiResponse<InvalidationResponse>> {
    let invalidated = state
        .inner
        .recommendations
        .invalidate(caller.id())
        .await
        .is_ok();
    ApiResponse::ok(InvalidationResponse {
        user_id: caller.id().to_string(),
        invalidated,
    })
}

/// POST /api/v1/search
pub async fn search(
    State(state): State<AppState>,
    caller: Option<Caller>,
    Json(request): Json<SearchRequest>,
) -> AppResult<Json<ApiResponse<SearchResponse>>> {
    let response = state
        .inner
        .search
        .search(request, caller.as_ref().map(|c| c.id()))
        .await?;
    Ok(ApiResponse::ok(response))
}

/// GET /api/v1/search/suggestions
pub async fn suggestions(
    State(state): State<AppState>,
    Query(params): Query<SuggestionParams>,
) -> AppResult<Json<ApiResponse<Vec<Suggestion>>>> {
    let suggestions = state
        .inner
        .search
        .suggestions(&params.q, params.limit)
        .await?;
    Ok(ApiResponse::ok(suggestions))
}

/// GET /api/v1/search/trending
pub async fn trending(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<Vec<TrendingTerm>>>> {
    let trending = state.inner.search.trending().await?;
    Ok(ApiResponse::ok(trending))
}

/// POST /api/v1/behaviors
pub async fn record_behavior(
    State(state): State<AppState>,
    caller: Caller,
    Json(input): Json<BehaviorInput>,
) -> AppResult<(StatusCode, Json<ApiResponse<BehaviorCreated>>)> {
    let id = state
        .inner
        .behaviors
        .record_behavior(caller.id(), input)
        .await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(BehaviorCreated { id })))
}

/// GET /metrics
pub async fn metrics(
    State(state): State<AppState>,
) -> Json<ApiResponse<BTreeMap<String, OperationStats>>> {
    ApiResponse::ok(state.inner.metrics.snapshot())
}
