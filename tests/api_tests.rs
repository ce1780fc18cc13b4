use std::{collections::HashSet, sync::Arc};

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use chrono::{Duration, Utc};
use serde_json::{json, Value};

use eventrank::{
    api::{create_router, AppState},
    config::Config,
    db::{ConnectionStatus, MemoryStore},
    models::{EngagementMetrics, Item},
};

const USER_HEADER: HeaderName = HeaderName::from_static("x-user-id");

fn as_user(id: &'static str) -> HeaderValue {
    HeaderValue::from_static(id)
}

fn upcoming(id: &str, title: &str, category: &str, days: i64) -> Item {
    Item::event(id, title, category, "Madrid", Utc::now() + Duration::days(days))
}

/// E1 and E2 are upcoming Music events; U1 and U2 are connected
async fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());

    let mut e1 = upcoming("E1", "Live Music Night", "Music", 2);
    e1.engagement = Some(EngagementMetrics {
        views: 120,
        likes: 30,
        attendees: 10,
        shares: 2,
    });
    store.insert_item(e1).await;

    let mut e2 = upcoming("E2", "Rooftop Session", "Music", 3);
    e2.description = "Acoustic music under the stars".to_string();
    store.insert_item(e2).await;

    store.insert_item(upcoming("E3", "Chess Open", "Games", 4)).await;
    store.connect("U1", "U2", ConnectionStatus::Accepted).await;
    store
}

fn create_test_server(store: Arc<MemoryStore>) -> TestServer {
    let state = AppState::in_memory(&Config::default(), store);
    let app = create_router(state);
    TestServer::new(app).unwrap()
}

async fn record(server: &TestServer, user: &'static str, target: &str, action: &str) {
    let response = server
        .post("/api/v1/behaviors")
        .add_header(USER_HEADER, as_user(user))
        .json(&json!({ "target_id": target, "action_type": action }))
        .await;
    response.assert_status(StatusCode::CREATED);
}

#[tokio::test]
async fn test_health_check() {
    let server = create_test_server(Arc::new(MemoryStore::new()));
    let response = server.get("/health").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let server = create_test_server(Arc::new(MemoryStore::new()));

    let response = server
        .get("/health")
        .add_header(
            HeaderName::from_static("x-request-id"),
            HeaderValue::from_static("gateway-123"),
        )
        .await;
    assert_eq!(response.header("x-request-id"), "gateway-123");

    let response = server.get("/health").await;
    assert!(!response.header("x-request-id").is_empty());
}

#[tokio::test]
async fn test_friend_attendance_recommended_and_seen_items_excluded() {
    let server = create_test_server(seeded_store().await);

    record(&server, "U1", "E1", "like").await;
    record(&server, "U2", "E2", "attend").await;

    let response = server
        .get("/api/v1/recommendations")
        .add_query_param("user_id", "U1")
        .add_query_param("type", "all")
        .add_header(USER_HEADER, as_user("U1"))
        .await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["success"], true);

    let social = body["data"]["strategies"]["social"].as_array().unwrap();
    assert_eq!(social.len(), 1);
    assert_eq!(social[0]["id"], "E2");
    assert_eq!(social[0]["recommendation_score"], 0.9);

    let merged = body["data"]["merged"].as_array().unwrap();
    assert!(merged.iter().all(|e| e["id"] != "E1"));
    let unique: HashSet<_> = merged.iter().map(|e| e["id"].as_str().unwrap()).collect();
    assert_eq!(unique.len(), merged.len());
    assert_eq!(merged[0]["id"], "E2");
}

#[tokio::test]
async fn test_recommendations_require_matching_identity() {
    let server = create_test_server(seeded_store().await);

    let response = server
        .get("/api/v1/recommendations")
        .add_query_param("user_id", "U1")
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["success"], false);

    let response = server
        .get("/api/v1/recommendations")
        .add_query_param("user_id", "U1")
        .add_header(USER_HEADER, as_user("U2"))
        .await;
    response.assert_status(StatusCode::FORBIDDEN);
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_recommendations_reject_bad_parameters() {
    let server = create_test_server(seeded_store().await);

    let response = server
        .get("/api/v1/recommendations")
        .add_query_param("type", "trending")
        .add_header(USER_HEADER, as_user("U1"))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = server
        .get("/api/v1/recommendations")
        .add_query_param("limit", "500")
        .add_header(USER_HEADER, as_user("U1"))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_single_strategy_response_has_no_merged_list() {
    let server = create_test_server(seeded_store().await);

    let response = server
        .get("/api/v1/recommendations")
        .add_query_param("type", "popularity")
        .add_query_param("limit", "2")
        .add_header(USER_HEADER, as_user("U1"))
        .await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert!(body["data"].get("merged").is_none());
    let popular = body["data"]["strategies"]["popularity"].as_array().unwrap();
    assert_eq!(popular.len(), 2);
    assert_eq!(popular[0]["id"], "E1");
    assert_eq!(popular[0]["recommendation_type"], "popularity");
}

#[tokio::test]
async fn test_new_behavior_refreshes_cached_recommendations() {
    let server = create_test_server(seeded_store().await);
    let popular_ids = |body: Value| -> Vec<String> {
        body["data"]["strategies"]["popularity"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["id"].as_str().unwrap().to_string())
            .collect()
    };

    let before = server
        .get("/api/v1/recommendations")
        .add_query_param("type", "popularity")
        .add_header(USER_HEADER, as_user("U1"))
        .await;
    assert!(popular_ids(before.json()).contains(&"E3".to_string()));

    record(&server, "U1", "E3", "view").await;

    let after = server
        .get("/api/v1/recommendations")
        .add_query_param("type", "popularity")
        .add_header(USER_HEADER, as_user("U1"))
        .await;
    assert!(!popular_ids(after.json()).contains(&"E3".to_string()));
}

#[tokio::test]
async fn test_invalidate_recommendation_cache() {
    let server = create_test_server(seeded_store().await);

    let response = server
        .delete("/api/v1/recommendations/cache")
        .add_header(USER_HEADER, as_user("U1"))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["user_id"], "U1");
    assert_eq!(body["data"]["invalidated"], true);
}

#[tokio::test]
async fn test_behavior_validation() {
    let server = create_test_server(seeded_store().await);

    let response = server
        .post("/api/v1/behaviors")
        .add_header(USER_HEADER, as_user("U1"))
        .json(&json!({ "target_id": "E1" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["success"], false);

    let response = server
        .post("/api/v1/behaviors")
        .json(&json!({ "target_id": "E1", "action_type": "view" }))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    let response = server
        .post("/api/v1/behaviors")
        .add_header(USER_HEADER, as_user("U1"))
        .json(&json!({
            "target_id": "E1",
            "action_type": "purchase",
            "metadata": { "tickets": 2 },
            "session_id": "s-1"
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert!(body["data"]["id"].is_string());
}

#[tokio::test]
async fn test_search_is_public_and_ranks_title_matches_first() {
    let server = create_test_server(seeded_store().await);

    let response = server
        .post("/api/v1/search")
        .json(&json!({ "query": "music", "category": "Music" }))
        .await;
    response.assert_status_ok();

    let body: Value = response.json();
    let data = &body["data"];
    assert_eq!(data["total"], 2);
    assert_eq!(data["results"][0]["item"]["title"], "Live Music Night");
    assert_eq!(data["results"][0]["match_tier"], "title");
    assert_eq!(data["results"][1]["match_tier"], "description");

    let category = &data["facets"]["categories"][0];
    assert_eq!(category["value"], "Music");
    assert_eq!(category["count"], 2);
    assert_eq!(category["selected"], true);
    assert!(data["suggestions"].is_array());
    assert!(data["trending"].is_array());
}

#[tokio::test]
async fn test_search_rejects_invalid_filters() {
    let server = create_test_server(seeded_store().await);

    let response = server
        .post("/api/v1/search")
        .json(&json!({ "query": "music", "radius_km": 10.0 }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = server
        .post("/api/v1/search")
        .json(&json!({ "limit": 0 }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_suggestions_and_trending_endpoints() {
    let server = create_test_server(seeded_store().await);

    for _ in 0..2 {
        server
            .post("/api/v1/search")
            .add_header(USER_HEADER, as_user("U1"))
            .json(&json!({ "query": "rooftop" }))
            .await
            .assert_status_ok();
    }

    let response = server
        .get("/api/v1/search/suggestions")
        .add_query_param("q", "li")
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"][0]["text"], "Live Music Night");
    assert_eq!(body["data"][0]["source"], "title");

    let response = server.get("/api/v1/search/trending").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert!(body["data"].is_array());
}

#[tokio::test]
async fn test_metrics_endpoint_reports_operations() {
    let server = create_test_server(seeded_store().await);

    server
        .post("/api/v1/search")
        .json(&json!({ "query": "chess" }))
        .await
        .assert_status_ok();

    let response = server.get("/metrics").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["search:query"]["calls"], 1);
}
