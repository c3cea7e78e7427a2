//! Health endpoint, authentication and routing fallbacks.

mod common;

use axum::http::{Method, StatusCode};

use common::{body_json, expect_error, get, TestApp, ALICE, GONE};

#[tokio::test]
async fn health_is_served_at_root_and_under_api() {
    let app = TestApp::new().await;

    for uri in ["/health", "/api/v1/health"] {
        let response = get(app.app.clone(), uri).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["db_healthy"], true);
        assert_eq!(json["connections"], 0);
    }
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let app = TestApp::new().await;
    let code = expect_error(get(app.app.clone(), "/api/v1/nothing-here").await, StatusCode::NOT_FOUND).await;
    assert_eq!(code, "NOT_FOUND");
}

#[tokio::test]
async fn protected_routes_require_a_token() {
    let app = TestApp::new().await;

    let code = expect_error(get(app.app.clone(), "/api/v1/notifications").await, StatusCode::UNAUTHORIZED).await;
    assert_eq!(code, "UNAUTHORIZED");

    let response = app
        .request(Method::GET, "/api/v1/goals/1", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn inactive_user_cannot_act() {
    let app = TestApp::new().await;
    let body = serde_json::json!({
        "title": "Ghost goal", "duration": "QUARTERLY", "scope": "INDIVIDUAL",
        "quarter": "Q1", "year": 2025,
    });
    expect_error(app.post("/api/v1/goals", GONE, body).await, StatusCode::UNAUTHORIZED).await;
}

#[tokio::test]
async fn missing_entity_is_not_found() {
    let app = TestApp::new().await;
    let code = expect_error(app.get("/api/v1/goals/424242", ALICE).await, StatusCode::NOT_FOUND).await;
    assert_eq!(code, "NOT_FOUND");
    expect_error(app.get("/api/v1/initiatives/424242", ALICE).await, StatusCode::NOT_FOUND).await;
}
