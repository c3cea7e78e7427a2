//! Inbox endpoints and the ordering of pushed notifications.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use axum::http::StatusCode;
use chrono::Utc;
use serde_json::{json, Value};

use common::{expect_data, expect_error, test_config, TestApp, ALICE, BOB, CAROL, LEAD};

fn individual(assignee: i64) -> Value {
    json!({
        "title": "Quarterly report",
        "kind": "INDIVIDUAL",
        "assignee_ids": [assignee],
        "due_date": (Utc::now() + chrono::Duration::days(7)).to_rfc3339(),
    })
}

async fn create(app: &TestApp, creator: i64, body: Value) -> i64 {
    let created = expect_data(app.post("/api/v1/initiatives", creator, body).await, StatusCode::CREATED).await;
    created["id"].as_i64().unwrap()
}

async fn inbox(app: &TestApp, user: i64, query: &str) -> Vec<Value> {
    let data = expect_data(app.get(&format!("/api/v1/notifications{query}"), user).await, StatusCode::OK).await;
    data.as_array().unwrap().clone()
}

/// ALICE's inbox: two `initiative_assigned` (medium) and one
/// `initiative_rejected` (high).
async fn mixed_inbox_for_alice(app: &TestApp) {
    create(app, LEAD, individual(ALICE)).await;
    create(app, LEAD, individual(ALICE)).await;
    let own = create(app, ALICE, individual(ALICE)).await;
    expect_data(
        app.put(
            &format!("/api/v1/initiatives/{own}/approve"),
            LEAD,
            json!({ "approved": false, "rejection_reason": "Not this quarter" }),
        )
        .await,
        StatusCode::OK,
    )
    .await;
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_commits_reach_a_channel_in_persisted_order() {
    let app = Arc::new(TestApp::new().await);
    let (_handle, mut rx) = app.state.registry.register(LEAD).await;

    let mut tasks = Vec::new();
    for i in 0..60 {
        let app = Arc::clone(&app);
        let creator = if i % 2 == 0 { ALICE } else { BOB };
        tasks.push(tokio::spawn(async move {
            let response = app.post("/api/v1/initiatives", creator, individual(creator)).await;
            assert_eq!(response.status(), StatusCode::CREATED);
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let mut pushed = Vec::new();
    for _ in 0..60 {
        let frame = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("push timed out")
            .expect("channel closed");
        let Message::Text(text) = frame else {
            panic!("expected a text frame");
        };
        let frame: Value = serde_json::from_str(text.as_str()).unwrap();
        pushed.push(frame["notification"]["id"].as_i64().unwrap());
    }

    let mut persisted: Vec<i64> = inbox(&app, LEAD, "?limit=100")
        .await
        .iter()
        .map(|n| n["id"].as_i64().unwrap())
        .collect();
    persisted.sort_unstable();

    assert_eq!(pushed, persisted);
}

// ---------------------------------------------------------------------------
// Expiry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn expired_notifications_are_invisible() {
    let mut config = test_config();
    config.workflow.notification_retention_days = -1;
    let app = TestApp::with_config(config).await;

    create(&app, ALICE, individual(ALICE)).await;

    assert!(inbox(&app, LEAD, "").await.is_empty());
    let count = expect_data(app.get("/api/v1/notifications/unread-count", LEAD).await, StatusCode::OK).await;
    assert_eq!(count["count"], 0);
    let stats = expect_data(app.get("/api/v1/notifications/stats", LEAD).await, StatusCode::OK).await;
    assert_eq!(stats["total_count"], 0);
    let marked = expect_data(app.post("/api/v1/notifications/read-all", LEAD, json!({})).await, StatusCode::OK).await;
    assert_eq!(marked["marked_read"], 0);
}

// ---------------------------------------------------------------------------
// Filters and stats
// ---------------------------------------------------------------------------

#[tokio::test]
async fn listing_filters_by_type_and_priority() {
    let app = TestApp::new().await;
    mixed_inbox_for_alice(&app).await;

    assert_eq!(inbox(&app, ALICE, "").await.len(), 3);

    let assigned = inbox(&app, ALICE, "?notification_type=initiative_assigned").await;
    assert_eq!(assigned.len(), 2);
    assert!(assigned.iter().all(|n| n["type"] == "initiative_assigned"));

    let high = inbox(&app, ALICE, "?priority=high").await;
    assert_eq!(high.len(), 1);
    assert_eq!(high[0]["type"], "initiative_rejected");

    let none = inbox(&app, ALICE, "?notification_type=initiative_rejected&priority=low").await;
    assert!(none.is_empty());

    let response = app.get("/api/v1/notifications?priority=critical", ALICE).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn stats_break_down_the_callers_inbox() {
    let app = TestApp::new().await;
    mixed_inbox_for_alice(&app).await;
    let first = inbox(&app, ALICE, "?notification_type=initiative_assigned").await[0]["id"]
        .as_i64()
        .unwrap();
    expect_data(
        app.post(&format!("/api/v1/notifications/{first}/read"), ALICE, json!({})).await,
        StatusCode::OK,
    )
    .await;

    let stats = expect_data(app.get("/api/v1/notifications/stats", ALICE).await, StatusCode::OK).await;
    assert_eq!(stats["total_count"], 3);
    assert_eq!(stats["unread_count"], 2);
    assert_eq!(stats["by_type"], json!({ "initiative_assigned": 2, "initiative_rejected": 1 }));
    assert_eq!(stats["by_priority"], json!({ "high": 1, "medium": 2 }));

    let empty = expect_data(app.get("/api/v1/notifications/stats", CAROL).await, StatusCode::OK).await;
    assert_eq!(empty["total_count"], 0);
    assert_eq!(empty["by_type"], json!({}));
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

#[tokio::test]
async fn only_the_recipient_deletes_a_notification() {
    let app = TestApp::new().await;
    create(&app, ALICE, individual(ALICE)).await;
    let id = inbox(&app, LEAD, "").await[0]["id"].as_i64().unwrap();
    let uri = format!("/api/v1/notifications/{id}");

    let code = expect_error(app.delete(&uri, ALICE).await, StatusCode::NOT_FOUND).await;
    assert_eq!(code, "NOT_FOUND");

    assert_eq!(app.delete(&uri, LEAD).await.status(), StatusCode::NO_CONTENT);
    assert!(inbox(&app, LEAD, "").await.is_empty());
    expect_error(app.delete(&uri, LEAD).await, StatusCode::NOT_FOUND).await;
}

// ---------------------------------------------------------------------------
// Connection stats
// ---------------------------------------------------------------------------

#[tokio::test]
async fn connection_stats_count_channels_and_users() {
    let app = TestApp::new().await;
    let (tab, _rx_tab) = app.state.registry.register(LEAD).await;
    let (phone, _rx_phone) = app.state.registry.register(LEAD).await;
    let (_alice, _rx_alice) = app.state.registry.register(ALICE).await;

    let stats = expect_data(app.get("/api/v1/notifications/connection-stats", LEAD).await, StatusCode::OK).await;
    assert_eq!(stats["active_users"], 2);
    assert_eq!(stats["total_connections"], 3);
    assert_eq!(stats["user_online"], true);
    let mut handles: Vec<String> = stats["channels"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["handle"].as_str().unwrap().to_string())
        .collect();
    handles.sort();
    let mut expected = vec![tab.to_string(), phone.to_string()];
    expected.sort();
    assert_eq!(handles, expected);

    let offline = expect_data(app.get("/api/v1/notifications/connection-stats", BOB).await, StatusCode::OK).await;
    assert_eq!(offline["user_online"], false);
    assert_eq!(offline["channels"], json!([]));
}
