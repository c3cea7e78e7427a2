//! End-to-end initiative lifecycle through the HTTP surface.

mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use axum::http::StatusCode;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use stride_core::error::CoreError;
use stride_core::initiative::{InitiativeKind, NewInitiative, Urgency};
use stride_db::{NotificationFilter, WorkflowStore};

use common::{
    expect_data, expect_error, test_config, TestApp, ALICE, BOB, CAROL, GONE, LEAD, OPS, OUTSIDER,
};

fn individual(assignee: i64, due_in_days: i64) -> Value {
    json!({
        "title": "Quarterly report",
        "kind": "INDIVIDUAL",
        "assignee_ids": [assignee],
        "due_date": (Utc::now() + Duration::days(due_in_days)).to_rfc3339(),
    })
}

async fn create(app: &TestApp, creator: i64, body: Value) -> Value {
    expect_data(app.post("/api/v1/initiatives", creator, body).await, StatusCode::CREATED).await
}

async fn notification_types(app: &TestApp, user: i64) -> Vec<String> {
    let data = expect_data(app.get("/api/v1/notifications", user).await, StatusCode::OK).await;
    data.as_array()
        .unwrap()
        .iter()
        .map(|n| n["type"].as_str().unwrap().to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// Initial status
// ---------------------------------------------------------------------------

#[tokio::test]
async fn initial_status_follows_creator_and_assignees() {
    let app = TestApp::new().await;

    let own = create(&app, ALICE, individual(ALICE, 7)).await;
    assert_eq!(own["status"], "PENDING_APPROVAL");

    let to_report = create(&app, ALICE, individual(CAROL, 7)).await;
    assert_eq!(to_report["status"], "ASSIGNED");

    let to_peer = create(&app, ALICE, individual(BOB, 7)).await;
    assert_eq!(to_peer["status"], "PENDING_APPROVAL");

    let lead_self = create(&app, LEAD, individual(LEAD, 7)).await;
    assert_eq!(lead_self["status"], "PENDING");

    let lead_other = create(&app, LEAD, individual(BOB, 7)).await;
    assert_eq!(lead_other["status"], "ASSIGNED");
}

#[tokio::test]
async fn pending_approval_notifies_supervisor_even_with_no_channel_open() {
    let app = TestApp::new().await;
    assert_eq!(app.state.registry.connection_count().await, 0);

    create(&app, ALICE, individual(ALICE, 7)).await;

    let lead = expect_data(app.get("/api/v1/notifications", LEAD).await, StatusCode::OK).await;
    assert_eq!(lead.as_array().unwrap().len(), 1);
    assert_eq!(lead[0]["type"], "initiative_submitted_for_approval");
    assert_eq!(lead[0]["priority"], "high");
    assert_eq!(lead[0]["triggered_by_id"], ALICE);

    let count = expect_data(app.get("/api/v1/notifications/unread-count", LEAD).await, StatusCode::OK).await;
    assert_eq!(count["count"], 1);
    assert!(notification_types(&app, ALICE).await.is_empty());
}

// ---------------------------------------------------------------------------
// Creation validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn group_requires_team_head_among_assignees() {
    let app = TestApp::new().await;
    let due = (Utc::now() + Duration::days(7)).to_rfc3339();

    let no_head = json!({
        "title": "Launch", "kind": "GROUP", "assignee_ids": [ALICE, BOB], "due_date": due,
    });
    let code = expect_error(app.post("/api/v1/initiatives", LEAD, no_head).await, StatusCode::BAD_REQUEST).await;
    assert_eq!(code, "VALIDATION_ERROR");

    let outside_head = json!({
        "title": "Launch", "kind": "GROUP", "assignee_ids": [ALICE, BOB],
        "team_head_id": CAROL, "due_date": due,
    });
    expect_error(app.post("/api/v1/initiatives", LEAD, outside_head).await, StatusCode::BAD_REQUEST).await;

    let single = json!({
        "title": "Launch", "kind": "GROUP", "assignee_ids": [ALICE],
        "team_head_id": ALICE, "due_date": due,
    });
    expect_error(app.post("/api/v1/initiatives", LEAD, single).await, StatusCode::BAD_REQUEST).await;

    let ok = json!({
        "title": "Launch", "kind": "GROUP", "assignee_ids": [ALICE, BOB],
        "team_head_id": BOB, "due_date": due,
    });
    let created = create(&app, LEAD, ok).await;
    assert_eq!(created["team_head_id"], BOB);
    assert_eq!(created["status"], "ASSIGNED");
}

#[tokio::test]
async fn assignees_must_be_active_and_in_department() {
    let app = TestApp::new().await;

    let code = expect_error(
        app.post("/api/v1/initiatives", ALICE, individual(OUTSIDER, 7)).await,
        StatusCode::FORBIDDEN,
    )
    .await;
    assert_eq!(code, "FORBIDDEN");

    // Leadership may assign across departments.
    create(&app, LEAD, individual(OUTSIDER, 7)).await;

    expect_error(
        app.post("/api/v1/initiatives", ALICE, individual(GONE, 7)).await,
        StatusCode::BAD_REQUEST,
    )
    .await;
    expect_error(
        app.post("/api/v1/initiatives", ALICE, individual(424242, 7)).await,
        StatusCode::BAD_REQUEST,
    )
    .await;
}

#[tokio::test]
async fn unknown_goal_link_is_rejected() {
    let app = TestApp::new().await;
    let mut body = individual(ALICE, 7);
    body["goal_id"] = json!(9999);

    expect_error(app.post("/api/v1/initiatives", ALICE, body).await, StatusCode::BAD_REQUEST).await;
}

/// ALICE's approved Q1/2025 goal, then an initiative LEAD assigns to ALICE
/// under it, then a quarter freeze. Returns the initiative id.
async fn initiative_under_frozen_goal(app: &TestApp) -> i64 {
    let goal = expect_data(
        app.post(
            "/api/v1/goals",
            ALICE,
            json!({
                "title": "Q1 target", "duration": "QUARTERLY", "scope": "INDIVIDUAL",
                "quarter": "Q1", "year": 2025,
            }),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;
    let goal_id = goal["id"].as_i64().unwrap();
    expect_data(
        app.put(&format!("/api/v1/goals/{goal_id}/approve"), LEAD, json!({ "approved": true })).await,
        StatusCode::OK,
    )
    .await;

    let mut body = individual(ALICE, 7);
    body["goal_id"] = json!(goal_id);
    let initiative = create(app, LEAD, body).await;

    expect_data(
        app.post("/api/v1/goals/freeze-quarter", OPS, json!({ "quarter": "Q1", "year": 2025 })).await,
        StatusCode::OK,
    )
    .await;
    initiative["id"].as_i64().unwrap()
}

#[tokio::test]
async fn goal_freeze_blocks_linked_initiatives_only_when_coupled() {
    let mut config = test_config();
    config.workflow.couple_initiatives_to_goal_freeze = true;
    let coupled = TestApp::with_config(config).await;
    let id = initiative_under_frozen_goal(&coupled).await;
    expect_error(
        coupled.put(&format!("/api/v1/initiatives/{id}/accept"), ALICE, json!({})).await,
        StatusCode::CONFLICT,
    )
    .await;

    let independent = TestApp::new().await;
    let id = initiative_under_frozen_goal(&independent).await;
    let accepted = expect_data(
        independent.put(&format!("/api/v1/initiatives/{id}/accept"), ALICE, json!({})).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(accepted["status"], "PENDING");
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn assigned_initiative_walks_through_redo_to_approval() {
    let app = TestApp::new().await;
    let created = create(&app, LEAD, individual(ALICE, 7)).await;
    let id = created["id"].as_i64().unwrap();
    let base = format!("/api/v1/initiatives/{id}");

    let accepted = expect_data(app.put(&format!("{base}/accept"), ALICE, json!({})).await, StatusCode::OK).await;
    assert_eq!(accepted["status"], "PENDING");
    let started = expect_data(app.put(&format!("{base}/start"), ALICE, json!({})).await, StatusCode::OK).await;
    assert_eq!(started["status"], "ONGOING");

    // A report is required to submit.
    expect_error(app.put(&format!("{base}/complete"), ALICE, json!({ "report": "  " })).await, StatusCode::BAD_REQUEST).await;
    let submitted = expect_data(
        app.put(&format!("{base}/complete"), ALICE, json!({ "report": "Done, see doc" })).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(submitted["status"], "UNDER_REVIEW");
    assert_eq!(submitted["completion_report"], "Done, see doc");

    // Redo needs feedback.
    expect_error(
        app.post(&format!("{base}/review"), LEAD, json!({ "approved": false })).await,
        StatusCode::BAD_REQUEST,
    )
    .await;
    let redo = expect_data(
        app.post(&format!("{base}/review"), LEAD, json!({ "approved": false, "feedback": "Add figures" })).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(redo["status"], "ONGOING");

    expect_data(
        app.put(&format!("{base}/complete"), ALICE, json!({ "report": "Figures added" })).await,
        StatusCode::OK,
    )
    .await;

    // Score must be within 1..=10.
    expect_error(
        app.post(&format!("{base}/review"), LEAD, json!({ "approved": true, "score": 11 })).await,
        StatusCode::BAD_REQUEST,
    )
    .await;
    let approved = expect_data(
        app.post(&format!("{base}/review"), LEAD, json!({ "approved": true, "score": 8 })).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(approved["status"], "APPROVED");
    assert_eq!(approved["score"], 8);

    let alice = notification_types(&app, ALICE).await;
    assert!(alice.contains(&"initiative_assigned".to_string()));
    assert_eq!(alice.iter().filter(|t| *t == "initiative_reviewed").count(), 2);

    let lead = notification_types(&app, LEAD).await;
    assert!(lead.contains(&"initiative_accepted".to_string()));
    assert!(lead.contains(&"initiative_started".to_string()));
    assert_eq!(lead.iter().filter(|t| *t == "initiative_submitted").count(), 2);

    let fetched = expect_data(app.get(&base, BOB).await, StatusCode::OK).await;
    assert_eq!(fetched["status"], "APPROVED");
}

#[tokio::test]
async fn only_supervisor_or_approver_decides_and_rejection_needs_reason() {
    let app = TestApp::new().await;
    let created = create(&app, ALICE, individual(ALICE, 7)).await;
    let id = created["id"].as_i64().unwrap();
    let uri = format!("/api/v1/initiatives/{id}/approve");

    expect_error(app.put(&uri, BOB, json!({ "approved": true })).await, StatusCode::FORBIDDEN).await;
    expect_error(app.put(&uri, LEAD, json!({ "approved": false })).await, StatusCode::BAD_REQUEST).await;

    let rejected = expect_data(
        app.put(&uri, LEAD, json!({ "approved": false, "rejection_reason": "Out of scope" })).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(rejected["status"], "REJECTED");
    assert_eq!(rejected["feedback"], "Out of scope");

    // Terminal: the entity moved on.
    let code = expect_error(app.put(&uri, LEAD, json!({ "approved": true })).await, StatusCode::CONFLICT).await;
    assert_eq!(code, "CONFLICT");
    assert_eq!(notification_types(&app, ALICE).await, vec!["initiative_rejected"]);
}

#[tokio::test]
async fn transition_from_wrong_status_is_a_conflict() {
    let app = TestApp::new().await;
    let created = create(&app, ALICE, individual(ALICE, 7)).await;
    let id = created["id"].as_i64().unwrap();

    expect_error(
        app.put(&format!("/api/v1/initiatives/{id}/start"), ALICE, json!({})).await,
        StatusCode::CONFLICT,
    )
    .await;
    expect_error(
        app.put(&format!("/api/v1/initiatives/{id}/accept"), BOB, json!({})).await,
        StatusCode::FORBIDDEN,
    )
    .await;
    expect_error(app.get("/api/v1/initiatives/9999", ALICE).await, StatusCode::NOT_FOUND).await;
}

#[tokio::test]
async fn group_submission_is_reserved_for_the_team_head() {
    let app = TestApp::new().await;
    let created = create(
        &app,
        LEAD,
        json!({
            "title": "Launch", "kind": "GROUP", "assignee_ids": [ALICE, BOB],
            "team_head_id": BOB, "due_date": (Utc::now() + Duration::days(3)).to_rfc3339(),
        }),
    )
    .await;
    let base = format!("/api/v1/initiatives/{}", created["id"]);

    expect_data(app.put(&format!("{base}/accept"), ALICE, json!({})).await, StatusCode::OK).await;
    expect_data(app.put(&format!("{base}/start"), BOB, json!({})).await, StatusCode::OK).await;

    expect_error(
        app.put(&format!("{base}/complete"), ALICE, json!({ "report": "done" })).await,
        StatusCode::FORBIDDEN,
    )
    .await;
    let submitted = expect_data(
        app.put(&format!("{base}/complete"), BOB, json!({ "report": "done" })).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(submitted["status"], "UNDER_REVIEW");
}

// ---------------------------------------------------------------------------
// Overdue and extensions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn overdue_blocks_submit_until_extension_is_approved() {
    let app = TestApp::new().await;
    let created = create(&app, LEAD, individual(ALICE, -1)).await;
    let id = created["id"].as_i64().unwrap();
    let base = format!("/api/v1/initiatives/{id}");

    expect_data(app.put(&format!("{base}/accept"), ALICE, json!({})).await, StatusCode::OK).await;
    expect_data(app.put(&format!("{base}/start"), ALICE, json!({})).await, StatusCode::OK).await;
    expect_error(
        app.put(&format!("{base}/complete"), ALICE, json!({ "report": "late" })).await,
        StatusCode::CONFLICT,
    )
    .await;

    let new_due = (Utc::now() + Duration::days(5)).to_rfc3339();
    let past_due = (Utc::now() - Duration::days(5)).to_rfc3339();
    expect_error(
        app.post(&format!("{base}/extension-request"), ALICE, json!({ "new_due_date": past_due, "reason": "x" })).await,
        StatusCode::BAD_REQUEST,
    )
    .await;
    expect_error(
        app.post(&format!("{base}/extension-request"), BOB, json!({ "new_due_date": new_due, "reason": "x" })).await,
        StatusCode::FORBIDDEN,
    )
    .await;

    let extension = expect_data(
        app.post(&format!("{base}/extension-request"), ALICE, json!({ "new_due_date": new_due, "reason": "Waiting on data" })).await,
        StatusCode::CREATED,
    )
    .await;
    assert_eq!(extension["status"], "PENDING");

    // One pending request at a time.
    expect_error(
        app.post(&format!("{base}/extension-request"), ALICE, json!({ "new_due_date": new_due, "reason": "again" })).await,
        StatusCode::CONFLICT,
    )
    .await;
    assert!(notification_types(&app, LEAD).await.contains(&"extension_requested".to_string()));

    let ext_uri = format!("{base}/extension/{}", extension["id"]);
    expect_error(app.put(&ext_uri, ALICE, json!({ "approved": true })).await, StatusCode::FORBIDDEN).await;
    let reviewed = expect_data(
        app.put(&ext_uri, LEAD, json!({ "approved": true, "note": "ok" })).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(reviewed["status"], "APPROVED");
    expect_error(app.put(&ext_uri, LEAD, json!({ "approved": true })).await, StatusCode::CONFLICT).await;

    let submitted = expect_data(
        app.put(&format!("{base}/complete"), ALICE, json!({ "report": "on time now" })).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(submitted["status"], "UNDER_REVIEW");
    assert!(notification_types(&app, ALICE).await.contains(&"extension_reviewed".to_string()));
}

#[tokio::test]
async fn extension_is_refused_while_not_overdue() {
    let app = TestApp::new().await;
    let created = create(&app, LEAD, individual(ALICE, 3)).await;
    let uri = format!("/api/v1/initiatives/{}/extension-request", created["id"]);

    expect_error(
        app.post(
            &uri,
            ALICE,
            json!({ "new_due_date": (Utc::now() + Duration::days(9)).to_rfc3339(), "reason": "more time" }),
        )
        .await,
        StatusCode::CONFLICT,
    )
    .await;
}

#[tokio::test]
async fn overdue_sweep_announces_each_initiative_once() {
    let app = TestApp::new().await;
    create(&app, LEAD, individual(ALICE, -2)).await;
    create(&app, LEAD, individual(BOB, 4)).await;

    let announced = app.state.engine.sweep_overdue(Utc::now(), 50).await.unwrap();
    assert_eq!(announced, 1);
    assert_eq!(app.state.engine.sweep_overdue(Utc::now(), 50).await.unwrap(), 0);

    let alice = expect_data(app.get("/api/v1/notifications?unread_only=true", ALICE).await, StatusCode::OK).await;
    let overdue: Vec<&Value> = alice
        .as_array()
        .unwrap()
        .iter()
        .filter(|n| n["type"] == "initiative_overdue")
        .collect();
    assert_eq!(overdue.len(), 1);
    assert_eq!(overdue[0]["priority"], "urgent");
    assert!(overdue[0]["triggered_by_id"].is_null());

    // Creator hears about it too.
    assert!(notification_types(&app, LEAD).await.contains(&"initiative_overdue".to_string()));
    assert!(!notification_types(&app, BOB).await.contains(&"initiative_overdue".to_string()));
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_approvals_yield_one_success_and_one_conflict() {
    let app = TestApp::new().await;
    let alice = app.actor(ALICE).await;
    let lead = app.actor(LEAD).await;

    let created = app
        .state
        .engine
        .create_initiative(
            &alice,
            NewInitiative {
                title: "Race".into(),
                description: None,
                kind: InitiativeKind::Individual,
                assignee_ids: vec![ALICE],
                team_head_id: None,
                goal_id: None,
                due_date: Utc::now() + Duration::days(2),
                urgency: Urgency::Medium,
            },
        )
        .await
        .unwrap();

    let engine = Arc::clone(&app.state.engine);
    let mut tasks = Vec::new();
    for _ in 0..2 {
        let engine = Arc::clone(&engine);
        let lead = lead.clone();
        let id = created.id;
        tasks.push(tokio::spawn(async move {
            engine.decide_initiative(&lead, id, true, None).await
        }));
    }

    let mut results = Vec::new();
    for task in tasks {
        results.push(task.await.unwrap());
    }

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let failure = results.into_iter().find(|r| r.is_err()).unwrap();
    assert_matches!(failure, Err(CoreError::Conflict(_)));

    let stored = app.state.engine.get_initiative(created.id).await.unwrap();
    assert_eq!(stored.version, created.version + 1);

    // Exactly one approval notification reached Alice.
    let notes = app
        .store
        .list_notifications(ALICE, NotificationFilter::default(), Utc::now(), 50, 0)
        .await
        .unwrap();
    assert_eq!(notes.len(), 1);
}
