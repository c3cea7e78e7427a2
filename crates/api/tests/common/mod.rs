#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use stride_api::auth::jwt::{generate_access_token, JwtConfig};
use stride_api::config::{DeliveryConfig, ServerConfig, StoreBackend, WorkflowConfig};
use stride_api::router::build_app_router;
use stride_api::state::AppState;
use stride_core::capabilities::{ActorContext, RoleClass, UserProfile};
use stride_core::types::DbId;
use stride_db::{MemoryStore, WorkflowStore};

// ---------------------------------------------------------------------------
// Directory fixture
// ---------------------------------------------------------------------------

/// Leadership; supervises ALICE and BOB.
pub const LEAD: DbId = 1001;
pub const ALICE: DbId = 1002;
pub const BOB: DbId = 1003;
/// Reports to ALICE.
pub const CAROL: DbId = 1004;
/// Holds `goal_freeze` and `goal_manage`.
pub const OPS: DbId = 1005;
/// Different department, no supervisor.
pub const OUTSIDER: DbId = 1006;
/// Deactivated account in ALICE's department.
pub const GONE: DbId = 1007;

const DEPT_PRODUCT: DbId = 1;
const DEPT_SALES: DbId = 2;

fn profile(
    id: DbId,
    name: &str,
    supervisor_id: Option<DbId>,
    department_id: DbId,
    role_class: RoleClass,
    permissions: &[&str],
) -> UserProfile {
    UserProfile {
        id,
        name: name.to_string(),
        supervisor_id,
        department_id: Some(department_id),
        role_class,
        permissions: permissions.iter().map(|p| p.to_string()).collect(),
        is_active: true,
    }
}

pub fn directory() -> Vec<UserProfile> {
    let mut gone = profile(GONE, "Gil", Some(LEAD), DEPT_PRODUCT, RoleClass::Regular, &[]);
    gone.is_active = false;
    vec![
        profile(LEAD, "Lena", None, DEPT_PRODUCT, RoleClass::Leadership, &["goal_approve"]),
        profile(ALICE, "Alice", Some(LEAD), DEPT_PRODUCT, RoleClass::Regular, &[]),
        profile(BOB, "Bob", Some(LEAD), DEPT_PRODUCT, RoleClass::Regular, &[]),
        profile(CAROL, "Carol", Some(ALICE), DEPT_PRODUCT, RoleClass::Regular, &[]),
        profile(
            OPS,
            "Omar",
            None,
            DEPT_PRODUCT,
            RoleClass::Regular,
            &["goal_freeze", "goal_manage"],
        ),
        profile(OUTSIDER, "Oscar", None, DEPT_SALES, RoleClass::Regular, &[]),
        gone,
    ]
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

/// Build a test `ServerConfig` with safe defaults and the in-memory backend.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        jwt: JwtConfig {
            secret: "integration-test-secret".to_string(),
            access_token_expiry_mins: 60,
        },
        database_url: None,
        store_backend: StoreBackend::Memory,
        workflow: WorkflowConfig::default(),
        delivery: DeliveryConfig::default(),
    }
}

/// Application wired exactly as in `main.rs`, over a seeded memory store.
pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: ServerConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        for user in directory() {
            store.upsert_user(&user).await.unwrap();
        }
        let state = AppState::new(store.clone(), config.clone());
        tokio::spawn(stride_events::EventPersistence::run(
            store.clone(),
            state.event_bus.subscribe(),
        ));
        let app = build_app_router(state.clone(), &config);
        Self { app, state, store }
    }

    pub fn token(&self, user_id: DbId) -> String {
        generate_access_token(user_id, "user", &self.state.config.jwt).unwrap()
    }

    pub async fn actor(&self, user_id: DbId) -> ActorContext {
        self.state.engine.resolve_actor(user_id).await.unwrap()
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        user: Option<DbId>,
        body: Option<Value>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user_id) = user {
            builder = builder.header("authorization", format!("Bearer {}", self.token(user_id)));
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.app.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str, user: DbId) -> Response<Body> {
        self.request(Method::GET, uri, Some(user), None).await
    }

    pub async fn post(&self, uri: &str, user: DbId, body: Value) -> Response<Body> {
        self.request(Method::POST, uri, Some(user), Some(body)).await
    }

    pub async fn put(&self, uri: &str, user: DbId, body: Value) -> Response<Body> {
        self.request(Method::PUT, uri, Some(user), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, user: DbId) -> Response<Body> {
        self.request(Method::DELETE, uri, Some(user), None).await
    }
}

/// Send an unauthenticated GET to `app`.
pub async fn get(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

/// Collect a response body as JSON.
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Assert the status and return the `data` field of the envelope.
pub async fn expect_data(response: Response<Body>, status: StatusCode) -> Value {
    let actual = response.status();
    let json = body_json(response).await;
    assert_eq!(actual, status, "unexpected status, body: {json}");
    json["data"].clone()
}

/// Assert an error response and return its `code`.
pub async fn expect_error(response: Response<Body>, status: StatusCode) -> String {
    let actual = response.status();
    let json = body_json(response).await;
    assert_eq!(actual, status, "unexpected status, body: {json}");
    json["code"].as_str().unwrap_or_default().to_string()
}
