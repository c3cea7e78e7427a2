//! Handlers for the `/initiatives` resource.
//!
//! Every endpoint resolves the caller into an [`Actor`] and delegates to the
//! [`WorkflowEngine`](crate::engine::WorkflowEngine).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use stride_core::initiative::{Initiative, InitiativeExtension, NewInitiative};
use stride_core::types::{DbId, Timestamp};
use stride_db::models::event::DomainEventRecord;
use validator::Validate;

use crate::error::AppResult;
use crate::middleware::auth::Actor;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

/// Body for `PUT /initiatives/{id}/approve` and `PUT /goals/{id}/approve`.
#[derive(Debug, Deserialize, Validate)]
pub struct DecisionBody {
    pub approved: bool,
    #[validate(length(max = 2000))]
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CompleteBody {
    #[validate(length(max = 10000))]
    pub report: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReviewBody {
    pub approved: bool,
    #[validate(range(min = 1, max = 10))]
    pub score: Option<i16>,
    #[validate(length(max = 5000))]
    pub feedback: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ExtensionRequestBody {
    pub new_due_date: Timestamp,
    #[validate(length(max = 2000))]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ExtensionReviewBody {
    pub approved: bool,
    #[validate(length(max = 2000))]
    pub note: Option<String>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/initiatives
pub async fn create_initiative(
    Actor(actor): Actor,
    State(state): State<AppState>,
    Json(input): Json<NewInitiative>,
) -> AppResult<(StatusCode, Json<DataResponse<Initiative>>)> {
    let initiative = state.engine.create_initiative(&actor, input).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: initiative })))
}

/// GET /api/v1/initiatives/{id}
pub async fn get_initiative(
    Actor(_actor): Actor,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Initiative>>> {
    let initiative = state.engine.get_initiative(id).await?;
    Ok(Json(DataResponse { data: initiative }))
}

/// GET /api/v1/initiatives/{id}/history
///
/// The event log is written asynchronously, so the newest transition may
/// appear a moment after its response.
pub async fn initiative_history(
    Actor(_actor): Actor,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<DomainEventRecord>>>> {
    let events = state.engine.initiative_history(id).await?;
    Ok(Json(DataResponse { data: events }))
}

/// PUT /api/v1/initiatives/{id}/approve
pub async fn approve_initiative(
    Actor(actor): Actor,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(body): Json<DecisionBody>,
) -> AppResult<Json<DataResponse<Initiative>>> {
    body.validate()?;
    let initiative = state
        .engine
        .decide_initiative(&actor, id, body.approved, body.rejection_reason.as_deref())
        .await?;
    Ok(Json(DataResponse { data: initiative }))
}

/// PUT /api/v1/initiatives/{id}/accept
pub async fn accept_initiative(
    Actor(actor): Actor,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Initiative>>> {
    let initiative = state.engine.accept_initiative(&actor, id).await?;
    Ok(Json(DataResponse { data: initiative }))
}

/// PUT /api/v1/initiatives/{id}/start
pub async fn start_initiative(
    Actor(actor): Actor,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Initiative>>> {
    let initiative = state.engine.start_initiative(&actor, id).await?;
    Ok(Json(DataResponse { data: initiative }))
}

/// PUT /api/v1/initiatives/{id}/complete
///
/// Submit for review with a completion report.
pub async fn complete_initiative(
    Actor(actor): Actor,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(body): Json<CompleteBody>,
) -> AppResult<Json<DataResponse<Initiative>>> {
    body.validate()?;
    let initiative = state
        .engine
        .submit_initiative(&actor, id, body.report.as_deref())
        .await?;
    Ok(Json(DataResponse { data: initiative }))
}

/// POST /api/v1/initiatives/{id}/review
pub async fn review_initiative(
    Actor(actor): Actor,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(body): Json<ReviewBody>,
) -> AppResult<Json<DataResponse<Initiative>>> {
    body.validate()?;
    let initiative = state
        .engine
        .review_initiative(&actor, id, body.approved, body.score, body.feedback.as_deref())
        .await?;
    Ok(Json(DataResponse { data: initiative }))
}

/// POST /api/v1/initiatives/{id}/extension-request
pub async fn request_extension(
    Actor(actor): Actor,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(body): Json<ExtensionRequestBody>,
) -> AppResult<(StatusCode, Json<DataResponse<InitiativeExtension>>)> {
    body.validate()?;
    let extension = state
        .engine
        .request_extension(&actor, id, body.new_due_date, body.reason.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: extension })))
}

/// PUT /api/v1/initiatives/{id}/extension/{extension_id}
pub async fn review_extension(
    Actor(actor): Actor,
    State(state): State<AppState>,
    Path((id, extension_id)): Path<(DbId, DbId)>,
    Json(body): Json<ExtensionReviewBody>,
) -> AppResult<Json<DataResponse<InitiativeExtension>>> {
    body.validate()?;
    let extension = state
        .engine
        .review_extension(&actor, id, extension_id, body.approved, body.note.as_deref())
        .await?;
    Ok(Json(DataResponse { data: extension }))
}
