//! Handlers for the `/goals` resource, including quarter freezes.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use stride_core::goal::{
    FreezeRequest, Goal, GoalFreezeLog, GoalProgressReport, GoalStatus, NewGoal, Quarter,
    UnfreezeRequest,
};
use stride_core::types::DbId;
use stride_db::models::event::DomainEventRecord;
use validator::Validate;

use crate::engine::FreezeOutcome;
use crate::error::AppResult;
use crate::handlers::initiatives::DecisionBody;
use crate::middleware::auth::Actor;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct ProgressBody {
    #[validate(range(min = 0, max = 100))]
    pub new_percentage: i16,
    #[validate(length(min = 1, max = 10000))]
    pub report: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub status: GoalStatus,
}

#[derive(Debug, Deserialize)]
pub struct FreezeLogQuery {
    pub quarter: Option<Quarter>,
    pub year: Option<i32>,
}

/// A progress update: the goal as written plus the appended report.
#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    pub goal: Goal,
    pub report: GoalProgressReport,
}

// ---------------------------------------------------------------------------
// Goals
// ---------------------------------------------------------------------------

/// POST /api/v1/goals
pub async fn create_goal(
    Actor(actor): Actor,
    State(state): State<AppState>,
    Json(input): Json<NewGoal>,
) -> AppResult<(StatusCode, Json<DataResponse<Goal>>)> {
    let goal = state.engine.create_goal(&actor, input).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: goal })))
}

/// GET /api/v1/goals/{id}
pub async fn get_goal(
    Actor(_actor): Actor,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Goal>>> {
    let goal = state.engine.get_goal(id).await?;
    Ok(Json(DataResponse { data: goal }))
}

/// GET /api/v1/goals/{id}/children
pub async fn list_children(
    Actor(_actor): Actor,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<Goal>>>> {
    let children = state.engine.child_goals(id).await?;
    Ok(Json(DataResponse { data: children }))
}

/// GET /api/v1/goals/{id}/progress-reports
pub async fn list_progress_reports(
    Actor(_actor): Actor,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<GoalProgressReport>>>> {
    let reports = state.engine.progress_reports(id).await?;
    Ok(Json(DataResponse { data: reports }))
}

/// GET /api/v1/goals/{id}/history
pub async fn goal_history(
    Actor(_actor): Actor,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<DomainEventRecord>>>> {
    let events = state.engine.goal_history(id).await?;
    Ok(Json(DataResponse { data: events }))
}

/// PUT /api/v1/goals/{id}/approve
pub async fn approve_goal(
    Actor(actor): Actor,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(body): Json<DecisionBody>,
) -> AppResult<Json<DataResponse<Goal>>> {
    body.validate()?;
    let goal = state
        .engine
        .decide_goal(&actor, id, body.approved, body.rejection_reason.as_deref())
        .await?;
    Ok(Json(DataResponse { data: goal }))
}

/// PUT /api/v1/goals/{id}/progress
pub async fn update_progress(
    Actor(actor): Actor,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(body): Json<ProgressBody>,
) -> AppResult<Json<DataResponse<ProgressResponse>>> {
    body.validate()?;
    let (goal, report) = state
        .engine
        .update_progress(&actor, id, body.new_percentage, &body.report)
        .await?;
    Ok(Json(DataResponse {
        data: ProgressResponse { goal, report },
    }))
}

/// PUT /api/v1/goals/{id}/status
///
/// Only `ACHIEVED` and `DISCARDED` are accepted.
pub async fn set_status(
    Actor(actor): Actor,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(body): Json<StatusBody>,
) -> AppResult<Json<DataResponse<Goal>>> {
    let goal = state.engine.set_goal_status(&actor, id, body.status).await?;
    Ok(Json(DataResponse { data: goal }))
}

// ---------------------------------------------------------------------------
// Freeze
// ---------------------------------------------------------------------------

/// POST /api/v1/goals/freeze-quarter
pub async fn freeze_quarter(
    Actor(actor): Actor,
    State(state): State<AppState>,
    Json(body): Json<FreezeRequest>,
) -> AppResult<Json<DataResponse<FreezeOutcome>>> {
    let outcome = state.engine.freeze_quarter(&actor, body).await?;
    Ok(Json(DataResponse { data: outcome }))
}

/// POST /api/v1/goals/unfreeze-quarter
pub async fn unfreeze_quarter(
    Actor(actor): Actor,
    State(state): State<AppState>,
    Json(body): Json<UnfreezeRequest>,
) -> AppResult<Json<DataResponse<FreezeOutcome>>> {
    let outcome = state.engine.unfreeze_quarter(&actor, body).await?;
    Ok(Json(DataResponse { data: outcome }))
}

/// GET /api/v1/goals/freeze-logs?quarter=&year=
pub async fn list_freeze_logs(
    Actor(_actor): Actor,
    State(state): State<AppState>,
    Query(params): Query<FreezeLogQuery>,
) -> AppResult<Json<DataResponse<Vec<GoalFreezeLog>>>> {
    let logs = state.engine.freeze_logs(params.quarter, params.year).await?;
    Ok(Json(DataResponse { data: logs }))
}
