//! Route definitions for the `/goals` resource.

use axum::routing::{get, post, put};
use axum::Router;

use crate::handlers::goals;
use crate::state::AppState;

/// Routes mounted at `/goals`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(goals::create_goal))
        // Quarter freeze
        .route("/freeze-quarter", post(goals::freeze_quarter))
        .route("/unfreeze-quarter", post(goals::unfreeze_quarter))
        .route("/freeze-logs", get(goals::list_freeze_logs))
        // Single goal
        .route("/{id}", get(goals::get_goal))
        .route("/{id}/children", get(goals::list_children))
        .route("/{id}/progress-reports", get(goals::list_progress_reports))
        .route("/{id}/history", get(goals::goal_history))
        .route("/{id}/approve", put(goals::approve_goal))
        .route("/{id}/progress", put(goals::update_progress))
        .route("/{id}/status", put(goals::set_status))
}
