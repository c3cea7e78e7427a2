//! Route definitions for the `/initiatives` resource.

use axum::routing::{get, post, put};
use axum::Router;

use crate::handlers::initiatives;
use crate::state::AppState;

/// Routes mounted at `/initiatives`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(initiatives::create_initiative))
        .route("/{id}", get(initiatives::get_initiative))
        .route("/{id}/history", get(initiatives::initiative_history))
        .route("/{id}/approve", put(initiatives::approve_initiative))
        .route("/{id}/accept", put(initiatives::accept_initiative))
        .route("/{id}/start", put(initiatives::start_initiative))
        .route("/{id}/complete", put(initiatives::complete_initiative))
        .route("/{id}/review", post(initiatives::review_initiative))
        .route(
            "/{id}/extension-request",
            post(initiatives::request_extension),
        )
        .route(
            "/{id}/extension/{extension_id}",
            put(initiatives::review_extension),
        )
}
