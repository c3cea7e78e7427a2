//! Route definitions for the `/notifications` resource.
//!
//! All endpoints require authentication. The WebSocket takes its token from
//! the query string.

use axum::routing::{delete, get, post};
use axum::Router;

use crate::handlers::notifications;
use crate::state::AppState;
use crate::ws;

/// Routes mounted at `/notifications`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(notifications::list_notifications))
        .route("/unread-count", get(notifications::unread_count))
        .route("/stats", get(notifications::notification_stats))
        .route("/connection-stats", get(notifications::connection_stats))
        .route("/read-all", post(notifications::mark_all_read))
        .route("/{id}", delete(notifications::delete_notification))
        .route("/{id}/read", post(notifications::mark_read))
        .route("/ws", get(ws::ws_handler))
}
