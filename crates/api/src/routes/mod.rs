pub mod goals;
pub mod health;
pub mod initiatives;
pub mod notifications;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /health                                          service health
///
/// /initiatives                                     create (POST)
/// /initiatives/{id}                                get
/// /initiatives/{id}/approve                        approve or reject (PUT)
/// /initiatives/{id}/accept                         accept assignment (PUT)
/// /initiatives/{id}/start                          start work (PUT)
/// /initiatives/{id}/complete                       submit for review (PUT)
/// /initiatives/{id}/review                         review or request redo (POST)
/// /initiatives/{id}/extension-request              request extension (POST)
/// /initiatives/{id}/extension/{extension_id}       decide extension (PUT)
///
/// /goals                                           create (POST)
/// /goals/freeze-quarter                            bulk freeze (POST)
/// /goals/unfreeze-quarter                          bulk unfreeze (POST)
/// /goals/freeze-logs                               audit list (GET)
/// /goals/{id}                                      get
/// /goals/{id}/children                             sub-goals
/// /goals/{id}/progress-reports                     progress history
/// /goals/{id}/approve                              approve or reject (PUT)
/// /goals/{id}/progress                             manual progress (PUT)
/// /goals/{id}/status                               achieve or discard (PUT)
///
/// /notifications                                   list
/// /notifications/unread-count                      unread count
/// /notifications/read-all                          mark all read (POST)
/// /notifications/{id}/read                         mark read (POST)
/// /notifications/ws                                WebSocket (?token=)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .nest("/initiatives", initiatives::router())
        .nest("/goals", goals::router())
        .nest("/notifications", notifications::router())
}
