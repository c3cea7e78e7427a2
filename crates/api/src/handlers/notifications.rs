//! Handlers for the `/notifications` resource.
//!
//! Listing is the catch-up path after a reconnect: everything pushed over a
//! channel was persisted first.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use stride_core::error::CoreError;
use stride_core::notification::{Notification, NotificationKind, Priority};
use stride_core::types::DbId;
use stride_db::{NotificationFilter, NotificationStats};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::query::PaginationParams;
use crate::response::DataResponse;
use crate::state::AppState;
use crate::ws::registry::ChannelInfo;

/// Query parameters for `GET /notifications`.
#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub notification_type: Option<NotificationKind>,
    pub priority: Option<Priority>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl NotificationQuery {
    fn filter(&self) -> NotificationFilter {
        NotificationFilter {
            unread_only: self.unread_only,
            kind: self.notification_type,
            priority: self.priority,
        }
    }

    fn page(&self) -> PaginationParams {
        PaginationParams {
            limit: self.limit,
            offset: self.offset,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UnreadCount {
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct MarkedRead {
    pub marked_read: u64,
}

/// Push-channel occupancy, plus the caller's own channels.
#[derive(Debug, Serialize)]
pub struct ConnectionStats {
    pub active_users: usize,
    pub total_connections: usize,
    pub user_online: bool,
    pub channels: Vec<ChannelInfo>,
}

/// GET /api/v1/notifications
///
/// Filters: `unread_only`, `notification_type`, `priority`. Expired
/// notifications are never listed.
pub async fn list_notifications(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<NotificationQuery>,
) -> AppResult<Json<DataResponse<Vec<Notification>>>> {
    let page = params.page();
    let notifications = state
        .store
        .list_notifications(auth.user_id, params.filter(), Utc::now(), page.limit(), page.offset())
        .await?;
    Ok(Json(DataResponse {
        data: notifications,
    }))
}

/// GET /api/v1/notifications/unread-count
pub async fn unread_count(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<UnreadCount>>> {
    let count = state.store.unread_count(auth.user_id, Utc::now()).await?;
    Ok(Json(DataResponse {
        data: UnreadCount { count },
    }))
}

/// GET /api/v1/notifications/stats
pub async fn notification_stats(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<NotificationStats>>> {
    let stats = state.store.notification_stats(auth.user_id, Utc::now()).await?;
    Ok(Json(DataResponse { data: stats }))
}

/// GET /api/v1/notifications/connection-stats
pub async fn connection_stats(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<ConnectionStats>>> {
    let channels = state.registry.channels_of(auth.user_id).await;
    Ok(Json(DataResponse {
        data: ConnectionStats {
            active_users: state.registry.user_count().await,
            total_connections: state.registry.connection_count().await,
            user_online: !channels.is_empty(),
            channels,
        },
    }))
}

/// POST /api/v1/notifications/{id}/read
///
/// 404 when the notification does not belong to the caller.
pub async fn mark_read(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Notification>>> {
    let notification = state
        .store
        .mark_notification_read(id, auth.user_id, Utc::now())
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Notification",
            id,
        }))?;
    Ok(Json(DataResponse { data: notification }))
}

/// POST /api/v1/notifications/read-all
pub async fn mark_all_read(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<MarkedRead>>> {
    let marked_read = state
        .store
        .mark_all_notifications_read(auth.user_id, Utc::now())
        .await?;
    Ok(Json(DataResponse {
        data: MarkedRead { marked_read },
    }))
}

/// DELETE /api/v1/notifications/{id}
///
/// 404 when the notification does not belong to the caller.
pub async fn delete_notification(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    if !state.store.delete_notification(id, auth.user_id).await? {
        return Err(AppError::Core(CoreError::NotFound {
            entity: "Notification",
            id,
        }));
    }

    tracing::info!(user_id = auth.user_id, notification_id = id, "Notification deleted");

    Ok(StatusCode::NO_CONTENT)
}
