//! Notification rows.

use sqlx::FromRow;
use stride_core::notification::Notification;
use stride_core::types::{DbId, Timestamp};

use super::parse_column;
use crate::store::StoreError;

/// A row from the `notifications` table.
#[derive(Debug, Clone, FromRow)]
pub struct NotificationRow {
    pub id: DbId,
    #[sqlx(rename = "type")]
    pub kind: String,
    pub priority: String,
    pub recipient_id: DbId,
    pub triggered_by_id: Option<DbId>,
    pub title: String,
    pub message: String,
    pub action_reference: Option<String>,
    pub data: serde_json::Value,
    pub is_read: bool,
    pub read_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
}

/// One `(type, priority)` bucket of a recipient's inbox.
#[derive(Debug, Clone, FromRow)]
pub struct NotificationCountRow {
    #[sqlx(rename = "type")]
    pub kind: String,
    pub priority: String,
    pub total: i64,
    pub unread: i64,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = StoreError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        Ok(Notification {
            id: row.id,
            kind: parse_column("type", &row.kind)?,
            priority: parse_column("priority", &row.priority)?,
            recipient_id: row.recipient_id,
            triggered_by_id: row.triggered_by_id,
            title: row.title,
            message: row.message,
            action_reference: row.action_reference,
            data: row.data,
            is_read: row.is_read,
            read_at: row.read_at,
            created_at: row.created_at,
            expires_at: row.expires_at,
        })
    }
}
