//! Repository for the `notifications` table.

use sqlx::{PgConnection, PgPool};
use stride_core::notification::NewNotification;
use stride_core::types::{DbId, Timestamp};

use crate::models::notification::{NotificationCountRow, NotificationRow};
use crate::store::NotificationFilter;

/// Column list for `notifications` queries.
const COLUMNS: &str = "\
    id, type, priority, recipient_id, triggered_by_id, title, message, \
    action_reference, data, is_read, read_at, created_at, expires_at";

pub struct NotificationRepo;

impl NotificationRepo {
    pub async fn create(
        conn: &mut PgConnection,
        input: &NewNotification,
    ) -> Result<NotificationRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO notifications \
                (type, priority, recipient_id, triggered_by_id, title, message, \
                 action_reference, data, created_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, NotificationRow>(&query)
            .bind(input.kind.as_str())
            .bind(input.priority.as_str())
            .bind(input.recipient_id)
            .bind(input.triggered_by_id)
            .bind(&input.title)
            .bind(&input.message)
            .bind(&input.action_reference)
            .bind(&input.data)
            .bind(input.created_at)
            .bind(input.expires_at)
            .fetch_one(conn)
            .await
    }

    /// List a recipient's unexpired notifications, newest first.
    pub async fn list_for_user(
        pool: &PgPool,
        recipient_id: DbId,
        filter: &NotificationFilter,
        now: Timestamp,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<NotificationRow>, sqlx::Error> {
        let unread = if filter.unread_only {
            "AND is_read = false"
        } else {
            ""
        };
        let query = format!(
            "SELECT {COLUMNS} FROM notifications \
             WHERE recipient_id = $1 AND expires_at > $2 {unread} \
               AND ($3::text IS NULL OR type = $3) \
               AND ($4::text IS NULL OR priority = $4) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $5 OFFSET $6"
        );
        sqlx::query_as::<_, NotificationRow>(&query)
            .bind(recipient_id)
            .bind(now)
            .bind(filter.kind.map(|k| k.as_str()))
            .bind(filter.priority.map(|p| p.as_str()))
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Mark one notification read. Only the recipient may do so.
    ///
    /// Returns the row (already-read rows are returned unchanged) or `None`
    /// if no such notification belongs to `recipient_id`.
    pub async fn mark_read(
        pool: &PgPool,
        notification_id: DbId,
        recipient_id: DbId,
        at: Timestamp,
    ) -> Result<Option<NotificationRow>, sqlx::Error> {
        let query = format!(
            "UPDATE notifications \
             SET is_read = true, read_at = COALESCE(read_at, $3) \
             WHERE id = $1 AND recipient_id = $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, NotificationRow>(&query)
            .bind(notification_id)
            .bind(recipient_id)
            .bind(at)
            .fetch_optional(pool)
            .await
    }

    /// Mark all unread, unexpired notifications read. Returns how many changed.
    pub async fn mark_all_read(
        pool: &PgPool,
        recipient_id: DbId,
        at: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE notifications \
             SET is_read = true, read_at = $2 \
             WHERE recipient_id = $1 AND is_read = false AND expires_at > $2",
        )
        .bind(recipient_id)
        .bind(at)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn unread_count(
        pool: &PgPool,
        recipient_id: DbId,
        now: Timestamp,
    ) -> Result<i64, sqlx::Error> {
        let count: Option<i64> = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications \
             WHERE recipient_id = $1 AND is_read = false AND expires_at > $2",
        )
        .bind(recipient_id)
        .bind(now)
        .fetch_one(pool)
        .await?;
        Ok(count.unwrap_or(0))
    }

    pub async fn stats_for_user(
        pool: &PgPool,
        recipient_id: DbId,
        now: Timestamp,
    ) -> Result<Vec<NotificationCountRow>, sqlx::Error> {
        sqlx::query_as::<_, NotificationCountRow>(
            "SELECT type, priority, COUNT(*) AS total, \
                    COUNT(*) FILTER (WHERE is_read = false) AS unread \
             FROM notifications \
             WHERE recipient_id = $1 AND expires_at > $2 \
             GROUP BY type, priority",
        )
        .bind(recipient_id)
        .bind(now)
        .fetch_all(pool)
        .await
    }

    /// Delete a notification owned by `recipient_id`.
    pub async fn delete(pool: &PgPool, notification_id: DbId, recipient_id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND recipient_id = $2")
            .bind(notification_id)
            .bind(recipient_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
