//! Repository for the `initiative_extensions` table.

use sqlx::{PgConnection, PgPool};
use stride_core::initiative::InitiativeExtension;
use stride_core::types::DbId;

use crate::models::initiative::{CreateExtension, ExtensionRow};

const COLUMNS: &str = "\
    id, initiative_id, requested_by, new_due_date, reason, status, \
    reviewed_by, review_note, created_at, reviewed_at";

pub struct ExtensionRepo;

impl ExtensionRepo {
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<ExtensionRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM initiative_extensions WHERE id = $1");
        sqlx::query_as::<_, ExtensionRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// The open request for an initiative, if any.
    pub async fn find_pending(
        pool: &PgPool,
        initiative_id: DbId,
    ) -> Result<Option<ExtensionRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM initiative_extensions \
             WHERE initiative_id = $1 AND status = 'PENDING'"
        );
        sqlx::query_as::<_, ExtensionRow>(&query)
            .bind(initiative_id)
            .fetch_optional(pool)
            .await
    }

    /// Insert a pending request. A second open request for the same
    /// initiative violates `uq_initiative_extensions_pending`.
    pub async fn create(
        conn: &mut PgConnection,
        input: &CreateExtension,
    ) -> Result<ExtensionRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO initiative_extensions \
                (initiative_id, requested_by, new_due_date, reason, created_at) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ExtensionRow>(&query)
            .bind(input.initiative_id)
            .bind(input.requested_by)
            .bind(input.new_due_date)
            .bind(&input.reason)
            .bind(input.created_at)
            .fetch_one(conn)
            .await
    }

    /// Record the decision on a still-pending request.
    ///
    /// Returns `None` if the request was already decided.
    pub async fn close_pending(
        conn: &mut PgConnection,
        extension: &InitiativeExtension,
    ) -> Result<Option<ExtensionRow>, sqlx::Error> {
        let query = format!(
            "UPDATE initiative_extensions SET \
                status = $2, reviewed_by = $3, review_note = $4, reviewed_at = $5 \
             WHERE id = $1 AND status = 'PENDING' \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ExtensionRow>(&query)
            .bind(extension.id)
            .bind(extension.status.as_str())
            .bind(extension.reviewed_by)
            .bind(&extension.review_note)
            .bind(extension.reviewed_at)
            .fetch_optional(conn)
            .await
    }
}
