//! Repository for the `initiatives` table.

use sqlx::{PgConnection, PgPool};
use stride_core::initiative::Initiative;
use stride_core::types::{DbId, Timestamp};

use crate::models::initiative::{CreateInitiative, InitiativeRow};

/// Column list for `initiatives` queries.
const COLUMNS: &str = "\
    id, title, description, kind, status, creator_id, assignee_ids, team_head_id, \
    goal_id, due_date, urgency, score, feedback, completion_report, approved_at, \
    reviewed_at, overdue_notified_at, created_at, updated_at, version";

pub struct InitiativeRepo;

impl InitiativeRepo {
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<InitiativeRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM initiatives WHERE id = $1");
        sqlx::query_as::<_, InitiativeRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn create(
        conn: &mut PgConnection,
        input: &CreateInitiative,
    ) -> Result<InitiativeRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO initiatives \
                (title, description, kind, status, creator_id, assignee_ids, team_head_id, \
                 goal_id, due_date, urgency, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, InitiativeRow>(&query)
            .bind(&input.title)
            .bind(&input.description)
            .bind(input.kind.as_str())
            .bind(input.status.as_str())
            .bind(input.creator_id)
            .bind(&input.assignee_ids)
            .bind(input.team_head_id)
            .bind(input.goal_id)
            .bind(input.due_date)
            .bind(input.urgency.as_str())
            .bind(input.created_at)
            .fetch_one(conn)
            .await
    }

    /// Write the mutable fields of `initiative` if its stored version still
    /// equals `initiative.version`. Bumps the version.
    ///
    /// Returns `None` when the row is missing or another writer got there
    /// first.
    pub async fn update_versioned(
        conn: &mut PgConnection,
        initiative: &Initiative,
    ) -> Result<Option<InitiativeRow>, sqlx::Error> {
        let query = format!(
            "UPDATE initiatives SET \
                status = $3, due_date = $4, score = $5, feedback = $6, \
                completion_report = $7, approved_at = $8, reviewed_at = $9, \
                overdue_notified_at = $10, updated_at = $11, version = version + 1 \
             WHERE id = $1 AND version = $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, InitiativeRow>(&query)
            .bind(initiative.id)
            .bind(initiative.version)
            .bind(initiative.status.as_str())
            .bind(initiative.due_date)
            .bind(initiative.score)
            .bind(&initiative.feedback)
            .bind(&initiative.completion_report)
            .bind(initiative.approved_at)
            .bind(initiative.reviewed_at)
            .bind(initiative.overdue_notified_at)
            .bind(initiative.updated_at)
            .fetch_optional(conn)
            .await
    }

    /// Overdue initiatives the sweep has not yet announced, oldest due first.
    pub async fn list_overdue_unnotified(
        pool: &PgPool,
        now: Timestamp,
        limit: i64,
    ) -> Result<Vec<InitiativeRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM initiatives \
             WHERE due_date < $1 \
               AND overdue_notified_at IS NULL \
               AND status NOT IN ('APPROVED', 'REJECTED') \
             ORDER BY due_date \
             LIMIT $2"
        );
        sqlx::query_as::<_, InitiativeRow>(&query)
            .bind(now)
            .bind(limit)
            .fetch_all(pool)
            .await
    }
}
