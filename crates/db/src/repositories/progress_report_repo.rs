//! Repository for the `goal_progress_reports` table.

use sqlx::{PgConnection, PgPool};
use stride_core::types::DbId;

use crate::models::goal::{CreateProgressReport, ProgressReportRow};

const COLUMNS: &str =
    "id, goal_id, previous_percentage, new_percentage, report, reported_by, created_at";

pub struct ProgressReportRepo;

impl ProgressReportRepo {
    pub async fn create(
        conn: &mut PgConnection,
        input: &CreateProgressReport,
    ) -> Result<ProgressReportRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO goal_progress_reports \
                (goal_id, previous_percentage, new_percentage, report, reported_by, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ProgressReportRow>(&query)
            .bind(input.goal_id)
            .bind(input.previous_percentage)
            .bind(input.new_percentage)
            .bind(&input.report)
            .bind(input.reported_by)
            .bind(input.created_at)
            .fetch_one(conn)
            .await
    }

    /// Reports for a goal, newest first.
    pub async fn list_for_goal(
        pool: &PgPool,
        goal_id: DbId,
    ) -> Result<Vec<ProgressReportRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM goal_progress_reports \
             WHERE goal_id = $1 ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, ProgressReportRow>(&query)
            .bind(goal_id)
            .fetch_all(pool)
            .await
    }
}
