//! Repository for the `goals` table.

use sqlx::{PgConnection, PgPool};
use stride_core::goal::{Goal, Quarter};
use stride_core::types::{DbId, Timestamp};

use crate::models::goal::{CreateGoal, GoalRow};

/// Column list for `goals` queries.
const COLUMNS: &str = "\
    id, title, description, duration, scope, quarter, year, status, owner_id, \
    created_by, parent_id, progress_percentage, rejection_reason, frozen, frozen_at, \
    frozen_by, approved_by, approved_at, achieved_at, created_at, updated_at, version";

pub struct GoalRepo;

impl GoalRepo {
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<GoalRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM goals WHERE id = $1");
        sqlx::query_as::<_, GoalRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Direct children of `parent_id`, oldest first.
    pub async fn list_children(pool: &PgPool, parent_id: DbId) -> Result<Vec<GoalRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM goals WHERE parent_id = $1 ORDER BY id");
        sqlx::query_as::<_, GoalRow>(&query)
            .bind(parent_id)
            .fetch_all(pool)
            .await
    }

    pub async fn create(conn: &mut PgConnection, input: &CreateGoal) -> Result<GoalRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO goals \
                (title, description, duration, scope, quarter, year, status, owner_id, \
                 created_by, parent_id, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, GoalRow>(&query)
            .bind(&input.title)
            .bind(&input.description)
            .bind(input.duration.as_str())
            .bind(input.scope.as_str())
            .bind(input.quarter.map(Quarter::as_str))
            .bind(input.year)
            .bind(input.status.as_str())
            .bind(input.owner_id)
            .bind(input.created_by)
            .bind(input.parent_id)
            .bind(input.created_at)
            .fetch_one(conn)
            .await
    }

    /// Write the mutable fields of `goal` if it is unfrozen and its stored
    /// version still equals `goal.version`. Bumps the version.
    pub async fn update_versioned(
        conn: &mut PgConnection,
        goal: &Goal,
    ) -> Result<Option<GoalRow>, sqlx::Error> {
        let query = format!(
            "UPDATE goals SET \
                status = $3, progress_percentage = $4, rejection_reason = $5, \
                approved_by = $6, approved_at = $7, achieved_at = $8, \
                updated_at = $9, version = version + 1 \
             WHERE id = $1 AND version = $2 AND frozen = false \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, GoalRow>(&query)
            .bind(goal.id)
            .bind(goal.version)
            .bind(goal.status.as_str())
            .bind(goal.progress_percentage)
            .bind(&goal.rejection_reason)
            .bind(goal.approved_by)
            .bind(goal.approved_at)
            .bind(goal.achieved_at)
            .bind(goal.updated_at)
            .fetch_optional(conn)
            .await
    }

    /// Freeze every unfrozen individual goal of a quarter.
    pub async fn freeze_quarter(
        conn: &mut PgConnection,
        quarter: Quarter,
        year: i32,
        frozen_by: DbId,
        at: Timestamp,
    ) -> Result<Vec<GoalRow>, sqlx::Error> {
        let query = format!(
            "UPDATE goals SET \
                frozen = true, frozen_at = $4, frozen_by = $3, \
                updated_at = $4, version = version + 1 \
             WHERE scope = 'INDIVIDUAL' AND quarter = $1 AND year = $2 AND frozen = false \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, GoalRow>(&query)
            .bind(quarter.as_str())
            .bind(year)
            .bind(frozen_by)
            .bind(at)
            .fetch_all(conn)
            .await
    }

    /// Unfreeze every frozen individual goal of a quarter.
    pub async fn unfreeze_quarter(
        conn: &mut PgConnection,
        quarter: Quarter,
        year: i32,
        at: Timestamp,
    ) -> Result<Vec<GoalRow>, sqlx::Error> {
        let query = format!(
            "UPDATE goals SET \
                frozen = false, frozen_at = NULL, frozen_by = NULL, \
                updated_at = $3, version = version + 1 \
             WHERE scope = 'INDIVIDUAL' AND quarter = $1 AND year = $2 AND frozen = true \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, GoalRow>(&query)
            .bind(quarter.as_str())
            .bind(year)
            .bind(at)
            .fetch_all(conn)
            .await
    }
}
