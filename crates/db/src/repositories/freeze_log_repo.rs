//! Repository for the `goal_freeze_logs` audit table.

use sqlx::{PgConnection, PgPool};
use stride_core::goal::{FreezeAction, Quarter};
use stride_core::types::{DbId, Timestamp};

use crate::models::goal::FreezeLogRow;

const COLUMNS: &str = "\
    id, action, quarter, year, affected_goals_count, scheduled_unfreeze_date, \
    scheduled_unfreeze_executed_at, is_emergency_override, emergency_reason, \
    performed_by, performed_at";

/// Fields of one audit row.
pub struct FreezeLogEntry<'a> {
    pub action: FreezeAction,
    pub quarter: Quarter,
    pub year: i32,
    pub affected_goals_count: i64,
    pub scheduled_unfreeze_date: Option<Timestamp>,
    pub is_emergency_override: bool,
    pub emergency_reason: Option<&'a str>,
    pub performed_by: DbId,
    pub performed_at: Timestamp,
}

pub struct FreezeLogRepo;

impl FreezeLogRepo {
    pub async fn create(
        conn: &mut PgConnection,
        entry: &FreezeLogEntry<'_>,
    ) -> Result<FreezeLogRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO goal_freeze_logs \
                (action, quarter, year, affected_goals_count, scheduled_unfreeze_date, \
                 is_emergency_override, emergency_reason, performed_by, performed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, FreezeLogRow>(&query)
            .bind(entry.action.as_str())
            .bind(entry.quarter.as_str())
            .bind(entry.year)
            .bind(entry.affected_goals_count)
            .bind(entry.scheduled_unfreeze_date)
            .bind(entry.is_emergency_override)
            .bind(entry.emergency_reason)
            .bind(entry.performed_by)
            .bind(entry.performed_at)
            .fetch_one(conn)
            .await
    }

    /// List audit rows, newest first, optionally filtered by quarter and year.
    pub async fn list_filtered(
        pool: &PgPool,
        quarter: Option<Quarter>,
        year: Option<i32>,
    ) -> Result<Vec<FreezeLogRow>, sqlx::Error> {
        let mut conditions: Vec<String> = Vec::new();
        let mut param_idx: usize = 1;

        if quarter.is_some() {
            conditions.push(format!("quarter = ${param_idx}"));
            param_idx += 1;
        }
        if year.is_some() {
            conditions.push(format!("year = ${param_idx}"));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let query = format!(
            "SELECT {COLUMNS} FROM goal_freeze_logs {where_clause} \
             ORDER BY performed_at DESC, id DESC"
        );

        let mut q = sqlx::query_as::<_, FreezeLogRow>(&query);
        if let Some(qr) = quarter {
            q = q.bind(qr.as_str());
        }
        if let Some(y) = year {
            q = q.bind(y);
        }
        q.fetch_all(pool).await
    }

    /// Freeze rows whose scheduled unfreeze has come due and not yet run.
    pub async fn list_due_scheduled(
        pool: &PgPool,
        now: Timestamp,
    ) -> Result<Vec<FreezeLogRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM goal_freeze_logs \
             WHERE action = 'freeze' \
               AND scheduled_unfreeze_date IS NOT NULL \
               AND scheduled_unfreeze_date <= $1 \
               AND scheduled_unfreeze_executed_at IS NULL \
             ORDER BY scheduled_unfreeze_date"
        );
        sqlx::query_as::<_, FreezeLogRow>(&query)
            .bind(now)
            .fetch_all(pool)
            .await
    }

    /// Close every outstanding schedule for a quarter once it is unfrozen.
    pub async fn close_schedules(
        conn: &mut PgConnection,
        quarter: Quarter,
        year: i32,
        at: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE goal_freeze_logs SET scheduled_unfreeze_executed_at = $3 \
             WHERE action = 'freeze' AND quarter = $1 AND year = $2 \
               AND scheduled_unfreeze_date IS NOT NULL \
               AND scheduled_unfreeze_executed_at IS NULL",
        )
        .bind(quarter.as_str())
        .bind(year)
        .bind(at)
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }
}
