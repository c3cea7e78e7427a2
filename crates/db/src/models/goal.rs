//! Goal, progress report and freeze log rows.

use sqlx::FromRow;
use stride_core::goal::{
    Goal, GoalDuration, GoalFreezeLog, GoalProgressReport, GoalScope, GoalStatus, Quarter,
};
use stride_core::types::{DbId, Timestamp};

use super::parse_column;
use crate::store::StoreError;

/// A row from the `goals` table.
#[derive(Debug, Clone, FromRow)]
pub struct GoalRow {
    pub id: DbId,
    pub title: String,
    pub description: Option<String>,
    pub duration: String,
    pub scope: String,
    pub quarter: Option<String>,
    pub year: i32,
    pub status: String,
    pub owner_id: DbId,
    pub created_by: DbId,
    pub parent_id: Option<DbId>,
    pub progress_percentage: i16,
    pub rejection_reason: Option<String>,
    pub frozen: bool,
    pub frozen_at: Option<Timestamp>,
    pub frozen_by: Option<DbId>,
    pub approved_by: Option<DbId>,
    pub approved_at: Option<Timestamp>,
    pub achieved_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub version: i64,
}

impl TryFrom<GoalRow> for Goal {
    type Error = StoreError;

    fn try_from(row: GoalRow) -> Result<Self, Self::Error> {
        let quarter = row
            .quarter
            .as_deref()
            .map(|q| parse_column("quarter", q))
            .transpose()?;
        Ok(Goal {
            id: row.id,
            title: row.title,
            description: row.description,
            duration: parse_column("duration", &row.duration)?,
            scope: parse_column("scope", &row.scope)?,
            quarter,
            year: row.year,
            status: parse_column("status", &row.status)?,
            owner_id: row.owner_id,
            created_by: row.created_by,
            parent_id: row.parent_id,
            progress_percentage: row.progress_percentage,
            rejection_reason: row.rejection_reason,
            frozen: row.frozen,
            frozen_at: row.frozen_at,
            frozen_by: row.frozen_by,
            approved_by: row.approved_by,
            approved_at: row.approved_at,
            achieved_at: row.achieved_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
            version: row.version,
        })
    }
}

/// Validated input for inserting a goal.
#[derive(Debug, Clone)]
pub struct CreateGoal {
    pub title: String,
    pub description: Option<String>,
    pub duration: GoalDuration,
    pub scope: GoalScope,
    pub quarter: Option<Quarter>,
    pub year: i32,
    pub status: GoalStatus,
    pub owner_id: DbId,
    pub created_by: DbId,
    pub parent_id: Option<DbId>,
    pub created_at: Timestamp,
}

/// A row from the `goal_progress_reports` table.
#[derive(Debug, Clone, FromRow)]
pub struct ProgressReportRow {
    pub id: DbId,
    pub goal_id: DbId,
    pub previous_percentage: i16,
    pub new_percentage: i16,
    pub report: String,
    pub reported_by: DbId,
    pub created_at: Timestamp,
}

impl From<ProgressReportRow> for GoalProgressReport {
    fn from(row: ProgressReportRow) -> Self {
        GoalProgressReport {
            id: row.id,
            goal_id: row.goal_id,
            previous_percentage: row.previous_percentage,
            new_percentage: row.new_percentage,
            report: row.report,
            reported_by: row.reported_by,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateProgressReport {
    pub goal_id: DbId,
    pub previous_percentage: i16,
    pub new_percentage: i16,
    pub report: String,
    pub reported_by: DbId,
    pub created_at: Timestamp,
}

/// A row from the `goal_freeze_logs` table.
#[derive(Debug, Clone, FromRow)]
pub struct FreezeLogRow {
    pub id: DbId,
    pub action: String,
    pub quarter: String,
    pub year: i32,
    pub affected_goals_count: i64,
    pub scheduled_unfreeze_date: Option<Timestamp>,
    pub scheduled_unfreeze_executed_at: Option<Timestamp>,
    pub is_emergency_override: bool,
    pub emergency_reason: Option<String>,
    pub performed_by: DbId,
    pub performed_at: Timestamp,
}

impl TryFrom<FreezeLogRow> for GoalFreezeLog {
    type Error = StoreError;

    fn try_from(row: FreezeLogRow) -> Result<Self, Self::Error> {
        Ok(GoalFreezeLog {
            id: row.id,
            action: parse_column("action", &row.action)?,
            quarter: parse_column("quarter", &row.quarter)?,
            year: row.year,
            affected_goals_count: row.affected_goals_count,
            scheduled_unfreeze_date: row.scheduled_unfreeze_date,
            scheduled_unfreeze_executed_at: row.scheduled_unfreeze_executed_at,
            is_emergency_override: row.is_emergency_override,
            emergency_reason: row.emergency_reason,
            performed_by: row.performed_by,
            performed_at: row.performed_at,
        })
    }
}

/// Input for a bulk freeze of one quarter.
#[derive(Debug, Clone)]
pub struct CreateFreeze {
    pub quarter: Quarter,
    pub year: i32,
    pub scheduled_unfreeze_date: Option<Timestamp>,
    pub performed_by: DbId,
    pub performed_at: Timestamp,
}

/// Input for a bulk unfreeze of one quarter.
#[derive(Debug, Clone)]
pub struct CreateUnfreeze {
    pub quarter: Quarter,
    pub year: i32,
    pub is_emergency_override: bool,
    pub emergency_reason: Option<String>,
    pub performed_by: DbId,
    pub performed_at: Timestamp,
}

/// Result of a bulk freeze or unfreeze: the audit row and the goals it
/// touched, as written.
#[derive(Debug, Clone)]
pub struct FreezeBatch {
    pub log: GoalFreezeLog,
    pub goals: Vec<Goal>,
}
