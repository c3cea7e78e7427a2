//! Initiative and extension rows.

use sqlx::FromRow;
use stride_core::initiative::{
    Initiative, InitiativeExtension, InitiativeKind, InitiativeStatus, Urgency,
};
use stride_core::types::{DbId, Timestamp};

use super::parse_column;
use crate::store::StoreError;

/// A row from the `initiatives` table.
#[derive(Debug, Clone, FromRow)]
pub struct InitiativeRow {
    pub id: DbId,
    pub title: String,
    pub description: Option<String>,
    pub kind: String,
    pub status: String,
    pub creator_id: DbId,
    pub assignee_ids: Vec<DbId>,
    pub team_head_id: Option<DbId>,
    pub goal_id: Option<DbId>,
    pub due_date: Timestamp,
    pub urgency: String,
    pub score: Option<i16>,
    pub feedback: Option<String>,
    pub completion_report: Option<String>,
    pub approved_at: Option<Timestamp>,
    pub reviewed_at: Option<Timestamp>,
    pub overdue_notified_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub version: i64,
}

impl TryFrom<InitiativeRow> for Initiative {
    type Error = StoreError;

    fn try_from(row: InitiativeRow) -> Result<Self, Self::Error> {
        Ok(Initiative {
            id: row.id,
            title: row.title,
            description: row.description,
            kind: parse_column("kind", &row.kind)?,
            status: parse_column("status", &row.status)?,
            creator_id: row.creator_id,
            assignee_ids: row.assignee_ids,
            team_head_id: row.team_head_id,
            goal_id: row.goal_id,
            due_date: row.due_date,
            urgency: parse_column("urgency", &row.urgency)?,
            score: row.score,
            feedback: row.feedback,
            completion_report: row.completion_report,
            approved_at: row.approved_at,
            reviewed_at: row.reviewed_at,
            overdue_notified_at: row.overdue_notified_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
            version: row.version,
        })
    }
}

/// Validated input for inserting an initiative.
#[derive(Debug, Clone)]
pub struct CreateInitiative {
    pub title: String,
    pub description: Option<String>,
    pub kind: InitiativeKind,
    pub status: InitiativeStatus,
    pub creator_id: DbId,
    pub assignee_ids: Vec<DbId>,
    pub team_head_id: Option<DbId>,
    pub goal_id: Option<DbId>,
    pub due_date: Timestamp,
    pub urgency: Urgency,
    pub created_at: Timestamp,
}

/// A row from the `initiative_extensions` table.
#[derive(Debug, Clone, FromRow)]
pub struct ExtensionRow {
    pub id: DbId,
    pub initiative_id: DbId,
    pub requested_by: DbId,
    pub new_due_date: Timestamp,
    pub reason: String,
    pub status: String,
    pub reviewed_by: Option<DbId>,
    pub review_note: Option<String>,
    pub created_at: Timestamp,
    pub reviewed_at: Option<Timestamp>,
}

impl TryFrom<ExtensionRow> for InitiativeExtension {
    type Error = StoreError;

    fn try_from(row: ExtensionRow) -> Result<Self, Self::Error> {
        Ok(InitiativeExtension {
            id: row.id,
            initiative_id: row.initiative_id,
            requested_by: row.requested_by,
            new_due_date: row.new_due_date,
            reason: row.reason,
            status: parse_column("status", &row.status)?,
            reviewed_by: row.reviewed_by,
            review_note: row.review_note,
            created_at: row.created_at,
            reviewed_at: row.reviewed_at,
        })
    }
}

/// Input for opening an extension request.
#[derive(Debug, Clone)]
pub struct CreateExtension {
    pub initiative_id: DbId,
    pub requested_by: DbId,
    pub new_due_date: Timestamp,
    pub reason: String,
    pub created_at: Timestamp,
}
