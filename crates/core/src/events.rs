//! Typed domain events emitted after a workflow mutation commits.
//!
//! Events carry enough of the entity (a summary) for downstream consumers to
//! pick recipients and render messages without re-reading the store.

use serde::{Deserialize, Serialize};

use crate::goal::{GoalStatus, GoalSummary, Quarter};
use crate::initiative::{InitiativeStatus, InitiativeSummary};
use crate::types::{DbId, Timestamp};

pub const ENTITY_INITIATIVE: &str = "initiative";
pub const ENTITY_GOAL: &str = "goal";
pub const ENTITY_QUARTER: &str = "quarter";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    InitiativeCreated {
        initiative: InitiativeSummary,
        status: InitiativeStatus,
        creator_supervisor_id: Option<DbId>,
    },
    InitiativeApproved {
        initiative: InitiativeSummary,
    },
    InitiativeRejected {
        initiative: InitiativeSummary,
        reason: String,
    },
    InitiativeAccepted {
        initiative: InitiativeSummary,
    },
    InitiativeStarted {
        initiative: InitiativeSummary,
    },
    InitiativeSubmitted {
        initiative: InitiativeSummary,
    },
    InitiativeReviewed {
        initiative: InitiativeSummary,
        approved: bool,
        score: Option<i16>,
        feedback: Option<String>,
    },
    InitiativeOverdue {
        initiative: InitiativeSummary,
        due_date: Timestamp,
    },
    ExtensionRequested {
        initiative: InitiativeSummary,
        extension_id: DbId,
        requested_by: DbId,
        new_due_date: Timestamp,
    },
    ExtensionReviewed {
        initiative: InitiativeSummary,
        extension_id: DbId,
        requested_by: DbId,
        approved: bool,
        new_due_date: Timestamp,
    },
    GoalCreated {
        goal: GoalSummary,
        status: GoalStatus,
        owner_supervisor_id: Option<DbId>,
    },
    GoalApproved {
        goal: GoalSummary,
    },
    GoalRejected {
        goal: GoalSummary,
        reason: String,
    },
    GoalAchieved {
        goal: GoalSummary,
        /// Derived from children rather than set by hand.
        cascaded: bool,
    },
    GoalDiscarded {
        goal: GoalSummary,
    },
    GoalProgressUpdated {
        goal: GoalSummary,
        previous_percentage: i16,
        new_percentage: i16,
    },
    GoalsFrozen {
        quarter: Quarter,
        year: i32,
        affected_count: i64,
        owner_ids: Vec<DbId>,
    },
    GoalsUnfrozen {
        quarter: Quarter,
        year: i32,
        affected_count: i64,
        owner_ids: Vec<DbId>,
        emergency: bool,
    },
}

impl DomainEvent {
    /// Dot-separated name, e.g. `"initiative.approved"`.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::InitiativeCreated { .. } => "initiative.created",
            Self::InitiativeApproved { .. } => "initiative.approved",
            Self::InitiativeRejected { .. } => "initiative.rejected",
            Self::InitiativeAccepted { .. } => "initiative.accepted",
            Self::InitiativeStarted { .. } => "initiative.started",
            Self::InitiativeSubmitted { .. } => "initiative.submitted",
            Self::InitiativeReviewed { .. } => "initiative.reviewed",
            Self::InitiativeOverdue { .. } => "initiative.overdue",
            Self::ExtensionRequested { .. } => "initiative.extension_requested",
            Self::ExtensionReviewed { .. } => "initiative.extension_reviewed",
            Self::GoalCreated { .. } => "goal.created",
            Self::GoalApproved { .. } => "goal.approved",
            Self::GoalRejected { .. } => "goal.rejected",
            Self::GoalAchieved { .. } => "goal.achieved",
            Self::GoalDiscarded { .. } => "goal.discarded",
            Self::GoalProgressUpdated { .. } => "goal.progress_updated",
            Self::GoalsFrozen { .. } => "goal.quarter_frozen",
            Self::GoalsUnfrozen { .. } => "goal.quarter_unfrozen",
        }
    }

    /// Source entity kind and id. Quarter-wide events have no single id.
    pub fn entity(&self) -> (&'static str, Option<DbId>) {
        match self {
            Self::InitiativeCreated { initiative, .. }
            | Self::InitiativeApproved { initiative }
            | Self::InitiativeRejected { initiative, .. }
            | Self::InitiativeAccepted { initiative }
            | Self::InitiativeStarted { initiative }
            | Self::InitiativeSubmitted { initiative }
            | Self::InitiativeReviewed { initiative, .. }
            | Self::InitiativeOverdue { initiative, .. }
            | Self::ExtensionRequested { initiative, .. }
            | Self::ExtensionReviewed { initiative, .. } => (ENTITY_INITIATIVE, Some(initiative.id)),
            Self::GoalCreated { goal, .. }
            | Self::GoalApproved { goal }
            | Self::GoalRejected { goal, .. }
            | Self::GoalAchieved { goal, .. }
            | Self::GoalDiscarded { goal }
            | Self::GoalProgressUpdated { goal, .. } => (ENTITY_GOAL, Some(goal.id)),
            Self::GoalsFrozen { .. } | Self::GoalsUnfrozen { .. } => (ENTITY_QUARTER, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn goal() -> GoalSummary {
        GoalSummary {
            id: 7,
            title: "Retention".into(),
            owner_id: 3,
            parent_id: Some(1),
        }
    }

    #[test]
    fn entity_and_type_for_goal_event() {
        let event = DomainEvent::GoalAchieved {
            goal: goal(),
            cascaded: true,
        };
        assert_eq!(event.event_type(), "goal.achieved");
        assert_eq!(event.entity(), (ENTITY_GOAL, Some(7)));
    }

    #[test]
    fn quarter_events_have_no_entity_id() {
        let event = DomainEvent::GoalsFrozen {
            quarter: Quarter::Q1,
            year: 2025,
            affected_count: 2,
            owner_ids: vec![3, 4],
        };
        assert_eq!(event.entity(), (ENTITY_QUARTER, None));
    }

    #[test]
    fn serializes_with_event_tag() {
        let json = serde_json::to_value(DomainEvent::GoalDiscarded { goal: goal() }).unwrap();
        assert_eq!(json["event"], "goal_discarded");
        assert_eq!(json["goal"]["id"], 7);
    }
}
