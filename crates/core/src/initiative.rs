//! Initiative lifecycle: statuses, the transition graph, the creation-time
//! initial-status rule, and structural validation.
//!
//! ```text
//! PENDING_APPROVAL --approve--> PENDING --start--> ONGOING --submit--> UNDER_REVIEW
//!        |                         ^                  ^                    |   |
//!      reject                   accept                +------redo----------+   |
//!        v                         |                                        approve
//!     REJECTED                  ASSIGNED                                     v
//!                                                                        APPROVED
//! ```
//!
//! OVERDUE is not a node of this graph. It is derived from `due_date` by
//! [`Initiative::is_overdue`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::capabilities::{ActorContext, Capability};
use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

define_text_enum! {
    /// Stored lifecycle status of an initiative.
    InitiativeStatus {
        PendingApproval = "PENDING_APPROVAL",
        Assigned = "ASSIGNED",
        Pending = "PENDING",
        Ongoing = "ONGOING",
        UnderReview = "UNDER_REVIEW",
        Approved = "APPROVED",
        Rejected = "REJECTED",
    }
}

impl InitiativeStatus {
    /// `APPROVED` and `REJECTED` accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

define_text_enum! {
    InitiativeKind {
        Individual = "INDIVIDUAL",
        Group = "GROUP",
    }
}

define_text_enum! {
    Urgency {
        Low = "LOW",
        Medium = "MEDIUM",
        High = "HIGH",
        Urgent = "URGENT",
    }
}

define_text_enum! {
    /// An edge of the initiative graph.
    InitiativeTransition {
        Approve = "approve",
        Reject = "reject",
        Accept = "accept",
        Start = "start",
        Submit = "submit",
        ApproveReview = "approve_review",
        RequestRedo = "request_redo",
    }
}

impl InitiativeTransition {
    /// The only status this transition may start from.
    pub fn from_status(self) -> InitiativeStatus {
        match self {
            Self::Approve | Self::Reject => InitiativeStatus::PendingApproval,
            Self::Accept => InitiativeStatus::Assigned,
            Self::Start => InitiativeStatus::Pending,
            Self::Submit => InitiativeStatus::Ongoing,
            Self::ApproveReview | Self::RequestRedo => InitiativeStatus::UnderReview,
        }
    }

    /// The status this transition lands in.
    pub fn to_status(self) -> InitiativeStatus {
        match self {
            Self::Approve | Self::Accept => InitiativeStatus::Pending,
            Self::Reject => InitiativeStatus::Rejected,
            Self::Start | Self::RequestRedo => InitiativeStatus::Ongoing,
            Self::Submit => InitiativeStatus::UnderReview,
            Self::ApproveReview => InitiativeStatus::Approved,
        }
    }
}

/// Transitions that may be applied from `status`.
pub fn allowed_transitions(status: InitiativeStatus) -> Vec<InitiativeTransition> {
    InitiativeTransition::ALL
        .iter()
        .copied()
        .filter(|t| t.from_status() == status)
        .collect()
}

/// Check that `transition` is an edge leaving `current` and return its target.
///
/// A mismatch is a [`CoreError::Conflict`]: the caller acted on a stale view
/// of the initiative and should re-fetch it.
pub fn check_transition(
    current: InitiativeStatus,
    transition: InitiativeTransition,
) -> Result<InitiativeStatus, CoreError> {
    if transition.from_status() == current {
        Ok(transition.to_status())
    } else {
        Err(CoreError::Conflict(format!(
            "Cannot {transition} initiative in status {current} (requires {})",
            transition.from_status()
        )))
    }
}

/// Lowest accepted review score.
pub const MIN_SCORE: i16 = 1;
/// Highest accepted review score.
pub const MAX_SCORE: i16 = 10;

pub fn validate_score(score: Option<i16>) -> Result<i16, CoreError> {
    match score {
        Some(s) if (MIN_SCORE..=MAX_SCORE).contains(&s) => Ok(s),
        Some(s) => Err(CoreError::Validation(format!(
            "Score must be between {MIN_SCORE} and {MAX_SCORE} (got {s})"
        ))),
        None => Err(CoreError::Validation("score is required when approving".into())),
    }
}

/// A unit of assigned work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Initiative {
    pub id: DbId,
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
    pub score: Option<i16>,
    pub feedback: Option<String>,
    pub completion_report: Option<String>,
    pub approved_at: Option<Timestamp>,
    pub reviewed_at: Option<Timestamp>,
    pub overdue_notified_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Optimistic-concurrency counter, bumped on every write.
    pub version: i64,
}

impl Initiative {
    /// Past its due date and not finished.
    pub fn is_overdue(&self, now: Timestamp) -> bool {
        self.due_date < now && !self.status.is_terminal()
    }

    /// Assignee or team head.
    pub fn is_participant(&self, user_id: DbId) -> bool {
        self.assignee_ids.contains(&user_id) || self.team_head_id == Some(user_id)
    }

    /// Who may submit the work or ask for more time: the team head of a
    /// group initiative, otherwise any assignee.
    pub fn is_submitter(&self, user_id: DbId) -> bool {
        match self.kind {
            InitiativeKind::Group => self.team_head_id == Some(user_id),
            InitiativeKind::Individual => self.assignee_ids.contains(&user_id),
        }
    }

    pub fn summary(&self) -> InitiativeSummary {
        InitiativeSummary {
            id: self.id,
            title: self.title.clone(),
            creator_id: self.creator_id,
            assignee_ids: self.assignee_ids.clone(),
            team_head_id: self.team_head_id,
        }
    }
}

/// The slice of an initiative carried inside domain events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitiativeSummary {
    pub id: DbId,
    pub title: String,
    pub creator_id: DbId,
    pub assignee_ids: Vec<DbId>,
    pub team_head_id: Option<DbId>,
}

/// Input for creating an initiative.
#[derive(Debug, Clone, Deserialize)]
pub struct NewInitiative {
    pub title: String,
    pub description: Option<String>,
    pub kind: InitiativeKind,
    pub assignee_ids: Vec<DbId>,
    pub team_head_id: Option<DbId>,
    pub goal_id: Option<DbId>,
    pub due_date: Timestamp,
    #[serde(default = "default_urgency")]
    pub urgency: Urgency,
}

fn default_urgency() -> Urgency {
    Urgency::Medium
}

impl NewInitiative {
    /// Structural checks that need no lookups: title, assignee cardinality
    /// and team-head membership.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.title.trim().is_empty() {
            return Err(CoreError::Validation("title is required".into()));
        }

        let distinct: BTreeSet<DbId> = self.assignee_ids.iter().copied().collect();
        if distinct.len() != self.assignee_ids.len() {
            return Err(CoreError::Validation("assignee_ids must be distinct".into()));
        }

        match self.kind {
            InitiativeKind::Individual => {
                if self.assignee_ids.len() != 1 {
                    return Err(CoreError::Validation(
                        "Individual initiatives require exactly one assignee".into(),
                    ));
                }
                if self.team_head_id.is_some() {
                    return Err(CoreError::Validation(
                        "Individual initiatives cannot have a team head".into(),
                    ));
                }
            }
            InitiativeKind::Group => {
                if self.assignee_ids.len() < 2 {
                    return Err(CoreError::Validation(
                        "Group initiatives require at least two assignees".into(),
                    ));
                }
                match self.team_head_id {
                    None => {
                        return Err(CoreError::Validation(
                            "Group initiatives require a team head".into(),
                        ))
                    }
                    Some(head) if !distinct.contains(&head) => {
                        return Err(CoreError::Validation(
                            "team_head_id must be one of the assignees".into(),
                        ))
                    }
                    Some(_) => {}
                }
            }
        }

        Ok(())
    }
}

/// Compute the status a new initiative starts in.
///
/// | Creator                    | Assignees             | Status             |
/// |----------------------------|-----------------------|--------------------|
/// | can bypass approval        | only self             | `PENDING`          |
/// | can bypass approval        | anyone else           | `ASSIGNED`         |
/// | regular                    | all direct reports    | `ASSIGNED`         |
/// | regular                    | anything else         | `PENDING_APPROVAL` |
pub fn initial_status(actor: &ActorContext, assignee_ids: &[DbId]) -> InitiativeStatus {
    let self_only = assignee_ids.len() == 1 && assignee_ids[0] == actor.user_id;

    if actor.has(Capability::BypassApproval) {
        if self_only {
            InitiativeStatus::Pending
        } else {
            InitiativeStatus::Assigned
        }
    } else if !self_only
        && actor.has_supervisory_authority()
        && assignee_ids.iter().all(|id| actor.supervises(*id))
    {
        InitiativeStatus::Assigned
    } else {
        InitiativeStatus::PendingApproval
    }
}

// ---------------------------------------------------------------------------
// Extensions
// ---------------------------------------------------------------------------

define_text_enum! {
    ExtensionStatus {
        Pending = "PENDING",
        Approved = "APPROVED",
        Denied = "DENIED",
    }
}

/// A request to move an overdue initiative's due date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiativeExtension {
    pub id: DbId,
    pub initiative_id: DbId,
    pub requested_by: DbId,
    pub new_due_date: Timestamp,
    pub reason: String,
    pub status: ExtensionStatus,
    pub reviewed_by: Option<DbId>,
    pub review_note: Option<String>,
    pub created_at: Timestamp,
    pub reviewed_at: Option<Timestamp>,
}

/// Validate a requested due date against the current clock.
pub fn validate_extension_date(new_due_date: Timestamp, now: Timestamp) -> Result<(), CoreError> {
    if new_due_date <= now {
        return Err(CoreError::Validation(
            "new_due_date must be in the future".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::capabilities::{RoleClass, UserProfile};

    fn actor(role_class: RoleClass, reports: &[DbId]) -> ActorContext {
        let profile = UserProfile {
            id: 1,
            name: "Creator".into(),
            supervisor_id: Some(100),
            department_id: Some(7),
            role_class,
            permissions: vec![],
            is_active: true,
        };
        ActorContext::resolve(&profile, reports.iter().copied())
    }

    fn new_group(assignees: Vec<DbId>, head: Option<DbId>) -> NewInitiative {
        NewInitiative {
            title: "Launch".into(),
            description: None,
            kind: InitiativeKind::Group,
            assignee_ids: assignees,
            team_head_id: head,
            goal_id: None,
            due_date: Utc::now() + Duration::days(7),
            urgency: Urgency::Medium,
        }
    }

    #[test]
    fn every_transition_is_a_single_edge() {
        for t in InitiativeTransition::ALL {
            assert_eq!(check_transition(t.from_status(), *t).unwrap(), t.to_status());
        }
    }

    #[test]
    fn wrong_source_status_is_a_conflict() {
        let err = check_transition(InitiativeStatus::Pending, InitiativeTransition::Approve)
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[test]
    fn terminal_statuses_have_no_outgoing_edges() {
        assert!(allowed_transitions(InitiativeStatus::Approved).is_empty());
        assert!(allowed_transitions(InitiativeStatus::Rejected).is_empty());
    }

    #[test]
    fn under_review_allows_approve_or_redo() {
        let allowed = allowed_transitions(InitiativeStatus::UnderReview);
        assert_eq!(
            allowed,
            vec![InitiativeTransition::ApproveReview, InitiativeTransition::RequestRedo]
        );
    }

    #[test]
    fn group_requires_two_assignees() {
        let err = new_group(vec![2], Some(2)).validate().unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn group_team_head_must_be_assignee() {
        let err = new_group(vec![2, 3], Some(4)).validate().unwrap_err();
        assert!(matches!(err, CoreError::Validation(msg) if msg.contains("team_head_id")));
        assert!(new_group(vec![2, 3], None).validate().is_err());
        assert!(new_group(vec![2, 3], Some(3)).validate().is_ok());
    }

    #[test]
    fn individual_rejects_team_head() {
        let mut input = new_group(vec![2], Some(2));
        input.kind = InitiativeKind::Individual;
        assert!(input.validate().is_err());
        input.team_head_id = None;
        assert!(input.validate().is_ok());
    }

    #[test]
    fn duplicate_assignees_rejected() {
        assert!(new_group(vec![2, 2], Some(2)).validate().is_err());
    }

    #[test]
    fn leadership_self_assignment_skips_approval() {
        let a = actor(RoleClass::Leadership, &[]);
        assert_eq!(initial_status(&a, &[1]), InitiativeStatus::Pending);
        assert_eq!(initial_status(&a, &[5]), InitiativeStatus::Assigned);
    }

    #[test]
    fn regular_self_assignment_needs_approval() {
        let a = actor(RoleClass::Regular, &[2, 3]);
        assert_eq!(initial_status(&a, &[1]), InitiativeStatus::PendingApproval);
    }

    #[test]
    fn regular_supervisor_assigning_reports_is_assigned() {
        let a = actor(RoleClass::Regular, &[2, 3]);
        assert_eq!(initial_status(&a, &[2, 3]), InitiativeStatus::Assigned);
        // Someone outside the reporting line falls back to approval.
        assert_eq!(initial_status(&a, &[2, 9]), InitiativeStatus::PendingApproval);
    }

    #[test]
    fn score_bounds() {
        assert_eq!(validate_score(Some(1)).unwrap(), 1);
        assert_eq!(validate_score(Some(10)).unwrap(), 10);
        assert!(validate_score(Some(0)).is_err());
        assert!(validate_score(Some(11)).is_err());
        assert!(validate_score(None).is_err());
    }

    #[test]
    fn overdue_is_derived_from_due_date() {
        let now = Utc::now();
        let mut initiative = Initiative {
            id: 1,
            title: "t".into(),
            description: None,
            kind: InitiativeKind::Individual,
            status: InitiativeStatus::Ongoing,
            creator_id: 1,
            assignee_ids: vec![2],
            team_head_id: None,
            goal_id: None,
            due_date: now - Duration::hours(1),
            urgency: Urgency::Low,
            score: None,
            feedback: None,
            completion_report: None,
            approved_at: None,
            reviewed_at: None,
            overdue_notified_at: None,
            created_at: now,
            updated_at: now,
            version: 1,
        };
        assert!(initiative.is_overdue(now));
        initiative.status = InitiativeStatus::Approved;
        assert!(!initiative.is_overdue(now));
    }
}
