//! Goal lifecycle, cascade predicate and quarter freeze rules.
//!
//! ```text
//! PENDING_APPROVAL --approve--> ACTIVE --achieve--> ACHIEVED
//!        |                         \
//!      reject                    discard
//!        v                           v
//!     REJECTED                   DISCARDED
//! ```
//!
//! Only individual-scope goals pass through `PENDING_APPROVAL`. A goal with
//! children is never achieved by hand: its achievement is derived from its
//! children via [`evaluate_parent`].

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

define_text_enum! {
    GoalStatus {
        PendingApproval = "PENDING_APPROVAL",
        Active = "ACTIVE",
        Achieved = "ACHIEVED",
        Discarded = "DISCARDED",
        Rejected = "REJECTED",
    }
}

define_text_enum! {
    GoalScope {
        Company = "COMPANY",
        Department = "DEPARTMENT",
        Individual = "INDIVIDUAL",
    }
}

define_text_enum! {
    GoalDuration {
        Yearly = "YEARLY",
        Quarterly = "QUARTERLY",
    }
}

define_text_enum! {
    Quarter {
        Q1 = "Q1",
        Q2 = "Q2",
        Q3 = "Q3",
        Q4 = "Q4",
    }
}

define_text_enum! {
    GoalTransition {
        Approve = "approve",
        Reject = "reject",
        Achieve = "achieve",
        Discard = "discard",
    }
}

impl GoalTransition {
    pub fn from_status(self) -> GoalStatus {
        match self {
            Self::Approve | Self::Reject => GoalStatus::PendingApproval,
            Self::Achieve | Self::Discard => GoalStatus::Active,
        }
    }

    pub fn to_status(self) -> GoalStatus {
        match self {
            Self::Approve => GoalStatus::Active,
            Self::Reject => GoalStatus::Rejected,
            Self::Achieve => GoalStatus::Achieved,
            Self::Discard => GoalStatus::Discarded,
        }
    }
}

/// Check that `transition` leaves `current`; a mismatch is a conflict.
pub fn check_transition(current: GoalStatus, transition: GoalTransition) -> Result<GoalStatus, CoreError> {
    if transition.from_status() == current {
        Ok(transition.to_status())
    } else {
        Err(CoreError::Conflict(format!(
            "Cannot {transition} goal in status {current} (requires {})",
            transition.from_status()
        )))
    }
}

/// A measurable objective, possibly part of a parent/child tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: DbId,
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

impl Goal {
    /// Frozen goals accept no mutation other than an unfreeze.
    pub fn ensure_not_frozen(&self) -> Result<(), CoreError> {
        if self.frozen {
            let since = self
                .frozen_at
                .map(|t| t.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "unknown date".into());
            return Err(CoreError::Conflict(format!(
                "Goal {} is frozen (since {since})",
                self.id
            )));
        }
        Ok(())
    }

    pub fn summary(&self) -> GoalSummary {
        GoalSummary {
            id: self.id,
            title: self.title.clone(),
            owner_id: self.owner_id,
            parent_id: self.parent_id,
        }
    }
}

/// The slice of a goal carried inside domain events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalSummary {
    pub id: DbId,
    pub title: String,
    pub owner_id: DbId,
    pub parent_id: Option<DbId>,
}

/// Input for creating a goal.
#[derive(Debug, Clone, Deserialize)]
pub struct NewGoal {
    pub title: String,
    pub description: Option<String>,
    pub duration: GoalDuration,
    pub scope: GoalScope,
    pub quarter: Option<Quarter>,
    pub year: i32,
    pub owner_id: Option<DbId>,
    pub parent_id: Option<DbId>,
}

/// Earliest and latest accepted goal years.
pub const MIN_YEAR: i32 = 2000;
pub const MAX_YEAR: i32 = 2100;

impl NewGoal {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.title.trim().is_empty() {
            return Err(CoreError::Validation("title is required".into()));
        }
        if !(MIN_YEAR..=MAX_YEAR).contains(&self.year) {
            return Err(CoreError::Validation(format!(
                "year must be between {MIN_YEAR} and {MAX_YEAR}"
            )));
        }
        if self.quarter.is_none()
            && (self.scope == GoalScope::Individual || self.duration == GoalDuration::Quarterly)
        {
            return Err(CoreError::Validation(
                "quarter is required for individual and quarterly goals".into(),
            ));
        }
        Ok(())
    }
}

/// Individual goals wait for approval; organizational goals start active.
pub fn initial_status(scope: GoalScope) -> GoalStatus {
    match scope {
        GoalScope::Individual => GoalStatus::PendingApproval,
        GoalScope::Company | GoalScope::Department => GoalStatus::Active,
    }
}

/// A parent may be adopted only while it can still be achieved.
pub fn ensure_can_adopt(parent: &Goal) -> Result<(), CoreError> {
    match parent.status {
        GoalStatus::Rejected | GoalStatus::Discarded => Err(CoreError::Validation(format!(
            "Parent goal {} is {} and cannot take children",
            parent.id, parent.status
        ))),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Cascade
// ---------------------------------------------------------------------------

/// Whether a set of child statuses satisfies parent achievement.
///
/// Discarded children are ignored; at least one child must remain and every
/// remaining child must be achieved. A fully discarded set is not satisfied.
pub fn cascade_satisfied(children: &[GoalStatus]) -> bool {
    let mut live = children
        .iter()
        .filter(|s| **s != GoalStatus::Discarded)
        .peekable();
    live.peek().is_some() && live.all(|s| *s == GoalStatus::Achieved)
}

/// What the cascade should do with one parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeDecision {
    /// Transition the parent to `ACHIEVED`.
    Achieve,
    /// Parent is already achieved; nothing to do.
    AlreadyAchieved,
    /// Children do not (yet) satisfy the condition.
    NotSatisfied,
    /// Parent is frozen; re-evaluated when the freeze lifts.
    Frozen,
    /// Parent is not active (pending, rejected, discarded).
    Inactive(GoalStatus),
}

/// Decide the cascade outcome for `parent` given its children's statuses.
pub fn evaluate_parent(parent: &Goal, children: &[GoalStatus]) -> CascadeDecision {
    match parent.status {
        GoalStatus::Achieved => return CascadeDecision::AlreadyAchieved,
        GoalStatus::Active => {}
        other => return CascadeDecision::Inactive(other),
    }
    if !cascade_satisfied(children) {
        return CascadeDecision::NotSatisfied;
    }
    if parent.frozen {
        return CascadeDecision::Frozen;
    }
    CascadeDecision::Achieve
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// A textual progress report accompanying a manual percentage update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalProgressReport {
    pub id: DbId,
    pub goal_id: DbId,
    pub previous_percentage: i16,
    pub new_percentage: i16,
    pub report: String,
    pub reported_by: DbId,
    pub created_at: Timestamp,
}

/// Validate a manual progress update (`0..=100`, non-empty report).
pub fn validate_progress(new_percentage: i16, report: &str) -> Result<(), CoreError> {
    if !(0..=100).contains(&new_percentage) {
        return Err(CoreError::Validation(format!(
            "progress must be between 0 and 100 (got {new_percentage})"
        )));
    }
    if report.trim().is_empty() {
        return Err(CoreError::Validation(
            "a progress report is required".into(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Freeze
// ---------------------------------------------------------------------------

define_text_enum! {
    FreezeAction {
        Freeze = "freeze",
        Unfreeze = "unfreeze",
    }
}

/// One audit row per bulk freeze or unfreeze.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalFreezeLog {
    pub id: DbId,
    pub action: FreezeAction,
    pub quarter: Quarter,
    pub year: i32,
    pub affected_goals_count: i64,
    pub scheduled_unfreeze_date: Option<Timestamp>,
    pub scheduled_unfreeze_executed_at: Option<Timestamp>,
    pub is_emergency_override: bool,
    pub emergency_reason: Option<String>,
    pub performed_by: DbId,
    pub performed_at: Timestamp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FreezeRequest {
    pub quarter: Quarter,
    pub year: i32,
    pub scheduled_unfreeze_date: Option<Timestamp>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnfreezeRequest {
    pub quarter: Quarter,
    pub year: i32,
    #[serde(default)]
    pub is_emergency_override: bool,
    pub emergency_reason: Option<String>,
}

impl FreezeRequest {
    pub fn validate(&self, now: Timestamp) -> Result<(), CoreError> {
        if let Some(when) = self.scheduled_unfreeze_date {
            if when <= now {
                return Err(CoreError::Validation(
                    "scheduled_unfreeze_date must be in the future".into(),
                ));
            }
        }
        Ok(())
    }
}

impl UnfreezeRequest {
    /// An emergency override must say why.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.is_emergency_override
            && self
                .emergency_reason
                .as_deref()
                .map_or(true, |r| r.trim().is_empty())
        {
            return Err(CoreError::Validation(
                "emergency_reason is required for an emergency override".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use GoalStatus::*;

    fn goal(status: GoalStatus, frozen: bool) -> Goal {
        let now = Utc::now();
        Goal {
            id: 1,
            title: "Grow".into(),
            description: None,
            duration: GoalDuration::Quarterly,
            scope: GoalScope::Department,
            quarter: Some(Quarter::Q1),
            year: 2025,
            status,
            owner_id: 5,
            created_by: 5,
            parent_id: None,
            progress_percentage: 0,
            rejection_reason: None,
            frozen,
            frozen_at: None,
            frozen_by: None,
            approved_by: None,
            approved_at: None,
            achieved_at: None,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    #[test]
    fn achieved_plus_discarded_satisfies() {
        assert!(cascade_satisfied(&[Achieved, Achieved, Discarded]));
    }

    #[test]
    fn active_child_blocks() {
        assert!(!cascade_satisfied(&[Achieved, Active]));
    }

    #[test]
    fn all_discarded_does_not_satisfy() {
        assert!(!cascade_satisfied(&[Discarded, Discarded]));
        assert!(!cascade_satisfied(&[]));
    }

    #[test]
    fn evaluate_parent_outcomes() {
        let children = [Achieved, Discarded];
        assert_eq!(evaluate_parent(&goal(Active, false), &children), CascadeDecision::Achieve);
        assert_eq!(
            evaluate_parent(&goal(Achieved, false), &children),
            CascadeDecision::AlreadyAchieved
        );
        assert_eq!(evaluate_parent(&goal(Active, true), &children), CascadeDecision::Frozen);
        assert_eq!(
            evaluate_parent(&goal(Discarded, false), &children),
            CascadeDecision::Inactive(Discarded)
        );
        assert_eq!(
            evaluate_parent(&goal(Active, false), &[Active]),
            CascadeDecision::NotSatisfied
        );
    }

    #[test]
    fn frozen_goal_is_a_conflict() {
        let err = goal(Active, true).ensure_not_frozen().unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
        assert!(goal(Active, false).ensure_not_frozen().is_ok());
    }

    #[test]
    fn goal_transition_from_wrong_status_conflicts() {
        assert_eq!(check_transition(Active, GoalTransition::Achieve).unwrap(), Achieved);
        assert!(matches!(
            check_transition(PendingApproval, GoalTransition::Achieve),
            Err(CoreError::Conflict(_))
        ));
    }

    #[test]
    fn individual_goals_need_a_quarter() {
        let mut input = NewGoal {
            title: "Ship".into(),
            description: None,
            duration: GoalDuration::Yearly,
            scope: GoalScope::Individual,
            quarter: None,
            year: 2025,
            owner_id: None,
            parent_id: None,
        };
        assert!(input.validate().is_err());
        input.quarter = Some(Quarter::Q2);
        assert!(input.validate().is_ok());
        assert_eq!(initial_status(input.scope), PendingApproval);
        assert_eq!(initial_status(GoalScope::Company), Active);
    }

    #[test]
    fn progress_bounds_and_report() {
        assert!(validate_progress(0, "started").is_ok());
        assert!(validate_progress(100, "done").is_ok());
        assert!(validate_progress(101, "over").is_err());
        assert!(validate_progress(-1, "under").is_err());
        assert!(validate_progress(50, "  ").is_err());
    }

    #[test]
    fn emergency_unfreeze_requires_reason() {
        let mut req = UnfreezeRequest {
            quarter: Quarter::Q1,
            year: 2025,
            is_emergency_override: true,
            emergency_reason: None,
        };
        assert!(matches!(req.validate(), Err(CoreError::Validation(_))));
        req.emergency_reason = Some("  ".into());
        assert!(req.validate().is_err());
        req.emergency_reason = Some("audit correction".into());
        assert!(req.validate().is_ok());
        req.is_emergency_override = false;
        req.emergency_reason = None;
        assert!(req.validate().is_ok());
    }
}
