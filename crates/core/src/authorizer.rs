//! Transition guards.
//!
//! Every guard is a pure function of the resolved [`ActorContext`] and the
//! entity as currently stored. Status checks live with the state machines in
//! [`initiative`](crate::initiative) and [`goal`](crate::goal); this module
//! only answers "may this actor do this".

use crate::capabilities::{ActorContext, Capability};
use crate::error::CoreError;
use crate::goal::{Goal, GoalScope};
use crate::initiative::Initiative;

/// Outcome of a guard check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    Allowed,
    Denied { reason: String },
}

impl Authorization {
    fn deny(reason: impl Into<String>) -> Self {
        Self::Denied {
            reason: reason.into(),
        }
    }

    fn allow_if(condition: bool, reason: impl Into<String>) -> Self {
        if condition {
            Self::Allowed
        } else {
            Self::deny(reason)
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// Map a denial onto [`CoreError::Forbidden`].
    pub fn into_result(self) -> Result<(), CoreError> {
        match self {
            Self::Allowed => Ok(()),
            Self::Denied { reason } => Err(CoreError::Forbidden(reason)),
        }
    }
}

/// Guards for initiative and goal transitions.
pub struct TransitionAuthorizer;

impl TransitionAuthorizer {
    // -- Initiatives --------------------------------------------------------

    /// Approve or reject a pending initiative: the creator's direct
    /// supervisor, or anyone holding `ApproveInitiatives`.
    pub fn approve_initiative(actor: &ActorContext, initiative: &Initiative) -> Authorization {
        Authorization::allow_if(
            actor.supervises(initiative.creator_id) || actor.has(Capability::ApproveInitiatives),
            "Only the creator's supervisor or an approver can decide on this initiative",
        )
    }

    /// Accept or start: any assignee or the team head.
    pub fn work_on_initiative(actor: &ActorContext, initiative: &Initiative) -> Authorization {
        Authorization::allow_if(
            initiative.is_participant(actor.user_id),
            "Only assignees can act on this initiative",
        )
    }

    /// Submit for review or request an extension: the assignee, or the team
    /// head for group initiatives.
    pub fn submit_initiative(actor: &ActorContext, initiative: &Initiative) -> Authorization {
        Authorization::allow_if(
            initiative.is_submitter(actor.user_id),
            "Only the assignee (or team head of a group initiative) can submit",
        )
    }

    /// Review a submitted initiative: the creator or a reviewer.
    pub fn review_initiative(actor: &ActorContext, initiative: &Initiative) -> Authorization {
        Authorization::allow_if(
            actor.user_id == initiative.creator_id || actor.has(Capability::ReviewInitiatives),
            "Only the creator or a reviewer can review this initiative",
        )
    }

    /// Decide on an extension request: the creator only.
    pub fn review_extension(actor: &ActorContext, initiative: &Initiative) -> Authorization {
        Authorization::allow_if(
            actor.user_id == initiative.creator_id,
            "Only the initiative creator can review extension requests",
        )
    }

    // -- Goals --------------------------------------------------------------

    /// Create a goal of the given scope. Individual goals are open to
    /// everyone; organizational goals need `CreateOrganizationGoals`.
    pub fn create_goal(actor: &ActorContext, scope: GoalScope) -> Authorization {
        match scope {
            GoalScope::Individual => Authorization::Allowed,
            GoalScope::Company | GoalScope::Department => Authorization::allow_if(
                actor.has(Capability::CreateOrganizationGoals),
                format!("Creating {scope} goals requires organizational goal permission"),
            ),
        }
    }

    /// Approve or reject a pending goal: the owner's direct supervisor or a
    /// goal approver.
    pub fn approve_goal(actor: &ActorContext, goal: &Goal) -> Authorization {
        Authorization::allow_if(
            actor.supervises(goal.owner_id) || actor.has(Capability::ApproveGoals),
            "Only the owner's supervisor or a goal approver can decide on this goal",
        )
    }

    /// Achieve, discard or report progress: the owner or a goal manager.
    pub fn manage_goal(actor: &ActorContext, goal: &Goal) -> Authorization {
        Authorization::allow_if(
            actor.user_id == goal.owner_id || actor.has(Capability::ManageGoals),
            "Only the goal owner or a goal manager can change this goal",
        )
    }

    pub fn freeze_goals(actor: &ActorContext) -> Authorization {
        Authorization::allow_if(
            actor.has(Capability::FreezeGoals),
            "Freezing goals requires the goal_freeze permission",
        )
    }
}
