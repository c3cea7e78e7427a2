//! Actor capability resolution.
//!
//! Role checks are never made ad hoc inside guards. Instead the acting user's
//! role class and permission strings are resolved once per request into an
//! [`ActorContext`] carrying an explicit [`Capability`] set plus the
//! organizational relationships the workflow guards need.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::DbId;

define_text_enum! {
    /// Coarse role class of a user, as supplied by the user directory.
    RoleClass {
        Leadership = "leadership",
        Regular = "regular",
    }
}

define_text_enum! {
    /// A single thing an actor is allowed to do regardless of relationships.
    Capability {
        /// Self-assigned initiatives skip supervisor approval.
        BypassApproval = "bypass_approval",
        /// May approve/reject any pending initiative.
        ApproveInitiatives = "approve_initiatives",
        /// May review any submitted initiative.
        ReviewInitiatives = "review_initiatives",
        /// May approve/reject any pending individual goal.
        ApproveGoals = "approve_goals",
        /// May create company or department scoped goals.
        CreateOrganizationGoals = "create_organization_goals",
        /// May achieve, discard and report progress on any goal.
        ManageGoals = "manage_goals",
        /// May freeze and unfreeze goal quarters.
        FreezeGoals = "freeze_goals",
        /// May assign initiatives outside their own department.
        AssignAcrossDepartments = "assign_across_departments",
    }
}

/// Permission strings understood by [`capabilities_for`].
pub const PERM_INITIATIVE_APPROVE: &str = "initiative_approve";
pub const PERM_INITIATIVE_REVIEW: &str = "initiative_review";
pub const PERM_INITIATIVE_VIEW_ALL: &str = "initiative_view_all";
pub const PERM_GOAL_APPROVE: &str = "goal_approve";
pub const PERM_GOAL_CREATE_ORGANIZATION: &str = "goal_create_organization";
pub const PERM_GOAL_MANAGE: &str = "goal_manage";
pub const PERM_GOAL_FREEZE: &str = "goal_freeze";

/// A user as seen by the workflow: identity, hierarchy, and grants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: DbId,
    pub name: String,
    pub supervisor_id: Option<DbId>,
    pub department_id: Option<DbId>,
    pub role_class: RoleClass,
    pub permissions: Vec<String>,
    pub is_active: bool,
}

/// Map a role class and permission strings to a capability set.
///
/// Unknown permission strings are ignored.
pub fn capabilities_for(role_class: RoleClass, permissions: &[String]) -> BTreeSet<Capability> {
    let mut caps = BTreeSet::new();

    if role_class == RoleClass::Leadership {
        caps.insert(Capability::BypassApproval);
        caps.insert(Capability::ApproveInitiatives);
        caps.insert(Capability::CreateOrganizationGoals);
        caps.insert(Capability::AssignAcrossDepartments);
    }

    for perm in permissions {
        let cap = match perm.as_str() {
            PERM_INITIATIVE_APPROVE => Capability::ApproveInitiatives,
            PERM_INITIATIVE_REVIEW => Capability::ReviewInitiatives,
            PERM_INITIATIVE_VIEW_ALL => Capability::AssignAcrossDepartments,
            PERM_GOAL_APPROVE => Capability::ApproveGoals,
            PERM_GOAL_CREATE_ORGANIZATION => Capability::CreateOrganizationGoals,
            PERM_GOAL_MANAGE => Capability::ManageGoals,
            PERM_GOAL_FREEZE => Capability::FreezeGoals,
            _ => continue,
        };
        caps.insert(cap);
    }

    caps
}

/// The resolved acting user for one request. Passed by value through the
/// workflow; never looked up again inside guards.
#[derive(Debug, Clone)]
pub struct ActorContext {
    pub user_id: DbId,
    pub name: String,
    pub supervisor_id: Option<DbId>,
    pub department_id: Option<DbId>,
    pub capabilities: BTreeSet<Capability>,
    /// Ids of users whose `supervisor_id` is this actor.
    pub direct_reports: BTreeSet<DbId>,
}

impl ActorContext {
    /// Build the context from the actor's profile and their direct reports.
    pub fn resolve(profile: &UserProfile, direct_reports: impl IntoIterator<Item = DbId>) -> Self {
        Self {
            user_id: profile.id,
            name: profile.name.clone(),
            supervisor_id: profile.supervisor_id,
            department_id: profile.department_id,
            capabilities: capabilities_for(profile.role_class, &profile.permissions),
            direct_reports: direct_reports.into_iter().collect(),
        }
    }

    /// Context for work the system performs on its own (scheduled jobs).
    pub fn system(user_id: DbId) -> Self {
        Self {
            user_id,
            name: "system".to_string(),
            supervisor_id: None,
            department_id: None,
            capabilities: Capability::ALL.iter().copied().collect(),
            direct_reports: BTreeSet::new(),
        }
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Whether this actor is the direct supervisor of `user_id`.
    pub fn supervises(&self, user_id: DbId) -> bool {
        self.direct_reports.contains(&user_id)
    }

    /// Whether this actor has more than zero direct reports.
    pub fn has_supervisory_authority(&self) -> bool {
        !self.direct_reports.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(role_class: RoleClass, permissions: &[&str]) -> UserProfile {
        UserProfile {
            id: 10,
            name: "Ada".into(),
            supervisor_id: Some(1),
            department_id: Some(3),
            role_class,
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
            is_active: true,
        }
    }

    #[test]
    fn leadership_gets_bypass_and_approval() {
        let caps = capabilities_for(RoleClass::Leadership, &[]);
        assert!(caps.contains(&Capability::BypassApproval));
        assert!(caps.contains(&Capability::ApproveInitiatives));
        assert!(!caps.contains(&Capability::FreezeGoals));
    }

    #[test]
    fn regular_capabilities_come_from_permissions_only() {
        let caps = capabilities_for(
            RoleClass::Regular,
            &[PERM_GOAL_FREEZE.to_string(), "something_else".to_string()],
        );
        assert_eq!(caps.len(), 1);
        assert!(caps.contains(&Capability::FreezeGoals));
    }

    #[test]
    fn resolve_tracks_direct_reports() {
        let actor = ActorContext::resolve(&profile(RoleClass::Regular, &[]), [11, 12]);
        assert!(actor.supervises(11));
        assert!(!actor.supervises(13));
        assert!(actor.has_supervisory_authority());
        assert!(!actor.has(Capability::BypassApproval));
    }

    #[test]
    fn role_class_round_trips_through_text() {
        assert_eq!("leadership".parse::<RoleClass>().unwrap(), RoleClass::Leadership);
        assert!("admin".parse::<RoleClass>().is_err());
    }
}
