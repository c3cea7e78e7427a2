//! Event-to-notification rules.
//!
//! [`NotificationService`] is a pure transformer: given a [`DomainEvent`] and
//! who caused it, it returns the notifications to persist. It never touches
//! the store; the engine persists its output in the same unit of work as the
//! mutation that produced the event.
//!
//! | Event                         | Recipients               | Priority            |
//! |-------------------------------|--------------------------|---------------------|
//! | initiative created (pending)  | creator's supervisor     | high                |
//! | initiative created (assigned) | assignees                | medium              |
//! | initiative approved           | creator and assignees    | medium              |
//! | initiative rejected           | creator                  | high                |
//! | accepted / started            | creator                  | low                 |
//! | submitted                     | creator                  | medium              |
//! | reviewed                      | assignees                | medium, high (redo) |
//! | overdue                       | assignees and creator    | urgent              |
//! | extension requested           | creator                  | medium              |
//! | extension reviewed            | requester                | medium, high (deny) |
//! | goal created (pending)        | owner's supervisor       | medium              |
//! | goal approved / rejected      | owner                    | medium / high       |
//! | goal achieved                 | owner                    | medium              |
//! | goal discarded                | owner                    | low                 |
//! | quarter frozen                | every affected owner     | high                |
//! | quarter unfrozen              | every affected owner     | medium, urgent (emergency) |
//!
//! The actor never receives a notification for their own action, and each
//! recipient receives at most one notification per event.

use chrono::Duration;
use serde_json::json;
use stride_core::capabilities::ActorContext;
use stride_core::events::DomainEvent;
use stride_core::goal::{GoalStatus, GoalSummary};
use stride_core::initiative::{InitiativeStatus, InitiativeSummary};
use stride_core::notification::{NewNotification, NotificationKind, Priority};
use stride_core::types::{DbId, Timestamp};

/// Default time a notification stays listable.
pub const DEFAULT_RETENTION_DAYS: i64 = 30;

/// The rendered content shared by every recipient of one event.
struct Template {
    kind: NotificationKind,
    priority: Priority,
    title: String,
    message: String,
    action_reference: Option<String>,
    data: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct NotificationService {
    retention: Duration,
}

impl NotificationService {
    pub fn new(retention_days: i64) -> Self {
        Self {
            retention: Duration::days(retention_days),
        }
    }

    /// Notifications produced by `event`, in recipient order.
    ///
    /// `actor` is `None` for events raised by scheduled jobs.
    pub fn notifications_for(
        &self,
        event: &DomainEvent,
        actor: Option<&ActorContext>,
        now: Timestamp,
    ) -> Vec<NewNotification> {
        let by = actor.map(|a| a.name.as_str()).unwrap_or("The system");
        let (recipients, template): (Vec<DbId>, Template) = match event {
            DomainEvent::InitiativeCreated {
                initiative,
                status,
                creator_supervisor_id,
            } => match status {
                InitiativeStatus::PendingApproval => (
                    creator_supervisor_id.iter().copied().collect(),
                    initiative_template(
                        initiative,
                        NotificationKind::InitiativeSubmittedForApproval,
                        Priority::High,
                        "Initiative awaiting approval",
                        format!("{by} submitted \"{}\" for your approval", initiative.title),
                    ),
                ),
                InitiativeStatus::Assigned => (
                    initiative.assignee_ids.clone(),
                    initiative_template(
                        initiative,
                        NotificationKind::InitiativeAssigned,
                        Priority::Medium,
                        "New initiative assigned",
                        format!("{by} assigned you \"{}\"", initiative.title),
                    ),
                ),
                _ => return Vec::new(),
            },
            DomainEvent::InitiativeApproved { initiative } => (
                std::iter::once(initiative.creator_id)
                    .chain(initiative.assignee_ids.iter().copied())
                    .collect(),
                initiative_template(
                    initiative,
                    NotificationKind::InitiativeApproved,
                    Priority::Medium,
                    "Initiative approved",
                    format!("{by} approved \"{}\"", initiative.title),
                ),
            ),
            DomainEvent::InitiativeRejected { initiative, reason } => (
                vec![initiative.creator_id],
                initiative_template(
                    initiative,
                    NotificationKind::InitiativeRejected,
                    Priority::High,
                    "Initiative rejected",
                    format!("{by} rejected \"{}\": {reason}", initiative.title),
                ),
            ),
            DomainEvent::InitiativeAccepted { initiative } => (
                vec![initiative.creator_id],
                initiative_template(
                    initiative,
                    NotificationKind::InitiativeAccepted,
                    Priority::Low,
                    "Initiative accepted",
                    format!("{by} accepted \"{}\"", initiative.title),
                ),
            ),
            DomainEvent::InitiativeStarted { initiative } => (
                vec![initiative.creator_id],
                initiative_template(
                    initiative,
                    NotificationKind::InitiativeStarted,
                    Priority::Low,
                    "Initiative started",
                    format!("{by} started work on \"{}\"", initiative.title),
                ),
            ),
            DomainEvent::InitiativeSubmitted { initiative } => (
                vec![initiative.creator_id],
                initiative_template(
                    initiative,
                    NotificationKind::InitiativeSubmitted,
                    Priority::Medium,
                    "Initiative submitted for review",
                    format!("{by} submitted \"{}\" for review", initiative.title),
                ),
            ),
            DomainEvent::InitiativeReviewed {
                initiative,
                approved,
                score,
                feedback,
            } => {
                let (priority, title, message) = if *approved {
                    (
                        Priority::Medium,
                        "Initiative approved after review",
                        format!(
                            "{by} approved \"{}\" with a score of {}/10",
                            initiative.title,
                            score.unwrap_or_default()
                        ),
                    )
                } else {
                    (
                        Priority::High,
                        "Changes requested",
                        format!(
                            "{by} asked for changes to \"{}\": {}",
                            initiative.title,
                            feedback.as_deref().unwrap_or_default()
                        ),
                    )
                };
                let mut template = initiative_template(
                    initiative,
                    NotificationKind::InitiativeReviewed,
                    priority,
                    title,
                    message,
                );
                template.data["approved"] = json!(approved);
                template.data["score"] = json!(score);
                (initiative.assignee_ids.clone(), template)
            }
            DomainEvent::InitiativeOverdue {
                initiative,
                due_date,
            } => {
                let mut template = initiative_template(
                    initiative,
                    NotificationKind::InitiativeOverdue,
                    Priority::Urgent,
                    "Initiative overdue",
                    format!(
                        "\"{}\" was due on {}",
                        initiative.title,
                        due_date.format("%Y-%m-%d")
                    ),
                );
                template.data["due_date"] = json!(due_date);
                (
                    initiative
                        .assignee_ids
                        .iter()
                        .copied()
                        .chain(std::iter::once(initiative.creator_id))
                        .collect(),
                    template,
                )
            }
            DomainEvent::ExtensionRequested {
                initiative,
                extension_id,
                new_due_date,
                ..
            } => {
                let mut template = initiative_template(
                    initiative,
                    NotificationKind::ExtensionRequested,
                    Priority::Medium,
                    "Extension requested",
                    format!(
                        "{by} asked to move \"{}\" to {}",
                        initiative.title,
                        new_due_date.format("%Y-%m-%d")
                    ),
                );
                template.data["extension_id"] = json!(extension_id);
                (vec![initiative.creator_id], template)
            }
            DomainEvent::ExtensionReviewed {
                initiative,
                extension_id,
                requested_by,
                approved,
                new_due_date,
            } => {
                let (priority, title, message) = if *approved {
                    (
                        Priority::Medium,
                        "Extension approved",
                        format!(
                            "\"{}\" is now due on {}",
                            initiative.title,
                            new_due_date.format("%Y-%m-%d")
                        ),
                    )
                } else {
                    (
                        Priority::High,
                        "Extension denied",
                        format!("{by} denied more time for \"{}\"", initiative.title),
                    )
                };
                let mut template = initiative_template(
                    initiative,
                    NotificationKind::ExtensionReviewed,
                    priority,
                    title,
                    message,
                );
                template.data["extension_id"] = json!(extension_id);
                template.data["approved"] = json!(approved);
                (vec![*requested_by], template)
            }
            DomainEvent::GoalCreated {
                goal,
                status,
                owner_supervisor_id,
            } => {
                if *status != GoalStatus::PendingApproval {
                    return Vec::new();
                }
                (
                    owner_supervisor_id.iter().copied().collect(),
                    goal_template(
                        goal,
                        NotificationKind::GoalSubmittedForApproval,
                        Priority::Medium,
                        "Goal awaiting approval",
                        format!("{by} submitted the goal \"{}\" for your approval", goal.title),
                    ),
                )
            }
            DomainEvent::GoalApproved { goal } => (
                vec![goal.owner_id],
                goal_template(
                    goal,
                    NotificationKind::GoalApproved,
                    Priority::Medium,
                    "Goal approved",
                    format!("{by} approved your goal \"{}\"", goal.title),
                ),
            ),
            DomainEvent::GoalRejected { goal, reason } => (
                vec![goal.owner_id],
                goal_template(
                    goal,
                    NotificationKind::GoalRejected,
                    Priority::High,
                    "Goal rejected",
                    format!("{by} rejected your goal \"{}\": {reason}", goal.title),
                ),
            ),
            DomainEvent::GoalAchieved { goal, cascaded } => {
                let message = if *cascaded {
                    format!("\"{}\" was achieved: all of its sub-goals are complete", goal.title)
                } else {
                    format!("{by} marked \"{}\" as achieved", goal.title)
                };
                let mut template = goal_template(
                    goal,
                    NotificationKind::GoalAchieved,
                    Priority::Medium,
                    "Goal achieved",
                    message,
                );
                template.data["cascaded"] = json!(cascaded);
                (vec![goal.owner_id], template)
            }
            DomainEvent::GoalDiscarded { goal } => (
                vec![goal.owner_id],
                goal_template(
                    goal,
                    NotificationKind::GoalDiscarded,
                    Priority::Low,
                    "Goal discarded",
                    format!("{by} discarded \"{}\"", goal.title),
                ),
            ),
            DomainEvent::GoalProgressUpdated { .. } => return Vec::new(),
            DomainEvent::GoalsFrozen {
                quarter,
                year,
                owner_ids,
                ..
            } => (
                owner_ids.clone(),
                Template {
                    kind: NotificationKind::GoalsFrozen,
                    priority: Priority::High,
                    title: "Goals frozen".into(),
                    message: format!("Your {quarter} {year} goals are frozen and can no longer be changed"),
                    action_reference: None,
                    data: json!({ "quarter": quarter, "year": year }),
                },
            ),
            DomainEvent::GoalsUnfrozen {
                quarter,
                year,
                owner_ids,
                emergency,
                ..
            } => (
                owner_ids.clone(),
                Template {
                    kind: NotificationKind::GoalsUnfrozen,
                    priority: if *emergency {
                        Priority::Urgent
                    } else {
                        Priority::Medium
                    },
                    title: "Goals unfrozen".into(),
                    message: if *emergency {
                        format!("Your {quarter} {year} goals were unfrozen by an emergency override")
                    } else {
                        format!("Your {quarter} {year} goals can be edited again")
                    },
                    action_reference: None,
                    data: json!({ "quarter": quarter, "year": year, "emergency": emergency }),
                },
            ),
        };

        self.fan_out(recipients, actor.map(|a| a.user_id), template, now)
    }

    fn fan_out(
        &self,
        recipients: Vec<DbId>,
        actor_id: Option<DbId>,
        template: Template,
        now: Timestamp,
    ) -> Vec<NewNotification> {
        let mut seen = Vec::with_capacity(recipients.len());
        for id in recipients {
            if Some(id) != actor_id && !seen.contains(&id) {
                seen.push(id);
            }
        }
        seen.into_iter()
            .map(|recipient_id| NewNotification {
                kind: template.kind,
                priority: template.priority,
                recipient_id,
                triggered_by_id: actor_id,
                title: template.title.clone(),
                message: template.message.clone(),
                action_reference: template.action_reference.clone(),
                data: template.data.clone(),
                created_at: now,
                expires_at: now + self.retention,
            })
            .collect()
    }
}

impl Default for NotificationService {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION_DAYS)
    }
}

fn initiative_template(
    initiative: &InitiativeSummary,
    kind: NotificationKind,
    priority: Priority,
    title: &str,
    message: String,
) -> Template {
    Template {
        kind,
        priority,
        title: title.to_string(),
        message,
        action_reference: Some(format!("/initiatives/{}", initiative.id)),
        data: json!({ "initiative_id": initiative.id }),
    }
}

fn goal_template(
    goal: &GoalSummary,
    kind: NotificationKind,
    priority: Priority,
    title: &str,
    message: String,
) -> Template {
    Template {
        kind,
        priority,
        title: title.to_string(),
        message,
        action_reference: Some(format!("/goals/{}", goal.id)),
        data: json!({ "goal_id": goal.id, "parent_id": goal.parent_id }),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use stride_core::goal::Quarter;

    use super::*;

    fn group() -> InitiativeSummary {
        InitiativeSummary {
            id: 11,
            title: "Onboarding revamp".into(),
            creator_id: 1,
            assignee_ids: vec![2, 3],
            team_head_id: Some(3),
        }
    }

    fn actor(user_id: DbId) -> ActorContext {
        let mut actor = ActorContext::system(user_id);
        actor.name = "Dana".into();
        actor
    }

    fn recipients(notes: &[NewNotification]) -> Vec<DbId> {
        notes.iter().map(|n| n.recipient_id).collect()
    }

    #[test]
    fn pending_initiative_goes_to_supervisor() {
        let svc = NotificationService::default();
        let notes = svc.notifications_for(
            &DomainEvent::InitiativeCreated {
                initiative: group(),
                status: InitiativeStatus::PendingApproval,
                creator_supervisor_id: Some(9),
            },
            Some(&actor(1)),
            Utc::now(),
        );
        assert_eq!(recipients(&notes), vec![9]);
        assert_eq!(notes[0].kind, NotificationKind::InitiativeSubmittedForApproval);
        assert_eq!(notes[0].priority, Priority::High);
    }

    #[test]
    fn creation_without_supervisor_notifies_nobody() {
        let svc = NotificationService::default();
        let notes = svc.notifications_for(
            &DomainEvent::InitiativeCreated {
                initiative: group(),
                status: InitiativeStatus::PendingApproval,
                creator_supervisor_id: None,
            },
            Some(&actor(1)),
            Utc::now(),
        );
        assert!(notes.is_empty());
    }

    #[test]
    fn approval_reaches_creator_and_assignees_but_not_actor() {
        let svc = NotificationService::default();
        let mut init = group();
        init.assignee_ids = vec![1, 2, 3];
        let notes = svc.notifications_for(
            &DomainEvent::InitiativeApproved { initiative: init },
            Some(&actor(3)),
            Utc::now(),
        );
        // creator 1 appears twice in the raw list and is deduplicated
        assert_eq!(recipients(&notes), vec![1, 2]);
        assert!(notes.iter().all(|n| n.triggered_by_id == Some(3)));
    }

    #[test]
    fn redo_is_high_priority() {
        let svc = NotificationService::default();
        let notes = svc.notifications_for(
            &DomainEvent::InitiativeReviewed {
                initiative: group(),
                approved: false,
                score: None,
                feedback: Some("Add metrics".into()),
            },
            Some(&actor(1)),
            Utc::now(),
        );
        assert_eq!(recipients(&notes), vec![2, 3]);
        assert!(notes.iter().all(|n| n.priority == Priority::High));
        assert!(notes[0].message.contains("Add metrics"));
    }

    #[test]
    fn overdue_from_the_sweep_has_no_trigger() {
        let svc = NotificationService::default();
        let now = Utc::now();
        let notes = svc.notifications_for(
            &DomainEvent::InitiativeOverdue {
                initiative: group(),
                due_date: now,
            },
            None,
            now,
        );
        assert_eq!(recipients(&notes), vec![2, 3, 1]);
        assert!(notes.iter().all(|n| n.priority == Priority::Urgent && n.triggered_by_id.is_none()));
    }

    #[test]
    fn progress_updates_are_silent() {
        let svc = NotificationService::default();
        let notes = svc.notifications_for(
            &DomainEvent::GoalProgressUpdated {
                goal: GoalSummary {
                    id: 1,
                    title: "NPS".into(),
                    owner_id: 2,
                    parent_id: None,
                },
                previous_percentage: 10,
                new_percentage: 40,
            },
            Some(&actor(2)),
            Utc::now(),
        );
        assert!(notes.is_empty());
    }

    #[test]
    fn emergency_unfreeze_is_urgent_and_expires_after_retention() {
        let svc = NotificationService::new(7);
        let now = Utc::now();
        let notes = svc.notifications_for(
            &DomainEvent::GoalsUnfrozen {
                quarter: Quarter::Q1,
                year: 2025,
                affected_count: 3,
                owner_ids: vec![4, 5, 4],
                emergency: true,
            },
            Some(&actor(1)),
            now,
        );
        assert_eq!(recipients(&notes), vec![4, 5]);
        assert_eq!(notes[0].priority, Priority::Urgent);
        assert_eq!(notes[0].expires_at, now + Duration::days(7));
        assert_eq!(notes[0].data["quarter"], "Q1");
    }
}
