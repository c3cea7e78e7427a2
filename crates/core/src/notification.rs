//! Persisted user notifications.

use serde::{Deserialize, Serialize};

use crate::types::{DbId, Timestamp};

define_text_enum! {
    /// Snake-case tag of the event that produced a notification.
    NotificationKind {
        InitiativeSubmittedForApproval = "initiative_submitted_for_approval",
        InitiativeAssigned = "initiative_assigned",
        InitiativeApproved = "initiative_approved",
        InitiativeRejected = "initiative_rejected",
        InitiativeAccepted = "initiative_accepted",
        InitiativeStarted = "initiative_started",
        InitiativeSubmitted = "initiative_submitted",
        InitiativeReviewed = "initiative_reviewed",
        InitiativeOverdue = "initiative_overdue",
        ExtensionRequested = "extension_requested",
        ExtensionReviewed = "extension_reviewed",
        GoalSubmittedForApproval = "goal_submitted_for_approval",
        GoalApproved = "goal_approved",
        GoalRejected = "goal_rejected",
        GoalAchieved = "goal_achieved",
        GoalDiscarded = "goal_discarded",
        GoalsFrozen = "goals_frozen",
        GoalsUnfrozen = "goals_unfrozen",
    }
}

define_text_enum! {
    Priority {
        Low = "low",
        Medium = "medium",
        High = "high",
        Urgent = "urgent",
    }
}

/// A stored notification. Only `is_read` / `read_at` change after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: DbId,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub priority: Priority,
    pub recipient_id: DbId,
    pub triggered_by_id: Option<DbId>,
    pub title: String,
    pub message: String,
    pub action_reference: Option<String>,
    pub data: serde_json::Value,
    pub is_read: bool,
    pub read_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
}

/// A notification ready to be inserted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewNotification {
    pub kind: NotificationKind,
    pub priority: Priority,
    pub recipient_id: DbId,
    pub triggered_by_id: Option<DbId>,
    pub title: String,
    pub message: String,
    pub action_reference: Option<String>,
    pub data: serde_json::Value,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
}

impl NewNotification {
    /// Materialize the row once the store has assigned an id.
    pub fn into_notification(self, id: DbId) -> Notification {
        Notification {
            id,
            kind: self.kind,
            priority: self.priority,
            recipient_id: self.recipient_id,
            triggered_by_id: self.triggered_by_id,
            title: self.title,
            message: self.message,
            action_reference: self.action_reference,
            data: self.data,
            is_read: false,
            read_at: None,
            created_at: self.created_at,
            expires_at: self.expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;

    #[test]
    fn serializes_kind_as_type() {
        let now = Utc::now();
        let n = NewNotification {
            kind: NotificationKind::GoalsFrozen,
            priority: Priority::High,
            recipient_id: 4,
            triggered_by_id: Some(1),
            title: "Goals frozen".into(),
            message: "Q1 2025 goals are frozen".into(),
            action_reference: None,
            data: serde_json::json!({"quarter": "Q1", "year": 2025}),
            created_at: now,
            expires_at: now + Duration::days(30),
        }
        .into_notification(9);

        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["type"], "goals_frozen");
        assert_eq!(json["priority"], "high");
        assert_eq!(json["is_read"], false);
    }

    #[test]
    fn priorities_are_ordered() {
        assert!(Priority::Low < Priority::Medium);
        assert!(Priority::High < Priority::Urgent);
    }
}
