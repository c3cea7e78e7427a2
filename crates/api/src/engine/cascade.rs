//! Upward achievement propagation through goal parent links.
//!
//! When a goal becomes ACHIEVED or DISCARDED its parent is re-evaluated with
//! [`evaluate_parent`]; a parent that becomes ACHIEVED is committed (with its
//! notification) before its own parent is looked at, so the walk is strictly
//! child-to-root. Already-achieved parents are passed through so ancestors
//! skipped while frozen catch up.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use stride_core::capabilities::ActorContext;
use stride_core::error::CoreError;
use stride_core::events::DomainEvent;
use stride_core::goal::{evaluate_parent, CascadeDecision, Goal, GoalStatus};
use stride_core::types::DbId;
use stride_db::{StoreError, WorkflowStore};
use stride_events::NotificationService;

use super::Outbox;

/// Re-reads of a parent that lost an optimistic write before giving up.
const MAX_ATTEMPTS: usize = 3;

enum Step {
    Achieved(Goal),
    PassThrough(Option<DbId>),
    Stop,
}

pub struct CascadeEvaluator {
    store: Arc<dyn WorkflowStore>,
    notifications: NotificationService,
    outbox: Outbox,
}

impl CascadeEvaluator {
    pub fn new(store: Arc<dyn WorkflowStore>, notifications: NotificationService, outbox: Outbox) -> Self {
        Self {
            store,
            notifications,
            outbox,
        }
    }

    /// Re-evaluate the ancestors of `changed`, which just became ACHIEVED or
    /// DISCARDED. Returns the goals this walk achieved, child first.
    pub async fn after_change(
        &self,
        changed: &Goal,
        actor: Option<&ActorContext>,
    ) -> Result<Vec<Goal>, CoreError> {
        let mut visited = BTreeSet::from([changed.id]);
        self.walk(changed.parent_id, &mut visited, actor).await
    }

    /// Evaluate `goal_id` itself as a parent, then its ancestors.
    pub async fn reevaluate(
        &self,
        goal_id: DbId,
        actor: Option<&ActorContext>,
    ) -> Result<Vec<Goal>, CoreError> {
        let mut visited = BTreeSet::new();
        self.walk(Some(goal_id), &mut visited, actor).await
    }

    /// A goal seen twice means the parent links form a cycle. The walk stops
    /// there without writing anything further.
    async fn walk(
        &self,
        mut next: Option<DbId>,
        visited: &mut BTreeSet<DbId>,
        actor: Option<&ActorContext>,
    ) -> Result<Vec<Goal>, CoreError> {
        let mut achieved = Vec::new();

        while let Some(goal_id) = next {
            if !visited.insert(goal_id) {
                tracing::error!(
                    goal_id,
                    path = ?visited,
                    "Cycle in goal parent links, cascade aborted"
                );
                return Err(CoreError::Internal(format!(
                    "cycle in goal hierarchy at goal {goal_id}"
                )));
            }

            next = match self.evaluate(goal_id, actor).await? {
                Step::Achieved(goal) => {
                    let parent_id = goal.parent_id;
                    achieved.push(goal);
                    parent_id
                }
                Step::PassThrough(parent_id) => parent_id,
                Step::Stop => None,
            };
        }

        Ok(achieved)
    }

    async fn evaluate(&self, goal_id: DbId, actor: Option<&ActorContext>) -> Result<Step, CoreError> {
        for attempt in 1..=MAX_ATTEMPTS {
            let Some(mut parent) = self.store.find_goal(goal_id).await? else {
                tracing::warn!(goal_id, "Parent goal vanished during cascade");
                return Ok(Step::Stop);
            };
            let children: Vec<GoalStatus> = self
                .store
                .child_goals(goal_id)
                .await?
                .iter()
                .map(|c| c.status)
                .collect();

            match evaluate_parent(&parent, &children) {
                CascadeDecision::Achieve => {}
                CascadeDecision::AlreadyAchieved => return Ok(Step::PassThrough(parent.parent_id)),
                decision => {
                    tracing::debug!(goal_id, ?decision, "Cascade stops");
                    return Ok(Step::Stop);
                }
            }

            let now = Utc::now();
            parent.status = GoalStatus::Achieved;
            parent.progress_percentage = 100;
            parent.achieved_at = Some(now);
            parent.updated_at = now;

            let event = DomainEvent::GoalAchieved {
                goal: parent.summary(),
                cascaded: true,
            };
            let notifications = self.notifications.notifications_for(&event, actor, now);

            match self.store.update_goal(&parent, notifications).await {
                Ok(committed) => {
                    tracing::info!(goal_id, children = children.len(), "Goal achieved by cascade");
                    self.outbox
                        .emit(event, actor.map(|a| a.user_id), &committed.notifications)
                        .await;
                    return Ok(Step::Achieved(committed.value));
                }
                Err(StoreError::Conflict(msg)) => {
                    tracing::debug!(goal_id, attempt, reason = %msg, "Parent changed during cascade, re-reading");
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::warn!(goal_id, "Cascade gave up after repeated conflicts");
        Ok(Step::Stop)
    }
}
