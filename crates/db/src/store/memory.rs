//! In-process [`WorkflowStore`] used by tests and `STORE_BACKEND=memory`.
//!
//! All state sits behind one `tokio::sync::Mutex`, so every call is a unit
//! of work. Version and frozen checks mirror the conditional `UPDATE`s of
//! [`PgStore`](super::PgStore).

use std::collections::BTreeMap;
use std::sync::OnceLock;

use async_trait::async_trait;
use stride_core::capabilities::UserProfile;
use stride_core::goal::{FreezeAction, Goal, GoalFreezeLog, GoalProgressReport, GoalScope, Quarter};
use stride_core::initiative::{ExtensionStatus, Initiative, InitiativeExtension};
use stride_core::notification::{NewNotification, Notification};
use stride_core::types::{DbId, Timestamp};
use tokio::sync::Mutex;

use super::{
    Committed, CommitFeed, NotificationFilter, NotificationStats, Notify, StoreError, StoreResult,
    WorkflowStore,
};
use crate::models::event::{CreateEventRecord, DomainEventRecord};
use crate::models::goal::{CreateFreeze, CreateGoal, CreateProgressReport, CreateUnfreeze, FreezeBatch};
use crate::models::initiative::{CreateExtension, CreateInitiative};

#[derive(Default)]
struct State {
    users: BTreeMap<DbId, UserProfile>,
    initiatives: BTreeMap<DbId, Initiative>,
    extensions: BTreeMap<DbId, InitiativeExtension>,
    goals: BTreeMap<DbId, Goal>,
    progress_reports: Vec<GoalProgressReport>,
    freeze_logs: Vec<GoalFreezeLog>,
    notifications: BTreeMap<DbId, Notification>,
    events: Vec<DomainEventRecord>,
    last_id: DbId,
}

impl State {
    /// One sequence shared by all tables; ids only need to be unique per table.
    fn next_id(&mut self) -> DbId {
        self.last_id += 1;
        self.last_id
    }

    fn insert_notifications(&mut self, drafts: Vec<NewNotification>) -> Vec<Notification> {
        drafts
            .into_iter()
            .map(|draft| {
                let n = draft.into_notification(self.next_id());
                self.notifications.insert(n.id, n.clone());
                n
            })
            .collect()
    }

    fn write_initiative(&mut self, initiative: &Initiative) -> StoreResult<Initiative> {
        let stored = self
            .initiatives
            .get_mut(&initiative.id)
            .ok_or(StoreError::NotFound {
                entity: "Initiative",
                id: initiative.id,
            })?;
        if stored.version != initiative.version {
            return Err(StoreError::Conflict(format!(
                "Initiative {} was modified concurrently; re-fetch and retry",
                initiative.id
            )));
        }
        let mut next = initiative.clone();
        next.version += 1;
        *stored = next.clone();
        Ok(next)
    }

    fn write_goal(&mut self, goal: &Goal) -> StoreResult<Goal> {
        let stored = self.goals.get_mut(&goal.id).ok_or(StoreError::NotFound {
            entity: "Goal",
            id: goal.id,
        })?;
        if stored.frozen {
            return Err(StoreError::Conflict(format!("Goal {} is frozen", goal.id)));
        }
        if stored.version != goal.version {
            return Err(StoreError::Conflict(format!(
                "Goal {} was modified concurrently; re-fetch and retry",
                goal.id
            )));
        }
        let mut next = goal.clone();
        next.frozen = stored.frozen;
        next.frozen_at = stored.frozen_at;
        next.frozen_by = stored.frozen_by;
        next.version += 1;
        *stored = next.clone();
        Ok(next)
    }

    fn quarter_goals(&self, quarter: Quarter, year: i32, frozen: bool) -> Vec<DbId> {
        self.goals
            .values()
            .filter(|g| {
                g.scope == GoalScope::Individual
                    && g.quarter == Some(quarter)
                    && g.year == year
                    && g.frozen == frozen
            })
            .map(|g| g.id)
            .collect()
    }
}

/// Store keeping everything in memory. Cheap to construct per test.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    feed: OnceLock<CommitFeed>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a goal exactly as given, bypassing creation rules. For fixtures
    /// that need shapes the API cannot produce.
    pub async fn seed_goal(&self, goal: Goal) {
        let mut state = self.state.lock().await;
        state.last_id = state.last_id.max(goal.id);
        state.goals.insert(goal.id, goal);
    }

    /// Called with the state lock still held so the feed order matches ids.
    fn publish(&self, notifications: &[Notification]) {
        if let Some(feed) = self.feed.get() {
            feed.publish(notifications);
        }
    }
}

fn unexpired(n: &Notification, recipient_id: DbId, now: Timestamp) -> bool {
    n.recipient_id == recipient_id && n.expires_at > now
}

#[async_trait]
impl WorkflowStore for MemoryStore {
    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn attach_feed(&self, feed: CommitFeed) {
        if self.feed.set(feed).is_err() {
            tracing::warn!("Commit feed already attached; keeping the first");
        }
    }

    // -- Users --------------------------------------------------------------

    async fn find_user(&self, id: DbId) -> StoreResult<Option<UserProfile>> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn direct_reports(&self, supervisor_id: DbId) -> StoreResult<Vec<DbId>> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .filter(|u| u.supervisor_id == Some(supervisor_id) && u.is_active)
            .map(|u| u.id)
            .collect())
    }

    async fn upsert_user(&self, profile: &UserProfile) -> StoreResult<()> {
        self.state
            .lock()
            .await
            .users
            .insert(profile.id, profile.clone());
        Ok(())
    }

    // -- Initiatives --------------------------------------------------------

    async fn find_initiative(&self, id: DbId) -> StoreResult<Option<Initiative>> {
        Ok(self.state.lock().await.initiatives.get(&id).cloned())
    }

    async fn create_initiative(
        &self,
        input: &CreateInitiative,
        notify: Notify<'_, Initiative>,
    ) -> StoreResult<Committed<Initiative>> {
        let mut state = self.state.lock().await;
        let initiative = Initiative {
            id: state.next_id(),
            title: input.title.clone(),
            description: input.description.clone(),
            kind: input.kind,
            status: input.status,
            creator_id: input.creator_id,
            assignee_ids: input.assignee_ids.clone(),
            team_head_id: input.team_head_id,
            goal_id: input.goal_id,
            due_date: input.due_date,
            urgency: input.urgency,
            score: None,
            feedback: None,
            completion_report: None,
            approved_at: None,
            reviewed_at: None,
            overdue_notified_at: None,
            created_at: input.created_at,
            updated_at: input.created_at,
            version: 1,
        };
        state.initiatives.insert(initiative.id, initiative.clone());
        let notifications = state.insert_notifications(notify(&initiative));
        self.publish(&notifications);
        Ok(Committed {
            value: initiative,
            notifications,
        })
    }

    async fn update_initiative(
        &self,
        initiative: &Initiative,
        notifications: Vec<NewNotification>,
    ) -> StoreResult<Committed<Initiative>> {
        let mut state = self.state.lock().await;
        let value = state.write_initiative(initiative)?;
        let notifications = state.insert_notifications(notifications);
        self.publish(&notifications);
        Ok(Committed {
            value,
            notifications,
        })
    }

    async fn overdue_unnotified(&self, now: Timestamp, limit: i64) -> StoreResult<Vec<Initiative>> {
        let state = self.state.lock().await;
        let mut due: Vec<Initiative> = state
            .initiatives
            .values()
            .filter(|i| i.is_overdue(now) && i.overdue_notified_at.is_none())
            .cloned()
            .collect();
        due.sort_by_key(|i| i.due_date);
        due.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(due)
    }

    async fn find_extension(&self, id: DbId) -> StoreResult<Option<InitiativeExtension>> {
        Ok(self.state.lock().await.extensions.get(&id).cloned())
    }

    async fn pending_extension(&self, initiative_id: DbId) -> StoreResult<Option<InitiativeExtension>> {
        let state = self.state.lock().await;
        Ok(state
            .extensions
            .values()
            .find(|e| e.initiative_id == initiative_id && e.status == ExtensionStatus::Pending)
            .cloned())
    }

    async fn create_extension(
        &self,
        input: &CreateExtension,
        notify: Notify<'_, InitiativeExtension>,
    ) -> StoreResult<Committed<InitiativeExtension>> {
        let mut state = self.state.lock().await;
        let already_pending = state.extensions.values().any(|e| {
            e.initiative_id == input.initiative_id && e.status == ExtensionStatus::Pending
        });
        if already_pending {
            return Err(StoreError::Conflict(
                "An extension request is already pending for this initiative".into(),
            ));
        }
        let extension = InitiativeExtension {
            id: state.next_id(),
            initiative_id: input.initiative_id,
            requested_by: input.requested_by,
            new_due_date: input.new_due_date,
            reason: input.reason.clone(),
            status: ExtensionStatus::Pending,
            reviewed_by: None,
            review_note: None,
            created_at: input.created_at,
            reviewed_at: None,
        };
        state.extensions.insert(extension.id, extension.clone());
        let notifications = state.insert_notifications(notify(&extension));
        self.publish(&notifications);
        Ok(Committed {
            value: extension,
            notifications,
        })
    }

    async fn review_extension(
        &self,
        extension: &InitiativeExtension,
        initiative: Option<&Initiative>,
        notifications: Vec<NewNotification>,
    ) -> StoreResult<Committed<InitiativeExtension>> {
        let mut state = self.state.lock().await;
        match state.extensions.get(&extension.id) {
            None => {
                return Err(StoreError::NotFound {
                    entity: "InitiativeExtension",
                    id: extension.id,
                })
            }
            Some(stored) if stored.status != ExtensionStatus::Pending => {
                return Err(StoreError::Conflict(format!(
                    "Extension request {} was already decided",
                    extension.id
                )))
            }
            Some(_) => {}
        }
        if let Some(initiative) = initiative {
            state.write_initiative(initiative)?;
        }
        state.extensions.insert(extension.id, extension.clone());
        let notifications = state.insert_notifications(notifications);
        self.publish(&notifications);
        Ok(Committed {
            value: extension.clone(),
            notifications,
        })
    }

    // -- Goals --------------------------------------------------------------

    async fn find_goal(&self, id: DbId) -> StoreResult<Option<Goal>> {
        Ok(self.state.lock().await.goals.get(&id).cloned())
    }

    async fn child_goals(&self, parent_id: DbId) -> StoreResult<Vec<Goal>> {
        let state = self.state.lock().await;
        Ok(state
            .goals
            .values()
            .filter(|g| g.parent_id == Some(parent_id))
            .cloned()
            .collect())
    }

    async fn create_goal(&self, input: &CreateGoal, notify: Notify<'_, Goal>) -> StoreResult<Committed<Goal>> {
        let mut state = self.state.lock().await;
        let goal = Goal {
            id: state.next_id(),
            title: input.title.clone(),
            description: input.description.clone(),
            duration: input.duration,
            scope: input.scope,
            quarter: input.quarter,
            year: input.year,
            status: input.status,
            owner_id: input.owner_id,
            created_by: input.created_by,
            parent_id: input.parent_id,
            progress_percentage: 0,
            rejection_reason: None,
            frozen: false,
            frozen_at: None,
            frozen_by: None,
            approved_by: None,
            approved_at: None,
            achieved_at: None,
            created_at: input.created_at,
            updated_at: input.created_at,
            version: 1,
        };
        state.goals.insert(goal.id, goal.clone());
        let notifications = state.insert_notifications(notify(&goal));
        self.publish(&notifications);
        Ok(Committed {
            value: goal,
            notifications,
        })
    }

    async fn update_goal(
        &self,
        goal: &Goal,
        notifications: Vec<NewNotification>,
    ) -> StoreResult<Committed<Goal>> {
        let mut state = self.state.lock().await;
        let value = state.write_goal(goal)?;
        let notifications = state.insert_notifications(notifications);
        self.publish(&notifications);
        Ok(Committed {
            value,
            notifications,
        })
    }

    async fn record_progress(
        &self,
        goal: &Goal,
        report: &CreateProgressReport,
    ) -> StoreResult<(Goal, GoalProgressReport)> {
        let mut state = self.state.lock().await;
        let goal = state.write_goal(goal)?;
        let report = GoalProgressReport {
            id: state.next_id(),
            goal_id: report.goal_id,
            previous_percentage: report.previous_percentage,
            new_percentage: report.new_percentage,
            report: report.report.clone(),
            reported_by: report.reported_by,
            created_at: report.created_at,
        };
        state.progress_reports.push(report.clone());
        Ok((goal, report))
    }

    async fn progress_reports(&self, goal_id: DbId) -> StoreResult<Vec<GoalProgressReport>> {
        let state = self.state.lock().await;
        Ok(state
            .progress_reports
            .iter()
            .rev()
            .filter(|r| r.goal_id == goal_id)
            .cloned()
            .collect())
    }

    // -- Freeze -------------------------------------------------------------

    async fn freeze_quarter(
        &self,
        input: &CreateFreeze,
        notify: Notify<'_, Vec<Goal>>,
    ) -> StoreResult<Committed<FreezeBatch>> {
        let mut state = self.state.lock().await;
        let mut goals = Vec::new();
        for id in state.quarter_goals(input.quarter, input.year, false) {
            if let Some(goal) = state.goals.get_mut(&id) {
                goal.frozen = true;
                goal.frozen_at = Some(input.performed_at);
                goal.frozen_by = Some(input.performed_by);
                goal.updated_at = input.performed_at;
                goal.version += 1;
                goals.push(goal.clone());
            }
        }
        let log = GoalFreezeLog {
            id: state.next_id(),
            action: FreezeAction::Freeze,
            quarter: input.quarter,
            year: input.year,
            affected_goals_count: goals.len() as i64,
            scheduled_unfreeze_date: input.scheduled_unfreeze_date,
            scheduled_unfreeze_executed_at: None,
            is_emergency_override: false,
            emergency_reason: None,
            performed_by: input.performed_by,
            performed_at: input.performed_at,
        };
        state.freeze_logs.push(log.clone());
        let notifications = state.insert_notifications(notify(&goals));
        self.publish(&notifications);
        Ok(Committed {
            value: FreezeBatch { log, goals },
            notifications,
        })
    }

    async fn unfreeze_quarter(
        &self,
        input: &CreateUnfreeze,
        notify: Notify<'_, Vec<Goal>>,
    ) -> StoreResult<Committed<FreezeBatch>> {
        let mut state = self.state.lock().await;
        let mut goals = Vec::new();
        for id in state.quarter_goals(input.quarter, input.year, true) {
            if let Some(goal) = state.goals.get_mut(&id) {
                goal.frozen = false;
                goal.frozen_at = None;
                goal.frozen_by = None;
                goal.updated_at = input.performed_at;
                goal.version += 1;
                goals.push(goal.clone());
            }
        }
        for log in state.freeze_logs.iter_mut().filter(|l| {
            l.action == FreezeAction::Freeze
                && l.quarter == input.quarter
                && l.year == input.year
                && l.scheduled_unfreeze_date.is_some()
                && l.scheduled_unfreeze_executed_at.is_none()
        }) {
            log.scheduled_unfreeze_executed_at = Some(input.performed_at);
        }
        let log = GoalFreezeLog {
            id: state.next_id(),
            action: FreezeAction::Unfreeze,
            quarter: input.quarter,
            year: input.year,
            affected_goals_count: goals.len() as i64,
            scheduled_unfreeze_date: None,
            scheduled_unfreeze_executed_at: None,
            is_emergency_override: input.is_emergency_override,
            emergency_reason: input.emergency_reason.clone(),
            performed_by: input.performed_by,
            performed_at: input.performed_at,
        };
        state.freeze_logs.push(log.clone());
        let notifications = state.insert_notifications(notify(&goals));
        self.publish(&notifications);
        Ok(Committed {
            value: FreezeBatch { log, goals },
            notifications,
        })
    }

    async fn freeze_logs(
        &self,
        quarter: Option<Quarter>,
        year: Option<i32>,
    ) -> StoreResult<Vec<GoalFreezeLog>> {
        let state = self.state.lock().await;
        Ok(state
            .freeze_logs
            .iter()
            .rev()
            .filter(|l| {
                quarter.map_or(true, |q| l.quarter == q) && year.map_or(true, |y| l.year == y)
            })
            .cloned()
            .collect())
    }

    async fn due_scheduled_unfreezes(&self, now: Timestamp) -> StoreResult<Vec<GoalFreezeLog>> {
        let state = self.state.lock().await;
        let mut due: Vec<GoalFreezeLog> = state
            .freeze_logs
            .iter()
            .filter(|l| {
                l.action == FreezeAction::Freeze
                    && l.scheduled_unfreeze_executed_at.is_none()
                    && l.scheduled_unfreeze_date.is_some_and(|d| d <= now)
            })
            .cloned()
            .collect();
        due.sort_by_key(|l| l.scheduled_unfreeze_date);
        Ok(due)
    }

    // -- Notifications ------------------------------------------------------

    async fn list_notifications(
        &self,
        recipient_id: DbId,
        filter: NotificationFilter,
        now: Timestamp,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Notification>> {
        let state = self.state.lock().await;
        let mut rows: Vec<&Notification> = state
            .notifications
            .values()
            .filter(|n| unexpired(n, recipient_id, now) && filter.matches(n))
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(0))
            .take(usize::try_from(limit).unwrap_or(0))
            .cloned()
            .collect())
    }

    async fn unread_count(&self, recipient_id: DbId, now: Timestamp) -> StoreResult<i64> {
        let state = self.state.lock().await;
        Ok(state
            .notifications
            .values()
            .filter(|n| unexpired(n, recipient_id, now) && !n.is_read)
            .count() as i64)
    }

    async fn notification_stats(&self, recipient_id: DbId, now: Timestamp) -> StoreResult<NotificationStats> {
        let state = self.state.lock().await;
        let mut stats = NotificationStats::default();
        for n in state.notifications.values().filter(|n| unexpired(n, recipient_id, now)) {
            stats.total_count += 1;
            if !n.is_read {
                stats.unread_count += 1;
            }
            *stats.by_type.entry(n.kind.as_str().to_string()).or_default() += 1;
            *stats.by_priority.entry(n.priority.as_str().to_string()).or_default() += 1;
        }
        Ok(stats)
    }

    async fn mark_notification_read(
        &self,
        id: DbId,
        recipient_id: DbId,
        at: Timestamp,
    ) -> StoreResult<Option<Notification>> {
        let mut state = self.state.lock().await;
        Ok(state
            .notifications
            .get_mut(&id)
            .filter(|n| n.recipient_id == recipient_id)
            .map(|n| {
                if !n.is_read {
                    n.is_read = true;
                    n.read_at = Some(at);
                }
                n.clone()
            }))
    }

    async fn mark_all_notifications_read(&self, recipient_id: DbId, at: Timestamp) -> StoreResult<u64> {
        let mut state = self.state.lock().await;
        let mut changed = 0;
        for n in state
            .notifications
            .values_mut()
            .filter(|n| unexpired(n, recipient_id, at) && !n.is_read)
        {
            n.is_read = true;
            n.read_at = Some(at);
            changed += 1;
        }
        Ok(changed)
    }

    async fn delete_notification(&self, id: DbId, recipient_id: DbId) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        if state.notifications.get(&id).is_some_and(|n| n.recipient_id == recipient_id) {
            state.notifications.remove(&id);
            return Ok(true);
        }
        Ok(false)
    }

    // -- Event log ----------------------------------------------------------

    async fn record_event(&self, input: &CreateEventRecord) -> StoreResult<DbId> {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        state.events.push(DomainEventRecord {
            id,
            event_type: input.event_type.clone(),
            entity_type: input.entity_type.clone(),
            entity_id: input.entity_id,
            actor_id: input.actor_id,
            payload: input.payload.clone(),
            created_at: input.created_at,
        });
        Ok(id)
    }

    async fn events_for_entity(
        &self,
        entity_type: &str,
        entity_id: DbId,
    ) -> StoreResult<Vec<DomainEventRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .events
            .iter()
            .filter(|e| e.entity_type == entity_type && e.entity_id == Some(entity_id))
            .cloned()
            .collect())
    }
}
