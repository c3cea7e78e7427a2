//! The persistence seam used by the workflow engine.
//!
//! Every method that mutates an entity also persists the notifications that
//! mutation produces, in the same unit of work, and hands both back as a
//! [`Committed`] value. Stores also hand persisted notifications to the
//! attached [`CommitFeed`] before the unit of work is released, so the feed
//! sees them in the order they were written.
//!
//! Writes to initiatives and goals are optimistic: the entity passed in
//! carries the `version` it was read at, and the write fails with
//! [`StoreError::Conflict`] if another writer bumped it in the meantime.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use stride_core::capabilities::UserProfile;
use stride_core::error::CoreError;
use stride_core::goal::{Goal, GoalFreezeLog, GoalProgressReport, Quarter};
use stride_core::initiative::{Initiative, InitiativeExtension};
use stride_core::notification::{NewNotification, Notification, NotificationKind, Priority};
use stride_core::types::{DbId, Timestamp};
use tokio::sync::mpsc;

use crate::models::event::{CreateEventRecord, DomainEventRecord};
use crate::models::goal::{CreateFreeze, CreateGoal, CreateProgressReport, CreateUnfreeze, FreezeBatch};
use crate::models::initiative::{CreateExtension, CreateInitiative};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: DbId },

    /// Optimistic-concurrency loss, a frozen goal, or a uniqueness clash.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored value could not be mapped back onto the domain type.
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => CoreError::NotFound { entity, id },
            StoreError::Conflict(msg) => CoreError::Conflict(msg),
            StoreError::Database(e) => CoreError::Internal(format!("database: {e}")),
            StoreError::Corrupt(msg) => CoreError::Internal(msg),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Builds the notifications for a freshly written value, inside the unit of
/// work that wrote it (used where the value's id is not known beforehand).
pub type Notify<'a, T> = &'a (dyn Fn(&T) -> Vec<NewNotification> + Send + Sync);

/// A committed write and the notifications persisted with it, in insertion
/// order.
#[derive(Debug, Clone)]
pub struct Committed<T> {
    pub value: T,
    pub notifications: Vec<Notification>,
}

/// Ordered hand-off of persisted notifications to the push side.
#[derive(Debug, Clone)]
pub struct CommitFeed {
    tx: mpsc::UnboundedSender<Notification>,
}

impl CommitFeed {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn publish(&self, notifications: &[Notification]) {
        for notification in notifications {
            if self.tx.send(notification.clone()).is_err() {
                tracing::warn!(
                    notification_id = notification.id,
                    "Commit feed receiver dropped; notification stays unpushed",
                );
                return;
            }
        }
    }
}

/// Narrowing applied to a recipient's inbox listing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotificationFilter {
    pub unread_only: bool,
    pub kind: Option<NotificationKind>,
    pub priority: Option<Priority>,
}

impl NotificationFilter {
    pub fn matches(&self, notification: &Notification) -> bool {
        (!self.unread_only || !notification.is_read)
            && self.kind.map_or(true, |k| k == notification.kind)
            && self.priority.map_or(true, |p| p == notification.priority)
    }
}

/// Counts over a recipient's unexpired notifications.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NotificationStats {
    pub total_count: i64,
    pub unread_count: i64,
    pub by_type: BTreeMap<String, i64>,
    pub by_priority: BTreeMap<String, i64>,
}

#[async_trait]
pub trait WorkflowStore: Send + Sync + 'static {
    async fn health_check(&self) -> StoreResult<()>;

    /// Route every notification persisted from now on into `feed`. Only the
    /// first attached feed is kept.
    fn attach_feed(&self, feed: CommitFeed);

    // -- Users --------------------------------------------------------------

    async fn find_user(&self, id: DbId) -> StoreResult<Option<UserProfile>>;

    /// Ids of active users reporting directly to `supervisor_id`.
    async fn direct_reports(&self, supervisor_id: DbId) -> StoreResult<Vec<DbId>>;

    async fn upsert_user(&self, profile: &UserProfile) -> StoreResult<()>;

    // -- Initiatives --------------------------------------------------------

    async fn find_initiative(&self, id: DbId) -> StoreResult<Option<Initiative>>;

    async fn create_initiative(
        &self,
        input: &CreateInitiative,
        notify: Notify<'_, Initiative>,
    ) -> StoreResult<Committed<Initiative>>;

    /// Conditional on `initiative.version` being current.
    async fn update_initiative(
        &self,
        initiative: &Initiative,
        notifications: Vec<NewNotification>,
    ) -> StoreResult<Committed<Initiative>>;

    /// Overdue initiatives not yet announced by the sweep.
    async fn overdue_unnotified(&self, now: Timestamp, limit: i64) -> StoreResult<Vec<Initiative>>;

    async fn find_extension(&self, id: DbId) -> StoreResult<Option<InitiativeExtension>>;

    async fn pending_extension(&self, initiative_id: DbId) -> StoreResult<Option<InitiativeExtension>>;

    /// Fails with a conflict if the initiative already has an open request.
    async fn create_extension(
        &self,
        input: &CreateExtension,
        notify: Notify<'_, InitiativeExtension>,
    ) -> StoreResult<Committed<InitiativeExtension>>;

    /// Close a pending request and, when approved, write the initiative's new
    /// due date in the same unit of work.
    async fn review_extension(
        &self,
        extension: &InitiativeExtension,
        initiative: Option<&Initiative>,
        notifications: Vec<NewNotification>,
    ) -> StoreResult<Committed<InitiativeExtension>>;

    // -- Goals --------------------------------------------------------------

    async fn find_goal(&self, id: DbId) -> StoreResult<Option<Goal>>;

    async fn child_goals(&self, parent_id: DbId) -> StoreResult<Vec<Goal>>;

    async fn create_goal(&self, input: &CreateGoal, notify: Notify<'_, Goal>) -> StoreResult<Committed<Goal>>;

    /// Conditional on `goal.version` being current and the goal unfrozen.
    async fn update_goal(
        &self,
        goal: &Goal,
        notifications: Vec<NewNotification>,
    ) -> StoreResult<Committed<Goal>>;

    /// Write the goal's new percentage and append the report.
    async fn record_progress(
        &self,
        goal: &Goal,
        report: &CreateProgressReport,
    ) -> StoreResult<(Goal, GoalProgressReport)>;

    async fn progress_reports(&self, goal_id: DbId) -> StoreResult<Vec<GoalProgressReport>>;

    // -- Freeze -------------------------------------------------------------

    /// Freeze every unfrozen individual goal of the quarter and write one
    /// audit row.
    async fn freeze_quarter(
        &self,
        input: &CreateFreeze,
        notify: Notify<'_, Vec<Goal>>,
    ) -> StoreResult<Committed<FreezeBatch>>;

    /// Unfreeze every frozen individual goal of the quarter, write one audit
    /// row and close outstanding schedules for that quarter.
    async fn unfreeze_quarter(
        &self,
        input: &CreateUnfreeze,
        notify: Notify<'_, Vec<Goal>>,
    ) -> StoreResult<Committed<FreezeBatch>>;

    async fn freeze_logs(
        &self,
        quarter: Option<Quarter>,
        year: Option<i32>,
    ) -> StoreResult<Vec<GoalFreezeLog>>;

    /// Freeze rows whose scheduled unfreeze is due and still outstanding.
    async fn due_scheduled_unfreezes(&self, now: Timestamp) -> StoreResult<Vec<GoalFreezeLog>>;

    // -- Notifications ------------------------------------------------------
    //
    // Reads and bulk updates skip notifications whose `expires_at` is not
    // after `now`.

    async fn list_notifications(
        &self,
        recipient_id: DbId,
        filter: NotificationFilter,
        now: Timestamp,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Notification>>;

    async fn unread_count(&self, recipient_id: DbId, now: Timestamp) -> StoreResult<i64>;

    async fn notification_stats(&self, recipient_id: DbId, now: Timestamp) -> StoreResult<NotificationStats>;

    /// `None` when the notification does not exist or belongs to someone else.
    async fn mark_notification_read(
        &self,
        id: DbId,
        recipient_id: DbId,
        at: Timestamp,
    ) -> StoreResult<Option<Notification>>;

    async fn mark_all_notifications_read(&self, recipient_id: DbId, at: Timestamp) -> StoreResult<u64>;

    /// `false` when the notification does not exist or belongs to someone else.
    async fn delete_notification(&self, id: DbId, recipient_id: DbId) -> StoreResult<bool>;

    // -- Event log ----------------------------------------------------------

    async fn record_event(&self, input: &CreateEventRecord) -> StoreResult<DbId>;

    async fn events_for_entity(
        &self,
        entity_type: &str,
        entity_id: DbId,
    ) -> StoreResult<Vec<DomainEventRecord>>;
}
