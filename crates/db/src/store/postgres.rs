//! [`WorkflowStore`] over Postgres. Each mutating call is one transaction.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use stride_core::capabilities::UserProfile;
use stride_core::goal::{FreezeAction, Goal, GoalFreezeLog, GoalProgressReport, Quarter};
use stride_core::initiative::{Initiative, InitiativeExtension};
use stride_core::notification::{NewNotification, Notification};
use stride_core::types::{DbId, Timestamp};

use super::{
    Committed, CommitFeed, NotificationFilter, NotificationStats, Notify, StoreError, StoreResult,
    WorkflowStore,
};
use crate::models::event::{CreateEventRecord, DomainEventRecord};
use crate::models::goal::{CreateFreeze, CreateGoal, CreateProgressReport, CreateUnfreeze, FreezeBatch};
use crate::models::initiative::{CreateExtension, CreateInitiative};
use crate::repositories::freeze_log_repo::FreezeLogEntry;
use crate::repositories::{
    EventRepo, ExtensionRepo, FreezeLogRepo, GoalRepo, InitiativeRepo, NotificationRepo,
    ProgressReportRepo, UserRepo,
};

/// Postgres-backed store.
///
/// Transactions that write notifications take `sequence` before inserting
/// them and hold it through commit and the feed hand-off, so the feed order
/// matches id order for every writer sharing this store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    sequence: Arc<tokio::sync::Mutex<()>>,
    feed: Arc<OnceLock<CommitFeed>>,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            sequence: Arc::default(),
            feed: Arc::default(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn insert_notifications(
        conn: &mut PgConnection,
        drafts: &[NewNotification],
    ) -> StoreResult<Vec<Notification>> {
        let mut out = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let row = NotificationRepo::create(&mut *conn, draft).await?;
            out.push(row.try_into()?);
        }
        Ok(out)
    }

    /// Insert `drafts`, commit, and hand the rows to the feed.
    async fn commit_with(
        &self,
        mut tx: Transaction<'_, Postgres>,
        drafts: &[NewNotification],
    ) -> StoreResult<Vec<Notification>> {
        if drafts.is_empty() {
            tx.commit().await?;
            return Ok(Vec::new());
        }
        let _turn = self.sequence.lock().await;
        let notifications = Self::insert_notifications(&mut *tx, drafts).await?;
        tx.commit().await?;
        if let Some(feed) = self.feed.get() {
            feed.publish(&notifications);
        }
        Ok(notifications)
    }

    /// Explain why a conditional initiative write matched nothing.
    async fn initiative_write_failed(&self, id: DbId) -> StoreError {
        match InitiativeRepo::find_by_id(&self.pool, id).await {
            Ok(Some(_)) => StoreError::Conflict(format!(
                "Initiative {id} was modified concurrently; re-fetch and retry"
            )),
            Ok(None) => StoreError::NotFound {
                entity: "Initiative",
                id,
            },
            Err(e) => e.into(),
        }
    }

    async fn goal_write_failed(&self, id: DbId) -> StoreError {
        match GoalRepo::find_by_id(&self.pool, id).await {
            Ok(Some(row)) if row.frozen => StoreError::Conflict(format!("Goal {id} is frozen")),
            Ok(Some(_)) => StoreError::Conflict(format!(
                "Goal {id} was modified concurrently; re-fetch and retry"
            )),
            Ok(None) => StoreError::NotFound { entity: "Goal", id },
            Err(e) => e.into(),
        }
    }
}

/// Map a `uq_` unique violation onto a conflict, passing other errors through.
fn unique_as_conflict(err: sqlx::Error, message: &str) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505")
            && db_err.constraint().is_some_and(|c| c.starts_with("uq_"))
        {
            return StoreError::Conflict(message.to_string());
        }
    }
    err.into()
}

fn rows_into<R, T>(rows: Vec<R>) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[async_trait]
impl WorkflowStore for PgStore {
    async fn health_check(&self) -> StoreResult<()> {
        crate::health_check(&self.pool).await?;
        Ok(())
    }

    fn attach_feed(&self, feed: CommitFeed) {
        if self.feed.set(feed).is_err() {
            tracing::warn!("Commit feed already attached; keeping the first");
        }
    }

    // -- Users --------------------------------------------------------------

    async fn find_user(&self, id: DbId) -> StoreResult<Option<UserProfile>> {
        UserRepo::find_by_id(&self.pool, id)
            .await?
            .map(UserProfile::try_from)
            .transpose()
    }

    async fn direct_reports(&self, supervisor_id: DbId) -> StoreResult<Vec<DbId>> {
        Ok(UserRepo::direct_report_ids(&self.pool, supervisor_id).await?)
    }

    async fn upsert_user(&self, profile: &UserProfile) -> StoreResult<()> {
        Ok(UserRepo::upsert(&self.pool, profile).await?)
    }

    // -- Initiatives --------------------------------------------------------

    async fn find_initiative(&self, id: DbId) -> StoreResult<Option<Initiative>> {
        InitiativeRepo::find_by_id(&self.pool, id)
            .await?
            .map(Initiative::try_from)
            .transpose()
    }

    async fn create_initiative(
        &self,
        input: &CreateInitiative,
        notify: Notify<'_, Initiative>,
    ) -> StoreResult<Committed<Initiative>> {
        let mut tx = self.pool.begin().await?;
        let initiative = Initiative::try_from(InitiativeRepo::create(&mut *tx, input).await?)?;
        let notifications = self.commit_with(tx, &notify(&initiative)).await?;
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
        let mut tx = self.pool.begin().await?;
        let Some(row) = InitiativeRepo::update_versioned(&mut *tx, initiative).await? else {
            drop(tx);
            return Err(self.initiative_write_failed(initiative.id).await);
        };
        let value = Initiative::try_from(row)?;
        let notifications = self.commit_with(tx, &notifications).await?;
        Ok(Committed {
            value,
            notifications,
        })
    }

    async fn overdue_unnotified(&self, now: Timestamp, limit: i64) -> StoreResult<Vec<Initiative>> {
        rows_into(InitiativeRepo::list_overdue_unnotified(&self.pool, now, limit).await?)
    }

    async fn find_extension(&self, id: DbId) -> StoreResult<Option<InitiativeExtension>> {
        ExtensionRepo::find_by_id(&self.pool, id)
            .await?
            .map(InitiativeExtension::try_from)
            .transpose()
    }

    async fn pending_extension(&self, initiative_id: DbId) -> StoreResult<Option<InitiativeExtension>> {
        ExtensionRepo::find_pending(&self.pool, initiative_id)
            .await?
            .map(InitiativeExtension::try_from)
            .transpose()
    }

    async fn create_extension(
        &self,
        input: &CreateExtension,
        notify: Notify<'_, InitiativeExtension>,
    ) -> StoreResult<Committed<InitiativeExtension>> {
        let mut tx = self.pool.begin().await?;
        let row = ExtensionRepo::create(&mut *tx, input).await.map_err(|e| {
            unique_as_conflict(e, "An extension request is already pending for this initiative")
        })?;
        let extension = InitiativeExtension::try_from(row)?;
        let notifications = self.commit_with(tx, &notify(&extension)).await?;
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
        let mut tx = self.pool.begin().await?;
        let Some(row) = ExtensionRepo::close_pending(&mut *tx, extension).await? else {
            return Err(StoreError::Conflict(format!(
                "Extension request {} was already decided",
                extension.id
            )));
        };
        if let Some(initiative) = initiative {
            if InitiativeRepo::update_versioned(&mut *tx, initiative).await?.is_none() {
                drop(tx);
                return Err(self.initiative_write_failed(initiative.id).await);
            }
        }
        let value = InitiativeExtension::try_from(row)?;
        let notifications = self.commit_with(tx, &notifications).await?;
        Ok(Committed {
            value,
            notifications,
        })
    }

    // -- Goals --------------------------------------------------------------

    async fn find_goal(&self, id: DbId) -> StoreResult<Option<Goal>> {
        GoalRepo::find_by_id(&self.pool, id)
            .await?
            .map(Goal::try_from)
            .transpose()
    }

    async fn child_goals(&self, parent_id: DbId) -> StoreResult<Vec<Goal>> {
        rows_into(GoalRepo::list_children(&self.pool, parent_id).await?)
    }

    async fn create_goal(&self, input: &CreateGoal, notify: Notify<'_, Goal>) -> StoreResult<Committed<Goal>> {
        let mut tx = self.pool.begin().await?;
        let goal = Goal::try_from(GoalRepo::create(&mut *tx, input).await?)?;
        let notifications = self.commit_with(tx, &notify(&goal)).await?;
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
        let mut tx = self.pool.begin().await?;
        let Some(row) = GoalRepo::update_versioned(&mut *tx, goal).await? else {
            drop(tx);
            return Err(self.goal_write_failed(goal.id).await);
        };
        let value = Goal::try_from(row)?;
        let notifications = self.commit_with(tx, &notifications).await?;
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
        let mut tx = self.pool.begin().await?;
        let Some(row) = GoalRepo::update_versioned(&mut *tx, goal).await? else {
            drop(tx);
            return Err(self.goal_write_failed(goal.id).await);
        };
        let report = ProgressReportRepo::create(&mut *tx, report).await?;
        tx.commit().await?;
        Ok((Goal::try_from(row)?, report.into()))
    }

    async fn progress_reports(&self, goal_id: DbId) -> StoreResult<Vec<GoalProgressReport>> {
        let rows = ProgressReportRepo::list_for_goal(&self.pool, goal_id).await?;
        Ok(rows.into_iter().map(GoalProgressReport::from).collect())
    }

    // -- Freeze -------------------------------------------------------------

    async fn freeze_quarter(
        &self,
        input: &CreateFreeze,
        notify: Notify<'_, Vec<Goal>>,
    ) -> StoreResult<Committed<FreezeBatch>> {
        let mut tx = self.pool.begin().await?;
        let rows = GoalRepo::freeze_quarter(
            &mut *tx,
            input.quarter,
            input.year,
            input.performed_by,
            input.performed_at,
        )
        .await?;
        let goals: Vec<Goal> = rows_into(rows)?;
        let log = FreezeLogRepo::create(
            &mut *tx,
            &FreezeLogEntry {
                action: FreezeAction::Freeze,
                quarter: input.quarter,
                year: input.year,
                affected_goals_count: goals.len() as i64,
                scheduled_unfreeze_date: input.scheduled_unfreeze_date,
                is_emergency_override: false,
                emergency_reason: None,
                performed_by: input.performed_by,
                performed_at: input.performed_at,
            },
        )
        .await?;
        let notifications = self.commit_with(tx, &notify(&goals)).await?;
        Ok(Committed {
            value: FreezeBatch {
                log: log.try_into()?,
                goals,
            },
            notifications,
        })
    }

    async fn unfreeze_quarter(
        &self,
        input: &CreateUnfreeze,
        notify: Notify<'_, Vec<Goal>>,
    ) -> StoreResult<Committed<FreezeBatch>> {
        let mut tx = self.pool.begin().await?;
        let rows =
            GoalRepo::unfreeze_quarter(&mut *tx, input.quarter, input.year, input.performed_at)
                .await?;
        let goals: Vec<Goal> = rows_into(rows)?;
        let log = FreezeLogRepo::create(
            &mut *tx,
            &FreezeLogEntry {
                action: FreezeAction::Unfreeze,
                quarter: input.quarter,
                year: input.year,
                affected_goals_count: goals.len() as i64,
                scheduled_unfreeze_date: None,
                is_emergency_override: input.is_emergency_override,
                emergency_reason: input.emergency_reason.as_deref(),
                performed_by: input.performed_by,
                performed_at: input.performed_at,
            },
        )
        .await?;
        FreezeLogRepo::close_schedules(&mut *tx, input.quarter, input.year, input.performed_at)
            .await?;
        let notifications = self.commit_with(tx, &notify(&goals)).await?;
        Ok(Committed {
            value: FreezeBatch {
                log: log.try_into()?,
                goals,
            },
            notifications,
        })
    }

    async fn freeze_logs(
        &self,
        quarter: Option<Quarter>,
        year: Option<i32>,
    ) -> StoreResult<Vec<GoalFreezeLog>> {
        rows_into(FreezeLogRepo::list_filtered(&self.pool, quarter, year).await?)
    }

    async fn due_scheduled_unfreezes(&self, now: Timestamp) -> StoreResult<Vec<GoalFreezeLog>> {
        rows_into(FreezeLogRepo::list_due_scheduled(&self.pool, now).await?)
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
        rows_into(
            NotificationRepo::list_for_user(&self.pool, recipient_id, &filter, now, limit, offset)
                .await?,
        )
    }

    async fn unread_count(&self, recipient_id: DbId, now: Timestamp) -> StoreResult<i64> {
        Ok(NotificationRepo::unread_count(&self.pool, recipient_id, now).await?)
    }

    async fn notification_stats(&self, recipient_id: DbId, now: Timestamp) -> StoreResult<NotificationStats> {
        let mut stats = NotificationStats::default();
        for row in NotificationRepo::stats_for_user(&self.pool, recipient_id, now).await? {
            stats.total_count += row.total;
            stats.unread_count += row.unread;
            *stats.by_type.entry(row.kind).or_default() += row.total;
            *stats.by_priority.entry(row.priority).or_default() += row.total;
        }
        Ok(stats)
    }

    async fn mark_notification_read(
        &self,
        id: DbId,
        recipient_id: DbId,
        at: Timestamp,
    ) -> StoreResult<Option<Notification>> {
        NotificationRepo::mark_read(&self.pool, id, recipient_id, at)
            .await?
            .map(Notification::try_from)
            .transpose()
    }

    async fn mark_all_notifications_read(&self, recipient_id: DbId, at: Timestamp) -> StoreResult<u64> {
        Ok(NotificationRepo::mark_all_read(&self.pool, recipient_id, at).await?)
    }

    async fn delete_notification(&self, id: DbId, recipient_id: DbId) -> StoreResult<bool> {
        Ok(NotificationRepo::delete(&self.pool, id, recipient_id).await?)
    }

    // -- Event log ----------------------------------------------------------

    async fn record_event(&self, input: &CreateEventRecord) -> StoreResult<DbId> {
        Ok(EventRepo::insert(&self.pool, input).await?)
    }

    async fn events_for_entity(
        &self,
        entity_type: &str,
        entity_id: DbId,
    ) -> StoreResult<Vec<DomainEventRecord>> {
        Ok(EventRepo::list_for_entity(&self.pool, entity_type, entity_id).await?)
    }
}
