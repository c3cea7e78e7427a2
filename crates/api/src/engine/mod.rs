//! The workflow engine: initiative and goal state machines.
//!
//! Every operation follows the same shape:
//!
//! 1. load the entity (with the `version` it was read at),
//! 2. check the actor's authority, the status edge and the freeze flag,
//! 3. write the entity and its notifications in one unit of work,
//! 4. after commit, publish the [`DomainEvent`].
//!
//! Notifications reach live channels through the store's commit feed, which
//! the [`Dispatcher`](crate::notifications::Dispatcher) drains in persisted
//! order; the engine never pushes directly.
//!
//! Step 3 is conditional on the version, so of two racing writers exactly one
//! wins and the other receives [`CoreError::Conflict`].

mod cascade;
mod goals;
mod initiatives;

use std::sync::Arc;

use stride_core::capabilities::ActorContext;
use stride_core::error::CoreError;
use stride_core::events::DomainEvent;
use stride_core::goal::Goal;
use stride_core::initiative::Initiative;
use stride_core::notification::Notification;
use stride_core::types::DbId;
use stride_db::WorkflowStore;
use stride_events::{EventBus, NotificationService, WorkflowEvent};

use crate::config::WorkflowConfig;

pub use cascade::CascadeEvaluator;
pub use goals::FreezeOutcome;

/// Post-commit bus publication.
#[derive(Clone)]
pub struct Outbox {
    event_bus: Arc<EventBus>,
}

impl Outbox {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self { event_bus }
    }

    /// Publish `event`. `notifications` are the rows committed with it, which
    /// the commit feed has already queued for push.
    pub async fn emit(&self, event: DomainEvent, actor_id: Option<DbId>, notifications: &[Notification]) {
        let mut envelope = WorkflowEvent::new(event);
        if let Some(actor_id) = actor_id {
            envelope = envelope.with_actor(actor_id);
        }
        tracing::debug!(
            event_type = envelope.event_type(),
            notifications = notifications.len(),
            "Workflow event committed"
        );
        self.event_bus.publish(envelope);
    }
}

pub struct WorkflowEngine {
    store: Arc<dyn WorkflowStore>,
    notifications: NotificationService,
    outbox: Outbox,
    cascade: CascadeEvaluator,
    config: WorkflowConfig,
}

impl WorkflowEngine {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        outbox: Outbox,
        config: WorkflowConfig,
    ) -> Self {
        let notifications = NotificationService::new(config.notification_retention_days);
        let cascade = CascadeEvaluator::new(store.clone(), notifications.clone(), outbox.clone());
        Self {
            store,
            notifications,
            outbox,
            cascade,
            config,
        }
    }

    pub fn cascade(&self) -> &CascadeEvaluator {
        &self.cascade
    }

    /// Resolve the acting user's capabilities and direct reports.
    ///
    /// Unknown or deactivated users are treated as unauthenticated.
    pub async fn resolve_actor(&self, user_id: DbId) -> Result<ActorContext, CoreError> {
        let profile = self
            .store
            .find_user(user_id)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| CoreError::Unauthorized("Unknown or inactive user".into()))?;
        let reports = self.store.direct_reports(user_id).await?;
        Ok(ActorContext::resolve(&profile, reports))
    }

    async fn load_initiative(&self, id: DbId) -> Result<Initiative, CoreError> {
        self.store
            .find_initiative(id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "Initiative",
                id,
            })
    }

    async fn load_goal(&self, id: DbId) -> Result<Goal, CoreError> {
        self.store.find_goal(id).await?.ok_or(CoreError::NotFound {
            entity: "Goal",
            id,
        })
    }
}
