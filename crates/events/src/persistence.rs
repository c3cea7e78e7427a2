//! Durable event log service.
//!
//! [`EventPersistence`] subscribes to the [`EventBus`](crate::bus::EventBus)
//! and writes every received [`WorkflowEvent`] through the store's event log.
//! It runs as a long-lived background task and exits when the bus is dropped.

use std::sync::Arc;

use stride_core::types::DbId;
use stride_db::models::event::CreateEventRecord;
use stride_db::{StoreError, WorkflowStore};
use tokio::sync::broadcast;

use crate::bus::WorkflowEvent;

/// Background service that persists workflow events.
pub struct EventPersistence;

impl EventPersistence {
    /// Run the persistence loop until the channel closes.
    pub async fn run(store: Arc<dyn WorkflowStore>, mut receiver: broadcast::Receiver<WorkflowEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if let Err(e) = Self::persist(store.as_ref(), &event).await {
                        tracing::error!(
                            error = %e,
                            event_type = event.event_type(),
                            "Failed to persist event"
                        );
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(
                        skipped = n,
                        "Event persistence lagged, some events were not persisted"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, persistence shutting down");
                    break;
                }
            }
        }
    }

    /// Write a single event to the log.
    pub async fn persist(store: &dyn WorkflowStore, event: &WorkflowEvent) -> Result<DbId, StoreError> {
        let (entity_type, entity_id) = event.event.entity();
        let payload = serde_json::to_value(&event.event)
            .map_err(|e| StoreError::Corrupt(format!("event payload: {e}")))?;
        store
            .record_event(&CreateEventRecord {
                event_type: event.event_type().to_string(),
                entity_type: entity_type.to_string(),
                entity_id,
                actor_id: event.actor_user_id,
                payload,
                created_at: event.timestamp,
            })
            .await
    }
}
