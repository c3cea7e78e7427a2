//! Durable log of published domain events.

use serde::Serialize;
use sqlx::FromRow;
use stride_core::types::{DbId, Timestamp};

/// A row from the `domain_events` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DomainEventRecord {
    pub id: DbId,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: Option<DbId>,
    pub actor_id: Option<DbId>,
    pub payload: serde_json::Value,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone)]
pub struct CreateEventRecord {
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: Option<DbId>,
    pub actor_id: Option<DbId>,
    pub payload: serde_json::Value,
    pub created_at: Timestamp,
}
