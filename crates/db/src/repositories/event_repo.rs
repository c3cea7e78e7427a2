//! Repository for the `domain_events` table.

use sqlx::PgPool;
use stride_core::types::DbId;

use crate::models::event::{CreateEventRecord, DomainEventRecord};

const COLUMNS: &str = "id, event_type, entity_type, entity_id, actor_id, payload, created_at";

pub struct EventRepo;

impl EventRepo {
    /// Insert a new event row, returning the generated ID.
    pub async fn insert(pool: &PgPool, input: &CreateEventRecord) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO domain_events \
                (event_type, entity_type, entity_id, actor_id, payload, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id",
        )
        .bind(&input.event_type)
        .bind(&input.entity_type)
        .bind(input.entity_id)
        .bind(input.actor_id)
        .bind(&input.payload)
        .bind(input.created_at)
        .fetch_one(pool)
        .await
    }

    /// Events recorded for one entity, oldest first.
    pub async fn list_for_entity(
        pool: &PgPool,
        entity_type: &str,
        entity_id: DbId,
    ) -> Result<Vec<DomainEventRecord>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM domain_events \
             WHERE entity_type = $1 AND entity_id = $2 \
             ORDER BY id"
        );
        sqlx::query_as::<_, DomainEventRecord>(&query)
            .bind(entity_type)
            .bind(entity_id)
            .fetch_all(pool)
            .await
    }
}
