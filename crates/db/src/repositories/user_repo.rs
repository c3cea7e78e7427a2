//! Repository for the `users` table.

use sqlx::PgPool;
use stride_core::capabilities::UserProfile;
use stride_core::types::DbId;

use crate::models::user::UserRow;

/// Column list for `users` queries.
const COLUMNS: &str = "id, name, supervisor_id, department_id, role_class, permissions, is_active";

pub struct UserRepo;

impl UserRepo {
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<UserRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, UserRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Ids of active users whose supervisor is `supervisor_id`.
    pub async fn direct_report_ids(
        pool: &PgPool,
        supervisor_id: DbId,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT id FROM users WHERE supervisor_id = $1 AND is_active = true ORDER BY id",
        )
        .bind(supervisor_id)
        .fetch_all(pool)
        .await
    }

    /// Insert or refresh a user from the directory.
    pub async fn upsert(pool: &PgPool, profile: &UserProfile) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO users \
                (id, name, supervisor_id, department_id, role_class, permissions, is_active) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (id) DO UPDATE SET \
                name = EXCLUDED.name, \
                supervisor_id = EXCLUDED.supervisor_id, \
                department_id = EXCLUDED.department_id, \
                role_class = EXCLUDED.role_class, \
                permissions = EXCLUDED.permissions, \
                is_active = EXCLUDED.is_active, \
                updated_at = NOW()",
        )
        .bind(profile.id)
        .bind(&profile.name)
        .bind(profile.supervisor_id)
        .bind(profile.department_id)
        .bind(profile.role_class.as_str())
        .bind(&profile.permissions)
        .bind(profile.is_active)
        .execute(pool)
        .await?;
        Ok(())
    }
}
