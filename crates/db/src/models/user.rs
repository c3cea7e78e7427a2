//! User directory mirror.

use sqlx::FromRow;
use stride_core::capabilities::UserProfile;
use stride_core::types::DbId;

use super::parse_column;
use crate::store::StoreError;

/// A row from the `users` table.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: DbId,
    pub name: String,
    pub supervisor_id: Option<DbId>,
    pub department_id: Option<DbId>,
    pub role_class: String,
    pub permissions: Vec<String>,
    pub is_active: bool,
}

impl TryFrom<UserRow> for UserProfile {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(UserProfile {
            id: row.id,
            name: row.name,
            supervisor_id: row.supervisor_id,
            department_id: row.department_id,
            role_class: parse_column("role_class", &row.role_class)?,
            permissions: row.permissions,
            is_active: row.is_active,
        })
    }
}
