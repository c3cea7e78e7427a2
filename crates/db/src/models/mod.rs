//! Row structs and insert DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` struct matching the database row, with TEXT enum columns
//!   kept as `String` and converted into the `stride_core` type via `TryFrom`
//! - `Create*` DTOs carrying already-validated input for inserts

use std::str::FromStr;

use stride_core::error::CoreError;

use crate::store::StoreError;

pub mod event;
pub mod goal;
pub mod initiative;
pub mod notification;
pub mod user;

/// Parse a TEXT column into its enum, reporting the column on failure.
pub(crate) fn parse_column<T>(column: &'static str, value: &str) -> Result<T, StoreError>
where
    T: FromStr<Err = CoreError>,
{
    value
        .parse()
        .map_err(|e: CoreError| StoreError::Corrupt(format!("{column}: {e}")))
}
