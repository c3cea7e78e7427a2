use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    /// The entity changed underneath the caller (concurrent writer, frozen,
    /// or no longer in the expected status). Clients should re-fetch.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Reject empty or whitespace-only text for a required field.
pub fn require_text(field: &str, value: Option<&str>) -> Result<String, CoreError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(CoreError::Validation(format!("{field} is required"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_text_trims_and_accepts() {
        assert_eq!(require_text("reason", Some("  late  ")).unwrap(), "late");
    }

    #[test]
    fn require_text_rejects_blank_and_missing() {
        assert!(matches!(
            require_text("reason", Some("   ")),
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            require_text("reason", None),
            Err(CoreError::Validation(_))
        ));
    }
}
