use crate::entity::EntityRef;
use crate::types::{ActorId, DbId, Timestamp};

/// Domain errors produced by the decision engine and its policy layers.
///
/// Every failing clause maps to exactly one variant; the engine never
/// answers with a bare `false`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Validation failed on '{field}': {message}")]
    Validation { field: &'static str, message: String },

    #[error("{entity} is locked by actor {holder_id} until {expires_at}")]
    LockConflict {
        entity: EntityRef,
        holder_id: ActorId,
        expires_at: Timestamp,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Shorthand for a field-attributed [`CoreError::Validation`].
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        CoreError::Validation {
            field,
            message: message.into(),
        }
    }

    /// Shorthand for [`CoreError::PermissionDenied`].
    pub fn denied(message: impl Into<String>) -> Self {
        CoreError::PermissionDenied(message.into())
    }

    /// Only lock conflicts can succeed on retry (after release or expiry).
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::LockConflict { .. })
    }
}
