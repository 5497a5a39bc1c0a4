use workbench_core::error::CoreError;

/// Error type for persistence commands.
///
/// Wraps [`CoreError`] for engine rejections and domain errors, and adds the
/// database-level variants. Returning any `Err` before `commit` drops the
/// open transaction, which rolls it back.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A domain-level error from `workbench_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A database error from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A migration failed to apply.
    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Convenience alias for command return values.
pub type DbResult<T> = Result<T, DbError>;

impl DbError {
    /// The domain error, if this is one.
    pub fn as_core(&self) -> Option<&CoreError> {
        match self {
            DbError::Core(core) => Some(core),
            _ => None,
        }
    }

    /// `true` for rejections the caller may retry (lock conflicts).
    pub fn is_retryable(&self) -> bool {
        self.as_core().is_some_and(CoreError::is_retryable)
    }

    pub(crate) fn not_found(entity: &'static str, id: i64) -> Self {
        DbError::Core(CoreError::NotFound { entity, id })
    }
}
