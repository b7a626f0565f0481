use wms_schemas::WmsError;

/// Attach a description of the failed query to a storage error, the way
/// `anyhow::Context` does, while staying inside [`WmsError`].
pub trait StorageContext<T> {
    fn ctx(self, what: &str) -> Result<T, WmsError>;
}

impl<T> StorageContext<T> for Result<T, sqlx::Error> {
    fn ctx(self, what: &str) -> Result<T, WmsError> {
        self.map_err(|e| WmsError::Storage(format!("{what}: {e}")))
    }
}

/// Detect a Postgres unique violation (23505) on a named constraint.
pub(crate) fn is_unique_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.code().as_deref() == Some("23505") && db_err.constraint() == Some(constraint)
        }
        _ => false,
    }
}
