use thiserror::Error;

use super::value::MappingError;

/// Errors surfaced by the persistent store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("schema migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("invalid SQL identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("row mapping failed: {0}")]
    Mapping(#[from] MappingError),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to prepare database location: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// True for failures worth retrying as-is (lock contention, pool exhaustion).
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Database(sqlx::Error::PoolTimedOut) => true,
            StoreError::Database(sqlx::Error::Database(db)) => {
                // SQLITE_BUSY (5) and SQLITE_LOCKED (6), including extended codes.
                db.code()
                    .and_then(|code| code.parse::<i64>().ok())
                    .map(|code| matches!(code & 0xff, 5 | 6))
                    .unwrap_or(false)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_is_transient() {
        assert!(StoreError::Database(sqlx::Error::PoolTimedOut).is_transient());
    }

    #[test]
    fn test_identifier_error_is_not_transient() {
        let err = StoreError::InvalidIdentifier("drop table".into());
        assert!(!err.is_transient());
        assert_eq!(err.to_string(), "invalid SQL identifier 'drop table'");
    }
}
