//! Error types for the PostgreSQL backend.

use mentors_storage::StorageError;
use sqlx_core::error::Error as SqlxError;

/// Errors specific to the PostgreSQL backend.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// Database driver or connection error.
    #[error("Database error: {0}")]
    Database(#[from] SqlxError),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A row could not be mapped to a catalog record.
    #[error("Row mapping error: {message}")]
    Mapping { message: String },
}

impl PostgresError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a new mapping error.
    #[must_use]
    pub fn mapping(message: impl Into<String>) -> Self {
        Self::Mapping {
            message: message.into(),
        }
    }
}

impl From<PostgresError> for StorageError {
    fn from(err: PostgresError) -> Self {
        match err {
            PostgresError::Database(e) => match e {
                SqlxError::RowNotFound => StorageError::not_found("row", "query"),
                SqlxError::Io(_)
                | SqlxError::Tls(_)
                | SqlxError::PoolTimedOut
                | SqlxError::PoolClosed
                | SqlxError::WorkerCrashed => StorageError::connection(e.to_string()),
                other => StorageError::internal(other.to_string()),
            },
            PostgresError::Config { message } => {
                StorageError::internal(format!("Configuration error: {message}"))
            }
            PostgresError::Mapping { message } => StorageError::invalid_record(message),
        }
    }
}

/// Result type alias for PostgreSQL operations.
pub type Result<T> = std::result::Result<T, PostgresError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PostgresError::config("invalid URL");
        assert!(err.to_string().contains("Configuration error"));

        let err = PostgresError::mapping("status 'x'");
        assert!(err.to_string().contains("Row mapping error"));
    }

    #[test]
    fn test_conversion_to_storage_error() {
        let storage: StorageError = PostgresError::Database(SqlxError::PoolTimedOut).into();
        assert!(matches!(storage, StorageError::Connection { .. }));

        let storage: StorageError = PostgresError::mapping("bad").into();
        assert!(matches!(storage, StorageError::InvalidRecord { .. }));

        let storage: StorageError = PostgresError::config("bad").into();
        assert!(matches!(storage, StorageError::Internal { .. }));
    }
}
