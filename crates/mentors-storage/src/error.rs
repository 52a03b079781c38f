//! Storage error types for the backing store contract.

use std::fmt;

/// Errors that can occur while talking to a backing store.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    /// The requested record was not found.
    #[error("{kind} not found: {key}")]
    NotFound {
        /// What was looked up ("mentor", "tag", ...).
        kind: String,
        /// The key that was not found.
        key: String,
    },

    /// The store returned data that could not be mapped to a record.
    #[error("Invalid record: {message}")]
    InvalidRecord {
        /// Description of the mapping failure.
        message: String,
    },

    /// Failed to reach the backing store (network, pool, driver).
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// An internal storage error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl StorageError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(kind: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            key: key.into(),
        }
    }

    /// Creates a new `InvalidRecord` error.
    #[must_use]
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            message: message.into(),
        }
    }

    /// Creates a new `Connection` error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a not found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::InvalidRecord { .. } => ErrorCategory::Validation,
            Self::Connection { .. } => ErrorCategory::Infrastructure,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Categories of storage errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Record not found.
    NotFound,
    /// Malformed data from the store.
    Validation,
    /// Infrastructure/connection error.
    Infrastructure,
    /// Internal error.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Validation => write!(f, "validation"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::not_found("mentor", "jane-doe");
        assert_eq!(err.to_string(), "mentor not found: jane-doe");

        let err = StorageError::connection("timed out");
        assert_eq!(err.to_string(), "Connection error: timed out");
    }

    #[test]
    fn test_error_predicates() {
        assert!(StorageError::not_found("mentor", "x").is_not_found());
        assert!(!StorageError::internal("boom").is_not_found());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            StorageError::not_found("tag", "rust").category(),
            ErrorCategory::NotFound
        );
        assert_eq!(
            StorageError::connection("refused").category(),
            ErrorCategory::Infrastructure
        );
        assert_eq!(
            StorageError::invalid_record("missing slug").category(),
            ErrorCategory::Validation
        );
        assert_eq!(ErrorCategory::Infrastructure.to_string(), "infrastructure");
    }
}
