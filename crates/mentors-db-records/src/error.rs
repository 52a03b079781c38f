//! Error types for the record-store backend.

use mentors_storage::StorageError;

/// Errors specific to the record-store API client.
#[derive(Debug, thiserror::Error)]
pub enum RecordsError {
    /// Transport-level failure (DNS, TLS, timeout, connection reset).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("Record store returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The configured base URL could not be used to build a request URL.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// A response body did not have the expected shape.
    #[error("Decode error: {message}")]
    Decode { message: String },
}

impl RecordsError {
    /// Creates a new decode error.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Returns `true` for statuses worth treating as an outage.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Url(_) | Self::Decode { .. } => false,
        }
    }
}

impl From<RecordsError> for StorageError {
    fn from(err: RecordsError) -> Self {
        match &err {
            RecordsError::Http(_) => StorageError::connection(err.to_string()),
            RecordsError::Status { .. } if err.is_unavailable() => {
                StorageError::connection(err.to_string())
            }
            RecordsError::Status { .. } | RecordsError::Url(_) => {
                StorageError::internal(err.to_string())
            }
            RecordsError::Decode { message } => StorageError::invalid_record(message.clone()),
        }
    }
}

/// Result type alias for record-store operations.
pub type Result<T> = std::result::Result<T, RecordsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_map_to_connection() {
        let err = RecordsError::Status {
            status: 503,
            body: "maintenance".into(),
        };
        assert!(matches!(
            StorageError::from(err),
            StorageError::Connection { .. }
        ));

        let err = RecordsError::Status {
            status: 429,
            body: String::new(),
        };
        assert!(matches!(
            StorageError::from(err),
            StorageError::Connection { .. }
        ));
    }

    #[test]
    fn client_errors_map_to_internal() {
        let err = RecordsError::Status {
            status: 422,
            body: "INVALID_FILTER_BY_FORMULA".into(),
        };
        let storage: StorageError = err.into();
        assert!(matches!(storage, StorageError::Internal { .. }));
        assert!(storage.to_string().contains("422"));
    }

    #[test]
    fn decode_errors_map_to_invalid_record() {
        let storage: StorageError = RecordsError::decode("missing Alias").into();
        assert!(matches!(storage, StorageError::InvalidRecord { .. }));
    }
}
