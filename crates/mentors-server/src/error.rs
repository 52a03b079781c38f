//! HTTP-facing error type.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use mentors_storage::StorageError;

use crate::cache::CacheError;
use crate::triggers::TriggerError;

/// Errors returned by request handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("backing store unavailable: {0}")]
    BackendUnavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::BackendUnavailable(_) => "backend_unavailable",
            Self::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self, status = status.as_u16(), "request failed");
        }
        let body = json!({
            "error": self.code(),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

impl From<CacheError> for ApiError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::NotFound { .. } => Self::NotFound(err.to_string()),
            CacheError::UnknownTag(_) => Self::BadRequest(err.to_string()),
            CacheError::BackendUnavailable(inner) => Self::BackendUnavailable(inner.to_string()),
            CacheError::InconsistentSnapshot(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { .. } => Self::NotFound(err.to_string()),
            StorageError::Connection { .. } => Self::BackendUnavailable(err.to_string()),
            StorageError::InvalidRecord { .. } | StorageError::Internal { .. } => {
                Self::Internal(err.to_string())
            }
        }
    }
}

impl From<TriggerError> for ApiError {
    fn from(err: TriggerError) -> Self {
        match err {
            TriggerError::Store(e) => e.into(),
            TriggerError::Cache(e) => e.into(),
            TriggerError::Invalid(msg) => Self::BadRequest(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_errors_map_to_statuses() {
        let cases = [
            (CacheError::not_found("mentor", "x"), StatusCode::NOT_FOUND),
            (CacheError::UnknownTag("Cobol".into()), StatusCode::BAD_REQUEST),
            (
                CacheError::BackendUnavailable(StorageError::connection("down")),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                CacheError::InconsistentSnapshot("bad".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn store_write_errors_map_to_statuses() {
        assert_eq!(
            ApiError::from(StorageError::not_found("mentor", "x")).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(StorageError::connection("refused")).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
