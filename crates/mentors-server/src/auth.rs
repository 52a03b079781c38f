//! Header-token access checks for self-service and operator endpoints.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use mentors_storage::MentorRecord;

use crate::error::ApiError;
use crate::middleware::constant_time_eq;
use crate::repository::FilterOptions;
use crate::server::AppState;

pub const MENTOR_ID_HEADER: &str = "x-mentor-id";
pub const MENTOR_TOKEN_HEADER: &str = "x-mentor-token";
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// The authenticated mentor, with secure fields intact.
#[derive(Debug, Clone)]
pub struct MentorIdentity(pub Arc<MentorRecord>);

impl FromRequestParts<AppState> for MentorIdentity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let legacy_id: i64 = header(parts, MENTOR_ID_HEADER)
            .ok_or_else(|| ApiError::unauthorized("missing X-Mentor-Id header"))?
            .parse()
            .map_err(|_| ApiError::unauthorized("X-Mentor-Id must be numeric"))?;
        let token = header(parts, MENTOR_TOKEN_HEADER)
            .ok_or_else(|| ApiError::unauthorized("missing X-Mentor-Token header"))?;

        let record = match state
            .repository
            .get_by_legacy_id(legacy_id, FilterOptions::PRIVILEGED)
            .await
        {
            Ok(record) => record,
            Err(e) if e.is_not_found() => return Err(ApiError::unauthorized("unknown mentor")),
            Err(e) => return Err(e.into()),
        };

        match record.auth_token.as_deref() {
            Some(expected) if constant_time_eq(expected.as_bytes(), token.as_bytes()) => {
                Ok(Self(record))
            }
            _ => {
                tracing::debug!(legacy_id, "mentor token rejected");
                Err(ApiError::forbidden("invalid mentor token"))
            }
        }
    }
}

/// Marker for requests carrying the operator token.
#[derive(Debug, Clone, Copy)]
pub struct AdminAccess;

impl FromRequestParts<AppState> for AdminAccess {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.admin_token.as_deref() else {
            return Err(ApiError::forbidden("admin access is not configured"));
        };
        let token = header(parts, ADMIN_TOKEN_HEADER)
            .ok_or_else(|| ApiError::unauthorized("missing X-Admin-Token header"))?;
        if constant_time_eq(expected.as_bytes(), token.as_bytes()) {
            Ok(Self)
        } else {
            Err(ApiError::forbidden("invalid admin token"))
        }
    }
}
