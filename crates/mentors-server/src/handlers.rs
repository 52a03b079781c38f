use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
};
use serde::Deserialize;
use serde_json::{Value, json};

use mentors_storage::MentorRecord;

use crate::auth::{AdminAccess, MentorIdentity};
use crate::error::ApiError;
use crate::repository::FilterOptions;
use crate::server::AppState;
use crate::triggers::{AdminUpdate, CacheOutcome, ModerationAction, ProfileUpdate};

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Default, Deserialize)]
pub struct ReadQuery {
    /// Reload the catalog from the store before answering.
    #[serde(default)]
    pub force_reset_cache: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordChanged {
    pub record_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PictureUpdate {
    pub image_url: String,
}

#[derive(Debug, Deserialize)]
pub struct ModerationRequest {
    pub action: ModerationAction,
}

pub async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn readyz(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ready",
        "cache": state.directory.state(),
        "bypass": state.repository.bypass(),
    }))
}

pub async fn list_mentors(
    State(state): State<AppState>,
    Query(q): Query<ReadQuery>,
) -> ApiResult<Vec<Arc<MentorRecord>>> {
    let mentors = state
        .repository
        .list(FilterOptions::PUBLIC_LIST, q.force_reset_cache)
        .await?;
    Ok(Json(mentors))
}

pub async fn get_mentor(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(q): Query<ReadQuery>,
) -> ApiResult<Arc<MentorRecord>> {
    let mentor = state
        .repository
        .get_by_slug(&slug, FilterOptions::PUBLIC_PROFILE, q.force_reset_cache)
        .await?;
    Ok(Json(mentor))
}

pub async fn get_mentor_by_legacy_id(
    State(state): State<AppState>,
    Path(legacy_id): Path<i64>,
) -> ApiResult<Arc<MentorRecord>> {
    let mentor = state
        .repository
        .get_by_legacy_id(legacy_id, FilterOptions::PUBLIC_PROFILE)
        .await?;
    Ok(Json(mentor))
}

pub async fn list_tags(State(state): State<AppState>) -> ApiResult<Vec<String>> {
    Ok(Json(state.tags.names().await?))
}

/// Change notification from the record store. Always answers 200 so the
/// sender does not retry; anything unresolvable invalidates the cache.
pub async fn record_changed(
    State(state): State<AppState>,
    body: Result<Json<RecordChanged>, JsonRejection>,
) -> Json<Value> {
    let outcome = match body {
        Ok(Json(RecordChanged { record_id })) if !record_id.trim().is_empty() => {
            state.triggers.record_changed(record_id.trim()).await
        }
        Ok(_) => {
            tracing::warn!("change notification without record id");
            state.directory.invalidate("change notification without record id");
            CacheOutcome::Invalidated
        }
        Err(rejection) => {
            tracing::warn!(error = %rejection, "malformed change notification");
            state.directory.invalidate("malformed change notification");
            CacheOutcome::Invalidated
        }
    };
    Json(json!({ "status": "ok", "result": outcome }))
}

pub async fn get_profile(MentorIdentity(mentor): MentorIdentity) -> Json<Arc<MentorRecord>> {
    Json(mentor)
}

pub async fn save_profile(
    State(state): State<AppState>,
    MentorIdentity(mentor): MentorIdentity,
    Json(update): Json<ProfileUpdate>,
) -> ApiResult<Arc<MentorRecord>> {
    Ok(Json(state.triggers.save_profile(&mentor, update).await?))
}

pub async fn update_picture(
    State(state): State<AppState>,
    MentorIdentity(mentor): MentorIdentity,
    Json(body): Json<PictureUpdate>,
) -> ApiResult<Arc<MentorRecord>> {
    Ok(Json(
        state
            .triggers
            .update_picture(&mentor, body.image_url.trim())
            .await?,
    ))
}

pub async fn admin_list_mentors(
    State(state): State<AppState>,
    _admin: AdminAccess,
    Query(q): Query<ReadQuery>,
) -> ApiResult<Vec<Arc<MentorRecord>>> {
    let mentors = state
        .repository
        .list(FilterOptions::PRIVILEGED, q.force_reset_cache)
        .await?;
    Ok(Json(mentors))
}

pub async fn moderate_mentor(
    State(state): State<AppState>,
    _admin: AdminAccess,
    Path(slug): Path<String>,
    Json(req): Json<ModerationRequest>,
) -> ApiResult<Value> {
    let outcome = state.triggers.moderate(&slug, req.action).await?;
    Ok(Json(json!({ "status": "ok", "result": outcome })))
}

pub async fn edit_mentor(
    State(state): State<AppState>,
    _admin: AdminAccess,
    Path(slug): Path<String>,
    Json(update): Json<AdminUpdate>,
) -> ApiResult<Value> {
    let outcome = state.triggers.admin_edit(&slug, update).await?;
    Ok(Json(json!({ "status": "ok", "result": outcome })))
}

pub async fn invalidate_cache(State(state): State<AppState>, _admin: AdminAccess) -> Json<Value> {
    state.triggers.invalidate_all();
    Json(json!({ "status": "invalidated" }))
}

pub async fn cache_stats(State(state): State<AppState>, _admin: AdminAccess) -> Json<Value> {
    Json(json!({
        "bypass": state.repository.bypass(),
        "directory": state.directory.stats(),
        "tags": state.tags.stats(),
    }))
}
