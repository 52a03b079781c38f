//! Write paths and the cache maintenance each one triggers.
//!
//! Every write goes to the backing store first. Only after it succeeds is the
//! directory cache patched, refreshed for one mentor, or invalidated. A
//! targeted cache update that fails degrades to a full invalidation so the
//! cache is never left silently stale.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use mentors_storage::{DynMentorStore, FieldChanges, MentorRecord, MentorStatus, StorageError};

use crate::cache::{CacheError, DirectoryCache, TagCache};
use crate::repository::{FilterOptions, MentorRepository};

#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    #[error(transparent)]
    Store(#[from] StorageError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("{0}")]
    Invalid(String),
}

/// What a trigger did to the directory cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "cache", rename_all = "camelCase")]
pub enum CacheOutcome {
    /// One mentor reloaded from the store (or removed if the store dropped it).
    Refreshed { slug: String },
    /// One mentor installed from a record already in hand.
    Patched { slug: String },
    /// One mentor removed.
    Removed { slug: String },
    /// Whole cache dropped.
    Invalidated,
}

/// Moderation status actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationAction {
    Approve,
    Decline,
    Enable,
    Disable,
}

impl ModerationAction {
    pub fn target_status(self) -> MentorStatus {
        match self {
            Self::Approve | Self::Enable => MentorStatus::Active,
            Self::Decline => MentorStatus::Declined,
            Self::Disable => MentorStatus::Inactive,
        }
    }
}

/// Profile fields a mentor may change about themself.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub job_title: Option<String>,
    pub workplace: Option<String>,
    pub about: Option<String>,
    pub description: Option<String>,
    pub competencies: Option<String>,
    pub experience: Option<String>,
    pub price: Option<String>,
    /// Empty string clears the link.
    pub calendar_url: Option<String>,
    /// Tag display names; replaces the whole list.
    pub tags: Option<Vec<String>>,
}

impl ProfileUpdate {
    fn validate(&self) -> Result<(), TriggerError> {
        if self.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(TriggerError::Invalid("name must not be empty".into()));
        }
        if let Some(url) = self.calendar_url.as_deref() {
            if !url.is_empty() && !is_http_url(url) {
                return Err(TriggerError::Invalid(
                    "calendarUrl must be an http(s) URL".into(),
                ));
            }
        }
        Ok(())
    }

    fn into_changes(self, tag_ids: Option<Vec<String>>) -> FieldChanges {
        FieldChanges {
            name: self.name.map(|n| n.trim().to_owned()),
            job_title: self.job_title,
            workplace: self.workplace,
            about: self.about,
            description: self.description,
            competencies: self.competencies,
            experience: self.experience,
            price: self.price,
            calendar_url: self.calendar_url,
            tag_ids,
            ..FieldChanges::default()
        }
    }
}

/// Moderator edit: profile fields plus the notification channel.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUpdate {
    #[serde(flatten)]
    pub profile: ProfileUpdate,
    /// Empty string unlinks the channel.
    pub telegram_chat_id: Option<String>,
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("https://") || value.starts_with("http://")
}

/// The consistency triggers, wired to one store and its caches.
#[derive(Clone)]
pub struct Triggers {
    store: DynMentorStore,
    repository: MentorRepository,
    directory: Arc<DirectoryCache>,
    tags: Arc<TagCache>,
}

impl Triggers {
    pub fn new(
        repository: MentorRepository,
        directory: Arc<DirectoryCache>,
        tags: Arc<TagCache>,
    ) -> Self {
        Self {
            store: directory.store().clone(),
            repository,
            directory,
            tags,
        }
    }

    /// Handles a change notification keyed by a legacy record-store ID.
    ///
    /// The record is always reloaded by that ID, so a slug changed in the
    /// store replaces the cached entry instead of orphaning it. Never fails:
    /// anything that cannot be resolved to a targeted update invalidates the
    /// whole cache.
    #[instrument(skip(self))]
    pub async fn record_changed(&self, external_id: &str) -> CacheOutcome {
        let cached_slug = self.directory.resolve_external_id(external_id);

        match self.store.fetch_one_by_external_id(external_id).await {
            Ok(record) => {
                let slug = record.slug.clone();
                if let Some(previous) = cached_slug.as_deref().filter(|s| *s != slug) {
                    info!(previous, slug = %slug, "mentor slug changed in store");
                }
                match self.directory.patch_local(record) {
                    Ok(_) if cached_slug.is_some() => CacheOutcome::Refreshed { slug },
                    Ok(_) => CacheOutcome::Patched { slug },
                    Err(e) => self.degrade(&e, "change notification patch failed"),
                }
            }
            Err(e) if e.is_not_found() => match cached_slug {
                Some(slug) => match self.directory.remove_entity(&slug) {
                    Ok(()) => CacheOutcome::Removed { slug },
                    Err(e) => self.degrade(&e, "removing vanished mentor failed"),
                },
                None => {
                    info!(external_id, "change notification for unknown record");
                    self.invalidate("unresolved change notification")
                }
            },
            Err(e) => self.degrade(&e, "change notification lookup failed"),
        }
    }

    /// Saves a mentor's own profile and patches the cache with the result.
    #[instrument(skip(self, owner, update), fields(slug = %owner.slug))]
    pub async fn save_profile(
        &self,
        owner: &MentorRecord,
        update: ProfileUpdate,
    ) -> Result<Arc<MentorRecord>, TriggerError> {
        update.validate()?;
        let (tag_ids, tag_names) = self.resolve_tags(update.tags.as_deref()).await?;
        let changes = update.into_changes(tag_ids);
        if changes.is_empty() {
            return Ok(Arc::new(owner.clone()));
        }

        self.store.update(&owner.id, &changes).await?;
        Ok(self.install(changes.applied_to(owner, tag_names)))
    }

    /// Records a new profile picture URL; the upload itself happened elsewhere.
    #[instrument(skip(self, owner), fields(slug = %owner.slug))]
    pub async fn update_picture(
        &self,
        owner: &MentorRecord,
        image_url: &str,
    ) -> Result<Arc<MentorRecord>, TriggerError> {
        if !is_http_url(image_url) {
            return Err(TriggerError::Invalid("imageUrl must be an http(s) URL".into()));
        }
        self.store.update_image_url(&owner.id, image_url).await?;
        let mut updated = owner.clone();
        updated.image_url = Some(image_url.to_owned());
        Ok(self.install(updated))
    }

    /// Applies a moderation status action.
    #[instrument(skip(self))]
    pub async fn moderate(
        &self,
        slug: &str,
        action: ModerationAction,
    ) -> Result<CacheOutcome, TriggerError> {
        let record = self.find(slug).await?;
        self.store
            .update(&record.id, &FieldChanges::status(action.target_status()))
            .await?;
        info!(slug, ?action, "moderation status written");

        let outcome = match action {
            ModerationAction::Approve => self.invalidate("mentor approved"),
            ModerationAction::Decline => match self.directory.remove_entity(slug) {
                Ok(()) => CacheOutcome::Removed {
                    slug: slug.to_owned(),
                },
                Err(e) => self.degrade(&e, "removing declined mentor failed"),
            },
            ModerationAction::Enable | ModerationAction::Disable => {
                self.refresh_or_invalidate(slug).await
            }
        };
        Ok(outcome)
    }

    /// Applies a moderator edit, then reloads that mentor.
    ///
    /// Tag names are resolved through the tag index, so the reload is what
    /// brings the cached tag list in line with the store.
    #[instrument(skip(self, update))]
    pub async fn admin_edit(
        &self,
        slug: &str,
        update: AdminUpdate,
    ) -> Result<CacheOutcome, TriggerError> {
        update.profile.validate()?;
        let record = self.find(slug).await?;
        let (tag_ids, _) = self.resolve_tags(update.profile.tags.as_deref()).await?;
        let changes = FieldChanges {
            telegram_chat_id: update.telegram_chat_id,
            ..update.profile.into_changes(tag_ids)
        };
        if changes.is_empty() {
            return Err(TriggerError::Invalid("no fields to update".into()));
        }

        self.store.update(&record.id, &changes).await?;
        Ok(self.refresh_or_invalidate(slug).await)
    }

    /// Operator-requested full invalidation of both caches.
    pub fn invalidate_all(&self) {
        self.directory.invalidate("operator request");
        self.tags.invalidate();
    }

    async fn find(&self, slug: &str) -> Result<Arc<MentorRecord>, TriggerError> {
        match self
            .repository
            .get_by_slug(slug, FilterOptions::PRIVILEGED, false)
            .await
        {
            Ok(record) => Ok(record),
            // Not cached yet (e.g. registered since the last load).
            Err(e) if e.is_not_found() => Ok(Arc::new(self.store.fetch_one(slug).await?)),
            Err(e) => Err(e.into()),
        }
    }

    async fn resolve_tags(
        &self,
        names: Option<&[String]>,
    ) -> Result<(Option<Vec<String>>, Option<Vec<String>>), TriggerError> {
        match names {
            None => Ok((None, None)),
            Some(names) => {
                let ids = self.tags.resolve_names(names).await?;
                Ok((Some(ids), Some(names.to_vec())))
            }
        }
    }

    /// Patches the cache with a post-write record, invalidating if that fails.
    fn install(&self, record: MentorRecord) -> Arc<MentorRecord> {
        match self.directory.patch_local(record.clone()) {
            Ok(Some(installed)) => installed,
            Ok(None) => Arc::new(record),
            Err(e) => {
                self.degrade(&e, "local patch failed");
                Arc::new(record)
            }
        }
    }

    async fn refresh_or_invalidate(&self, slug: &str) -> CacheOutcome {
        match self.directory.update_single_entity(slug).await {
            Ok(()) => CacheOutcome::Refreshed {
                slug: slug.to_owned(),
            },
            Err(e) => self.degrade(&e, "single-entity refresh failed"),
        }
    }

    fn degrade(&self, err: &dyn std::error::Error, reason: &'static str) -> CacheOutcome {
        warn!(error = %err, reason, "targeted cache update failed; invalidating");
        self.invalidate(reason)
    }

    fn invalidate(&self, reason: &str) -> CacheOutcome {
        self.directory.invalidate(reason);
        CacheOutcome::Invalidated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_map_to_statuses() {
        assert_eq!(ModerationAction::Approve.target_status(), MentorStatus::Active);
        assert_eq!(ModerationAction::Enable.target_status(), MentorStatus::Active);
        assert_eq!(ModerationAction::Disable.target_status(), MentorStatus::Inactive);
        assert_eq!(ModerationAction::Decline.target_status(), MentorStatus::Declined);
    }

    #[test]
    fn profile_update_validation() {
        let blank_name = ProfileUpdate {
            name: Some("  ".into()),
            ..ProfileUpdate::default()
        };
        assert!(blank_name.validate().is_err());

        let bad_link = ProfileUpdate {
            calendar_url: Some("javascript:alert(1)".into()),
            ..ProfileUpdate::default()
        };
        assert!(bad_link.validate().is_err());

        let clear_link = ProfileUpdate {
            calendar_url: Some(String::new()),
            ..ProfileUpdate::default()
        };
        assert!(clear_link.validate().is_ok());
    }

    #[test]
    fn admin_update_flattens_profile_fields() {
        let update: AdminUpdate = serde_json::from_value(serde_json::json!({
            "jobTitle": "CTO",
            "tags": ["Rust"],
            "telegramChatId": "42"
        }))
        .unwrap();
        assert_eq!(update.profile.job_title.as_deref(), Some("CTO"));
        assert_eq!(update.profile.tags, Some(vec!["Rust".to_string()]));
        assert_eq!(update.telegram_chat_id.as_deref(), Some("42"));
    }

    #[test]
    fn outcome_serializes_with_cache_tag() {
        let json = serde_json::to_value(CacheOutcome::Removed { slug: "x".into() }).unwrap();
        assert_eq!(json, serde_json::json!({ "cache": "removed", "slug": "x" }));
    }
}
