//! Request-scoped read access to the directory.
//!
//! The repository decides per request which records a caller may see and
//! which fields leave the process. Cached records are shared between all
//! concurrent readers, so redaction always works on a copy and returns the
//! cached `Arc` untouched when nothing needs to be cleared.

use std::sync::Arc;

use mentors_storage::{DynMentorStore, MentorRecord};
use tracing::debug;

use crate::cache::{CacheError, DirectoryCache, DirectorySnapshot};

/// Per-request visibility and redaction rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterOptions {
    /// Drop records whose computed visibility is false.
    pub only_visible: bool,
    /// Keep the secure fields (auth token, calendar URL, chat ID).
    pub show_hidden: bool,
    /// Blank the long free-text sections.
    pub drop_long_fields: bool,
}

impl FilterOptions {
    /// Public directory listing.
    pub const PUBLIC_LIST: Self = Self {
        only_visible: true,
        show_hidden: false,
        drop_long_fields: true,
    };

    /// Public mentor page.
    pub const PUBLIC_PROFILE: Self = Self {
        only_visible: true,
        show_hidden: false,
        drop_long_fields: false,
    };

    /// Authenticated owner or admin.
    pub const PRIVILEGED: Self = Self {
        only_visible: false,
        show_hidden: true,
        drop_long_fields: false,
    };

    /// Applies the rules to one record.
    ///
    /// Returns `None` if the record is filtered out, the original `Arc` if no
    /// field has to be cleared, and a redacted copy otherwise.
    pub fn apply(&self, record: &Arc<MentorRecord>) -> Option<Arc<MentorRecord>> {
        if self.only_visible && !record.is_visible {
            return None;
        }

        let strip_secure = !self.show_hidden && record.has_secure_fields();
        let strip_long = self.drop_long_fields && record.has_long_fields();
        if !strip_secure && !strip_long {
            return Some(record.clone());
        }

        let mut copy = MentorRecord::clone(record);
        if strip_secure {
            copy.auth_token = None;
            copy.calendar_url = None;
            copy.telegram_chat_id = None;
        }
        if strip_long {
            copy.about.clear();
            copy.description.clear();
            copy.competencies.clear();
        }
        Some(Arc::new(copy))
    }

    /// Applies the rules to a whole snapshot, preserving order.
    pub fn apply_all(&self, snapshot: &DirectorySnapshot) -> Vec<Arc<MentorRecord>> {
        snapshot
            .records()
            .iter()
            .filter_map(|record| self.apply(record))
            .collect()
    }
}

/// Filtered reads over the directory cache, or straight from the store when
/// the cache is bypassed.
#[derive(Clone)]
pub struct MentorRepository {
    directory: Arc<DirectoryCache>,
    store: DynMentorStore,
    bypass: bool,
}

impl MentorRepository {
    pub fn new(directory: Arc<DirectoryCache>, bypass: bool) -> Self {
        let store = directory.store().clone();
        Self {
            directory,
            store,
            bypass,
        }
    }

    pub fn bypass(&self) -> bool {
        self.bypass
    }

    /// Full catalog snapshot: cached (TTL or forced) or a throwaway one in
    /// bypass mode.
    async fn snapshot(&self, force: bool) -> Result<Arc<DirectorySnapshot>, CacheError> {
        if self.bypass {
            debug!("cache bypassed; loading catalog from store");
            let records = self.store.fetch_all().await?;
            return Ok(Arc::new(DirectorySnapshot::from_records(records)));
        }
        if force {
            self.directory.force_refresh().await
        } else {
            self.directory.get().await
        }
    }

    pub async fn list(
        &self,
        options: FilterOptions,
        force: bool,
    ) -> Result<Vec<Arc<MentorRecord>>, CacheError> {
        Ok(options.apply_all(&*self.snapshot(force).await?))
    }

    pub async fn get_by_slug(
        &self,
        slug: &str,
        options: FilterOptions,
        force: bool,
    ) -> Result<Arc<MentorRecord>, CacheError> {
        let record = if self.bypass {
            Arc::new(self.store.fetch_one(slug).await?)
        } else if force {
            self.directory
                .force_refresh()
                .await?
                .get_by_slug(slug)
                .cloned()
                .ok_or_else(|| CacheError::not_found("mentor", slug))?
        } else {
            self.directory.get_by_slug(slug).await?
        };
        filtered(record, options, slug)
    }

    pub async fn get_by_legacy_id(
        &self,
        legacy_id: i64,
        options: FilterOptions,
    ) -> Result<Arc<MentorRecord>, CacheError> {
        let key = legacy_id.to_string();
        let record = if self.bypass {
            self.snapshot(false)
                .await?
                .get_by_legacy_id(legacy_id)
                .cloned()
                .ok_or_else(|| CacheError::not_found("mentor", key.as_str()))?
        } else {
            self.directory.get_by_legacy_id(legacy_id).await?
        };
        filtered(record, options, &key)
    }

    pub async fn get_by_id(
        &self,
        id: &str,
        options: FilterOptions,
    ) -> Result<Arc<MentorRecord>, CacheError> {
        let record = if self.bypass {
            self.snapshot(false)
                .await?
                .get_by_id(id)
                .cloned()
                .ok_or_else(|| CacheError::not_found("mentor", id))?
        } else {
            self.directory.get_by_id(id).await?
        };
        filtered(record, options, id)
    }
}

/// Hidden records read as absent.
fn filtered(
    record: Arc<MentorRecord>,
    options: FilterOptions,
    key: &str,
) -> Result<Arc<MentorRecord>, CacheError> {
    options
        .apply(&record)
        .ok_or_else(|| CacheError::not_found("mentor", key))
}
