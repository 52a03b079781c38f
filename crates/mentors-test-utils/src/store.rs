//! In-memory `MentorStore`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::RwLock;

use mentors_storage::{
    FieldChanges, MentorRecord, MentorStatus, MentorStore, StorageError, TagMap, sort_catalog,
};

/// Snapshot of backend call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub fetch_all: u64,
    pub fetch_one: u64,
    pub fetch_by_external_id: u64,
    pub update: u64,
    pub update_image_url: u64,
    pub fetch_tags: u64,
}

#[derive(Debug, Default)]
struct Counters {
    fetch_all: AtomicU64,
    fetch_one: AtomicU64,
    fetch_by_external_id: AtomicU64,
    update: AtomicU64,
    update_image_url: AtomicU64,
    fetch_tags: AtomicU64,
}

/// In-memory store keyed by store ID, preserving insertion order.
///
/// Declined records stay in the store but are excluded from catalog reads,
/// matching the real adapters.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<IndexMap<String, MentorRecord>>,
    tags: RwLock<TagMap>,
    counters: Counters,
    unavailable: AtomicBool,
    writes_failing: AtomicBool,
    latency: Mutex<Option<Duration>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `records` and the given tag names.
    ///
    /// Tag IDs are `tag-<name>`.
    pub fn with_records(records: Vec<MentorRecord>, tag_names: &[&str]) -> Self {
        let records = records
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();
        let tags = tag_names
            .iter()
            .map(|name| ((*name).to_owned(), tag_id(name)))
            .collect();
        Self {
            records: RwLock::new(records),
            tags: RwLock::new(tags),
            ..Self::default()
        }
    }

    /// Inserts or replaces a record, as an out-of-band edit would.
    pub async fn upsert(&self, record: MentorRecord) {
        self.records.write().await.insert(record.id.clone(), record);
    }

    /// Removes a record by store ID.
    pub async fn remove(&self, id: &str) -> Option<MentorRecord> {
        self.records.write().await.shift_remove(id)
    }

    /// Edits a record in place, bypassing any cache.
    pub async fn modify(&self, id: &str, edit: impl FnOnce(&mut MentorRecord)) -> bool {
        let mut records = self.records.write().await;
        match records.get_mut(id) {
            Some(record) => {
                edit(record);
                record.refresh_visibility();
                true
            }
            None => false,
        }
    }

    /// Returns the stored record, declined or not.
    pub async fn get(&self, id: &str) -> Option<MentorRecord> {
        self.records.read().await.get(id).cloned()
    }

    pub async fn add_tag(&self, name: &str) -> String {
        let id = tag_id(name);
        self.tags.write().await.insert(name.to_owned(), id.clone());
        id
    }

    /// Makes every call fail with a connection error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Makes writes fail with a connection error while reads keep working.
    pub fn set_writes_failing(&self, failing: bool) {
        self.writes_failing.store(failing, Ordering::SeqCst);
    }

    /// Delays every catalog and single-record read by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    pub fn calls(&self) -> CallCounts {
        let c = &self.counters;
        CallCounts {
            fetch_all: c.fetch_all.load(Ordering::SeqCst),
            fetch_one: c.fetch_one.load(Ordering::SeqCst),
            fetch_by_external_id: c.fetch_by_external_id.load(Ordering::SeqCst),
            update: c.update.load(Ordering::SeqCst),
            update_image_url: c.update_image_url.load(Ordering::SeqCst),
            fetch_tags: c.fetch_tags.load(Ordering::SeqCst),
        }
    }

    pub fn fetch_all_calls(&self) -> u64 {
        self.counters.fetch_all.load(Ordering::SeqCst)
    }

    async fn before_read(&self, counter: &AtomicU64) -> Result<(), StorageError> {
        counter.fetch_add(1, Ordering::SeqCst);
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.check_available()
    }

    fn before_write(&self, counter: &AtomicU64) -> Result<(), StorageError> {
        counter.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        if self.writes_failing.load(Ordering::SeqCst) {
            return Err(StorageError::connection("memory store rejects writes"));
        }
        Ok(())
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::connection("memory store unavailable"));
        }
        Ok(())
    }
}

/// Tag ID the memory store assigns to a tag name.
pub fn tag_id(name: &str) -> String {
    format!("tag-{name}")
}

#[async_trait]
impl MentorStore for MemoryStore {
    async fn fetch_all(&self) -> Result<Vec<MentorRecord>, StorageError> {
        self.before_read(&self.counters.fetch_all).await?;
        let mut records: Vec<_> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.status != MentorStatus::Declined)
            .cloned()
            .collect();
        sort_catalog(&mut records);
        Ok(records)
    }

    async fn fetch_one(&self, slug: &str) -> Result<MentorRecord, StorageError> {
        self.before_read(&self.counters.fetch_one).await?;
        self.records
            .read()
            .await
            .values()
            .find(|r| r.slug == slug && r.status != MentorStatus::Declined)
            .cloned()
            .ok_or_else(|| StorageError::not_found("mentor", slug))
    }

    async fn fetch_one_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<MentorRecord, StorageError> {
        self.before_read(&self.counters.fetch_by_external_id).await?;
        self.records
            .read()
            .await
            .values()
            .find(|r| {
                r.external_id.as_deref() == Some(external_id) && r.status != MentorStatus::Declined
            })
            .cloned()
            .ok_or_else(|| StorageError::not_found("mentor", external_id))
    }

    async fn update(&self, key: &str, changes: &FieldChanges) -> Result<(), StorageError> {
        self.before_write(&self.counters.update)?;
        let tag_names = match &changes.tag_ids {
            Some(ids) => {
                let by_id: HashMap<String, String> = self
                    .tags
                    .read()
                    .await
                    .iter()
                    .map(|(name, id)| (id.clone(), name.clone()))
                    .collect();
                let names = ids
                    .iter()
                    .map(|id| {
                        by_id
                            .get(id)
                            .cloned()
                            .ok_or_else(|| StorageError::invalid_record(format!("unknown tag id {id}")))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Some(names)
            }
            None => None,
        };

        let mut records = self.records.write().await;
        let record = records
            .get_mut(key)
            .ok_or_else(|| StorageError::not_found("mentor", key))?;
        *record = changes.applied_to(record, tag_names);
        Ok(())
    }

    async fn update_image_url(&self, key: &str, url: &str) -> Result<(), StorageError> {
        self.before_write(&self.counters.update_image_url)?;
        let mut records = self.records.write().await;
        let record = records
            .get_mut(key)
            .ok_or_else(|| StorageError::not_found("mentor", key))?;
        record.image_url = Some(url.to_owned());
        Ok(())
    }

    async fn fetch_all_tags(&self) -> Result<TagMap, StorageError> {
        self.before_read(&self.counters.fetch_tags).await?;
        Ok(self.tags.read().await.clone())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{catalog, mentor_with_status};

    #[tokio::test]
    async fn catalog_excludes_declined_and_counts_calls() {
        let mut records = catalog(3);
        records.push(mentor_with_status(4, "declined", MentorStatus::Declined));
        let store = MemoryStore::with_records(records, &["Backend"]);

        let all = store.fetch_all().await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].legacy_id, 3);
        assert!(store.fetch_one("declined").await.unwrap_err().is_not_found());
        assert_eq!(store.calls().fetch_all, 1);
        assert_eq!(store.calls().fetch_one, 1);
    }

    #[tokio::test]
    async fn update_resolves_tag_ids_to_names() {
        let store = MemoryStore::with_records(catalog(1), &["Backend", "Frontend"]);
        let changes = FieldChanges {
            tag_ids: Some(vec![tag_id("Frontend")]),
            ..FieldChanges::status(MentorStatus::Inactive)
        };
        store.update("rec1", &changes).await.unwrap();

        let record = store.get("rec1").await.unwrap();
        assert_eq!(record.tags, vec!["Frontend".to_string()]);
        assert!(!record.is_visible);
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_call() {
        let store = MemoryStore::with_records(catalog(1), &[]);
        store.set_unavailable(true);
        assert!(matches!(
            store.fetch_all().await,
            Err(StorageError::Connection { .. })
        ));
        assert!(store.update("rec1", &FieldChanges::default()).await.is_err());
        store.set_unavailable(false);
        assert!(store.fetch_all().await.is_ok());
    }
}
