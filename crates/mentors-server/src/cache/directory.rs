//! The mentor directory cache.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, instrument};

use mentors_storage::{DynMentorStore, MentorRecord, StorageError};

use super::cell::{CellStats, SnapshotCell, SnapshotSource};
use super::snapshot::DirectorySnapshot;
use super::{CacheError, CacheState};

struct CatalogSource {
    store: DynMentorStore,
}

#[async_trait]
impl SnapshotSource<DirectorySnapshot> for CatalogSource {
    async fn load(&self) -> Result<DirectorySnapshot, StorageError> {
        let records = self.store.fetch_all().await?;
        Ok(DirectorySnapshot::from_records(records))
    }
}

/// Directory statistics for the operator endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryStats {
    #[serde(flatten)]
    pub cell: CellStats,
    pub records: usize,
    pub backend: &'static str,
}

/// Read-through cache of the full mentor catalog.
///
/// Whole-catalog reads (`get`, `force_refresh`) follow the TTL. Single-entity
/// lookups read whatever snapshot is held and never trigger a refresh of a
/// populated cache; they stay current through the targeted patch operations.
#[derive(Clone)]
pub struct DirectoryCache {
    cell: SnapshotCell<DirectorySnapshot>,
    store: DynMentorStore,
}

impl std::fmt::Debug for DirectoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryCache")
            .field("cell", &self.cell)
            .field("backend", &self.store.backend_name())
            .finish()
    }
}

impl DirectoryCache {
    pub fn new(store: DynMentorStore, ttl: Duration) -> Self {
        let source = Arc::new(CatalogSource {
            store: store.clone(),
        });
        Self {
            cell: SnapshotCell::new("directory", ttl, source),
            store,
        }
    }

    pub fn store(&self) -> &DynMentorStore {
        &self.store
    }

    /// Current snapshot, refreshed first when empty or older than the TTL.
    pub async fn get(&self) -> Result<Arc<DirectorySnapshot>, CacheError> {
        self.cell.get().await
    }

    /// Fetches the catalog now and returns the installed snapshot.
    pub async fn force_refresh(&self) -> Result<Arc<DirectorySnapshot>, CacheError> {
        self.cell.force_refresh().await
    }

    /// Held snapshot, if any, without a freshness check.
    pub fn current(&self) -> Option<Arc<DirectorySnapshot>> {
        self.cell.peek()
    }

    /// Held snapshot, loading it only if the cache is empty.
    async fn held_or_load(&self) -> Result<Arc<DirectorySnapshot>, CacheError> {
        match self.cell.peek() {
            Some(snapshot) => Ok(snapshot),
            None => self.cell.get().await,
        }
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Arc<MentorRecord>, CacheError> {
        self.held_or_load()
            .await?
            .get_by_slug(slug)
            .cloned()
            .ok_or_else(|| CacheError::not_found("mentor", slug))
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Arc<MentorRecord>, CacheError> {
        self.held_or_load()
            .await?
            .get_by_id(id)
            .cloned()
            .ok_or_else(|| CacheError::not_found("mentor", id))
    }

    pub async fn get_by_legacy_id(&self, legacy_id: i64) -> Result<Arc<MentorRecord>, CacheError> {
        self.held_or_load()
            .await?
            .get_by_legacy_id(legacy_id)
            .cloned()
            .ok_or_else(|| CacheError::not_found("mentor", legacy_id.to_string()))
    }

    /// Fast-path scan of the held snapshot for a legacy record-store ID.
    ///
    /// Returns the slug, or `None` when the cache is empty or has no match.
    pub fn resolve_external_id(&self, external_id: &str) -> Option<String> {
        self.cell
            .peek()?
            .find_by_external_id(external_id)
            .map(|r| r.slug.clone())
    }

    /// Reloads one mentor from the store into the snapshot.
    ///
    /// A mentor the store no longer returns is removed instead. Other store
    /// errors propagate and leave the snapshot untouched.
    #[instrument(skip(self))]
    pub async fn update_single_entity(&self, slug: &str) -> Result<(), CacheError> {
        match self.store.fetch_one(slug).await {
            Ok(record) => {
                self.patch_local(record)?;
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!(slug, "mentor gone from store; removing from cache");
                self.remove_entity(slug)
            }
            Err(e) => Err(CacheError::BackendUnavailable(e)),
        }
    }

    /// Drops one mentor from the snapshot.
    pub fn remove_entity(&self, slug: &str) -> Result<(), CacheError> {
        let owned = slug.to_owned();
        self.cell
            .replace(move |snapshot| Ok(snapshot.without_slug(&owned)))?;
        debug!(slug, "mentor removed from cache");
        Ok(())
    }

    /// Installs an already-updated record without a store round trip.
    ///
    /// Returns the installed record, or `None` if the cache was empty (a load
    /// already in flight applies the record on top of what it fetched).
    pub fn patch_local(&self, record: MentorRecord) -> Result<Option<Arc<MentorRecord>>, CacheError> {
        let slug = record.slug.clone();
        let id = record.id.clone();
        let snapshot = self
            .cell
            .replace(move |snapshot| Ok(Some(snapshot.with_record(record.clone()))))?;
        debug!(slug = %slug, patched = snapshot.is_some(), "mentor patched in cache");
        Ok(snapshot.and_then(|s| s.get_by_id(&id).cloned()))
    }

    /// Drops the whole snapshot; the next read reloads the catalog.
    pub fn invalidate(&self, reason: &str) {
        self.cell.invalidate();
        info!(reason, "directory cache invalidated");
    }

    pub fn state(&self) -> CacheState {
        self.cell.state()
    }

    pub fn stats(&self) -> DirectoryStats {
        DirectoryStats {
            cell: self.cell.stats(),
            records: self.cell.peek().map_or(0, |s| s.len()),
            backend: self.store.backend_name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mentors_test_utils::{MemoryStore, fixtures};

    fn cache(records: Vec<MentorRecord>) -> (DirectoryCache, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::with_records(records, &[]));
        let cache = DirectoryCache::new(store.clone(), Duration::from_secs(600));
        (cache, store)
    }

    #[tokio::test]
    async fn single_lookups_do_not_refresh_populated_cache() {
        let (cache, store) = cache(fixtures::catalog(3));
        cache.get().await.unwrap();

        store
            .modify("rec2", |r| r.name = "Changed".into())
            .await;
        let record = cache.get_by_slug("mentor-2").await.unwrap();
        assert_eq!(record.name, "Mentor mentor-2");
        assert_eq!(cache.get_by_legacy_id(3).await.unwrap().slug, "mentor-3");
        assert_eq!(cache.get_by_id("rec1").await.unwrap().slug, "mentor-1");
        assert!(cache.get_by_slug("ghost").await.unwrap_err().is_not_found());
        assert_eq!(store.fetch_all_calls(), 1);
    }

    #[tokio::test]
    async fn single_lookup_populates_empty_cache() {
        let (cache, store) = cache(fixtures::catalog(2));
        assert_eq!(cache.get_by_slug("mentor-1").await.unwrap().legacy_id, 1);
        assert_eq!(store.fetch_all_calls(), 1);
    }

    #[tokio::test]
    async fn resolve_external_id_scans_held_snapshot_only() {
        let (cache, _) = cache(fixtures::catalog(2));
        assert_eq!(cache.resolve_external_id("rec1"), None);
        cache.get().await.unwrap();
        assert_eq!(cache.resolve_external_id("rec1").as_deref(), Some("mentor-1"));
        assert_eq!(cache.resolve_external_id("rec9"), None);
    }

    #[tokio::test]
    async fn patch_local_on_empty_cache_is_skipped() {
        let (cache, store) = cache(fixtures::catalog(1));
        let installed = cache.patch_local(fixtures::mentor(1, "mentor-1")).unwrap();
        assert!(installed.is_none());
        assert!(cache.current().is_none());
        assert_eq!(store.fetch_all_calls(), 0);
    }

    #[tokio::test]
    async fn stats_report_state_and_backend() {
        let (cache, _) = cache(fixtures::catalog(4));
        assert_eq!(cache.stats().cell.state, CacheState::Empty);
        cache.get().await.unwrap();
        let stats = cache.stats();
        assert_eq!(stats.cell.state, CacheState::Populated);
        assert_eq!(stats.records, 4);
        assert_eq!(stats.backend, "memory");
        assert_eq!(stats.cell.refreshes, 1);
    }
}
