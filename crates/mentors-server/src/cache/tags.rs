//! Tag index cache.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use mentors_storage::{DynMentorStore, StorageError, TagMap};

use super::CacheError;
use super::cell::{CellStats, SnapshotCell, SnapshotSource};

/// Bidirectional tag name/ID index. Rebuilt wholesale; never patched.
#[derive(Debug, Clone, Default)]
pub struct TagIndex {
    by_name: BTreeMap<String, String>,
    by_id: HashMap<String, String>,
}

impl TagIndex {
    pub fn from_map(tags: TagMap) -> Self {
        let by_id = tags
            .iter()
            .map(|(name, id)| (id.clone(), name.clone()))
            .collect();
        Self {
            by_name: tags.into_iter().collect(),
            by_id,
        }
    }

    /// Tag names in alphabetical order.
    pub fn names(&self) -> Vec<String> {
        self.by_name.keys().cloned().collect()
    }

    pub fn id_for(&self, name: &str) -> Option<&str> {
        self.by_name.get(name).map(String::as_str)
    }

    pub fn name_for(&self, id: &str) -> Option<&str> {
        self.by_id.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Maps names to store IDs, failing on the first unknown name.
    pub fn resolve_names(&self, names: &[String]) -> Result<Vec<String>, CacheError> {
        names
            .iter()
            .map(|name| {
                self.id_for(name)
                    .map(str::to_owned)
                    .ok_or_else(|| CacheError::UnknownTag(name.clone()))
            })
            .collect()
    }
}

struct TagSource {
    store: DynMentorStore,
}

#[async_trait]
impl SnapshotSource<TagIndex> for TagSource {
    async fn load(&self) -> Result<TagIndex, StorageError> {
        Ok(TagIndex::from_map(self.store.fetch_all_tags().await?))
    }
}

/// Independently refreshed cache of the tag index.
#[derive(Debug, Clone)]
pub struct TagCache {
    cell: SnapshotCell<TagIndex>,
}

impl TagCache {
    pub fn new(store: DynMentorStore, ttl: Duration) -> Self {
        Self {
            cell: SnapshotCell::new("tags", ttl, Arc::new(TagSource { store })),
        }
    }

    pub async fn get(&self) -> Result<Arc<TagIndex>, CacheError> {
        self.cell.get().await
    }

    pub async fn force_refresh(&self) -> Result<Arc<TagIndex>, CacheError> {
        self.cell.force_refresh().await
    }

    pub async fn names(&self) -> Result<Vec<String>, CacheError> {
        Ok(self.get().await?.names())
    }

    /// Resolves display names to store tag IDs.
    ///
    /// An unknown name forces one reload of the index (the tag may have been
    /// created since the last load) before failing with `UnknownTag`.
    pub async fn resolve_names(&self, names: &[String]) -> Result<Vec<String>, CacheError> {
        match self.get().await?.resolve_names(names) {
            Err(CacheError::UnknownTag(_)) => self.force_refresh().await?.resolve_names(names),
            other => other,
        }
    }

    pub fn invalidate(&self) {
        self.cell.invalidate();
        info!("tag cache invalidated");
    }

    pub fn stats(&self) -> CellStats {
        self.cell.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mentors_test_utils::{MemoryStore, tag_id};

    fn tags(names: &[&str]) -> (TagCache, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::with_records(Vec::new(), names));
        (TagCache::new(store.clone(), Duration::from_secs(600)), store)
    }

    #[tokio::test]
    async fn index_maps_both_directions() {
        let (cache, store) = tags(&["Rust", "Go", "Backend"]);
        assert_eq!(cache.names().await.unwrap(), vec!["Backend", "Go", "Rust"]);
        let index = cache.get().await.unwrap();
        assert_eq!(index.id_for("Go"), Some(tag_id("Go").as_str()));
        assert_eq!(index.name_for(&tag_id("Rust")), Some("Rust"));
        assert_eq!(index.id_for("Cobol"), None);
        assert_eq!(store.calls().fetch_tags, 1);
    }

    #[tokio::test]
    async fn resolve_names_reloads_once_for_new_tags() {
        let (cache, store) = tags(&["Rust"]);
        cache.get().await.unwrap();
        store.add_tag("Go").await;

        let ids = cache
            .resolve_names(&["Go".to_string(), "Rust".to_string()])
            .await
            .unwrap();
        assert_eq!(ids, vec![tag_id("Go"), tag_id("Rust")]);

        let err = cache.resolve_names(&["Cobol".to_string()]).await.unwrap_err();
        assert!(matches!(err, CacheError::UnknownTag(name) if name == "Cobol"));
        assert_eq!(store.calls().fetch_tags, 3);
    }
}
