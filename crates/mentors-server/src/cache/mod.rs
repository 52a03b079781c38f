//! In-process catalog caches.
//!
//! ## Architecture
//!
//! ```text
//! reader ─► SnapshotCell::get ─► fresh? ──yes──► Arc<T> (no backend call)
//!                                  │ no
//!                                  ▼
//!                     single-flight refresh task ─► SnapshotSource::load
//!                                  │
//!                                  ▼
//!                     replay journaled patches, install under the write lock
//! ```
//!
//! Every published value is immutable. Mutations build a new value from the
//! current one and swap it in whole, so a reader holding an `Arc` keeps a
//! consistent view for as long as it needs.
//!
//! [`DirectoryCache`] holds the mentor catalog, [`TagCache`] the tag index.
//! Both share the [`SnapshotCell`] machinery.

mod cell;
pub mod directory;
pub mod snapshot;
pub mod tags;

pub use cell::{CacheState, CellStats, SnapshotCell, SnapshotSource};
pub use directory::{DirectoryCache, DirectoryStats};
pub use snapshot::DirectorySnapshot;
pub use tags::{TagCache, TagIndex};

use mentors_storage::StorageError;

/// Metric names emitted by the caches, labelled with `cache`.
pub mod metric_names {
    pub const REFRESH_TOTAL: &str = "directory_cache_refresh_total";
    pub const REFRESH_FAILURES_TOTAL: &str = "directory_cache_refresh_failures_total";
    pub const HITS_TOTAL: &str = "directory_cache_hits_total";
}

/// Errors surfaced by the cache layer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// The key is absent from the backing store or the current snapshot.
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    /// The backing store could not be reached and there was nothing to serve.
    #[error("backing store unavailable: {0}")]
    BackendUnavailable(#[source] StorageError),

    /// A snapshot's indexes disagree with its record list.
    #[error("inconsistent snapshot: {0}")]
    InconsistentSnapshot(String),

    /// A tag name has no entry in the tag index.
    #[error("unknown tag '{0}'")]
    UnknownTag(String),
}

impl CacheError {
    pub fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            key: key.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<StorageError> for CacheError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { key, .. } => Self::not_found("mentor", key),
            other => Self::BackendUnavailable(other),
        }
    }
}
