//! The backing store trait.

use async_trait::async_trait;

use crate::error::StorageError;
use crate::types::{FieldChanges, MentorRecord, TagMap};

/// Fetch/update contract implemented once per backing technology.
///
/// The directory cache consumes stores only through this trait, so the legacy
/// record-store API and the relational database are interchangeable at
/// construction time. Implementations must be thread-safe (`Send + Sync`).
///
/// Network and driver failures surface as [`StorageError::Connection`];
/// missing records always surface as [`StorageError::NotFound`] so callers can
/// tell the two apart.
#[async_trait]
pub trait MentorStore: Send + Sync {
    /// Loads the full catalog, ordered for display.
    ///
    /// Declined mentors are not part of the catalog.
    async fn fetch_all(&self) -> Result<Vec<MentorRecord>, StorageError>;

    /// Loads a single mentor by slug.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no catalog record has this slug.
    async fn fetch_one(&self, slug: &str) -> Result<MentorRecord, StorageError>;

    /// Resolves a legacy record-store record ID to a mentor.
    ///
    /// Change notifications arrive keyed by this ID rather than by slug.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no record carries this ID.
    async fn fetch_one_by_external_id(&self, external_id: &str)
    -> Result<MentorRecord, StorageError>;

    /// Writes field changes for the mentor with the given store key.
    ///
    /// Tag changes are expressed as store tag IDs.
    async fn update(&self, key: &str, changes: &FieldChanges) -> Result<(), StorageError>;

    /// Writes a new profile picture URL for the mentor with the given store key.
    async fn update_image_url(&self, key: &str, url: &str) -> Result<(), StorageError>;

    /// Loads the tag index as display name -> store tag ID.
    async fn fetch_all_tags(&self) -> Result<TagMap, StorageError>;

    /// Returns the name of this store for logging/debugging.
    fn backend_name(&self) -> &'static str;
}
