//! # mentors-storage
//!
//! Backing store contract for the mentors directory.
//!
//! This crate defines the trait and types every backing store adapter must
//! implement. It does not contain any implementations - those are provided by
//! `mentors-db-records` (legacy record-store API) and `mentors-db-postgres`.
//!
//! ## Overview
//!
//! The main trait is [`MentorStore`], a narrow fetch/update contract:
//! - full catalog load (`fetch_all`) used by cache refreshes
//! - single-entity loads by slug or by legacy record-store ID
//! - write-through updates (field changes, profile picture)
//! - tag index load (`fetch_all_tags`)
//!
//! Both adapters compute visibility the same way through
//! [`MentorRecord::compute_visibility`], so consumers never need to know which
//! store is active.
//!
//! ## Example
//!
//! ```ignore
//! use mentors_storage::{MentorStore, StorageError};
//!
//! async fn visible_count(store: &dyn MentorStore) -> Result<usize, StorageError> {
//!     let all = store.fetch_all().await?;
//!     Ok(all.iter().filter(|m| m.is_visible).count())
//! }
//! ```

mod error;
mod traits;
mod types;

pub use error::{ErrorCategory, StorageError};
pub use traits::MentorStore;
pub use types::{FieldChanges, MentorRecord, MentorStatus, TagMap, sort_catalog};

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Type alias for a shared store trait object.
pub type DynMentorStore = std::sync::Arc<dyn MentorStore>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use mentors_storage::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{ErrorCategory, StorageError};
    pub use crate::traits::MentorStore;
    pub use crate::types::{FieldChanges, MentorRecord, MentorStatus, TagMap};
    pub use crate::{DynMentorStore, StorageResult};
}
