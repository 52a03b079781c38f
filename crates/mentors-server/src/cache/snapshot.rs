//! Immutable catalog snapshot with its lookup indexes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::warn;

use mentors_storage::MentorRecord;

use super::CacheError;

/// The full ordered catalog plus slug, store-key and legacy-ID indexes.
///
/// The indexes hold positions into `records` and are only ever built from
/// that same list, so a snapshot is consistent by construction. Snapshots are
/// never modified once built; patches produce a new snapshot.
#[derive(Debug, Clone, Default)]
pub struct DirectorySnapshot {
    records: Vec<Arc<MentorRecord>>,
    by_slug: HashMap<String, usize>,
    by_id: HashMap<String, usize>,
    by_legacy_id: HashMap<i64, usize>,
}

impl DirectorySnapshot {
    /// Builds a snapshot from a fetched catalog, keeping its order.
    ///
    /// Records whose slug, store key or legacy ID was already seen are dropped
    /// with a warning; the first occurrence wins.
    pub fn from_records(records: Vec<MentorRecord>) -> Self {
        Self::from_shared(records.into_iter().map(Arc::new).collect())
    }

    fn from_shared(records: Vec<Arc<MentorRecord>>) -> Self {
        let mut seen_slugs = HashSet::with_capacity(records.len());
        let mut seen_ids = HashSet::with_capacity(records.len());
        let mut seen_legacy = HashSet::with_capacity(records.len());
        let mut kept = Vec::with_capacity(records.len());

        for record in records {
            if seen_slugs.contains(record.slug.as_str())
                || seen_ids.contains(record.id.as_str())
                || seen_legacy.contains(&record.legacy_id)
            {
                warn!(
                    slug = %record.slug,
                    id = %record.id,
                    legacy_id = record.legacy_id,
                    "duplicate mentor key in catalog; keeping first occurrence"
                );
                continue;
            }
            seen_slugs.insert(record.slug.clone());
            seen_ids.insert(record.id.clone());
            seen_legacy.insert(record.legacy_id);
            kept.push(record);
        }

        Self::indexed(kept)
    }

    /// Indexes an already de-duplicated list.
    fn indexed(records: Vec<Arc<MentorRecord>>) -> Self {
        let mut by_slug = HashMap::with_capacity(records.len());
        let mut by_id = HashMap::with_capacity(records.len());
        let mut by_legacy_id = HashMap::with_capacity(records.len());
        for (pos, record) in records.iter().enumerate() {
            by_slug.insert(record.slug.clone(), pos);
            by_id.insert(record.id.clone(), pos);
            by_legacy_id.insert(record.legacy_id, pos);
        }
        Self {
            records,
            by_slug,
            by_id,
            by_legacy_id,
        }
    }

    pub fn records(&self) -> &[Arc<MentorRecord>] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get_by_slug(&self, slug: &str) -> Option<&Arc<MentorRecord>> {
        self.by_slug.get(slug).map(|&pos| &self.records[pos])
    }

    pub fn get_by_id(&self, id: &str) -> Option<&Arc<MentorRecord>> {
        self.by_id.get(id).map(|&pos| &self.records[pos])
    }

    pub fn get_by_legacy_id(&self, legacy_id: i64) -> Option<&Arc<MentorRecord>> {
        self.by_legacy_id.get(&legacy_id).map(|&pos| &self.records[pos])
    }

    /// Linear scan for a legacy record-store ID.
    pub fn find_by_external_id(&self, external_id: &str) -> Option<&Arc<MentorRecord>> {
        self.records
            .iter()
            .find(|r| r.external_id.as_deref() == Some(external_id))
    }

    /// Returns a copy with `record` installed.
    ///
    /// The record replaces the entry with the same store key in place, or is
    /// appended. Any other entry colliding on slug or legacy ID is dropped.
    pub fn with_record(&self, record: MentorRecord) -> Self {
        let record = Arc::new(record);
        let target = self.by_id.get(&record.id).copied();

        let mut records = Vec::with_capacity(self.records.len() + 1);
        for (pos, existing) in self.records.iter().enumerate() {
            if Some(pos) == target {
                records.push(record.clone());
                continue;
            }
            if existing.slug == record.slug || existing.legacy_id == record.legacy_id {
                warn!(
                    slug = %existing.slug,
                    id = %existing.id,
                    replaced_by = %record.id,
                    "patched record collides with another entry; dropping it"
                );
                continue;
            }
            records.push(existing.clone());
        }
        if target.is_none() {
            records.push(record);
        }

        Self::indexed(records)
    }

    /// Returns a copy without the given slug, or `None` if it is absent.
    pub fn without_slug(&self, slug: &str) -> Option<Self> {
        let pos = *self.by_slug.get(slug)?;
        let records = self
            .records
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != pos)
            .map(|(_, r)| r.clone())
            .collect();
        Some(Self::indexed(records))
    }

    /// Checks that every index entry points at a list entry with the same key
    /// and that every list entry is indexed.
    pub fn verify(&self) -> Result<(), CacheError> {
        let n = self.records.len();
        if self.by_slug.len() != n || self.by_id.len() != n || self.by_legacy_id.len() != n {
            return Err(CacheError::InconsistentSnapshot(format!(
                "{n} records but {} slugs, {} ids, {} legacy ids indexed",
                self.by_slug.len(),
                self.by_id.len(),
                self.by_legacy_id.len()
            )));
        }
        for (slug, &pos) in &self.by_slug {
            match self.records.get(pos) {
                Some(r) if &r.slug == slug => {}
                _ => {
                    return Err(CacheError::InconsistentSnapshot(format!(
                        "slug index entry '{slug}' points at position {pos}"
                    )));
                }
            }
        }
        for (id, &pos) in &self.by_id {
            match self.records.get(pos) {
                Some(r) if &r.id == id => {}
                _ => {
                    return Err(CacheError::InconsistentSnapshot(format!(
                        "id index entry '{id}' points at position {pos}"
                    )));
                }
            }
        }
        for (&legacy_id, &pos) in &self.by_legacy_id {
            match self.records.get(pos) {
                Some(r) if r.legacy_id == legacy_id => {}
                _ => {
                    return Err(CacheError::InconsistentSnapshot(format!(
                        "legacy id index entry {legacy_id} points at position {pos}"
                    )));
                }
            }
        }
        Ok(())
    }
}
