//! `MentorStore` implementation over the record-store API.

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use mentors_storage::{
    FieldChanges, MentorRecord, MentorStatus, MentorStore, StorageError, TagMap, sort_catalog,
};

use crate::client::{RecordsClient, formula_literal};
use crate::config::RecordsConfig;
use crate::error::{RecordsError, Result};
use crate::mapping::{changes_to_fields, fields, mentor_from_raw, tag_from_raw};

/// Record-store backed catalog.
#[derive(Debug, Clone)]
pub struct RecordsStore {
    client: RecordsClient,
}

impl RecordsStore {
    /// Creates a new store from configuration.
    pub fn new(config: RecordsConfig) -> Result<Self> {
        Ok(Self {
            client: RecordsClient::new(config)?,
        })
    }

    /// Creates a store around an existing client.
    pub fn with_client(client: RecordsClient) -> Self {
        Self { client }
    }

    fn mentors_table(&self) -> &str {
        &self.client.config().mentors_table
    }

    fn catalog_formula() -> String {
        format!(
            "NOT({{{}}} = {})",
            fields::STATUS,
            formula_literal(MentorStatus::Declined.as_str())
        )
    }

    fn not_found(key: &str) -> StorageError {
        StorageError::not_found("mentor", key)
    }

    /// Maps write errors, turning a 404 into `NotFound`.
    fn write_error(key: &str, err: RecordsError) -> StorageError {
        match err {
            RecordsError::Status { status: 404, .. } => Self::not_found(key),
            other => other.into(),
        }
    }
}

#[async_trait]
impl MentorStore for RecordsStore {
    #[instrument(skip(self))]
    async fn fetch_all(&self) -> std::result::Result<Vec<MentorRecord>, StorageError> {
        let formula = Self::catalog_formula();
        let raw = self
            .client
            .list(self.mentors_table(), Some(&formula), None)
            .await?;

        let mut records = Vec::with_capacity(raw.len());
        for item in &raw {
            match mentor_from_raw(item) {
                Ok(record) => records.push(record),
                // One malformed row must not take the whole directory down.
                Err(e) => warn!(record_id = %item.id, error = %e, "skipping malformed mentor record"),
            }
        }
        sort_catalog(&mut records);
        debug!(records = records.len(), "catalog fetched from record store");
        Ok(records)
    }

    #[instrument(skip(self))]
    async fn fetch_one(&self, slug: &str) -> std::result::Result<MentorRecord, StorageError> {
        let formula = format!(
            "AND({{{}}} = {}, {})",
            fields::SLUG,
            formula_literal(slug),
            Self::catalog_formula()
        );
        let raw = self
            .client
            .list(self.mentors_table(), Some(&formula), Some(1))
            .await?;
        let item = raw.first().ok_or_else(|| Self::not_found(slug))?;
        Ok(mentor_from_raw(item)?)
    }

    #[instrument(skip(self))]
    async fn fetch_one_by_external_id(
        &self,
        external_id: &str,
    ) -> std::result::Result<MentorRecord, StorageError> {
        let raw = self
            .client
            .get(self.mentors_table(), external_id)
            .await?
            .ok_or_else(|| Self::not_found(external_id))?;
        let record = mentor_from_raw(&raw)?;
        if record.status == MentorStatus::Declined {
            return Err(Self::not_found(external_id));
        }
        Ok(record)
    }

    #[instrument(skip(self, changes))]
    async fn update(&self, key: &str, changes: &FieldChanges) -> std::result::Result<(), StorageError> {
        if changes.is_empty() {
            return Ok(());
        }
        self.client
            .patch(self.mentors_table(), key, changes_to_fields(changes))
            .await
            .map_err(|e| Self::write_error(key, e))
    }

    #[instrument(skip(self))]
    async fn update_image_url(&self, key: &str, url: &str) -> std::result::Result<(), StorageError> {
        let mut patch = serde_json::Map::new();
        patch.insert(
            fields::IMAGE_URL.to_owned(),
            serde_json::Value::String(url.to_owned()),
        );
        self.client
            .patch(self.mentors_table(), key, patch)
            .await
            .map_err(|e| Self::write_error(key, e))
    }

    #[instrument(skip(self))]
    async fn fetch_all_tags(&self) -> std::result::Result<TagMap, StorageError> {
        let raw = self
            .client
            .list(&self.client.config().tags_table, None, None)
            .await?;
        let mut tags = TagMap::with_capacity(raw.len());
        for (name, id) in raw.iter().filter_map(tag_from_raw) {
            if tags.insert(name.clone(), id).is_some() {
                warn!(tag = %name, "duplicate tag name in record store");
            }
        }
        Ok(tags)
    }

    fn backend_name(&self) -> &'static str {
        "records"
    }
}
