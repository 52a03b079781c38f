//! `MentorStore` implementation over PostgreSQL.

use async_trait::async_trait;
use sqlx_core::query::query;
use sqlx_core::row::Row;
use sqlx_postgres::PgPool;
use tracing::{debug, instrument};

use mentors_storage::{FieldChanges, MentorRecord, MentorStore, StorageError, TagMap};

use crate::config::PostgresConfig;
use crate::error::{PostgresError, Result};
use crate::pool::create_pool;
use crate::queries;

/// PostgreSQL backed catalog.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connects a new pool and wraps it.
    pub async fn new(config: PostgresConfig) -> Result<Self> {
        let pool = create_pool(&config).await?;
        Ok(Self { pool })
    }

    async fn fetch_single(&self, sql: &str, value: &str, key: &str) -> Result<Option<MentorRecord>> {
        let row = query(sql).bind(value).fetch_optional(&self.pool).await?;
        debug!(key = %key, found = row.is_some(), "single mentor lookup");
        row.as_ref().map(queries::mentor_from_row).transpose()
    }

    async fn replace_tags(&self, key: uuid::Uuid, tag_ids: &[String]) -> Result<()> {
        let ids = queries::parse_tag_ids(tag_ids)?;
        let mut tx = self.pool.begin().await?;
        query(queries::DELETE_TAG_LINKS)
            .bind(key)
            .execute(&mut *tx)
            .await?;
        if !ids.is_empty() {
            query(queries::INSERT_TAG_LINKS)
                .bind(key)
                .bind(ids)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

fn not_found(key: &str) -> StorageError {
    StorageError::not_found("mentor", key)
}

#[async_trait]
impl MentorStore for PostgresStore {
    #[instrument(skip(self))]
    async fn fetch_all(&self) -> std::result::Result<Vec<MentorRecord>, StorageError> {
        let rows = query(&queries::select_all())
            .fetch_all(&self.pool)
            .await
            .map_err(PostgresError::from)?;
        let records = rows
            .iter()
            .map(queries::mentor_from_row)
            .collect::<Result<Vec<_>>>()?;
        debug!(records = records.len(), "catalog fetched from postgres");
        Ok(records)
    }

    #[instrument(skip(self))]
    async fn fetch_one(&self, slug: &str) -> std::result::Result<MentorRecord, StorageError> {
        self.fetch_single(&queries::select_by_slug(), slug, slug)
            .await?
            .ok_or_else(|| not_found(slug))
    }

    #[instrument(skip(self))]
    async fn fetch_one_by_external_id(
        &self,
        external_id: &str,
    ) -> std::result::Result<MentorRecord, StorageError> {
        self.fetch_single(&queries::select_by_external_id(), external_id, external_id)
            .await?
            .ok_or_else(|| not_found(external_id))
    }

    #[instrument(skip(self, changes))]
    async fn update(&self, key: &str, changes: &FieldChanges) -> std::result::Result<(), StorageError> {
        let id = queries::parse_key(key).ok_or_else(|| not_found(key))?;

        if let Some(mut builder) = queries::build_update(id, changes) {
            let result = builder
                .build()
                .execute(&self.pool)
                .await
                .map_err(PostgresError::from)?;
            if result.rows_affected() == 0 {
                return Err(not_found(key));
            }
        }
        if let Some(tag_ids) = &changes.tag_ids {
            self.replace_tags(id, tag_ids).await?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn update_image_url(&self, key: &str, url: &str) -> std::result::Result<(), StorageError> {
        let id = queries::parse_key(key).ok_or_else(|| not_found(key))?;
        let result = query(queries::UPDATE_IMAGE_URL)
            .bind(id)
            .bind(url)
            .execute(&self.pool)
            .await
            .map_err(PostgresError::from)?;
        if result.rows_affected() == 0 {
            return Err(not_found(key));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn fetch_all_tags(&self) -> std::result::Result<TagMap, StorageError> {
        let rows = query(queries::SELECT_TAGS)
            .fetch_all(&self.pool)
            .await
            .map_err(PostgresError::from)?;
        let mut tags = TagMap::with_capacity(rows.len());
        for row in &rows {
            let id: String = row.try_get("id").map_err(PostgresError::from)?;
            let name: String = row.try_get("name").map_err(PostgresError::from)?;
            tags.insert(name, id);
        }
        Ok(tags)
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
