use std::sync::Arc;

use mentors_db_postgres::PostgresStore;
use mentors_db_records::RecordsStore;
use mentors_storage::DynMentorStore;

use crate::config::{StorageBackend, StorageConfig};

/// Builds the configured backing store.
pub async fn create_store(cfg: &StorageConfig) -> anyhow::Result<DynMentorStore> {
    let store: DynMentorStore = match cfg.backend {
        StorageBackend::Records => Arc::new(RecordsStore::new(cfg.records.clone())?),
        StorageBackend::Postgres => {
            Arc::new(PostgresStore::new(cfg.postgres.to_store_config()).await?)
        }
    };
    tracing::info!(backend = store.backend_name(), "backing store ready");
    Ok(store)
}
