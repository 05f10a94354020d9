//! Durable progress table.
//!
//! The table is one JSON object (`id -> record`) stored under a single key.
//! It is read once per run and rewritten wholesale at every checkpoint.
//! There is no conditional write, so only one run may use a given key at a
//! time.

use tracing::{debug, info, instrument};

use crate::models::EntityTable;
use crate::storage::{Storage, StoreError};

/// Load the progress table, `Ok(None)` when it has never been written.
#[instrument(level = "info", skip(storage))]
pub async fn read_table<S: Storage>(
    storage: &S,
    key: &str,
) -> Result<Option<EntityTable>, StoreError> {
    let Some(bytes) = storage.read_object(key).await? else {
        debug!("No progress table found");
        return Ok(None);
    };
    let table: EntityTable =
        serde_json::from_slice(&bytes).map_err(|e| StoreError::Decode {
            key: key.to_string(),
            message: e.to_string(),
        })?;
    info!(entities = table.len(), "Loaded progress table");
    Ok(Some(table))
}

/// Overwrite the stored progress table with `table`.
#[instrument(level = "info", skip(storage, table), fields(entities = table.len()))]
pub async fn write_table<S: Storage>(
    storage: &S,
    key: &str,
    table: &EntityTable,
) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec(table).map_err(|e| StoreError::Encode {
        what: key.to_string(),
        message: e.to_string(),
    })?;
    storage.write_object(key, bytes).await?;
    info!("Progress table written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityRecord, MovieMetadata};
    use crate::testing::MemoryStorage;

    #[tokio::test]
    async fn test_missing_table_is_none() {
        let storage = MemoryStorage::new();
        assert!(read_table(&storage, "metadata.json").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_then_read_is_identical() {
        let storage = MemoryStorage::new();
        let mut table = EntityTable::new();
        table.insert("tt0000001".into(), EntityRecord::discovered(Some("Drama".into())));

        let mut collected = EntityRecord::discovered(None);
        let mut meta = MovieMetadata::default();
        meta.original_title = Some("Heat".into());
        meta.genres = Some(vec!["Action".into(), "Crime".into()]);
        meta.actors.insert("1".into(), "/name/nm0000199/".into());
        collected.record_metadata(meta.into_fields());
        collected.record_reviews(42);
        table.insert("tt0113277".into(), collected);

        write_table(&storage, "metadata.json", &table).await.unwrap();
        let back = read_table(&storage, "metadata.json").await.unwrap().unwrap();

        assert_eq!(back, table);
    }

    #[tokio::test]
    async fn test_corrupt_table_is_an_error() {
        let storage = MemoryStorage::new();
        storage
            .write_object("metadata.json", b"not json".to_vec())
            .await
            .unwrap();
        let err = read_table(&storage, "metadata.json").await.unwrap_err();
        assert!(matches!(err, StoreError::Decode { .. }));
    }
}
