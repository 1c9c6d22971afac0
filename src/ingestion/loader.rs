//! Bulk Loader - Streams rows into the destination table
//!
//! Every row is tagged with the identity and sync tags and recorded in the
//! revision table. Inserts run in autocommit mode: rows written before a
//! failure stay written, and the revision table is left for inspection.

use crate::db::SqlStore;
use crate::error::{IngestError, Result};
use crate::ingestion::csv_connector::Row;
use crate::ingestion::table_builder::{Mapping, TableBuilder};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

pub const CREATE_ACTION: &str = "CREATE";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadSummary {
    pub rows_loaded: u64,
    pub revisions_recorded: u64,
}

pub struct BulkLoader {
    builder: TableBuilder,
    progress_interval: u64,
}

impl BulkLoader {
    pub fn new(progress_interval: u64) -> Self {
        Self {
            builder: TableBuilder::new(),
            progress_interval,
        }
    }

    /// Stable row id: the same source and record position always map to the same id.
    pub fn row_id(table_name: &str, record: u64) -> String {
        Uuid::new_v5(
            &Uuid::NAMESPACE_OID,
            format!("{}:{}", table_name, record).as_bytes(),
        )
        .to_string()
    }

    pub async fn load<I>(
        &self,
        store: &mut dyn SqlStore,
        rows: I,
        mapping: &Mapping,
        identity_tags: &[String],
        sync_tag: &str,
    ) -> Result<LoadSummary>
    where
        I: IntoIterator<Item = Result<Row>>,
    {
        let dialect = store.dialect();
        let insert_sql = self.builder.insert_sql(mapping, dialect);
        let revision_sql = self.builder.revision_insert_sql(mapping, dialect);
        let source_tag = identity_tags.join(",");
        debug!("Row insert: {}", insert_sql);

        store.execute(&self.builder.revision_table_ddl(mapping)).await?;

        let mut summary = LoadSummary::default();
        for row in rows {
            let row = row?;
            if row.values.len() != mapping.columns.len() {
                return Err(IngestError::Parse {
                    record: row.record,
                    message: format!(
                        "expected {} fields, found {}",
                        mapping.columns.len(),
                        row.values.len()
                    ),
                });
            }

            let row_id = Self::row_id(&mapping.table_name, row.record);
            let mut params: Vec<Option<String>> = mapping
                .columns
                .iter()
                .zip(row.values.iter())
                .map(|(column, raw)| column.bind_value(raw))
                .collect();
            params.push(Some(row_id.clone()));
            params.push(Some(source_tag.clone()));
            params.push(Some(sync_tag.to_string()));

            store.execute_with(&insert_sql, &params).await.map_err(|e| {
                IngestError::Storage(format!("record {}: {}", row.record, e))
            })?;
            summary.rows_loaded += 1;

            let revision = [
                Some(row_id),
                Some("1".to_string()),
                Some(CREATE_ACTION.to_string()),
                Some(source_tag.clone()),
                Some(sync_tag.to_string()),
                Some(Utc::now().to_rfc3339()),
            ];
            store.execute_with(&revision_sql, &revision).await?;
            summary.revisions_recorded += 1;

            if self.progress_interval > 0 && summary.rows_loaded % self.progress_interval == 0 {
                info!("Loaded {} rows into {}", summary.rows_loaded, mapping.table_name);
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::ingestion::provisioner::TableProvisioner;
    use crate::ingestion::schema_inference::{FieldType, SchemaInference};
    use crate::ingestion::table_builder::StorageType;

    fn row(record: u64, values: &[&str]) -> Result<Row> {
        Ok(Row {
            record,
            values: values.iter().map(|v| v.to_string()).collect(),
        })
    }

    async fn provisioned(columns: &[&str]) -> (SqliteStore, Mapping) {
        let names: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        let schema = SchemaInference::new().infer_schema(&names, "users").unwrap();
        let mapping = TableBuilder::new().to_mapping(&schema).unwrap();
        let mut store = SqliteStore::open_in_memory().unwrap();
        TableProvisioner::new(true).provision(&mut store, &mapping).await.unwrap();
        (store, mapping)
    }

    #[tokio::test]
    async fn test_load_inserts_every_row_with_tags() {
        let (mut store, mapping) = provisioned(&["id", "name"]).await;
        let rows = vec![row(1, &["1", "Ann"]), row(2, &["2", "Bob"]), row(3, &["3", ""])];

        let summary = BulkLoader::new(0)
            .load(&mut store, rows, &mapping, &["users".to_string()], "sync")
            .await
            .unwrap();

        assert_eq!(summary, LoadSummary { rows_loaded: 3, revisions_recorded: 3 });
        assert_eq!(store.count_rows("users").await.unwrap(), 3);
        assert_eq!(store.count_rows("users_revisions").await.unwrap(), 3);

        let tagged: i64 = store
            .connection()
            .query_row(
                "SELECT COUNT(*) FROM users WHERE bloom_source = 'users' AND bloom_sync = 'sync'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(tagged, 3);

        let (name, id): (String, String) = store
            .connection()
            .query_row("SELECT name, bloom_id FROM users WHERE id = '2'", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert_eq!(name, "Bob");
        assert_eq!(id, BulkLoader::row_id("users", 2));
    }

    #[tokio::test]
    async fn test_load_stops_at_bad_row_and_keeps_earlier_rows() {
        let (mut store, mapping) = provisioned(&["a", "b"]).await;
        let rows = vec![
            row(1, &["1", "2"]),
            row(2, &["3", "4"]),
            Err(IngestError::Parse {
                record: 3,
                message: "expected 2 fields, found 1".to_string(),
            }),
            row(4, &["7", "8"]),
        ];

        let err = BulkLoader::new(0)
            .load(&mut store, rows, &mapping, &["users".to_string()], "sync")
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::Parse { record: 3, .. }));
        assert_eq!(store.count_rows("users").await.unwrap(), 2);
        assert!(store.table_exists("users_revisions").await.unwrap());
    }

    #[tokio::test]
    async fn test_load_rejects_misaligned_row() {
        let (mut store, mapping) = provisioned(&["a", "b"]).await;
        let err = BulkLoader::new(0)
            .load(&mut store, vec![row(1, &["only"])], &mapping, &[], "sync")
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Parse { record: 1, .. }));
    }

    #[tokio::test]
    async fn test_typed_columns_bind_nulls() {
        let names = vec!["n".to_string()];
        let schema = SchemaInference::new().infer_schema(&names, "nums").unwrap();
        let mut mapping = TableBuilder::new().to_mapping(&schema).unwrap();
        mapping.columns[0].field_type = FieldType::Integer;
        mapping.columns[0].storage_type = StorageType::BigInt;

        let mut store = SqliteStore::open_in_memory().unwrap();
        TableProvisioner::new(true).provision(&mut store, &mapping).await.unwrap();
        BulkLoader::new(0)
            .load(&mut store, vec![row(1, &["7"]), row(2, &[""])], &mapping, &[], "sync")
            .await
            .unwrap();

        let (total, nulls): (i64, i64) = store
            .connection()
            .query_row("SELECT SUM(n), COUNT(*) - COUNT(n) FROM nums", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert_eq!((total, nulls), (7, 1));
    }

    #[test]
    fn test_row_id_is_stable() {
        assert_eq!(BulkLoader::row_id("users", 1), BulkLoader::row_id("users", 1));
        assert_ne!(BulkLoader::row_id("users", 1), BulkLoader::row_id("users", 2));
        assert_ne!(BulkLoader::row_id("users", 1), BulkLoader::row_id("orders", 1));
    }
}
