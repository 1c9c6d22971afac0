//! Table Provisioner - Replaces the destination table for a source
//!
//! Steps, in order, each fatal on failure:
//! 1. drop the source table
//! 2. drop the revision table
//! 3. create the source table
//! 4. create the index
//!
//! With `atomic` set the four steps share one transaction, so a failure leaves
//! whatever table existed before untouched. Without it every step commits on
//! its own.

use crate::db::SqlStore;
use crate::error::Result;
use crate::ingestion::table_builder::{check_statement, Mapping, TableBuilder};
use tracing::{debug, error, info};

pub struct TableProvisioner {
    builder: TableBuilder,
    atomic: bool,
}

impl TableProvisioner {
    pub fn new(atomic: bool) -> Self {
        Self {
            builder: TableBuilder::new(),
            atomic,
        }
    }

    pub fn statements(&self, mapping: &Mapping) -> Vec<String> {
        vec![
            self.builder.drop_table_sql(&mapping.table_name),
            self.builder.drop_table_sql(&mapping.revision_table_name),
            self.builder.table_ddl(mapping),
            self.builder.index_ddl(mapping),
        ]
    }

    pub async fn provision(&self, store: &mut dyn SqlStore, mapping: &Mapping) -> Result<()> {
        let statements = self.statements(mapping);
        for sql in &statements {
            check_statement(sql, store.dialect())?;
        }

        if !self.atomic {
            return run_all(store, &statements).await;
        }

        store.begin().await?;
        match run_all(store, &statements).await {
            Ok(()) => {
                store.commit().await?;
                info!("Provisioned table {}", mapping.table_name);
                Ok(())
            }
            Err(e) => {
                if let Err(rollback_err) = store.rollback().await {
                    error!("Rollback after failed provisioning also failed: {}", rollback_err);
                }
                Err(e)
            }
        }
    }
}

async fn run_all(store: &mut dyn SqlStore, statements: &[String]) -> Result<()> {
    for sql in statements {
        debug!("Executing: {}", sql);
        store.execute(sql).await.map_err(|e| {
            error!("Error executing {}", sql);
            e
        })?;
    }
    Ok(())
}
