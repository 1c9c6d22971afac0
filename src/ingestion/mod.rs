//! Ingestion Module - CSV file into a relational table
//!
//! Handles one file per run with:
//! - Schema inference from the header (optionally a full type scan)
//! - Table and index provisioning
//! - Streaming row load with revision tracking
//! - Revision cleanup once the load completes

pub mod csv_connector;
pub mod loader;
pub mod orchestrator;
pub mod provisioner;
pub mod schema_inference;
pub mod table_builder;

pub use csv_connector::{CsvRows, CsvSource, Row};
pub use loader::{BulkLoader, LoadSummary};
pub use orchestrator::{IngestionOptions, IngestionOrchestrator, IngestionRun, RunState};
pub use provisioner::TableProvisioner;
pub use schema_inference::{
    Field, FieldType, InferenceMode, Schema, SchemaInference, SourceDescriptor,
};
pub use table_builder::{Mapping, MappedColumn, StorageType, TableBuilder};

use serde::{Deserialize, Serialize};

/// Ingestion result
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngestionReport {
    /// Ingestion run ID
    pub run_id: String,

    pub source_name: String,

    /// Destination table
    pub table_name: String,

    /// User columns in table order
    pub columns: Vec<String>,

    /// Number of records ingested
    pub rows_loaded: u64,
}
