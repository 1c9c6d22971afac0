//! Load a CSV file into a relational table.
//!
//! The pipeline infers a schema from the file header, provisions a fresh
//! table and index for the named source, streams the rows in, and drops the
//! transient revision table once the load has completed.

pub mod config;
pub mod db;
pub mod error;
pub mod ingestion;

pub use config::Config;
pub use error::{IngestError, Result};
