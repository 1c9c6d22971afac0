use thiserror::Error;

use crate::ingestion::orchestrator::RunState;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error at record {record}: {message}")]
    Parse { record: u64, message: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid run transition: {from:?} -> {to:?}")]
    InvalidTransition { from: RunState, to: RunState },
}

impl From<sqlx::Error> for IngestError {
    fn from(err: sqlx::Error) -> Self {
        IngestError::Storage(err.to_string())
    }
}

impl From<rusqlite::Error> for IngestError {
    fn from(err: rusqlite::Error) -> Self {
        IngestError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
