//! Store trait shared by the Postgres and SQLite backends

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// SQL flavor of a connected store. Only placeholders and casts differ.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    /// Positional parameter marker, 1-based.
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", index),
            Dialect::Sqlite => format!("?{}", index),
        }
    }

    /// Parameter expression for a column of the given SQL type.
    pub fn typed_placeholder(&self, index: usize, sql_type: &str) -> String {
        match self {
            Dialect::Postgres if sql_type != "TEXT" => {
                format!("CAST({} AS {})", self.placeholder(index), sql_type)
            }
            _ => self.placeholder(index),
        }
    }
}

/// Double-quote an identifier, doubling any embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// A single connection capable of executing arbitrary SQL text.
///
/// Statements run in autocommit mode unless wrapped in `begin`/`commit`.
#[async_trait]
pub trait SqlStore: Send {
    fn dialect(&self) -> Dialect;

    /// Execute one statement without parameters.
    async fn execute(&mut self, sql: &str) -> Result<()>;

    /// Execute one statement with positional text parameters (`None` binds NULL).
    async fn execute_with(&mut self, sql: &str, params: &[Option<String>]) -> Result<u64>;

    async fn table_exists(&mut self, table: &str) -> Result<bool>;

    async fn index_names(&mut self, table: &str) -> Result<Vec<String>>;

    async fn count_rows(&mut self, table: &str) -> Result<u64>;

    async fn begin(&mut self) -> Result<()> {
        self.execute("BEGIN").await
    }

    async fn commit(&mut self) -> Result<()> {
        self.execute("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.execute("ROLLBACK").await
    }
}
