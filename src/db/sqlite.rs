//! SQLite backend using rusqlite

use crate::db::store::{quote_ident, Dialect, SqlStore};
use crate::error::Result;
use async_trait::async_trait;
use rusqlite::Connection;
use std::path::Path;

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            conn: Connection::open(path)?,
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Underlying connection, for inspection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

#[async_trait]
impl SqlStore for SqliteStore {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn execute(&mut self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    async fn execute_with(&mut self, sql: &str, params: &[Option<String>]) -> Result<u64> {
        let changed = self
            .conn
            .execute(sql, rusqlite::params_from_iter(params.iter()))?;
        Ok(changed as u64)
    }

    async fn table_exists(&mut self, table: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    async fn index_names(&mut self, table: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = ?1 ORDER BY name",
        )?;
        let names = stmt
            .query_map([table], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }

    async fn count_rows(&mut self, table: &str) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_execute_and_inspect() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.execute("CREATE TABLE \"t\" (\"a\" TEXT)").await.unwrap();
        store.execute("CREATE INDEX \"t_a_idx\" ON \"t\" (\"a\")").await.unwrap();

        let inserted = store
            .execute_with(
                "INSERT INTO \"t\" (\"a\") VALUES (?1)",
                &[Some("x".to_string())],
            )
            .await
            .unwrap();
        assert_eq!(inserted, 1);
        store
            .execute_with("INSERT INTO \"t\" (\"a\") VALUES (?1)", &[None])
            .await
            .unwrap();

        assert!(store.table_exists("t").await.unwrap());
        assert!(!store.table_exists("missing").await.unwrap());
        assert_eq!(store.index_names("t").await.unwrap(), vec!["t_a_idx"]);
        assert_eq!(store.count_rows("t").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_rollback_discards_ddl() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.begin().await.unwrap();
        store.execute("CREATE TABLE \"t\" (\"a\" TEXT)").await.unwrap();
        store.rollback().await.unwrap();

        assert!(!store.table_exists("t").await.unwrap());
    }
}
