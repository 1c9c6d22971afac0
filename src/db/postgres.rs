//! PostgreSQL backend using sqlx

use crate::db::store::{quote_ident, Dialect, SqlStore};
use crate::error::Result;
use async_trait::async_trait;
use sqlx::{Connection, PgConnection};

/// One dedicated connection; DDL and the insert stream share it.
pub struct PgStore {
    conn: PgConnection,
}

impl PgStore {
    /// Connect and check the connection answers.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let mut conn = PgConnection::connect(database_url).await?;

        sqlx::query("SELECT 1").execute(&mut conn).await?;

        Ok(Self { conn })
    }
}

#[async_trait]
impl SqlStore for PgStore {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn execute(&mut self, sql: &str) -> Result<()> {
        sqlx::query(sql).execute(&mut self.conn).await?;
        Ok(())
    }

    async fn execute_with(&mut self, sql: &str, params: &[Option<String>]) -> Result<u64> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = query.bind(param.as_deref());
        }
        let result = query.execute(&mut self.conn).await?;
        Ok(result.rows_affected())
    }

    async fn table_exists(&mut self, table: &str) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = current_schema() AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(&mut self.conn)
        .await?;
        Ok(exists)
    }

    async fn index_names(&mut self, table: &str) -> Result<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(
            r#"
            SELECT indexname::text FROM pg_indexes
            WHERE schemaname = current_schema() AND tablename = $1
            ORDER BY indexname
            "#,
        )
        .bind(table)
        .fetch_all(&mut self.conn)
        .await?;
        Ok(names)
    }

    async fn count_rows(&mut self, table: &str) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        let count = sqlx::query_scalar::<_, i64>(&sql)
            .fetch_one(&mut self.conn)
            .await?;
        Ok(count as u64)
    }
}
