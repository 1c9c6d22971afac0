//! Database handle built from configuration

use crate::config::Config;
use crate::db::{PgStore, SqlStore, SqliteStore};
use crate::error::{IngestError, Result};
use tracing::info;

/// Which backend a connection string points at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreUrl {
    Postgres(String),
    Sqlite(String),
}

impl StoreUrl {
    pub fn parse(url: &str) -> Result<Self> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            return Ok(StoreUrl::Postgres(url.to_string()));
        }

        if let Some(rest) = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
        {
            if rest.is_empty() {
                return Err(IngestError::Config(
                    "sqlite connection string needs a path or :memory:".to_string(),
                ));
            }
            return Ok(StoreUrl::Sqlite(rest.to_string()));
        }

        Err(IngestError::Config(format!(
            "Unsupported connection string scheme: {}",
            url
        )))
    }
}

/// Search index handle. Built alongside the SQL side; the load pipeline never
/// writes to it.
#[derive(Clone, Debug, Default)]
pub struct SearchIndex {
    hosts: Vec<String>,
}

impl SearchIndex {
    pub fn new(hosts: Vec<String>) -> Self {
        Self { hosts }
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    pub fn is_configured(&self) -> bool {
        !self.hosts.is_empty()
    }
}

pub struct Database {
    sql_conn_str: String,
    search: SearchIndex,
}

impl Database {
    pub fn from_config(config: &Config) -> Self {
        let search = SearchIndex::new(config.search_hosts.clone());
        if search.is_configured() {
            info!("Search hosts: {}", search.hosts().join(", "));
        }

        Self {
            sql_conn_str: config.sql_conn_str.clone(),
            search,
        }
    }

    /// Open the SQL connection the pipeline runs on.
    pub async fn sql_connection(&self) -> Result<Box<dyn SqlStore>> {
        match StoreUrl::parse(&self.sql_conn_str)? {
            StoreUrl::Postgres(url) => {
                info!("Connecting to PostgreSQL");
                Ok(Box::new(PgStore::connect(&url).await?))
            }
            StoreUrl::Sqlite(path) => {
                info!("Opening SQLite database {}", path);
                let store = if path == ":memory:" {
                    SqliteStore::open_in_memory()?
                } else {
                    SqliteStore::open(&path)?
                };
                Ok(Box::new(store))
            }
        }
    }

    pub fn search_index(&self) -> &SearchIndex {
        &self.search
    }
}
