//! Destination store boundary
//!
//! Provides the SQL connection used for DDL and row inserts, and the search
//! index handle that is built from the same configuration.

pub mod connection;
pub mod postgres;
pub mod sqlite;
pub mod store;

pub use connection::{Database, SearchIndex, StoreUrl};
pub use postgres::PgStore;
pub use sqlite::SqliteStore;
pub use store::{quote_ident, Dialect, SqlStore};
