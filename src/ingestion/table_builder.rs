//! Table Builder - Translates an inferred schema into storage terms
//!
//! Produces the `Mapping` the provisioner and loader share, and renders it as
//! DDL/DML text. Rendering is deterministic: the same schema always yields the
//! same statements, with user columns in header order.

use crate::db::{quote_ident, Dialect};
use crate::error::{IngestError, Result};
use crate::ingestion::schema_inference::{FieldType, Schema, SourceDescriptor};
use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlparser::dialect::{PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;

pub const REVISION_SUFFIX: &str = "_revisions";
pub const ID_COLUMN: &str = "bloom_id";
pub const SOURCE_COLUMN: &str = "bloom_source";
pub const SYNC_COLUMN: &str = "bloom_sync";

/// Leaves room for `_bloom_id_idx` within Postgres' 63-byte identifier limit.
pub const MAX_SOURCE_NAME_LEN: usize = 50;

const RESERVED_COLUMNS: [&str; 3] = [ID_COLUMN, SOURCE_COLUMN, SYNC_COLUMN];

lazy_static! {
    static ref SAFE_IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

/// Check a source name before it is used to name any table.
pub fn validate_source_name(name: &str) -> Result<()> {
    if !SAFE_IDENTIFIER.is_match(name) {
        return Err(IngestError::InvalidIdentifier(format!(
            "'{}' must start with a letter or underscore and contain only letters, digits and underscores",
            name
        )));
    }
    if name.len() > MAX_SOURCE_NAME_LEN {
        return Err(IngestError::InvalidIdentifier(format!(
            "'{}' is longer than {} characters",
            name, MAX_SOURCE_NAME_LEN
        )));
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageType {
    Text,
    BigInt,
    Double,
    Boolean,
    Date,
}

impl StorageType {
    pub fn for_field(field_type: FieldType) -> Self {
        match field_type {
            FieldType::Integer => StorageType::BigInt,
            FieldType::Float => StorageType::Double,
            FieldType::Boolean => StorageType::Boolean,
            FieldType::Date => StorageType::Date,
            FieldType::Text | FieldType::Unknown => StorageType::Text,
        }
    }

    pub fn sql_name(&self) -> &'static str {
        match self {
            StorageType::Text => "TEXT",
            StorageType::BigInt => "BIGINT",
            StorageType::Double => "DOUBLE PRECISION",
            StorageType::Boolean => "BOOLEAN",
            StorageType::Date => "DATE",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappedColumn {
    pub name: String,
    pub field_type: FieldType,
    pub storage_type: StorageType,
    pub nullable: bool,
}

impl MappedColumn {
    /// Convert a raw cell into the bound parameter for this column.
    ///
    /// Text keeps the raw value; typed columns bind empty cells as NULL.
    pub fn bind_value(&self, raw: &str) -> Option<String> {
        match self.storage_type {
            StorageType::Text => Some(raw.to_string()),
            _ => {
                let value = raw.trim();
                if value.is_empty() {
                    None
                } else if self.storage_type == StorageType::Boolean {
                    Some(if value.eq_ignore_ascii_case("true") { "1" } else { "0" }.to_string())
                } else {
                    Some(value.to_string())
                }
            }
        }
    }
}

/// Structural translation of a schema into storage terms.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    pub source: SourceDescriptor,
    pub table_name: String,
    pub revision_table_name: String,
    pub index_name: String,
    pub columns: Vec<MappedColumn>,
}

impl Mapping {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Table Builder - Converts schemas to mappings and mappings to SQL
#[derive(Clone, Debug, Default)]
pub struct TableBuilder;

impl TableBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn to_mapping(&self, schema: &Schema) -> Result<Mapping> {
        let source_name = schema.source_name();
        validate_source_name(source_name)?;

        let mut columns = Vec::with_capacity(schema.fields().len());
        for field in schema.fields() {
            if RESERVED_COLUMNS
                .iter()
                .any(|reserved| reserved.eq_ignore_ascii_case(&field.name))
            {
                return Err(IngestError::Schema(format!(
                    "column name '{}' is reserved for load bookkeeping",
                    field.name
                )));
            }
            columns.push(MappedColumn {
                name: field.name.clone(),
                field_type: field.field_type,
                storage_type: StorageType::for_field(field.field_type),
                nullable: field.nullable,
            });
        }

        let source = schema
            .sources()
            .first()
            .cloned()
            .unwrap_or_else(|| SourceDescriptor {
                name: source_name.to_string(),
                version: String::new(),
            });

        Ok(Mapping {
            source,
            table_name: source_name.to_string(),
            revision_table_name: format!("{}{}", source_name, REVISION_SUFFIX),
            index_name: format!("{}_{}_idx", source_name, ID_COLUMN),
            columns,
        })
    }

    pub fn table_ddl(&self, mapping: &Mapping) -> String {
        let user_columns = mapping.columns.iter().map(|c| {
            let null = if c.nullable { "" } else { " NOT NULL" };
            format!("{} {}{}", quote_ident(&c.name), c.storage_type.sql_name(), null)
        });
        let bookkeeping = RESERVED_COLUMNS
            .iter()
            .map(|name| format!("{} TEXT NOT NULL", quote_ident(name)));

        format!(
            "CREATE TABLE {} ({})",
            quote_ident(&mapping.table_name),
            user_columns.chain(bookkeeping).join(", ")
        )
    }

    pub fn index_ddl(&self, mapping: &Mapping) -> String {
        format!(
            "CREATE INDEX {} ON {} ({})",
            quote_ident(&mapping.index_name),
            quote_ident(&mapping.table_name),
            quote_ident(ID_COLUMN)
        )
    }

    pub fn drop_table_sql(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", quote_ident(table))
    }

    pub fn revision_table_ddl(&self, mapping: &Mapping) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({} TEXT NOT NULL, \"revision\" BIGINT NOT NULL, \
             \"bloom_action\" TEXT NOT NULL, {} TEXT NOT NULL, {} TEXT NOT NULL, \
             \"recorded_at\" TEXT NOT NULL)",
            quote_ident(&mapping.revision_table_name),
            quote_ident(ID_COLUMN),
            quote_ident(SOURCE_COLUMN),
            quote_ident(SYNC_COLUMN)
        )
    }

    /// Row insert: user columns in order, then id, source and sync tags.
    pub fn insert_sql(&self, mapping: &Mapping, dialect: Dialect) -> String {
        let names = mapping
            .column_names()
            .into_iter()
            .chain(RESERVED_COLUMNS)
            .map(quote_ident)
            .join(", ");
        let user_params = mapping
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| dialect.typed_placeholder(i + 1, c.storage_type.sql_name()));
        let tag_params = (0..RESERVED_COLUMNS.len())
            .map(|i| dialect.placeholder(mapping.columns.len() + i + 1));

        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&mapping.table_name),
            names,
            user_params.chain(tag_params).join(", ")
        )
    }

    pub fn revision_insert_sql(&self, mapping: &Mapping, dialect: Dialect) -> String {
        format!(
            "INSERT INTO {} ({}, \"revision\", \"bloom_action\", {}, {}, \"recorded_at\") \
             VALUES ({}, {}, {}, {}, {}, {})",
            quote_ident(&mapping.revision_table_name),
            quote_ident(ID_COLUMN),
            quote_ident(SOURCE_COLUMN),
            quote_ident(SYNC_COLUMN),
            dialect.placeholder(1),
            dialect.typed_placeholder(2, StorageType::BigInt.sql_name()),
            dialect.placeholder(3),
            dialect.placeholder(4),
            dialect.placeholder(5),
            dialect.placeholder(6)
        )
    }
}

/// Parse a generated statement before it is sent to the store.
pub fn check_statement(sql: &str, dialect: Dialect) -> Result<()> {
    let parsed = match dialect {
        Dialect::Postgres => Parser::parse_sql(&PostgreSqlDialect {}, sql),
        Dialect::Sqlite => Parser::parse_sql(&SQLiteDialect {}, sql),
    };
    match parsed {
        Ok(statements) if statements.len() == 1 => Ok(()),
        Ok(statements) => Err(IngestError::Schema(format!(
            "expected one statement, generated {}: {}",
            statements.len(),
            sql
        ))),
        Err(e) => Err(IngestError::Schema(format!("generated invalid SQL ({}): {}", e, sql))),
    }
}
