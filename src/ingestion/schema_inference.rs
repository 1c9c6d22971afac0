//! Schema Inference - Derives a typed schema from a CSV header
//!
//! The default mode reads only the header and types every column as Text.
//! `InferenceMode::FullScan` reads the whole file once and narrows a column
//! only when every non-empty value in it agrees on the narrower type.

use crate::error::{IngestError, Result};
use crate::ingestion::csv_connector::CsvSource;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

/// Version marker attached to every source descriptor.
pub const SOURCE_VERSION: &str = "20150000";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    Text,
    Integer,
    Float,
    Boolean,
    Date,
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
    pub nullable: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub name: String,
    pub version: String,
}

/// Ordered fields plus the owning source. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    source_name: String,
    fields: Vec<Field>,
    sources: Vec<SourceDescriptor>,
}

impl Schema {
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn sources(&self) -> &[SourceDescriptor] {
        &self.sources
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InferenceMode {
    #[default]
    HeaderOnly,
    FullScan,
}

/// Per-column evidence gathered during a full scan.
#[derive(Clone, Debug)]
struct ColumnEvidence {
    saw_value: bool,
    saw_empty: bool,
    integer: bool,
    float: bool,
    boolean: bool,
    date: bool,
}

impl Default for ColumnEvidence {
    fn default() -> Self {
        Self {
            saw_value: false,
            saw_empty: false,
            integer: true,
            float: true,
            boolean: true,
            date: true,
        }
    }
}

impl ColumnEvidence {
    fn observe(&mut self, raw: &str) {
        let value = raw.trim();
        if value.is_empty() {
            self.saw_empty = true;
            return;
        }

        self.saw_value = true;
        if has_leading_zero(value) {
            self.integer = false;
            self.float = false;
        }
        if self.integer && value.parse::<i64>().is_err() {
            self.integer = false;
        }
        if self.float && !value.parse::<f64>().map(f64::is_finite).unwrap_or(false) {
            self.float = false;
        }
        if self.boolean
            && !(value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false"))
        {
            self.boolean = false;
        }
        if self.date && NaiveDate::parse_from_str(value, "%Y-%m-%d").is_err() {
            self.date = false;
        }
    }

    fn field_type(&self) -> FieldType {
        if !self.saw_value {
            FieldType::Unknown
        } else if self.integer {
            FieldType::Integer
        } else if self.float {
            FieldType::Float
        } else if self.boolean {
            FieldType::Boolean
        } else if self.date {
            FieldType::Date
        } else {
            FieldType::Text
        }
    }
}

/// Codes like ZIPs and account numbers ("00501", "-007") lose digits as numbers.
fn has_leading_zero(value: &str) -> bool {
    let digits = value.strip_prefix(&['+', '-'][..]).unwrap_or(value);
    let mut chars = digits.chars();
    chars.next() == Some('0') && chars.next().map_or(false, |c| c.is_ascii_digit())
}

/// Schema Inference Engine
pub struct SchemaInference {
    mode: InferenceMode,
}

impl SchemaInference {
    pub fn new() -> Self {
        Self::with_mode(InferenceMode::HeaderOnly)
    }

    pub fn with_mode(mode: InferenceMode) -> Self {
        Self { mode }
    }

    /// Header-only schema: one nullable Text field per name, in order.
    pub fn infer_schema(&self, field_names: &[String], source_name: &str) -> Result<Schema> {
        check_field_names(field_names)?;

        let fields = field_names
            .iter()
            .map(|name| Field {
                name: name.clone(),
                field_type: FieldType::Text,
                nullable: true,
            })
            .collect();

        Ok(build_schema(source_name, fields))
    }

    /// Infer from a source according to the configured mode.
    pub fn infer_from_source(&self, source: &CsvSource, source_name: &str) -> Result<Schema> {
        let field_names = source.field_names()?;
        info!(
            "Read {} header fields from {}",
            field_names.len(),
            source.path().display()
        );

        match self.mode {
            InferenceMode::HeaderOnly => self.infer_schema(&field_names, source_name),
            InferenceMode::FullScan => self.scan(source, &field_names, source_name),
        }
    }

    fn scan(&self, source: &CsvSource, field_names: &[String], source_name: &str) -> Result<Schema> {
        check_field_names(field_names)?;

        let mut evidence = vec![ColumnEvidence::default(); field_names.len()];
        let mut scanned = 0u64;
        for row in source.rows()? {
            let row = row?;
            for (column, value) in evidence.iter_mut().zip(row.values.iter()) {
                column.observe(value);
            }
            scanned += 1;
        }
        debug!("Scanned {} records for type inference", scanned);

        let fields = field_names
            .iter()
            .zip(evidence.iter())
            .map(|(name, column)| Field {
                name: name.clone(),
                field_type: column.field_type(),
                nullable: column.saw_empty || !column.saw_value,
            })
            .collect();

        Ok(build_schema(source_name, fields))
    }
}

impl Default for SchemaInference {
    fn default() -> Self {
        Self::new()
    }
}

fn build_schema(source_name: &str, fields: Vec<Field>) -> Schema {
    Schema {
        source_name: source_name.to_string(),
        fields,
        sources: vec![SourceDescriptor {
            name: source_name.to_string(),
            version: SOURCE_VERSION.to_string(),
        }],
    }
}

fn check_field_names(field_names: &[String]) -> Result<()> {
    if field_names.is_empty() {
        return Err(IngestError::Schema("header row has no columns".to_string()));
    }

    let mut seen = HashSet::new();
    for (position, name) in field_names.iter().enumerate() {
        if name.is_empty() {
            return Err(IngestError::Schema(format!(
                "header column {} has an empty name",
                position + 1
            )));
        }
        if !seen.insert(name.as_str()) {
            return Err(IngestError::Schema(format!("duplicate column name: {}", name)));
        }
    }

    Ok(())
}
