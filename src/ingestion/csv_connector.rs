//! CSV Connector - Streams a comma-separated file with a header row

use crate::error::{IngestError, Result};
use csv::{ReaderBuilder, StringRecord};
use std::fs::File;
use std::path::{Path, PathBuf};

/// One data record, positionally aligned to the header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Row {
    /// 1-based data record index (the header is record 0).
    pub record: u64,
    pub values: Vec<String>,
}

/// CSV file source. Every call opens the file afresh, so the header read and
/// the row stream never share a cursor.
#[derive(Clone, Debug)]
pub struct CsvSource {
    path: PathBuf,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_reader(&self) -> Result<csv::Reader<File>> {
        let file = File::open(&self.path).map_err(|e| {
            IngestError::Io(std::io::Error::new(
                e.kind(),
                format!("{}: {}", self.path.display(), e),
            ))
        })?;

        Ok(ReaderBuilder::new().has_headers(true).from_reader(file))
    }

    /// Header fields, trimmed, in file order.
    pub fn field_names(&self) -> Result<Vec<String>> {
        let mut reader = self.open_reader()?;
        let headers = reader.headers().map_err(|e| csv_error(e, 0))?;

        Ok(headers.iter().map(|h| h.trim().to_string()).collect())
    }

    /// Lazy, single-pass stream of data records. The header is never yielded.
    pub fn rows(&self) -> Result<CsvRows> {
        let mut reader = self.open_reader()?;
        reader.headers().map_err(|e| csv_error(e, 0))?;

        Ok(CsvRows {
            reader,
            buffer: StringRecord::new(),
            last_record: 0,
            finished: false,
        })
    }
}

/// Row stream over an open file. The file is closed when the stream is dropped.
pub struct CsvRows {
    reader: csv::Reader<File>,
    buffer: StringRecord,
    last_record: u64,
    finished: bool,
}

impl CsvRows {
    /// Index of the last record successfully produced.
    pub fn records_read(&self) -> u64 {
        self.last_record
    }
}

impl Iterator for CsvRows {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let record = self.last_record + 1;
        match self.reader.read_record(&mut self.buffer) {
            Ok(true) => {
                self.last_record = record;
                Some(Ok(Row {
                    record,
                    values: self.buffer.iter().map(str::to_string).collect(),
                }))
            }
            Ok(false) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(csv_error(e, record)))
            }
        }
    }
}

fn csv_error(err: csv::Error, record: u64) -> IngestError {
    match err.into_kind() {
        csv::ErrorKind::Io(e) => IngestError::Io(e),
        csv::ErrorKind::UnequalLengths { expected_len, len, .. } => IngestError::Parse {
            record,
            message: format!("expected {} fields, found {}", expected_len, len),
        },
        csv::ErrorKind::Utf8 { err, .. } => IngestError::Parse {
            record,
            message: format!("invalid UTF-8: {}", err),
        },
        other => IngestError::Parse {
            record,
            message: format!("{:?}", other),
        },
    }
}
