//! Structured error type for table I/O and transformation.
//!
//! Every variant renders a one-line message suitable for a report's `notes.error`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error: {0}")]
    Csv(String),

    #[error("parquet I/O error: {0}")]
    Parquet(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("missing column '{column}' in {table}")]
    MissingColumn { table: String, column: String },

    #[error("schema drift in batch {batch} (from row {first_row}): {reason}")]
    SchemaDrift {
        batch: usize,
        first_row: usize,
        reason: String,
    },

    #[error("cast of column '{column}' failed: {reason}")]
    Cast { column: String, reason: String },

    #[error("validation error: {0}")]
    Validation(String),
}

impl DataError {
    pub fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }

    pub fn missing_column(table: &str, column: &str) -> Self {
        Self::MissingColumn {
            table: table.to_string(),
            column: column.to_string(),
        }
    }
}

impl From<polars::prelude::PolarsError> for DataError {
    fn from(e: polars::prelude::PolarsError) -> Self {
        Self::Parquet(e.to_string())
    }
}
