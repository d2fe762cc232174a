//! Parquet I/O helpers.
//!
//! Thin wrappers over Polars readers/writers that map errors into
//! [`DataError`] with the offending path attached.

use super::error::DataError;
use polars::prelude::*;
use std::fs::{self, File};
use std::path::Path;

/// Row and column counts of a stored table, read from Parquet metadata only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableShape {
    pub rows: usize,
    pub columns: usize,
}

fn open(path: &Path) -> Result<File, DataError> {
    File::open(path).map_err(|e| DataError::io(path, e))
}

/// Read a whole Parquet file into memory.
pub fn read_parquet(path: &Path) -> Result<DataFrame, DataError> {
    ParquetReader::new(open(path)?)
        .finish()
        .map_err(|e| DataError::Parquet(format!("read {}: {e}", path.display())))
}

/// Read only the named columns of a Parquet file.
pub fn read_columns(path: &Path, columns: &[&str]) -> Result<DataFrame, DataError> {
    let projection: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
    ParquetReader::new(open(path)?)
        .with_columns(Some(projection))
        .finish()
        .map_err(|e| DataError::Parquet(format!("read {}: {e}", path.display())))
}

/// Read the first `n` rows of the named columns without materialising the rest.
pub fn read_head(path: &Path, columns: &[String], n: usize) -> Result<DataFrame, DataError> {
    let exprs: Vec<Expr> = columns.iter().map(|c| col(c.as_str())).collect();
    LazyFrame::scan_parquet(path, ScanArgsParquet::default())
        .map_err(|e| DataError::Parquet(format!("scan {}: {e}", path.display())))?
        .select(exprs)
        .limit(n as IdxSize)
        .collect()
        .map_err(|e| DataError::Parquet(format!("read {}: {e}", path.display())))
}

/// Write a DataFrame to `path` (snappy), creating parent directories.
///
/// Overwrites in place; no temp-file/rename step.
pub fn write_parquet(df: &mut DataFrame, path: &Path) -> Result<(), DataError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| DataError::io(parent, e))?;
    }
    let file = File::create(path).map_err(|e| DataError::io(path, e))?;
    ParquetWriter::new(file)
        .with_compression(ParquetCompression::Snappy)
        .finish(df)
        .map_err(|e| DataError::Parquet(format!("write {}: {e}", path.display())))?;
    Ok(())
}

/// Shape of a stored table without decoding any column data.
pub fn parquet_shape(path: &Path) -> Result<TableShape, DataError> {
    let mut reader = ParquetReader::new(open(path)?);
    let rows = reader
        .num_rows()
        .map_err(|e| DataError::Parquet(format!("metadata {}: {e}", path.display())))?;
    let columns = reader
        .schema()
        .map_err(|e| DataError::Parquet(format!("schema {}: {e}", path.display())))?
        .len();
    Ok(TableShape { rows, columns })
}

/// Column names of a stored table, in file order.
pub fn parquet_column_names(path: &Path) -> Result<Vec<String>, DataError> {
    let mut reader = ParquetReader::new(open(path)?);
    let schema = reader
        .schema()
        .map_err(|e| DataError::Parquet(format!("schema {}: {e}", path.display())))?;
    Ok(schema.iter_names().map(|n| n.to_string()).collect())
}

/// Fetch a column, reporting the table name when it is absent.
pub fn require_column<'a>(
    df: &'a DataFrame,
    table: &str,
    name: &str,
) -> Result<&'a Column, DataError> {
    df.column(name)
        .map_err(|_| DataError::missing_column(table, name))
}
