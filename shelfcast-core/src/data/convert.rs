//! Streaming CSV → Parquet conversion.
//!
//! The source is read through polars' batched CSV reader, one block at a
//! time, and each block is appended to a batched Parquet writer. The writer
//! is opened lazily on the first block, so column types are inferred from the
//! first block of data rather than declared up front. A later block whose
//! values no longer parse as the inferred types is a [`DataError::SchemaDrift`].
//!
//! A block holds roughly `block_size` bytes of source text. A failed
//! conversion removes its partial output so no footerless file is left behind.

use super::error::DataError;
use super::parquet::write_parquet;
use polars::prelude::*;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, warn};

/// Reader settings for [`StreamingConverter`].
#[derive(Debug, Clone, Copy)]
pub struct StreamOptions {
    /// Approximate bytes of source text per batch.
    pub block_size: usize,
    pub delimiter: u8,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            block_size: 1 << 20,
            delimiter: b',',
        }
    }
}

/// Converts delimited text tables into Parquet, one bounded batch at a time.
#[derive(Debug, Clone, Default)]
pub struct StreamingConverter {
    options: StreamOptions,
}

impl StreamingConverter {
    pub fn new(options: StreamOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> StreamOptions {
        self.options
    }

    /// Stream `source` into `dest`, returning the number of data rows written.
    pub fn convert(&self, source: &Path, dest: &Path) -> Result<usize, DataError> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| DataError::io(parent, e))?;
        }
        let result = self.stream(source, dest);
        if result.is_err() && dest.exists() {
            if let Err(e) = fs::remove_file(dest) {
                warn!(dest = %dest.display(), error = %e, "could not remove partial output");
            }
        }
        result
    }

    /// Rows per batch, sized from the header line so a block stays near
    /// `block_size` bytes. Day columns are wider in the header than in the
    /// data, so this errs towards smaller blocks.
    fn rows_per_batch(&self, source: &Path) -> Result<usize, DataError> {
        let file = File::open(source).map_err(|e| DataError::io(source, e))?;
        let mut header = String::new();
        BufReader::new(file)
            .read_line(&mut header)
            .map_err(|e| DataError::io(source, e))?;
        Ok((self.options.block_size / header.len().max(1)).max(1))
    }

    fn reader(&self, source: &Path, rows: usize) -> Result<CsvReader<File>, DataError> {
        let delimiter = self.options.delimiter;
        CsvReadOptions::default()
            .with_has_header(true)
            .with_chunk_size(rows)
            .with_infer_schema_length(Some(rows))
            .map_parse_options(|p| p.with_separator(delimiter))
            .try_into_reader_with_file_path(Some(source.to_path_buf()))
            .map_err(|e| DataError::Csv(format!("open {}: {e}", source.display())))
    }

    fn stream(&self, source: &Path, dest: &Path) -> Result<usize, DataError> {
        let rows_per_batch = self.rows_per_batch(source)?;
        let mut reader = self.reader(source, rows_per_batch)?;
        let mut batched = reader
            .batched_borrowed()
            .map_err(|e| DataError::Csv(format!("{}: {e}", source.display())))?;

        let mut writer = None;
        let mut rows = 0usize;
        let mut batches = 0usize;

        loop {
            let next = batched.next_batches(1).map_err(|e| match e {
                PolarsError::ComputeError(reason) => DataError::SchemaDrift {
                    batch: batches,
                    first_row: rows + 1,
                    reason: reason.to_string(),
                },
                other => DataError::Csv(format!("{}: {other}", source.display())),
            })?;
            let Some(frames) = next else { break };

            for df in frames {
                if writer.is_none() {
                    let file = File::create(dest).map_err(|e| DataError::io(dest, e))?;
                    let opened = ParquetWriter::new(file)
                        .with_compression(ParquetCompression::Snappy)
                        .batched(&df.schema())
                        .map_err(|e| DataError::Parquet(format!("open writer: {e}")))?;
                    writer = Some(opened);
                }
                if let Some(w) = writer.as_mut() {
                    w.write_batch(&df)
                        .map_err(|e| DataError::Parquet(format!("write batch: {e}")))?;
                }
                rows += df.height();
                batches += 1;
            }
        }

        match writer.as_mut() {
            Some(w) => {
                w.finish()
                    .map_err(|e| DataError::Parquet(format!("close writer: {e}")))?;
            }
            None => {
                // Header-only source: keep the column layout, no rows.
                let mut empty = self
                    .reader(source, rows_per_batch)?
                    .finish()
                    .map_err(|e| DataError::Csv(format!("{}: {e}", source.display())))?;
                write_parquet(&mut empty, dest)?;
            }
        }

        debug!(
            source = %source.display(),
            rows,
            batches,
            rows_per_batch,
            "streamed csv to parquet"
        );
        Ok(rows)
    }
}
