//! Table I/O, conversion, typing and conformed table builders

pub mod convert;
pub mod error;
pub mod parquet;
pub mod tables;
pub mod typing;

pub use convert::{StreamOptions, StreamingConverter};
pub use error::DataError;
pub use parquet::{
    parquet_column_names, parquet_shape, read_columns, read_head, read_parquet, require_column,
    write_parquet, TableShape,
};
pub use tables::{
    calendar_gold, day_ordinal, sales_long_sample, series_dim, sorted_day_columns, SERIES_COLUMNS,
};
pub use typing::{TableTypist, TypistRegistry};
