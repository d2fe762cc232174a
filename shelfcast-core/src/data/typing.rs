//! Per-table typing rules applied when promoting bronze tables to silver.
//!
//! Each logical table has a [`TableTypist`]; the [`TypistRegistry`] looks the
//! rule up by table name and falls back to identity for unregistered names.
//! Typists only narrow or cast columns: row count and values are preserved,
//! and a value that does not fit its narrowed width is a [`DataError::Cast`].

use super::error::DataError;
use polars::prelude::*;
use std::collections::BTreeMap;

/// A typing rule for one logical table.
pub trait TableTypist: Send + Sync {
    /// Logical table name this rule is registered under (e.g. `calendar`).
    fn table(&self) -> &str;

    fn apply(&self, df: DataFrame) -> Result<DataFrame, DataError>;
}

/// Leaves every column as it is.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTypist;

impl TableTypist for IdentityTypist {
    fn table(&self) -> &str {
        "*"
    }

    fn apply(&self, df: DataFrame) -> Result<DataFrame, DataError> {
        Ok(df)
    }
}

/// `date` → Date, `wm_yr_wk` → i32, `wday`/`month`/`year` → i16, `snap_*` → i8.
#[derive(Debug, Clone, Copy, Default)]
pub struct CalendarTypist;

impl TableTypist for CalendarTypist {
    fn table(&self) -> &str {
        "calendar"
    }

    fn apply(&self, mut df: DataFrame) -> Result<DataFrame, DataError> {
        parse_date_column(&mut df, "date")?;
        cast_if_present(&mut df, "wm_yr_wk", &DataType::Int32)?;
        for name in ["wday", "month", "year"] {
            cast_if_present(&mut df, name, &DataType::Int16)?;
        }
        cast_matching(&mut df, |c| c.starts_with("snap_"), &DataType::Int8)?;
        Ok(df)
    }
}

/// `wm_yr_wk` → i32, `sell_price` → f32.
#[derive(Debug, Clone, Copy, Default)]
pub struct SellPricesTypist;

impl TableTypist for SellPricesTypist {
    fn table(&self) -> &str {
        "sell_prices"
    }

    fn apply(&self, mut df: DataFrame) -> Result<DataFrame, DataError> {
        cast_if_present(&mut df, "wm_yr_wk", &DataType::Int32)?;
        cast_if_present(&mut df, "sell_price", &DataType::Float32)?;
        Ok(df)
    }
}

/// Every `d_<n>` day column → i32. Shared by both wide sales tables.
#[derive(Debug, Clone)]
pub struct SalesWideTypist {
    table: String,
}

impl SalesWideTypist {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }
}

impl TableTypist for SalesWideTypist {
    fn table(&self) -> &str {
        &self.table
    }

    fn apply(&self, mut df: DataFrame) -> Result<DataFrame, DataError> {
        cast_matching(&mut df, |c| c.starts_with("d_"), &DataType::Int32)?;
        Ok(df)
    }
}

/// Forecast columns `F1..F28` → f32.
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleSubmissionTypist;

impl TableTypist for SampleSubmissionTypist {
    fn table(&self) -> &str {
        "sample_submission"
    }

    fn apply(&self, mut df: DataFrame) -> Result<DataFrame, DataError> {
        cast_matching(&mut df, |c| c.starts_with('F'), &DataType::Float32)?;
        Ok(df)
    }
}

/// Lookup of typing rules by logical table name.
pub struct TypistRegistry {
    rules: BTreeMap<String, Box<dyn TableTypist>>,
    identity: IdentityTypist,
}

impl Default for TypistRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypistRegistry {
    /// An empty registry: every table passes through unchanged.
    pub fn new() -> Self {
        Self {
            rules: BTreeMap::new(),
            identity: IdentityTypist,
        }
    }

    /// Rules for the five M5 raw tables.
    pub fn m5() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(CalendarTypist));
        registry.register(Box::new(SellPricesTypist));
        registry.register(Box::new(SalesWideTypist::new("sales_train_validation")));
        registry.register(Box::new(SalesWideTypist::new("sales_train_evaluation")));
        registry.register(Box::new(SampleSubmissionTypist));
        registry
    }

    /// Register a rule, replacing any existing rule for the same table.
    pub fn register(&mut self, typist: Box<dyn TableTypist>) {
        self.rules.insert(typist.table().to_string(), typist);
    }

    pub fn get(&self, table: &str) -> &dyn TableTypist {
        match self.rules.get(table) {
            Some(rule) => rule.as_ref(),
            None => &self.identity,
        }
    }

    pub fn is_registered(&self, table: &str) -> bool {
        self.rules.contains_key(table)
    }

    pub fn apply(&self, table: &str, df: DataFrame) -> Result<DataFrame, DataError> {
        self.get(table).apply(df)
    }
}

// ── Cast helpers ────────────────────────────────────────────────────

fn cast_column(df: &mut DataFrame, name: &str, dtype: &DataType) -> Result<(), DataError> {
    let column = df.column(name)?;
    if column.dtype() == dtype {
        return Ok(());
    }
    let cast = column
        .as_materialized_series()
        .strict_cast(dtype)
        .map_err(|e| DataError::Cast {
            column: name.to_string(),
            reason: e.to_string(),
        })?;
    df.with_column(cast)?;
    Ok(())
}

fn cast_if_present(df: &mut DataFrame, name: &str, dtype: &DataType) -> Result<(), DataError> {
    if df.get_column_index(name).is_some() {
        cast_column(df, name, dtype)?;
    }
    Ok(())
}

fn cast_matching<F>(df: &mut DataFrame, pred: F, dtype: &DataType) -> Result<(), DataError>
where
    F: Fn(&str) -> bool,
{
    let names: Vec<String> = df
        .get_column_names()
        .into_iter()
        .filter(|n| pred(n.as_str()))
        .map(|n| n.to_string())
        .collect();
    for name in names {
        cast_column(df, &name, dtype)?;
    }
    Ok(())
}

/// Parse an ISO `YYYY-MM-DD` string column into a Date column in place.
fn parse_date_column(df: &mut DataFrame, name: &str) -> Result<(), DataError> {
    let Some(idx) = df.get_column_index(name) else {
        return Ok(());
    };
    let column = &df.get_columns()[idx];
    if column.dtype() == &DataType::Date {
        return Ok(());
    }

    let strings = column.str().map_err(|e| DataError::Cast {
        column: name.to_string(),
        reason: format!("expected text dates: {e}"),
    })?;

    let parsed = strings
        .as_date(Some("%Y-%m-%d"), false)
        .map_err(|e| DataError::Cast {
            column: name.to_string(),
            reason: e.to_string(),
        })?;
    // Unparseable text comes back as null rather than an error.
    if parsed.null_count() > strings.null_count() {
        return Err(DataError::Cast {
            column: name.to_string(),
            reason: format!(
                "{} value(s) are not YYYY-MM-DD dates",
                parsed.null_count() - strings.null_count()
            ),
        });
    }
    let parsed = parsed.into_series().with_name(name.into());
    df.with_column(parsed)?;
    Ok(())
}
