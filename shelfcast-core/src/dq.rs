//! Data-quality gates over gold tables and the feature table.
//!
//! A gate never aborts: every check that can run is recorded as
//! pass/warn/fail, and a check that cannot be evaluated is recorded as `warn`
//! carrying the error text. The gate status is the worst check status.

use crate::data::{parquet_shape, read_columns, read_parquet, require_column, DataError};
use crate::features::{test_mask, ENGINEERED_COLUMNS, REQUIRED_FEATURE_COLUMNS};
use crate::hashing::sha256_file;
use crate::status::{CheckStatus, DqStatus};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Gold tables checked by [`gold_gate`], with whether each is required.
pub const GOLD_FILES: [(&str, bool); 4] = [
    ("dim_calendar.parquet", true),
    ("dim_series.parquet", true),
    ("fact_sell_prices.parquet", true),
    ("fact_sales_long_sample.parquet", false),
];

/// One named check and its evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DqCheck {
    pub name: String,
    pub status: CheckStatus,
    pub details: Value,
}

impl DqCheck {
    pub fn new(name: impl Into<String>, status: CheckStatus, details: Value) -> Self {
        Self {
            name: name.into(),
            status,
            details,
        }
    }

    /// `pass` when `ok`, otherwise `on_failure`.
    pub fn expect(name: impl Into<String>, ok: bool, on_failure: CheckStatus, details: Value) -> Self {
        let status = if ok { CheckStatus::Pass } else { on_failure };
        Self::new(name, status, details)
    }

    /// A check that could not be evaluated.
    pub fn unevaluated(name: impl Into<String>, err: &DataError) -> Self {
        Self::new(name, CheckStatus::Warn, json!({ "error": err.to_string() }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilePresence {
    Ok,
    Missing,
}

/// Checks and fingerprint of one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DqFileReport {
    pub name: String,
    pub status: FilePresence,
    pub path: String,
    pub rows: Option<usize>,
    pub columns: Option<usize>,
    pub bytes: Option<u64>,
    pub sha256: Option<String>,
    pub checks: Vec<DqCheck>,
}

impl DqFileReport {
    fn missing(name: &str, path: &Path, required: bool) -> Self {
        let status = if required {
            CheckStatus::Fail
        } else {
            CheckStatus::Warn
        };
        Self {
            name: name.to_string(),
            status: FilePresence::Missing,
            path: path.display().to_string(),
            rows: None,
            columns: None,
            bytes: None,
            sha256: None,
            checks: vec![DqCheck::new(
                "exists",
                status,
                json!({ "required": required }),
            )],
        }
    }

    /// Fingerprint a present file. Unreadable metadata becomes a warn check.
    fn present(name: &str, path: &Path) -> Self {
        let mut report = Self {
            name: name.to_string(),
            status: FilePresence::Ok,
            path: path.display().to_string(),
            rows: None,
            columns: None,
            bytes: None,
            sha256: None,
            checks: Vec::new(),
        };
        match parquet_shape(path) {
            Ok(shape) => {
                report.rows = Some(shape.rows);
                report.columns = Some(shape.columns);
            }
            Err(e) => report.checks.push(DqCheck::unevaluated("readable", &e)),
        }
        report.bytes = std::fs::metadata(path).ok().map(|m| m.len());
        report.sha256 = sha256_file(path).ok();
        report
    }
}

/// Result of one gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateResult {
    pub status: DqStatus,
    pub files: Vec<DqFileReport>,
    /// `<file>: <check>` for every failed check.
    pub failures: Vec<String>,
}

impl GateResult {
    fn from_files(files: Vec<DqFileReport>) -> Self {
        let status = DqStatus::from_checks(files.iter().flat_map(|f| f.checks.iter().map(|c| &c.status)));
        let failures = files
            .iter()
            .flat_map(|f| {
                f.checks
                    .iter()
                    .filter(|c| c.status == CheckStatus::Fail)
                    .map(move |c| format!("{}: {}", f.name, c.name))
            })
            .collect();
        Self {
            status,
            files,
            failures,
        }
    }
}

// ── Gold gate ───────────────────────────────────────────────────────

/// Validate the gold tables in `gold_dir`.
pub fn gold_gate(gold_dir: &Path) -> GateResult {
    // Keys for referential checks on the sample; unreadable dims skip those checks.
    let series_ids = key_set(&gold_dir.join("dim_series.parquet"), "id").ok();
    let calendar_days = key_set(&gold_dir.join("dim_calendar.parquet"), "d").ok();

    let mut files = Vec::with_capacity(GOLD_FILES.len());
    for (name, required) in GOLD_FILES {
        let path = gold_dir.join(name);
        if !path.exists() {
            files.push(DqFileReport::missing(name, &path, required));
            continue;
        }

        let mut report = DqFileReport::present(name, &path);
        if let Some(rows) = report.rows {
            report.checks.push(DqCheck::expect(
                "non_empty",
                rows > 0,
                CheckStatus::Fail,
                json!({ "rows": rows }),
            ));
        }

        match name {
            "dim_calendar.parquet" => match read_columns(&path, &["d"]) {
                Ok(df) => report.checks.extend(key_checks(&df, "d")),
                Err(e) => report.checks.push(DqCheck::unevaluated("calendar_checks", &e)),
            },
            "dim_series.parquet" => match read_columns(&path, &["id"]) {
                Ok(df) => report.checks.extend(key_checks(&df, "id")),
                Err(e) => report.checks.push(DqCheck::unevaluated("series_checks", &e)),
            },
            "fact_sell_prices.parquet" => {
                match read_columns(&path, &["sell_price"]).and_then(|df| price_checks(&df)) {
                    Ok(checks) => report.checks.extend(checks),
                    Err(e) => report.checks.push(DqCheck::unevaluated("sell_price_checks", &e)),
                }
            }
            "fact_sales_long_sample.parquet" => {
                let checks = read_parquet(&path).and_then(|df| {
                    sample_reference_checks(&df, series_ids.as_ref(), calendar_days.as_ref())
                });
                match checks {
                    Ok(checks) => report.checks.extend(checks),
                    Err(e) => report
                        .checks
                        .push(DqCheck::unevaluated("sales_sample_checks", &e)),
                }
            }
            _ => {}
        }
        files.push(report);
    }
    GateResult::from_files(files)
}

/// `key_not_null:<key>` and `key_unique:<key>`; both hard failures.
pub fn key_checks(df: &DataFrame, key: &str) -> Vec<DqCheck> {
    let column = match require_column(df, "dimension", key) {
        Ok(c) => c,
        Err(e) => return vec![DqCheck::unevaluated(format!("key_checks:{key}"), &e)],
    };
    let rows = df.height();
    let nulls = column.null_count();
    let distinct = match string_values(column) {
        Ok(values) => values.into_iter().flatten().collect::<HashSet<_>>().len(),
        Err(e) => return vec![DqCheck::unevaluated(format!("key_checks:{key}"), &e)],
    };
    let dupes = rows - distinct;
    vec![
        DqCheck::expect(
            format!("key_not_null:{key}"),
            nulls == 0,
            CheckStatus::Fail,
            json!({ "nulls": nulls }),
        ),
        DqCheck::expect(
            format!("key_unique:{key}"),
            dupes == 0,
            CheckStatus::Fail,
            json!({ "rows": rows, "distinct": distinct, "dupes": dupes }),
        ),
    ]
}

/// Nulls in `sell_price` warn; any negative price fails.
pub fn price_checks(df: &DataFrame) -> Result<Vec<DqCheck>, DataError> {
    let prices = require_column(df, "fact_sell_prices", "sell_price")?.cast(&DataType::Float64)?;
    let ca = prices
        .f64()
        .map_err(|e| DataError::Validation(format!("sell_price: {e}")))?;
    let nulls = ca.null_count();
    let min = ca.min();
    let max = ca.max();
    let non_negative = min.map_or(true, |m| m >= 0.0);
    Ok(vec![
        DqCheck::expect(
            "sell_price_not_null",
            nulls == 0,
            CheckStatus::Warn,
            json!({ "nulls": nulls }),
        ),
        DqCheck::expect(
            "sell_price_non_negative",
            non_negative,
            CheckStatus::Fail,
            json!({ "min": min, "max": max }),
        ),
    ])
}

/// Referential containment of sample keys in the dimensions. Warn-only: the
/// sample is a deliberate subset.
pub fn sample_reference_checks(
    sample: &DataFrame,
    series_ids: Option<&HashSet<String>>,
    calendar_days: Option<&HashSet<String>>,
) -> Result<Vec<DqCheck>, DataError> {
    let mut checks = Vec::new();
    let pairs = [
        ("id", "fk_series:id_in_dim_series", series_ids),
        ("d", "fk_calendar:d_in_dim_calendar", calendar_days),
    ];
    for (column, name, dim) in pairs {
        let (Some(dim), Ok(values)) = (dim, sample.column(column)) else {
            continue;
        };
        let keys: HashSet<String> = string_values(values)?.into_iter().flatten().collect();
        let missing = keys.iter().filter(|k| !dim.contains(*k)).count();
        checks.push(DqCheck::expect(
            name,
            missing == 0,
            CheckStatus::Warn,
            json!({ "missing": missing }),
        ));
    }
    Ok(checks)
}

// ── Feature gate ────────────────────────────────────────────────────

/// Validate the feature table at `path` built with `horizon`.
pub fn feature_gate(path: &Path, horizon: usize) -> GateResult {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "features".to_string());

    if !path.exists() {
        return GateResult::from_files(vec![DqFileReport::missing(&name, path, true)]);
    }

    let mut report = DqFileReport::present(&name, path);
    report
        .checks
        .push(DqCheck::new("exists", CheckStatus::Pass, json!({ "required": true })));
    match read_parquet(path) {
        Ok(df) => report.checks.extend(feature_checks(&df, horizon)),
        Err(e) => report.checks.push(DqCheck::unevaluated("feature_checks", &e)),
    }
    GateResult::from_files(vec![report])
}

/// Structural and split checks on an in-memory feature table.
pub fn feature_checks(df: &DataFrame, horizon: usize) -> Vec<DqCheck> {
    let missing: Vec<&str> = REQUIRED_FEATURE_COLUMNS
        .iter()
        .copied()
        .filter(|c| df.get_column_index(c).is_none())
        .collect();
    let mut checks = vec![DqCheck::expect(
        "required_columns",
        missing.is_empty(),
        CheckStatus::Fail,
        json!({ "missing": missing }),
    )];
    checks.push(DqCheck::expect(
        "non_empty",
        df.height() > 0,
        CheckStatus::Fail,
        json!({ "rows": df.height() }),
    ));
    if !missing.is_empty() {
        return checks;
    }

    match split_checks(df, horizon) {
        Ok(more) => checks.extend(more),
        Err(e) => checks.push(DqCheck::unevaluated("split_checks", &e)),
    }
    checks
}

fn split_checks(df: &DataFrame, horizon: usize) -> Result<Vec<DqCheck>, DataError> {
    const TABLE: &str = "features";
    let ids = string_values(require_column(df, TABLE, "id")?)?;
    let d_num = require_column(df, TABLE, "d_num")?.cast(&DataType::Int64)?;
    let d_num = d_num
        .i64()
        .map_err(|e| DataError::Validation(format!("d_num: {e}")))?;
    let is_test = require_column(df, TABLE, "is_test")?
        .bool()
        .map_err(|e| DataError::Validation(format!("is_test: {e}")))?;
    let flags: Vec<bool> = is_test.into_iter().map(|v| v.unwrap_or(false)).collect();

    // Per-series (ordinal, is_test) pairs.
    let mut by_series: BTreeMap<&str, Vec<(i64, bool)>> = BTreeMap::new();
    for (row, id) in ids.iter().enumerate() {
        let key = id.as_deref().unwrap_or("");
        let ordinal = d_num.get(row).unwrap_or(i64::MIN);
        by_series.entry(key).or_default().push((ordinal, flags[row]));
    }

    let n_series = by_series.len();
    let n_test = flags.iter().filter(|t| **t).count();
    let expected = n_series * horizon;

    let mut misplaced: Vec<&str> = Vec::new();
    for (id, rows) in by_series.iter_mut() {
        rows.sort_by_key(|(ordinal, _)| *ordinal);
        let want = test_mask(rows.len(), horizon);
        if rows.iter().map(|(_, t)| *t).ne(want.into_iter()) {
            misplaced.push(*id);
        }
    }

    let mut null_counts = serde_json::Map::new();
    let mut total_nulls = 0usize;
    for name in ENGINEERED_COLUMNS {
        let column = require_column(df, TABLE, name)?;
        let validity = column.is_null();
        let nulls = validity
            .into_iter()
            .zip(&flags)
            .filter(|(is_null, test)| **test && is_null.unwrap_or(false))
            .count();
        total_nulls += nulls;
        null_counts.insert(name.to_string(), json!(nulls));
    }

    Ok(vec![
        DqCheck::expect(
            "test_rows_count",
            n_test == expected,
            CheckStatus::Fail,
            json!({ "n_test": n_test, "n_series": n_series, "horizon": horizon, "expected": expected }),
        ),
        DqCheck::expect(
            "test_rows_trailing",
            misplaced.is_empty(),
            CheckStatus::Fail,
            json!({ "series_with_misplaced_test_rows": misplaced.len(), "examples": misplaced.iter().take(5).collect::<Vec<_>>() }),
        ),
        DqCheck::expect(
            "test_features_not_null",
            total_nulls == 0,
            CheckStatus::Fail,
            json!({ "null_counts": Value::Object(null_counts) }),
        ),
    ])
}

// ── Helpers ─────────────────────────────────────────────────────────

fn string_values(column: &Column) -> Result<Vec<Option<String>>, DataError> {
    let cast = column.cast(&DataType::String)?;
    let ca = cast
        .str()
        .map_err(|e| DataError::Validation(format!("{}: {e}", column.name())))?;
    Ok(ca.into_iter().map(|v| v.map(str::to_string)).collect())
}

/// Non-null values of one column of a stored table.
pub fn key_set(path: &Path, column: &str) -> Result<HashSet<String>, DataError> {
    let df = read_columns(path, &[column])?;
    let values = string_values(require_column(&df, "dimension", column)?)?;
    Ok(values.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_key_fails() {
        let df = df!("id" => &["a", "b", "a"]).unwrap();
        let checks = key_checks(&df, "id");
        assert_eq!(checks[0].status, CheckStatus::Pass);
        assert_eq!(checks[1].name, "key_unique:id");
        assert_eq!(checks[1].status, CheckStatus::Fail);
        assert_eq!(checks[1].details["dupes"], json!(1));
        assert_eq!(DqStatus::from_checks(checks.iter().map(|c| &c.status)), DqStatus::Fail);
    }

    #[test]
    fn null_key_fails_both_checks() {
        let df = df!("d" => &[Some("d_1"), None]).unwrap();
        let checks = key_checks(&df, "d");
        assert!(checks.iter().all(|c| c.status == CheckStatus::Fail));
    }

    #[test]
    fn negative_price_fails_null_price_warns() {
        let df = df!("sell_price" => &[Some(1.0f32), Some(-0.5), None]).unwrap();
        let checks = price_checks(&df).unwrap();
        assert_eq!(checks[0].status, CheckStatus::Warn);
        assert_eq!(checks[1].name, "sell_price_non_negative");
        assert_eq!(checks[1].status, CheckStatus::Fail);
    }

    #[test]
    fn reference_mismatch_only_warns() {
        let sample = df!("id" => &["a", "z"], "d" => &["d_1", "d_2"]).unwrap();
        let ids: HashSet<String> = ["a".to_string()].into();
        let days: HashSet<String> = ["d_1".to_string(), "d_2".to_string()].into();
        let checks = sample_reference_checks(&sample, Some(&ids), Some(&days)).unwrap();
        assert_eq!(checks[0].status, CheckStatus::Warn);
        assert_eq!(checks[1].status, CheckStatus::Pass);
    }

    #[test]
    fn missing_feature_columns_fail_fast() {
        let df = df!("id" => &["a"]).unwrap();
        let checks = feature_checks(&df, 28);
        assert_eq!(checks[0].name, "required_columns");
        assert_eq!(checks[0].status, CheckStatus::Fail);
        assert_eq!(checks.len(), 2);
    }

    #[test]
    fn gold_gate_on_empty_dir_fails_required_warns_optional() {
        let dir = tempfile::tempdir().unwrap();
        let gate = gold_gate(dir.path());
        assert_eq!(gate.status, DqStatus::Fail);
        assert_eq!(gate.files.len(), 4);
        assert_eq!(gate.files[3].checks[0].status, CheckStatus::Warn);
        assert_eq!(gate.failures.len(), 3);
    }
}
