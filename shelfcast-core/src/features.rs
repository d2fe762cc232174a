//! Leakage-safe temporal features over the long-format sales sample.
//!
//! Per series, ordered by day ordinal:
//! - `lag_k` is the target `k` rows back (null for the first `k` rows).
//! - `roll_mean_w` is the mean of the `w` rows *before* the current one. The
//!   window is shifted by one before rolling, so a row's own target never
//!   enters its own feature. Any null inside the window yields null.
//! - `is_test` marks the trailing `horizon` rows.
//!
//! Features are computed on the full series before the split, so train and test
//! rows are built identically. Test rows near the boundary legitimately read
//! train-region history; they never read anything later than themselves.

use crate::data::{day_ordinal, require_column, DataError, SERIES_COLUMNS};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Range;

pub const LAGS: [usize; 3] = [1, 7, 28];
pub const ROLL_WINDOWS: [usize; 2] = [7, 28];

/// Longest lag or rolling window; a series needs `horizon + MAX_LOOKBACK`
/// rows for every test-row feature to be defined.
pub const MAX_LOOKBACK: usize = 28;

/// Engineered columns that must be fully defined on test rows.
pub const ENGINEERED_COLUMNS: [&str; 5] =
    ["lag_1", "lag_7", "lag_28", "roll_mean_7", "roll_mean_28"];

/// Calendar columns that must exist for the join.
pub const CALENDAR_TIME_COLUMNS: [&str; 4] = ["wm_yr_wk", "wday", "month", "year"];

/// Calendar SNAP flags; zero when absent or unmatched.
pub const SNAP_COLUMNS: [&str; 3] = ["snap_CA", "snap_TX", "snap_WI"];

/// Columns every feature table carries.
pub const REQUIRED_FEATURE_COLUMNS: [&str; 17] = [
    "id",
    "d",
    "sales",
    "d_num",
    "lag_1",
    "lag_7",
    "lag_28",
    "roll_mean_7",
    "roll_mean_28",
    "is_test",
    "wm_yr_wk",
    "wday",
    "month",
    "year",
    "snap_CA",
    "snap_TX",
    "snap_WI",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Trailing rows per series held out as test.
    pub horizon: usize,
    /// Drop series shorter than `horizon + MAX_LOOKBACK` before building.
    pub min_history_filter: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            horizon: 28,
            min_history_filter: false,
        }
    }
}

impl FeatureConfig {
    pub fn min_history(&self) -> usize {
        self.horizon + MAX_LOOKBACK
    }
}

/// What the builder produced, for the stage report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSummary {
    pub n_rows: usize,
    pub n_test: usize,
    pub n_series: usize,
    pub horizon: usize,
    /// Series with fewer than `horizon + MAX_LOOKBACK` rows.
    pub short_series: Vec<String>,
    /// Rows dropped by the minimum-history filter.
    pub excluded_rows: usize,
}

// ── Per-series kernels ──────────────────────────────────────────────

/// `values` shifted `k` rows later; the first `k` entries are null.
pub fn lag(values: &[Option<f64>], k: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|t| if t >= k { values[t - k] } else { None })
        .collect()
}

/// Mean of the `w` values strictly before each position.
///
/// Entry `t` is the mean of `values[t-w..t]`; null until a full window of
/// history exists, and null if any value in the window is null.
pub fn shifted_rolling_mean(values: &[Option<f64>], w: usize) -> Vec<Option<f64>> {
    let n = values.len();
    let mut out = vec![None; n];
    if w == 0 {
        return out;
    }

    let mut sum = 0.0;
    let mut nulls = 0usize;
    for t in 0..n {
        // Window for row t is [t-w, t-1]; admit values[t-1], evict values[t-1-w].
        if t >= 1 {
            match values[t - 1] {
                Some(v) => sum += v,
                None => nulls += 1,
            }
        }
        if t > w {
            match values[t - 1 - w] {
                Some(v) => sum -= v,
                None => nulls -= 1,
            }
        }
        if t >= w && nulls == 0 {
            out[t] = Some(sum / w as f64);
        }
    }
    out
}

/// True for the trailing `horizon` positions of a series of length `n`.
pub fn test_mask(n: usize, horizon: usize) -> Vec<bool> {
    let cut = n.saturating_sub(horizon);
    (0..n).map(|i| i >= cut).collect()
}

// ── Table builder ───────────────────────────────────────────────────

/// Build the feature table from the long sample and the gold calendar.
///
/// Output rows are sorted by `(id, d_num)`.
pub fn build_features(
    sample: &DataFrame,
    calendar: &DataFrame,
    config: &FeatureConfig,
) -> Result<(DataFrame, FeatureSummary), DataError> {
    const TABLE: &str = "fact_sales_long_sample";

    let ids = text_values(sample, TABLE, "id")?;
    let labels = text_values(sample, TABLE, "d")?;
    let sales = float_values(sample, TABLE, "sales")?;

    let d_num = labels
        .iter()
        .map(|l| {
            day_ordinal(l).ok_or_else(|| DataError::Validation(format!("bad day label {l:?}")))
        })
        .collect::<Result<Vec<i64>, _>>()?;

    let mut order: Vec<usize> = (0..sample.height()).collect();
    order.sort_by(|&a, &b| ids[a].cmp(&ids[b]).then(d_num[a].cmp(&d_num[b])));

    let mut short_series = Vec::new();
    let mut kept: Vec<usize> = Vec::with_capacity(order.len());
    let mut groups: Vec<Range<usize>> = Vec::new();
    for run in series_runs(&order, &ids) {
        let len = run.len();
        if len < config.min_history() {
            short_series.push(ids[order[run.start]].clone());
            if config.min_history_filter {
                continue;
            }
        }
        let start = kept.len();
        kept.extend_from_slice(&order[run]);
        groups.push(start..start + len);
    }
    let excluded_rows = order.len() - kept.len();

    let mut lags: Vec<Vec<Option<f64>>> = vec![Vec::with_capacity(kept.len()); LAGS.len()];
    let mut rolls: Vec<Vec<Option<f64>>> = vec![Vec::with_capacity(kept.len()); ROLL_WINDOWS.len()];
    let mut is_test: Vec<bool> = Vec::with_capacity(kept.len());

    for group in &groups {
        let target: Vec<Option<f64>> = kept[group.clone()].iter().map(|&i| sales[i]).collect();
        for (slot, &k) in LAGS.iter().enumerate() {
            lags[slot].extend(lag(&target, k));
        }
        for (slot, &w) in ROLL_WINDOWS.iter().enumerate() {
            rolls[slot].extend(shifted_rolling_mean(&target, w));
        }
        is_test.extend(test_mask(target.len(), config.horizon));
    }

    let idx = IdxCa::from_vec(
        "idx".into(),
        kept.iter().map(|&i| i as IdxSize).collect(),
    );
    let keep: Vec<&str> = sample
        .get_column_names()
        .into_iter()
        .map(|n| n.as_str())
        .filter(|n| SERIES_COLUMNS.contains(n) || *n == "d" || *n == "sales")
        .collect();
    let mut out = sample.select(keep)?.take(&idx)?;

    out.with_column(Column::new(
        "d_num".into(),
        kept.iter().map(|&i| d_num[i] as i32).collect::<Vec<i32>>(),
    ))?;
    for (slot, &k) in LAGS.iter().enumerate() {
        out.with_column(Column::new(format!("lag_{k}").into(), std::mem::take(&mut lags[slot])))?;
    }
    for (slot, &w) in ROLL_WINDOWS.iter().enumerate() {
        out.with_column(Column::new(
            format!("roll_mean_{w}").into(),
            std::mem::take(&mut rolls[slot]),
        ))?;
    }
    let n_test = is_test.iter().filter(|t| **t).count();
    out.with_column(Column::new("is_test".into(), is_test))?;

    join_calendar(&mut out, calendar, &kept, &labels)?;

    let summary = FeatureSummary {
        n_rows: out.height(),
        n_test,
        n_series: groups.len(),
        horizon: config.horizon,
        short_series,
        excluded_rows,
    };
    Ok((out, summary))
}

/// Ranges of `order` that share one series id.
fn series_runs(order: &[usize], ids: &[String]) -> Vec<Range<usize>> {
    let mut runs = Vec::new();
    let mut start = 0;
    for pos in 1..=order.len() {
        if pos == order.len() || ids[order[pos]] != ids[order[start]] {
            if pos > start {
                runs.push(start..pos);
            }
            start = pos;
        }
    }
    runs
}

/// Left join of calendar columns on the day label.
fn join_calendar(
    out: &mut DataFrame,
    calendar: &DataFrame,
    kept: &[usize],
    labels: &[String],
) -> Result<(), DataError> {
    const TABLE: &str = "dim_calendar";

    let cal_days = require_column(calendar, TABLE, "d")?
        .str()
        .map_err(|e| DataError::Validation(format!("{TABLE}.d: {e}")))?;
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(cal_days.len());
    for (row, day) in cal_days.into_iter().enumerate() {
        if let Some(day) = day {
            index.entry(day).or_insert(row);
        }
    }
    let matched: Vec<Option<usize>> = kept
        .iter()
        .map(|&i| index.get(labels[i].as_str()).copied())
        .collect();

    for name in CALENDAR_TIME_COLUMNS {
        let values = int_values(calendar, TABLE, name)?;
        let joined: Vec<Option<i32>> = matched.iter().map(|m| m.and_then(|j| values[j])).collect();
        out.with_column(Column::new(name.into(), joined))?;
    }

    for name in SNAP_COLUMNS {
        let joined: Vec<i8> = if calendar.get_column_index(name).is_some() {
            let values = int_values(calendar, TABLE, name)?;
            matched
                .iter()
                .map(|m| m.and_then(|j| values[j]).unwrap_or(0) as i8)
                .collect()
        } else {
            vec![0; matched.len()]
        };
        out.with_column(Column::new(name.into(), joined))?;
    }
    Ok(())
}

// ── Column extraction ───────────────────────────────────────────────

fn text_values(df: &DataFrame, table: &str, name: &str) -> Result<Vec<String>, DataError> {
    let ca = require_column(df, table, name)?
        .str()
        .map_err(|e| DataError::Validation(format!("{table}.{name}: {e}")))?;
    ca.into_iter()
        .enumerate()
        .map(|(row, v)| {
            v.map(str::to_string)
                .ok_or_else(|| DataError::Validation(format!("{table}.{name}: null at row {row}")))
        })
        .collect()
}

fn float_values(df: &DataFrame, table: &str, name: &str) -> Result<Vec<Option<f64>>, DataError> {
    let cast = require_column(df, table, name)?.cast(&DataType::Float64)?;
    let ca = cast
        .f64()
        .map_err(|e| DataError::Validation(format!("{table}.{name}: {e}")))?;
    Ok(ca.into_iter().collect())
}

fn int_values(df: &DataFrame, table: &str, name: &str) -> Result<Vec<Option<i32>>, DataError> {
    let cast = require_column(df, table, name)?.cast(&DataType::Int32)?;
    let ca = cast
        .i32()
        .map_err(|e| DataError::Validation(format!("{table}.{name}: {e}")))?;
    Ok(ca.into_iter().collect())
}
