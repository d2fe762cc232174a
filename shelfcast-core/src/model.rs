//! Regression capability consumed by the train and evaluate stages.
//!
//! Stages only see [`Regressor`]: `fit` on a dense feature matrix, then
//! `predict`. The shipped baseline is ridge regression on standardised
//! features with an unpenalised intercept.

use crate::data::{require_column, DataError};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Numeric feature columns used by the baseline model, in matrix order.
pub const MODEL_FEATURES: [&str; 13] = [
    "lag_1",
    "lag_7",
    "lag_28",
    "roll_mean_7",
    "roll_mean_28",
    "d_num",
    "wm_yr_wk",
    "wday",
    "month",
    "year",
    "snap_CA",
    "snap_TX",
    "snap_WI",
];

pub const TARGET: &str = "sales";

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("no rows to fit on")]
    EmptyTrainingSet,

    #[error("feature width mismatch: model has {expected}, matrix has {actual}")]
    WidthMismatch { expected: usize, actual: usize },

    #[error("target length {targets} does not match {rows} rows")]
    TargetLength { rows: usize, targets: usize },

    #[error("model is not fitted")]
    NotFitted,

    #[error("singular system")]
    Singular,

    #[error(transparent)]
    Data(#[from] DataError),

    #[error("model serialization: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Row-major dense matrix with named columns.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<f64>>) -> Self {
        Self { columns, rows }
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }
}

/// Fit/predict capability.
pub trait Regressor {
    fn fit(&mut self, x: &FeatureMatrix, y: &[f64]) -> Result<(), ModelError>;
    fn predict(&self, x: &FeatureMatrix) -> Result<Vec<f64>, ModelError>;
}

/// Feature rows selected from a feature table, with their keys.
#[derive(Debug, Clone)]
pub struct LabeledRows {
    pub matrix: FeatureMatrix,
    pub target: Vec<f64>,
    pub ids: Vec<String>,
    pub days: Vec<String>,
    /// Rows considered before dropping incomplete ones.
    pub candidates: usize,
}

/// Extract rows with `is_test == test` whose features and target are all present.
pub fn labeled_rows(
    df: &DataFrame,
    features: &[&str],
    test: bool,
) -> Result<LabeledRows, DataError> {
    const TABLE: &str = "features";
    let is_test = require_column(df, TABLE, "is_test")?
        .bool()
        .map_err(|e| DataError::Validation(format!("is_test: {e}")))?
        .clone();

    let mut columns: Vec<Vec<Option<f64>>> = Vec::with_capacity(features.len());
    for name in features {
        let cast = require_column(df, TABLE, name)?.cast(&DataType::Float64)?;
        let ca = cast
            .f64()
            .map_err(|e| DataError::Validation(format!("{name}: {e}")))?;
        columns.push(ca.into_iter().collect());
    }
    let target_col = require_column(df, TABLE, TARGET)?.cast(&DataType::Float64)?;
    let target: Vec<Option<f64>> = target_col
        .f64()
        .map_err(|e| DataError::Validation(format!("{TARGET}: {e}")))?
        .into_iter()
        .collect();
    let ids = text_column(df, "id")?;
    let days = text_column(df, "d")?;

    let mut out = LabeledRows {
        matrix: FeatureMatrix::new(features.iter().map(|f| f.to_string()).collect(), Vec::new()),
        target: Vec::new(),
        ids: Vec::new(),
        days: Vec::new(),
        candidates: 0,
    };
    for row in 0..df.height() {
        if is_test.get(row).unwrap_or(false) != test {
            continue;
        }
        out.candidates += 1;
        let Some(y) = target[row] else { continue };
        let values: Option<Vec<f64>> = columns.iter().map(|c| c[row]).collect();
        let Some(values) = values else { continue };
        out.matrix.rows.push(values);
        out.target.push(y);
        out.ids.push(ids[row].clone());
        out.days.push(days[row].clone());
    }
    Ok(out)
}

fn text_column(df: &DataFrame, name: &str) -> Result<Vec<String>, DataError> {
    let ca = require_column(df, "features", name)?
        .str()
        .map_err(|e| DataError::Validation(format!("{name}: {e}")))?;
    Ok(ca.into_iter().map(|v| v.unwrap_or_default().to_string()).collect())
}

// ── Ridge baseline ──────────────────────────────────────────────────

/// Ridge regression. Features are standardised with training statistics; the
/// intercept is not penalised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RidgeRegressor {
    pub alpha: f64,
    pub feature_names: Vec<String>,
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
    /// Coefficients in standardised space.
    pub coef: Vec<f64>,
    pub intercept: f64,
    pub fitted: bool,
}

impl RidgeRegressor {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            feature_names: Vec::new(),
            means: Vec::new(),
            scales: Vec::new(),
            coef: Vec::new(),
            intercept: 0.0,
            fitted: false,
        }
    }

    pub fn to_json(&self) -> Result<String, ModelError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self, ModelError> {
        Ok(serde_json::from_str(s)?)
    }
}

impl Regressor for RidgeRegressor {
    fn fit(&mut self, x: &FeatureMatrix, y: &[f64]) -> Result<(), ModelError> {
        let n = x.n_rows();
        let p = x.width();
        if n == 0 {
            return Err(ModelError::EmptyTrainingSet);
        }
        if y.len() != n {
            return Err(ModelError::TargetLength {
                rows: n,
                targets: y.len(),
            });
        }

        let mut means = vec![0.0; p];
        for row in &x.rows {
            for (m, v) in means.iter_mut().zip(row) {
                *m += v;
            }
        }
        means.iter_mut().for_each(|m| *m /= n as f64);

        let mut scales = vec![0.0; p];
        for row in &x.rows {
            for j in 0..p {
                let d = row[j] - means[j];
                scales[j] += d * d;
            }
        }
        for s in scales.iter_mut() {
            let sd = (*s / n as f64).sqrt();
            // Constant columns contribute nothing; keep them finite.
            *s = if sd > 0.0 { sd } else { 1.0 };
        }

        let y_mean = y.iter().sum::<f64>() / n as f64;

        // Normal equations on centred, scaled data: (ZᵀZ + αI) w = Zᵀ(y - ȳ).
        let mut a = vec![vec![0.0; p]; p];
        let mut b = vec![0.0; p];
        let mut z = vec![0.0; p];
        for (row, &target) in x.rows.iter().zip(y) {
            for j in 0..p {
                z[j] = (row[j] - means[j]) / scales[j];
            }
            let yc = target - y_mean;
            for i in 0..p {
                b[i] += z[i] * yc;
                for j in i..p {
                    a[i][j] += z[i] * z[j];
                }
            }
        }
        for i in 0..p {
            for j in 0..i {
                a[i][j] = a[j][i];
            }
            a[i][i] += self.alpha;
        }

        let coef = solve(a, b)?;

        self.feature_names = x.columns.clone();
        self.means = means;
        self.scales = scales;
        self.coef = coef;
        self.intercept = y_mean;
        self.fitted = true;
        Ok(())
    }

    fn predict(&self, x: &FeatureMatrix) -> Result<Vec<f64>, ModelError> {
        if !self.fitted {
            return Err(ModelError::NotFitted);
        }
        if x.width() != self.coef.len() {
            return Err(ModelError::WidthMismatch {
                expected: self.coef.len(),
                actual: x.width(),
            });
        }
        Ok(x.rows
            .iter()
            .map(|row| {
                row.iter()
                    .zip(&self.means)
                    .zip(&self.scales)
                    .zip(&self.coef)
                    .map(|(((v, m), s), w)| (v - m) / s * w)
                    .sum::<f64>()
                    + self.intercept
            })
            .collect())
    }
}

/// Gaussian elimination with partial pivoting.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>, ModelError> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .ok_or(ModelError::Singular)?;
        if a[pivot][col].abs() < 1e-12 {
            return Err(ModelError::Singular);
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = ((row + 1)..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Ok(x)
}

// ── Metrics ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub n: usize,
    pub mae: f64,
    pub rmse: f64,
    /// Undefined when the target has zero variance.
    pub r2: Option<f64>,
}

pub fn regression_metrics(y_true: &[f64], y_pred: &[f64]) -> Result<RegressionMetrics, ModelError> {
    if y_true.len() != y_pred.len() {
        return Err(ModelError::TargetLength {
            rows: y_pred.len(),
            targets: y_true.len(),
        });
    }
    let n = y_true.len();
    if n == 0 {
        return Err(ModelError::EmptyTrainingSet);
    }
    let nf = n as f64;
    let mut abs = 0.0;
    let mut sq = 0.0;
    for (t, p) in y_true.iter().zip(y_pred) {
        abs += (t - p).abs();
        sq += (t - p) * (t - p);
    }
    let mean = y_true.iter().sum::<f64>() / nf;
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean) * (t - mean)).sum();
    let r2 = if ss_tot > 0.0 {
        Some(1.0 - sq / ss_tot)
    } else {
        None
    };
    Ok(RegressionMetrics {
        n,
        mae: abs / nf,
        rmse: (sq / nf).sqrt(),
        r2,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(rows: Vec<Vec<f64>>) -> FeatureMatrix {
        let width = rows.first().map_or(0, |r| r.len());
        FeatureMatrix::new((0..width).map(|i| format!("x{i}")).collect(), rows)
    }

    #[test]
    fn ridge_recovers_linear_relation_with_small_alpha() {
        let x = matrix((0..50).map(|i| vec![i as f64, (i % 7) as f64]).collect());
        let y: Vec<f64> = x.rows.iter().map(|r| 3.0 + 2.0 * r[0] - 0.5 * r[1]).collect();

        let mut model = RidgeRegressor::new(1e-9);
        model.fit(&x, &y).unwrap();
        let pred = model.predict(&x).unwrap();
        for (p, t) in pred.iter().zip(&y) {
            assert!((p - t).abs() < 1e-6, "{p} vs {t}");
        }
    }

    #[test]
    fn large_alpha_shrinks_toward_mean() {
        let x = matrix((0..20).map(|i| vec![i as f64]).collect());
        let y: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let mut model = RidgeRegressor::new(1e9);
        model.fit(&x, &y).unwrap();
        let pred = model.predict(&x).unwrap();
        assert!(pred.iter().all(|p| (p - 9.5).abs() < 1e-3));
    }

    #[test]
    fn constant_feature_is_harmless() {
        let x = matrix((0..10).map(|i| vec![i as f64, 1.0]).collect());
        let y: Vec<f64> = (0..10).map(|i| 2.0 * i as f64).collect();
        let mut model = RidgeRegressor::new(1.0);
        model.fit(&x, &y).unwrap();
        assert!(model.predict(&x).unwrap().iter().all(|p| p.is_finite()));
    }

    #[test]
    fn errors_on_empty_and_unfitted() {
        let mut model = RidgeRegressor::new(1.0);
        assert!(matches!(
            model.predict(&matrix(vec![vec![1.0]])),
            Err(ModelError::NotFitted)
        ));
        assert!(matches!(
            model.fit(&matrix(vec![]), &[]),
            Err(ModelError::EmptyTrainingSet)
        ));
    }

    #[test]
    fn json_round_trip_keeps_predictions() {
        let x = matrix((0..10).map(|i| vec![i as f64]).collect());
        let y: Vec<f64> = (0..10).map(|i| 1.0 + i as f64).collect();
        let mut model = RidgeRegressor::new(0.1);
        model.fit(&x, &y).unwrap();
        let back = RidgeRegressor::from_json(&model.to_json().unwrap()).unwrap();
        for (a, b) in model.predict(&x).unwrap().iter().zip(back.predict(&x).unwrap()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn metrics() {
        let m = regression_metrics(&[1.0, 2.0, 3.0], &[1.0, 2.0, 5.0]).unwrap();
        assert!((m.mae - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.rmse - (4.0f64 / 3.0).sqrt()).abs() < 1e-12);
        assert_eq!(m.r2, Some(1.0 - 4.0 / 2.0));

        let flat = regression_metrics(&[2.0, 2.0], &[1.0, 3.0]).unwrap();
        assert_eq!(flat.r2, None);
    }

    #[test]
    fn labeled_rows_split_and_drop_incomplete() {
        let df = df!(
            "id" => &["a", "a", "a", "a"],
            "d" => &["d_1", "d_2", "d_3", "d_4"],
            "sales" => &[1i32, 2, 3, 4],
            "lag_1" => &[None, Some(1.0), Some(2.0), Some(3.0)],
            "is_test" => &[false, false, false, true],
        )
        .unwrap();
        let train = labeled_rows(&df, &["lag_1"], false).unwrap();
        assert_eq!(train.candidates, 3);
        assert_eq!(train.matrix.n_rows(), 2);
        assert_eq!(train.target, vec![2.0, 3.0]);

        let test = labeled_rows(&df, &["lag_1"], true).unwrap();
        assert_eq!(test.days, vec!["d_4".to_string()]);
    }
}
