//! Evaluation exports: metrics as CSV and LaTeX, predictions as CSV.

use std::path::Path;

use anyhow::{bail, Context, Result};
use shelfcast_core::model::RegressionMetrics;

// ─── Metrics ────────────────────────────────────────────────────────

/// One header row and one value row: `n,mae,rmse,r2`. An undefined R² is empty.
pub fn export_metrics_csv(metrics: &RegressionMetrics) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["n", "mae", "rmse", "r2"])?;
    wtr.write_record([
        metrics.n.to_string(),
        format!("{:.6}", metrics.mae),
        format!("{:.6}", metrics.rmse),
        metrics.r2.map(|r| format!("{r:.6}")).unwrap_or_default(),
    ])?;
    let bytes = wtr.into_inner().context("failed to flush metrics CSV")?;
    String::from_utf8(bytes).context("metrics CSV is not UTF-8")
}

/// A standalone `tabular` block for inclusion in a paper or slide.
pub fn export_metrics_tex(metrics: &RegressionMetrics) -> String {
    let r2 = metrics
        .r2
        .map(|r| format!("{r:.4}"))
        .unwrap_or_else(|| "--".to_string());
    let mut out = String::new();
    out.push_str("\\begin{tabular}{lr}\n");
    out.push_str("\\hline\n");
    out.push_str("Metric & Value \\\\\n");
    out.push_str("\\hline\n");
    out.push_str(&format!("N & {} \\\\\n", metrics.n));
    out.push_str(&format!("MAE & {:.4} \\\\\n", metrics.mae));
    out.push_str(&format!("RMSE & {:.4} \\\\\n", metrics.rmse));
    out.push_str(&format!("$R^2$ & {r2} \\\\\n"));
    out.push_str("\\hline\n");
    out.push_str("\\end{tabular}\n");
    out
}

// ─── Predictions ────────────────────────────────────────────────────

/// Columns: id, d, y_true, y_pred
pub fn export_predictions_csv(
    ids: &[String],
    days: &[String],
    y_true: &[f64],
    y_pred: &[f64],
) -> Result<String> {
    let n = ids.len();
    if days.len() != n || y_true.len() != n || y_pred.len() != n {
        bail!(
            "prediction columns differ in length: id={}, d={}, y_true={}, y_pred={}",
            n,
            days.len(),
            y_true.len(),
            y_pred.len()
        );
    }

    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["id", "d", "y_true", "y_pred"])?;
    for i in 0..n {
        wtr.write_record([
            ids[i].as_str(),
            days[i].as_str(),
            &y_true[i].to_string(),
            &format!("{:.6}", y_pred[i]),
        ])?;
    }
    let bytes = wtr.into_inner().context("failed to flush predictions CSV")?;
    String::from_utf8(bytes).context("predictions CSV is not UTF-8")
}

/// Write `content` to `path`, creating parent directories.
pub fn save_text(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))
}
