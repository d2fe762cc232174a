//! Evaluate: score the saved model on the held-out rows and export tables.

use anyhow::{Context, Result};
use serde_json::Value;
use shelfcast_core::data::read_parquet;
use shelfcast_core::model::{
    labeled_rows, regression_metrics, RegressionMetrics, Regressor, RidgeRegressor, MODEL_FEATURES,
};
use shelfcast_core::FileStatus;
use std::path::{Path, PathBuf};
use tracing::info;

use super::features::features_path;
use crate::config::{ResolvedConfig, DATASET_ID};
use crate::export::{export_metrics_csv, export_metrics_tex, export_predictions_csv, save_text};
use crate::report::{FileRecord, StageReport};
use crate::stage::{conclude, Stage, StageContext, StageError, StageOutcome};

#[derive(Debug, Clone, Copy, Default)]
pub struct EvaluateStage;

/// The three exported tables, in report order.
pub fn eval_outputs(config: &ResolvedConfig) -> [PathBuf; 3] {
    let tables = &config.paths.outputs_tables;
    [
        tables.join(format!("eval_{DATASET_ID}_metrics.csv")),
        tables.join(format!("eval_{DATASET_ID}_metrics.tex")),
        tables.join(format!("eval_{DATASET_ID}_predictions.csv")),
    ]
}

struct Scored {
    metrics: RegressionMetrics,
    n_test_rows: usize,
}

impl Stage for EvaluateStage {
    fn name(&self) -> &str {
        "eval"
    }

    fn execute(&self, ctx: &StageContext<'_>) -> Result<StageOutcome, StageError> {
        let config = ctx.config;
        let features = features_path(config);
        let model_path = config.model_path();
        let outputs = eval_outputs(config);

        let mut report = StageReport::new(self.name(), config);
        report.dir("models_dir", &config.paths.outputs_models);
        report.dir("tables_dir", &config.paths.outputs_tables);

        let missing: Vec<String> = [&features, &model_path]
            .iter()
            .filter(|p| !p.is_file())
            .map(|p| p.display().to_string())
            .collect();
        if !missing.is_empty() {
            report.note("missing_files", missing);
            return conclude(report, true, Some("run build_features and train first".to_string()));
        }

        let reuse = !ctx.force && outputs.iter().all(|p| p.is_file());
        if reuse {
            for path in &outputs {
                report.push(table_record(path, FileStatus::Exists, &model_path));
            }
            return conclude(report, false, None);
        }

        match score(&features, &model_path, &outputs) {
            Ok(scored) => {
                info!(
                    n = scored.metrics.n,
                    mae = scored.metrics.mae,
                    rmse = scored.metrics.rmse,
                    "eval: scored test rows"
                );
                report.note(
                    "metrics",
                    serde_json::to_value(scored.metrics).unwrap_or(Value::Null),
                );
                report.note("n_test_rows", scored.n_test_rows);
                report.note("n_eval_used", scored.metrics.n);
                for path in &outputs {
                    report.push(table_record(path, FileStatus::Ok, &model_path));
                }
            }
            Err(e) => report.push(
                FileRecord::failed("evaluation", format!("{e:#}")).with_source(&model_path),
            ),
        }
        conclude(
            report,
            false,
            Some("no complete test rows to score; check horizon and history length".to_string()),
        )
    }
}

fn score(features: &Path, model_path: &Path, outputs: &[PathBuf; 3]) -> Result<Scored> {
    let json = std::fs::read_to_string(model_path)
        .with_context(|| format!("failed to read {}", model_path.display()))?;
    let model = RidgeRegressor::from_json(&json)?;
    let df = read_parquet(features)?;
    let rows = labeled_rows(&df, &MODEL_FEATURES, true)?;
    let predictions = model.predict(&rows.matrix)?;
    let metrics = regression_metrics(&rows.target, &predictions)
        .context("no test rows with complete features")?;

    save_text(&outputs[0], &export_metrics_csv(&metrics)?)?;
    save_text(&outputs[1], &export_metrics_tex(&metrics))?;
    save_text(
        &outputs[2],
        &export_predictions_csv(&rows.ids, &rows.days, &rows.target, &predictions)?,
    )?;
    Ok(Scored {
        metrics,
        n_test_rows: rows.candidates,
    })
}

fn table_record(path: &Path, status: FileStatus, model_path: &Path) -> FileRecord {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    FileRecord::new(name, status)
        .with_source(model_path)
        .with_dest(path)
}
