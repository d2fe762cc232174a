//! Train: fit the ridge baseline on the training rows of the feature table.

use anyhow::{Context, Result};
use shelfcast_core::data::read_parquet;
use shelfcast_core::model::{labeled_rows, Regressor, RidgeRegressor, MODEL_FEATURES};
use shelfcast_core::FileStatus;
use tracing::info;

use super::features::features_path;
use crate::export::save_text;
use crate::report::{FileRecord, StageReport};
use crate::stage::{conclude, materialize, Stage, StageContext, StageError, StageOutcome};

#[derive(Debug, Clone, Copy, Default)]
pub struct TrainStage;

/// Counts recorded after a fresh fit.
struct FitSummary {
    n_rows: usize,
    n_train_used: usize,
}

impl Stage for TrainStage {
    fn name(&self) -> &str {
        "train"
    }

    fn execute(&self, ctx: &StageContext<'_>) -> Result<StageOutcome, StageError> {
        let config = ctx.config;
        let features = features_path(config);
        let model_path = config.model_path();
        let alpha = config.settings.train.alpha;

        let mut report = StageReport::new(self.name(), config);
        report.dir("gold_dir", &config.gold_dir());
        report.dir("models_dir", &config.paths.outputs_models);
        report.note("alpha", alpha);
        report.note("feature_columns", MODEL_FEATURES.to_vec());

        if !features.is_file() {
            report.note("missing_files", vec![features.display().to_string()]);
            return conclude(report, true, Some("run build_features first".to_string()));
        }

        let mut fitted: Option<FitSummary> = None;
        let result = materialize(&model_path, ctx.force, || -> Result<()> {
            let df = read_parquet(&features)?;
            let rows = labeled_rows(&df, &MODEL_FEATURES, false)?;
            let mut model = RidgeRegressor::new(alpha);
            model
                .fit(&rows.matrix, &rows.target)
                .with_context(|| format!("fit on {} complete training rows", rows.target.len()))?;
            save_text(&model_path, &model.to_json()?)?;
            info!(rows = rows.target.len(), model = %model_path.display(), "train: model saved");
            fitted = Some(FitSummary {
                n_rows: df.height(),
                n_train_used: rows.target.len(),
            });
            Ok(())
        });

        let record = match result {
            Ok(status) => FileRecord::new(
                model_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                status,
            )
            .with_source(&features)
            .with_dest(&model_path),
            Err(e) => FileRecord::failed("model", format!("{e:#}")).with_source(&features),
        };
        if let Some(summary) = fitted {
            report.note("n_rows", summary.n_rows);
            report.note("n_train_used", summary.n_train_used);
        } else if record.status == FileStatus::Exists {
            report.note("reused", true);
        }
        report.push(record);
        conclude(
            report,
            false,
            Some("no complete training rows; check the feature table's history length".to_string()),
        )
    }
}
