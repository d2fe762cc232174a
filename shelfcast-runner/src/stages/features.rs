//! Features: lag/rolling feature table over the gold long sample.

use shelfcast_core::data::{parquet_shape, read_parquet, write_parquet, DataError};
use shelfcast_core::features::{build_features, FeatureConfig, FeatureSummary};
use shelfcast_core::FileStatus;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::ResolvedConfig;
use crate::report::{FileRecord, StageReport};
use crate::stage::{conclude, materialize, Stage, StageContext, StageError, StageOutcome};

pub const FEATURES_FILE: &str = "fact_sales_features_sample.parquet";

pub fn features_path(config: &ResolvedConfig) -> PathBuf {
    config.gold_dir().join(FEATURES_FILE)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FeaturesStage {
    /// Overrides `[features] horizon`.
    pub horizon: Option<usize>,
}

impl FeaturesStage {
    fn feature_config(&self, config: &ResolvedConfig) -> FeatureConfig {
        FeatureConfig {
            horizon: self.horizon.unwrap_or(config.settings.features.horizon),
            min_history_filter: config.settings.features.min_history_filter,
        }
    }
}

impl Stage for FeaturesStage {
    fn name(&self) -> &str {
        "build_features"
    }

    fn execute(&self, ctx: &StageContext<'_>) -> Result<StageOutcome, StageError> {
        let config = ctx.config;
        let gold = config.gold_dir();
        let sample_path = gold.join("fact_sales_long_sample.parquet");
        let calendar_path = gold.join("dim_calendar.parquet");
        let dest = features_path(config);
        let feature_config = self.feature_config(config);

        let mut report = StageReport::new(self.name(), config);
        report.dir("gold_dir", &gold);
        report.note("horizon", feature_config.horizon);
        report.note("min_history_filter", feature_config.min_history_filter);

        let missing: Vec<String> = [&sample_path, &calendar_path]
            .iter()
            .filter(|p| !p.is_file())
            .map(|p| p.display().to_string())
            .collect();
        if !missing.is_empty() {
            report.note("missing_files", missing);
            return conclude(report, true, Some("run gold first".to_string()));
        }

        let mut summary: Option<FeatureSummary> = None;
        let result = materialize(&dest, ctx.force, || -> Result<(), DataError> {
            let sample = read_parquet(&sample_path)?;
            let calendar = read_parquet(&calendar_path)?;
            let (mut table, built) = build_features(&sample, &calendar, &feature_config)?;
            write_parquet(&mut table, &dest)?;
            summary = Some(built);
            Ok(())
        });

        let record = match result {
            Ok(status) => match parquet_shape(&dest) {
                Ok(shape) => FileRecord::new(FEATURES_FILE, status)
                    .with_source(&sample_path)
                    .with_dest(&dest)
                    .with_rows(shape.rows)
                    .with_columns(shape.columns),
                Err(e) => FileRecord::failed(FEATURES_FILE, format!("read shape: {e}"))
                    .with_source(&sample_path)
                    .with_dest(&dest),
            },
            Err(e) => FileRecord::failed(FEATURES_FILE, e).with_source(&sample_path),
        };

        if let Some(summary) = &summary {
            info!(
                rows = summary.n_rows,
                test_rows = summary.n_test,
                series = summary.n_series,
                "features: built"
            );
            if !summary.short_series.is_empty() {
                warn!(
                    count = summary.short_series.len(),
                    min_history = feature_config.min_history(),
                    excluded = feature_config.min_history_filter,
                    "features: series shorter than the minimum history"
                );
            }
            report.note("n_rows", summary.n_rows);
            report.note("n_test", summary.n_test);
            report.note("n_series", summary.n_series);
            report.note("short_series", summary.short_series.clone());
            report.note("excluded_rows", summary.excluded_rows);
        } else if record.status == FileStatus::Exists {
            report.note("reused", true);
        }
        report.push(record);
        conclude(
            report,
            false,
            Some("inspect notes.error; the sample or calendar may lack required columns".to_string()),
        )
    }
}
