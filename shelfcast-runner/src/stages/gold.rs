//! Gold: conformed analytic tables built from the silver layer.
//!
//! Artifacts:
//! - `dim_calendar.parquet`: typed calendar plus `is_weekend`, `is_event_day`
//! - `dim_series.parquet`: one row per distinct series
//! - `fact_sell_prices.parquet`: typed prices, unchanged
//! - `fact_sales_long_sample.parquet`: first N series × last D days, long format

use polars::prelude::DataFrame;
use shelfcast_core::data::{
    calendar_gold, parquet_shape, read_columns, read_parquet, sales_long_sample, series_dim,
    write_parquet, DataError, SERIES_COLUMNS,
};
use std::path::Path;
use tracing::info;

use crate::report::{FileRecord, StageReport};
use crate::stage::{conclude, materialize, Stage, StageContext, StageError, StageOutcome};

/// Silver inputs without which no gold table is built.
pub const REQUIRED_SILVER: [&str; 3] = [
    "calendar.parquet",
    "sell_prices.parquet",
    "sales_train_validation.parquet",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct GoldStage {
    pub sample_n_series: Option<usize>,
    pub sample_days: Option<usize>,
}

impl Stage for GoldStage {
    fn name(&self) -> &str {
        "gold"
    }

    fn execute(&self, ctx: &StageContext<'_>) -> Result<StageOutcome, StageError> {
        let config = ctx.config;
        let silver = config.silver_dir();
        let gold = config.gold_dir();
        let n_series = self.sample_n_series.unwrap_or(config.settings.gold.sample_n_series);
        let n_days = self.sample_days.unwrap_or(config.settings.gold.sample_days);

        let mut report = StageReport::new(self.name(), config);
        report.dir("input_dir", &silver);
        report.dir("output_dir", &gold);
        report.note("sample_n_series", n_series);
        report.note("sample_days", n_days);

        let missing: Vec<&str> = REQUIRED_SILVER
            .iter()
            .copied()
            .filter(|name| !silver.join(name).is_file())
            .collect();
        if !missing.is_empty() {
            report.note("missing_files", missing.clone());
            return conclude(
                report,
                true,
                Some(format!("run silver first; missing {}", missing.join(", "))),
            );
        }

        let calendar_src = silver.join("calendar.parquet");
        let prices_src = silver.join("sell_prices.parquet");
        let sales_src = silver.join("sales_train_validation.parquet");

        report.push(build(
            "dim_calendar.parquet",
            &calendar_src,
            &gold,
            ctx.force,
            || calendar_gold(read_parquet(&calendar_src)?),
        ));
        report.push(build(
            "dim_series.parquet",
            &sales_src,
            &gold,
            ctx.force,
            || series_dim(read_columns(&sales_src, &SERIES_COLUMNS)?),
        ));
        report.push(build(
            "fact_sell_prices.parquet",
            &prices_src,
            &gold,
            ctx.force,
            || read_parquet(&prices_src),
        ));
        report.push(build(
            "fact_sales_long_sample.parquet",
            &sales_src,
            &gold,
            ctx.force,
            || sales_long_sample(&sales_src, n_series, n_days),
        ));

        conclude(report, false, Some("inspect notes.error for the failing table".to_string()))
    }
}

fn build<F>(name: &str, source: &Path, gold: &Path, force: bool, make: F) -> FileRecord
where
    F: FnOnce() -> Result<DataFrame, DataError>,
{
    let dest = gold.join(name);
    let result = materialize(&dest, force, || -> Result<(), DataError> {
        let mut df = make()?;
        write_parquet(&mut df, &dest)?;
        info!(table = name, rows = df.height(), "gold: built");
        Ok(())
    });
    match result {
        Ok(status) => match parquet_shape(&dest) {
            Ok(shape) => FileRecord::new(name, status)
                .with_source(source)
                .with_dest(&dest)
                .with_rows(shape.rows)
                .with_columns(shape.columns),
            Err(e) => FileRecord::failed(name, format!("read shape: {e}"))
                .with_source(source)
                .with_dest(&dest),
        },
        Err(e) => FileRecord::failed(name, e).with_source(source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PipelineConfig, ResolvedConfig};
    use shelfcast_core::StageStatus;

    fn config(root: &Path) -> ResolvedConfig {
        ResolvedConfig::resolve(PipelineConfig::default(), Path::new("c.toml"), root)
    }

    #[test]
    fn missing_silver_inputs_short_circuit() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        std::fs::create_dir_all(cfg.silver_dir()).unwrap();
        std::fs::write(cfg.silver_dir().join("calendar.parquet"), b"").unwrap();

        let outcome = GoldStage::default()
            .execute(&StageContext::new(&cfg, false))
            .unwrap();
        assert_eq!(outcome.status, StageStatus::MissingInput);

        let report: StageReport =
            serde_json::from_str(&std::fs::read_to_string(&outcome.report_path).unwrap()).unwrap();
        assert!(report.files.is_empty());
        assert_eq!(
            report.notes["missing_files"],
            serde_json::json!(["sell_prices.parquet", "sales_train_validation.parquet"])
        );
    }

    #[test]
    fn unreadable_existing_table_is_an_error_record() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("silver.parquet");
        let gold = dir.path().join("gold");
        std::fs::create_dir_all(&gold).unwrap();
        std::fs::write(gold.join("dim_series.parquet"), b"not parquet").unwrap();

        let record = build("dim_series.parquet", &source, &gold, false, || {
            unreachable!("existing output is not rebuilt")
        });
        assert_eq!(record.status, shelfcast_core::FileStatus::Error);
        assert!(record.error.unwrap().contains("read shape"));
    }
}
