//! Bronze: stream every raw CSV into an untyped-but-columnar Parquet table.

use shelfcast_core::data::{parquet_shape, DataError, StreamOptions, StreamingConverter};
use shelfcast_core::synthetic::RAW_FILES;
use shelfcast_core::FileStatus;
use std::path::Path;
use tracing::info;

use crate::report::{FileRecord, StageReport};
use crate::stage::{conclude, materialize, Stage, StageContext, StageError, StageOutcome};

#[derive(Debug, Clone, Copy, Default)]
pub struct BronzeStage;

impl Stage for BronzeStage {
    fn name(&self) -> &str {
        "bronze"
    }

    fn execute(&self, ctx: &StageContext<'_>) -> Result<StageOutcome, StageError> {
        let config = ctx.config;
        let input_dir = config.extracted_dir();
        let output_dir = config.bronze_dir();
        let mut report = StageReport::new(self.name(), config);
        report.dir("input_dir", &input_dir);
        report.dir("output_dir", &output_dir);

        let block_size = config.settings.bronze.block_size;
        report.note("block_size", block_size);
        let converter = StreamingConverter::new(StreamOptions {
            block_size,
            ..StreamOptions::default()
        });

        if !input_dir.is_dir() {
            for file in RAW_FILES {
                report.push(
                    FileRecord::new(file, FileStatus::Missing)
                        .with_source(&input_dir.join(file))
                        .with_dest(&output_dir.join(bronze_name(file))),
                );
            }
            report.note("missing_reason", "extracted directory does not exist");
            return conclude(report, true, Some("run ingest first".to_string()));
        }

        for file in RAW_FILES {
            let source = input_dir.join(file);
            let dest = output_dir.join(bronze_name(file));
            report.push(convert_one(&converter, file, &source, &dest, ctx.force));
        }
        conclude(
            report,
            false,
            Some("re-run ingest, then bronze with --force".to_string()),
        )
    }
}

/// `calendar.csv` -> `calendar.parquet`
pub fn bronze_name(csv_name: &str) -> String {
    format!("{}.parquet", csv_name.trim_end_matches(".csv"))
}

fn convert_one(
    converter: &StreamingConverter,
    name: &str,
    source: &Path,
    dest: &Path,
    force: bool,
) -> FileRecord {
    if !source.is_file() {
        return FileRecord::new(name, FileStatus::Missing)
            .with_source(source)
            .with_dest(dest);
    }

    let mut rows = None;
    let result = materialize(dest, force, || -> Result<(), DataError> {
        rows = Some(converter.convert(source, dest)?);
        Ok(())
    });
    let status = match result {
        Ok(status) => status,
        Err(e) => {
            return FileRecord::failed(name, e)
                .with_source(source)
                .with_dest(dest);
        }
    };

    // Existing outputs report the row count from Parquet metadata; an
    // existing file that cannot be read is not a usable artifact.
    let rows = match rows {
        Some(n) => {
            info!(
                "bronze: {name} -> {} ({n} rows)",
                dest.file_name().map(|f| f.to_string_lossy()).unwrap_or_default()
            );
            n
        }
        None => match parquet_shape(dest) {
            Ok(shape) => shape.rows,
            Err(e) => {
                return FileRecord::failed(name, e)
                    .with_source(source)
                    .with_dest(dest);
            }
        },
    };
    FileRecord::new(name, status)
        .with_source(source)
        .with_dest(dest)
        .with_rows(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PipelineConfig, ResolvedConfig};
    use shelfcast_core::StageStatus;
    use shelfcast_core::synthetic::SyntheticSpec;

    fn config(root: &Path) -> ResolvedConfig {
        ResolvedConfig::resolve(PipelineConfig::default(), Path::new("c.toml"), root)
    }

    #[test]
    fn no_extracted_dir_is_missing_input_with_records() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let outcome = BronzeStage.execute(&StageContext::new(&cfg, false)).unwrap();
        assert_eq!(outcome.status, StageStatus::MissingInput);

        let report: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&outcome.report_path).unwrap()).unwrap();
        assert_eq!(report["files"].as_array().unwrap().len(), RAW_FILES.len());
        assert_eq!(report["files"][0]["status"], "missing");
    }

    #[test]
    fn one_missing_csv_is_partial() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let spec = SyntheticSpec {
            n_series: 2,
            n_days: 10,
            seed: 1,
        };
        spec.write_csvs(&cfg.extracted_dir()).unwrap();
        std::fs::remove_file(cfg.extracted_dir().join("sample_submission.csv")).unwrap();

        let outcome = BronzeStage.execute(&StageContext::new(&cfg, false)).unwrap();
        assert_eq!(outcome.status, StageStatus::Partial);
        assert!(cfg.bronze_dir().join("calendar.parquet").is_file());
        assert!(!cfg.bronze_dir().join("sample_submission.parquet").exists());
    }

    #[test]
    fn malformed_csv_errors_without_stopping_the_others() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let spec = SyntheticSpec {
            n_series: 2,
            n_days: 10,
            seed: 1,
        };
        spec.write_csvs(&cfg.extracted_dir()).unwrap();
        // A row with too many fields is rejected by the CSV reader.
        std::fs::write(cfg.extracted_dir().join("sell_prices.csv"), "a,b\n1,2\n3,4,5\n").unwrap();

        let outcome = BronzeStage.execute(&StageContext::new(&cfg, false)).unwrap();
        assert_eq!(outcome.status, StageStatus::Error);
        assert!(cfg.bronze_dir().join("calendar.parquet").is_file());
        assert!(cfg.bronze_dir().join("sales_train_validation.parquet").is_file());
    }

    #[test]
    fn unreadable_existing_output_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let spec = SyntheticSpec {
            n_series: 2,
            n_days: 10,
            seed: 1,
        };
        spec.write_csvs(&cfg.extracted_dir()).unwrap();
        std::fs::create_dir_all(cfg.bronze_dir()).unwrap();
        std::fs::write(cfg.bronze_dir().join("calendar.parquet"), b"not parquet").unwrap();

        let outcome = BronzeStage.execute(&StageContext::new(&cfg, false)).unwrap();
        assert_eq!(outcome.status, StageStatus::Error);

        let report: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&outcome.report_path).unwrap()).unwrap();
        let calendar = report["files"]
            .as_array()
            .unwrap()
            .iter()
            .find(|f| f["name"] == "calendar.csv")
            .unwrap();
        assert_eq!(calendar["status"], "error");
        assert!(calendar["error"].is_string());
    }

    #[test]
    fn bronze_names() {
        assert_eq!(bronze_name("sell_prices.csv"), "sell_prices.parquet");
    }
}
