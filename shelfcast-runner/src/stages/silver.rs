//! Silver: apply the per-table typing rules to every bronze table.

use shelfcast_core::data::{parquet_shape, read_parquet, write_parquet, DataError, TypistRegistry};
use shelfcast_core::synthetic::RAW_FILES;
use shelfcast_core::FileStatus;
use std::path::Path;
use tracing::info;

use super::bronze::bronze_name;
use crate::report::{FileRecord, StageReport};
use crate::stage::{conclude, materialize, Stage, StageContext, StageError, StageOutcome};

pub struct SilverStage {
    registry: TypistRegistry,
}

impl Default for SilverStage {
    fn default() -> Self {
        Self::new(TypistRegistry::m5())
    }
}

impl SilverStage {
    pub fn new(registry: TypistRegistry) -> Self {
        Self { registry }
    }
}

impl Stage for SilverStage {
    fn name(&self) -> &str {
        "silver"
    }

    fn execute(&self, ctx: &StageContext<'_>) -> Result<StageOutcome, StageError> {
        let config = ctx.config;
        let input_dir = config.bronze_dir();
        let output_dir = config.silver_dir();
        let mut report = StageReport::new(self.name(), config);
        report.dir("input_dir", &input_dir);
        report.dir("output_dir", &output_dir);

        let tables: Vec<String> = RAW_FILES.iter().map(|f| bronze_name(f)).collect();
        if !input_dir.is_dir() {
            for name in &tables {
                report.push(FileRecord::new(name, FileStatus::Missing).with_source(&input_dir.join(name)));
            }
            report.note("missing_reason", "bronze directory does not exist");
            return conclude(report, true, Some("run bronze first".to_string()));
        }

        for name in &tables {
            let source = input_dir.join(name);
            let dest = output_dir.join(name);
            report.push(self.type_one(name, &source, &dest, ctx.force));
        }
        conclude(
            report,
            false,
            Some("a column did not fit its typed width; inspect notes.error".to_string()),
        )
    }
}

impl SilverStage {
    fn type_one(&self, name: &str, source: &Path, dest: &Path, force: bool) -> FileRecord {
        if !source.is_file() {
            return FileRecord::new(name, FileStatus::Missing).with_source(source);
        }
        let table = name.trim_end_matches(".parquet");

        let result = materialize(dest, force, || -> Result<(), DataError> {
            let raw = read_parquet(source)?;
            let mut typed = self.registry.apply(table, raw)?;
            write_parquet(&mut typed, dest)?;
            info!(table, rows = typed.height(), "silver: typed");
            Ok(())
        });
        let status = match result {
            Ok(status) => status,
            Err(e) => return FileRecord::failed(name, e).with_source(source),
        };

        match parquet_shape(dest) {
            Ok(shape) => FileRecord::new(name, status)
                .with_source(source)
                .with_dest(dest)
                .with_rows(shape.rows)
                .with_columns(shape.columns),
            Err(e) => FileRecord::failed(name, format!("read shape: {e}"))
                .with_source(source)
                .with_dest(dest),
        }
    }
}
