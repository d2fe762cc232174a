//! The execution envelope shared by every stage.
//!
//! A stage processes each artifact independently, always writes its report,
//! and returns `{status, report_path}`. Whether a non-success status becomes
//! an error is the caller's choice: [`run_stage`] with `strict = true` maps it
//! to [`StageError::Failed`], while the orchestrator inspects it leniently.

use shelfcast_core::{FileStatus, StageStatus};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ResolvedConfig;
use crate::report::{write_report, ReportError, StageReport};

#[derive(Debug, Error)]
pub enum StageError {
    #[error(
        "{pipeline} finished with status '{status}': {}. See report: {}",
        .hint.as_deref().unwrap_or("inspect the report for per-file detail"),
        .report_path.display()
    )]
    Failed {
        pipeline: String,
        status: StageStatus,
        report_path: PathBuf,
        hint: Option<String>,
    },

    #[error(transparent)]
    Report(#[from] ReportError),
}

/// Everything a stage reads. Shared immutably across a run.
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    pub config: &'a ResolvedConfig,
    /// Rebuild artifacts that already exist.
    pub force: bool,
}

impl<'a> StageContext<'a> {
    pub fn new(config: &'a ResolvedConfig, force: bool) -> Self {
        Self { config, force }
    }
}

/// What a stage hands back after writing its report.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutcome {
    pub pipeline: String,
    pub status: StageStatus,
    pub report_path: PathBuf,
    /// Remediation hint for a non-success status.
    pub hint: Option<String>,
}

pub trait Stage {
    /// Pipeline name; also names the report file.
    fn name(&self) -> &str;

    /// Run leniently: process every artifact, write the report, return its status.
    fn execute(&self, ctx: &StageContext<'_>) -> Result<StageOutcome, StageError>;

    /// Whether `status` is acceptable to a strict caller.
    fn tolerates(&self, status: StageStatus) -> bool {
        status.is_success()
    }
}

/// Run `stage` and, when `strict`, turn an intolerable status into an error.
///
/// The report is always written before the status is judged.
pub fn run_stage(
    stage: &dyn Stage,
    ctx: &StageContext<'_>,
    strict: bool,
) -> Result<StageOutcome, StageError> {
    let outcome = stage.execute(ctx)?;
    if strict && !stage.tolerates(outcome.status) {
        return Err(StageError::Failed {
            pipeline: outcome.pipeline,
            status: outcome.status,
            report_path: outcome.report_path,
            hint: outcome.hint,
        });
    }
    Ok(outcome)
}

/// Finish, persist and summarise a stage report.
pub fn conclude(
    mut report: StageReport,
    input_missing: bool,
    hint: Option<String>,
) -> Result<StageOutcome, StageError> {
    report.finish(input_missing);
    persist(report, hint)
}

/// Persist a report whose status is already final.
pub fn persist(report: StageReport, hint: Option<String>) -> Result<StageOutcome, StageError> {
    let report_path = PathBuf::from(&report.report_path);
    write_report(&report, &report_path)?;

    if report.status.is_success() {
        info!(stage = %report.pipeline, status = %report.status, report = %report_path.display(), "stage finished");
    } else {
        warn!(stage = %report.pipeline, status = %report.status, report = %report_path.display(), "stage finished");
    }
    let hint = if report.status.is_success() { None } else { hint };
    Ok(StageOutcome {
        pipeline: report.pipeline,
        status: report.status,
        report_path,
        hint,
    })
}

/// Produce one artifact under the skip/overwrite rule.
///
/// An existing `dest` is kept as-is unless `force`; otherwise `build` writes it.
pub fn materialize<F, E>(dest: &Path, force: bool, build: F) -> Result<FileStatus, E>
where
    F: FnOnce() -> Result<(), E>,
{
    if dest.exists() && !force {
        debug!(dest = %dest.display(), "exists, skipping");
        return Ok(FileStatus::Exists);
    }
    build()?;
    Ok(FileStatus::Ok)
}
