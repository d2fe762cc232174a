//! Data-quality gates as stages.
//!
//! Both gates always finish and write a [`DqReport`]. `warn` is tolerated by
//! strict callers; only `fail` raises.

use chrono::Utc;
use shelfcast_core::dq::{feature_gate, gold_gate, GateResult};
use shelfcast_core::{DqStatus, StageStatus};
use std::path::PathBuf;
use tracing::{info, warn};

use super::features::features_path;
use crate::config::ResolvedConfig;
use crate::report::{write_report, DqReport};
use crate::stage::{Stage, StageContext, StageError, StageOutcome};

/// Gate over the four gold tables; writes `dq_m5.json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DqGoldStage;

/// Gate over the feature table; writes `dq_features_m5.json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DqFeaturesStage {
    pub horizon: Option<usize>,
}

impl Stage for DqGoldStage {
    fn name(&self) -> &str {
        "dq"
    }

    fn execute(&self, ctx: &StageContext<'_>) -> Result<StageOutcome, StageError> {
        let started = Utc::now();
        let gold = ctx.config.gold_dir();
        let gate = gold_gate(&gold);
        let mut report = DqReport::from_gate(self.name(), ctx.config, started, gate);
        report.dirs.insert("gold_dir".into(), gold.display().to_string());
        finish(report, "fix the failing gold tables, then rerun gold with --force")
    }

    fn tolerates(&self, status: StageStatus) -> bool {
        status != StageStatus::Fail
    }
}

impl Stage for DqFeaturesStage {
    fn name(&self) -> &str {
        "dq_features"
    }

    fn execute(&self, ctx: &StageContext<'_>) -> Result<StageOutcome, StageError> {
        let started = Utc::now();
        let horizon = self.horizon(ctx.config);
        let path = features_path(ctx.config);
        let gate: GateResult = feature_gate(&path, horizon);
        let mut report = DqReport::from_gate(self.name(), ctx.config, started, gate);
        report
            .dirs
            .insert("gold_dir".into(), ctx.config.gold_dir().display().to_string());
        report.notes.insert("horizon".into(), horizon.into());
        report.notes.insert(
            "min_history".into(),
            (horizon + shelfcast_core::features::MAX_LOOKBACK).into(),
        );
        finish(
            report,
            "series need at least horizon + 28 days of history; enable [features] min_history_filter or widen the gold sample",
        )
    }

    fn tolerates(&self, status: StageStatus) -> bool {
        status != StageStatus::Fail
    }
}

impl DqFeaturesStage {
    fn horizon(&self, config: &ResolvedConfig) -> usize {
        self.horizon.unwrap_or(config.settings.features.horizon)
    }
}

fn finish(report: DqReport, hint: &str) -> Result<StageOutcome, StageError> {
    let report_path = PathBuf::from(&report.report_path);
    write_report(&report, &report_path)?;

    match report.status {
        DqStatus::Ok => info!(stage = %report.pipeline, "dq: all checks passed"),
        DqStatus::Warn => warn!(stage = %report.pipeline, "dq: passed with warnings"),
        DqStatus::Fail => warn!(
            stage = %report.pipeline,
            failures = ?report.failures,
            "dq: gate failed"
        ),
    }

    let status = report.status.stage_status();
    Ok(StageOutcome {
        pipeline: report.pipeline,
        status,
        report_path,
        hint: (report.status == DqStatus::Fail).then(|| hint.to_string()),
    })
}
