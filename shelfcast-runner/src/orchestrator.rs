//! Orchestrator: run stages in order, stop at the first non-success.
//!
//! Each stage runs leniently. Its status is re-read from the report it wrote,
//! so a stage that returns normally but reports a failure still stops the
//! chain. Stages after the first failure are listed as `skipped` and never
//! invoked.

use chrono::Utc;
use serde_json::Value;
use shelfcast_core::StageStatus;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{error, info, warn};

use crate::config::DATASET_ID;
use crate::report::{read_status, write_report, RunReport, StageSummary};
use crate::stage::{Stage, StageContext, StageError, StageOutcome};
use crate::stages::{BronzeStage, CaptureStage, GoldStage, IngestStage, SilverStage};

pub const SKIP_NOTE: &str = "Skipped due to earlier failure.";

pub struct Orchestrator {
    stages: Vec<Box<dyn Stage>>,
}

impl Orchestrator {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self { stages }
    }

    /// capture → ingest → bronze → silver → gold
    pub fn standard(zip_path: Option<PathBuf>) -> Self {
        Self::new(vec![
            Box::new(CaptureStage::from_local(zip_path.clone())),
            Box::new(IngestStage::new(zip_path)),
            Box::new(BronzeStage),
            Box::new(SilverStage::default()),
            Box::new(GoldStage::default()),
        ])
    }

    pub fn stage_names(&self) -> Vec<String> {
        self.stages.iter().map(|s| s.name().to_string()).collect()
    }
}

impl Stage for Orchestrator {
    fn name(&self) -> &str {
        "run"
    }

    fn execute(&self, ctx: &StageContext<'_>) -> Result<StageOutcome, StageError> {
        let config = ctx.config;
        let report_path = config.report_path(self.name());
        let mut notes: BTreeMap<String, Value> = BTreeMap::new();
        notes.insert("stop_on_first_failure".into(), true.into());
        notes.insert("force_overwrite".into(), ctx.force.into());
        notes.insert(
            "success_statuses".into(),
            StageStatus::SUCCESS
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .into(),
        );
        notes.insert("stage_order".into(), self.stage_names().into());
        match config.fingerprint() {
            Ok(fp) => notes.insert("config_fingerprint".into(), fp.into()),
            Err(e) => notes.insert("config_fingerprint_error".into(), e.to_string().into()),
        };

        let mut report = RunReport {
            pipeline: self.name().to_string(),
            dataset_id: DATASET_ID.to_string(),
            status: StageStatus::Ok,
            started_at_utc: Utc::now(),
            finished_at_utc: None,
            config_path: config.config_path.display().to_string(),
            report_path: report_path.display().to_string(),
            stages: Vec::with_capacity(self.stages.len()),
            notes,
        };

        let mut stopped_by: Option<String> = None;
        for stage in &self.stages {
            if stopped_by.is_some() {
                info!(stage = stage.name(), "run: skipped");
                report.stages.push(StageSummary {
                    pipeline: stage.name().to_string(),
                    status: StageStatus::Skipped,
                    report_path: None,
                    error: None,
                    note: Some(SKIP_NOTE.to_string()),
                });
                continue;
            }

            info!(stage = stage.name(), "run: starting");
            let summary = match stage.execute(ctx) {
                Ok(outcome) => StageSummary {
                    pipeline: outcome.pipeline,
                    status: read_status(&outcome.report_path),
                    report_path: Some(outcome.report_path.display().to_string()),
                    error: None,
                    note: outcome.hint,
                },
                Err(e) => {
                    error!(stage = stage.name(), error = %e, "run: stage raised");
                    StageSummary {
                        pipeline: stage.name().to_string(),
                        status: StageStatus::Error,
                        report_path: Some(config.report_path(stage.name()).display().to_string()),
                        error: Some(e.to_string()),
                        note: None,
                    }
                }
            };
            if !summary.status.is_success() {
                warn!(stage = %summary.pipeline, status = %summary.status, "run: stopping");
                stopped_by = Some(summary.pipeline.clone());
            }
            report.stages.push(summary);
        }

        report.status = if stopped_by.is_none() {
            StageStatus::Ok
        } else {
            StageStatus::Error
        };
        if let Some(stage) = &stopped_by {
            report.notes.insert("failed_stage".into(), stage.clone().into());
        }
        report.finished_at_utc = Some(Utc::now());
        write_report(&report, &report_path)?;
        info!(status = %report.status, report = %report_path.display(), "run: finished");

        Ok(StageOutcome {
            pipeline: report.pipeline,
            status: report.status,
            report_path,
            hint: stopped_by.map(|s| format!("stage '{s}' did not succeed; see its report")),
        })
    }
}
