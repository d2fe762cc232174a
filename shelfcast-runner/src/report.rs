//! Stage reports: the durable, re-readable record of every invocation.
//!
//! A report is created when a stage starts, filled while it runs and written
//! once as pretty JSON. The orchestrator reads only the `status` field back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shelfcast_core::dq::{DqFileReport, GateResult};
use shelfcast_core::hashing::fingerprint;
use shelfcast_core::{derive_stage_status, DqStatus, FileStatus, StageStatus};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::config::{ResolvedConfig, DATASET_ID};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("serialize report {path}: {source}")]
    Serialize {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("write report {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// ─── Per-artifact record ────────────────────────────────────────────

/// One artifact within a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub name: String,
    pub status: FileStatus,
    pub source_path: Option<String>,
    pub dest_path: Option<String>,
    pub rows: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<usize>,
    pub source_bytes: Option<u64>,
    pub dest_bytes: Option<u64>,
    pub source_sha256: Option<String>,
    pub dest_sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileRecord {
    pub fn new(name: impl Into<String>, status: FileStatus) -> Self {
        Self {
            name: name.into(),
            status,
            source_path: None,
            dest_path: None,
            rows: None,
            columns: None,
            source_bytes: None,
            dest_bytes: None,
            source_sha256: None,
            dest_sha256: None,
            error: None,
        }
    }

    /// An artifact whose processing failed.
    pub fn failed(name: impl Into<String>, error: impl ToString) -> Self {
        let mut record = Self::new(name, FileStatus::Error);
        record.error = Some(error.to_string());
        record
    }

    /// Record the source path, plus its size and digest when it exists.
    pub fn with_source(mut self, path: &Path) -> Self {
        self.source_path = Some(path.display().to_string());
        match fingerprint(path) {
            Ok(Some((bytes, sha))) => {
                self.source_bytes = Some(bytes);
                self.source_sha256 = Some(sha);
            }
            Ok(None) => {}
            Err(e) => self.note_error(format!("fingerprint source: {e}")),
        }
        self
    }

    /// Record the destination path, plus its size and digest when it exists.
    pub fn with_dest(mut self, path: &Path) -> Self {
        self.dest_path = Some(path.display().to_string());
        match fingerprint(path) {
            Ok(Some((bytes, sha))) => {
                self.dest_bytes = Some(bytes);
                self.dest_sha256 = Some(sha);
            }
            Ok(None) => {}
            Err(e) => self.note_error(format!("fingerprint destination: {e}")),
        }
        self
    }

    pub fn with_rows(mut self, rows: usize) -> Self {
        self.rows = Some(rows);
        self
    }

    pub fn with_columns(mut self, columns: usize) -> Self {
        self.columns = Some(columns);
        self
    }

    fn note_error(&mut self, message: String) {
        self.error = Some(match self.error.take() {
            Some(prev) => format!("{prev}; {message}"),
            None => message,
        });
    }
}

// ─── Stage report ───────────────────────────────────────────────────

/// Outcome of one stage invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub pipeline: String,
    pub dataset_id: String,
    pub status: StageStatus,
    pub started_at_utc: DateTime<Utc>,
    pub finished_at_utc: Option<DateTime<Utc>>,
    pub config_path: String,
    /// Input and output directories, keyed by role (`input_dir`, `output_dir`, ...).
    pub dirs: BTreeMap<String, String>,
    pub report_path: String,
    pub files: Vec<FileRecord>,
    pub notes: BTreeMap<String, Value>,
}

impl StageReport {
    pub fn new(pipeline: &str, config: &ResolvedConfig) -> Self {
        Self {
            pipeline: pipeline.to_string(),
            dataset_id: DATASET_ID.to_string(),
            status: StageStatus::Ok,
            started_at_utc: Utc::now(),
            finished_at_utc: None,
            config_path: config.config_path.display().to_string(),
            dirs: BTreeMap::new(),
            report_path: config.report_path(pipeline).display().to_string(),
            files: Vec::new(),
            notes: BTreeMap::new(),
        }
    }

    pub fn dir(&mut self, role: &str, path: &Path) {
        self.dirs.insert(role.to_string(), path.display().to_string());
    }

    pub fn note(&mut self, key: &str, value: impl Into<Value>) {
        self.notes.insert(key.to_string(), value.into());
    }

    /// Append an artifact record; a failed one is also listed under `notes.error`.
    pub fn push(&mut self, record: FileRecord) {
        if record.status == FileStatus::Error {
            if let Some(message) = &record.error {
                let errors = self
                    .notes
                    .entry("error".to_string())
                    .or_insert_with(|| Value::Object(Default::default()));
                if let Value::Object(map) = errors {
                    map.insert(record.name.clone(), Value::String(message.clone()));
                }
            }
        }
        self.files.push(record);
    }

    /// Derive the status from the records and stamp the finish time.
    pub fn finish(&mut self, input_missing: bool) {
        self.status = derive_stage_status(self.files.iter().map(|f| f.status), input_missing);
        self.finished_at_utc = Some(Utc::now());
    }

    /// Stamp the finish time with a status decided by the stage itself.
    pub fn finish_with(&mut self, status: StageStatus) {
        self.status = status;
        self.finished_at_utc = Some(Utc::now());
    }
}

// ─── Data-quality report ────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DqReport {
    pub pipeline: String,
    pub dataset_id: String,
    pub status: DqStatus,
    pub started_at_utc: DateTime<Utc>,
    pub finished_at_utc: DateTime<Utc>,
    pub config_path: String,
    pub dirs: BTreeMap<String, String>,
    pub report_path: String,
    pub files: Vec<DqFileReport>,
    pub failures: Vec<String>,
    pub notes: BTreeMap<String, Value>,
}

impl DqReport {
    pub fn from_gate(
        pipeline: &str,
        config: &ResolvedConfig,
        started_at_utc: DateTime<Utc>,
        gate: GateResult,
    ) -> Self {
        Self {
            pipeline: pipeline.to_string(),
            dataset_id: DATASET_ID.to_string(),
            status: gate.status,
            started_at_utc,
            finished_at_utc: Utc::now(),
            config_path: config.config_path.display().to_string(),
            dirs: BTreeMap::new(),
            report_path: config.report_path(pipeline).display().to_string(),
            files: gate.files,
            failures: gate.failures,
            notes: BTreeMap::new(),
        }
    }
}

// ─── Orchestrator report ────────────────────────────────────────────

/// One entry in the orchestrator's stage list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSummary {
    pub pipeline: String,
    pub status: StageStatus,
    pub report_path: Option<String>,
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub pipeline: String,
    pub dataset_id: String,
    pub status: StageStatus,
    pub started_at_utc: DateTime<Utc>,
    pub finished_at_utc: Option<DateTime<Utc>>,
    pub config_path: String,
    pub report_path: String,
    pub stages: Vec<StageSummary>,
    pub notes: BTreeMap<String, Value>,
}

// ─── Persistence ────────────────────────────────────────────────────

/// Write `report` as pretty JSON, creating parent directories.
pub fn write_report<T: Serialize>(report: &T, path: &Path) -> Result<(), ReportError> {
    let json = serde_json::to_string_pretty(report).map_err(|e| ReportError::Serialize {
        path: path.display().to_string(),
        source: e,
    })?;
    let write_err = |e| ReportError::Write {
        path: path.display().to_string(),
        source: e,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }
    std::fs::write(path, json).map_err(write_err)
}

/// The `status` field of a written report, or `unknown` if it cannot be read.
pub fn read_status(path: &Path) -> StageStatus {
    let Ok(content) = std::fs::read_to_string(path) else {
        return StageStatus::Unknown;
    };
    let Ok(value) = serde_json::from_str::<Value>(&content) else {
        return StageStatus::Unknown;
    };
    value
        .get("status")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .unwrap_or(StageStatus::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;

    fn config(root: &Path) -> ResolvedConfig {
        ResolvedConfig::resolve(PipelineConfig::default(), Path::new("c.toml"), root)
    }

    #[test]
    fn report_round_trips_and_status_is_readable() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let mut report = StageReport::new("bronze", &cfg);
        report.push(FileRecord::new("calendar.csv", FileStatus::Exists).with_rows(3));
        report.push(FileRecord::new("sell_prices.csv", FileStatus::Missing));
        report.finish(false);
        assert_eq!(report.status, StageStatus::Partial);

        let path = cfg.report_path("bronze");
        write_report(&report, &path).unwrap();
        assert_eq!(read_status(&path), StageStatus::Partial);

        let back: StageReport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, report);
    }

    #[test]
    fn unreadable_report_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert_eq!(read_status(&missing), StageStatus::Unknown);

        let garbage = dir.path().join("garbage.json");
        std::fs::write(&garbage, "{ not json").unwrap();
        assert_eq!(read_status(&garbage), StageStatus::Unknown);

        let odd = dir.path().join("odd.json");
        std::fs::write(&odd, r#"{"status": "sideways"}"#).unwrap();
        assert_eq!(read_status(&odd), StageStatus::Unknown);
    }

    #[test]
    fn failed_records_are_collected_in_notes() {
        let dir = tempfile::tempdir().unwrap();
        let mut report = StageReport::new("silver", &config(dir.path()));
        report.push(FileRecord::failed("calendar", "cast of column 'wday' failed"));
        report.push(FileRecord::new("sell_prices", FileStatus::Ok));
        report.finish(false);

        assert_eq!(report.status, StageStatus::Error);
        assert_eq!(
            report.notes["error"]["calendar"],
            Value::String("cast of column 'wday' failed".into())
        );
    }

    #[test]
    fn records_fingerprint_existing_files_only() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.csv");
        std::fs::write(&src, "x\n1\n").unwrap();
        let record = FileRecord::new("a.csv", FileStatus::Ok)
            .with_source(&src)
            .with_dest(&dir.path().join("absent.parquet"));

        assert_eq!(record.source_bytes, Some(4));
        assert_eq!(record.source_sha256.as_ref().map(String::len), Some(64));
        assert!(record.dest_path.is_some());
        assert_eq!(record.dest_sha256, None);
        assert_eq!(record.error, None);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn file_status() -> impl Strategy<Value = FileStatus> {
            prop_oneof![
                Just(FileStatus::Ok),
                Just(FileStatus::Exists),
                Just(FileStatus::Missing),
                Just(FileStatus::Error),
            ]
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(32))]

            /// The status on disk is the status the stage computed, and every
            /// failed artifact shows up under `notes.error`.
            #[test]
            fn persisted_status_matches_records(
                statuses in prop::collection::vec(file_status(), 0..8),
                input_missing in any::<bool>(),
            ) {
                let dir = tempfile::tempdir().unwrap();
                let cfg = config(dir.path());
                let mut report = StageReport::new("prop", &cfg);
                for (i, status) in statuses.iter().enumerate() {
                    let record = match status {
                        FileStatus::Error => FileRecord::failed(format!("f{i}"), "boom"),
                        other => FileRecord::new(format!("f{i}"), *other),
                    };
                    report.push(record);
                }
                report.finish(input_missing);

                let path = cfg.report_path("prop");
                write_report(&report, &path).unwrap();
                prop_assert_eq!(read_status(&path), report.status);

                let failed = statuses.iter().filter(|s| **s == FileStatus::Error).count();
                let noted = report
                    .notes
                    .get("error")
                    .and_then(Value::as_object)
                    .map_or(0, |m| m.len());
                prop_assert_eq!(noted, failed);
            }
        }
    }
}
