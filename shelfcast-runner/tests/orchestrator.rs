//! Orchestrator short-circuit and status re-derivation, using scripted stages.

use shelfcast_core::{FileStatus, StageStatus};
use shelfcast_runner::orchestrator::SKIP_NOTE;
use shelfcast_runner::stage::conclude;
use shelfcast_runner::{
    read_status, run_stage, FileRecord, Orchestrator, PipelineConfig, ResolvedConfig, RunReport,
    Stage, StageContext, StageError, StageOutcome, StageReport,
};
use std::cell::Cell;
use std::path::Path;
use std::rc::Rc;

/// Writes a report with one artifact of the given status.
struct Scripted {
    name: &'static str,
    file: FileStatus,
    input_missing: bool,
    calls: Rc<Cell<usize>>,
}

impl Scripted {
    fn new(name: &'static str, file: FileStatus, input_missing: bool) -> (Self, Rc<Cell<usize>>) {
        let calls = Rc::new(Cell::new(0));
        let stage = Self {
            name,
            file,
            input_missing,
            calls: calls.clone(),
        };
        (stage, calls)
    }
}

impl Stage for Scripted {
    fn name(&self) -> &str {
        self.name
    }

    fn execute(&self, ctx: &StageContext<'_>) -> Result<StageOutcome, StageError> {
        self.calls.set(self.calls.get() + 1);
        let mut report = StageReport::new(self.name, ctx.config);
        if !self.input_missing {
            report.push(FileRecord::new("artifact", self.file));
        }
        conclude(report, self.input_missing, Some(format!("fix {}", self.name)))
    }
}

/// Returns normally with `ok` but leaves a report that says `error`.
struct Liar;

impl Stage for Liar {
    fn name(&self) -> &str {
        "liar"
    }

    fn execute(&self, ctx: &StageContext<'_>) -> Result<StageOutcome, StageError> {
        let path = ctx.config.report_path("liar");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{"status": "error"}"#).unwrap();
        Ok(StageOutcome {
            pipeline: "liar".into(),
            status: StageStatus::Ok,
            report_path: path,
            hint: None,
        })
    }
}

fn config(root: &Path) -> ResolvedConfig {
    ResolvedConfig::resolve(PipelineConfig::default(), Path::new("c.toml"), root)
}

fn read_run(path: &Path) -> RunReport {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn missing_input_in_the_middle_skips_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let (a, a_calls) = Scripted::new("a", FileStatus::Ok, false);
    let (b, b_calls) = Scripted::new("b", FileStatus::Ok, true);
    let (c, c_calls) = Scripted::new("c", FileStatus::Ok, false);
    let orchestrator = Orchestrator::new(vec![Box::new(a), Box::new(b), Box::new(c)]);

    let outcome = orchestrator
        .execute(&StageContext::new(&cfg, false))
        .unwrap();
    assert_ne!(outcome.status, StageStatus::Ok);
    assert_eq!((a_calls.get(), b_calls.get(), c_calls.get()), (1, 1, 0));

    let run = read_run(&outcome.report_path);
    let statuses: Vec<_> = run.stages.iter().map(|s| (s.pipeline.as_str(), s.status)).collect();
    assert_eq!(
        statuses,
        [
            ("a", StageStatus::Ok),
            ("b", StageStatus::MissingInput),
            ("c", StageStatus::Skipped)
        ]
    );
    assert_eq!(run.stages[2].note.as_deref(), Some(SKIP_NOTE));
    assert_eq!(run.stages[2].report_path, None);
    assert_eq!(run.status, StageStatus::Error);
    assert_eq!(run.notes["stage_order"], serde_json::json!(["a", "b", "c"]));
    assert_eq!(run.notes["success_statuses"], serde_json::json!(["ok", "exists"]));
    assert_eq!(run.notes["stop_on_first_failure"], true);
    assert_eq!(run.notes["config_fingerprint"].as_str().map(str::len), Some(64));
    assert!(!cfg.report_path("c").exists());
}

#[test]
fn all_success_is_ok_and_exists_counts_as_success() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let (a, _) = Scripted::new("a", FileStatus::Exists, false);
    let (b, _) = Scripted::new("b", FileStatus::Ok, false);
    let orchestrator = Orchestrator::new(vec![Box::new(a), Box::new(b)]);

    let outcome = run_stage(&orchestrator, &StageContext::new(&cfg, false), true).unwrap();
    assert_eq!(outcome.status, StageStatus::Ok);
    let run = read_run(&outcome.report_path);
    assert_eq!(run.stages[0].status, StageStatus::Exists);
    assert!(run.stages.iter().all(|s| s.error.is_none()));
}

#[test]
fn report_status_overrides_returned_status() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let (after, after_calls) = Scripted::new("after", FileStatus::Ok, false);
    let orchestrator = Orchestrator::new(vec![Box::new(Liar), Box::new(after)]);

    let outcome = orchestrator
        .execute(&StageContext::new(&cfg, false))
        .unwrap();
    assert_eq!(outcome.status, StageStatus::Error);
    assert_eq!(after_calls.get(), 0);
    assert_eq!(read_run(&outcome.report_path).stages[0].status, StageStatus::Error);
}

#[test]
fn strict_run_raises_with_its_own_report_path() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let (a, _) = Scripted::new("a", FileStatus::Error, false);
    let orchestrator = Orchestrator::new(vec![Box::new(a)]);

    let err = run_stage(&orchestrator, &StageContext::new(&cfg, false), true).unwrap_err();
    match err {
        StageError::Failed {
            pipeline,
            report_path,
            ..
        } => {
            assert_eq!(pipeline, "run");
            assert_eq!(report_path, cfg.report_path("run"));
            assert_eq!(read_status(&report_path), StageStatus::Error);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unreadable_stage_report_is_unknown_and_stops() {
    struct Silent;

    impl Stage for Silent {
        fn name(&self) -> &str {
            "silent"
        }

        fn execute(&self, ctx: &StageContext<'_>) -> Result<StageOutcome, StageError> {
            Ok(StageOutcome {
                pipeline: "silent".into(),
                status: StageStatus::Ok,
                report_path: ctx.config.report_path("never_written"),
                hint: None,
            })
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let (after, _) = Scripted::new("after", FileStatus::Ok, false);
    let orchestrator = Orchestrator::new(vec![Box::new(Silent), Box::new(after)]);
    let outcome = orchestrator
        .execute(&StageContext::new(&cfg, false))
        .unwrap();

    let run = read_run(&outcome.report_path);
    assert_eq!(run.stages[0].status, StageStatus::Unknown);
    assert_eq!(run.stages[1].status, StageStatus::Skipped);
}
