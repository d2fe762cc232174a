//! End-to-end: synthetic M5 archive → run → features → DQ → train → eval.
//!
//! Also checks the idempotence property: a second run without `force`
//! rewrites nothing and reports identical digests and row counts.

use shelfcast_core::data::read_parquet;
use shelfcast_core::synthetic::SyntheticSpec;
use shelfcast_core::{FileStatus, StageStatus};
use shelfcast_runner::stages::{
    features_path, BronzeStage, DqFeaturesStage, DqGoldStage, EvaluateStage, FeaturesStage, TrainStage,
};
use shelfcast_runner::{
    run_stage, DqReport, Orchestrator, PipelineConfig, ResolvedConfig, RunReport, StageContext,
    StageReport,
};
use std::path::{Path, PathBuf};

const N_SERIES: usize = 4;
const N_DAYS: usize = 90;
const HORIZON: usize = 28;

fn setup(root: &Path) -> (ResolvedConfig, PathBuf) {
    let spec = SyntheticSpec {
        n_series: 6,
        n_days: 120,
        seed: 7,
    };
    let downloads = root.join("downloads");
    let zip = spec.write_zip(&downloads, "m5.zip").unwrap();

    let mut settings = PipelineConfig::default();
    settings.gold.sample_n_series = N_SERIES;
    settings.gold.sample_days = N_DAYS;
    settings.features.horizon = HORIZON;
    settings.bronze.block_size = 4 * 1024;
    let cfg = ResolvedConfig::resolve(settings, Path::new("configs/test.toml"), root);
    cfg.ensure_dirs().unwrap();
    (cfg, zip)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> T {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

fn stage_report(cfg: &ResolvedConfig, name: &str) -> StageReport {
    read_json(&cfg.report_path(name))
}

#[test]
fn full_pipeline_on_synthetic_archive() {
    let dir = tempfile::tempdir().unwrap();
    let (cfg, zip) = setup(dir.path());
    let ctx = StageContext::new(&cfg, false);

    // ── Orchestrated stages ──
    let orchestrator = Orchestrator::standard(Some(zip));
    let outcome = run_stage(&orchestrator, &ctx, true).unwrap();
    assert_eq!(outcome.status, StageStatus::Ok);

    let run: RunReport = read_json(&outcome.report_path);
    assert_eq!(run.stages.len(), 5);
    assert!(run.stages.iter().all(|s| s.status == StageStatus::Ok), "{:?}", run.stages);

    let bronze = stage_report(&cfg, "bronze");
    assert_eq!(bronze.files.len(), 5);
    for record in &bronze.files {
        assert_eq!(record.status, FileStatus::Ok, "{}", record.name);
        assert!(record.rows.is_some());
        assert_eq!(record.dest_sha256.as_ref().map(String::len), Some(64));
        assert_eq!(record.source_sha256.as_ref().map(String::len), Some(64));
    }

    let ingest = stage_report(&cfg, "ingest");
    assert_eq!(ingest.notes["n_entries"], 5);
    assert!(ingest.notes["archive_sha256"].is_string());

    let sample = read_parquet(&cfg.gold_dir().join("fact_sales_long_sample.parquet")).unwrap();
    assert_eq!(sample.height(), N_SERIES * N_DAYS);

    // ── Features, gates, model ──
    let features = run_stage(&FeaturesStage::default(), &ctx, true).unwrap();
    assert_eq!(features.status, StageStatus::Ok);
    let table = read_parquet(&features_path(&cfg)).unwrap();
    assert_eq!(table.height(), N_SERIES * N_DAYS);
    let report = stage_report(&cfg, "build_features");
    assert_eq!(report.notes["n_test"], N_SERIES * HORIZON);
    assert_eq!(report.notes["short_series"], serde_json::json!([]));

    let dq = run_stage(&DqGoldStage, &ctx, true).unwrap();
    assert_eq!(dq.status, StageStatus::Ok);
    let dq_report: DqReport = read_json(&cfg.report_path("dq"));
    assert_eq!(dq_report.files.len(), 4);
    assert!(dq_report.files.iter().all(|f| f.sha256.is_some()));

    let dq_features = run_stage(&DqFeaturesStage::default(), &ctx, true).unwrap();
    assert_eq!(dq_features.status, StageStatus::Ok);

    let train = run_stage(&TrainStage, &ctx, true).unwrap();
    assert_eq!(train.status, StageStatus::Ok);
    assert!(cfg.model_path().is_file());
    let train_report = stage_report(&cfg, "train");
    assert_eq!(train_report.notes["n_rows"], N_SERIES * N_DAYS);
    let used = train_report.notes["n_train_used"].as_u64().unwrap() as usize;
    // Training rows need lag_28 and roll_mean_28: days 29..=62 of each series.
    assert_eq!(used, N_SERIES * (N_DAYS - HORIZON - 28));

    let eval = run_stage(&EvaluateStage, &ctx, true).unwrap();
    assert_eq!(eval.status, StageStatus::Ok);
    let eval_report = stage_report(&cfg, "eval");
    assert_eq!(eval_report.notes["n_eval_used"], N_SERIES * HORIZON);
    assert!(eval_report.notes["metrics"]["mae"].as_f64().unwrap() >= 0.0);

    let predictions = std::fs::read_to_string(
        cfg.paths.outputs_tables.join("eval_m5_predictions.csv"),
    )
    .unwrap();
    let mut lines = predictions.lines();
    assert_eq!(lines.next(), Some("id,d,y_true,y_pred"));
    assert_eq!(lines.count(), N_SERIES * HORIZON);
}

#[test]
fn second_run_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let (cfg, zip) = setup(dir.path());
    let ctx = StageContext::new(&cfg, false);
    let orchestrator = Orchestrator::standard(Some(zip));

    run_stage(&orchestrator, &ctx, true).unwrap();
    let names = ["ingest", "bronze", "silver", "gold"];
    let first: Vec<StageReport> = names.iter().map(|n| stage_report(&cfg, n)).collect();

    let outcome = run_stage(&orchestrator, &ctx, true).unwrap();
    assert_eq!(outcome.status, StageStatus::Ok);
    let run: RunReport = read_json(&outcome.report_path);
    assert!(run.stages.iter().all(|s| s.status == StageStatus::Exists), "{:?}", run.stages);

    for (name, before) in names.iter().zip(&first) {
        let after = stage_report(&cfg, name);
        assert_eq!(after.status, StageStatus::Exists, "{name}");
        assert_eq!(after.files.len(), before.files.len(), "{name}");
        for (a, b) in after.files.iter().zip(&before.files) {
            assert_eq!(a.status, FileStatus::Exists, "{name}/{}", a.name);
            assert_eq!(a.dest_sha256, b.dest_sha256, "{name}/{}", a.name);
            assert_eq!(a.rows, b.rows, "{name}/{}", a.name);
        }
    }
}

#[test]
fn forced_rerun_rewrites_identical_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let (cfg, zip) = setup(dir.path());
    let orchestrator = Orchestrator::standard(Some(zip));
    run_stage(&orchestrator, &StageContext::new(&cfg, false), true).unwrap();
    let before = stage_report(&cfg, "bronze");

    let forced = StageContext::new(&cfg, true);
    run_stage(&BronzeStage, &forced, true).unwrap();
    let after = stage_report(&cfg, "bronze");

    for (a, b) in after.files.iter().zip(&before.files) {
        assert_eq!(a.status, FileStatus::Ok);
        assert_eq!(a.dest_sha256, b.dest_sha256, "{}", a.name);
    }
}

#[test]
fn run_without_archive_stops_at_capture() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = ResolvedConfig::resolve(PipelineConfig::default(), Path::new("c.toml"), dir.path());
    let ctx = StageContext::new(&cfg, false);
    let outcome = run_stage(&Orchestrator::standard(None), &ctx, false).unwrap();
    assert_eq!(outcome.status, StageStatus::Error);

    let run: RunReport = read_json(&outcome.report_path);
    assert_eq!(run.stages[0].status, StageStatus::MissingInput);
    assert!(run.stages[1..].iter().all(|s| s.status == StageStatus::Skipped));
}
