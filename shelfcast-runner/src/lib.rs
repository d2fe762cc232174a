//! Shelfcast Runner: stages, reports, configuration and orchestration.
//!
//! This crate builds on `shelfcast-core` to provide:
//! - TOML configuration resolved to absolute directories
//! - The stage contract: idempotent skip, forced rebuild, strict vs lenient
//! - Durable JSON reports for every stage and every run
//! - Capture, ingest, bronze, silver, gold, features, DQ, train and eval stages
//! - An orchestrator that stops at the first failed stage
//! - CSV and LaTeX exports of evaluation results

pub mod config;
pub mod export;
pub mod logging;
pub mod orchestrator;
pub mod report;
pub mod stage;
pub mod stages;

pub use config::{ConfigError, PipelineConfig, ResolvedConfig, DATASET_ID, DEFAULT_CONFIG_PATH};
pub use logging::{init_tracing, LogFormat};
pub use orchestrator::Orchestrator;
pub use report::{read_status, write_report, DqReport, FileRecord, RunReport, StageReport, StageSummary};
pub use stage::{run_stage, Stage, StageContext, StageError, StageOutcome};
