//! Shelfcast Core: the data engine behind the staged retail pipeline.
//!
//! This crate knows nothing about config files or report locations:
//! - Status taxonomy shared by stages, artifacts and DQ checks
//! - Streaming SHA-256 digests
//! - Streaming CSV → Parquet conversion and per-table typing rules
//! - Gold table builders and the leakage-safe feature builder
//! - Data-quality gates
//! - The regression capability and its ridge baseline
//! - A seeded synthetic M5-shaped dataset

pub mod data;
pub mod dq;
pub mod features;
pub mod hashing;
pub mod model;
pub mod status;
pub mod synthetic;

pub use status::{derive_stage_status, CheckStatus, DqStatus, FileStatus, StageStatus};
