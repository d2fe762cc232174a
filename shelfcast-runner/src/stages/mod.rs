//! Every pipeline stage, in execution order.

pub mod bronze;
pub mod capture;
pub mod dq;
pub mod evaluate;
pub mod features;
pub mod gold;
pub mod ingest;
pub mod silver;
pub mod train;

pub use bronze::BronzeStage;
pub use capture::{ArchiveSource, CaptureStage, Fetched, LocalArchiveSource};
pub use dq::{DqFeaturesStage, DqGoldStage};
pub use evaluate::EvaluateStage;
pub use features::{features_path, FeaturesStage, FEATURES_FILE};
pub use gold::GoldStage;
pub use ingest::IngestStage;
pub use silver::SilverStage;
pub use train::TrainStage;
