//! Pipeline configuration: TOML settings resolved to absolute directories.
//!
//! Every section has defaults, so an empty file is a valid config. Relative
//! paths resolve against `[project] root`, which itself defaults to the
//! directory the pipeline is launched from.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Dataset identifier recorded in every report.
pub const DATASET_ID: &str = "m5";

/// Config file used when the caller does not name one.
pub const DEFAULT_CONFIG_PATH: &str = "configs/default.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("create directory {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
}

// ─── Settings as written in TOML ────────────────────────────────────

/// Raw settings, one field per TOML section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub project: ProjectSection,
    pub paths: PathsSection,
    pub logging: LoggingSection,
    pub ingest: IngestSection,
    pub bronze: BronzeSection,
    pub gold: GoldSection,
    pub features: FeaturesSection,
    pub train: TrainSection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSection {
    pub root: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsSection {
    pub data_raw: PathBuf,
    pub data_interim: PathBuf,
    pub data_processed: PathBuf,
    pub outputs_reports: PathBuf,
    pub outputs_models: PathBuf,
    pub outputs_tables: PathBuf,
    pub outputs_figures: PathBuf,
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            data_raw: "data/raw".into(),
            data_interim: "data/interim".into(),
            data_processed: "data/processed".into(),
            outputs_reports: "outputs/reports".into(),
            outputs_models: "outputs/models".into(),
            outputs_tables: "outputs/tables".into(),
            outputs_figures: "outputs/figures".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// `tracing` filter directive; `RUST_LOG` takes precedence.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSection {
    /// Archive names searched in the raw dataset directory, in order.
    pub zip_names: Vec<String>,
}

impl Default for IngestSection {
    fn default() -> Self {
        Self {
            zip_names: vec!["m5-forecasting-accuracy.zip".to_string(), "m5.zip".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BronzeSection {
    /// Bytes of CSV buffered per streamed batch.
    pub block_size: usize,
}

impl Default for BronzeSection {
    fn default() -> Self {
        Self {
            block_size: 1 << 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoldSection {
    pub sample_n_series: usize,
    pub sample_days: usize,
}

impl Default for GoldSection {
    fn default() -> Self {
        Self {
            sample_n_series: 20,
            sample_days: 365,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesSection {
    pub horizon: usize,
    /// Drop series shorter than `horizon + 28` rows before building features.
    pub min_history_filter: bool,
}

impl Default for FeaturesSection {
    fn default() -> Self {
        Self {
            horizon: 28,
            min_history_filter: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainSection {
    pub alpha: f64,
}

impl Default for TrainSection {
    fn default() -> Self {
        Self { alpha: 1.0 }
    }
}

impl PipelineConfig {
    /// Load settings from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse settings from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.features.horizon == 0 {
            return Err(ConfigError::Invalid("features.horizon must be at least 1".into()));
        }
        if self.gold.sample_n_series == 0 || self.gold.sample_days == 0 {
            return Err(ConfigError::Invalid(
                "gold.sample_n_series and gold.sample_days must be at least 1".into(),
            ));
        }
        if self.bronze.block_size == 0 {
            return Err(ConfigError::Invalid("bronze.block_size must be at least 1".into()));
        }
        if self.train.alpha.is_nan() || self.train.alpha < 0.0 {
            return Err(ConfigError::Invalid("train.alpha must be non-negative".into()));
        }
        if self.ingest.zip_names.is_empty() {
            return Err(ConfigError::Invalid("ingest.zip_names must not be empty".into()));
        }
        Ok(())
    }
}

// ─── Resolved configuration ─────────────────────────────────────────

/// Absolute directories for every logical path key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedPaths {
    pub data_raw: PathBuf,
    pub data_interim: PathBuf,
    pub data_processed: PathBuf,
    pub outputs_reports: PathBuf,
    pub outputs_models: PathBuf,
    pub outputs_tables: PathBuf,
    pub outputs_figures: PathBuf,
}

impl ResolvedPaths {
    /// `(key, path)` pairs in declaration order.
    pub fn entries(&self) -> [(&'static str, &Path); 7] {
        [
            ("data_raw", &self.data_raw),
            ("data_interim", &self.data_interim),
            ("data_processed", &self.data_processed),
            ("outputs_reports", &self.outputs_reports),
            ("outputs_models", &self.outputs_models),
            ("outputs_tables", &self.outputs_tables),
            ("outputs_figures", &self.outputs_figures),
        ]
    }
}

/// Settings plus the directories they resolve to. Read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedConfig {
    pub config_path: PathBuf,
    pub project_root: PathBuf,
    pub paths: ResolvedPaths,
    pub settings: PipelineConfig,
}

impl ResolvedConfig {
    /// Load `config_path` and resolve it against the current directory.
    pub fn load(config_path: &Path) -> Result<Self, ConfigError> {
        let settings = PipelineConfig::from_file(config_path)?;
        let cwd = std::env::current_dir().map_err(|e| ConfigError::Read {
            path: ".".to_string(),
            source: e,
        })?;
        Ok(Self::resolve(settings, config_path, &cwd))
    }

    /// Resolve settings against `base`; a relative `[project] root` is itself
    /// resolved against `base` first.
    pub fn resolve(settings: PipelineConfig, config_path: &Path, base: &Path) -> Self {
        let project_root = match &settings.project.root {
            Some(root) => absolutize(base, root),
            None => base.to_path_buf(),
        };
        let p = &settings.paths;
        let paths = ResolvedPaths {
            data_raw: absolutize(&project_root, &p.data_raw),
            data_interim: absolutize(&project_root, &p.data_interim),
            data_processed: absolutize(&project_root, &p.data_processed),
            outputs_reports: absolutize(&project_root, &p.outputs_reports),
            outputs_models: absolutize(&project_root, &p.outputs_models),
            outputs_tables: absolutize(&project_root, &p.outputs_tables),
            outputs_figures: absolutize(&project_root, &p.outputs_figures),
        };
        Self {
            config_path: absolutize(base, config_path),
            project_root,
            paths,
            settings,
        }
    }

    /// Create every configured directory. Safe to call repeatedly.
    pub fn ensure_dirs(&self) -> Result<(), ConfigError> {
        for (_, dir) in self.paths.entries() {
            std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir {
                path: dir.display().to_string(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// Content hash of the resolved paths and settings.
    ///
    /// Two runs with identical effective configuration share a fingerprint.
    pub fn fingerprint(&self) -> Result<String, ConfigError> {
        let json = serde_json::to_string(&(&self.paths, &self.settings))?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }

    // ── Dataset layout ──

    pub fn raw_dataset_dir(&self) -> PathBuf {
        self.paths.data_raw.join(DATASET_ID)
    }

    pub fn extracted_dir(&self) -> PathBuf {
        self.raw_dataset_dir().join("extracted")
    }

    pub fn bronze_dir(&self) -> PathBuf {
        self.paths.data_interim.join(DATASET_ID).join("bronze")
    }

    pub fn silver_dir(&self) -> PathBuf {
        self.paths.data_processed.join(DATASET_ID).join("silver")
    }

    pub fn gold_dir(&self) -> PathBuf {
        self.paths.data_processed.join(DATASET_ID).join("gold")
    }

    /// `<outputs_reports>/<pipeline>_m5.json`
    pub fn report_path(&self, pipeline: &str) -> PathBuf {
        self.paths
            .outputs_reports
            .join(format!("{pipeline}_{DATASET_ID}.json"))
    }

    pub fn model_path(&self) -> PathBuf {
        self.paths
            .outputs_models
            .join(format!("{DATASET_ID}_ridge_baseline.json"))
    }
}

fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
