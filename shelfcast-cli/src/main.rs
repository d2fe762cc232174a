//! Shelfcast CLI: run the M5 pipeline stage by stage or end to end.
//!
//! Commands:
//! - `show-paths` / `ensure-dirs`: inspect or create the configured directories
//! - `capture`, `ingest`, `bronze`, `silver`, `gold`: the medallion stages
//! - `features`, `dq`, `train`, `eval`: modelling inputs, gates and baseline
//! - `run`: capture through gold, stopping at the first failure
//! - `synth`: write a small synthetic M5-shaped dataset

use anyhow::{Context, Result};
use clap::builder::RangedU64ValueParser;
use clap::{Parser, Subcommand};
use shelfcast_core::synthetic::SyntheticSpec;
use shelfcast_runner::stages::{
    BronzeStage, CaptureStage, DqFeaturesStage, DqGoldStage, EvaluateStage, FeaturesStage,
    GoldStage, IngestStage, SilverStage, TrainStage,
};
use shelfcast_runner::{
    init_tracing, run_stage, LogFormat, Orchestrator, PipelineConfig, ResolvedConfig, Stage,
    StageContext, StageError, DEFAULT_CONFIG_PATH,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "shelfcast",
    about = "Shelfcast: staged M5 retail data pipeline"
)]
struct Cli {
    /// Path to the TOML config. Defaults are used if the default file is absent.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Rebuild artifacts even if they already exist.
    #[arg(long, global = true, default_value_t = false)]
    force: bool,

    /// Report failures without a non-zero exit.
    #[arg(long, global = true, default_value_t = false)]
    no_strict: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the resolved directories.
    ShowPaths,
    /// Create every configured directory.
    EnsureDirs,
    /// Place the raw archive in the raw data directory.
    Capture {
        /// Local archive to copy in.
        #[arg(long)]
        zip_path: Option<PathBuf>,
    },
    /// Extract the raw archive.
    Ingest {
        /// Archive to extract instead of searching the raw directory.
        #[arg(long)]
        zip_path: Option<PathBuf>,
    },
    /// Convert raw CSVs to Parquet.
    Bronze,
    /// Apply the typing rules to bronze tables.
    Silver,
    /// Build the gold dimension, fact and sample tables.
    Gold {
        /// Number of series in the long sample.
        #[arg(long, value_parser = positive())]
        sample_n_series: Option<usize>,

        /// Number of trailing days in the long sample.
        #[arg(long, value_parser = positive())]
        sample_days: Option<usize>,
    },
    /// Build leakage-safe features from the gold sample.
    Features {
        /// Test horizon in days.
        #[arg(long, value_parser = positive())]
        horizon: Option<usize>,
    },
    /// Run the gold data-quality gate, or the feature gate with --features.
    Dq {
        /// Gate the feature table instead of the gold tables.
        #[arg(long, default_value_t = false)]
        features: bool,
    },
    /// Fit the ridge baseline on training rows.
    Train,
    /// Score the baseline on test rows and export metrics.
    Eval,
    /// Run capture, ingest, bronze, silver and gold in order.
    Run {
        /// Local archive to copy in during capture.
        #[arg(long)]
        zip_path: Option<PathBuf>,
    },
    /// Write a synthetic M5-shaped raw dataset.
    Synth {
        /// Output directory for the CSVs.
        #[arg(long)]
        out: PathBuf,

        /// Number of series.
        #[arg(long, default_value_t = 6)]
        series: usize,

        /// Number of days.
        #[arg(long, default_value_t = 120)]
        days: usize,

        /// RNG seed.
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Also pack the CSVs into `m5.zip` inside the output directory.
        #[arg(long, default_value_t = false)]
        zip: bool,
    },
}

/// Counts that must be at least one.
fn positive() -> RangedU64ValueParser<usize> {
    RangedU64ValueParser::new().range(1..)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    init_tracing(&config.settings.logging.level, format);

    let strict = !cli.no_strict;
    let ctx = StageContext::new(&config, cli.force);

    match cli.command {
        Commands::ShowPaths => show_paths(&config),
        Commands::EnsureDirs => {
            config.ensure_dirs()?;
            info!("ensure-dirs: done");
            show_paths(&config)
        }
        Commands::Capture { zip_path } => run(&CaptureStage::from_local(zip_path), &ctx, strict),
        Commands::Ingest { zip_path } => run(&IngestStage::new(zip_path), &ctx, strict),
        Commands::Bronze => run(&BronzeStage, &ctx, strict),
        Commands::Silver => run(&SilverStage::default(), &ctx, strict),
        Commands::Gold {
            sample_n_series,
            sample_days,
        } => run(
            &GoldStage {
                sample_n_series,
                sample_days,
            },
            &ctx,
            strict,
        ),
        Commands::Features { horizon } => run(&FeaturesStage { horizon }, &ctx, strict),
        Commands::Dq { features: false } => run(&DqGoldStage, &ctx, strict),
        Commands::Dq { features: true } => run(&DqFeaturesStage::default(), &ctx, strict),
        Commands::Train => run(&TrainStage, &ctx, strict),
        Commands::Eval => run(&EvaluateStage, &ctx, strict),
        Commands::Run { zip_path } => run(&Orchestrator::standard(zip_path), &ctx, strict),
        Commands::Synth {
            out,
            series,
            days,
            seed,
            zip,
        } => run_synth(&out, series, days, seed, zip),
    }
}

/// An explicit `--config` must exist; the default path may be absent.
fn load_config(path: Option<&Path>) -> Result<ResolvedConfig> {
    match path {
        Some(path) => ResolvedConfig::load(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => {
            let default = Path::new(DEFAULT_CONFIG_PATH);
            if default.is_file() {
                return ResolvedConfig::load(default)
                    .with_context(|| format!("loading config {}", default.display()));
            }
            let cwd = std::env::current_dir().context("reading current directory")?;
            Ok(ResolvedConfig::resolve(PipelineConfig::default(), default, &cwd))
        }
    }
}

fn run(stage: &dyn Stage, ctx: &StageContext<'_>, strict: bool) -> Result<()> {
    match run_stage(stage, ctx, strict) {
        Ok(outcome) => {
            println!("{}: {}", outcome.pipeline, outcome.status);
            println!("Report: {}", outcome.report_path.display());
            if let Some(hint) = &outcome.hint {
                warn!(stage = %outcome.pipeline, "{hint}");
            }
            Ok(())
        }
        Err(StageError::Failed {
            pipeline,
            status,
            report_path,
            hint,
        }) => {
            eprintln!("Error: stage '{pipeline}' finished with status '{status}'");
            if let Some(hint) = hint {
                eprintln!("Hint: {hint}");
            }
            eprintln!("Report: {}", report_path.display());
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}

fn show_paths(config: &ResolvedConfig) -> Result<()> {
    println!("{:<16} {}", "config", config.config_path.display());
    println!("{:<16} {}", "project_root", config.project_root.display());
    for (key, dir) in config.paths.entries() {
        println!("{key:<16} {}", dir.display());
    }
    Ok(())
}

fn run_synth(out: &Path, series: usize, days: usize, seed: u64, zip: bool) -> Result<()> {
    let spec = SyntheticSpec {
        n_series: series,
        n_days: days,
        seed,
    };
    if zip {
        let path = spec.write_zip(out, "m5.zip")?;
        println!("Archive written to: {}", path.display());
    } else {
        let files = spec.write_csvs(out)?;
        for file in &files {
            println!("{}", file.display());
        }
    }
    Ok(())
}
