//! Capture: make sure the raw archive is present in the raw dataset directory.
//!
//! Downloading is someone else's job; this stage talks to it through
//! [`ArchiveSource`]. The only bundled source copies a local file.

use shelfcast_core::data::DataError;
use shelfcast_core::FileStatus;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::report::{FileRecord, StageReport};
use crate::stage::{conclude, Stage, StageContext, StageError, StageOutcome};

/// Something that can place the raw archive at a destination path.
pub trait ArchiveSource: Send + Sync {
    /// Human-readable origin, recorded in the report.
    fn describe(&self) -> String;

    /// Archive file name to use when the configured names do not apply.
    fn file_name(&self) -> Option<String>;

    fn fetch(&self, dest: &Path) -> Result<Fetched, DataError>;
}

/// What a fetch did to the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fetched {
    Copied,
    /// The source already is the destination file; nothing was written.
    InPlace,
}

/// Copies an archive that is already on local disk.
#[derive(Debug, Clone)]
pub struct LocalArchiveSource {
    path: PathBuf,
}

impl LocalArchiveSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ArchiveSource for LocalArchiveSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn file_name(&self) -> Option<String> {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
    }

    fn fetch(&self, dest: &Path) -> Result<Fetched, DataError> {
        if !self.path.is_file() {
            return Err(DataError::Validation(format!(
                "archive not found at {}",
                self.path.display()
            )));
        }
        // Copying a file onto itself truncates it.
        if same_file(&self.path, dest) {
            return Ok(Fetched::InPlace);
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DataError::io(parent, e))?;
        }
        std::fs::copy(&self.path, dest).map_err(|e| DataError::io(dest, e))?;
        Ok(Fetched::Copied)
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// First configured archive name present in `raw_dir`.
pub fn find_archive(raw_dir: &Path, zip_names: &[String]) -> Option<PathBuf> {
    zip_names
        .iter()
        .map(|name| raw_dir.join(name))
        .find(|path| path.is_file())
}

#[derive(Default)]
pub struct CaptureStage {
    source: Option<Box<dyn ArchiveSource>>,
}

impl CaptureStage {
    pub fn new(source: Option<Box<dyn ArchiveSource>>) -> Self {
        Self { source }
    }

    pub fn from_local(path: Option<PathBuf>) -> Self {
        Self::new(path.map(|p| Box::new(LocalArchiveSource::new(p)) as Box<dyn ArchiveSource>))
    }
}

impl Stage for CaptureStage {
    fn name(&self) -> &str {
        "capture"
    }

    fn execute(&self, ctx: &StageContext<'_>) -> Result<StageOutcome, StageError> {
        let config = ctx.config;
        let raw_dir = config.raw_dataset_dir();
        let zip_names = &config.settings.ingest.zip_names;
        let mut report = StageReport::new(self.name(), config);
        report.dir("raw_dir", &raw_dir);
        report.note("zip_names", zip_names.clone());

        let existing = find_archive(&raw_dir, zip_names);
        if let Some(path) = &existing {
            if !ctx.force || self.source.is_none() {
                if ctx.force {
                    report.note("force_ignored", "no archive source configured");
                }
                report.push(archive_record(path, FileStatus::Exists));
                return conclude(report, false, None);
            }
        }

        let Some(source) = &self.source else {
            report.note(
                "missing_reason",
                format!("no archive named {} in {}", zip_names.join(" or "), raw_dir.display()),
            );
            let hint = format!(
                "download the M5 archive into {} or pass --zip-path",
                raw_dir.display()
            );
            return conclude(report, true, Some(hint));
        };

        // Keep a configured name so ingest can find the archive later.
        let name = source
            .file_name()
            .filter(|n| zip_names.contains(n))
            .or_else(|| zip_names.first().cloned())
            .unwrap_or_else(|| "m5.zip".to_string());
        let dest = raw_dir.join(&name);
        report.note("source", source.describe());

        match source.fetch(&dest) {
            Ok(Fetched::Copied) => {
                info!(source = %source.describe(), dest = %dest.display(), "capture: archive placed");
                report.push(archive_record(&dest, FileStatus::Ok));
            }
            Ok(Fetched::InPlace) => {
                report.note("force_ignored", "source is the archive already in place");
                report.push(archive_record(&dest, FileStatus::Exists));
            }
            Err(e) => report.push(FileRecord::failed(name, e).with_dest(&dest)),
        }
        conclude(
            report,
            false,
            Some("check the archive path passed to capture".to_string()),
        )
    }
}

fn archive_record(path: &Path, status: FileStatus) -> FileRecord {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    FileRecord::new(name, status).with_dest(path)
}
