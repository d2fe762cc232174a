//! Ingest: extract the raw archive into `<raw>/m5/extracted`.

use shelfcast_core::data::DataError;
use shelfcast_core::hashing::fingerprint;
use shelfcast_core::FileStatus;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::capture::find_archive;
use crate::report::{FileRecord, StageReport};
use crate::stage::{conclude, materialize, Stage, StageContext, StageError, StageOutcome};

#[derive(Debug, Clone, Default)]
pub struct IngestStage {
    /// Explicit archive; otherwise the configured names are searched.
    pub zip_path: Option<PathBuf>,
}

impl IngestStage {
    pub fn new(zip_path: Option<PathBuf>) -> Self {
        Self { zip_path }
    }
}

impl Stage for IngestStage {
    fn name(&self) -> &str {
        "ingest"
    }

    fn execute(&self, ctx: &StageContext<'_>) -> Result<StageOutcome, StageError> {
        let config = ctx.config;
        let raw_dir = config.raw_dataset_dir();
        let extracted = config.extracted_dir();
        let mut report = StageReport::new(self.name(), config);
        report.dir("raw_dir", &raw_dir);
        report.dir("extracted_dir", &extracted);

        let archive = match &self.zip_path {
            Some(path) if path.is_file() => Some(path.clone()),
            Some(_) => None,
            None => find_archive(&raw_dir, &config.settings.ingest.zip_names),
        };
        let Some(archive) = archive else {
            let looked_for = match &self.zip_path {
                Some(path) => path.display().to_string(),
                None => raw_dir.display().to_string(),
            };
            report.note("missing_reason", format!("no archive found at {looked_for}"));
            return conclude(
                report,
                true,
                Some("run capture first or pass --zip-path".to_string()),
            );
        };

        report.note("archive_path", archive.display().to_string());
        match fingerprint(&archive) {
            Ok(Some((bytes, sha))) => {
                report.note("archive_bytes", bytes);
                report.note("archive_sha256", sha);
            }
            Ok(None) => {}
            Err(e) => report.note("archive_fingerprint_error", e.to_string()),
        }

        match extract_all(&archive, &extracted, ctx.force) {
            Ok(records) => {
                report.note("n_entries", records.len());
                for record in records {
                    report.push(record);
                }
            }
            Err(e) => {
                report.push(FileRecord::failed(archive_label(&archive), e).with_source(&archive))
            }
        }
        conclude(
            report,
            false,
            Some("the archive may be corrupt; re-download it".to_string()),
        )
    }
}

fn archive_label(archive: &Path) -> String {
    archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| archive.display().to_string())
}

/// Extract every file entry; an unreadable archive is an error for the whole stage.
fn extract_all(archive: &Path, dest_dir: &Path, force: bool) -> Result<Vec<FileRecord>, DataError> {
    let file = File::open(archive).map_err(|e| DataError::io(archive, e))?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|e| DataError::Archive(format!("open {}: {e}", archive.display())))?;

    let mut records = Vec::with_capacity(zip.len());
    for index in 0..zip.len() {
        let mut entry = match zip.by_index(index) {
            Ok(entry) => entry,
            Err(e) => {
                records.push(FileRecord::failed(format!("entry #{index}"), e));
                continue;
            }
        };
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        let source = format!("{}!{name}", archive.display());

        let Some(relative) = entry.enclosed_name() else {
            let mut record = FileRecord::failed(&name, "entry path escapes the extraction directory");
            record.source_path = Some(source);
            records.push(record);
            continue;
        };
        let dest = dest_dir.join(relative);
        let entry_bytes = entry.size();

        let result = materialize(&dest, force, || -> Result<(), DataError> {
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent).map_err(|e| DataError::io(parent, e))?;
            }
            let mut out = File::create(&dest).map_err(|e| DataError::io(&dest, e))?;
            io::copy(&mut entry, &mut out).map_err(|e| DataError::io(&dest, e))?;
            Ok(())
        });
        let mut record = match result {
            Ok(status) => {
                if status == FileStatus::Ok {
                    info!(entry = %name, dest = %dest.display(), "ingest: extracted");
                } else {
                    debug!(entry = %name, "ingest: already extracted");
                }
                FileRecord::new(&name, status).with_dest(&dest)
            }
            Err(e) => FileRecord::failed(&name, e).with_dest(&dest),
        };
        record.source_path = Some(source);
        record.source_bytes = Some(entry_bytes);
        records.push(record);
    }
    Ok(records)
}
