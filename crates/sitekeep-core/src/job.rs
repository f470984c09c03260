use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use tracing::{error, info};

use crate::archive;
use crate::config::SitekeepConfig;
use crate::error::Result;
use crate::exporter;
use crate::retention;
use crate::transfer::{self, RemoteTransfer};

/// Outcome of one backup run.
///
/// A failed upload does not fail the run: the local archive is the backup of
/// record and the next scheduled run will ship a fresh one. The error is
/// carried here so callers can report it.
#[derive(Debug)]
pub struct JobReport {
    pub archive_name: String,
    pub archive_path: PathBuf,
    pub file_count: usize,
    pub archive_bytes: u64,
    pub upload_error: Option<String>,
    pub deleted_archives: usize,
    pub retention_error: Option<String>,
    pub elapsed: Duration,
}

impl JobReport {
    pub fn uploaded(&self) -> bool {
        self.upload_error.is_none()
    }
}

/// Archive filename for a run started at `when`, sortable by name.
pub fn archive_name(when: DateTime<Local>) -> String {
    format!("backup_{}.zip", when.format("%Y-%m-%d_%H-%M-%S"))
}

/// Run the full pipeline: dump the database, build the archive, upload it,
/// then apply local retention.
pub fn run_backup(cfg: &SitekeepConfig) -> Result<JobReport> {
    let backend = transfer::backend_from_config(&cfg.transfer)?;
    run_backup_with_transfer(cfg, backend.as_ref())
}

pub fn run_backup_with_transfer(
    cfg: &SitekeepConfig,
    transfer: &dyn RemoteTransfer,
) -> Result<JobReport> {
    let started = Instant::now();
    let backup_dir = Path::new(&cfg.backup.backup_dir);
    std::fs::create_dir_all(backup_dir)?;

    let dump = exporter::export(&cfg.database)?;

    let archive_name = archive_name(Local::now());
    let archive_path = backup_dir.join(&archive_name);
    let summary = archive::build(dump, Path::new(&cfg.backup.content_dir), &archive_path)?;

    let remote_name = archive_name.clone();
    let upload_error = match transfer.upload(&archive_path, &remote_name) {
        Ok(()) => {
            info!(backend = transfer.name(), archive = %archive_name, "upload complete");
            None
        }
        Err(e) => {
            error!(
                backend = transfer.name(),
                archive = %archive_name,
                error = %e,
                "upload failed, keeping local archive"
            );
            Some(e.to_string())
        }
    };

    // Retention trouble never fails the run; the fresh archive is already
    // safe on disk.
    let (deleted_archives, retention_error) = match retention::enforce(
        backup_dir,
        cfg.retention.keep_last,
        cfg.retention.on_delete_error,
    ) {
        Ok(n) => (n, None),
        Err(e) => {
            error!(error = %e, "retention pass failed");
            (0, Some(e.to_string()))
        }
    };

    let report = JobReport {
        archive_name,
        archive_path,
        file_count: summary.file_count,
        archive_bytes: summary.archive_bytes,
        upload_error,
        deleted_archives,
        retention_error,
        elapsed: started.elapsed(),
    };
    info!(
        archive = %report.archive_name,
        files = report.file_count,
        bytes = report.archive_bytes,
        uploaded = report.uploaded(),
        deleted = report.deleted_archives,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "backup run finished"
    );
    Ok(report)
}
