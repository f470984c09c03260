use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, info, warn};

use crate::config::DeleteErrorPolicy;
use crate::error::{Result, SitekeepError};

/// Filename shape of finished archives. Anything else in the backup
/// directory (in-progress `.part` files, unrelated files) is left alone.
pub const ARCHIVE_PREFIX: &str = "backup_";
pub const ARCHIVE_SUFFIX: &str = ".zip";

/// Delete all but the `keep_last` most recent archives in `backup_dir`.
///
/// Recency is modification time, newest first; ties break by filename so the
/// order is still deterministic. Returns the number of archives deleted.
/// A `keep_last` of zero keeps nothing.
pub fn enforce(
    backup_dir: &Path,
    keep_last: usize,
    on_delete_error: DeleteErrorPolicy,
) -> Result<usize> {
    let mut archives = list_archives(backup_dir)?;
    if archives.len() <= keep_last {
        debug!(
            found = archives.len(),
            keep = keep_last,
            "retention: nothing to delete"
        );
        return Ok(0);
    }

    archives.sort_by(|a, b| b.modified.cmp(&a.modified).then(b.path.cmp(&a.path)));

    let mut deleted = 0usize;
    for archive in &archives[keep_last..] {
        match std::fs::remove_file(&archive.path) {
            Ok(()) => {
                info!(archive = %archive.path.display(), "deleted expired archive");
                deleted += 1;
            }
            Err(e) => match on_delete_error {
                DeleteErrorPolicy::BestEffort => {
                    warn!(
                        archive = %archive.path.display(),
                        error = %e,
                        "failed to delete expired archive, continuing"
                    );
                }
                DeleteErrorPolicy::Stop => {
                    return Err(SitekeepError::Io(e));
                }
            },
        }
    }
    Ok(deleted)
}

struct ArchiveEntry {
    path: PathBuf,
    modified: SystemTime,
}

fn list_archives(backup_dir: &Path) -> Result<Vec<ArchiveEntry>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(backup_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !name.starts_with(ARCHIVE_PREFIX) || !name.ends_with(ARCHIVE_SUFFIX) {
            continue;
        }
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        let modified = meta.modified()?;
        out.push(ArchiveEntry {
            path: entry.path(),
            modified,
        });
    }
    Ok(out)
}
