use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{Result, SitekeepError};

/// Internal archive path of the database dump.
pub const DB_ENTRY: &str = "db/backup.sql";
/// Internal archive prefix of the content tree.
pub const FILES_PREFIX: &str = "files/";

#[derive(Debug, Clone)]
pub struct ArchiveSummary {
    /// Number of regular files added under `files/`.
    pub file_count: usize,
    /// Size in bytes of the finished archive.
    pub archive_bytes: u64,
}

/// Build the backup archive at `output_path`.
///
/// The archive contains the database dump at `db/backup.sql` and the content
/// tree mirrored under `files/`. The dump temp file is consumed so it is
/// deleted whether or not the build succeeds. The archive is written to a
/// `.part` sibling and renamed into place only when complete, so a partial
/// file is never mistaken for a finished backup.
pub fn build(
    db_dump: NamedTempFile,
    content_root: &Path,
    output_path: &Path,
) -> Result<ArchiveSummary> {
    if !content_root.is_dir() {
        return Err(SitekeepError::SourceMissing(content_root.to_path_buf()));
    }

    let part_path = {
        let mut name = output_path.as_os_str().to_os_string();
        name.push(".part");
        std::path::PathBuf::from(name)
    };

    let result = write_archive(db_dump, content_root, output_path, &part_path);
    if result.is_err() {
        let _ = std::fs::remove_file(&part_path);
    }
    result
}

fn write_archive(
    db_dump: NamedTempFile,
    content_root: &Path,
    output_path: &Path,
    part_path: &Path,
) -> Result<ArchiveSummary> {
    let file = File::create(part_path)
        .map_err(|e| SitekeepError::ArchiveCreate(format!("{}: {e}", part_path.display())))?;
    let mut writer = ZipWriter::new(BufWriter::new(file));

    // The dump is already plain text produced moments ago; store it as-is
    // and spend compression effort on the content tree.
    let dump_options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let dump_file = File::open(db_dump.path())?;
    writer.start_file(DB_ENTRY, dump_options)?;
    copy_into(dump_file, &mut writer)?;
    drop(db_dump);

    let file_options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true);

    let mut file_count = 0usize;
    for entry in WalkDir::new(content_root).follow_links(false) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                // Unreadable subtrees (permissions, races with deletion) are
                // skipped rather than failing the whole backup.
                warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(content_root)
            .map_err(|e| SitekeepError::ArchiveCreate(e.to_string()))?;
        let entry_name = format!("{FILES_PREFIX}{}", zip_entry_name(rel));
        // Open before starting the entry; an unreadable file must not leave
        // a half-written entry in the finished archive.
        let source = match File::open(entry.path()) {
            Ok(f) => f,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "skipping unreadable file");
                continue;
            }
        };
        debug!(entry = %entry_name, "adding file");
        writer.start_file(entry_name.as_str(), file_options)?;
        match copy_into(source, &mut writer) {
            Ok(()) => file_count += 1,
            Err(SitekeepError::Io(e)) => {
                writer.abort_file()?;
                warn!(path = %entry.path().display(), error = %e, "skipping unreadable file");
            }
            Err(e) => return Err(e),
        }
    }

    let inner = writer.finish()?;
    inner
        .into_inner()
        .map_err(|e| SitekeepError::ArchiveCreate(e.to_string()))?
        .sync_all()?;

    std::fs::rename(&part_path, output_path)?;
    let archive_bytes = std::fs::metadata(output_path)?.len();

    info!(
        archive = %output_path.display(),
        files = file_count,
        bytes = archive_bytes,
        "archive complete"
    );
    Ok(ArchiveSummary {
        file_count,
        archive_bytes,
    })
}

fn copy_into<W: Write>(source: File, writer: &mut W) -> Result<()> {
    let mut reader = BufReader::new(source);
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            return Ok(());
        }
        writer.write_all(&buf[..n])?;
    }
}

/// Zip entry names always use forward slashes, regardless of host platform.
fn zip_entry_name(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
