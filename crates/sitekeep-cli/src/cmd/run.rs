use sitekeep_core::config::SitekeepConfig;
use sitekeep_core::error::Result;
use sitekeep_core::job;

pub(crate) fn run_backup(cfg: &SitekeepConfig) -> Result<()> {
    let report = job::run_backup(cfg)?;

    println!(
        "Archive: {} ({} files, {} bytes)",
        report.archive_path.display(),
        report.file_count,
        report.archive_bytes
    );
    match &report.upload_error {
        None => println!("Uploaded as {}", report.archive_name),
        Some(cause) => println!("Upload FAILED (local archive kept): {cause}"),
    }
    if report.deleted_archives > 0 {
        println!("Retention: deleted {} old archive(s)", report.deleted_archives);
    }
    if let Some(cause) = &report.retention_error {
        println!("Retention FAILED: {cause}");
    }
    println!("Done in {:.1}s", report.elapsed.as_secs_f64());
    Ok(())
}
