use std::path::Path;

use sitekeep_core::config::SitekeepConfig;
use sitekeep_core::error::Result;
use sitekeep_core::retention;

pub(crate) fn run_prune(cfg: &SitekeepConfig, keep_last: Option<usize>) -> Result<()> {
    let keep = keep_last.unwrap_or(cfg.retention.keep_last);
    let deleted = retention::enforce(
        Path::new(&cfg.backup.backup_dir),
        keep,
        cfg.retention.on_delete_error,
    )?;
    println!("Deleted {deleted} archive(s), keeping the {keep} most recent");
    Ok(())
}
