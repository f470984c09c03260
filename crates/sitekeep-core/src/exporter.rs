use std::io::Write;
use std::process::Command;

use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::config::DatabaseConfig;
use crate::error::{Result, SitekeepError};
use crate::platform::shell;

/// Run the external dump utility and capture the logical dump into a
/// temporary file.
///
/// The dump is invoked as an argv command (no shell string is built) and the
/// password travels via the `MYSQL_PWD` environment variable so it never
/// appears in process listings. The returned [`NamedTempFile`] deletes the
/// dump when dropped, on every exit path of the caller.
pub fn export(db: &DatabaseConfig) -> Result<NamedTempFile> {
    let timeout = db.timeout_duration()?;

    let mut cmd = Command::new(&db.dump_command);
    cmd.arg("--host").arg(&db.host);
    cmd.arg("--user").arg(&db.user);
    cmd.arg(&db.name);
    if let Some(password) = &db.password {
        cmd.env("MYSQL_PWD", password);
    }

    info!(
        command = %db.dump_command,
        database = %db.name,
        "running database dump"
    );

    let output = shell::run_command_with_timeout(&mut cmd, timeout).map_err(|e| {
        SitekeepError::ExportFailed {
            code: "spawn".to_string(),
            stderr: format!("failed to execute '{}': {e}", db.dump_command),
        }
    })?;

    if !output.status.success() {
        let code = output
            .status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_string();
        return Err(SitekeepError::ExportFailed { code, stderr });
    }

    if output.stdout.is_empty() {
        warn!(database = %db.name, "database dump produced empty output");
    }

    let mut dump = tempfile::Builder::new()
        .prefix("sitekeep_db_")
        .suffix(".sql")
        .tempfile()?;
    dump.write_all(&output.stdout)?;
    dump.flush()?;

    info!(bytes = output.stdout.len(), "database dump captured");
    Ok(dump)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;

    fn db_config(dump_command: &str) -> DatabaseConfig {
        DatabaseConfig {
            host: "localhost".into(),
            user: "site".into(),
            password: Some("secret".into()),
            name: "sitedb".into(),
            dump_command: dump_command.into(),
            timeout: "1m".into(),
        }
    }

    #[cfg(unix)]
    #[test]
    fn export_captures_stdout_into_temp_file() {
        // `echo` prints its args, so the dump file ends with the db name.
        let dump = export(&db_config("echo")).unwrap();
        let contents = std::fs::read_to_string(dump.path()).unwrap();
        assert!(contents.contains("sitedb"), "unexpected dump: {contents}");
        assert!(dump.path().extension().is_some_and(|e| e == "sql"));
    }

    #[cfg(unix)]
    #[test]
    fn export_fails_on_nonzero_exit() {
        let err = export(&db_config("false")).unwrap_err();
        match err {
            SitekeepError::ExportFailed { code, .. } => assert_eq!(code, "1"),
            other => panic!("expected ExportFailed, got: {other}"),
        }
    }

    #[test]
    fn export_fails_when_command_missing() {
        let err = export(&db_config("sitekeep-no-such-dump-utility")).unwrap_err();
        match err {
            SitekeepError::ExportFailed { code, stderr } => {
                assert_eq!(code, "spawn");
                assert!(stderr.contains("failed to execute"));
            }
            other => panic!("expected ExportFailed, got: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn temp_dump_is_deleted_on_drop() {
        let path = {
            let dump = export(&db_config("echo")).unwrap();
            dump.path().to_path_buf()
        };
        assert!(!path.exists());
    }
}
