use std::io::Write;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use tempfile::NamedTempFile;

use crate::config::{RetryConfig, TransferConfig};
use crate::error::{Result, SitekeepError};
use crate::platform::shell;

use super::{retry_op, RemoteTransfer, RetryError, RetryResult};

/// Extra wall-clock slack on top of curl's own `--max-time` before the
/// process is killed outright.
const KILL_GRACE: Duration = Duration::from_secs(15);

/// Transfer backend that drives the external `curl` binary over `sftp://`
/// URLs. Useful on hosts where curl is already trusted and configured but
/// the native client is not an option.
pub struct CurlTransfer {
    curl_bin: String,
    host: String,
    port: u16,
    user: String,
    password: String,
    remote_path: String,
    op_timeout: Duration,
    retry: RetryConfig,
}

impl CurlTransfer {
    pub fn new(cfg: &TransferConfig) -> Result<Self> {
        Ok(Self {
            curl_bin: "curl".to_string(),
            host: cfg.host.clone(),
            port: cfg.port,
            user: cfg.user.clone(),
            password: cfg.password.clone(),
            remote_path: cfg.remote_path.clone(),
            op_timeout: cfg.timeout_duration()?,
            retry: cfg.retry.clone(),
        })
    }

    /// URL of the configured remote directory. `remote_path` is validated to
    /// start and end with '/', and curl treats the URL path as absolute on
    /// the server.
    fn base_url(&self) -> String {
        format!("sftp://{}:{}{}", self.host, self.port, self.remote_path)
    }

    fn file_url(&self, name: &str) -> String {
        format!("{}{}", self.base_url(), name)
    }

    /// Write the credentials to a private temp file handed to curl via
    /// `--config`, keeping them off the command line.
    fn credentials_file(&self) -> RetryResult<NamedTempFile> {
        let mut file = tempfile::Builder::new()
            .prefix("sitekeep_curl_")
            .tempfile()
            .map_err(|e| RetryError::permanent(SitekeepError::Io(e)))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o600))
                .map_err(|e| RetryError::permanent(SitekeepError::Io(e)))?;
        }

        let escaped = |s: &str| s.replace('\\', "\\\\").replace('"', "\\\"");
        writeln!(
            file,
            "user = \"{}:{}\"",
            escaped(&self.user),
            escaped(&self.password)
        )
        .and_then(|()| file.flush())
        .map_err(|e| RetryError::permanent(SitekeepError::Io(e)))?;

        Ok(file)
    }

    fn run(&self, op: &str, configure: impl Fn(&mut Command)) -> RetryResult<()> {
        let creds = self.credentials_file()?;

        let mut cmd = Command::new(&self.curl_bin);
        cmd.arg("--silent")
            .arg("--show-error")
            .arg("--fail")
            .arg("--config")
            .arg(creds.path())
            .arg("--max-time")
            .arg(self.op_timeout.as_secs().to_string());
        configure(&mut cmd);

        let output = shell::run_command_with_timeout(&mut cmd, self.op_timeout + KILL_GRACE)
            .map_err(|e| {
                let err = SitekeepError::transfer(op, format!("curl: {e}"));
                if e.kind() == std::io::ErrorKind::TimedOut {
                    RetryError::transient(err)
                } else {
                    RetryError::permanent(err)
                }
            })?;
        drop(creds);

        if output.status.success() {
            return Ok(());
        }

        let code = output.status.code().unwrap_or(-1);
        let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_string();
        let err = SitekeepError::transfer(op, format!("curl exit code {code}: {stderr}"));
        if is_retryable_curl_exit(code) {
            Err(RetryError::transient(err))
        } else {
            Err(RetryError::permanent(err))
        }
    }
}

impl RemoteTransfer for CurlTransfer {
    fn name(&self) -> &'static str {
        "curl"
    }

    fn upload(&self, local: &Path, remote_name: &str) -> Result<()> {
        let url = self.file_url(remote_name);
        tracing::info!(local = %local.display(), url = %url, "curl upload");

        retry_op(&self.retry, &format!("upload {remote_name}"), || {
            self.run("upload", |cmd| {
                cmd.arg("--upload-file")
                    .arg(local)
                    .arg("--ftp-create-dirs")
                    .arg(&url);
            })
        })
    }

    fn remove(&self, remote_name: &str) -> Result<()> {
        let target = format!("{}{}", self.remote_path, remote_name);
        let url = self.base_url();
        tracing::info!(remote = %target, "curl remove");

        // curl has no standalone delete for sftp; the `rm` quote command
        // runs against a directory listing of the remote path.
        retry_op(&self.retry, &format!("remove {remote_name}"), || {
            self.run("remove", |cmd| {
                cmd.arg("--quote")
                    .arg(format!("rm {target}"))
                    .arg("--list-only")
                    .arg(&url);
            })
        })
    }
}

/// Exit codes where retrying might help: resolution, connection, timeouts
/// and dropped transfers. Auth and protocol errors are permanent.
fn is_retryable_curl_exit(code: i32) -> bool {
    matches!(code, 5 | 6 | 7 | 16 | 18 | 28 | 35 | 52 | 55 | 56)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransferBackend;

    fn transfer_config() -> TransferConfig {
        TransferConfig {
            backend: TransferBackend::Curl,
            host: "backup.example.net".into(),
            port: 22,
            user: "backup".into(),
            password: "s3cret".into(),
            remote_path: "/sites/".into(),
            known_hosts: None,
            timeout: "10m".into(),
            retry: RetryConfig::default(),
        }
    }

    #[test]
    fn urls_are_built_from_host_port_and_remote_path() {
        let t = CurlTransfer::new(&transfer_config()).unwrap();
        assert_eq!(t.base_url(), "sftp://backup.example.net:22/sites/");
        assert_eq!(
            t.file_url("backup_x.zip"),
            "sftp://backup.example.net:22/sites/backup_x.zip"
        );
    }

    #[test]
    fn credentials_file_contains_quoted_userpass() {
        let mut cfg = transfer_config();
        cfg.password = "pa\"ss".into();
        let t = CurlTransfer::new(&cfg).unwrap();
        let creds = t.credentials_file().unwrap();
        let contents = std::fs::read_to_string(creds.path()).unwrap();
        assert_eq!(contents, "user = \"backup:pa\\\"ss\"\n");
    }

    #[cfg(unix)]
    #[test]
    fn credentials_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let t = CurlTransfer::new(&transfer_config()).unwrap();
        let creds = t.credentials_file().unwrap();
        let mode = std::fs::metadata(creds.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn transient_and_permanent_exit_codes() {
        assert!(is_retryable_curl_exit(7));
        assert!(is_retryable_curl_exit(28));
        assert!(!is_retryable_curl_exit(67)); // login denied
        assert!(!is_retryable_curl_exit(21)); // quote command failed
    }
}
