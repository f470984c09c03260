use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use russh::client;
use russh::keys::known_hosts::{known_host_keys_path, learn_known_hosts_path};
use russh::keys::ssh_key;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::{OpenFlags, StatusCode};
use tokio::io::AsyncWriteExt;

use crate::config::{RetryConfig, TransferConfig};
use crate::error::{Result, SitekeepError};

use super::runtime::ASYNC_RUNTIME;
use super::{retry_op, RemoteTransfer, RetryError, RetryResult};

/// Connection timeout for the SSH handshake.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Inactivity timeout for established SSH sessions.
const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(300);

/// Parameters needed to (re-)establish an SFTP connection.
#[derive(Clone)]
struct SftpConnectParams {
    host: String,
    port: u16,
    user: String,
    password: String,
    known_hosts_path: PathBuf,
}

/// SSH client handler that enforces known-host checks (TOFU).
struct SshHandler {
    host: String,
    port: u16,
    known_hosts_path: PathBuf,
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        match verify_or_learn_host_key(
            &self.host,
            self.port,
            &self.known_hosts_path,
            server_public_key,
        ) {
            Ok(HostKeyState::Matched) => Ok(true),
            Ok(HostKeyState::Learned) => {
                tracing::warn!(
                    host = %self.host,
                    port = self.port,
                    known_hosts = %self.known_hosts_path.display(),
                    "learned new SSH host key via TOFU"
                );
                Ok(true)
            }
            Err(e) => {
                tracing::error!(
                    host = %self.host,
                    port = self.port,
                    known_hosts = %self.known_hosts_path.display(),
                    "SSH host key verification failed: {e}"
                );
                Err(e)
            }
        }
    }
}

/// Outcome of host key verification.
enum HostKeyState {
    Matched,
    Learned,
}

/// An active SSH + SFTP connection.
struct SftpConn {
    sftp: SftpSession,
    // Keep handle alive so the session isn't dropped.
    _session: client::Handle<SshHandler>,
}

/// Native SFTP transfer backend using `russh` + `russh-sftp`.
///
/// A single connection is established lazily and reused across operations;
/// a transient failure discards it and the next attempt reconnects.
pub struct SftpTransfer {
    params: SftpConnectParams,
    remote_path: String,
    op_timeout: Duration,
    retry: RetryConfig,
    conn: Mutex<Option<SftpConn>>,
}

impl SftpTransfer {
    pub fn new(cfg: &TransferConfig) -> Result<Self> {
        let known_hosts_path = resolve_known_hosts_path(cfg.known_hosts.as_deref())?;
        Ok(Self {
            params: SftpConnectParams {
                host: cfg.host.clone(),
                port: cfg.port,
                user: cfg.user.clone(),
                password: cfg.password.clone(),
                known_hosts_path,
            },
            remote_path: cfg.remote_path.clone(),
            op_timeout: cfg.timeout_duration()?,
            retry: cfg.retry.clone(),
            conn: Mutex::new(None),
        })
    }

    fn full_path(&self, name: &str) -> String {
        format!("{}{}", self.remote_path, name)
    }

    fn lock_conn(&self) -> std::sync::MutexGuard<'_, Option<SftpConn>> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run an operation against the cached connection, reconnecting when
    /// needed and retrying transient failures. A transient failure throws
    /// the connection away so the next attempt starts fresh.
    fn with_conn<T>(
        &self,
        op_name: &str,
        f: impl Fn(&SftpSession) -> RetryResult<T>,
    ) -> Result<T> {
        retry_op(&self.retry, op_name, || {
            let mut slot = self.lock_conn();
            if slot.is_none() {
                *slot = Some(ASYNC_RUNTIME.block_on(Self::connect(&self.params))?);
            }
            let conn = slot.as_ref().ok_or_else(|| {
                RetryError::permanent(SitekeepError::transfer(op_name, "no connection"))
            })?;

            match f(&conn.sftp) {
                Ok(val) => Ok(val),
                Err(e) => {
                    if e.retryable {
                        *slot = None;
                    }
                    Err(e)
                }
            }
        })
    }

    /// Establish a new SSH + SFTP connection with password authentication.
    async fn connect(params: &SftpConnectParams) -> RetryResult<SftpConn> {
        let config = Arc::new(client::Config {
            inactivity_timeout: Some(INACTIVITY_TIMEOUT),
            ..Default::default()
        });
        let handler = SshHandler {
            host: params.host.clone(),
            port: params.port,
            known_hosts_path: params.known_hosts_path.clone(),
        };

        let addr = (params.host.as_str(), params.port);
        let mut session =
            tokio::time::timeout(CONNECT_TIMEOUT, client::connect(config, addr, handler))
                .await
                .map_err(|_| {
                    RetryError::transient(SitekeepError::transfer(
                        "connect",
                        format!(
                            "SSH connect to {}:{} timed out after {}s",
                            params.host,
                            params.port,
                            CONNECT_TIMEOUT.as_secs()
                        ),
                    ))
                })?
                .map_err(|e| ssh_retry_error("connect", &params.host, params.port, e))?;

        let auth_ok = session
            .authenticate_password(&params.user, &params.password)
            .await
            .map_err(|e| ssh_retry_error("authenticate", &params.host, params.port, e))?;

        if !auth_ok.success() {
            return Err(RetryError::permanent(SitekeepError::transfer(
                "authenticate",
                format!(
                    "SSH password authentication failed for user '{}' on {}:{}",
                    params.user, params.host, params.port
                ),
            )));
        }

        let channel = session
            .channel_open_session()
            .await
            .map_err(|e| ssh_retry_error("open channel", &params.host, params.port, e))?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| ssh_retry_error("request sftp subsystem", &params.host, params.port, e))?;
        let sftp = SftpSession::new(channel.into_stream()).await.map_err(|e| {
            sftp_retry_error(
                "session init",
                &format!("{}:{}", params.host, params.port),
                e,
            )
        })?;

        Ok(SftpConn {
            sftp,
            _session: session,
        })
    }

    /// Bound an async SFTP operation by the configured transfer timeout.
    fn bounded<T>(
        &self,
        op: &str,
        path: &str,
        fut: impl std::future::Future<Output = RetryResult<T>>,
    ) -> RetryResult<T> {
        ASYNC_RUNTIME.block_on(async {
            tokio::time::timeout(self.op_timeout, fut).await.map_err(|_| {
                RetryError::transient(SitekeepError::transfer(
                    op,
                    format!(
                        "'{path}' timed out after {}s",
                        self.op_timeout.as_secs()
                    ),
                ))
            })?
        })
    }
}

impl RemoteTransfer for SftpTransfer {
    fn name(&self) -> &'static str {
        "sftp"
    }

    fn upload(&self, local: &Path, remote_name: &str) -> Result<()> {
        let path = self.full_path(remote_name);
        tracing::info!(local = %local.display(), remote = %path, "sftp upload");

        self.with_conn(&format!("upload {remote_name}"), |sftp| {
            self.bounded("upload", &path, async {
                if let Some(parent) = path.rsplit_once('/').map(|(p, _)| p) {
                    if !parent.is_empty() {
                        mkdir_p(sftp, parent).await?;
                    }
                }

                let mut remote = sftp
                    .open_with_flags(
                        &path,
                        OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::WRITE,
                    )
                    .await
                    .map_err(|e| sftp_retry_error("create", &path, e))?;

                let mut source = tokio::fs::File::open(local)
                    .await
                    .map_err(|e| RetryError::permanent(SitekeepError::Io(e)))?;

                tokio::io::copy(&mut source, &mut remote)
                    .await
                    .map_err(|e| io_retry_error("write", &path, e))?;
                remote
                    .flush()
                    .await
                    .map_err(|e| io_retry_error("flush", &path, e))?;
                remote
                    .shutdown()
                    .await
                    .map_err(|e| io_retry_error("close", &path, e))?;
                Ok(())
            })
        })
    }

    fn remove(&self, remote_name: &str) -> Result<()> {
        let path = self.full_path(remote_name);
        tracing::info!(remote = %path, "sftp remove");

        // A missing remote file is an error here: the connectivity test
        // relies on remove failing when the preceding upload went nowhere.
        self.with_conn(&format!("remove {remote_name}"), |sftp| {
            self.bounded("remove", &path, async {
                sftp.remove_file(&path)
                    .await
                    .map_err(|e| sftp_retry_error("remove", &path, e))
            })
        })
    }
}

fn resolve_known_hosts_path(explicit: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(crate::config::expand_tilde(path));
    }

    let home = dirs::home_dir()
        .ok_or_else(|| SitekeepError::Config("cannot determine home directory".into()))?;

    #[cfg(target_os = "windows")]
    {
        Ok(home.join("ssh").join("known_hosts"))
    }

    #[cfg(not(target_os = "windows"))]
    {
        Ok(home.join(".ssh").join("known_hosts"))
    }
}

fn ensure_known_hosts_file(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if path.exists() {
        return Ok(());
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;

        match std::fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .mode(0o600)
            .open(path)
        {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(e),
        }
    }

    #[cfg(not(unix))]
    {
        match std::fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(path)
        {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(e),
        }
    }
}

fn verify_or_learn_host_key(
    host: &str,
    port: u16,
    known_hosts_path: &Path,
    server_public_key: &ssh_key::PublicKey,
) -> std::result::Result<HostKeyState, russh::Error> {
    ensure_known_hosts_file(known_hosts_path).map_err(russh::Error::IO)?;

    let known = known_host_keys_path(host, port, known_hosts_path)?;
    if known
        .iter()
        .any(|(_, existing_key)| existing_key == server_public_key)
    {
        return Ok(HostKeyState::Matched);
    }

    if known.is_empty() {
        learn_known_hosts_path(host, port, server_public_key, known_hosts_path)?;
        return Ok(HostKeyState::Learned);
    }

    Err(russh::Error::KeyChanged { line: known[0].0 })
}

fn ssh_retry_error(op: &str, host: &str, port: u16, e: russh::Error) -> RetryError {
    let err = SitekeepError::transfer(op, format!("{host}:{port}: {e}"));
    if is_retryable_ssh_error(&e) {
        RetryError::transient(err)
    } else {
        RetryError::permanent(err)
    }
}

fn sftp_retry_error(op: &str, path: &str, e: russh_sftp::client::error::Error) -> RetryError {
    let err = SitekeepError::transfer(op, format!("'{path}': {e}"));
    if is_retryable_sftp_error(&e) {
        RetryError::transient(err)
    } else {
        RetryError::permanent(err)
    }
}

fn io_retry_error(op: &str, path: &str, e: std::io::Error) -> RetryError {
    let retryable = matches!(
        e.kind(),
        std::io::ErrorKind::TimedOut
            | std::io::ErrorKind::Interrupted
            | std::io::ErrorKind::WouldBlock
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::NotConnected
            | std::io::ErrorKind::BrokenPipe
    );

    let err = SitekeepError::transfer(op, format!("'{path}': {e}"));
    if retryable {
        RetryError::transient(err)
    } else {
        RetryError::permanent(err)
    }
}

fn is_retryable_ssh_error(e: &russh::Error) -> bool {
    matches!(
        e,
        russh::Error::KexInit
            | russh::Error::Kex
            | russh::Error::Disconnect
            | russh::Error::HUP
            | russh::Error::ConnectionTimeout
            | russh::Error::KeepaliveTimeout
            | russh::Error::InactivityTimeout
            | russh::Error::SendError
            | russh::Error::Pending
            | russh::Error::IO(_)
            | russh::Error::Elapsed(_)
    )
}

fn is_retryable_sftp_error(e: &russh_sftp::client::error::Error) -> bool {
    match e {
        russh_sftp::client::error::Error::Timeout => true,
        russh_sftp::client::error::Error::IO(_) => true,
        russh_sftp::client::error::Error::Limited(_) => true,
        russh_sftp::client::error::Error::UnexpectedPacket => true,
        russh_sftp::client::error::Error::UnexpectedBehavior(_) => true,
        russh_sftp::client::error::Error::Status(status) => matches!(
            status.status_code,
            StatusCode::NoConnection | StatusCode::ConnectionLost | StatusCode::BadMessage
        ),
    }
}

/// Recursively create directories for a remote path.
async fn mkdir_p(sftp: &SftpSession, path: &str) -> RetryResult<()> {
    let mut current = String::new();
    for component in path.split('/') {
        if component.is_empty() {
            current.push('/');
            continue;
        }
        if current.is_empty() || current == "/" {
            current = format!("{current}{component}");
        } else {
            current = format!("{current}/{component}");
        }
        match sftp.create_dir(&current).await {
            Ok(()) => {}
            Err(e) => match &e {
                russh_sftp::client::error::Error::Status(s)
                    if s.status_code == StatusCode::Failure =>
                {
                    // Likely already exists; verify with metadata.
                    if let Err(meta_err) = sftp.metadata(&current).await {
                        return Err(sftp_retry_error("mkdir", &current, meta_err));
                    }
                }
                _ => {
                    return Err(sftp_retry_error("mkdir", &current, e));
                }
            },
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransferBackend;

    fn transfer_config() -> TransferConfig {
        TransferConfig {
            backend: TransferBackend::Sftp,
            host: "backup.example.net".into(),
            port: 2222,
            user: "backup".into(),
            password: "secret".into(),
            remote_path: "/sites/".into(),
            known_hosts: Some("/tmp/kh".into()),
            timeout: "10m".into(),
            retry: RetryConfig::default(),
        }
    }

    #[test]
    fn full_path_joins_remote_path_and_name() {
        let t = SftpTransfer::new(&transfer_config()).unwrap();
        assert_eq!(t.full_path("backup_x.zip"), "/sites/backup_x.zip");
    }

    #[test]
    fn explicit_known_hosts_path_is_used() {
        let path = resolve_known_hosts_path(Some("/tmp/kh")).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/kh"));
    }

    #[test]
    fn ensure_known_hosts_creates_file_with_parents() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sub").join("known_hosts");
        ensure_known_hosts_file(&path).unwrap();
        assert!(path.exists());
        // Second call is a no-op.
        ensure_known_hosts_file(&path).unwrap();
    }
}
