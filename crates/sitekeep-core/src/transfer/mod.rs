use std::path::Path;
use std::time::Duration;

use crate::config::{RetryConfig, TransferBackend, TransferConfig};
use crate::error::{Result, SitekeepError};

pub mod curl;
pub mod runtime;
pub mod sftp;

/// Remote destination for finished archives.
///
/// The orchestrator and self-test only ever upload a local file under a
/// remote name and remove a remote name; both backends implement exactly
/// that surface.
pub trait RemoteTransfer: Send + Sync {
    /// Backend label for logs and reports.
    fn name(&self) -> &'static str;

    /// Upload `local` to `remote_name` inside the configured remote path,
    /// replacing any existing file of that name.
    fn upload(&self, local: &Path, remote_name: &str) -> Result<()>;

    /// Remove `remote_name` from the configured remote path.
    fn remove(&self, remote_name: &str) -> Result<()>;
}

/// Build the transfer backend selected in the config.
pub fn backend_from_config(cfg: &TransferConfig) -> Result<Box<dyn RemoteTransfer>> {
    match cfg.backend {
        TransferBackend::Sftp => Ok(Box::new(sftp::SftpTransfer::new(cfg)?)),
        TransferBackend::Curl => Ok(Box::new(curl::CurlTransfer::new(cfg)?)),
    }
}

/// An error plus whether the operation is worth retrying.
#[derive(Debug)]
pub(crate) struct RetryError {
    pub err: SitekeepError,
    pub retryable: bool,
}

pub(crate) type RetryResult<T> = std::result::Result<T, RetryError>;

impl RetryError {
    pub fn transient(err: SitekeepError) -> Self {
        Self {
            err,
            retryable: true,
        }
    }

    pub fn permanent(err: SitekeepError) -> Self {
        Self {
            err,
            retryable: false,
        }
    }
}

/// Retry an operation with exponential backoff and jitter. Transient errors
/// are retried up to `retry.max_retries` times; permanent errors abort at
/// once.
pub(crate) fn retry_op<T>(
    retry: &RetryConfig,
    op_name: &str,
    mut f: impl FnMut() -> RetryResult<T>,
) -> Result<T> {
    let mut delay_ms = retry.retry_delay_ms;
    let mut retries_used = 0usize;

    loop {
        match f() {
            Ok(val) => return Ok(val),
            Err(e) if e.retryable && retries_used < retry.max_retries => {
                retries_used += 1;
                tracing::warn!(
                    "{op_name}: transient error (attempt {}/{}), retrying: {}",
                    retries_used,
                    retry.max_retries,
                    e.err
                );
                let base = delay_ms.max(1);
                let jitter = rand::random::<u64>() % base;
                std::thread::sleep(Duration::from_millis(base + jitter));
                delay_ms = (base.saturating_mul(2)).min(retry.retry_max_delay_ms.max(1));
            }
            Err(e) => return Err(e.err),
        }
    }
}
