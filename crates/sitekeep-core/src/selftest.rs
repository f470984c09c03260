use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::info;

use crate::config::TransferConfig;
use crate::transfer::{self, RemoteTransfer};

/// Pipeline stage at which a connectivity test failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelfTestPhase {
    /// Could not create the local marker file.
    TempFile,
    /// Could not construct the transfer backend.
    Connect,
    /// Marker upload failed.
    Upload,
    /// Marker deletion failed; the marker may be left on the server.
    Delete,
}

impl std::fmt::Display for SelfTestPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SelfTestPhase::TempFile => "temp-file",
            SelfTestPhase::Connect => "connect",
            SelfTestPhase::Upload => "upload",
            SelfTestPhase::Delete => "delete",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub enum SelfTestReport {
    /// Marker was uploaded and deleted; the destination is usable.
    Success,
    Failed {
        phase: SelfTestPhase,
        cause: String,
    },
}

impl SelfTestReport {
    pub fn is_success(&self) -> bool {
        matches!(self, SelfTestReport::Success)
    }
}

/// Verify the configured destination end to end by uploading a small marker
/// file and deleting it again. Nothing of the real pipeline runs.
pub fn run_self_test(cfg: &TransferConfig) -> SelfTestReport {
    let backend = match transfer::backend_from_config(cfg) {
        Ok(b) => b,
        Err(e) => {
            return SelfTestReport::Failed {
                phase: SelfTestPhase::Connect,
                cause: e.to_string(),
            }
        }
    };
    run_with_transfer(backend.as_ref())
}

pub fn run_with_transfer(transfer: &dyn RemoteTransfer) -> SelfTestReport {
    let epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let marker = format!("sitekeep_test_{epoch}.txt");

    let tmp = (|| {
        let mut f = tempfile::Builder::new()
            .prefix("sitekeep_marker_")
            .suffix(".txt")
            .tempfile()?;
        writeln!(f, "sitekeep connectivity test {epoch}")?;
        f.flush()?;
        Ok::<_, std::io::Error>(f)
    })();
    let tmp = match tmp {
        Ok(f) => f,
        Err(e) => {
            return SelfTestReport::Failed {
                phase: SelfTestPhase::TempFile,
                cause: e.to_string(),
            }
        }
    };

    info!(backend = transfer.name(), marker = %marker, "self-test: uploading marker");
    if let Err(e) = transfer.upload(tmp.path(), &marker) {
        return SelfTestReport::Failed {
            phase: SelfTestPhase::Upload,
            cause: e.to_string(),
        };
    }

    info!(marker = %marker, "self-test: deleting marker");
    if let Err(e) = transfer.remove(&marker) {
        return SelfTestReport::Failed {
            phase: SelfTestPhase::Delete,
            cause: e.to_string(),
        };
    }

    info!(marker = %marker, "self-test passed");
    SelfTestReport::Success
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MemoryTransfer;

    #[test]
    fn success_when_upload_and_delete_work() {
        let transfer = MemoryTransfer::new();
        let report = run_with_transfer(&transfer);
        assert!(report.is_success());
        // Marker must not linger after a successful test.
        assert!(transfer.uploaded_names().is_empty());
    }

    #[test]
    fn upload_failure_is_reported_with_phase() {
        let transfer = MemoryTransfer::new();
        transfer.fail_uploads();
        match run_with_transfer(&transfer) {
            SelfTestReport::Failed { phase, cause } => {
                assert_eq!(phase, SelfTestPhase::Upload);
                assert!(cause.contains("injected"));
            }
            other => panic!("expected failure, got: {other:?}"),
        }
    }

    #[test]
    fn delete_failure_is_reported_with_phase() {
        let transfer = MemoryTransfer::new();
        transfer.fail_removes();
        match run_with_transfer(&transfer) {
            SelfTestReport::Failed { phase, .. } => {
                assert_eq!(phase, SelfTestPhase::Delete);
                // The marker stays behind when deletion fails.
                assert_eq!(transfer.uploaded_names().len(), 1);
            }
            other => panic!("expected failure, got: {other:?}"),
        }
    }
}
