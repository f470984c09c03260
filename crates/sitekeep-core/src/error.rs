use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SitekeepError>;

#[derive(Debug, Error)]
pub enum SitekeepError {
    #[error("database export failed (exit code {code}): {stderr}")]
    ExportFailed { code: String, stderr: String },

    #[error("cannot create archive: {0}")]
    ArchiveCreate(String),

    #[error("content directory not found: '{}'", .0.display())]
    SourceMissing(PathBuf),

    #[error("transfer {op} failed: {cause}")]
    Transfer { op: String, cause: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl SitekeepError {
    /// Build a [`SitekeepError::Transfer`] from an operation name and cause.
    pub fn transfer(op: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        SitekeepError::Transfer {
            op: op.into(),
            cause: cause.to_string(),
        }
    }
}
