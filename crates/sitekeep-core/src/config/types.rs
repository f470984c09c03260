use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::defaults::*;
use crate::error::{Result, SitekeepError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SitekeepConfig {
    pub backup: BackupConfig,
    pub database: DatabaseConfig,
    pub transfer: TransferConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

impl SitekeepConfig {
    /// Validate cross-field invariants and normalize paths.
    /// Called once after deserialization; pipeline components may then
    /// assume a well-formed config.
    pub fn validate(&mut self) -> Result<()> {
        self.backup.validate()?;
        self.database.validate()?;
        self.transfer.validate()?;
        if self.schedule.enabled {
            self.schedule.every_duration()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Directory tree to include in the archive (e.g. the site content dir).
    pub content_dir: String,
    /// Local directory where finished archives are kept.
    pub backup_dir: String,
}

impl BackupConfig {
    fn validate(&self) -> Result<()> {
        if self.content_dir.trim().is_empty() {
            return Err(SitekeepError::Config(
                "backup.content_dir must not be empty".into(),
            ));
        }
        if self.backup_dir.trim().is_empty() {
            return Err(SitekeepError::Config(
                "backup.backup_dir must not be empty".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_host")]
    pub host: String,
    pub user: String,
    /// Passed to the dump process via the MYSQL_PWD environment variable,
    /// never on the command line.
    #[serde(default)]
    pub password: Option<String>,
    /// Database name.
    pub name: String,
    /// Dump utility binary name or path.
    #[serde(default = "default_dump_command")]
    pub dump_command: String,
    /// Upper bound on dump runtime ("30m", "1h", ...).
    #[serde(default = "default_dump_timeout")]
    pub timeout: String,
}

impl DatabaseConfig {
    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(SitekeepError::Config(
                "database.name must not be empty".into(),
            ));
        }
        if self.dump_command.trim().is_empty() {
            return Err(SitekeepError::Config(
                "database.dump_command must not be empty".into(),
            ));
        }
        self.timeout_duration()?;
        Ok(())
    }

    pub fn timeout_duration(&self) -> Result<Duration> {
        parse_duration_field("database.timeout", &self.timeout)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferBackend {
    /// Native SFTP client (russh).
    Sftp,
    /// External curl binary with an sftp:// URL.
    Curl,
}

impl TransferBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            TransferBackend::Sftp => "sftp",
            TransferBackend::Curl => "curl",
        }
    }
}

impl Default for TransferBackend {
    fn default() -> Self {
        TransferBackend::Sftp
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    #[serde(default)]
    pub backend: TransferBackend,
    pub host: String,
    #[serde(default = "default_sftp_port")]
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Remote base directory; normalized to end with '/'.
    #[serde(default = "default_remote_path")]
    pub remote_path: String,
    /// OpenSSH known_hosts file for host key verification (sftp backend).
    #[serde(default)]
    pub known_hosts: Option<String>,
    /// Upper bound on a single upload or remove operation.
    #[serde(default = "default_transfer_timeout")]
    pub timeout: String,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl TransferConfig {
    fn validate(&mut self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(SitekeepError::Config(
                "transfer.host must not be empty".into(),
            ));
        }
        if self.remote_path.trim().is_empty() {
            return Err(SitekeepError::Config(
                "transfer.remote_path must not be empty".into(),
            ));
        }
        if !self.remote_path.ends_with('/') {
            self.remote_path.push('/');
        }
        self.timeout_duration()?;
        Ok(())
    }

    pub fn timeout_duration(&self) -> Result<Duration> {
        parse_duration_field("transfer.timeout", &self.timeout)
    }

    /// Absolute remote path for an archive or marker name.
    pub fn remote_file(&self, name: &str) -> String {
        format!("{}{}", self.remote_path, name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeleteErrorPolicy {
    /// Log the failed deletion and keep going (the historical behavior).
    BestEffort,
    /// Abort the retention pass on the first failed deletion.
    Stop,
}

impl Default for DeleteErrorPolicy {
    fn default() -> Self {
        DeleteErrorPolicy::BestEffort
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Keep the N most recent archives; older ones are deleted.
    #[serde(default = "default_keep_last")]
    pub keep_last: usize,
    #[serde(default)]
    pub on_delete_error: DeleteErrorPolicy,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            keep_last: default_keep_last(),
            on_delete_error: DeleteErrorPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_schedule_every")]
    pub every: String,
    #[serde(default)]
    pub on_startup: bool,
    #[serde(default)]
    pub jitter_seconds: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            every: default_schedule_every(),
            on_startup: false,
            jitter_seconds: 0,
        }
    }
}

impl ScheduleConfig {
    pub fn every_duration(&self) -> Result<Duration> {
        parse_duration_field("schedule.every", &self.every)
    }
}

/// Retry configuration for remote transfer operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries).
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    /// Initial delay between retries in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

fn parse_duration_field(field: &str, raw: &str) -> Result<Duration> {
    super::defaults::parse_human_duration(raw)
        .map_err(|e| SitekeepError::Config(format!("{field}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> SitekeepConfig {
        SitekeepConfig {
            backup: BackupConfig {
                content_dir: "/srv/site/content".into(),
                backup_dir: "/var/backups/site".into(),
            },
            database: DatabaseConfig {
                host: default_db_host(),
                user: "site".into(),
                password: None,
                name: "sitedb".into(),
                dump_command: default_dump_command(),
                timeout: default_dump_timeout(),
            },
            transfer: TransferConfig {
                backend: TransferBackend::Sftp,
                host: "backup.example.net".into(),
                port: 22,
                user: "backup".into(),
                password: "secret".into(),
                remote_path: "/sites/".into(),
                known_hosts: None,
                timeout: default_transfer_timeout(),
                retry: RetryConfig::default(),
            },
            retention: RetentionConfig::default(),
            schedule: ScheduleConfig::default(),
        }
    }

    #[test]
    fn validate_accepts_well_formed_config() {
        let mut cfg = base_config();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_host() {
        let mut cfg = base_config();
        cfg.transfer.host = "  ".into();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("transfer.host"));
    }

    #[test]
    fn validate_rejects_empty_database_name() {
        let mut cfg = base_config();
        cfg.database.name = String::new();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("database.name"));
    }

    #[test]
    fn validate_normalizes_remote_path_trailing_slash() {
        let mut cfg = base_config();
        cfg.transfer.remote_path = "/sites".into();
        cfg.validate().unwrap();
        assert_eq!(cfg.transfer.remote_path, "/sites/");
        assert_eq!(
            cfg.transfer.remote_file("backup_x.zip"),
            "/sites/backup_x.zip"
        );
    }

    #[test]
    fn validate_rejects_bad_timeout() {
        let mut cfg = base_config();
        cfg.database.timeout = "soon".into();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("database.timeout"));
    }

    #[test]
    fn delete_error_policy_defaults_to_best_effort() {
        assert_eq!(
            RetentionConfig::default().on_delete_error,
            DeleteErrorPolicy::BestEffort
        );
    }
}
