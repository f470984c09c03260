use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "sitekeep",
    version,
    about = "Site backups: database dump, zip archive, SFTP upload, retention",
    after_help = "\
Configuration file lookup order:
  1. --config <path>             (explicit flag)
  2. $SITEKEEP_CONFIG            (environment variable)
  3. ./sitekeep.yaml             (project)
  4. User config dir + /sitekeep/config.yaml (e.g. ~/.config or %APPDATA%)
  5. System config path (Unix: /etc/sitekeep/config.yaml, Windows: %PROGRAMDATA%/sitekeep/config.yaml)

Environment variables:
  SITEKEEP_CONFIG   Path to configuration file (overrides default search)"
)]
pub(crate) struct Cli {
    /// Path to configuration file (overrides SITEKEEP_CONFIG and default search)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run a backup job now: dump, archive, upload, apply retention
    Run,

    /// Check remote connectivity by uploading and deleting a marker file
    Test,

    /// Apply the retention policy to the local backup directory
    Prune {
        /// Override the configured number of archives to keep
        #[arg(long)]
        keep_last: Option<usize>,
    },

    /// Generate a minimal configuration file
    Config {
        /// Destination path (prompts for a standard location when omitted)
        dest: Option<String>,
    },

    /// Run scheduled backups as a foreground daemon
    Daemon,
}
