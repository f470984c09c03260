mod cli;
mod cmd;
mod config_gen;
mod signal;

use clap::Parser;

use sitekeep_core::config;

use cli::{Cli, Commands};
use config_gen::run_config_generate;

fn main() {
    let cli = Cli::parse();

    // Initialize logging; daemon auto-upgrades to info.
    let filter = match cli.verbose {
        0 if matches!(&cli.command, Commands::Daemon) => "info",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // `config` needs no config file.
    if let Commands::Config { dest } = &cli.command {
        if let Err(e) = run_config_generate(dest.as_deref()) {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
        return;
    }

    let source = match config::resolve_config_path(cli.config.as_deref()) {
        Some(s) => s,
        None => {
            eprintln!("Error: no configuration file found.");
            eprintln!("Searched:");
            for (path, level) in config::default_config_search_paths() {
                eprintln!("  {} ({})", path.display(), level);
            }
            eprintln!();
            eprintln!("Run `sitekeep config` to generate a starter config file.");
            std::process::exit(1);
        }
    };

    tracing::info!("Using config: {source}");

    let cfg = match config::load_config(source.path()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let result: Result<(), String> = match &cli.command {
        Commands::Run => cmd::run::run_backup(&cfg).map_err(|e| e.to_string()),
        Commands::Test => cmd::test::run_self_test(&cfg.transfer),
        Commands::Prune { keep_last } => {
            cmd::prune::run_prune(&cfg, *keep_last).map_err(|e| e.to_string())
        }
        Commands::Daemon => {
            signal::install();
            cmd::daemon::run_daemon(&cfg).map_err(|e| e.to_string())
        }
        // Handled before config resolution.
        Commands::Config { .. } => return,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
