use std::time::{Duration, Instant};

use sitekeep_core::config::SitekeepConfig;
use sitekeep_core::job;
use sitekeep_core::scheduler::BackupSchedule;

use crate::signal;

pub(crate) fn run_daemon(cfg: &SitekeepConfig) -> Result<(), Box<dyn std::error::Error>> {
    if !cfg.schedule.enabled {
        return Err(
            "schedule.enabled is false; set it to true in your config to use daemon mode".into(),
        );
    }

    let schedule = BackupSchedule::from_config(&cfg.schedule)?;

    tracing::info!(
        interval = ?schedule.interval(),
        on_startup = schedule.runs_immediately(),
        jitter_seconds = cfg.schedule.jitter_seconds,
        "daemon starting"
    );

    let mut next_run = if schedule.runs_immediately() {
        Instant::now()
    } else {
        schedule_next(&schedule)
    };

    loop {
        if signal::shutdown_requested() {
            tracing::info!("shutdown signal received, exiting");
            return Ok(());
        }

        if Instant::now() >= next_run {
            run_backup_cycle(cfg);

            if signal::shutdown_requested() {
                tracing::info!("shutdown signal received, exiting");
                return Ok(());
            }

            next_run = schedule_next(&schedule);
        }

        std::thread::sleep(Duration::from_secs(1));
    }
}

fn schedule_next(schedule: &BackupSchedule) -> Instant {
    let delay = schedule.next_delay();
    log_next_run(delay);
    Instant::now() + delay
}

fn run_backup_cycle(cfg: &SitekeepConfig) {
    tracing::info!("backup cycle starting");
    let cycle_start = Instant::now();

    match job::run_backup(cfg) {
        Ok(report) => {
            let elapsed = cycle_start.elapsed();
            if report.uploaded() && report.retention_error.is_none() {
                tracing::info!(
                    archive = %report.archive_name,
                    duration = ?elapsed,
                    "backup cycle finished successfully"
                );
            } else {
                tracing::warn!(
                    archive = %report.archive_name,
                    uploaded = report.uploaded(),
                    duration = ?elapsed,
                    "backup cycle finished with warnings"
                );
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "backup cycle failed");
        }
    }
}

fn log_next_run(delay: Duration) {
    let next_wall = chrono::Local::now()
        + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
    tracing::info!(
        next_run = %next_wall.format("%Y-%m-%d %H:%M:%S %Z"),
        delay = ?delay,
        "next backup scheduled"
    );
}
