use std::time::Duration;

use rand::Rng;

use crate::config::ScheduleConfig;
use crate::error::Result;

/// Tick source for the daemon loop: a fixed interval, an optional random
/// jitter added to every tick, and a flag for whether the first backup runs
/// immediately at startup.
#[derive(Debug, Clone)]
pub struct BackupSchedule {
    interval: Duration,
    jitter_seconds: u64,
    on_startup: bool,
}

impl BackupSchedule {
    /// Parse the schedule section into a usable tick source. Fails when
    /// `schedule.every` is not a valid non-zero duration.
    pub fn from_config(schedule: &ScheduleConfig) -> Result<Self> {
        Ok(Self {
            interval: schedule.every_duration()?,
            jitter_seconds: schedule.jitter_seconds,
            on_startup: schedule.on_startup,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether the first backup runs at daemon start instead of waiting a
    /// full interval.
    pub fn runs_immediately(&self) -> bool {
        self.on_startup
    }

    /// Delay until the next tick: the interval plus a fresh jitter sample.
    /// Each call draws new jitter, so the caller should sample once per tick
    /// and reuse the value for both scheduling and logging.
    pub fn next_delay(&self) -> Duration {
        self.interval + self.jitter()
    }

    fn jitter(&self) -> Duration {
        if self.jitter_seconds == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs(rand::thread_rng().gen_range(0..=self.jitter_seconds))
    }
}
