use std::time::Duration;

pub(super) fn default_db_host() -> String {
    "localhost".to_string()
}

pub(super) fn default_dump_command() -> String {
    "mysqldump".to_string()
}

pub(super) fn default_dump_timeout() -> String {
    "1h".to_string()
}

pub(super) fn default_sftp_port() -> u16 {
    22
}

pub(super) fn default_remote_path() -> String {
    "/".to_string()
}

pub(super) fn default_transfer_timeout() -> String {
    "10m".to_string()
}

pub(super) fn default_keep_last() -> usize {
    10
}

pub(super) fn default_max_retries() -> usize {
    3
}

pub(super) fn default_retry_delay_ms() -> u64 {
    1000
}

pub(super) fn default_retry_max_delay_ms() -> u64 {
    60_000
}

pub(super) fn default_schedule_every() -> String {
    "24h".to_string()
}

/// Parse a simple duration string like "30m", "4h", or "2d".
/// A bare number is treated as days.
pub fn parse_human_duration(raw: &str) -> crate::error::Result<Duration> {
    let input = raw.trim();
    if input.is_empty() {
        return Err(crate::error::SitekeepError::Config(
            "duration must not be empty".into(),
        ));
    }

    let (num_part, unit) = match input.chars().last() {
        Some(c) if c.is_ascii_alphabetic() => (&input[..input.len() - 1], Some(c)),
        Some(_) => (input, None),
        None => {
            return Err(crate::error::SitekeepError::Config(
                "duration must not be empty".into(),
            ));
        }
    };

    let value: u64 = num_part.parse().map_err(|_| {
        crate::error::SitekeepError::Config(format!("invalid duration value: '{raw}'"))
    })?;

    let secs = match unit {
        Some('s') | Some('S') => value,
        Some('m') | Some('M') => value.saturating_mul(60),
        Some('h') | Some('H') => value.saturating_mul(60 * 60),
        Some('d') | Some('D') => value.saturating_mul(60 * 60 * 24),
        Some(other) => {
            return Err(crate::error::SitekeepError::Config(format!(
                "unsupported duration suffix '{other}' in '{raw}' (use s/m/h/d)"
            )));
        }
        None => value.saturating_mul(60 * 60 * 24),
    };

    if secs == 0 {
        return Err(crate::error::SitekeepError::Config(
            "duration must be greater than zero".into(),
        ));
    }

    Ok(Duration::from_secs(secs))
}
