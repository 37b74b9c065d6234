//! # Utility Functions
//!
//! Timestamp and duration helpers shared by the library and the CLI.

use crate::{error::Result, MarketError};

/// Format timestamp as human-readable string
pub fn format_timestamp(timestamp: u64) -> String {
    use chrono::DateTime;
    let dt = DateTime::from_timestamp(timestamp as i64, 0).unwrap_or_default();
    dt.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Parse timestamp from string
pub fn parse_timestamp(timestamp_str: &str) -> Result<u64> {
    timestamp_str
        .trim()
        .parse::<u64>()
        .map_err(|_| MarketError::InvalidArgument(format!("Invalid timestamp: {timestamp_str}")))
}

/// Parse a duration such as `3600`, `90s`, `45m`, `2h` or `7d` into seconds.
pub fn parse_duration(duration_str: &str) -> Result<u64> {
    let trimmed = duration_str.trim();
    let invalid = || MarketError::InvalidArgument(format!("Invalid duration: {duration_str}"));

    let (digits, unit) = match trimmed.char_indices().find(|(_, c)| !c.is_ascii_digit()) {
        Some((split, _)) => trimmed.split_at(split),
        None => (trimmed, "s"),
    };
    let value = digits.parse::<u64>().map_err(|_| invalid())?;
    let multiplier = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86400,
        _ => return Err(invalid()),
    };

    value.checked_mul(multiplier).ok_or_else(invalid)
}

/// Render seconds as a compact `1d 2h 3m 4s` string.
pub fn format_duration(seconds: u64) -> String {
    if seconds == 0 {
        return "0s".to_string();
    }

    let parts = [
        (seconds / 86400, "d"),
        (seconds % 86400 / 3600, "h"),
        (seconds % 3600 / 60, "m"),
        (seconds % 60, "s"),
    ];
    parts
        .iter()
        .filter(|(value, _)| *value > 0)
        .map(|(value, unit)| format!("{value}{unit}"))
        .collect::<Vec<_>>()
        .join(" ")
}
