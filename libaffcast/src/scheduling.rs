//! Schedule-time parsing for queue entries
//!
//! Queue times are naive local timestamps, so every accepted form resolves
//! against local wall-clock time.

use chrono::{Duration, Local, NaiveDateTime, TimeZone, Timelike};

use crate::error::{AffcastError, Result};
use crate::types::parse_timestamp;

/// Parse a schedule string into a naive local timestamp
///
/// Supports, in order:
/// - ISO-8601: "2025-01-01T09:00:00", "2025-01-01 09:00"
/// - Relative durations: "30m", "2h", "+1d"
/// - Natural language: "tomorrow", "next monday 10am"
pub fn parse_schedule(input: &str, now: NaiveDateTime) -> Result<NaiveDateTime> {
    let input = input.trim();
    if input.is_empty() {
        return Err(AffcastError::InvalidInput(
            "Schedule string cannot be empty".to_string(),
        ));
    }

    if let Some(ts) = parse_timestamp(input) {
        return Ok(ts);
    }

    if let Ok(duration) = parse_duration(input.trim_start_matches('+')) {
        return Ok(truncate(now + duration));
    }

    if let Ok(ts) = parse_natural_language(input, now) {
        return Ok(truncate(ts));
    }

    Err(AffcastError::InvalidInput(format!(
        "Could not parse schedule string: {}",
        input
    )))
}

fn parse_duration(input: &str) -> Result<Duration> {
    let std_duration = humantime::parse_duration(input)
        .map_err(|e| AffcastError::InvalidInput(format!("Could not parse duration: {}", e)))?;

    let seconds = i64::try_from(std_duration.as_secs())
        .map_err(|_| AffcastError::InvalidInput("Duration out of range".to_string()))?;

    Duration::try_seconds(seconds)
        .ok_or_else(|| AffcastError::InvalidInput("Duration out of range".to_string()))
}

fn parse_natural_language(input: &str, now: NaiveDateTime) -> Result<NaiveDateTime> {
    let base = Local
        .from_local_datetime(&now)
        .earliest()
        .ok_or_else(|| AffcastError::InvalidInput("Current time is not representable".to_string()))?;

    chrono_english::parse_date_string(input, base, chrono_english::Dialect::Us)
        .map(|dt| dt.naive_local())
        .map_err(|e| AffcastError::InvalidInput(format!("Could not parse time: {}", e)))
}

fn truncate(ts: NaiveDateTime) -> NaiveDateTime {
    ts.with_nanosecond(0).unwrap_or(ts)
}
