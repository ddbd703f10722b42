//! Duration strings for the CLI and plugin settings
//!
//! Accepts a sequence of decimal numbers each followed by a unit, e.g.
//! `10s`, `500ms`, `1m30s` or `1.5h`. Valid units are `ns`, `us` (or `µs`),
//! `ms`, `s`, `m` and `h`. A bare `0` is also accepted.

use crate::error::ConfigError;
use std::time::Duration;

const UNITS: &[(&str, f64)] = &[
    ("ns", 1.0),
    ("us", 1e3),
    ("µs", 1e3),
    ("ms", 1e6),
    ("s", 1e9),
    ("m", 60e9),
    ("h", 3600e9),
];

/// Parse a duration string such as `"1m30s"`
///
/// # Errors
///
/// Returns `ConfigError::InvalidDuration` if the string is empty, negative,
/// has a number without unit, or uses an unknown unit.
///
/// # Example
///
/// ```
/// use execd_shim::config::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
/// ```
pub fn parse_duration(input: &str) -> Result<Duration, ConfigError> {
    let invalid = |message: &str| ConfigError::InvalidDuration {
        input: input.to_string(),
        message: message.to_string(),
    };

    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(invalid("empty duration"));
    }
    if trimmed == "0" {
        return Ok(Duration::ZERO);
    }
    if trimmed.starts_with('-') {
        return Err(invalid("negative durations are not allowed"));
    }

    let mut rest = trimmed.strip_prefix('+').unwrap_or(trimmed);
    let mut total_nanos = 0f64;

    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(number_len);
        if number.is_empty() {
            return Err(invalid("expected a number"));
        }
        let value: f64 = number
            .parse()
            .map_err(|_| invalid(&format!("invalid number '{}'", number)))?;

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        if unit.is_empty() {
            return Err(invalid("missing unit"));
        }
        let scale = UNITS
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, scale)| *scale)
            .ok_or_else(|| invalid(&format!("unknown unit '{}'", unit)))?;

        total_nanos += value * scale;
        rest = tail;
    }

    if !total_nanos.is_finite() || total_nanos > u64::MAX as f64 {
        return Err(invalid("duration is too large"));
    }
    Ok(Duration::from_nanos(total_nanos.round() as u64))
}
