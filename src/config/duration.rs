// src/config/duration.rs

//! Duration-like inputs and their normalisation.
//!
//! Timeouts and other intervals may be given as a number of seconds, as a
//! literal such as `"0.1 seconds"` or `"1h 30m"`, or as an explicit
//! [`Duration`]. All three normalise through [`DurationInput::to_duration`],
//! so equal amounts of time compare equal regardless of the spelling.

use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Deserializer};

use crate::errors::{Result, TasktideError};

static LITERAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:\d+(?:\.\d+)?\s*[a-zA-Z]+\s*)+$").expect("literal regex is valid")
});

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)\s*([a-zA-Z]+)").expect("token regex is valid")
});

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// A duration as supplied by a caller, before normalisation.
#[derive(Debug, Clone, PartialEq)]
pub enum DurationInput {
    Seconds(f64),
    Literal(String),
    Exact(Duration),
}

impl DurationInput {
    /// Normalise into a [`Duration`].
    pub fn to_duration(&self) -> Result<Duration> {
        match self {
            DurationInput::Seconds(secs) => seconds_to_duration(*secs),
            DurationInput::Literal(s) => parse_literal(s),
            DurationInput::Exact(d) => Ok(*d),
        }
    }

    /// Normalise into a [`TimeoutSetting`]; `"never"` / `"none"` disable it.
    pub fn to_timeout(&self) -> Result<TimeoutSetting> {
        if let DurationInput::Literal(s) = self
            && matches!(s.trim().to_lowercase().as_str(), "never" | "none")
        {
            return Ok(TimeoutSetting::Never);
        }
        self.to_duration().map(TimeoutSetting::After)
    }
}

impl From<f64> for DurationInput {
    fn from(secs: f64) -> Self {
        DurationInput::Seconds(secs)
    }
}

impl From<u64> for DurationInput {
    fn from(secs: u64) -> Self {
        DurationInput::Seconds(secs as f64)
    }
}

impl From<&str> for DurationInput {
    fn from(s: &str) -> Self {
        DurationInput::Literal(s.to_string())
    }
}

impl From<String> for DurationInput {
    fn from(s: String) -> Self {
        DurationInput::Literal(s)
    }
}

impl From<Duration> for DurationInput {
    fn from(d: Duration) -> Self {
        DurationInput::Exact(d)
    }
}

impl<'de> Deserialize<'de> for DurationInput {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Seconds(f64),
            Literal(String),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Seconds(secs) => DurationInput::Seconds(secs),
            Repr::Literal(s) => DurationInput::Literal(s),
        })
    }
}

/// Normalised timeout: either a bound or no limit at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutSetting {
    After(Duration),
    Never,
}

impl TimeoutSetting {
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            TimeoutSetting::After(d) => Some(*d),
            TimeoutSetting::Never => None,
        }
    }
}

impl fmt::Display for TimeoutSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutSetting::After(d) => write!(f, "{}", format_duration(*d)),
            TimeoutSetting::Never => f.write_str("never"),
        }
    }
}

fn seconds_to_duration(secs: f64) -> Result<Duration> {
    if !secs.is_finite() || secs < 0.0 {
        return Err(TasktideError::Config(format!(
            "duration must be a non-negative number of seconds (got {secs})"
        )));
    }
    Ok(Duration::from_nanos((secs * NANOS_PER_SEC).round() as u64))
}

fn unit_nanos(unit: &str) -> Option<f64> {
    let nanos = match unit.to_lowercase().as_str() {
        "ms" | "millisecond" | "milliseconds" => 1_000_000.0,
        "s" | "sec" | "secs" | "second" | "seconds" => NANOS_PER_SEC,
        "m" | "min" | "mins" | "minute" | "minutes" => 60.0 * NANOS_PER_SEC,
        "h" | "hour" | "hours" => 3_600.0 * NANOS_PER_SEC,
        "d" | "day" | "days" => 86_400.0 * NANOS_PER_SEC,
        _ => return None,
    };
    Some(nanos)
}

/// Parse a duration literal such as `"0.1 seconds"`, `"250ms"` or `"1h 30m"`.
///
/// A bare number is read as seconds.
pub fn parse_literal(s: &str) -> Result<Duration> {
    let trimmed = s.trim();

    if let Ok(secs) = trimmed.parse::<f64>() {
        return seconds_to_duration(secs);
    }

    if !LITERAL_RE.is_match(trimmed) {
        return Err(TasktideError::Config(format!(
            "invalid duration literal: '{s}'"
        )));
    }

    let mut total = 0.0_f64;
    for caps in TOKEN_RE.captures_iter(trimmed) {
        let value: f64 = caps[1].parse().map_err(|_| {
            TasktideError::Config(format!("invalid number in duration literal: '{s}'"))
        })?;
        let unit = &caps[2];
        let nanos = unit_nanos(unit).ok_or_else(|| {
            TasktideError::Config(format!("unknown duration unit '{unit}' in '{s}'"))
        })?;
        total += value * nanos;
    }

    Ok(Duration::from_nanos(total.round() as u64))
}

/// Compact human form used in logs and canonical condition strings.
pub fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }
    if nanos % 1_000_000_000 != 0 {
        return format!("{}ms", d.as_secs_f64() * 1000.0);
    }
    let secs = d.as_secs();
    if secs % 86_400 == 0 {
        format!("{}d", secs / 86_400)
    } else if secs % 3_600 == 0 {
        format!("{}h", secs / 3_600)
    } else if secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}
