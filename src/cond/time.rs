use chrono::{DateTime, Local, NaiveTime};
use std::time::Duration;

use crate::errors::{Result, TasktideError};

/// Parse `HH:MM` or `HH:MM:SS`.
pub fn parse_clock(s: &str) -> Result<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .map_err(|_| {
            TasktideError::Config(format!("invalid time of day: '{s}' (expected HH:MM[:SS])"))
        })
}

pub(crate) fn in_window(t: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    if start == end {
        true
    } else if start < end {
        start <= t && t < end
    } else {
        t >= start || t < end
    }
}

/// Time between `earlier` and `now`; zero when `earlier` lies in the future.
pub(crate) fn elapsed_since(now: DateTime<Local>, earlier: DateTime<Local>) -> Duration {
    (now - earlier).to_std().unwrap_or(Duration::ZERO)
}
