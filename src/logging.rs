// src/logging.rs

//! Logging setup for `tasktide` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log level:
//! 1. the `level` argument of [`init_logging`] (if provided)
//! 2. `TASKTIDE_LOG` environment variable (e.g. "info", "debug")
//! 3. default to `info`
//!
//! Logs are sent to STDERR so that stdout stays free for the embedding
//! application and for child-process task output.
//!
//! The level filter sits behind a `reload` layer. At session start the
//! scheduler checks it against [`LOG_FLOOR`] and raises it if it would hide
//! task lifecycle logs. That is the only place the crate changes logging
//! configuration, and it never touches a subscriber it did not install.

use std::sync::OnceLock;

use anyhow::anyhow;
use tracing::Level;
use tracing::level_filters::LevelFilter;
use tracing::warn;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{Registry, fmt, reload};

use crate::errors::{Result, TasktideError};
use crate::session::{Session, Warning};

/// Environment variable consulted by [`init_logging`].
pub const LOG_ENV: &str = "TASKTIDE_LOG";

/// Coarsest level at which task lifecycle logs are still visible.
pub const LOG_FLOOR: LevelFilter = LevelFilter::INFO;

pub type LevelHandle = reload::Handle<LevelFilter, Registry>;

static HANDLE: OnceLock<LevelHandle> = OnceLock::new();

/// Initialise the global logging subscriber.
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(level: Option<Level>) -> Result<()> {
    let level = level
        .or_else(|| std::env::var(LOG_ENV).ok().and_then(|s| parse_level(&s)))
        .unwrap_or(Level::INFO);

    let (filter, handle) = reload::Layer::new(LevelFilter::from_level(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_writer(std::io::stderr),
        )
        .try_init()
        .map_err(|e| TasktideError::Other(anyhow!("installing log subscriber: {e}")))?;

    let _ = HANDLE.set(handle);
    Ok(())
}

/// Handle to the level filter installed by [`init_logging`], if any.
pub fn level_handle() -> Option<&'static LevelHandle> {
    HANDLE.get()
}

pub fn parse_level(s: &str) -> Option<Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}

/// Raise the filter behind `handle` to `floor` if it is coarser.
///
/// Returns the previous level when it was raised, `None` when it was
/// already at or finer than the floor.
pub fn ensure_log_floor(handle: &LevelHandle, floor: LevelFilter) -> Result<Option<LevelFilter>> {
    let current = handle
        .clone_current()
        .ok_or_else(|| TasktideError::Other(anyhow!("log subscriber has been dropped")))?;
    if current >= floor {
        return Ok(None);
    }
    handle
        .modify(|filter| *filter = floor)
        .map_err(|e| TasktideError::Other(anyhow!("raising log level: {e}")))?;
    Ok(Some(current))
}

/// Session-start hook for the log-floor contract.
pub(crate) fn apply_session_floor(session: &Session) {
    let Some(handle) = level_handle() else {
        return;
    };
    match ensure_log_floor(handle, LOG_FLOOR) {
        Ok(Some(from)) => {
            session.record_warning(Warning::LoggingFloorRaised {
                from,
                to: LOG_FLOOR,
            });
            if !session.config().silence_task_logging() {
                warn!(%from, to = %LOG_FLOOR, "log level too coarse for task logs; raised");
            }
        }
        Ok(None) => {}
        Err(err) => {
            if !session.config().silence_task_logging() {
                warn!(error = %err, "could not check log level floor");
            }
        }
    }
}
