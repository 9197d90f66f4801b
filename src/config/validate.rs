use std::time::Duration;

use crate::cond::Condition;
use crate::config::duration::{DurationInput, TimeoutSetting};
use crate::config::model::{
    Config, RawConfig, default_cycle_sleep, default_shutdown_grace, default_slow_cond_threshold,
    default_timeout, default_worker_count,
};
use crate::errors::{Result, TasktideError};

impl TryFrom<RawConfig> for Config {
    type Error = TasktideError;

    fn try_from(raw: RawConfig) -> std::result::Result<Self, Self::Error> {
        validate_counts(&raw)?;

        let timeout = match raw.timeout {
            Some(ref input) => input.to_timeout().map_err(|e| in_key("timeout", e))?,
            None => TimeoutSetting::After(default_timeout()),
        };

        Ok(Config {
            task_execution: raw.task_execution.unwrap_or_default(),
            task_priority: raw.task_priority.unwrap_or(0),
            timeout,
            task_pre_exist: raw.task_pre_exist.unwrap_or_default(),
            silence_task_prerun: raw.silence_task_prerun,
            silence_task_logging: raw.silence_task_logging,
            silence_cond_check: raw.silence_cond_check,
            cycle_sleep: duration_or(
                "cycle_sleep",
                raw.cycle_sleep.as_ref(),
                default_cycle_sleep(),
            )?,
            shutdown_grace: duration_or(
                "shutdown_grace",
                raw.shutdown_grace.as_ref(),
                default_shutdown_grace(),
            )?,
            instant_shutdown: raw.instant_shutdown,
            max_instances: raw.max_instances.unwrap_or(1),
            max_process_count: raw.max_process_count.unwrap_or_else(default_worker_count),
            max_thread_count: raw.max_thread_count.unwrap_or_else(default_worker_count),
            slow_cond_threshold: duration_or(
                "slow_cond_threshold",
                raw.slow_cond_threshold.as_ref(),
                default_slow_cond_threshold(),
            )?,
            shut_cond: Condition::False,
        })
    }
}

fn validate_counts(raw: &RawConfig) -> Result<()> {
    let counts = [
        ("max_instances", raw.max_instances),
        ("max_process_count", raw.max_process_count),
        ("max_thread_count", raw.max_thread_count),
    ];

    for (key, value) in counts {
        if value == Some(0) {
            return Err(TasktideError::Config(format!(
                "{key} must be >= 1 (got 0)"
            )));
        }
    }
    Ok(())
}

fn duration_or(key: &str, input: Option<&DurationInput>, default: Duration) -> Result<Duration> {
    match input {
        Some(input) => input.to_duration().map_err(|e| in_key(key, e)),
        None => Ok(default),
    }
}

fn in_key(key: &str, err: TasktideError) -> TasktideError {
    match err {
        TasktideError::Config(msg) => TasktideError::Config(format!("{key}: {msg}")),
        other => other,
    }
}
