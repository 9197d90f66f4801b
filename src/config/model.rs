// src/config/model.rs

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::cond::Condition;
use crate::config::duration::{DurationInput, TimeoutSetting};
use crate::errors::{Result, TasktideError};
use crate::types::{Execution, TaskPreExist};

/// Session configuration as read from a mapping or TOML document.
///
/// ```toml
/// task_execution = "async"
/// task_priority = 10
/// timeout = "30 minutes"
/// task_pre_exist = "rename"
/// cycle_sleep = 0.1
/// ```
///
/// Every key is optional. Unknown keys are rejected.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    #[serde(default)]
    pub task_execution: Option<Execution>,
    #[serde(default)]
    pub task_priority: Option<i64>,
    #[serde(default)]
    pub timeout: Option<DurationInput>,
    #[serde(default)]
    pub task_pre_exist: Option<TaskPreExist>,
    #[serde(default)]
    pub silence_task_prerun: bool,
    #[serde(default)]
    pub silence_task_logging: bool,
    #[serde(default)]
    pub silence_cond_check: bool,
    #[serde(default)]
    pub cycle_sleep: Option<DurationInput>,
    #[serde(default)]
    pub shutdown_grace: Option<DurationInput>,
    #[serde(default)]
    pub instant_shutdown: bool,
    #[serde(default)]
    pub max_instances: Option<usize>,
    #[serde(default)]
    pub max_process_count: Option<usize>,
    #[serde(default)]
    pub max_thread_count: Option<usize>,
    #[serde(default)]
    pub slow_cond_threshold: Option<DurationInput>,
}

/// Validated, immutable session settings.
///
/// Build one with [`Config::builder`], [`Config::from_mapping`],
/// [`Config::from_toml_str`] or `Config::try_from(RawConfig)`.
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) task_execution: Execution,
    pub(crate) task_priority: i64,
    pub(crate) timeout: TimeoutSetting,
    pub(crate) task_pre_exist: TaskPreExist,
    pub(crate) silence_task_prerun: bool,
    pub(crate) silence_task_logging: bool,
    pub(crate) silence_cond_check: bool,
    pub(crate) cycle_sleep: Duration,
    pub(crate) shutdown_grace: Duration,
    pub(crate) instant_shutdown: bool,
    pub(crate) max_instances: usize,
    pub(crate) max_process_count: usize,
    pub(crate) max_thread_count: usize,
    pub(crate) slow_cond_threshold: Duration,
    pub(crate) shut_cond: Condition,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            task_execution: Execution::default(),
            task_priority: 0,
            timeout: TimeoutSetting::After(default_timeout()),
            task_pre_exist: TaskPreExist::default(),
            silence_task_prerun: false,
            silence_task_logging: false,
            silence_cond_check: false,
            cycle_sleep: default_cycle_sleep(),
            shutdown_grace: default_shutdown_grace(),
            instant_shutdown: false,
            max_instances: 1,
            max_process_count: default_worker_count(),
            max_thread_count: default_worker_count(),
            slow_cond_threshold: default_slow_cond_threshold(),
            shut_cond: Condition::False,
        }
    }
}

pub(crate) fn default_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}

pub(crate) fn default_cycle_sleep() -> Duration {
    Duration::from_millis(100)
}

pub(crate) fn default_shutdown_grace() -> Duration {
    Duration::from_secs(5)
}

pub(crate) fn default_slow_cond_threshold() -> Duration {
    Duration::from_millis(100)
}

pub(crate) fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Build from a plain mapping of recognised keys.
    pub fn from_mapping(map: Map<String, Value>) -> Result<Self> {
        let raw: RawConfig = serde_json::from_value(Value::Object(map))
            .map_err(|e| TasktideError::Config(e.to_string()))?;
        Config::try_from(raw)
    }

    /// Build from a TOML document with the same keys as [`RawConfig`].
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(s)?;
        Config::try_from(raw)
    }

    pub fn task_execution(&self) -> Execution {
        self.task_execution
    }

    pub fn task_priority(&self) -> i64 {
        self.task_priority
    }

    pub fn timeout(&self) -> TimeoutSetting {
        self.timeout
    }

    pub fn task_pre_exist(&self) -> TaskPreExist {
        self.task_pre_exist
    }

    pub fn silence_task_prerun(&self) -> bool {
        self.silence_task_prerun
    }

    pub fn silence_task_logging(&self) -> bool {
        self.silence_task_logging
    }

    pub fn silence_cond_check(&self) -> bool {
        self.silence_cond_check
    }

    pub fn cycle_sleep(&self) -> Duration {
        self.cycle_sleep
    }

    pub fn shutdown_grace(&self) -> Duration {
        self.shutdown_grace
    }

    pub fn instant_shutdown(&self) -> bool {
        self.instant_shutdown
    }

    pub fn max_instances(&self) -> usize {
        self.max_instances
    }

    pub fn max_process_count(&self) -> usize {
        self.max_process_count
    }

    pub fn max_thread_count(&self) -> usize {
        self.max_thread_count
    }

    pub fn slow_cond_threshold(&self) -> Duration {
        self.slow_cond_threshold
    }

    /// Condition that stops the scheduler once true. Defaults to `false`.
    pub fn shut_cond(&self) -> &Condition {
        &self.shut_cond
    }
}

/// Typed builder for [`Config`].
///
/// Values go through the same validation as mappings and TOML documents.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    raw: RawConfig,
    shut_cond: Option<Condition>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task_execution(mut self, execution: Execution) -> Self {
        self.raw.task_execution = Some(execution);
        self
    }

    pub fn task_priority(mut self, priority: i64) -> Self {
        self.raw.task_priority = Some(priority);
        self
    }

    pub fn timeout(mut self, timeout: impl Into<DurationInput>) -> Self {
        self.raw.timeout = Some(timeout.into());
        self
    }

    pub fn task_pre_exist(mut self, policy: TaskPreExist) -> Self {
        self.raw.task_pre_exist = Some(policy);
        self
    }

    pub fn silence_task_prerun(mut self, silence: bool) -> Self {
        self.raw.silence_task_prerun = silence;
        self
    }

    pub fn silence_task_logging(mut self, silence: bool) -> Self {
        self.raw.silence_task_logging = silence;
        self
    }

    pub fn silence_cond_check(mut self, silence: bool) -> Self {
        self.raw.silence_cond_check = silence;
        self
    }

    pub fn cycle_sleep(mut self, sleep: impl Into<DurationInput>) -> Self {
        self.raw.cycle_sleep = Some(sleep.into());
        self
    }

    pub fn shutdown_grace(mut self, grace: impl Into<DurationInput>) -> Self {
        self.raw.shutdown_grace = Some(grace.into());
        self
    }

    pub fn instant_shutdown(mut self, instant: bool) -> Self {
        self.raw.instant_shutdown = instant;
        self
    }

    pub fn max_instances(mut self, n: usize) -> Self {
        self.raw.max_instances = Some(n);
        self
    }

    pub fn max_process_count(mut self, n: usize) -> Self {
        self.raw.max_process_count = Some(n);
        self
    }

    pub fn max_thread_count(mut self, n: usize) -> Self {
        self.raw.max_thread_count = Some(n);
        self
    }

    pub fn slow_cond_threshold(mut self, threshold: impl Into<DurationInput>) -> Self {
        self.raw.slow_cond_threshold = Some(threshold.into());
        self
    }

    pub fn shut_cond(mut self, cond: Condition) -> Self {
        self.shut_cond = Some(cond);
        self
    }

    pub fn build(self) -> Result<Config> {
        let mut config = Config::try_from(self.raw)?;
        if let Some(cond) = self.shut_cond {
            config.shut_cond = cond;
        }
        Ok(config)
    }
}

/// The shapes accepted where a session configuration is expected.
#[derive(Debug, Clone)]
pub enum ConfigInput {
    /// An already validated settings object.
    Settings(Config),
    /// A plain mapping of recognised keys.
    Mapping(Map<String, Value>),
    /// No configuration; built-in defaults are used and a deprecation
    /// warning is recorded.
    Absent,
}

impl ConfigInput {
    /// Turn the input into a validated [`Config`].
    ///
    /// The boolean is `true` when the input was [`ConfigInput::Absent`].
    pub fn into_config(self) -> Result<(Config, bool)> {
        match self {
            ConfigInput::Settings(config) => Ok((config, false)),
            ConfigInput::Mapping(map) => Ok((Config::from_mapping(map)?, false)),
            ConfigInput::Absent => Ok((Config::default(), true)),
        }
    }
}

impl Default for ConfigInput {
    fn default() -> Self {
        ConfigInput::Absent
    }
}

impl From<Config> for ConfigInput {
    fn from(config: Config) -> Self {
        ConfigInput::Settings(config)
    }
}

impl From<Option<Config>> for ConfigInput {
    fn from(config: Option<Config>) -> Self {
        match config {
            Some(config) => ConfigInput::Settings(config),
            None => ConfigInput::Absent,
        }
    }
}

impl From<Map<String, Value>> for ConfigInput {
    fn from(map: Map<String, Value>) -> Self {
        ConfigInput::Mapping(map)
    }
}

impl TryFrom<Value> for ConfigInput {
    type Error = TasktideError;

    fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(ConfigInput::Mapping(map)),
            Value::Null => Ok(ConfigInput::Absent),
            other => Err(TasktideError::Type(format!(
                "config must be a settings object, a mapping or absent (got {})",
                json_type_name(&other)
            ))),
        }
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
