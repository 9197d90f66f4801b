// src/task/mod.rs

//! Schedulable units.
//!
//! - [`body`] defines what a task runs and the context it receives.
//! - [`history`] holds run records and the per-task runtime state.
//! - [`options`] is the mapping-style option bag accepted at construction.

pub mod body;
pub mod history;
pub mod options;

use std::sync::Mutex;

use chrono::{DateTime, Local};
use serde_json::{Map, Value};
use tracing::debug;

use crate::cond::Condition;
use crate::config::model::default_timeout;
use crate::config::{Config, DurationInput, TimeoutSetting};
use crate::errors::{Result, TasktideError};
use crate::locks::lock;
use crate::params::{Argument, Parameters};
use crate::types::{Execution, TaskStatus};

pub use body::{BodyKind, CommandSpec, LocalBodyFuture, TaskBody, TaskContext};
pub use history::RunRecord;
pub use options::TaskOptions;

use history::TaskState;

/// A named schedulable unit.
///
/// Static settings are fixed once the task is registered; runtime state
/// (status, live instances, history) sits behind a per-task lock so that
/// completions from any backend update it one task at a time.
#[derive(Debug)]
pub struct Task {
    name: String,
    body: TaskBody,
    start_cond: Condition,
    end_cond: Option<Condition>,
    execution: Option<Execution>,
    priority: Option<i64>,
    timeout: Option<TimeoutSetting>,
    retries: u32,
    parameters: Parameters,
    max_instances: Option<usize>,
    on_startup: bool,
    on_shutdown: bool,
    state: Mutex<TaskState>,
}

impl Task {
    pub fn builder(name: impl Into<String>, body: TaskBody) -> TaskBuilder {
        TaskBuilder::new(name, body)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn body(&self) -> &TaskBody {
        &self.body
    }

    pub fn start_cond(&self) -> &Condition {
        &self.start_cond
    }

    pub fn end_cond(&self) -> Option<&Condition> {
        self.end_cond.as_ref()
    }

    pub fn execution(&self) -> Execution {
        self.execution.unwrap_or_default()
    }

    pub fn priority(&self) -> i64 {
        self.priority.unwrap_or(0)
    }

    pub fn timeout(&self) -> TimeoutSetting {
        self.timeout
            .unwrap_or(TimeoutSetting::After(default_timeout()))
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn max_instances(&self) -> usize {
        self.max_instances.unwrap_or(1)
    }

    pub fn is_startup(&self) -> bool {
        self.on_startup
    }

    pub fn is_shutdown(&self) -> bool {
        self.on_shutdown
    }

    /// Current status; terminal statuses are the at-rest state after a run.
    pub fn status(&self) -> TaskStatus {
        lock(&self.state).status
    }

    pub fn active_runs(&self) -> usize {
        lock(&self.state).active
    }

    pub fn is_running(&self) -> bool {
        self.active_runs() > 0
    }

    /// Stopped runs whose body is still executing. They keep their
    /// instance slot until the body returns.
    pub fn draining_runs(&self) -> usize {
        lock(&self.state).draining
    }

    pub fn last_started(&self) -> Option<DateTime<Local>> {
        lock(&self.state).last_started
    }

    /// Copy of the run history, oldest first.
    pub fn history(&self) -> Vec<RunRecord> {
        lock(&self.state).history.clone()
    }

    pub fn last_record(&self) -> Option<RunRecord> {
        lock(&self.state).history.last().cloned()
    }

    pub fn is_disabled(&self) -> bool {
        lock(&self.state).disabled
    }

    pub fn set_disabled(&self, disabled: bool) {
        lock(&self.state).disabled = disabled;
    }

    /// Run once on the next cycle regardless of the start condition.
    pub fn force_run(&self) {
        lock(&self.state).force_run = true;
    }

    /// Terminate live instances on the next cycle.
    pub fn force_terminate(&self) {
        lock(&self.state).force_terminate = true;
    }

    pub(crate) fn with_state<T>(&self, f: impl FnOnce(&TaskState) -> T) -> T {
        f(&lock(&self.state))
    }

    pub(crate) fn force_run_requested(&self) -> bool {
        lock(&self.state).force_run
    }

    pub(crate) fn take_force_terminate(&self) -> bool {
        let mut state = lock(&self.state);
        std::mem::take(&mut state.force_terminate)
    }

    pub(crate) fn has_free_slot(&self) -> bool {
        let state = lock(&self.state);
        state.active + state.draining < self.max_instances()
    }

    pub(crate) fn begin_drain(&self) {
        lock(&self.state).draining += 1;
    }

    pub(crate) fn end_drain(&self) {
        let mut state = lock(&self.state);
        state.draining = state.draining.saturating_sub(1);
    }

    /// `inactive -> running`. Consumes a pending forced run.
    pub(crate) fn begin_run(&self, started: DateTime<Local>) {
        let mut state = lock(&self.state);
        state.active += 1;
        state.status = TaskStatus::Running;
        state.last_started = Some(started);
        state.force_run = false;
    }

    /// `running -> terminal`; appends the record.
    pub(crate) fn finish_run(&self, record: RunRecord) {
        let mut state = lock(&self.state);
        state.active = state.active.saturating_sub(1);
        state.status = if state.active > 0 {
            TaskStatus::Running
        } else {
            record.status
        };
        debug!(
            task = %self.name,
            run_id = record.run_id,
            status = %record.status,
            "appending run record"
        );
        state.history.push(record);
    }

    /// Record a run that ended before it ever started (e.g. resolution failure).
    pub(crate) fn record_prerun_failure(&self, record: RunRecord) {
        let mut state = lock(&self.state);
        state.last_started = Some(record.started);
        state.force_run = false;
        if state.active == 0 {
            state.status = record.status;
        }
        state.history.push(record);
    }

    /// Fill unset settings from the session config.
    pub(crate) fn apply_defaults(&mut self, config: &Config) -> Result<()> {
        let kind = self.body.kind();
        let execution = match self.execution {
            Some(explicit) => explicit,
            None if kind.supports(config.task_execution()) => config.task_execution(),
            None => kind.natural_execution(),
        };
        if !kind.supports(execution) {
            return Err(TasktideError::Registration(format!(
                "task '{}': execution '{execution}' cannot run a {kind:?} body",
                self.name
            )));
        }
        self.execution = Some(execution);
        self.priority.get_or_insert(config.task_priority());
        self.timeout.get_or_insert(config.timeout());
        self.max_instances.get_or_insert(config.max_instances());
        Ok(())
    }

    pub(crate) fn rename(&mut self, name: String) {
        self.name = name;
    }
}

/// Builder for [`Task`].
///
/// Explicit setters win over the same key given through [`TaskBuilder::options`].
#[derive(Debug)]
pub struct TaskBuilder {
    name: String,
    body: TaskBody,
    start_cond: Option<Condition>,
    end_cond: Option<Condition>,
    execution: Option<Execution>,
    priority: Option<i64>,
    timeout: Option<DurationInput>,
    retries: Option<u32>,
    parameters: Parameters,
    max_instances: Option<usize>,
    disabled: bool,
    on_startup: bool,
    on_shutdown: bool,
    options: Option<Map<String, Value>>,
}

impl TaskBuilder {
    pub fn new(name: impl Into<String>, body: TaskBody) -> Self {
        Self {
            name: name.into(),
            body,
            start_cond: None,
            end_cond: None,
            execution: None,
            priority: None,
            timeout: None,
            retries: None,
            parameters: Parameters::new(),
            max_instances: None,
            disabled: false,
            on_startup: false,
            on_shutdown: false,
            options: None,
        }
    }

    pub fn start_cond(mut self, cond: Condition) -> Self {
        self.start_cond = Some(cond);
        self
    }

    pub fn end_cond(mut self, cond: Condition) -> Self {
        self.end_cond = Some(cond);
        self
    }

    pub fn execution(mut self, execution: Execution) -> Self {
        self.execution = Some(execution);
        self
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn timeout(mut self, timeout: impl Into<DurationInput>) -> Self {
        self.timeout = Some(timeout.into());
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn parameter(mut self, name: impl Into<String>, arg: impl Into<Argument>) -> Self {
        self.parameters.insert(name, arg);
        self
    }

    pub fn parameters(mut self, params: Parameters) -> Self {
        self.parameters = self.parameters.merged_with(&params);
        self
    }

    pub fn max_instances(mut self, n: usize) -> Self {
        self.max_instances = Some(n);
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Run once when the scheduler starts, before the first cycle.
    pub fn on_startup(mut self) -> Self {
        self.on_startup = true;
        self
    }

    /// Run once while the scheduler shuts down.
    pub fn on_shutdown(mut self) -> Self {
        self.on_shutdown = true;
        self
    }

    /// Apply a mapping of construction options.
    pub fn options(mut self, options: Map<String, Value>) -> Self {
        self.options = Some(options);
        self
    }

    pub fn build(self) -> Result<Task> {
        if self.name.trim().is_empty() {
            return Err(TasktideError::Config("task name must not be empty".to_string()));
        }
        if self.on_startup && self.on_shutdown {
            return Err(TasktideError::Config(format!(
                "task '{}' cannot be both a startup and a shutdown task",
                self.name
            )));
        }

        let opts = match self.options {
            Some(map) => TaskOptions::from_mapping(map)?,
            None => TaskOptions::default(),
        };

        let mut parameters = opts
            .parameters
            .map(Parameters::from_values)
            .unwrap_or_default();
        parameters = parameters.merged_with(&self.parameters);

        let timeout = match self.timeout.or(opts.timeout) {
            Some(input) => Some(input.to_timeout()?),
            None => None,
        };

        if self.max_instances == Some(0) {
            return Err(TasktideError::Config(format!(
                "task '{}': max_instances must be >= 1 (got 0)",
                self.name
            )));
        }

        let execution = self.execution.or(opts.execution);
        if let Some(execution) = execution {
            let kind = self.body.kind();
            if !kind.supports(execution) {
                return Err(TasktideError::Registration(format!(
                    "task '{}': execution '{execution}' cannot run a {kind:?} body",
                    self.name
                )));
            }
        }

        let state = TaskState {
            disabled: self.disabled,
            ..TaskState::default()
        };

        Ok(Task {
            name: self.name,
            body: self.body,
            start_cond: self.start_cond.unwrap_or(Condition::False),
            end_cond: self.end_cond,
            execution,
            priority: self.priority.or(opts.priority),
            timeout,
            retries: self.retries.or(opts.retries).unwrap_or(0),
            parameters,
            max_instances: self.max_instances,
            on_startup: self.on_startup,
            on_shutdown: self.on_shutdown,
            state: Mutex::new(state),
        })
    }
}
