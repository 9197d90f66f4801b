// src/task/history.rs

//! Per-task runtime state and the append-only run history.

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::types::TaskStatus;

/// One finished run.
///
/// Retries of a run are folded into the same record; `attempts` counts how
/// many times the body was invoked.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRecord {
    pub run_id: u64,
    pub started: DateTime<Local>,
    pub ended: DateTime<Local>,
    pub status: TaskStatus,
    pub attempts: u32,
    pub error: Option<String>,
    pub timed_out: bool,
}

/// Mutable state behind a task's lock (internal).
#[derive(Debug, Default)]
pub(crate) struct TaskState {
    pub status: TaskStatus,
    /// Number of live instances.
    pub active: usize,
    /// Stopped instances whose body has not returned yet.
    pub draining: usize,
    pub last_started: Option<DateTime<Local>>,
    pub history: Vec<RunRecord>,
    pub disabled: bool,
    pub force_run: bool,
    pub force_terminate: bool,
}

impl TaskState {
    pub fn last_with<F>(&self, pred: F) -> Option<&RunRecord>
    where
        F: Fn(&RunRecord) -> bool,
    {
        self.history.iter().rev().find(|r| pred(r))
    }
}
