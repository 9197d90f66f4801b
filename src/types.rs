use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Concurrency strategy used to run a task body.
///
/// The lowercase names match the `task_execution` / `execution` option values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Execution {
    /// Runs on the scheduler's own control flow and blocks the loop.
    Main,
    /// Runs as a cooperative task on the scheduler's single-threaded runtime.
    #[default]
    Async,
    /// Runs on a worker thread from the blocking pool.
    Thread,
    /// Runs in a child process.
    Process,
}

impl Execution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Execution::Main => "main",
            Execution::Async => "async",
            Execution::Thread => "thread",
            Execution::Process => "process",
        }
    }
}

impl fmt::Display for Execution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Execution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "main" => Ok(Execution::Main),
            "async" => Ok(Execution::Async),
            "thread" => Ok(Execution::Thread),
            "process" => Ok(Execution::Process),
            other => Err(format!(
                "invalid execution: {other} \
                 (expected \"main\", \"async\", \"thread\" or \"process\")"
            )),
        }
    }
}

/// What happens when a task is registered under a name that is already taken.
///
/// - `Raise`: registration fails.
/// - `Ignore`: the existing task is kept and the new one is dropped.
/// - `Rename`: the new task gets a unique derived name and is added.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPreExist {
    #[default]
    Raise,
    Ignore,
    Rename,
}

impl FromStr for TaskPreExist {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "raise" => Ok(TaskPreExist::Raise),
            "ignore" => Ok(TaskPreExist::Ignore),
            "rename" => Ok(TaskPreExist::Rename),
            other => Err(format!(
                "invalid task_pre_exist: {other} (expected \"raise\", \"ignore\" or \"rename\")"
            )),
        }
    }
}

/// Lifecycle status of a task.
///
/// Terminal statuses (`Success`, `Fail`, `Terminated`, `Crashed`) are the
/// resting state after a run and count as inactive for eligibility.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Inactive,
    Running,
    Success,
    Fail,
    Terminated,
    Crashed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Success | TaskStatus::Fail | TaskStatus::Terminated | TaskStatus::Crashed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Inactive => "inactive",
            TaskStatus::Running => "running",
            TaskStatus::Success => "success",
            TaskStatus::Fail => "fail",
            TaskStatus::Terminated => "terminated",
            TaskStatus::Crashed => "crashed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
