// src/session/registry.rs

//! Task registration and the pre-exist policy.

use std::sync::Arc;

use tracing::{debug, info};

use crate::errors::{Result, TasktideError};
use crate::locks::{read, write};
use crate::task::Task;
use crate::types::TaskPreExist;

use super::Session;

/// What [`Session::register`] did with a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Added(String),
    /// Name was taken; the task was added under `assigned`.
    Renamed { requested: String, assigned: String },
    /// Name was taken; the existing task was kept and the new one dropped.
    Ignored(String),
}

impl Registration {
    /// Name the task is reachable under in the session.
    pub fn name(&self) -> &str {
        match self {
            Registration::Added(name) | Registration::Ignored(name) => name,
            Registration::Renamed { assigned, .. } => assigned,
        }
    }
}

impl Session {
    /// Add `task`, filling unset settings from the session config.
    ///
    /// Name collisions follow the configured `task_pre_exist` policy.
    pub fn register(&self, mut task: Task) -> Result<Registration> {
        task.apply_defaults(self.config())?;

        let mut tasks = write(&self.inner.tasks);
        let requested = task.name().to_string();
        let taken = |name: &str| tasks.iter().any(|t| t.name() == name);

        let outcome = if !taken(&requested) {
            Registration::Added(requested)
        } else {
            match self.config().task_pre_exist() {
                TaskPreExist::Raise => return Err(TasktideError::TaskExists(requested)),
                TaskPreExist::Ignore => {
                    debug!(task = %requested, "task already registered; keeping existing");
                    return Ok(Registration::Ignored(requested));
                }
                TaskPreExist::Rename => {
                    let assigned = (1..)
                        .map(|n| format!("{requested}-{n}"))
                        .find(|candidate| !taken(candidate))
                        .unwrap_or_else(|| format!("{requested}-{}", tasks.len() + 1));
                    task.rename(assigned.clone());
                    Registration::Renamed {
                        requested,
                        assigned,
                    }
                }
            }
        };

        info!(
            task = %outcome.name(),
            execution = %task.execution(),
            priority = task.priority(),
            "registered task"
        );
        tasks.push(Arc::new(task));
        drop(tasks);
        self.wake();
        Ok(outcome)
    }

    pub fn task(&self, name: &str) -> Option<Arc<Task>> {
        read(&self.inner.tasks)
            .iter()
            .find(|t| t.name() == name)
            .cloned()
    }

    /// All tasks in registration order.
    pub fn tasks(&self) -> Vec<Arc<Task>> {
        read(&self.inner.tasks).clone()
    }

    pub fn task_names(&self) -> Vec<String> {
        read(&self.inner.tasks)
            .iter()
            .map(|t| t.name().to_string())
            .collect()
    }

    /// Remove a task. Live runs are not stopped; they finish and are
    /// recorded on the removed task.
    pub fn remove_task(&self, name: &str) -> Result<Arc<Task>> {
        let mut tasks = write(&self.inner.tasks);
        let idx = tasks
            .iter()
            .position(|t| t.name() == name)
            .ok_or_else(|| TasktideError::TaskNotFound(name.to_string()))?;
        Ok(tasks.remove(idx))
    }

    /// Run the task on the next cycle regardless of its start condition.
    pub fn run_task(&self, name: &str) -> Result<()> {
        let task = self
            .task(name)
            .ok_or_else(|| TasktideError::TaskNotFound(name.to_string()))?;
        task.force_run();
        self.wake();
        Ok(())
    }

    /// Terminate the task's live runs on the next cycle.
    pub fn terminate_task(&self, name: &str) -> Result<()> {
        let task = self
            .task(name)
            .ok_or_else(|| TasktideError::TaskNotFound(name.to_string()))?;
        task.force_terminate();
        self.wake();
        Ok(())
    }
}
