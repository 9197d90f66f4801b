// src/exec/backend.rs

//! Pluggable execution backend abstraction.
//!
//! The scheduler talks to an [`ExecutionBackend`] per execution strategy
//! instead of running bodies itself. Backends follow a poll model:
//!
//! - `submit` starts a job and hands back a [`RunHandle`],
//! - `poll` reports the outcome once the job is done (exactly once),
//! - `cancel` stops the job with backend-specific force and forgets it,
//! - `is_draining` reports a cancelled job whose body has not exited yet.
//!
//! Tests can replace any backend through [`Backends::replace`].

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::errors::Result;
use crate::params::Arguments;
use crate::session::Session;
use crate::task::{Task, TaskContext};
use crate::types::Execution;

use super::cooperative::CooperativeBackend;
use super::direct::DirectBackend;
use super::process::ProcessBackend;
use super::threaded::ThreadedBackend;

/// Opaque identifier of a submitted job, unique within one backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunHandle(pub u64);

impl fmt::Display for RunHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a job ended, as seen by the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The body returned a value.
    Success(Value),
    /// The body returned an error.
    Failed(String),
    /// The backend itself failed (panic, killed worker, lost channel).
    Crashed(String),
}

impl RunOutcome {
    pub(crate) fn from_body(result: anyhow::Result<Value>) -> Self {
        match result {
            Ok(value) => RunOutcome::Success(value),
            Err(err) => RunOutcome::Failed(format!("{err:#}")),
        }
    }
}

/// One attempt of one run, handed to a backend.
#[derive(Debug, Clone)]
pub struct Job {
    pub task: Arc<Task>,
    pub run_id: u64,
    pub attempt: u32,
    pub args: Arguments,
    pub session: Session,
}

impl Job {
    pub(crate) fn context(&self, cancel: CancellationToken) -> TaskContext {
        TaskContext {
            task: self.task.name().to_string(),
            run_id: self.run_id,
            attempt: self.attempt,
            args: self.args.clone(),
            session: self.session.clone(),
            cancel,
        }
    }
}

pub type SubmitFuture<'a> = Pin<Box<dyn Future<Output = Result<RunHandle>> + 'a>>;

/// Trait abstracting how a task body is run.
///
/// Backends live on the scheduler's thread and are driven from its loop,
/// so neither the trait nor the returned futures need to be `Send`.
pub trait ExecutionBackend {
    fn kind(&self) -> Execution;

    /// Start `job`. An error here means the backend could not start it at
    /// all; the scheduler records the run as crashed.
    fn submit(&mut self, job: Job) -> SubmitFuture<'_>;

    /// Outcome of a finished job; `None` while it is still running.
    fn poll(&mut self, handle: RunHandle) -> Option<RunOutcome>;

    /// Stop the job. A later `poll` returns `None`.
    ///
    /// Backends that cannot stop a body by force keep its slot draining
    /// until the body returns; see [`ExecutionBackend::is_draining`].
    fn cancel(&mut self, handle: RunHandle);

    /// Whether a cancelled job's body is still alive. Once this returns
    /// `false` for a handle it stays `false`.
    fn is_draining(&mut self, _handle: RunHandle) -> bool {
        false
    }

    /// Number of jobs currently tracked, draining ones included.
    fn active(&self) -> usize;

    /// Whether another job can be submitted right now.
    fn has_capacity(&self) -> bool {
        true
    }
}

/// One backend per execution strategy.
pub struct Backends {
    inner: HashMap<Execution, Box<dyn ExecutionBackend>>,
}

impl Backends {
    /// The production backends, sized from `config`.
    pub fn new(config: &Config) -> Self {
        let mut backends = Self {
            inner: HashMap::new(),
        };
        backends.replace(DirectBackend::new());
        backends.replace(CooperativeBackend::new());
        backends.replace(ThreadedBackend::new(config.max_thread_count()));
        backends.replace(ProcessBackend::new(config.max_process_count()));
        backends
    }

    /// Install `backend` for its own [`ExecutionBackend::kind`].
    pub fn replace(&mut self, backend: impl ExecutionBackend + 'static) -> &mut Self {
        self.inner.insert(backend.kind(), Box::new(backend));
        self
    }

    pub fn get_mut(&mut self, kind: Execution) -> Option<&mut (dyn ExecutionBackend + 'static)> {
        self.inner.get_mut(&kind).map(|b| b.as_mut())
    }

    pub fn is_draining(&mut self, kind: Execution, handle: RunHandle) -> bool {
        self.inner
            .get_mut(&kind)
            .is_some_and(|b| b.is_draining(handle))
    }

    pub fn has_capacity(&self, kind: Execution) -> bool {
        self.inner.get(&kind).is_some_and(|b| b.has_capacity())
    }

    /// Jobs tracked across all backends.
    pub fn active(&self) -> usize {
        self.inner.values().map(|b| b.active()).sum()
    }
}

impl fmt::Debug for Backends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.inner.keys().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        f.debug_struct("Backends")
            .field("kinds", &kinds)
            .field("active", &self.active())
            .finish()
    }
}
