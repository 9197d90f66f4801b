// src/task/body.rs

//! Task bodies and the context they run with.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::params::Arguments;
use crate::session::Session;
use crate::types::Execution;

/// Future returned by cooperative bodies. Not `Send`: it runs on the
/// scheduler's single-threaded runtime.
pub type LocalBodyFuture = Pin<Box<dyn Future<Output = anyhow::Result<Value>>>>;

type SyncFn = dyn Fn(TaskContext) -> anyhow::Result<Value> + Send + Sync;
type AsyncFn = dyn Fn(TaskContext) -> LocalBodyFuture + Send + Sync;

/// Everything a body receives for one attempt.
#[derive(Clone)]
pub struct TaskContext {
    pub task: String,
    pub run_id: u64,
    pub attempt: u32,
    pub args: Arguments,
    pub session: Session,
    pub cancel: CancellationToken,
}

impl TaskContext {
    /// Whether the scheduler asked this run to stop.
    ///
    /// Thread bodies should check this at convenient points; nothing else
    /// can stop them.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("task", &self.task)
            .field("run_id", &self.run_id)
            .field("attempt", &self.attempt)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

/// External command run by the process backend.
///
/// The resolved arguments are written to the child's stdin as one JSON
/// object. The last non-empty stdout line becomes the return value: parsed
/// as JSON when possible, otherwise kept as a string.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Run `script` through the platform shell.
    pub fn shell(script: impl Into<String>) -> Self {
        if cfg!(windows) {
            Self::new("cmd").arg("/C").arg(script)
        } else {
            Self::new("sh").arg("-c").arg(script)
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// What a task runs.
#[derive(Clone)]
pub enum TaskBody {
    Sync(Arc<SyncFn>),
    Async(Arc<AsyncFn>),
    Command(CommandSpec),
}

/// Body kinds, used for compatibility checks against execution strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Sync,
    Async,
    Command,
}

impl TaskBody {
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(TaskContext) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        TaskBody::Sync(Arc::new(f))
    }

    pub fn future<F, Fut>(f: F) -> Self
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + 'static,
    {
        TaskBody::Async(Arc::new(move |ctx| Box::pin(f(ctx)) as LocalBodyFuture))
    }

    pub fn command(spec: CommandSpec) -> Self {
        TaskBody::Command(spec)
    }

    pub fn kind(&self) -> BodyKind {
        match self {
            TaskBody::Sync(_) => BodyKind::Sync,
            TaskBody::Async(_) => BodyKind::Async,
            TaskBody::Command(_) => BodyKind::Command,
        }
    }
}

impl fmt::Debug for TaskBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskBody::Sync(_) => f.write_str("TaskBody::Sync"),
            TaskBody::Async(_) => f.write_str("TaskBody::Async"),
            TaskBody::Command(spec) => write!(f, "TaskBody::Command({spec})"),
        }
    }
}

impl BodyKind {
    pub fn supports(&self, execution: Execution) -> bool {
        match self {
            BodyKind::Sync => matches!(
                execution,
                Execution::Main | Execution::Async | Execution::Thread
            ),
            BodyKind::Async => matches!(execution, Execution::Main | Execution::Async),
            BodyKind::Command => execution == Execution::Process,
        }
    }

    /// Strategy used when the session default cannot run this kind.
    pub fn natural_execution(&self) -> Execution {
        match self {
            BodyKind::Sync => Execution::Thread,
            BodyKind::Async => Execution::Async,
            BodyKind::Command => Execution::Process,
        }
    }
}
