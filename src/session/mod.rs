// src/session/mod.rs

//! The session: tasks, parameter and return stores, configuration.
//!
//! A [`Session`] is a cheap handle; clones share the same state. Every core
//! API accepts one explicitly. The process-wide default slot in [`default`]
//! is only a convenience for call sites that do not carry one.

pub mod default;
pub mod registry;
pub mod warning;

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Local};
use serde_json::Value;
use tokio::sync::Notify;
use tokio::task::LocalSet;
use tracing::{info, warn};

use crate::config::{Config, ConfigInput};
use crate::engine::Scheduler;
use crate::errors::{Result, TasktideError};
use crate::locks::lock;
use crate::params::{Argument, ParameterStore, Parameters, ReturnStore};
use crate::task::Task;

pub use default::{clear_default, default_session};
pub use registry::Registration;
pub use warning::Warning;

/// Counters of the scheduler loop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoopStats {
    /// Completed cycles.
    pub cycles: u64,
    pub started_at: Option<DateTime<Local>>,
    pub stopped_at: Option<DateTime<Local>>,
}

struct SessionInner {
    config: Config,
    env: Option<String>,
    tasks: RwLock<Vec<Arc<Task>>>,
    parameters: ParameterStore,
    returns: ReturnStore,
    warnings: Mutex<Vec<Warning>>,
    stats: Mutex<LoopStats>,
    notify: Notify,
    next_run_id: AtomicU64,
    serving: AtomicBool,
}

#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("env", &self.inner.env)
            .field("tasks", &self.task_names())
            .field("parameters", &self.inner.parameters.len())
            .field("returns", &self.inner.returns.len())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create a session from any accepted config shape.
    ///
    /// [`ConfigInput::Absent`] falls back to defaults and records a
    /// [`Warning::DeprecatedConstruction`].
    pub fn new(config: impl Into<ConfigInput>) -> Result<Session> {
        Session::builder().config(config).build()
    }

    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Optional environment tag, e.g. a deployment name.
    pub fn env(&self) -> Option<&str> {
        self.inner.env.as_deref()
    }

    pub fn parameters(&self) -> &ParameterStore {
        &self.inner.parameters
    }

    pub fn returns(&self) -> &ReturnStore {
        &self.inner.returns
    }

    pub fn warnings(&self) -> Vec<Warning> {
        lock(&self.inner.warnings).clone()
    }

    pub fn stats(&self) -> LoopStats {
        lock(&self.inner.stats).clone()
    }

    /// Whether a scheduler is currently serving this session.
    pub fn is_serving(&self) -> bool {
        self.inner.serving.load(Ordering::SeqCst)
    }

    /// Wake the scheduler before its cycle sleep elapses.
    pub fn wake(&self) {
        self.inner.notify.notify_one();
    }

    pub fn ptr_eq(a: &Session, b: &Session) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Run the scheduler until the shutdown condition holds.
    ///
    /// Blocks the calling thread on a fresh single-threaded runtime. Use
    /// [`Session::run`] from inside an existing runtime.
    pub fn start(&self) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.run())
    }

    /// Run the scheduler on the current runtime until the shutdown
    /// condition holds.
    ///
    /// The loop is spawned as a local task of a [`LocalSet`] so cooperative
    /// task bodies share its thread.
    pub async fn run(&self) -> Result<()> {
        crate::logging::apply_session_floor(self);

        let scheduler = Scheduler::new(self.clone());
        let local = LocalSet::new();
        local
            .run_until(async move {
                tokio::task::spawn_local(scheduler.serve())
                    .await
                    .map_err(|e| TasktideError::Backend(format!("scheduler loop aborted: {e}")))?
            })
            .await
    }

    pub(crate) fn record_warning(&self, warning: Warning) {
        lock(&self.inner.warnings).push(warning);
    }

    pub(crate) fn next_run_id(&self) -> u64 {
        self.inner.next_run_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) async fn notified(&self) {
        self.inner.notify.notified().await;
    }

    /// Claim the session for one scheduler; fails if one is serving.
    pub(crate) fn begin_serving(&self) -> Result<()> {
        self.inner
            .serving
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(|_| TasktideError::AlreadyRunning)?;
        *lock(&self.inner.stats) = LoopStats {
            cycles: 0,
            started_at: Some(Local::now()),
            stopped_at: None,
        };
        Ok(())
    }

    pub(crate) fn bump_cycle(&self) -> u64 {
        let mut stats = lock(&self.inner.stats);
        stats.cycles += 1;
        stats.cycles
    }

    pub(crate) fn end_serving(&self) {
        lock(&self.inner.stats).stopped_at = Some(Local::now());
        self.inner.serving.store(false, Ordering::SeqCst);
    }
}

/// Builder for [`Session`].
#[derive(Debug, Default)]
pub struct SessionBuilder {
    config: ConfigInput,
    parameters: Parameters,
    env: Option<String>,
}

impl SessionBuilder {
    pub fn config(mut self, config: impl Into<ConfigInput>) -> Self {
        self.config = config.into();
        self
    }

    /// Config given as a loosely typed value. Objects are mappings, `null`
    /// is absent; anything else is a [`TasktideError::Type`].
    pub fn config_value(mut self, value: Value) -> Result<Self> {
        self.config = ConfigInput::try_from(value)?;
        Ok(self)
    }

    pub fn parameters(mut self, params: impl Into<Parameters>) -> Self {
        self.parameters = self.parameters.merged_with(&params.into());
        self
    }

    /// Parameters given as a JSON object.
    pub fn parameters_value(mut self, value: Value) -> Result<Self> {
        self.parameters = self.parameters.merged_with(&Parameters::from_json(value)?);
        Ok(self)
    }

    pub fn parameter(mut self, name: impl Into<String>, arg: impl Into<Argument>) -> Self {
        self.parameters.insert(name, arg);
        self
    }

    pub fn env(mut self, env: impl Into<String>) -> Self {
        self.env = Some(env.into());
        self
    }

    pub fn build(self) -> Result<Session> {
        let (config, absent) = self.config.into_config()?;

        let session = Session {
            inner: Arc::new(SessionInner {
                config,
                env: self.env,
                tasks: RwLock::new(Vec::new()),
                parameters: ParameterStore::new(self.parameters),
                returns: ReturnStore::new(),
                warnings: Mutex::new(Vec::new()),
                stats: Mutex::new(LoopStats::default()),
                notify: Notify::new(),
                next_run_id: AtomicU64::new(0),
                serving: AtomicBool::new(false),
            }),
        };

        if absent {
            let msg = "creating a session without a config is deprecated; \
                       pass Config::default() explicitly";
            warn!("{msg}");
            session.record_warning(Warning::DeprecatedConstruction(msg.to_string()));
        }

        info!(
            env = session.env().unwrap_or("-"),
            execution = %session.config().task_execution(),
            "session created"
        );
        Ok(session)
    }
}
