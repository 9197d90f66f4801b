// src/engine/runtime.rs

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use tracing::{debug, error, info, trace, warn};

use crate::cond::{CondContext, check};
use crate::config::duration::format_duration;
use crate::errors::{Result, TasktideError};
use crate::exec::{Backends, Job, RunHandle, RunOutcome};
use crate::params::{Arguments, resolve_for_task};
use crate::session::Session;
use crate::task::{RunRecord, Task};
use crate::types::{Execution, TaskStatus};

use super::TASK_TARGET;
use super::plan::{plan_dispatch, timed_out};

/// One live run: the current attempt of a task invocation.
struct ActiveRun {
    task: Arc<Task>,
    execution: Execution,
    handle: RunHandle,
    run_id: u64,
    attempt: u32,
    started: DateTime<Local>,
    attempt_started: Instant,
    args: Arguments,
}

impl ActiveRun {
    fn record(&self, status: TaskStatus, error: Option<String>, timed_out: bool) -> RunRecord {
        RunRecord {
            run_id: self.run_id,
            started: self.started,
            ended: Local::now(),
            status,
            attempts: self.attempt,
            error,
            timed_out,
        }
    }
}

/// A stopped run whose body has not returned yet. It keeps its task's
/// instance slot and its backend slot until it does.
struct DrainingRun {
    task: Arc<Task>,
    execution: Execution,
    handle: RunHandle,
}

/// A failed attempt waiting for backend capacity before it is retried.
struct PendingRetry {
    run: ActiveRun,
    error: String,
}

/// Why the scheduler stopped a run itself.
#[derive(Debug, Clone, Copy)]
enum StopReason {
    Timeout(Duration),
    EndCondition,
    Forced,
    Shutdown,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Timeout(limit) => write!(f, "timed out after {}", format_duration(*limit)),
            StopReason::EndCondition => f.write_str("end condition met"),
            StopReason::Forced => f.write_str("terminated on request"),
            StopReason::Shutdown => f.write_str("cancelled at shutdown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Startup,
    Shutdown,
}

/// Drives a session's tasks through their backends.
///
/// Each cycle:
/// 1. collect finished runs (returns, retries, history) and release
///    stopped runs whose body has returned,
/// 2. stop runs past their timeout, end condition or forced termination,
/// 3. stop if the shutdown condition holds,
/// 4. resubmit retries that waited for capacity, then dispatch eligible
///    tasks, highest priority first,
/// 5. sleep `cycle_sleep` or until woken by [`Session::wake`].
///
/// The loop must run inside a [`tokio::task::LocalSet`]: cooperative
/// bodies are spawned next to it as local tasks.
pub struct Scheduler {
    session: Session,
    backends: Backends,
    runs: Vec<ActiveRun>,
    draining: Vec<DrainingRun>,
    retries: Vec<PendingRetry>,
    shutting_down: bool,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("session", &self.session)
            .field("backends", &self.backends)
            .field("runs", &self.runs.len())
            .field("draining", &self.draining.len())
            .field("retries", &self.retries.len())
            .field("shutting_down", &self.shutting_down)
            .finish()
    }
}

impl Scheduler {
    pub fn new(session: Session) -> Self {
        let backends = Backends::new(session.config());
        Self::with_backends(session, backends)
    }

    /// Scheduler for the default session.
    pub fn from_default() -> Result<Self> {
        Ok(Self::new(Session::current()?))
    }

    pub fn with_backends(session: Session, backends: Backends) -> Self {
        Self {
            session,
            backends,
            runs: Vec::new(),
            draining: Vec::new(),
            retries: Vec::new(),
            shutting_down: false,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn backends_mut(&mut self) -> &mut Backends {
        &mut self.backends
    }

    /// Main loop. Returns once the shutdown condition held and shutdown
    /// finished.
    pub async fn serve(mut self) -> Result<()> {
        self.session.begin_serving()?;
        info!(
            tasks = self.session.task_names().len(),
            shut_cond = %self.session.config().shut_cond(),
            "scheduler started"
        );

        self.run_phase(Phase::Startup).await;

        loop {
            self.collect_finished().await;
            self.enforce_limits();

            let ctx = CondContext::new(&self.session);
            if check(self.session.config().shut_cond(), &ctx) {
                info!("shutdown condition met");
                break;
            }

            self.dispatch_cycle().await;

            let cycle = self.session.bump_cycle();
            trace!(cycle, running = self.runs.len(), "cycle complete");

            self.idle(self.session.config().cycle_sleep()).await;
        }

        self.shutdown().await;
        self.session.end_serving();
        info!("scheduler stopped");
        Ok(())
    }

    async fn idle(&self, period: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(period) => {}
            _ = self.session.notified() => {}
        }
    }

    async fn dispatch_cycle(&mut self) {
        self.resubmit_retries().await;

        let session = self.session.clone();

        for task in plan_dispatch(&session.tasks()) {
            if !task.has_free_slot() {
                continue;
            }

            let ctx = CondContext::for_task(&session, task.name());
            if let Some(end) = task.end_cond()
                && check(end, &ctx)
            {
                trace!(task = %task.name(), "end condition true; not dispatching");
                continue;
            }
            let forced = task.force_run_requested();
            if !forced && !check(task.start_cond(), &ctx) {
                continue;
            }

            if !self.backends.has_capacity(task.execution()) {
                debug!(
                    task = %task.name(),
                    execution = %task.execution(),
                    "backend at capacity; deferring to a later cycle"
                );
                continue;
            }

            self.launch(&task).await;
        }
    }

    /// Resolve arguments and submit the first attempt of a new run.
    async fn launch(&mut self, task: &Arc<Task>) {
        let run_id = self.session.next_run_id();
        let started = Local::now();

        let args = match resolve_for_task(task, &self.session) {
            Ok(args) => args,
            Err(err) => {
                if !self.session.config().silence_task_prerun() {
                    warn!(
                        target: TASK_TARGET,
                        task = %task.name(),
                        run_id,
                        error = %err,
                        "argument resolution failed; body not run"
                    );
                }
                task.record_prerun_failure(RunRecord {
                    run_id,
                    started,
                    ended: Local::now(),
                    status: TaskStatus::Fail,
                    attempts: 0,
                    error: Some(err.to_string()),
                    timed_out: false,
                });
                return;
            }
        };

        task.begin_run(started);
        info!(
            target: TASK_TARGET,
            task = %task.name(),
            run_id,
            execution = %task.execution(),
            "task started"
        );

        self.submit(Arc::clone(task), run_id, 1, args, started).await;
    }

    async fn submit(
        &mut self,
        task: Arc<Task>,
        run_id: u64,
        attempt: u32,
        args: Arguments,
        started: DateTime<Local>,
    ) {
        let execution = task.execution();
        let job = Job {
            task: Arc::clone(&task),
            run_id,
            attempt,
            args: args.clone(),
            session: self.session.clone(),
        };

        let submitted = match self.backends.get_mut(execution) {
            Some(backend) => backend.submit(job).await,
            None => Err(TasktideError::Backend(format!(
                "no backend installed for execution '{execution}'"
            ))),
        };

        match submitted {
            Ok(handle) => self.runs.push(ActiveRun {
                task,
                execution,
                handle,
                run_id,
                attempt,
                started,
                attempt_started: Instant::now(),
                args,
            }),
            Err(err) => {
                let record = RunRecord {
                    run_id,
                    started,
                    ended: Local::now(),
                    status: TaskStatus::Crashed,
                    attempts: attempt,
                    error: Some(err.to_string()),
                    timed_out: false,
                };
                self.finish(&task, record);
            }
        }
    }

    async fn collect_finished(&mut self) {
        let mut finished = Vec::new();
        let mut i = 0;
        while i < self.runs.len() {
            let (execution, handle) = (self.runs[i].execution, self.runs[i].handle);
            let outcome = match self.backends.get_mut(execution) {
                Some(backend) => backend.poll(handle),
                None => Some(RunOutcome::Crashed(format!(
                    "backend for '{execution}' went away"
                ))),
            };
            match outcome {
                Some(outcome) => finished.push((self.runs.remove(i), outcome)),
                None => i += 1,
            }
        }

        for (run, outcome) in finished {
            self.complete(run, outcome).await;
        }

        self.reap_draining();
    }

    /// Release stopped runs whose body has returned.
    fn reap_draining(&mut self) {
        let backends = &mut self.backends;
        self.draining.retain(|run| {
            if backends.is_draining(run.execution, run.handle) {
                return true;
            }
            run.task.end_drain();
            false
        });
    }

    /// Retries go ahead of new dispatch, oldest first, as capacity allows.
    async fn resubmit_retries(&mut self) {
        let mut waiting = Vec::new();
        for pending in std::mem::take(&mut self.retries) {
            if self.backends.has_capacity(pending.run.execution) {
                self.retry(pending.run).await;
            } else {
                waiting.push(pending);
            }
        }
        self.retries = waiting;
    }

    async fn retry(&mut self, run: ActiveRun) {
        let ActiveRun {
            task,
            run_id,
            attempt,
            started,
            args,
            ..
        } = run;
        self.submit(task, run_id, attempt + 1, args, started).await;
    }

    async fn complete(&mut self, run: ActiveRun, outcome: RunOutcome) {
        match outcome {
            RunOutcome::Success(value) => {
                self.session.returns().set(run.task.name(), value);
                let record = run.record(TaskStatus::Success, None, false);
                self.finish(&run.task, record);
            }
            RunOutcome::Failed(err) if run.attempt <= run.task.retries() && !self.shutting_down => {
                info!(
                    target: TASK_TARGET,
                    task = %run.task.name(),
                    run_id = run.run_id,
                    attempt = run.attempt,
                    retries = run.task.retries(),
                    error = %err,
                    "task failed; retrying"
                );
                if self.backends.has_capacity(run.execution) {
                    self.retry(run).await;
                } else {
                    debug!(
                        task = %run.task.name(),
                        run_id = run.run_id,
                        execution = %run.execution,
                        "backend at capacity; retry waits for a free slot"
                    );
                    self.retries.push(PendingRetry { run, error: err });
                }
            }
            RunOutcome::Failed(err) => {
                let record = run.record(TaskStatus::Fail, Some(err), false);
                self.finish(&run.task, record);
            }
            RunOutcome::Crashed(err) => {
                let record = run.record(TaskStatus::Crashed, Some(err), false);
                self.finish(&run.task, record);
            }
        }
    }

    fn finish(&self, task: &Task, record: RunRecord) {
        let elapsed_ms = (record.ended - record.started).num_milliseconds();
        let error = record.error.as_deref().unwrap_or("");
        match record.status {
            TaskStatus::Success => info!(
                target: TASK_TARGET,
                task = %task.name(),
                run_id = record.run_id,
                attempts = record.attempts,
                elapsed_ms,
                "task succeeded"
            ),
            TaskStatus::Terminated => warn!(
                target: TASK_TARGET,
                task = %task.name(),
                run_id = record.run_id,
                timed_out = record.timed_out,
                elapsed_ms,
                reason = error,
                "task terminated"
            ),
            status => error!(
                target: TASK_TARGET,
                task = %task.name(),
                run_id = record.run_id,
                attempts = record.attempts,
                elapsed_ms,
                error,
                "task {status}"
            ),
        }
        task.finish_run(record);
    }

    /// Stop runs past their timeout, end condition or forced termination.
    fn enforce_limits(&mut self) {
        let session = self.session.clone();
        let mut stops: Vec<(String, StopReason)> = Vec::new();

        for task in session.tasks() {
            if task.take_force_terminate() {
                stops.push((task.name().to_string(), StopReason::Forced));
                continue;
            }
            if !task.is_running() {
                continue;
            }
            if let Some(end) = task.end_cond()
                && check(end, &CondContext::for_task(&session, task.name()))
            {
                stops.push((task.name().to_string(), StopReason::EndCondition));
            }
        }

        let now = Instant::now();
        let mut i = 0;
        while i < self.runs.len() {
            let run = &self.runs[i];
            let reason = stops
                .iter()
                .find(|(name, _)| name == run.task.name())
                .map(|(_, reason)| *reason)
                .or_else(|| {
                    let timeout = run.task.timeout();
                    timed_out(timeout, run.execution, now - run.attempt_started)
                        .then(|| StopReason::Timeout(timeout.as_duration().unwrap_or_default()))
                });
            match reason {
                Some(reason) => {
                    let run = self.runs.remove(i);
                    self.stop(run, reason);
                }
                None => i += 1,
            }
        }

        // A waiting retry has no body running; stopping it only records.
        for pending in std::mem::take(&mut self.retries) {
            let reason = stops
                .iter()
                .find(|(name, _)| name == pending.run.task.name())
                .map(|(_, reason)| *reason);
            match reason {
                Some(reason) => {
                    let record = pending.run.record(
                        TaskStatus::Terminated,
                        Some(reason.to_string()),
                        false,
                    );
                    self.finish(&pending.run.task, record);
                }
                None => self.retries.push(pending),
            }
        }
    }

    fn stop(&mut self, run: ActiveRun, reason: StopReason) {
        if let Some(backend) = self.backends.get_mut(run.execution) {
            backend.cancel(run.handle);
        }
        if self.backends.is_draining(run.execution, run.handle) {
            debug!(
                task = %run.task.name(),
                run_id = run.run_id,
                "body still running after cancellation; holding its slot"
            );
            run.task.begin_drain();
            self.draining.push(DrainingRun {
                task: Arc::clone(&run.task),
                execution: run.execution,
                handle: run.handle,
            });
        }
        let timed_out = matches!(reason, StopReason::Timeout(_));
        let record = run.record(TaskStatus::Terminated, Some(reason.to_string()), timed_out);
        self.finish(&run.task, record);
    }

    /// Run the startup or shutdown tasks one by one, each to completion.
    async fn run_phase(&mut self, phase: Phase) {
        let tasks: Vec<Arc<Task>> = self
            .session
            .tasks()
            .into_iter()
            .filter(|t| !t.is_disabled())
            .filter(|t| match phase {
                Phase::Startup => t.is_startup(),
                Phase::Shutdown => t.is_shutdown(),
            })
            .collect();

        for task in tasks {
            debug!(task = %task.name(), ?phase, "running lifecycle task");
            self.launch(&task).await;
            loop {
                self.collect_finished().await;
                self.enforce_limits();
                self.resubmit_retries().await;
                if !task.is_running() {
                    break;
                }
                self.idle(self.session.config().cycle_sleep()).await;
            }
        }
    }

    async fn shutdown(&mut self) {
        self.shutting_down = true;
        let config = self.session.config().clone();
        info!(running = self.runs.len(), "shutting down; no new dispatch");

        for pending in std::mem::take(&mut self.retries) {
            let record = pending
                .run
                .record(TaskStatus::Fail, Some(pending.error), false);
            self.finish(&pending.run.task, record);
        }

        if !config.instant_shutdown() {
            let deadline = Instant::now() + config.shutdown_grace();
            loop {
                self.collect_finished().await;
                self.enforce_limits();
                if self.runs.is_empty() && self.draining.is_empty() {
                    break;
                }
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                self.idle(config.cycle_sleep().min(deadline - now)).await;
            }
        } else {
            self.collect_finished().await;
        }

        for run in std::mem::take(&mut self.runs) {
            self.stop(run, StopReason::Shutdown);
        }

        self.run_phase(Phase::Shutdown).await;
        self.reap_draining();

        // The scheduler stops tracking bodies that outlive it.
        for run in self.draining.drain(..) {
            warn!(task = %run.task.name(), "abandoning a cancelled body that is still running");
            run.task.end_drain();
        }
    }
}
