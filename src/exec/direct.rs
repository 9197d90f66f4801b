// src/exec/direct.rs

//! Direct execution on the scheduler's own control flow.
//!
//! `submit` does not return until the body is done, so the loop is blocked
//! for the whole run. The outcome is parked until the next `poll`.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::TasktideError;
use crate::task::TaskBody;
use crate::types::Execution;

use super::backend::{ExecutionBackend, Job, RunHandle, RunOutcome, SubmitFuture};
use super::panic_message;

#[derive(Debug, Default)]
pub struct DirectBackend {
    next: u64,
    finished: HashMap<RunHandle, RunOutcome>,
}

impl DirectBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExecutionBackend for DirectBackend {
    fn kind(&self) -> Execution {
        Execution::Main
    }

    fn submit(&mut self, job: Job) -> SubmitFuture<'_> {
        Box::pin(async move {
            self.next += 1;
            let handle = RunHandle(self.next);
            let ctx = job.context(CancellationToken::new());

            debug!(task = %ctx.task, run_id = ctx.run_id, "running body on the scheduler thread");

            let outcome = match job.task.body() {
                TaskBody::Sync(f) => {
                    let f = f.clone();
                    match catch_unwind(AssertUnwindSafe(move || f(ctx))) {
                        Ok(result) => RunOutcome::from_body(result),
                        Err(payload) => RunOutcome::Crashed(panic_message(&*payload)),
                    }
                }
                TaskBody::Async(f) => match tokio::task::spawn_local(f(ctx)).await {
                    Ok(result) => RunOutcome::from_body(result),
                    Err(err) if err.is_panic() => {
                        RunOutcome::Crashed(panic_message(&*err.into_panic()))
                    }
                    Err(err) => RunOutcome::Crashed(err.to_string()),
                },
                TaskBody::Command(spec) => {
                    return Err(TasktideError::Backend(format!(
                        "direct execution cannot run command '{spec}'"
                    )));
                }
            };

            self.finished.insert(handle, outcome);
            Ok(handle)
        })
    }

    fn poll(&mut self, handle: RunHandle) -> Option<RunOutcome> {
        self.finished.remove(&handle)
    }

    fn cancel(&mut self, handle: RunHandle) {
        self.finished.remove(&handle);
    }

    fn active(&self) -> usize {
        self.finished.len()
    }
}
