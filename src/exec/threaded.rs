// src/exec/threaded.rs

//! Worker-thread execution on tokio's blocking pool.
//!
//! Threads cannot be stopped from the outside. Cancelling a run trips the
//! body's cancellation token and moves the slot to draining; a body that
//! ignores the token keeps its thread, and its slot, until it returns. Its
//! result is discarded.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};

use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::TasktideError;
use crate::task::TaskBody;
use crate::types::Execution;

use super::backend::{ExecutionBackend, Job, RunHandle, RunOutcome, SubmitFuture};
use super::panic_message;

struct Slot {
    result: oneshot::Receiver<RunOutcome>,
    cancel: CancellationToken,
}

pub struct ThreadedBackend {
    max_threads: usize,
    next: u64,
    slots: HashMap<RunHandle, Slot>,
    draining: HashMap<RunHandle, oneshot::Receiver<RunOutcome>>,
}

impl ThreadedBackend {
    pub fn new(max_threads: usize) -> Self {
        Self {
            max_threads: max_threads.max(1),
            next: 0,
            slots: HashMap::new(),
            draining: HashMap::new(),
        }
    }
}

impl ExecutionBackend for ThreadedBackend {
    fn kind(&self) -> Execution {
        Execution::Thread
    }

    fn submit(&mut self, job: Job) -> SubmitFuture<'_> {
        Box::pin(async move {
            let TaskBody::Sync(f) = job.task.body() else {
                return Err(TasktideError::Backend(format!(
                    "thread execution needs a sync body (task '{}')",
                    job.task.name()
                )));
            };
            let f = f.clone();

            self.next += 1;
            let handle = RunHandle(self.next);
            let cancel = CancellationToken::new();
            let ctx = job.context(cancel.clone());
            let session = job.session.clone();
            let (tx, rx) = oneshot::channel();

            // Detached: the join handle is never awaited.
            tokio::task::spawn_blocking(move || {
                let outcome = match catch_unwind(AssertUnwindSafe(move || f(ctx))) {
                    Ok(result) => RunOutcome::from_body(result),
                    Err(payload) => RunOutcome::Crashed(panic_message(&*payload)),
                };
                if tx.send(outcome).is_ok() {
                    session.wake();
                }
            });

            self.slots.insert(handle, Slot { result: rx, cancel });
            Ok(handle)
        })
    }

    fn poll(&mut self, handle: RunHandle) -> Option<RunOutcome> {
        let slot = self.slots.get_mut(&handle)?;
        let outcome = match slot.result.try_recv() {
            Ok(outcome) => outcome,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Closed) => {
                RunOutcome::Crashed("worker thread ended without a result".to_string())
            }
        };
        self.slots.remove(&handle);
        Some(outcome)
    }

    fn cancel(&mut self, handle: RunHandle) {
        if let Some(slot) = self.slots.remove(&handle) {
            debug!(%handle, "requesting cancellation of worker thread; slot draining");
            slot.cancel.cancel();
            self.draining.insert(handle, slot.result);
        }
    }

    fn is_draining(&mut self, handle: RunHandle) -> bool {
        let Some(result) = self.draining.get_mut(&handle) else {
            return false;
        };
        if matches!(result.try_recv(), Err(TryRecvError::Empty)) {
            return true;
        }
        debug!(%handle, "cancelled worker thread exited; slot released");
        self.draining.remove(&handle);
        false
    }

    fn active(&self) -> usize {
        self.slots.len() + self.draining.len()
    }

    fn has_capacity(&self) -> bool {
        self.active() < self.max_threads
    }
}
