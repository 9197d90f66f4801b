// src/exec/cooperative.rs

//! Cooperative execution on the scheduler's single-threaded runtime.
//!
//! Bodies are spawned as local tasks on the same `LocalSet` the scheduler
//! loop runs in, so they interleave with it at `.await` points only.

use std::collections::HashMap;

use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::TasktideError;
use crate::task::TaskBody;
use crate::types::Execution;

use super::backend::{ExecutionBackend, Job, RunHandle, RunOutcome, SubmitFuture};

struct Slot {
    result: oneshot::Receiver<RunOutcome>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Default)]
pub struct CooperativeBackend {
    next: u64,
    slots: HashMap<RunHandle, Slot>,
}

impl CooperativeBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExecutionBackend for CooperativeBackend {
    fn kind(&self) -> Execution {
        Execution::Async
    }

    fn submit(&mut self, job: Job) -> SubmitFuture<'_> {
        Box::pin(async move {
            self.next += 1;
            let handle = RunHandle(self.next);
            let cancel = CancellationToken::new();
            let ctx = job.context(cancel.clone());
            let session = job.session.clone();
            let (tx, rx) = oneshot::channel();

            let join = match job.task.body() {
                TaskBody::Sync(f) => {
                    let f = f.clone();
                    tokio::task::spawn_local(async move {
                        let _ = tx.send(RunOutcome::from_body(f(ctx)));
                        session.wake();
                    })
                }
                TaskBody::Async(f) => {
                    let fut = f(ctx);
                    tokio::task::spawn_local(async move {
                        let _ = tx.send(RunOutcome::from_body(fut.await));
                        session.wake();
                    })
                }
                TaskBody::Command(spec) => {
                    return Err(TasktideError::Backend(format!(
                        "cooperative execution cannot run command '{spec}'"
                    )));
                }
            };

            self.slots.insert(
                handle,
                Slot {
                    result: rx,
                    cancel,
                    handle: join,
                },
            );
            Ok(handle)
        })
    }

    fn poll(&mut self, handle: RunHandle) -> Option<RunOutcome> {
        let slot = self.slots.get_mut(&handle)?;
        let outcome = match slot.result.try_recv() {
            Ok(outcome) => outcome,
            Err(TryRecvError::Empty) => return None,
            // Sender dropped without a result: the body panicked.
            Err(TryRecvError::Closed) => {
                RunOutcome::Crashed("cooperative task ended without a result".to_string())
            }
        };
        self.slots.remove(&handle);
        Some(outcome)
    }

    fn cancel(&mut self, handle: RunHandle) {
        if let Some(slot) = self.slots.remove(&handle) {
            debug!(%handle, "aborting cooperative task");
            slot.cancel.cancel();
            slot.handle.abort();
        }
    }

    fn active(&self) -> usize {
        self.slots.len()
    }
}
