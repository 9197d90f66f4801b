use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::Value;
use tasktide::Execution;
use tasktide::exec::{ExecutionBackend, Job, RunHandle, RunOutcome, SubmitFuture};

/// One recorded submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub task: String,
    pub run_id: u64,
    pub attempt: u32,
    pub args: Value,
    /// Slots taken at submit time, this job included.
    pub in_flight: usize,
}

/// A fake backend that:
/// - records every submitted job,
/// - never runs bodies,
/// - completes each job on the next poll with a fixed outcome, or keeps it
///   running forever when `hold` is set,
/// - with `linger`, keeps a finished job's slot taken for a while after
///   reporting its outcome, like a worker that is slow to be reclaimed.
pub struct FakeBackend {
    kind: Execution,
    outcome: RunOutcome,
    hold: bool,
    capacity: Option<usize>,
    linger: Option<Duration>,
    next: u64,
    pending: HashMap<RunHandle, String>,
    lingering: Vec<Instant>,
    submitted: Arc<Mutex<Vec<Submission>>>,
    cancelled: Arc<Mutex<Vec<String>>>,
}

impl FakeBackend {
    pub fn new(kind: Execution) -> Self {
        Self {
            kind,
            outcome: RunOutcome::Success(Value::Null),
            hold: false,
            capacity: None,
            linger: None,
            next: 0,
            pending: HashMap::new(),
            lingering: Vec::new(),
            submitted: Arc::new(Mutex::new(Vec::new())),
            cancelled: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_outcome(mut self, outcome: RunOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    /// Keep every job running until cancelled.
    pub fn holding(mut self) -> Self {
        self.hold = true;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn lingering(mut self, linger: Duration) -> Self {
        self.linger = Some(linger);
        self
    }

    fn taken(&self) -> usize {
        let now = Instant::now();
        self.pending.len() + self.lingering.iter().filter(|until| **until > now).count()
    }

    pub fn submissions(&self) -> Arc<Mutex<Vec<Submission>>> {
        Arc::clone(&self.submitted)
    }

    pub fn cancellations(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.cancelled)
    }
}

impl ExecutionBackend for FakeBackend {
    fn kind(&self) -> Execution {
        self.kind
    }

    fn submit(&mut self, job: Job) -> SubmitFuture<'_> {
        Box::pin(async move {
            self.next += 1;
            let handle = RunHandle(self.next);
            let in_flight = self.taken() + 1;
            self.submitted.lock().unwrap().push(Submission {
                task: job.task.name().to_string(),
                run_id: job.run_id,
                attempt: job.attempt,
                args: job.args.to_json(),
                in_flight,
            });
            self.pending.insert(handle, job.task.name().to_string());
            Ok(handle)
        })
    }

    fn poll(&mut self, handle: RunHandle) -> Option<RunOutcome> {
        if self.hold {
            return None;
        }
        self.pending.remove(&handle)?;
        if let Some(linger) = self.linger {
            let now = Instant::now();
            self.lingering.retain(|until| *until > now);
            self.lingering.push(now + linger);
        }
        Some(self.outcome.clone())
    }

    fn cancel(&mut self, handle: RunHandle) {
        if let Some(task) = self.pending.remove(&handle) {
            self.cancelled.lock().unwrap().push(task);
        }
    }

    fn active(&self) -> usize {
        self.taken()
    }

    fn has_capacity(&self) -> bool {
        self.capacity.is_none_or(|cap| self.taken() < cap)
    }
}
