// src/exec/process.rs

//! Child-process execution for [`CommandSpec`] bodies.
//!
//! - The resolved arguments are written to the child's stdin as one JSON
//!   object, then stdin is closed.
//! - Exit code 0 is success. The last non-empty stdout line is the return
//!   value, parsed as JSON when possible and kept as a string otherwise.
//! - A non-zero exit is a failure carrying the tail of stderr.
//! - A child killed by a signal, or one we could not wait on, is a crash.
//!
//! Cancellation drops the future owning the child; `kill_on_drop(true)`
//! makes that a hard kill.

use std::collections::HashMap;
use std::process::{Output, Stdio};

use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::{ChildStdin, Command};
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::TasktideError;
use crate::task::{CommandSpec, TaskBody};
use crate::types::Execution;

use super::backend::{ExecutionBackend, Job, RunHandle, RunOutcome, SubmitFuture};

/// Environment variable carrying the task name into the child.
pub const TASK_ENV: &str = "TASKTIDE_TASK";
/// Environment variable carrying the run id into the child.
pub const RUN_ID_ENV: &str = "TASKTIDE_RUN_ID";

const STDERR_TAIL_LINES: usize = 20;

struct Slot {
    result: oneshot::Receiver<RunOutcome>,
    cancel: CancellationToken,
}

pub struct ProcessBackend {
    max_processes: usize,
    next: u64,
    slots: HashMap<RunHandle, Slot>,
}

impl ProcessBackend {
    pub fn new(max_processes: usize) -> Self {
        Self {
            max_processes: max_processes.max(1),
            next: 0,
            slots: HashMap::new(),
        }
    }
}

impl ExecutionBackend for ProcessBackend {
    fn kind(&self) -> Execution {
        Execution::Process
    }

    fn submit(&mut self, job: Job) -> SubmitFuture<'_> {
        Box::pin(async move {
            let TaskBody::Command(spec) = job.task.body() else {
                return Err(TasktideError::Backend(format!(
                    "process execution needs a command body (task '{}')",
                    job.task.name()
                )));
            };

            let payload = serde_json::to_vec(&job.args)?;
            let mut cmd = build_command(spec, job.task.name(), job.run_id);
            let mut child = cmd.spawn().map_err(|e| {
                TasktideError::Backend(format!(
                    "spawning process for task '{}' ({spec}): {e}",
                    job.task.name()
                ))
            })?;

            info!(
                task = %job.task.name(),
                run_id = job.run_id,
                attempt = job.attempt,
                cmd = %spec,
                pid = child.id(),
                "started task process"
            );

            self.next += 1;
            let handle = RunHandle(self.next);
            let cancel = CancellationToken::new();
            let (tx, rx) = oneshot::channel();

            let stdin = child.stdin.take();
            let token = cancel.clone();
            let session = job.session.clone();
            let task_name = job.task.name().to_string();
            let run_id = job.run_id;

            tokio::spawn(async move {
                let run = async move {
                    let (_, output) =
                        tokio::join!(feed_stdin(stdin, payload), child.wait_with_output());
                    match output {
                        Ok(output) => interpret(output),
                        Err(e) => RunOutcome::Crashed(format!("waiting for process: {e}")),
                    }
                };

                // Either the process exits on its own, or the run is
                // cancelled and dropping `run` kills the child.
                tokio::select! {
                    outcome = run => {
                        let _ = tx.send(outcome);
                        session.wake();
                    }
                    _ = token.cancelled() => {
                        debug!(
                            task = %task_name,
                            run_id,
                            "cancellation requested; killing process"
                        );
                    }
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
                RunOutcome::Crashed("process runner ended without a result".to_string())
            }
        };
        self.slots.remove(&handle);
        Some(outcome)
    }

    fn cancel(&mut self, handle: RunHandle) {
        if let Some(slot) = self.slots.remove(&handle) {
            slot.cancel.cancel();
        }
    }

    fn active(&self) -> usize {
        self.slots.len()
    }

    fn has_capacity(&self) -> bool {
        self.slots.len() < self.max_processes
    }
}

fn build_command(spec: &CommandSpec, task: &str, run_id: u64) -> Command {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .env(TASK_ENV, task)
        .env(RUN_ID_ENV, run_id.to_string())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

async fn feed_stdin(stdin: Option<ChildStdin>, payload: Vec<u8>) {
    let Some(mut stdin) = stdin else {
        return;
    };
    // A child that never reads stdin closes the pipe early; not an error.
    if let Err(e) = stdin.write_all(&payload).await {
        debug!(error = %e, "could not write arguments to child stdin");
    }
    let _ = stdin.shutdown().await;
}

fn interpret(output: Output) -> RunOutcome {
    if output.status.success() {
        return RunOutcome::Success(parse_return(&String::from_utf8_lossy(&output.stdout)));
    }
    let stderr = stderr_tail(&String::from_utf8_lossy(&output.stderr));
    match output.status.code() {
        Some(code) if stderr.is_empty() => RunOutcome::Failed(format!("exit code {code}")),
        Some(code) => RunOutcome::Failed(format!("exit code {code}: {stderr}")),
        None => RunOutcome::Crashed(format!("process terminated abnormally ({})", output.status)),
    }
}

/// Return value from captured stdout: the last non-empty line as JSON,
/// else as a string, or `null` when there is no output.
pub fn parse_return(stdout: &str) -> Value {
    let Some(line) = stdout.lines().rev().map(str::trim).find(|l| !l.is_empty()) else {
        return Value::Null;
    };
    serde_json::from_str(line).unwrap_or_else(|_| Value::String(line.to_string()))
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}
