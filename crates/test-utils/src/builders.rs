#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use serde_json::{Value, json};
use tasktide::cond::{self, Condition};
use tasktide::{Config, ConfigBuilder, Execution, Session, Task, TaskBody, TaskBuilder};

/// Shared, ordered log of task invocations.
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn calls(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Config tuned for tests: short cycles, a short grace period, stop after
/// `cycles` completed cycles.
pub fn fast_config(cycles: u64) -> ConfigBuilder {
    Config::builder()
        .cycle_sleep(Duration::from_millis(5))
        .shutdown_grace(Duration::from_millis(200))
        .shut_cond(cond::cycles_more_than(cycles))
}

/// Session over [`fast_config`].
pub fn fast_session(cycles: u64) -> Session {
    Session::new(fast_config(cycles).build().expect("valid test config"))
        .expect("session builds")
}

/// Sync body that appends the task name to `log` and returns it.
pub fn recording_body(log: &CallLog) -> TaskBody {
    let log = Arc::clone(log);
    TaskBody::sync(move |ctx| {
        log.lock().unwrap().push(ctx.task.clone());
        Ok(json!(ctx.task))
    })
}

/// Sync body failing its first `failures` attempts, then returning
/// `{"attempt": n}`.
pub fn flaky_body(failures: u32) -> (TaskBody, Arc<AtomicU32>) {
    let counter = Arc::new(AtomicU32::new(0));
    let seen = Arc::clone(&counter);
    let body = TaskBody::sync(move |ctx| {
        let n = seen.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= failures {
            Err(anyhow!("attempt {n} failed"))
        } else {
            Ok(json!({ "attempt": ctx.attempt }))
        }
    });
    (body, counter)
}

/// Sync body returning `value`.
pub fn value_body(value: Value) -> TaskBody {
    TaskBody::sync(move |_| Ok(value.clone()))
}

/// Builder for a task that may start every cycle and runs on the
/// scheduler thread.
pub fn always(name: &str, body: TaskBody) -> TaskBuilder {
    Task::builder(name, body)
        .start_cond(Condition::True)
        .execution(Execution::Main)
}

/// Builder for a task that only runs when forced.
pub fn manual(name: &str, body: TaskBody) -> TaskBuilder {
    Task::builder(name, body).start_cond(Condition::False)
}
