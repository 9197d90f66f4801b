// src/engine/plan.rs

//! Pure cycle planning.
//!
//! Nothing here touches tokio, backends or conditions, so ordering and
//! limit rules can be tested on their own.

use std::sync::Arc;
use std::time::Duration;

use crate::config::TimeoutSetting;
use crate::task::Task;
use crate::types::Execution;

/// Indices of `priorities` in dispatch order: highest first, ties kept in
/// input (registration) order.
pub fn dispatch_order(priorities: &[i64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..priorities.len()).collect();
    // `sort_by` is stable.
    order.sort_by(|&a, &b| priorities[b].cmp(&priorities[a]));
    order
}

/// Dispatch candidates for one cycle, in dispatch order.
///
/// `tasks` must be in registration order. Disabled tasks and startup or
/// shutdown tasks never take part in regular cycles.
pub fn plan_dispatch(tasks: &[Arc<Task>]) -> Vec<Arc<Task>> {
    let candidates: Vec<&Arc<Task>> = tasks
        .iter()
        .filter(|t| !t.is_disabled() && !t.is_startup() && !t.is_shutdown())
        .collect();
    let priorities: Vec<i64> = candidates.iter().map(|t| t.priority()).collect();
    dispatch_order(&priorities)
        .into_iter()
        .map(|i| Arc::clone(candidates[i]))
        .collect()
}

/// Whether an attempt running for `elapsed` has exceeded `timeout`.
///
/// Direct execution blocks the loop for the whole run, so it is never
/// considered timed out.
pub fn timed_out(timeout: TimeoutSetting, execution: Execution, elapsed: Duration) -> bool {
    if execution == Execution::Main {
        return false;
    }
    match timeout {
        TimeoutSetting::After(limit) => elapsed > limit,
        TimeoutSetting::Never => false,
    }
}
