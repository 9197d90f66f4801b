// src/params/resolve.rs

//! Argument resolution.
//!
//! Bindings are resolved immediately before a task body runs, so lazy
//! arguments always observe the freshest session state. Any failure aborts
//! the whole resolution: a body never sees a partially resolved set.

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, TasktideError};
use crate::params::{Argument, Arguments, Parameters};
use crate::session::Session;
use crate::task::Task;

/// Resolve every binding in `bindings` against `session`.
pub fn resolve(bindings: &Parameters, session: &Session) -> Result<Arguments> {
    let mut resolved = Arguments::default();

    for (name, arg) in bindings.iter() {
        let value = resolve_one(name, arg, session, true)?;
        resolved.insert(name.clone(), value);
    }

    Ok(resolved)
}

/// Resolve the arguments of one task invocation.
///
/// Task-level bindings are resolved strictly and override session-level
/// parameters by name. A session-level parameter that cannot be resolved
/// yet is left out rather than failing the task; a task that depends on it
/// binds it explicitly with [`Argument::Param`].
pub fn resolve_for_task(task: &Task, session: &Session) -> Result<Arguments> {
    let own = task.parameters();
    let mut resolved = resolve(own, session)?;

    let shared = session.parameters().snapshot();
    for (name, arg) in shared.iter().filter(|(name, _)| !own.contains(name.as_str())) {
        match resolve_one(name, arg, session, true) {
            Ok(value) => resolved.insert(name.clone(), value),
            Err(err) => debug!(
                task = %task.name(),
                param = %name,
                error = %err,
                "session parameter not resolvable yet; leaving it out"
            ),
        }
    }

    debug!(
        task = %task.name(),
        args = resolved.len(),
        "resolved task arguments"
    );
    Ok(resolved)
}

fn resolve_one(
    name: &str,
    arg: &Argument,
    session: &Session,
    follow_param: bool,
) -> Result<Value> {
    match arg {
        Argument::Value(value) => Ok(value.clone()),
        Argument::Return(task) => session.returns().get(task).ok_or_else(|| {
            TasktideError::resolution(
                name,
                format!("task '{task}' has no recorded return value"),
            )
        }),
        Argument::Param(param) => {
            if !follow_param {
                return Err(TasktideError::resolution(
                    name,
                    format!("parameter '{param}' refers to another parameter"),
                ));
            }
            let target = session.parameters().get(param).ok_or_else(|| {
                TasktideError::resolution(name, format!("session parameter '{param}' is not set"))
            })?;
            resolve_one(name, &target, session, false)
        }
        Argument::Env(var) => std::env::var(var).map(Value::String).map_err(|_| {
            TasktideError::resolution(name, format!("environment variable '{var}' is not set"))
        }),
        Argument::Func(func) => func.call(session).map_err(|e| {
            TasktideError::resolution(name, format!("'{}' failed: {e:#}", func.name()))
        }),
    }
}
