// src/cond/eval.rs

//! Condition evaluation.
//!
//! [`Condition::evaluate`] is the strict form: leaf errors propagate.
//! [`check`] is what the scheduler uses: errors count as `false` and are
//! logged, and evaluations slower than the configured threshold are
//! flagged because they stall the whole cycle.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, bail};
use chrono::{DateTime, Datelike, Local};
use tracing::warn;

use crate::cond::Condition;
use crate::cond::time::{elapsed_since, in_window};
use crate::session::Session;
use crate::task::Task;
use crate::types::TaskStatus;

/// Read-only view used while evaluating a condition.
#[derive(Debug, Clone, Copy)]
pub struct CondContext<'a> {
    pub session: &'a Session,
    /// Task whose condition is being evaluated, if any.
    pub task: Option<&'a str>,
    pub now: DateTime<Local>,
}

impl<'a> CondContext<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self {
            session,
            task: None,
            now: Local::now(),
        }
    }

    pub fn for_task(session: &'a Session, task: &'a str) -> Self {
        Self {
            session,
            task: Some(task),
            now: Local::now(),
        }
    }

    pub fn at(mut self, now: DateTime<Local>) -> Self {
        self.now = now;
        self
    }

    fn target<'b>(&'b self, explicit: Option<&'b str>) -> anyhow::Result<&'b str> {
        explicit
            .or(self.task)
            .ok_or_else(|| anyhow!("condition needs a task but none is being evaluated"))
    }

    fn lookup(&self, name: &str) -> anyhow::Result<Arc<Task>> {
        self.session
            .task(name)
            .ok_or_else(|| anyhow!("condition refers to unknown task '{name}'"))
    }
}

impl Condition {
    /// Evaluate strictly, short-circuiting composites left to right.
    pub fn evaluate(&self, ctx: &CondContext<'_>) -> anyhow::Result<bool> {
        match self {
            Condition::True => Ok(true),
            Condition::False => Ok(false),
            Condition::All(children) => {
                for child in children {
                    if !child.evaluate(ctx)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Condition::Any(children) => {
                for child in children {
                    if child.evaluate(ctx)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Condition::Not(inner) => Ok(!inner.evaluate(ctx)?),
            Condition::Every { period, task } => {
                let name = ctx.target(task.as_deref())?;
                let task = ctx.lookup(name)?;
                Ok(match task.last_started() {
                    None => true,
                    Some(started) => elapsed_since(ctx.now, started) >= *period,
                })
            }
            Condition::TimeOfDay { start, end } => Ok(in_window(ctx.now.time(), *start, *end)),
            Condition::DayOfWeek(days) => Ok(days.contains(&ctx.now.weekday())),
            Condition::After { upstream, on } => {
                let upstream = ctx.lookup(upstream)?;
                let ended = upstream.with_state(|s| {
                    s.last_with(|r| on.matches(r.status)).map(|r| r.ended)
                });
                let Some(ended) = ended else {
                    return Ok(false);
                };
                let own = ctx.lookup(ctx.target(None)?)?;
                Ok(match own.last_started() {
                    None => true,
                    Some(started) => ended > started,
                })
            }
            Condition::Status {
                task,
                status,
                within,
            } => {
                let task = ctx.lookup(ctx.target(task.as_deref())?)?;
                let now = ctx.now;
                Ok(task.with_state(|s| match status {
                    TaskStatus::Running => s.active > 0,
                    TaskStatus::Inactive => s.active == 0,
                    terminal => s
                        .last_with(|r| {
                            r.status == *terminal
                                && within.is_none_or(|w| elapsed_since(now, r.ended) <= w)
                        })
                        .is_some(),
                }))
            }
            Condition::SchedulerCycles { more_than } => {
                Ok(ctx.session.stats().cycles > *more_than)
            }
            Condition::SchedulerRunning { more_than } => Ok(ctx
                .session
                .stats()
                .started_at
                .is_some_and(|started| elapsed_since(ctx.now, started) > *more_than)),
            Condition::ParamExists { name, equals } => {
                let Some(arg) = ctx.session.parameters().get(name) else {
                    return Ok(false);
                };
                Ok(match equals {
                    None => true,
                    Some(expected) => arg.as_value() == Some(expected),
                })
            }
            Condition::Func(func) => {
                let result = (func.func)(ctx);
                match result {
                    Ok(value) => Ok(value),
                    Err(e) => bail!("func('{}') failed: {e:#}", func.name),
                }
            }
        }
    }
}

/// Evaluate for scheduling: errors become `false`, slow evaluations are flagged.
pub fn check(cond: &Condition, ctx: &CondContext<'_>) -> bool {
    let config = ctx.session.config();
    let silent = config.silence_cond_check();

    let started = Instant::now();
    let result = cond.evaluate(ctx);
    let elapsed = started.elapsed();

    if elapsed > config.slow_cond_threshold() && !silent {
        warn!(
            condition = %cond,
            task = ctx.task.unwrap_or("<scheduler>"),
            elapsed_ms = elapsed.as_millis() as u64,
            "slow condition evaluation is stalling the scheduler"
        );
    }

    match result {
        Ok(value) => value,
        Err(err) => {
            if !silent {
                warn!(
                    condition = %cond,
                    task = ctx.task.unwrap_or("<scheduler>"),
                    error = %err,
                    "condition evaluation failed; treating as false"
                );
            }
            false
        }
    }
}
