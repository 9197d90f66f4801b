// src/cond/mod.rs

//! Condition trees.
//!
//! A [`Condition`] is a tagged expression tree evaluated against session
//! state on every scheduler cycle. Composites are built with the
//! combinator functions in this module ([`all`], [`any`], [`not`]) or the
//! [`Condition::and`] / [`Condition::or`] / [`Condition::negate`] methods.
//!
//! Evaluation never writes to session or task state. See [`eval`] for the
//! evaluation context and the error/slowness policy.

pub mod eval;
pub mod time;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveTime, Weekday};
use serde_json::Value;

use crate::config::duration::format_duration;
use crate::errors::Result;
use crate::types::TaskStatus;

pub use eval::{CondContext, check};

type CondFn = dyn Fn(&CondContext<'_>) -> anyhow::Result<bool> + Send + Sync;

/// Which terminal outcome of an upstream task an [`Condition::After`] waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterOn {
    Success,
    Fail,
    /// Any terminal outcome.
    Finish,
}

impl AfterOn {
    pub(crate) fn matches(&self, status: TaskStatus) -> bool {
        match self {
            AfterOn::Success => status == TaskStatus::Success,
            AfterOn::Fail => status == TaskStatus::Fail,
            AfterOn::Finish => status.is_terminal(),
        }
    }
}

/// External predicate leaf.
#[derive(Clone)]
pub struct FuncCondition {
    name: String,
    func: Arc<CondFn>,
}

impl FuncCondition {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for FuncCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FuncCondition")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub enum Condition {
    /// Always true.
    True,
    /// Always false.
    False,
    All(Vec<Condition>),
    Any(Vec<Condition>),
    Not(Box<Condition>),
    /// The task has not started within `period`. `task = None` targets the
    /// task being evaluated.
    Every {
        period: Duration,
        task: Option<String>,
    },
    /// Local wall-clock time in `[start, end)`; wraps past midnight when
    /// `start > end`, covers the whole day when they are equal.
    TimeOfDay { start: NaiveTime, end: NaiveTime },
    DayOfWeek(Vec<Weekday>),
    /// `upstream` reached a matching outcome after the evaluated task last
    /// started (or the evaluated task never started).
    After { upstream: String, on: AfterOn },
    /// The task has a run with `status`, ended within `within` if given.
    /// `Running` / `Inactive` look at live instances instead of history.
    Status {
        task: Option<String>,
        status: TaskStatus,
        within: Option<Duration>,
    },
    SchedulerCycles { more_than: u64 },
    SchedulerRunning { more_than: Duration },
    ParamExists { name: String, equals: Option<Value> },
    Func(FuncCondition),
}

impl Condition {
    pub fn and(self, other: Condition) -> Condition {
        match self {
            Condition::All(mut children) => {
                children.push(other);
                Condition::All(children)
            }
            this => Condition::All(vec![this, other]),
        }
    }

    pub fn or(self, other: Condition) -> Condition {
        match self {
            Condition::Any(mut children) => {
                children.push(other);
                Condition::Any(children)
            }
            this => Condition::Any(vec![this, other]),
        }
    }

    pub fn negate(self) -> Condition {
        Condition::Not(Box::new(self))
    }

    /// Canonical string form; equal forms mean equal conditions.
    pub fn canonical(&self) -> String {
        self.to_string()
    }
}

impl PartialEq for Condition {
    fn eq(&self, other: &Self) -> bool {
        self.canonical() == other.canonical()
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::True => f.write_str("true"),
            Condition::False => f.write_str("false"),
            Condition::All(children) => write_joined(f, children, " & ", "true"),
            Condition::Any(children) => write_joined(f, children, " | ", "false"),
            Condition::Not(inner) => write!(f, "~{inner}"),
            Condition::Every { period, task } => match task {
                Some(task) => write!(f, "every({}, task='{task}')", format_duration(*period)),
                None => write!(f, "every({})", format_duration(*period)),
            },
            Condition::TimeOfDay { start, end } => write!(f, "time_of_day({start}-{end})"),
            Condition::DayOfWeek(days) => {
                let days: Vec<String> = days.iter().map(|d| d.to_string()).collect();
                write!(f, "day_of_week({})", days.join(", "))
            }
            Condition::After { upstream, on } => {
                let kind = match on {
                    AfterOn::Success => "success",
                    AfterOn::Fail => "fail",
                    AfterOn::Finish => "finish",
                };
                write!(f, "after_{kind}('{upstream}')")
            }
            Condition::Status {
                task,
                status,
                within,
            } => {
                f.write_str("status(")?;
                if let Some(task) = task {
                    write!(f, "'{task}', ")?;
                }
                write!(f, "{status}")?;
                if let Some(within) = within {
                    write!(f, ", within={}", format_duration(*within))?;
                }
                f.write_str(")")
            }
            Condition::SchedulerCycles { more_than } => write!(f, "scheduler_cycles(>{more_than})"),
            Condition::SchedulerRunning { more_than } => {
                write!(f, "scheduler_running(>{})", format_duration(*more_than))
            }
            Condition::ParamExists { name, equals } => match equals {
                Some(value) => write!(f, "param_exists('{name}'={value})"),
                None => write!(f, "param_exists('{name}')"),
            },
            Condition::Func(func) => write!(f, "func('{}')", func.name),
        }
    }
}

fn write_joined(
    f: &mut fmt::Formatter<'_>,
    children: &[Condition],
    sep: &str,
    empty: &str,
) -> fmt::Result {
    match children {
        [] => f.write_str(empty),
        [only] => write!(f, "{only}"),
        _ => {
            f.write_str("(")?;
            for (i, child) in children.iter().enumerate() {
                if i > 0 {
                    f.write_str(sep)?;
                }
                write!(f, "{child}")?;
            }
            f.write_str(")")
        }
    }
}

pub fn all(children: impl IntoIterator<Item = Condition>) -> Condition {
    Condition::All(children.into_iter().collect())
}

pub fn any(children: impl IntoIterator<Item = Condition>) -> Condition {
    Condition::Any(children.into_iter().collect())
}

pub fn not(cond: Condition) -> Condition {
    cond.negate()
}

/// The evaluated task has not started within `period`.
pub fn every(period: Duration) -> Condition {
    Condition::Every { period, task: None }
}

/// The named task has not started within `period`.
pub fn every_for(task: impl Into<String>, period: Duration) -> Condition {
    Condition::Every {
        period,
        task: Some(task.into()),
    }
}

/// Local time between two `HH:MM[:SS]` bounds.
pub fn time_of_day(start: &str, end: &str) -> Result<Condition> {
    Ok(Condition::TimeOfDay {
        start: time::parse_clock(start)?,
        end: time::parse_clock(end)?,
    })
}

pub fn on_days(days: impl IntoIterator<Item = Weekday>) -> Condition {
    Condition::DayOfWeek(days.into_iter().collect())
}

pub fn after_success(upstream: impl Into<String>) -> Condition {
    Condition::After {
        upstream: upstream.into(),
        on: AfterOn::Success,
    }
}

pub fn after_fail(upstream: impl Into<String>) -> Condition {
    Condition::After {
        upstream: upstream.into(),
        on: AfterOn::Fail,
    }
}

pub fn after_finish(upstream: impl Into<String>) -> Condition {
    Condition::After {
        upstream: upstream.into(),
        on: AfterOn::Finish,
    }
}

pub fn status(task: impl Into<String>, status: TaskStatus) -> Condition {
    Condition::Status {
        task: Some(task.into()),
        status,
        within: None,
    }
}

pub fn status_within(task: impl Into<String>, status: TaskStatus, within: Duration) -> Condition {
    Condition::Status {
        task: Some(task.into()),
        status,
        within: Some(within),
    }
}

pub fn running(task: impl Into<String>) -> Condition {
    status(task, TaskStatus::Running)
}

pub fn succeeded(task: impl Into<String>) -> Condition {
    status(task, TaskStatus::Success)
}

pub fn failed(task: impl Into<String>) -> Condition {
    status(task, TaskStatus::Fail)
}

/// True once the scheduler completed more than `n` cycles.
pub fn cycles_more_than(n: u64) -> Condition {
    Condition::SchedulerCycles { more_than: n }
}

/// True once the scheduler has been running for longer than `d`.
pub fn running_longer_than(d: Duration) -> Condition {
    Condition::SchedulerRunning { more_than: d }
}

pub fn param_exists(name: impl Into<String>) -> Condition {
    Condition::ParamExists {
        name: name.into(),
        equals: None,
    }
}

pub fn param_equals(name: impl Into<String>, value: impl Into<Value>) -> Condition {
    Condition::ParamExists {
        name: name.into(),
        equals: Some(value.into()),
    }
}

/// Leaf backed by an external predicate. Errors evaluate as `false`.
pub fn func<F>(name: impl Into<String>, f: F) -> Condition
where
    F: Fn(&CondContext<'_>) -> anyhow::Result<bool> + Send + Sync + 'static,
{
    Condition::Func(FuncCondition {
        name: name.into(),
        func: Arc::new(f),
    })
}
