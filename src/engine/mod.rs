// src/engine/mod.rs

//! Scheduling engine.
//!
//! The pure planning rules live in [`plan`]; the async loop that drives
//! backends, conditions and task state is implemented in [`runtime`].

pub mod plan;
pub mod runtime;

/// Target used for task lifecycle events (started, succeeded, failed...).
pub const TASK_TARGET: &str = "tasktide::task";

pub use plan::{dispatch_order, plan_dispatch, timed_out};
pub use runtime::Scheduler;
