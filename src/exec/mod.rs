// src/exec/mod.rs

//! Execution layer.
//!
//! Each execution strategy has its own backend implementing
//! [`ExecutionBackend`]; the scheduler drives them through [`Backends`].
//!
//! - [`backend`] provides the trait, the job/handle/outcome types and the
//!   per-strategy registry.
//! - [`direct`] runs bodies inline, blocking the loop (`main`).
//! - [`cooperative`] spawns bodies on the scheduler's `LocalSet` (`async`).
//! - [`threaded`] runs sync bodies on the blocking pool (`thread`).
//! - [`process`] runs command bodies as child processes (`process`).

pub mod backend;
pub mod cooperative;
pub mod direct;
pub mod process;
pub mod threaded;

use std::any::Any;

pub use backend::{Backends, ExecutionBackend, Job, RunHandle, RunOutcome, SubmitFuture};
pub use cooperative::CooperativeBackend;
pub use direct::DirectBackend;
pub use process::ProcessBackend;
pub use threaded::ThreadedBackend;

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("task panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("task panicked: {s}")
    } else {
        "task panicked".to_string()
    }
}
