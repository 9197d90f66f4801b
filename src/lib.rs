// src/lib.rs

//! In-process job scheduler.
//!
//! Tasks pair a body with a start [`Condition`](cond::Condition). A
//! [`Scheduler`](engine::Scheduler) bound to a [`Session`] evaluates those
//! conditions every cycle and dispatches eligible tasks through one of four
//! execution backends (direct, cooperative, threaded, child process).
//!
//! ```no_run
//! use std::time::Duration;
//! use serde_json::json;
//! use tasktide::{Config, Session, Task, TaskBody, cond};
//!
//! # fn main() -> tasktide::errors::Result<()> {
//! let config = Config::builder()
//!     .shut_cond(cond::cycles_more_than(100))
//!     .build()?;
//! let session = Session::new(config)?;
//!
//! session.register(
//!     Task::builder("hello", TaskBody::sync(|_ctx| Ok(json!("hi"))))
//!         .start_cond(cond::every(Duration::from_secs(1)))
//!         .build()?,
//! )?;
//!
//! session.start()?;
//! # Ok(())
//! # }
//! ```

pub mod cond;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod params;
pub mod session;
pub mod task;
pub mod types;

mod locks;

use std::path::Path;

use tracing::info;

pub use cond::Condition;
pub use config::{Config, ConfigBuilder, ConfigInput};
pub use engine::Scheduler;
pub use errors::{Result, TasktideError};
pub use params::{Argument, Arguments, Parameters};
pub use session::{Registration, Session, SessionBuilder, Warning};
pub use task::{CommandSpec, RunRecord, Task, TaskBody, TaskBuilder, TaskContext};
pub use types::{Execution, TaskPreExist, TaskStatus};

/// Build a session from a TOML config file.
pub fn session_from_path(path: impl AsRef<Path>) -> Result<Session> {
    let path = path.as_ref();
    let config = config::load_and_validate(path)?;
    info!(path = %path.display(), "loaded session config");
    Session::new(config)
}
