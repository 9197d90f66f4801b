#![allow(dead_code)]

pub use tasktide_test_utils::builders::*;
pub use tasktide_test_utils::fake_backend::{FakeBackend, Submission};
pub use tasktide_test_utils::{init_tracing, run_scheduler, run_session, with_timeout};

use tasktide::{Session, Task};

/// Register `task`, returning the name it was registered under.
pub fn add(session: &Session, task: Task) -> String {
    session
        .register(task)
        .expect("registration succeeds")
        .name()
        .to_string()
}
