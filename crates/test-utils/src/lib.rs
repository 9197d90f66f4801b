pub mod builders;
pub mod fake_backend;

use std::sync::Once;
use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=tasktide=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .try_init();
    });
}

/// Run a future with a 10-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(10), f)
        .await
        .expect("Test timed out after 10 seconds")
}

/// Drive `session`'s scheduler on the current runtime, bounded by
/// [`with_timeout`].
pub async fn run_session(session: &tasktide::Session) -> tasktide::Result<()> {
    with_timeout(session.run()).await
}

/// Drive an explicitly built scheduler (e.g. with fake backends) inside a
/// `LocalSet`, bounded by [`with_timeout`].
pub async fn run_scheduler(scheduler: tasktide::Scheduler) -> tasktide::Result<()> {
    let local = tokio::task::LocalSet::new();
    with_timeout(local.run_until(scheduler.serve())).await
}
