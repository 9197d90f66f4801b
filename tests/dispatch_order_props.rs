// tests/dispatch_order_props.rs

mod common;
use crate::common::{FakeBackend, fast_session, value_body};

use std::time::Duration;

use proptest::prelude::*;
use serde_json::json;

use tasktide::cond::Condition;
use tasktide::{Execution, Scheduler, Task, TaskStatus};
use tasktide::config::TimeoutSetting;
use tasktide::engine::{dispatch_order, timed_out};

proptest! {
    #[test]
    fn dispatch_order_is_a_stable_descending_permutation(
        priorities in prop::collection::vec(-3i64..3, 0..40)
    ) {
        let order = dispatch_order(&priorities);

        let mut seen = order.clone();
        seen.sort_unstable();
        prop_assert_eq!(seen, (0..priorities.len()).collect::<Vec<_>>());

        for pair in order.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            prop_assert!(priorities[a] >= priorities[b]);
            if priorities[a] == priorities[b] {
                prop_assert!(a < b, "tie at {} and {} out of registration order", a, b);
            }
        }
    }

    #[test]
    fn direct_runs_never_time_out(limit_ms in 0u64..1_000, elapsed_ms in 0u64..10_000) {
        let limit = TimeoutSetting::After(Duration::from_millis(limit_ms));
        let elapsed = Duration::from_millis(elapsed_ms);

        prop_assert!(!timed_out(limit, Execution::Main, elapsed));
        prop_assert_eq!(timed_out(limit, Execution::Async, elapsed), elapsed_ms > limit_ms);
        prop_assert!(!timed_out(TimeoutSetting::Never, Execution::Process, elapsed));
    }
}

/// Serve a session with one always-eligible task whose runs never finish.
/// Returns the in-flight count seen at each submission and the task history.
fn serve_held_task(max_instances: usize, cycles: u64) -> (Vec<usize>, Vec<TaskStatus>) {
    let session = fast_session(cycles);
    session
        .register(
            Task::builder("worker", value_body(json!(null)))
                .start_cond(Condition::True)
                .execution(Execution::Async)
                .max_instances(max_instances)
                .build()
                .unwrap(),
        )
        .unwrap();

    let fake = FakeBackend::new(Execution::Async).holding();
    let submissions = fake.submissions();
    let mut scheduler = Scheduler::new(session.clone());
    scheduler.backends_mut().replace(fake);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let local = tokio::task::LocalSet::new();
    runtime.block_on(local.run_until(scheduler.serve())).unwrap();

    let in_flight = submissions.lock().unwrap().iter().map(|s| s.in_flight).collect();
    let statuses = session
        .task("worker")
        .unwrap()
        .history()
        .iter()
        .map(|r| r.status)
        .collect();
    (in_flight, statuses)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn live_runs_never_exceed_max_instances(max_instances in 1usize..5, cycles in 0u64..6) {
        let (in_flight, statuses) = serve_held_task(max_instances, cycles);

        // At most one launch per cycle, and cycles 0..=N all dispatch.
        let expected = max_instances.min(cycles as usize + 1);
        prop_assert_eq!(in_flight.len(), expected);
        prop_assert!(in_flight.iter().all(|n| *n <= max_instances));
        prop_assert_eq!(in_flight, (1..=expected).collect::<Vec<_>>());

        prop_assert_eq!(statuses.len(), expected);
        prop_assert!(statuses.iter().all(|s| *s == TaskStatus::Terminated));
    }
}
