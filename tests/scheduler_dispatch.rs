// tests/scheduler_dispatch.rs

mod common;
use crate::common::{
    FakeBackend, add, always, call_log, calls, fast_config, fast_session, flaky_body,
    init_tracing, manual, recording_body, run_scheduler, run_session, value_body, with_timeout,
};

use std::sync::atomic::Ordering;
use std::time::Duration;

use serde_json::json;

use tasktide::cond::{self, Condition};
use tasktide::exec::RunOutcome;
use tasktide::{
    Argument, CommandSpec, Execution, Scheduler, Session, Task, TaskBody, TaskStatus,
    TasktideError,
};

fn session_with(config: tasktide::ConfigBuilder) -> Session {
    Session::new(config.build().unwrap()).unwrap()
}

#[tokio::test]
async fn higher_priority_runs_first_and_ties_keep_registration_order() {
    init_tracing();
    let log = call_log();
    let session = fast_session(0);

    add(&session, always("a", recording_body(&log)).priority(1).build().unwrap());
    add(&session, always("c", recording_body(&log)).priority(5).build().unwrap());
    add(&session, always("d", recording_body(&log)).priority(5).build().unwrap());
    add(&session, always("b", recording_body(&log)).priority(10).build().unwrap());

    run_session(&session).await.unwrap();

    assert_eq!(calls(&log), vec!["b", "c", "d", "a"]);
    assert_eq!(session.stats().cycles, 1);
    assert!(session.stats().stopped_at.is_some());
    assert!(!session.is_serving());
}

#[tokio::test]
async fn disabled_tasks_never_run() {
    init_tracing();
    let log = call_log();
    let session = fast_session(2);

    add(&session, always("on", recording_body(&log)).build().unwrap());
    add(
        &session,
        always("off", recording_body(&log)).disabled(true).build().unwrap(),
    );

    run_session(&session).await.unwrap();

    let seen = calls(&log);
    assert!(seen.iter().all(|t| t == "on"));
    assert!(!seen.is_empty());
    assert!(session.task("off").unwrap().history().is_empty());
}

#[tokio::test]
async fn live_instances_are_capped_per_task() {
    init_tracing();
    let session = fast_session(3);
    add(
        &session,
        Task::builder("worker", value_body(json!(null)))
            .start_cond(Condition::True)
            .execution(Execution::Async)
            .max_instances(2)
            .build()
            .unwrap(),
    );

    let fake = FakeBackend::new(Execution::Async).holding();
    let submissions = fake.submissions();
    let cancellations = fake.cancellations();
    let mut scheduler = Scheduler::new(session.clone());
    scheduler.backends_mut().replace(fake);

    run_scheduler(scheduler).await.unwrap();

    let submitted = submissions.lock().unwrap().clone();
    assert_eq!(submitted.len(), 2);
    assert_ne!(submitted[0].run_id, submitted[1].run_id);
    assert_eq!(cancellations.lock().unwrap().len(), 2);

    let history = session.task("worker").unwrap().history();
    assert_eq!(history.len(), 2);
    for record in &history {
        assert_eq!(record.status, TaskStatus::Terminated);
        assert_eq!(record.error.as_deref(), Some("cancelled at shutdown"));
        assert!(!record.timed_out);
    }
}

#[tokio::test]
async fn saturated_backend_defers_dispatch() {
    init_tracing();
    let session = fast_session(3);
    for name in ["first", "second"] {
        add(
            &session,
            Task::builder(name, value_body(json!(null)))
                .start_cond(Condition::True)
                .execution(Execution::Async)
                .build()
                .unwrap(),
        );
    }

    let fake = FakeBackend::new(Execution::Async).holding().with_capacity(1);
    let submissions = fake.submissions();
    let mut scheduler = Scheduler::new(session.clone());
    scheduler.backends_mut().replace(fake);

    run_scheduler(scheduler).await.unwrap();

    let submitted = submissions.lock().unwrap().clone();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].task, "first");
    assert!(session.task("second").unwrap().history().is_empty());
}

#[tokio::test]
async fn failed_attempts_are_retried_within_one_run() {
    init_tracing();
    let session = session_with(fast_config(100).shut_cond(cond::succeeded("flaky")));
    let (body, counter) = flaky_body(2);
    add(&session, always("flaky", body).retries(2).build().unwrap());

    run_session(&session).await.unwrap();

    assert_eq!(counter.load(Ordering::SeqCst), 3);
    let history = session.task("flaky").unwrap().history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, TaskStatus::Success);
    assert_eq!(history[0].attempts, 3);
    assert_eq!(session.returns().get("flaky"), Some(json!({ "attempt": 3 })));
}

#[tokio::test]
async fn exhausted_retries_record_a_failure() {
    init_tracing();
    let session = session_with(fast_config(100).shut_cond(cond::failed("flaky")));
    let (body, counter) = flaky_body(10);
    add(&session, always("flaky", body).retries(1).build().unwrap());

    run_session(&session).await.unwrap();

    assert_eq!(counter.load(Ordering::SeqCst), 2);
    let record = session.task("flaky").unwrap().last_record().unwrap();
    assert_eq!(record.status, TaskStatus::Fail);
    assert_eq!(record.attempts, 2);
    assert!(record.error.unwrap().contains("attempt 2 failed"));
    assert!(session.returns().get("flaky").is_none());
}

#[tokio::test]
async fn retry_waits_for_a_free_backend_slot() {
    init_tracing();
    let session = session_with(fast_config(1_000).shut_cond(cond::failed("flaky")));
    add(
        &session,
        Task::builder("flaky", value_body(json!(null)))
            .start_cond(cond::every(Duration::from_secs(3600)))
            .execution(Execution::Thread)
            .retries(2)
            .build()
            .unwrap(),
    );

    let fake = FakeBackend::new(Execution::Thread)
        .with_outcome(RunOutcome::Failed("boom".to_string()))
        .with_capacity(1)
        .lingering(Duration::from_millis(30));
    let submissions = fake.submissions();
    let mut scheduler = Scheduler::new(session.clone());
    scheduler.backends_mut().replace(fake);

    run_scheduler(scheduler).await.unwrap();

    let submitted = submissions.lock().unwrap().clone();
    let attempts: Vec<u32> = submitted.iter().map(|s| s.attempt).collect();
    assert_eq!(attempts, vec![1, 2, 3]);
    assert!(submitted.iter().all(|s| s.in_flight == 1), "{submitted:?}");

    let history = session.task("flaky").unwrap().history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, TaskStatus::Fail);
    assert_eq!(history[0].attempts, 3);
    assert_eq!(history[0].error.as_deref(), Some("boom"));
}

#[tokio::test]
async fn downstream_task_receives_upstream_return() {
    init_tracing();
    let session = session_with(fast_config(100).shut_cond(cond::succeeded("consumer")));

    add(
        &session,
        always("producer", value_body(json!(42)))
            .start_cond(cond::every(Duration::from_secs(3600)))
            .build()
            .unwrap(),
    );
    add(
        &session,
        always(
            "consumer",
            TaskBody::sync(|ctx| Ok(ctx.args.get("value").cloned().unwrap_or_default())),
        )
        .start_cond(cond::after_success("producer"))
        .parameter("value", Argument::return_of("producer"))
        .build()
        .unwrap(),
    );

    run_session(&session).await.unwrap();

    assert_eq!(session.returns().get("consumer"), Some(json!(42)));
    assert_eq!(session.task("producer").unwrap().history().len(), 1);
    assert_eq!(session.task("consumer").unwrap().history().len(), 1);
}

#[tokio::test]
async fn unresolvable_argument_fails_before_the_body_runs() {
    init_tracing();
    let log = call_log();
    let session = session_with(fast_config(100).shut_cond(cond::failed("consumer")));

    add(
        &session,
        manual("consumer", recording_body(&log))
            .execution(Execution::Main)
            .parameter("value", Argument::return_of("nothing"))
            .build()
            .unwrap(),
    );
    session.run_task("consumer").unwrap();

    run_session(&session).await.unwrap();

    assert!(calls(&log).is_empty());
    let record = session.task("consumer").unwrap().last_record().unwrap();
    assert_eq!(record.status, TaskStatus::Fail);
    assert_eq!(record.attempts, 0);
    assert!(record.error.unwrap().contains("nothing"));
}

#[tokio::test]
async fn pending_session_parameter_leaves_other_tasks_runnable() {
    init_tracing();
    let session = Session::builder()
        .config(fast_config(100).shut_cond(cond::succeeded("plain")).build().unwrap())
        .parameter("report", Argument::return_of("never-ran"))
        .build()
        .unwrap();
    add(&session, always("plain", value_body(json!("ok"))).build().unwrap());

    run_session(&session).await.unwrap();

    let history = session.task("plain").unwrap().history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, TaskStatus::Success);
    assert_eq!(session.returns().get("plain"), Some(json!("ok")));
}

#[tokio::test]
async fn startup_and_shutdown_tasks_bracket_the_loop() {
    init_tracing();
    let log = call_log();
    let session = fast_session(0);

    add(&session, always("stop", recording_body(&log)).on_shutdown().build().unwrap());
    add(&session, always("tick", recording_body(&log)).build().unwrap());
    add(&session, always("start", recording_body(&log)).on_startup().build().unwrap());

    run_session(&session).await.unwrap();

    assert_eq!(calls(&log), vec!["start", "tick", "stop"]);
}

#[tokio::test]
async fn end_condition_terminates_a_live_run() {
    init_tracing();
    let session = fast_session(5);
    add(
        &session,
        Task::builder("held", value_body(json!(null)))
            .start_cond(Condition::True)
            .end_cond(cond::cycles_more_than(2))
            .execution(Execution::Async)
            .build()
            .unwrap(),
    );

    let fake = FakeBackend::new(Execution::Async).holding();
    let submissions = fake.submissions();
    let cancellations = fake.cancellations();
    let mut scheduler = Scheduler::new(session.clone());
    scheduler.backends_mut().replace(fake);

    run_scheduler(scheduler).await.unwrap();

    assert_eq!(submissions.lock().unwrap().len(), 1);
    assert_eq!(cancellations.lock().unwrap().clone(), vec!["held"]);
    let history = session.task("held").unwrap().history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, TaskStatus::Terminated);
    assert_eq!(history[0].error.as_deref(), Some("end condition met"));
    assert!(!history[0].timed_out);
}

#[tokio::test]
async fn terminate_request_stops_a_live_run() {
    init_tracing();
    let session = fast_session(3);
    add(
        &session,
        Task::builder("held", value_body(json!(null)))
            .start_cond(Condition::True)
            .execution(Execution::Async)
            .priority(10)
            .build()
            .unwrap(),
    );
    add(
        &session,
        always(
            "killer",
            TaskBody::sync(|ctx| {
                ctx.session.terminate_task("held")?;
                Ok(json!(null))
            }),
        )
        .start_cond(cond::running("held").and(cond::every(Duration::from_secs(3600))))
        .build()
        .unwrap(),
    );

    let fake = FakeBackend::new(Execution::Async).holding();
    let cancellations = fake.cancellations();
    let mut scheduler = Scheduler::new(session.clone());
    scheduler.backends_mut().replace(fake);

    run_scheduler(scheduler).await.unwrap();

    let history = session.task("held").unwrap().history();
    assert_eq!(history[0].status, TaskStatus::Terminated);
    assert_eq!(history[0].error.as_deref(), Some("terminated on request"));
    assert!(cancellations.lock().unwrap().len() >= 1);
    assert_eq!(session.task("killer").unwrap().history().len(), 1);
}

#[tokio::test]
async fn one_scheduler_per_session() {
    init_tracing();
    let session = fast_session(2);
    add(&session, always("tick", value_body(json!(null))).build().unwrap());

    let first = Scheduler::new(session.clone());
    let second = Scheduler::new(session.clone());
    let local = tokio::task::LocalSet::new();
    let (a, b) = with_timeout(local.run_until(async {
        tokio::join!(first.serve(), second.serve())
    }))
    .await;

    let results = [a, b];
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(TasktideError::AlreadyRunning)))
        .count();
    assert_eq!(rejected, 1);
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(!session.is_serving());
}

#[tokio::test]
async fn failing_backend_submission_records_a_crash() {
    init_tracing();
    let session =
        session_with(fast_config(100).shut_cond(cond::status("cmd", TaskStatus::Crashed)));
    add(
        &session,
        Task::builder(
            "cmd",
            TaskBody::command(CommandSpec::new("definitely-not-a-real-binary-xyz")),
        )
        .start_cond(Condition::True)
        .build()
        .unwrap(),
    );

    run_session(&session).await.unwrap();

    let record = session.task("cmd").unwrap().last_record().unwrap();
    assert_eq!(record.status, TaskStatus::Crashed);
    assert_eq!(record.attempts, 1);
}
