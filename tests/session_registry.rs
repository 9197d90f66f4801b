// tests/session_registry.rs

mod common;
use crate::common::{call_log, init_tracing, recording_body};

use std::time::Duration;

use serde_json::json;

use tasktide::config::TimeoutSetting;
use tasktide::errors::TasktideError;
use tasktide::session::{clear_default, default_session};
use tasktide::{
    CommandSpec, Config, Execution, Parameters, Registration, Session, Task, TaskBody,
    TaskPreExist, TaskStatus,
};

fn session_with_policy(policy: TaskPreExist) -> Session {
    Session::new(Config::builder().task_pre_exist(policy).build().unwrap()).unwrap()
}

fn noop(name: &str) -> Task {
    Task::builder(name, TaskBody::sync(|_| Ok(json!(null))))
        .build()
        .unwrap()
}

#[test]
fn fresh_session_is_empty() {
    let session = Session::new(Config::default()).unwrap();
    assert!(session.tasks().is_empty());
    assert!(session.parameters().is_empty());
    assert!(session.returns().is_empty());
    assert_eq!(session.stats().cycles, 0);
    assert!(session.env().is_none());
}

#[test]
fn duplicate_name_under_raise_fails() {
    init_tracing();
    let session = session_with_policy(TaskPreExist::Raise);

    session.register(noop("report")).unwrap();
    let err = session.register(noop("report")).unwrap_err();

    assert!(matches!(err, TasktideError::TaskExists(ref name) if name == "report"));
    assert_eq!(session.task_names(), vec!["report"]);
}

#[test]
fn duplicate_name_under_ignore_keeps_original() {
    let session = session_with_policy(TaskPreExist::Ignore);

    let first = Task::builder("report", TaskBody::sync(|_| Ok(json!(1))))
        .priority(7)
        .build()
        .unwrap();
    session.register(first).unwrap();

    let outcome = session.register(noop("report")).unwrap();
    assert_eq!(outcome, Registration::Ignored("report".to_string()));
    assert_eq!(session.tasks().len(), 1);
    assert_eq!(session.task("report").unwrap().priority(), 7);
}

#[test]
fn duplicate_name_under_rename_keeps_both() {
    let session = session_with_policy(TaskPreExist::Rename);

    session.register(noop("report")).unwrap();
    let second = session.register(noop("report")).unwrap();
    let third = session.register(noop("report")).unwrap();

    assert_eq!(
        second,
        Registration::Renamed {
            requested: "report".to_string(),
            assigned: "report-1".to_string(),
        }
    );
    assert_eq!(third.name(), "report-2");
    assert_eq!(session.task_names(), vec!["report", "report-1", "report-2"]);
}

#[test]
fn registration_fills_defaults_from_config() {
    let config = Config::builder()
        .task_priority(4)
        .timeout("10s")
        .max_instances(3)
        .build()
        .unwrap();
    let session = Session::new(config).unwrap();

    session.register(noop("plain")).unwrap();
    let explicit = Task::builder("explicit", TaskBody::sync(|_| Ok(json!(null))))
        .priority(-1)
        .timeout(Duration::from_secs(1))
        .build()
        .unwrap();
    session.register(explicit).unwrap();

    let plain = session.task("plain").unwrap();
    assert_eq!(plain.priority(), 4);
    assert_eq!(plain.timeout(), TimeoutSetting::After(Duration::from_secs(10)));
    assert_eq!(plain.max_instances(), 3);
    assert_eq!(plain.execution(), Execution::Async);
    assert_eq!(plain.status(), TaskStatus::Inactive);

    let explicit = session.task("explicit").unwrap();
    assert_eq!(explicit.priority(), -1);
    assert_eq!(explicit.timeout(), TimeoutSetting::After(Duration::from_secs(1)));
}

#[test]
fn body_kind_picks_a_compatible_execution() {
    let session = Session::new(Config::builder().task_execution(Execution::Thread).build().unwrap())
        .unwrap();

    let cmd = Task::builder("cmd", TaskBody::command(CommandSpec::shell("true")))
        .build()
        .unwrap();
    let fut = Task::builder("fut", TaskBody::future(|_| async { Ok(json!(null)) }))
        .build()
        .unwrap();
    session.register(cmd).unwrap();
    session.register(fut).unwrap();

    assert_eq!(session.task("cmd").unwrap().execution(), Execution::Process);
    assert_eq!(session.task("fut").unwrap().execution(), Execution::Async);
}

#[test]
fn explicit_incompatible_execution_is_rejected() {
    let err = Task::builder("cmd", TaskBody::command(CommandSpec::new("true")))
        .execution(Execution::Thread)
        .build()
        .unwrap_err();
    assert!(matches!(err, TasktideError::Registration(_)));
}

#[test]
fn options_bag_is_validated() {
    let options = json!({
        "execution": "main",
        "priority": 5,
        "timeout": 2.5,
        "retries": 2,
        "parameters": { "limit": 10 },
    });
    let task = Task::builder("opts", TaskBody::sync(|_| Ok(json!(null))))
        .options(options.as_object().unwrap().clone())
        .priority(6)
        .build()
        .unwrap();

    assert_eq!(task.execution(), Execution::Main);
    // Explicit setter wins over the bag.
    assert_eq!(task.priority(), 6);
    assert_eq!(task.timeout(), TimeoutSetting::After(Duration::from_millis(2500)));
    assert_eq!(task.retries(), 2);
    assert_eq!(
        task.parameters(),
        &Parameters::from_values([("limit", json!(10))])
    );

    let bad = json!({ "retry": 2 });
    let err = Task::builder("bad", TaskBody::sync(|_| Ok(json!(null))))
        .options(bad.as_object().unwrap().clone())
        .build()
        .unwrap_err();
    assert!(matches!(err, TasktideError::Config(ref msg) if msg.contains("retry")));
}

#[test]
fn invalid_task_definitions_fail() {
    let err = Task::builder("", TaskBody::sync(|_| Ok(json!(null)))).build().unwrap_err();
    assert!(matches!(err, TasktideError::Config(_)));

    let err = Task::builder("x", TaskBody::sync(|_| Ok(json!(null))))
        .max_instances(0)
        .build()
        .unwrap_err();
    assert!(matches!(err, TasktideError::Config(_)));

    let err = Task::builder("x", TaskBody::sync(|_| Ok(json!(null))))
        .on_startup()
        .on_shutdown()
        .build()
        .unwrap_err();
    assert!(matches!(err, TasktideError::Config(_)));
}

#[test]
fn unknown_task_operations_report_not_found() {
    let session = Session::new(Config::default()).unwrap();
    assert!(matches!(session.run_task("ghost"), Err(TasktideError::TaskNotFound(_))));
    assert!(matches!(session.terminate_task("ghost"), Err(TasktideError::TaskNotFound(_))));
    assert!(matches!(session.remove_task("ghost"), Err(TasktideError::TaskNotFound(_))));
}

#[test]
fn remove_task_drops_it_from_the_registry() {
    let log = call_log();
    let session = Session::new(Config::default()).unwrap();
    session
        .register(Task::builder("gone", recording_body(&log)).build().unwrap())
        .unwrap();

    let removed = session.remove_task("gone").unwrap();
    assert_eq!(removed.name(), "gone");
    assert!(session.task("gone").is_none());
}

#[test]
fn session_carries_env_and_parameters() {
    let session = Session::builder()
        .config(Config::default())
        .env("staging")
        .parameter("region", json!("eu"))
        .parameters_value(json!({ "retries": 3 }))
        .unwrap()
        .build()
        .unwrap();

    assert_eq!(session.env(), Some("staging"));
    assert_eq!(session.parameters().len(), 2);
    assert_eq!(
        session.parameters().to_map().get("region"),
        Some(&json!("eu"))
    );

    let err = Session::builder().parameters_value(json!([1, 2])).unwrap_err();
    assert!(matches!(err, TasktideError::Type(_)));
}

// The default slot is process-wide, so all of its checks live in one test.
#[test]
fn default_session_slot_is_replaceable() {
    clear_default();
    assert!(default_session().is_none());
    assert!(matches!(Session::current(), Err(TasktideError::NoDefaultSession)));
    assert!(matches!(
        tasktide::Scheduler::from_default(),
        Err(TasktideError::NoDefaultSession)
    ));

    let first = Session::new(Config::default()).unwrap();
    let second = Session::new(Config::default()).unwrap();

    assert!(first.set_as_default().is_none());
    assert!(first.is_default());

    let replaced = second.set_as_default().unwrap();
    assert!(Session::ptr_eq(&replaced, &first));
    assert!(second.is_default());
    assert!(!first.is_default());
    assert!(Session::ptr_eq(&Session::current().unwrap(), &second));
    assert!(tasktide::Scheduler::from_default().is_ok());

    let cleared = clear_default().unwrap();
    assert!(Session::ptr_eq(&cleared, &second));
    assert!(default_session().is_none());
}
