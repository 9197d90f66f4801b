// tests/config_behaviour.rs

mod common;
use crate::common::init_tracing;

use std::io::Write;
use std::time::Duration;

use serde_json::json;
use tempfile::NamedTempFile;

use tasktide::config::{Config, ConfigInput, DurationInput, TimeoutSetting, load_and_validate};
use tasktide::errors::TasktideError;
use tasktide::{Execution, Session, TaskPreExist, TaskStatus, Warning};

fn mapping(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
    value.as_object().expect("object literal").clone()
}

#[test]
fn equal_durations_normalise_identically_across_spellings() {
    let spellings: Vec<DurationInput> = vec![
        0.1_f64.into(),
        "0.1 seconds".into(),
        "0.1s".into(),
        "100ms".into(),
        "0.1".into(),
        Duration::from_millis(100).into(),
    ];

    for input in &spellings {
        let config = Config::builder().timeout(input.clone()).build().unwrap();
        assert_eq!(
            config.timeout(),
            TimeoutSetting::After(Duration::from_millis(100)),
            "spelling {input:?}"
        );
    }

    let compound = DurationInput::from("1h 30m").to_duration().unwrap();
    assert_eq!(compound, DurationInput::from(5400u64).to_duration().unwrap());
    assert_eq!(compound, Duration::from_secs(90 * 60));
}

#[test]
fn mapping_config_is_validated() {
    init_tracing();

    let config = Config::from_mapping(mapping(json!({
        "task_execution": "thread",
        "task_priority": 3,
        "timeout": "2 minutes",
        "task_pre_exist": "rename",
        "cycle_sleep": 0.5,
    })))
    .unwrap();

    assert_eq!(config.task_execution(), Execution::Thread);
    assert_eq!(config.task_priority(), 3);
    assert_eq!(config.timeout(), TimeoutSetting::After(Duration::from_secs(120)));
    assert_eq!(config.task_pre_exist(), TaskPreExist::Rename);
    assert_eq!(config.cycle_sleep(), Duration::from_millis(500));
    assert_eq!(config.shutdown_grace(), Duration::from_secs(5));
}

#[test]
fn defaults_match_documented_values() {
    let config = Config::default();
    assert_eq!(config.task_execution(), Execution::Async);
    assert_eq!(config.task_priority(), 0);
    assert_eq!(config.timeout(), TimeoutSetting::After(Duration::from_secs(1800)));
    assert_eq!(config.task_pre_exist(), TaskPreExist::Raise);
    assert_eq!(config.max_instances(), 1);
    assert!(!config.silence_task_prerun());
    assert!(!config.instant_shutdown());
    assert_eq!(config.shut_cond().to_string(), "false");
}

#[test]
fn enum_defaults() {
    assert_eq!(Execution::default(), Execution::Async);
    assert_eq!(TaskPreExist::default(), TaskPreExist::Raise);
    assert_eq!(TaskStatus::default(), TaskStatus::Inactive);
}

#[test]
fn unknown_option_fails_construction() {
    let err = Config::from_mapping(mapping(json!({ "task_exectuion": "async" }))).unwrap_err();
    match err {
        TasktideError::Config(msg) => assert!(msg.contains("task_exectuion"), "{msg}"),
        other => panic!("expected Config error, got {other:?}"),
    }
}

#[test]
fn invalid_values_fail_construction() {
    let err = Config::builder().max_instances(0).build().unwrap_err();
    assert!(matches!(err, TasktideError::Config(ref msg) if msg.contains("max_instances")));

    let err = Config::builder().timeout(-1.0_f64).build().unwrap_err();
    assert!(matches!(err, TasktideError::Config(ref msg) if msg.starts_with("timeout")));

    let err = Config::builder().cycle_sleep("soon").build().unwrap_err();
    assert!(matches!(err, TasktideError::Config(ref msg) if msg.contains("cycle_sleep")));
}

#[test]
fn timeout_can_be_disabled() {
    let config = Config::builder().timeout("never").build().unwrap();
    assert_eq!(config.timeout(), TimeoutSetting::Never);
}

#[test]
fn string_config_is_a_type_error() {
    let err = ConfigInput::try_from(json!("fast")).unwrap_err();
    assert!(matches!(err, TasktideError::Type(_)));

    let err = Session::builder().config_value(json!(42)).unwrap_err();
    assert!(matches!(err, TasktideError::Type(_)));
}

#[test]
fn absent_config_is_accepted_with_a_deprecation_warning() {
    init_tracing();

    let session = Session::new(ConfigInput::Absent).unwrap();
    assert!(matches!(
        session.warnings().as_slice(),
        [Warning::DeprecatedConstruction(_)]
    ));
    assert_eq!(session.config().task_execution(), Execution::Async);

    let session = Session::builder().config_value(json!(null)).unwrap().build().unwrap();
    assert_eq!(session.warnings().len(), 1);

    let session = Session::new(Config::default()).unwrap();
    assert!(session.warnings().is_empty());
}

#[test]
fn loads_config_from_toml_file() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
task_execution = "main"
timeout = "45s"
max_thread_count = 2
silence_cond_check = true
"#
    )
    .unwrap();

    let config = load_and_validate(file.path()).unwrap();
    assert_eq!(config.task_execution(), Execution::Main);
    assert_eq!(config.timeout(), TimeoutSetting::After(Duration::from_secs(45)));
    assert_eq!(config.max_thread_count(), 2);
    assert!(config.silence_cond_check());

    let session = tasktide::session_from_path(file.path()).unwrap();
    assert_eq!(session.config().task_execution(), Execution::Main);
}

#[test]
fn toml_file_with_unknown_key_is_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "bogus = 1").unwrap();

    let err = load_and_validate(file.path()).unwrap_err();
    assert!(matches!(err, TasktideError::Toml(_)), "{err:?}");
}
