// tests/conditions.rs

mod common;
use crate::common::{init_tracing, manual, value_body};

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::anyhow;
use chrono::{DateTime, Local, TimeZone, Weekday};
use serde_json::json;

use tasktide::cond::{self, CondContext, Condition, check};
use tasktide::{Config, Session, TaskStatus};

fn session() -> Session {
    Session::new(Config::default()).unwrap()
}

fn at(hour: u32, min: u32) -> DateTime<Local> {
    // 2024-01-01 is a Monday.
    Local.with_ymd_and_hms(2024, 1, 1, hour, min, 0).unwrap()
}

fn counting(name: &str, result: bool) -> (Condition, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let cond = cond::func(name, move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(result)
    });
    (cond, calls)
}

#[test]
fn canonical_forms_are_stable() {
    let cond = Condition::True.and(cond::not(cond::after_success("a")));
    assert_eq!(cond.canonical(), "(true & ~after_success('a'))");

    assert_eq!(cond::every(Duration::from_secs(10)).to_string(), "every(10s)");
    assert_eq!(
        cond::every_for("sync", Duration::from_secs(7200)).to_string(),
        "every(2h, task='sync')"
    );
    assert_eq!(
        cond::status_within("a", TaskStatus::Fail, Duration::from_secs(60)).to_string(),
        "status('a', fail, within=1m)"
    );
    assert_eq!(cond::cycles_more_than(3).to_string(), "scheduler_cycles(>3)");
    assert_eq!(
        cond::param_equals("mode", "fast").to_string(),
        "param_exists('mode'=\"fast\")"
    );
    assert_eq!(cond::all([]).to_string(), "true");
    assert_eq!(cond::any([]).to_string(), "false");
    assert_eq!(
        cond::time_of_day("22:00", "06:00").unwrap().to_string(),
        "time_of_day(22:00:00-06:00:00)"
    );
}

#[test]
fn equality_follows_canonical_form() {
    let built = Condition::True.and(cond::after_fail("x"));
    let listed = cond::all([Condition::True, cond::after_fail("x")]);
    assert_eq!(built, listed);

    let chained = cond::succeeded("a").or(cond::failed("a")).or(Condition::False);
    let flat = cond::any([cond::succeeded("a"), cond::failed("a"), Condition::False]);
    assert_eq!(chained, flat);

    assert_ne!(cond::after_success("x"), cond::after_finish("x"));
}

#[test]
fn composites_short_circuit_left_to_right() {
    let session = session();
    let ctx = CondContext::new(&session);

    let (probe, calls) = counting("probe", true);
    assert!(!cond::all([Condition::False, probe]).evaluate(&ctx).unwrap());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let (probe, calls) = counting("probe", false);
    assert!(cond::any([Condition::True, probe]).evaluate(&ctx).unwrap());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let (probe, calls) = counting("probe", true);
    assert!(cond::all([Condition::True, probe]).evaluate(&ctx).unwrap());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn failing_leaf_makes_the_whole_tree_false() {
    init_tracing();
    let session = session();
    let ctx = CondContext::new(&session);

    let broken = cond::func("broken", |_| Err(anyhow!("backend unreachable")));
    let tree = cond::any([broken, Condition::True]);

    let err = tree.evaluate(&ctx).unwrap_err();
    assert!(format!("{err:#}").contains("backend unreachable"));
    assert!(!check(&tree, &ctx));

    // A negated error is still false, not true.
    let negated = cond::not(cond::func("broken", |_| Err(anyhow!("nope"))));
    assert!(!check(&negated, &ctx));
}

#[test]
fn unknown_task_reference_is_an_error() {
    let session = session();
    let ctx = CondContext::new(&session);

    assert!(cond::succeeded("ghost").evaluate(&ctx).is_err());
    assert!(cond::every_for("ghost", Duration::from_secs(1)).evaluate(&ctx).is_err());
    assert!(!check(&cond::succeeded("ghost"), &ctx));
}

#[test]
fn every_needs_a_task_and_fires_when_never_started() {
    let session = session();
    session.register(manual("poll", value_body(json!(null))).build().unwrap()).unwrap();

    let period = cond::every(Duration::from_secs(10));
    assert!(period.evaluate(&CondContext::new(&session)).is_err());
    assert!(period.evaluate(&CondContext::for_task(&session, "poll")).unwrap());
}

#[test]
fn time_of_day_windows() {
    let session = session();
    let ctx = CondContext::new(&session);

    let office = cond::time_of_day("09:00", "17:00").unwrap();
    assert!(office.evaluate(&ctx.at(at(10, 0))).unwrap());
    assert!(office.evaluate(&ctx.at(at(9, 0))).unwrap());
    assert!(!office.evaluate(&ctx.at(at(17, 0))).unwrap());
    assert!(!office.evaluate(&ctx.at(at(8, 59))).unwrap());

    let night = cond::time_of_day("22:00", "06:00").unwrap();
    assert!(night.evaluate(&ctx.at(at(23, 30))).unwrap());
    assert!(night.evaluate(&ctx.at(at(5, 0))).unwrap());
    assert!(!night.evaluate(&ctx.at(at(12, 0))).unwrap());

    let whole_day = cond::time_of_day("08:00", "08:00").unwrap();
    assert!(whole_day.evaluate(&ctx.at(at(3, 0))).unwrap());

    assert!(cond::time_of_day("25:00", "08:00").is_err());
}

#[test]
fn day_of_week_matches_local_weekday() {
    let session = session();
    let ctx = CondContext::new(&session).at(at(12, 0));

    assert!(cond::on_days([Weekday::Mon, Weekday::Fri]).evaluate(&ctx).unwrap());
    assert!(!cond::on_days([Weekday::Sat, Weekday::Sun]).evaluate(&ctx).unwrap());
}

#[test]
fn parameter_conditions_read_the_session_store() {
    let session = Session::builder()
        .config(Config::default())
        .parameter("mode", json!("fast"))
        .build()
        .unwrap();
    let ctx = CondContext::new(&session);

    assert!(cond::param_exists("mode").evaluate(&ctx).unwrap());
    assert!(!cond::param_exists("other").evaluate(&ctx).unwrap());
    assert!(cond::param_equals("mode", "fast").evaluate(&ctx).unwrap());
    assert!(!cond::param_equals("mode", "slow").evaluate(&ctx).unwrap());

    session.parameters().set("other", json!(1));
    assert!(cond::param_exists("other").evaluate(&ctx).unwrap());
}

#[test]
fn status_of_a_fresh_task() {
    let session = session();
    session.register(manual("idle", value_body(json!(null))).build().unwrap()).unwrap();
    session.register(manual("downstream", value_body(json!(null))).build().unwrap()).unwrap();

    let ctx = CondContext::for_task(&session, "downstream");
    assert!(cond::status("idle", TaskStatus::Inactive).evaluate(&ctx).unwrap());
    assert!(!cond::running("idle").evaluate(&ctx).unwrap());
    assert!(!cond::succeeded("idle").evaluate(&ctx).unwrap());
    assert!(!cond::after_success("idle").evaluate(&ctx).unwrap());
}

#[test]
fn scheduler_conditions_on_an_idle_session() {
    let session = session();
    let ctx = CondContext::new(&session);

    assert!(!cond::cycles_more_than(0).evaluate(&ctx).unwrap());
    assert!(
        !cond::running_longer_than(Duration::ZERO)
            .evaluate(&ctx)
            .unwrap()
    );
}
