// tests/error_policy.rs
mod common;
use crate::common::{TestWorld, init_tracing, record};

use tickdag::errors::ErrorKind;
use tickdag::{
    EngineOptions, ErrorPolicy, Loop, SystemContext, SystemDescriptor, SystemRef, SystemResult,
    TickdagError,
};

fn failing(tag: &'static str) -> SystemDescriptor<TestWorld> {
    SystemDescriptor::new(move |w: &TestWorld, _: &mut SystemContext<'_>| -> SystemResult {
        w.push(tag);
        anyhow::bail!("{tag} is broken")
    })
    .identified_as(SystemRef::named(tag))
    .named(tag)
}

fn panicking(tag: &'static str) -> SystemDescriptor<TestWorld> {
    SystemDescriptor::new(move |_: &TestWorld, _: &mut SystemContext<'_>| -> SystemResult {
        panic!("{tag} exploded")
    })
    .identified_as(SystemRef::named(tag))
    .named(tag)
}

fn engine(policy: ErrorPolicy) -> Loop<TestWorld> {
    let mut engine = Loop::new(EngineOptions::with_policy(policy));
    engine.schedule_system(record("before"));
    engine.schedule_system(failing("bad"));
    engine.schedule_system(panicking("boom"));
    engine.schedule_system(record("after"));
    engine
}

#[test]
fn track_records_and_keeps_going() {
    init_tracing();
    let mut engine = engine(ErrorPolicy::Track);
    let mut world = TestWorld::new();

    let report = engine.step("default", &mut world, None).unwrap();

    assert_eq!(world.log(), vec!["before", "bad", "after"]);
    assert_eq!(report.invoked.len(), 4);
    assert_eq!(report.failures.len(), 2);
    assert!(!report.failures[0].panicked);
    assert!(report.failures[1].panicked);
    assert!(report.failures[1].message.contains("boom exploded"));

    let bad = engine.handle_of("loop::bad::2").unwrap();
    assert_eq!(engine.errors(bad).unwrap().len(), 1);
}

#[test]
fn throw_finishes_the_tick_then_reports_every_failure() {
    let mut engine = engine(ErrorPolicy::Throw);
    let mut world = TestWorld::new();

    let err = engine.step("default", &mut world, None).unwrap_err();

    assert_eq!(world.log(), vec!["before", "bad", "after"]);
    assert_eq!(err.kind(), ErrorKind::Invocation);
    match err {
        TickdagError::SystemsFailed { channel, failures } => {
            assert_eq!(channel, "default");
            let ids: Vec<_> = failures.iter().map(|f| f.system.as_str()).collect();
            assert_eq!(ids, vec!["loop::bad::2", "loop::boom::3"]);
        }
        other => panic!("expected SystemsFailed, got {other:?}"),
    }

    let boom = engine.handle_of("loop::boom::3").unwrap();
    assert!(engine.errors(boom).unwrap().latest().unwrap().panicked);

    // The next tick runs normally.
    assert!(engine.step("default", &mut world, None).is_err());
    assert_eq!(world.count("after"), 2);
}

#[test]
fn silent_drops_failures() {
    let mut engine = engine(ErrorPolicy::Silent);
    let mut world = TestWorld::new();

    let report = engine.step("default", &mut world, None).unwrap();

    assert!(report.failures.is_empty());
    assert_eq!(world.log(), vec!["before", "bad", "after"]);
    let bad = engine.handle_of("loop::bad::2").unwrap();
    assert!(engine.errors(bad).unwrap().is_empty());
}

#[test]
fn error_history_deduplicates_and_is_capped() {
    let mut engine = Loop::<TestWorld>::new(EngineOptions {
        error_history: 2,
        ..EngineOptions::with_policy(ErrorPolicy::Track)
    });
    let handle = engine.schedule_system(SystemDescriptor::new(
        |_: &TestWorld, cx: &mut SystemContext<'_>| -> SystemResult {
            // Ticks 1-3 repeat one message, then every tick is distinct.
            if cx.tick() <= 3 {
                anyhow::bail!("warming up");
            }
            anyhow::bail!("tick {} failed", cx.tick())
        },
    ));
    let mut world = TestWorld::new();
    for _ in 0..3 {
        engine.step("default", &mut world, None).unwrap();
    }

    let history = engine.errors(handle).unwrap();
    assert_eq!(history.len(), 1);
    let record = history.latest().unwrap();
    assert_eq!((record.occurrences, record.first_tick, record.last_tick), (3, 1, 3));

    for _ in 0..3 {
        engine.step("default", &mut world, None).unwrap();
    }
    let messages: Vec<_> = engine
        .errors(handle)
        .unwrap()
        .iter()
        .map(|r| r.message.clone())
        .collect();
    assert_eq!(messages, vec!["tick 5 failed", "tick 6 failed"]);
}

#[test]
fn profiling_ring_keeps_the_last_window() {
    let mut engine = Loop::<TestWorld>::new(EngineOptions::with_policy(ErrorPolicy::Track));
    let handle = engine.schedule_system(record("a"));
    let mut world = TestWorld::new();

    for _ in 0..75 {
        engine.step("default", &mut world, None).unwrap();
    }

    let profile = engine.profile(handle).unwrap();
    assert_eq!(profile.samples, 60);
    assert!(profile.max >= profile.average);
    assert!(profile.last.is_some());

    let entry = engine.entry(handle).unwrap();
    assert_eq!(entry.system().borrow().stats().runs, 75);
}
