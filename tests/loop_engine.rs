// tests/loop_engine.rs
mod common;
use crate::common::{TestWorld, init_tracing, record, record_exclusive};

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use tickdag::{
    EngineOptions, ErrorPolicy, Loop, ManualClock, Schedules, SystemContext, SystemDescriptor,
    SystemRef, TickdagError,
};

fn track() -> EngineOptions {
    EngineOptions::with_policy(ErrorPolicy::Track)
}

#[test]
fn run_condition_is_evaluated_every_tick() {
    init_tracing();
    let evaluations = Rc::new(Cell::new(0u32));
    let seen = Rc::clone(&evaluations);

    let mut engine = Loop::<TestWorld>::new(track());
    engine.schedule_system(record("gated").run_if(move |_| {
        seen.set(seen.get() + 1);
        seen.get() >= 3
    }));

    let mut world = TestWorld::new();
    engine.step("default", &mut world, None).unwrap();
    engine.step("default", &mut world, None).unwrap();
    assert_eq!(world.count("gated"), 0);
    assert_eq!(evaluations.get(), 2);

    engine.step("default", &mut world, None).unwrap();
    assert!(world.count("gated") >= 1);
    assert_eq!(evaluations.get(), 3);
}

#[test]
fn run_condition_reads_the_external_context() {
    let mut engine = Loop::<TestWorld>::new(track());
    engine.schedule_system(record("a").run_if(|w: &TestWorld| w.gate.get()));
    let mut world = TestWorld::new();

    let report = engine.step("default", &mut world, None).unwrap();
    assert_eq!(report.skipped, 1);

    world.gate.set(true);
    let report = engine.step("default", &mut world, None).unwrap();
    assert_eq!(report.invoked.len(), 1);
    assert_eq!(world.log(), vec!["a"]);
}

#[test]
fn evicted_entries_never_run_again() {
    let mut engine = Loop::<TestWorld>::new(track());
    let a = engine.schedule_system(record("a"));
    engine.schedule_system(record("b"));
    let mut world = TestWorld::new();

    engine.step("default", &mut world, None).unwrap();
    engine.evict_system(a).unwrap();
    engine.step("default", &mut world, None).unwrap();

    assert_eq!(world.log(), vec!["a", "b", "b"]);
    assert!(engine.handle_of("loop::a::1").is_none());
    assert!(engine.storage(a).is_none());
}

fn counter_system(tag: &'static str, step: u32) -> SystemDescriptor<TestWorld> {
    SystemDescriptor::new(move |w: &TestWorld, cx: &mut SystemContext<'_>| {
        w.push(tag);
        let count = cx.storage().get_or_insert_with("count", || 0u32);
        *count += step;
        Ok(())
    })
    .identified_as(SystemRef::named(tag))
    .named(tag)
}

#[test]
fn replace_runs_new_callable_and_keeps_storage() {
    let mut engine = Loop::<TestWorld>::new(track());
    let handle = engine.schedule_system(counter_system("old", 1));
    let mut world = TestWorld::new();

    engine.step("default", &mut world, None).unwrap();
    engine.step("default", &mut world, None).unwrap();
    assert_eq!(engine.storage(handle).unwrap().get::<u32>("count"), Some(&2));

    engine.replace_system(handle, counter_system("new", 10)).unwrap();
    engine.step("default", &mut world, None).unwrap();

    assert_eq!(world.log(), vec!["old", "old", "new"]);
    assert_eq!(engine.storage(handle).unwrap().get::<u32>("count"), Some(&12));
    assert_eq!(engine.entry(handle).unwrap().id(), "loop::old::1");
}

#[test]
fn replace_keeps_disabled_flag_and_resets_once() {
    let mut engine = Loop::<TestWorld>::new(track());
    let once = engine.schedule_system(record("first").once());
    let off = engine.schedule_system(record("off"));
    engine.set_enabled(off, false).unwrap();
    let mut world = TestWorld::new();

    engine.step("default", &mut world, None).unwrap();
    engine.step("default", &mut world, None).unwrap();
    assert_eq!(world.log(), vec!["first"]);

    engine.replace_system(once, record("second").once()).unwrap();
    engine.replace_system(off, record("still_off")).unwrap();
    engine.step("default", &mut world, None).unwrap();
    engine.step("default", &mut world, None).unwrap();

    assert_eq!(world.log(), vec!["first", "second"]);
    assert!(!engine.entry(off).unwrap().is_enabled());
}

#[test]
fn state_gate_follows_engine_state() {
    let mut engine = Loop::<TestWorld>::new(track());
    engine.schedule_system(record("menu").in_state("menu"));
    engine.schedule_system(record("play").in_state("playing"));
    engine.schedule_system(record("always"));
    let mut world = TestWorld::new();

    engine.step("default", &mut world, None).unwrap();
    engine.set_state("menu");
    engine.step("default", &mut world, None).unwrap();
    engine.set_state("playing");
    engine.step("default", &mut world, None).unwrap();
    engine.clear_state();
    engine.step("default", &mut world, None).unwrap();

    assert_eq!(
        world.log(),
        vec!["always", "menu", "always", "play", "always", "always"]
    );
}

#[test]
fn exclusive_systems_get_mutable_context() {
    let mut engine = Loop::<TestWorld>::new(track());
    engine.schedule_system(record_exclusive("writer"));
    engine.schedule_system(record("reader"));
    let mut world = TestWorld::new();

    engine.step("default", &mut world, None).unwrap();
    engine.step("default", &mut world, None).unwrap();
    assert_eq!(world.writes, 2);
    assert_eq!(world.log(), vec!["writer", "reader", "writer", "reader"]);
}

#[test]
fn context_exposes_tick_generation_and_elapsed() {
    let clock = ManualClock::new();
    let mut engine = Loop::<TestWorld>::with_clock(track(), clock.clone());
    let handle = engine.schedule_system(
        SystemDescriptor::new(|_: &TestWorld, cx: &mut SystemContext<'_>| {
            let sample = (cx.tick(), cx.generation(), cx.delta(), cx.channel().to_string());
            cx.storage()
                .get_or_insert_with("samples", Vec::new)
                .push(sample);
            Ok(())
        })
        .on_event("frame"),
    );
    let mut world = TestWorld::new();

    engine.step("frame", &mut world, None).unwrap();
    clock.advance(Duration::from_millis(16));
    engine.step("frame", &mut world, None).unwrap();
    clock.advance(Duration::from_millis(16));
    engine
        .step("frame", &mut world, Some(Duration::from_millis(100)))
        .unwrap();

    let samples = engine
        .storage(handle)
        .unwrap()
        .get::<Vec<(u64, bool, Duration, String)>>("samples")
        .unwrap();
    let frame = "frame".to_string();
    assert_eq!(
        samples,
        &vec![
            (1, true, Duration::ZERO, frame.clone()),
            (2, false, Duration::from_millis(16), frame.clone()),
            (3, true, Duration::from_millis(100), frame),
        ]
    );
}

#[test]
fn channels_are_independent() {
    let mut schedules = Schedules::with_engine(Loop::<TestWorld>::new(track()));
    schedules.add_system("update", record("u")).unwrap();
    schedules.add_system("update", record("fixed").on_event("fixed")).unwrap();
    schedules.add_system("render", record("r")).unwrap();
    let mut world = TestWorld::new();

    schedules.step("fixed", &mut world, None).unwrap();
    schedules.step("fixed", &mut world, None).unwrap();
    schedules.step("render", &mut world, None).unwrap();

    assert_eq!(world.log(), vec!["fixed", "fixed", "r"]);
    let engine = schedules.engine();
    assert_eq!(engine.ticks("fixed"), Some(2));
    assert_eq!(engine.ticks("update"), Some(0));
    assert_eq!(engine.entries_in("update").len(), 1);
}

#[test]
fn compiled_order_is_the_channel_order() {
    let mut schedules = Schedules::with_engine(Loop::<TestWorld>::new(track()));
    schedules.add_system("update", record("c").after(SystemRef::named("b"))).unwrap();
    schedules.add_system("update", record("b").after(SystemRef::named("a"))).unwrap();
    schedules.add_system("update", record("a")).unwrap();
    let mut world = TestWorld::new();

    schedules.step("update", &mut world, None).unwrap();
    assert_eq!(world.log(), vec!["a", "b", "c"]);
}

#[test]
fn lifecycle_on_unknown_handle_is_a_usage_error() {
    let mut engine = Loop::<TestWorld>::new(track());
    let handle = engine.schedule_system(record("a"));
    engine.clear();

    assert!(matches!(
        engine.set_enabled(handle, false),
        Err(TickdagError::UnknownEntry(_))
    ));
    assert_eq!(engine.channels().count(), 0);
}

#[test]
fn schedule_systems_appends_a_batch_in_order() {
    let mut engine = Loop::<TestWorld>::new(track());
    engine.schedule_system(record("first"));
    let handles = engine.schedule_systems([
        record("second"),
        record("late").on_event("late"),
        record("third"),
    ]);

    assert_eq!(handles.len(), 3);
    let ids: Vec<_> = handles
        .iter()
        .map(|&h| engine.entry(h).unwrap().id().to_string())
        .collect();
    assert_eq!(ids, vec!["loop::second::2", "loop::late::3", "loop::third::4"]);
    assert_eq!(engine.entries_in("default").len(), 3);
    assert_eq!(engine.entries_in("late"), [handles[1]]);

    let mut world = TestWorld::new();
    engine.step("default", &mut world, None).unwrap();
    assert_eq!(world.log(), vec!["first", "second", "third"]);
}
