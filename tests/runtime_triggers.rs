// tests/runtime_triggers.rs
mod common;
use crate::common::{TestWorld, init_tracing, record, with_timeout};

use std::time::Duration;

use tickdag::engine::{ChannelSource, IntervalSource, TriggerSource};
use tickdag::{
    EngineOptions, ErrorPolicy, Schedules, SystemContext, SystemDescriptor, SystemRef,
    SystemResult,
};

fn source(s: impl TriggerSource) -> Box<dyn TriggerSource> {
    Box::new(s)
}

#[tokio::test]
async fn channel_sources_drive_their_channels_until_closed() {
    with_timeout(async {
        init_tracing();
        let mut schedules = Schedules::<TestWorld>::new(EngineOptions::default());
        schedules.add_system("update", record("u")).unwrap();
        schedules.add_system("render", record("r")).unwrap();

        let (update_tx, update_src) = ChannelSource::pair(8);
        let (render_tx, render_src) = ChannelSource::pair(8);
        let subs = schedules
            .begin([
                ("update".to_string(), source(update_src)),
                ("render".to_string(), source(render_src)),
            ])
            .unwrap();
        assert_eq!(subs.len(), 2);

        for _ in 0..3 {
            update_tx.send(None).await.unwrap();
        }
        render_tx.send(None).await.unwrap();
        drop(update_tx);
        drop(render_tx);

        let mut world = TestWorld::new();
        let summary = schedules.run(&mut world).await.unwrap();

        assert_eq!(summary.ticks, 4);
        assert_eq!(world.count("u"), 3);
        assert_eq!(world.count("r"), 1);
        schedules.stop(subs);
    })
    .await;
}

#[tokio::test]
async fn pushed_elapsed_overrides_reach_systems() {
    with_timeout(async {
        let mut schedules = Schedules::<TestWorld>::new(EngineOptions::default());
        let id = schedules
            .add_system(
                "physics",
                SystemDescriptor::new(|_: &TestWorld, cx: &mut SystemContext<'_>| -> SystemResult {
                    let delta = cx.delta();
                    cx.storage()
                        .get_or_insert_with("deltas", Vec::<Duration>::new)
                        .push(delta);
                    Ok(())
                })
                .identified_as(SystemRef::named("integrate")),
            )
            .unwrap();

        let (tx, src) = ChannelSource::pair(4);
        let subs = schedules.begin([("physics".to_string(), source(src))]).unwrap();
        tx.send(Some(Duration::from_millis(8))).await.unwrap();
        tx.send(Some(Duration::from_millis(4))).await.unwrap();
        drop(tx);

        let mut world = TestWorld::new();
        schedules.run(&mut world).await.unwrap();
        schedules.stop(subs);

        let engine = schedules.engine();
        let handle = engine.handle_of(&id).unwrap();
        let deltas = engine
            .storage(handle)
            .unwrap()
            .get::<Vec<Duration>>("deltas")
            .unwrap();
        assert_eq!(deltas, &vec![Duration::from_millis(8), Duration::from_millis(4)]);
    })
    .await;
}

#[tokio::test]
async fn thrown_failures_do_not_stop_the_run() {
    with_timeout(async {
        let mut schedules = Schedules::<TestWorld>::new(EngineOptions::with_policy(ErrorPolicy::Throw));
        schedules
            .add_system(
                "update",
                SystemDescriptor::new(|_: &TestWorld, _: &mut SystemContext<'_>| -> SystemResult {
                    anyhow::bail!("always fails")
                })
                .identified_as(SystemRef::named("flaky")),
            )
            .unwrap();
        schedules.add_system("update", record("steady")).unwrap();

        let (tx, src) = ChannelSource::pair(4);
        let subs = schedules.begin([("update".to_string(), source(src))]).unwrap();
        for _ in 0..3 {
            tx.send(None).await.unwrap();
        }
        drop(tx);

        let mut world = TestWorld::new();
        let summary = schedules.run(&mut world).await.unwrap();
        schedules.stop(subs);

        assert_eq!(summary.ticks, 3);
        assert_eq!(summary.failures, 3);
        assert_eq!(world.count("steady"), 3);
    })
    .await;
}

#[tokio::test]
async fn interval_sources_run_until_shutdown() {
    with_timeout(async {
        let mut schedules = Schedules::<TestWorld>::new(EngineOptions::default());
        schedules.add_system("frame", record("tick")).unwrap();

        let subs = schedules
            .begin([("frame".to_string(), source(IntervalSource::from_millis(2)))])
            .unwrap();

        let mut world = TestWorld::new();
        let summary = schedules
            .run_until(&mut world, tokio::time::sleep(Duration::from_millis(50)))
            .await
            .unwrap();
        schedules.stop(subs);

        assert!(summary.ticks >= 1);
        assert_eq!(world.count("tick") as u64, summary.ticks);
    })
    .await;
}

#[tokio::test]
async fn run_without_begin_returns_immediately() {
    let mut schedules = Schedules::<TestWorld>::new(EngineOptions::default());
    schedules.add_system("update", record("a")).unwrap();
    let mut world = TestWorld::new();

    let summary = schedules.run(&mut world).await.unwrap();
    assert_eq!(summary.ticks, 0);
    assert!(world.log().is_empty());
}
