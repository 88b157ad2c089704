// src/lib.rs

//! `tickdag`: a dependency-ordered system scheduler and tick loop.
//!
//! - [`system`]: work units (descriptors, sets, per-invocation context).
//! - [`schedule`]: one stage label compiled into a deterministic linear order.
//! - [`schedules`]: several labels aggregated and fed into the loop.
//! - [`engine`]: the channel loop, trigger sources and async driver.
//! - [`config`]: TOML plans used by the `tickdag` binary.

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod schedule;
pub mod schedules;
pub mod system;
pub mod types;

use anyhow::Result;
use tracing::{debug, error, info, warn};

use crate::cli::CliArgs;
use crate::config::{ConfigFile, PlanWorld, build_schedules, load_and_validate};
use crate::engine::{IntervalSource, TriggerSource};

pub use engine::{
    EngineOptions, EntryHandle, ErrorHistory, Loop, ManualClock, ProfileSummary, TickReport,
};
pub use errors::{ErrorKind, InvocationFailure, TickdagError};
pub use schedule::{CompiledSchedule, CompiledSystem, Schedule};
pub use schedules::{Schedules, SchedulesStats};
pub use system::{
    Dependency, EntryStorage, SystemContext, SystemDescriptor, SystemRef, SystemResult, SystemSet,
};
pub use types::ErrorPolicy;

/// High-level entry point used by `main.rs`.
///
/// Loads and validates the plan, compiles it, then either prints the order
/// (`--dry-run`), steps every channel `--ticks` times, or drives channels
/// from interval timers until Ctrl-C (`--realtime`).
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_and_validate(&args.plan)?;

    let mut schedules = build_schedules(&cfg)?;
    schedules.compile()?;

    if args.dry_run {
        print_dry_run(&cfg, &schedules);
        return Ok(());
    }

    schedules.load()?;
    let channels: Vec<String> = schedules
        .engine()
        .channels()
        .map(str::to_string)
        .collect();
    let mut world = PlanWorld::new();

    if args.realtime {
        let sources = channels.iter().map(|channel| {
            let period = cfg.engine().interval_ms(channel);
            debug!(channel = %channel, period_ms = period, "interval source");
            let source: Box<dyn TriggerSource> = Box::new(IntervalSource::from_millis(period));
            (channel.clone(), source)
        });
        let subscriptions = schedules.begin(sources)?;

        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C; running until sources close");
                std::future::pending::<()>().await;
            }
        };
        let summary = schedules.run_until(&mut world, shutdown).await?;
        schedules.stop(subscriptions);
        info!(ticks = summary.ticks, failures = summary.failures, "realtime run finished");
    } else {
        for _ in 0..args.ticks {
            for channel in &channels {
                match schedules.step(channel, &mut world, None) {
                    Ok(_) => {}
                    Err(TickdagError::SystemsFailed { channel, failures }) => {
                        for failure in failures {
                            error!(
                                channel = %channel,
                                system = %failure.system,
                                error = %failure.message,
                                "system failed"
                            );
                        }
                    }
                    Err(other) => return Err(other.into()),
                }
            }
        }
    }

    print_report(&schedules, &world);
    Ok(())
}

fn print_dry_run(cfg: &ConfigFile, schedules: &Schedules<PlanWorld>) {
    let engine = cfg.engine();
    println!("tickdag dry-run");
    println!("  engine.error_policy = {:?}", engine.error_policy);
    println!("  engine.profiling = {}", engine.profiling);
    if let Some(state) = &engine.state {
        println!("  engine.state = {state}");
    }
    println!();

    for label in schedules.labels() {
        let Some(schedule) = schedules.schedule(label) else {
            continue;
        };
        let Some(compiled) = schedule.compiled() else {
            continue;
        };
        let graph = schedule.graph();

        println!("schedule {label} ({} systems):", compiled.len());
        for (position, system) in compiled.iter().enumerate() {
            let system = system.borrow();
            let meta = system.meta();
            println!("  {position:>3}. {}  [channel: {}]", meta.id(), meta.channel());
            if !meta.dependencies().is_empty() {
                println!("       after: {:?}", meta.dependencies());
            }
            if !meta.sets().is_empty() {
                println!("       sets: {:?}", meta.sets());
            }
            if let Some(state) = meta.in_state() {
                println!("       in_state: {state}");
            }
            if meta.is_once() {
                println!("       once: true");
            }
            if meta.is_exclusive() {
                println!("       exclusive: true");
            }
        }
        println!("  edges ({}):", graph.edges.len());
        for (before, after) in &graph.edges {
            println!("    {before} -> {after}");
        }
    }

    debug!("dry-run complete (no execution)");
}

fn print_report(schedules: &Schedules<PlanWorld>, world: &PlanWorld) {
    let engine = schedules.engine();
    println!("tickdag run report");

    for channel in engine.channels() {
        println!(
            "channel {channel} ({} ticks):",
            engine.ticks(channel).unwrap_or(0)
        );
        for &handle in engine.entries_in(channel) {
            let Some(entry) = engine.entry(handle) else {
                continue;
            };
            let system = entry.system().borrow();
            let stats = system.stats();
            let profile = entry.profile().summary();

            println!(
                "  {}: invoked {} (world saw {}), skipped {}, failed {}",
                entry.id(),
                stats.runs,
                world.runs(system.name()),
                stats.skipped,
                stats.failures
            );
            if let (Some(avg), Some(max)) = (profile.average, profile.max) {
                println!("      profile: avg {avg:?}, max {max:?} over {} samples", profile.samples);
            }
            for record in entry.errors().iter() {
                println!(
                    "      error x{} (ticks {}..={}): {}",
                    record.occurrences, record.first_tick, record.last_tick, record.message
                );
            }
        }
    }
}
