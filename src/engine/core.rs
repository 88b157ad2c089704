// src/engine/core.rs

//! Synchronous channel loop.
//!
//! [`Loop`] owns every scheduled entry and services one channel tick per
//! call to [`Loop::step`]. It performs no IO and holds no tokio types; the
//! async shell in `engine::runtime` only decides *when* to call `step`.
//!
//! Entries are grouped by channel. Within a channel they run in the order
//! they were scheduled, which for compiled schedules is the compiled order.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use tracing::{debug, info, trace, warn};

use crate::engine::arena::{Arena, EntryHandle};
use crate::engine::clock::{Clock, MonotonicClock};
use crate::engine::diagnostics::{ErrorHistory, ProfileSummary};
use crate::engine::entry::{self, LoopSystemEntry};
use crate::engine::{EngineOptions, TickReport};
use crate::errors::{InvocationFailure, Result, TickdagError};
use crate::schedule::{RunOutcome, SharedSystem};
use crate::system::{EntryStorage, SystemContext, SystemDescriptor};
use crate::types::{DEFAULT_CHANNEL, ErrorPolicy};

/// Id prefix for entries scheduled straight onto the loop.
const LOOP_PREFIX: &str = "loop";

#[derive(Debug, Default)]
struct Channel {
    entries: Vec<EntryHandle>,
    generation: bool,
    last_trigger: Option<Instant>,
    ticks: u64,
}

pub struct Loop<C> {
    options: EngineOptions,
    entries: Arena<LoopSystemEntry<C>>,
    channels: IndexMap<String, Channel>,
    by_id: HashMap<String, EntryHandle>,
    state: Option<String>,
    clock: Box<dyn Clock>,
    counter: u64,
}

impl<C> fmt::Debug for Loop<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loop")
            .field("options", &self.options)
            .field("entries", &self.entries.len())
            .field("channels", &self.channels)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<C: 'static> Loop<C> {
    pub fn new(options: EngineOptions) -> Self {
        Self::with_clock(options, MonotonicClock)
    }

    pub fn with_clock(options: EngineOptions, clock: impl Clock + 'static) -> Self {
        Self {
            options,
            entries: Arena::default(),
            channels: IndexMap::new(),
            by_id: HashMap::new(),
            state: None,
            clock: Box::new(clock),
            counter: 0,
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Current application state, matched against entries' `in_state` gate.
    pub fn state(&self) -> Option<&str> {
        self.state.as_deref()
    }

    pub fn set_state(&mut self, state: impl Into<String>) {
        let state = state.into();
        info!(state = %state, "application state changed");
        self.state = Some(state);
    }

    pub fn clear_state(&mut self) {
        info!("application state cleared");
        self.state = None;
    }

    /// Schedule a system directly, outside any schedule.
    ///
    /// It runs on its `on_event` channel, else on the default channel, after
    /// every entry already on that channel. The generated id is
    /// `loop::{name}::{counter}`.
    pub fn schedule_system(&mut self, descriptor: SystemDescriptor<C>) -> EntryHandle {
        self.counter += 1;
        let id = format!("{LOOP_PREFIX}::{}::{}", descriptor.display_name(), self.counter);
        let channel = descriptor
            .event
            .clone()
            .unwrap_or_else(|| DEFAULT_CHANNEL.to_string());
        let insertion = usize::try_from(self.counter).unwrap_or(usize::MAX);
        let system = entry::standalone(descriptor, id, DEFAULT_CHANNEL, insertion);
        self.attach(system, channel)
    }

    pub fn schedule_systems<I>(&mut self, descriptors: I) -> Vec<EntryHandle>
    where
        I: IntoIterator<Item = SystemDescriptor<C>>,
    {
        descriptors
            .into_iter()
            .map(|d| self.schedule_system(d))
            .collect()
    }

    /// Attach an already compiled system on the channel its metadata names.
    ///
    /// Attaching the same id twice returns the existing handle.
    pub(crate) fn schedule_shared(&mut self, system: SharedSystem<C>) -> EntryHandle {
        let (id, channel) = {
            let borrowed = system.borrow();
            (borrowed.id().to_string(), borrowed.meta().channel().to_string())
        };
        if let Some(&handle) = self.by_id.get(&id) {
            debug!(system = %id, "system already attached to the loop");
            return handle;
        }
        self.attach(system, channel)
    }

    fn attach(&mut self, system: SharedSystem<C>, channel: String) -> EntryHandle {
        let entry = LoopSystemEntry::new(system, channel.clone(), &self.options);
        let id = entry.id.clone();
        let handle = self.entries.insert(entry);
        self.channels
            .entry(channel.clone())
            .or_default()
            .entries
            .push(handle);
        self.by_id.insert(id.clone(), handle);
        debug!(system = %id, channel = %channel, handle = %handle, "scheduled loop entry");
        handle
    }

    /// Remove an entry. Its storage, error history and profile are dropped.
    pub fn evict_system(&mut self, handle: EntryHandle) -> Result<()> {
        let entry = self
            .entries
            .remove(handle)
            .ok_or(TickdagError::UnknownEntry(handle))?;
        if let Some(channel) = self.channels.get_mut(&entry.channel) {
            channel.entries.retain(|h| *h != handle);
        }
        self.by_id.remove(&entry.id);
        info!(system = %entry.id, channel = %entry.channel, "evicted loop entry");
        Ok(())
    }

    /// Swap the callable behind `handle`.
    ///
    /// The id, position, storage and enabled flag carry over; the one-shot
    /// flag, error history and profile start fresh. The entry moves only if
    /// the new descriptor names an event. A compiled schedule that shared the
    /// old system keeps its own copy; only the loop runs the replacement.
    pub fn replace_system(
        &mut self,
        handle: EntryHandle,
        descriptor: SystemDescriptor<C>,
    ) -> Result<()> {
        let entry = self
            .entries
            .get_mut(handle)
            .ok_or(TickdagError::UnknownEntry(handle))?;

        let target = descriptor
            .event
            .clone()
            .unwrap_or_else(|| entry.channel.clone());
        let (label, insertion) = {
            let old = entry.system.borrow();
            (old.meta().label().to_string(), old.meta().insertion)
        };

        entry.system = entry::standalone(descriptor, entry.id.clone(), &label, insertion);
        entry.fired = false;
        entry.errors.clear();
        entry.profile.clear();
        let previous = std::mem::replace(&mut entry.channel, target.clone());
        let id = entry.id.clone();

        if previous != target {
            if let Some(channel) = self.channels.get_mut(&previous) {
                channel.entries.retain(|h| *h != handle);
            }
            self.channels
                .entry(target.clone())
                .or_default()
                .entries
                .push(handle);
        }

        info!(system = %id, from = %previous, channel = %target, "replaced loop entry");
        Ok(())
    }

    pub fn set_enabled(&mut self, handle: EntryHandle, enabled: bool) -> Result<()> {
        let entry = self
            .entries
            .get_mut(handle)
            .ok_or(TickdagError::UnknownEntry(handle))?;
        entry.enabled = enabled;
        debug!(system = %entry.id, enabled, "entry toggled");
        Ok(())
    }

    /// Drop every entry and channel. The id counter keeps counting.
    pub fn clear(&mut self) {
        let dropped = self.entries.len();
        self.entries.clear();
        self.channels.clear();
        self.by_id.clear();
        info!(entries = dropped, "loop cleared");
    }

    /// Run one tick of `channel`.
    ///
    /// `elapsed` overrides the time since the channel's previous trigger;
    /// without it the loop's clock is used (zero on the first trigger).
    /// Under [`ErrorPolicy::Throw`] a tick with failures still runs to the
    /// end and then returns [`TickdagError::SystemsFailed`].
    pub fn step(
        &mut self,
        channel: &str,
        ctx: &mut C,
        elapsed: Option<Duration>,
    ) -> Result<TickReport> {
        let policy = self.options.error_policy;
        let profiling = self.options.profiling;
        let now = self.clock.now();

        let Some(chan) = self.channels.get_mut(channel) else {
            warn!(channel, "trigger for unknown channel; nothing is scheduled on it");
            return Ok(TickReport::empty(channel));
        };

        let delta = elapsed.unwrap_or_else(|| {
            chan.last_trigger
                .map_or(Duration::ZERO, |last| now.saturating_duration_since(last))
        });
        chan.last_trigger = Some(now);
        chan.generation = !chan.generation;
        chan.ticks += 1;

        let mut report = TickReport {
            channel: channel.to_string(),
            tick: chan.ticks,
            generation: chan.generation,
            elapsed: delta,
            ..TickReport::default()
        };
        trace!(channel, tick = report.tick, ?delta, "channel tick");

        for &handle in &chan.entries {
            let Some(entry) = self.entries.get_mut(handle) else {
                continue;
            };
            if !entry.enabled {
                report.skipped += 1;
                continue;
            }
            if entry.fired {
                continue;
            }

            let mut system = entry.system.borrow_mut();
            if !system.check_condition(ctx) {
                report.skipped += 1;
                continue;
            }
            if let Some(required) = system.meta().in_state() {
                if self.state.as_deref() != Some(required) {
                    trace!(system = %entry.id, required, "state gate closed");
                    report.skipped += 1;
                    continue;
                }
            }

            let mut cx = SystemContext::new(
                channel,
                report.tick,
                report.generation,
                delta,
                &mut entry.storage,
            );
            let outcome = system.invoke(ctx, &mut cx);
            if system.meta().is_once() {
                entry.fired = true;
            }

            match outcome {
                RunOutcome::Completed { elapsed } => {
                    if profiling {
                        entry.profile.record(elapsed);
                    }
                    report.invoked.push(entry.id.clone());
                }
                RunOutcome::Failed {
                    elapsed,
                    message,
                    panicked,
                } => {
                    if profiling {
                        entry.profile.record(elapsed);
                    }
                    report.invoked.push(entry.id.clone());

                    match policy {
                        ErrorPolicy::Silent => {
                            debug!(system = %entry.id, channel, error = %message, "system failed");
                        }
                        ErrorPolicy::Track | ErrorPolicy::Throw => {
                            entry.errors.record(&message, report.tick, panicked);
                            if policy == ErrorPolicy::Track {
                                warn!(system = %entry.id, channel, panicked, error = %message, "system failed");
                            } else {
                                debug!(system = %entry.id, channel, panicked, error = %message, "system failed; re-raising after tick");
                            }
                            report.failures.push(InvocationFailure {
                                system: entry.id.clone(),
                                message,
                                panicked,
                            });
                        }
                    }
                }
            }
        }

        debug!(
            channel,
            tick = report.tick,
            invoked = report.invoked.len(),
            skipped = report.skipped,
            failures = report.failures.len(),
            "channel tick finished"
        );

        if policy == ErrorPolicy::Throw && !report.failures.is_empty() {
            return Err(TickdagError::SystemsFailed {
                channel: report.channel,
                failures: report.failures,
            });
        }
        Ok(report)
    }

    pub fn entry(&self, handle: EntryHandle) -> Option<&LoopSystemEntry<C>> {
        self.entries.get(handle)
    }

    pub fn errors(&self, handle: EntryHandle) -> Option<&ErrorHistory> {
        self.entries.get(handle).map(|e| &e.errors)
    }

    pub fn profile(&self, handle: EntryHandle) -> Option<ProfileSummary> {
        self.entries.get(handle).map(|e| e.profile.summary())
    }

    pub fn storage(&self, handle: EntryHandle) -> Option<&EntryStorage> {
        self.entries.get(handle).map(|e| &e.storage)
    }

    pub fn handle_of(&self, id: &str) -> Option<EntryHandle> {
        self.by_id.get(id).copied()
    }

    /// Channel names, in the order they were first used.
    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }

    pub fn entries_in(&self, channel: &str) -> &[EntryHandle] {
        self.channels
            .get(channel)
            .map(|c| c.entries.as_slice())
            .unwrap_or(&[])
    }

    /// Number of ticks `channel` has run.
    pub fn ticks(&self, channel: &str) -> Option<u64> {
        self.channels.get(channel).map(|c| c.ticks)
    }

    /// Current value of the channel's generation flag.
    pub fn generation(&self, channel: &str) -> Option<bool> {
        self.channels.get(channel).map(|c| c.generation)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::engine::ManualClock;

    #[derive(Default)]
    struct World {
        calls: RefCell<Vec<String>>,
    }

    impl World {
        fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }
    }

    fn recorder(tag: &'static str) -> SystemDescriptor<World> {
        SystemDescriptor::new(move |w: &World, _cx: &mut SystemContext<'_>| {
            w.calls.borrow_mut().push(tag.to_string());
            Ok(())
        })
        .named(tag)
    }

    fn engine() -> (Loop<World>, ManualClock) {
        let clock = ManualClock::new();
        let engine = Loop::with_clock(EngineOptions::with_policy(ErrorPolicy::Track), clock.clone());
        (engine, clock)
    }

    #[test]
    fn entries_run_in_scheduling_order_on_their_channel() {
        let (mut engine, _) = engine();
        engine.schedule_system(recorder("a"));
        engine.schedule_system(recorder("b"));
        engine.schedule_system(recorder("fixed").on_event("fixed"));

        let mut world = World::default();
        let report = engine.step(DEFAULT_CHANNEL, &mut world, None).unwrap();

        assert_eq!(world.calls(), vec!["a", "b"]);
        assert_eq!(report.invoked, vec!["loop::a::1", "loop::b::2"]);
        assert_eq!(engine.channels().collect::<Vec<_>>(), vec!["default", "fixed"]);
    }

    #[test]
    fn elapsed_comes_from_clock_unless_overridden() {
        let (mut engine, clock) = engine();
        engine.schedule_system(recorder("a"));
        let mut world = World::default();

        let first = engine.step(DEFAULT_CHANNEL, &mut world, None).unwrap();
        assert_eq!(first.elapsed, Duration::ZERO);

        clock.advance(Duration::from_millis(16));
        let second = engine.step(DEFAULT_CHANNEL, &mut world, None).unwrap();
        assert_eq!(second.elapsed, Duration::from_millis(16));

        clock.advance(Duration::from_millis(16));
        let forced = engine
            .step(DEFAULT_CHANNEL, &mut world, Some(Duration::from_millis(5)))
            .unwrap();
        assert_eq!(forced.elapsed, Duration::from_millis(5));
    }

    #[test]
    fn generation_flag_alternates_per_channel() {
        let (mut engine, _) = engine();
        engine.schedule_system(recorder("a"));
        engine.schedule_system(recorder("b").on_event("other"));
        let mut world = World::default();

        let g1 = engine.step(DEFAULT_CHANNEL, &mut world, None).unwrap().generation;
        let g2 = engine.step(DEFAULT_CHANNEL, &mut world, None).unwrap().generation;
        let other = engine.step("other", &mut world, None).unwrap().generation;

        assert_ne!(g1, g2);
        assert_eq!(other, g1);
        assert_eq!(engine.ticks(DEFAULT_CHANNEL), Some(2));
        assert_eq!(engine.generation(DEFAULT_CHANNEL), Some(g2));
    }

    #[test]
    fn unknown_channel_yields_empty_report() {
        let (mut engine, _) = engine();
        let mut world = World::default();
        let report = engine.step("nowhere", &mut world, None).unwrap();
        assert_eq!(report, TickReport::empty("nowhere"));
    }

    #[test]
    fn disabled_once_and_state_gated_entries_are_skipped() {
        let (mut engine, _) = engine();
        let disabled = engine.schedule_system(recorder("disabled"));
        engine.schedule_system(recorder("once").once());
        engine.schedule_system(recorder("gated").in_state("running"));
        engine.set_enabled(disabled, false).unwrap();

        let mut world = World::default();
        engine.step(DEFAULT_CHANNEL, &mut world, None).unwrap();
        engine.set_state("running");
        engine.step(DEFAULT_CHANNEL, &mut world, None).unwrap();

        assert_eq!(world.calls(), vec!["once", "gated"]);
        assert!(engine.entry(engine.handle_of("loop::once::2").unwrap()).unwrap().has_fired());
    }

    #[test]
    fn unknown_handles_are_usage_errors() {
        let (mut engine, _) = engine();
        let handle = engine.schedule_system(recorder("a"));
        engine.evict_system(handle).unwrap();

        assert!(matches!(
            engine.evict_system(handle),
            Err(TickdagError::UnknownEntry(h)) if h == handle
        ));
        assert!(engine.set_enabled(handle, true).is_err());
        assert!(engine.replace_system(handle, recorder("b")).is_err());
        assert!(engine.is_empty());
    }

    #[test]
    fn replace_can_move_entry_to_another_channel() {
        let (mut engine, _) = engine();
        let handle = engine.schedule_system(recorder("a"));
        engine
            .replace_system(handle, recorder("b").on_event("late"))
            .unwrap();

        assert!(engine.entries_in(DEFAULT_CHANNEL).is_empty());
        assert_eq!(engine.entries_in("late"), [handle]);
        assert_eq!(engine.entry(handle).unwrap().id(), "loop::a::1");
    }

    #[test]
    fn profiling_records_durations_when_enabled() {
        let (mut engine, _) = engine();
        let handle = engine.schedule_system(recorder("a"));
        let mut world = World::default();
        for _ in 0..3 {
            engine.step(DEFAULT_CHANNEL, &mut world, None).unwrap();
        }
        assert_eq!(engine.profile(handle).unwrap().samples, 3);

        let mut quiet = Loop::<World>::new(EngineOptions {
            profiling: false,
            ..EngineOptions::default()
        });
        let handle = quiet.schedule_system(recorder("a"));
        quiet.step(DEFAULT_CHANNEL, &mut world, None).unwrap();
        assert_eq!(quiet.profile(handle).unwrap().samples, 0);
    }
}
