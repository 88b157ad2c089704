// src/schedules.rs

//! Multi-schedule registry.
//!
//! [`Schedules`] owns one [`Schedule`] per stage label, compiles them into a
//! single aggregate list (label insertion order, then each schedule's own
//! order) and loads that list into its [`Loop`] exactly once.

use std::fmt;
use std::time::Duration;

use indexmap::IndexMap;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::engine::trigger::{self, Subscription, Trigger, TriggerSource};
use crate::engine::{EngineOptions, Loop, RunSummary, TickReport, runtime};
use crate::errors::{Result, TickdagError};
use crate::schedule::{CompiledSchedule, Schedule};
use crate::system::{SystemDescriptor, SystemSet};

/// Aggregate counters reported by [`Schedules::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulesStats {
    pub schedule_count: usize,
    pub system_count: usize,
    pub set_count: usize,
    pub compiled: bool,
}

pub struct Schedules<C> {
    schedules: IndexMap<String, Schedule<C>>,
    compiled: Option<CompiledSchedule<C>>,
    engine: Loop<C>,
    loaded: bool,
    triggers: Option<mpsc::UnboundedReceiver<Trigger>>,
}

impl<C> fmt::Debug for Schedules<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schedules")
            .field("schedules", &self.schedules)
            .field("compiled", &self.compiled.is_some())
            .field("loaded", &self.loaded)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl<C: 'static> Schedules<C> {
    pub fn new(options: EngineOptions) -> Self {
        Self::with_engine(Loop::new(options))
    }

    /// Use a pre-built loop (for example one with a manual clock).
    pub fn with_engine(engine: Loop<C>) -> Self {
        Self {
            schedules: IndexMap::new(),
            compiled: None,
            engine,
            loaded: false,
            triggers: None,
        }
    }

    fn open(&mut self, label: &str) -> Result<&mut Schedule<C>> {
        if self.compiled.is_some() {
            return Err(TickdagError::AlreadyCompiled(label.to_string()));
        }
        Ok(self
            .schedules
            .entry(label.to_string())
            .or_insert_with(|| {
                debug!(schedule = %label, "created schedule");
                Schedule::new(label)
            }))
    }

    pub fn add_system(&mut self, label: &str, descriptor: SystemDescriptor<C>) -> Result<String> {
        self.open(label)?.add_system(descriptor)
    }

    pub fn add_systems<I>(&mut self, label: &str, descriptors: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = SystemDescriptor<C>>,
    {
        self.open(label)?.add_systems(descriptors)
    }

    pub fn configure_set(&mut self, label: &str, set: SystemSet) -> Result<()> {
        self.open(label)?.configure_set(set)
    }

    pub fn configure_sets<I>(&mut self, label: &str, sets: I) -> Result<()>
    where
        I: IntoIterator<Item = SystemSet>,
    {
        self.open(label)?.configure_sets(sets)
    }

    /// Compile every schedule and concatenate the results. Idempotent.
    ///
    /// All or nothing: every schedule is checked before any is frozen, so a
    /// failure in one label leaves all of them open for registration.
    pub fn compile(&mut self) -> Result<&CompiledSchedule<C>> {
        let aggregate = match self.compiled.take() {
            Some(aggregate) => aggregate,
            None => {
                let plans = self
                    .schedules
                    .values()
                    .map(|schedule| {
                        if schedule.is_compiled() {
                            Ok(None)
                        } else {
                            schedule.prepare().map(Some)
                        }
                    })
                    .collect::<Result<Vec<_>>>()?;

                let mut aggregate = CompiledSchedule::new(Vec::new());
                for (schedule, plan) in self.schedules.values_mut().zip(plans) {
                    let compiled = match plan {
                        Some(plan) => {
                            let compiled = schedule.commit(plan);
                            schedule.install(compiled)
                        }
                        None => schedule.compile()?,
                    };
                    aggregate.extend_from(compiled);
                }
                info!(
                    schedules = self.schedules.len(),
                    systems = aggregate.len(),
                    "compiled all schedules"
                );
                aggregate
            }
        };
        Ok(&*self.compiled.insert(aggregate))
    }

    /// Compile if needed, then hand every compiled system to the loop once.
    ///
    /// `begin` and `step` call this implicitly.
    pub fn load(&mut self) -> Result<()> {
        if self.loaded {
            return Ok(());
        }
        self.compile()?;
        if let Some(aggregate) = self.compiled.as_ref() {
            for system in aggregate.iter() {
                self.engine.schedule_shared(system.clone());
            }
            info!(entries = aggregate.len(), "loaded compiled systems into the loop");
        }
        self.loaded = true;
        Ok(())
    }

    pub fn stats(&self) -> SchedulesStats {
        let (system_count, set_count) = self
            .schedules
            .values()
            .map(Schedule::state)
            .fold((0, 0), |(systems, sets), s| {
                (systems + s.system_count, sets + s.set_count)
            });
        SchedulesStats {
            schedule_count: self.schedules.len(),
            system_count,
            set_count,
            compiled: self.compiled.is_some(),
        }
    }

    /// Discard every schedule and every loop entry. Engine options, the
    /// application state and the loop's clock are kept.
    pub fn reset(&mut self) {
        self.schedules.clear();
        self.compiled = None;
        self.loaded = false;
        self.triggers = None;
        self.engine.clear();
        info!("schedules reset");
    }

    pub fn schedule(&self, label: &str) -> Option<&Schedule<C>> {
        self.schedules.get(label)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.schedules.keys().map(String::as_str)
    }

    pub fn compiled(&self) -> Option<&CompiledSchedule<C>> {
        self.compiled.as_ref()
    }

    pub fn engine(&self) -> &Loop<C> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Loop<C> {
        &mut self.engine
    }

    pub fn set_state(&mut self, state: impl Into<String>) {
        self.engine.set_state(state);
    }

    /// Compile, load and subscribe one source per channel.
    ///
    /// Must be called from within a tokio runtime. Triggers are queued until
    /// [`Schedules::run`] consumes them.
    pub fn begin<I>(&mut self, sources: I) -> Result<Vec<Subscription>>
    where
        I: IntoIterator<Item = (String, Box<dyn TriggerSource>)>,
    {
        self.load()?;
        let (rx, subscriptions) = trigger::subscribe_all(sources);
        info!(
            channels = ?subscriptions.iter().map(Subscription::channel).collect::<Vec<_>>(),
            "trigger sources subscribed"
        );
        self.triggers = Some(rx);
        Ok(subscriptions)
    }

    /// Service triggers from [`Schedules::begin`] until every source closes.
    pub async fn run(&mut self, ctx: &mut C) -> Result<RunSummary> {
        self.run_until(ctx, std::future::pending()).await
    }

    pub async fn run_until<F>(&mut self, ctx: &mut C, shutdown: F) -> Result<RunSummary>
    where
        F: Future<Output = ()>,
    {
        let Some(mut triggers) = self.triggers.take() else {
            debug!("run called without begin; nothing to consume");
            return Ok(RunSummary::default());
        };
        runtime::drive_until(&mut self.engine, ctx, &mut triggers, shutdown).await
    }

    /// Single synchronous tick of `channel`; compiles and loads on first use.
    pub fn step(
        &mut self,
        channel: &str,
        ctx: &mut C,
        elapsed: Option<Duration>,
    ) -> Result<TickReport> {
        self.load()?;
        self.engine.step(channel, ctx, elapsed)
    }

    pub fn stop(&mut self, subscriptions: Vec<Subscription>) {
        let count = subscriptions.len();
        for subscription in subscriptions {
            subscription.stop();
        }
        info!(sources = count, "trigger sources stopped");
    }
}
