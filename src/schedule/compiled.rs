// src/schedule/compiled.rs

//! Instrumented wrappers produced by `compile()`.

use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::system::{RunCondition, SystemContext, SystemFn, SystemMeta};

/// A compiled system shared between its schedule and the loop.
pub type SharedSystem<C> = Rc<RefCell<CompiledSystem<C>>>;

/// Rolling statistics kept by every compiled system.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SystemStats {
    /// Completed invocations (successful or failed).
    pub runs: u64,
    /// Ticks where the run condition said no.
    pub skipped: u64,
    /// Invocations that returned `Err` or panicked.
    pub failures: u64,
    pub total: Duration,
    pub last: Option<Duration>,
}

impl SystemStats {
    pub fn average(&self) -> Option<Duration> {
        if self.runs == 0 {
            return None;
        }
        let runs = u32::try_from(self.runs).unwrap_or(u32::MAX);
        Some(self.total / runs)
    }
}

/// Result of one invocation of a compiled system body.
#[derive(Debug)]
pub enum RunOutcome {
    Completed {
        elapsed: Duration,
    },
    Failed {
        elapsed: Duration,
        message: String,
        panicked: bool,
    },
}

/// One system after compilation: metadata, body, run condition and stats.
pub struct CompiledSystem<C> {
    meta: SystemMeta,
    func: SystemFn<C>,
    run_if: Option<RunCondition<C>>,
    stats: SystemStats,
}

impl<C> fmt::Debug for CompiledSystem<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledSystem")
            .field("id", &self.meta.id)
            .field("func", &self.func)
            .field("run_if", &self.run_if.is_some())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl<C> CompiledSystem<C> {
    pub(crate) fn new(meta: SystemMeta, func: SystemFn<C>, run_if: Option<RunCondition<C>>) -> Self {
        Self {
            meta,
            func,
            run_if,
            stats: SystemStats::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.meta.id
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn meta(&self) -> &SystemMeta {
        &self.meta
    }

    pub fn stats(&self) -> SystemStats {
        self.stats
    }

    /// Evaluate the run condition; counts a skip when it says no.
    pub(crate) fn check_condition(&mut self, ctx: &C) -> bool {
        let allowed = match self.run_if.as_mut() {
            Some(condition) => condition(ctx),
            None => true,
        };
        if !allowed {
            self.stats.skipped += 1;
            trace!(system = %self.meta.id, "run condition false; skipping");
        }
        allowed
    }

    /// Call the body, timing it and containing panics.
    pub(crate) fn invoke(&mut self, ctx: &mut C, cx: &mut SystemContext<'_>) -> RunOutcome {
        let start = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.func.call(ctx, cx)));
        let elapsed = start.elapsed();

        self.stats.runs += 1;
        self.stats.total += elapsed;
        self.stats.last = Some(elapsed);

        match result {
            Ok(Ok(())) => RunOutcome::Completed { elapsed },
            Ok(Err(err)) => {
                self.stats.failures += 1;
                RunOutcome::Failed {
                    elapsed,
                    message: format!("{err:#}"),
                    panicked: false,
                }
            }
            Err(payload) => {
                self.stats.failures += 1;
                RunOutcome::Failed {
                    elapsed,
                    message: panic_message(payload.as_ref()),
                    panicked: true,
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked with a non-string payload".to_string()
    }
}

/// The frozen, ordered output of a compile.
pub struct CompiledSchedule<C> {
    systems: Vec<SharedSystem<C>>,
}

impl<C> fmt::Debug for CompiledSchedule<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledSchedule")
            .field("ids", &self.ids())
            .finish()
    }
}

impl<C> CompiledSchedule<C> {
    pub(crate) fn new(systems: Vec<SharedSystem<C>>) -> Self {
        Self { systems }
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&SharedSystem<C>> {
        self.systems.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SharedSystem<C>> {
        self.systems.iter()
    }

    pub fn ids(&self) -> Vec<String> {
        self.systems
            .iter()
            .map(|s| s.borrow().id().to_string())
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.systems
            .iter()
            .map(|s| s.borrow().name().to_string())
            .collect()
    }

    /// Position of the system with the given name, if any.
    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.systems.iter().position(|s| s.borrow().name() == name)
    }

    pub(crate) fn extend_from(&mut self, other: &CompiledSchedule<C>) {
        self.systems.extend(other.systems.iter().cloned());
    }
}
