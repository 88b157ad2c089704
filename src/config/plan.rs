// src/config/plan.rs

//! Turning a validated plan into runnable schedules.
//!
//! Plan systems have no behaviour of their own: each one counts its
//! invocations in a [`PlanWorld`] and optionally fails on a fixed cadence,
//! which is enough to exercise ordering, channels, gates and error policies
//! from a TOML file.

use std::cell::RefCell;
use std::collections::BTreeMap;

use tracing::debug;

use crate::config::model::{ConfigFile, SystemConfig};
use crate::errors::Result;
use crate::schedules::Schedules;
use crate::system::{Dependency, SystemContext, SystemDescriptor, SystemRef, SystemResult, SystemSet};

/// External context shared by plan systems.
#[derive(Debug, Default)]
pub struct PlanWorld {
    runs: RefCell<BTreeMap<String, u64>>,
    /// Invocations that had mutable access to the world.
    exclusive_runs: u64,
    /// Global invocation sequence, for order inspection.
    sequence: RefCell<Vec<String>>,
}

impl PlanWorld {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, name: &str) {
        *self.runs.borrow_mut().entry(name.to_string()).or_default() += 1;
        self.sequence.borrow_mut().push(name.to_string());
    }

    pub fn runs(&self, name: &str) -> u64 {
        self.runs.borrow().get(name).copied().unwrap_or(0)
    }

    pub fn exclusive_runs(&self) -> u64 {
        self.exclusive_runs
    }

    pub fn sequence(&self) -> Vec<String> {
        self.sequence.borrow().clone()
    }
}

/// Build one [`Schedules`] from a validated plan.
///
/// Labels are registered in [`ConfigFile::schedule_labels`] order; within a
/// label, sets are configured before systems are added.
pub fn build_schedules(config: &ConfigFile) -> Result<Schedules<PlanWorld>> {
    let mut schedules = Schedules::new(config.engine().options());
    if let Some(state) = &config.engine().state {
        schedules.set_state(state.clone());
    }

    for label in config.schedule_labels() {
        for (name, set) in config.sets().iter().filter(|(_, s)| s.schedule == label) {
            let mut system_set = SystemSet::new(name.as_str());
            for other in &set.after {
                system_set = system_set.after(other.as_str());
            }
            for other in &set.before {
                system_set = system_set.before(other.as_str());
            }
            schedules.configure_set(&label, system_set)?;
        }

        for (name, system) in config
            .systems()
            .iter()
            .filter(|(_, s)| s.schedule == label)
        {
            let descriptor = plan_descriptor(name, system, |target| {
                config
                    .systems()
                    .get(target)
                    .is_some_and(|other| other.schedule == label)
            });
            let id = schedules.add_system(&label, descriptor)?;
            debug!(schedule = %label, system = %id, "plan system registered");
        }
    }

    Ok(schedules)
}

fn plan_descriptor(
    name: &str,
    cfg: &SystemConfig,
    is_system: impl Fn(&str) -> bool,
) -> SystemDescriptor<PlanWorld> {
    let tag = name.to_string();
    let fail_every = cfg.fail_every;

    let descriptor = if cfg.exclusive {
        SystemDescriptor::exclusive(move |world: &mut PlanWorld, cx: &mut SystemContext<'_>| {
            world.exclusive_runs += 1;
            world.record(&tag);
            scheduled_failure(&tag, fail_every, cx.tick())
        })
    } else {
        SystemDescriptor::new(move |world: &PlanWorld, cx: &mut SystemContext<'_>| {
            world.record(&tag);
            scheduled_failure(&tag, fail_every, cx.tick())
        })
    };

    let target = |t: &String| -> Dependency {
        if is_system(t) {
            Dependency::System(SystemRef::named(t))
        } else {
            Dependency::Set(t.clone())
        }
    };

    let mut descriptor = descriptor.identified_as(SystemRef::named(name)).named(name);
    for set in &cfg.sets {
        descriptor = descriptor.in_set(set.as_str());
    }
    if let Some(after) = &cfg.after {
        descriptor = descriptor.after_all(after.iter().map(&target));
    }
    for before in &cfg.before {
        descriptor = descriptor.before(target(before));
    }
    if let Some(priority) = cfg.priority {
        descriptor = descriptor.priority(priority);
    }
    if let Some(event) = &cfg.event {
        descriptor = descriptor.on_event(event.as_str());
    }
    if let Some(state) = &cfg.in_state {
        descriptor = descriptor.in_state(state.as_str());
    }
    if cfg.once {
        descriptor = descriptor.once();
    }
    descriptor
}

fn scheduled_failure(name: &str, every: Option<u64>, tick: u64) -> SystemResult {
    match every {
        Some(n) if n > 0 && tick % n == 0 => {
            anyhow::bail!("{name}: scheduled failure (every {n} ticks)")
        }
        _ => Ok(()),
    }
}
