// src/schedule/mod.rs

//! One named schedule (pipeline stage) and its compiler.
//!
//! - [`resolve`] expands `after` / `before` declarations on systems and sets
//!   into system-to-system edges.
//! - [`graph`] holds the resolved [`DependencyGraph`], cycle detection and
//!   the linear ordering pass.
//! - [`compiled`] holds the instrumented wrappers produced by compilation.
//!
//! Registration is open until the first successful [`Schedule::compile`];
//! after that the schedule is frozen and `compile` keeps returning the same
//! list.

pub mod compiled;
pub mod graph;
mod resolve;

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::errors::{Result, TickdagError};
use crate::schedule::graph::TieBreak;
use crate::schedule::resolve::Resolver;
use crate::system::{RunCondition, SystemDescriptor, SystemFn, SystemMeta, SystemRef, SystemSet};

pub use compiled::{CompiledSchedule, CompiledSystem, RunOutcome, SharedSystem, SystemStats};
pub use graph::DependencyGraph;

/// Body half of a registered system; moved into the compiled wrapper.
struct SystemBody<C> {
    func: SystemFn<C>,
    run_if: Option<RunCondition<C>>,
}

/// Resolved graph and linear order of a schedule that passed every check.
pub(crate) struct CompilePlan {
    graph: DependencyGraph,
    order: Vec<usize>,
}

/// Counters reported by [`Schedule::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleState {
    pub compiled: bool,
    pub system_count: usize,
    pub set_count: usize,
}

/// Read-only view of a schedule's systems, sets and resolved edges.
#[derive(Debug, Clone)]
pub struct GraphSnapshot {
    pub systems: Vec<SystemMeta>,
    pub sets: Vec<SystemSet>,
    /// `(predecessor id, successor id)`; empty until compiled.
    pub edges: Vec<(String, String)>,
}

pub struct Schedule<C> {
    label: String,
    systems: Vec<SystemMeta>,
    bodies: Vec<Option<SystemBody<C>>>,
    by_id: HashMap<String, usize>,
    by_ref: HashMap<SystemRef, usize>,
    sets: IndexMap<String, SystemSet>,
    counter: u64,
    graph: Option<DependencyGraph>,
    compiled: Option<CompiledSchedule<C>>,
}

impl<C> fmt::Debug for Schedule<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schedule")
            .field("label", &self.label)
            .field("systems", &self.systems.len())
            .field("sets", &self.sets.len())
            .field("compiled", &self.compiled.is_some())
            .finish_non_exhaustive()
    }
}

impl<C: 'static> Schedule<C> {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            systems: Vec::new(),
            bodies: Vec::new(),
            by_id: HashMap::new(),
            by_ref: HashMap::new(),
            sets: IndexMap::new(),
            counter: 0,
            graph: None,
            compiled: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled.is_some()
    }

    /// Register a system and return its generated id
    /// (`{label}::{name}::{counter}`).
    pub fn add_system(&mut self, descriptor: SystemDescriptor<C>) -> Result<String> {
        if self.is_compiled() {
            return Err(TickdagError::AlreadyCompiled(self.label.clone()));
        }

        let name = descriptor.display_name();
        if self.by_ref.contains_key(&descriptor.system_ref) {
            return Err(TickdagError::DuplicateSystem {
                schedule: self.label.clone(),
                system: descriptor.system_ref.type_name().to_string(),
            });
        }

        let after = match descriptor.after {
            Some(after) if after.is_empty() => {
                return Err(TickdagError::EmptyAfter(name));
            }
            Some(after) => after,
            None => Vec::new(),
        };
        if descriptor.priority.is_some() && !after.is_empty() {
            return Err(TickdagError::PriorityWithAfter(name));
        }

        self.counter += 1;
        let id = format!("{}::{}::{}", self.label, name, self.counter);
        let index = self.systems.len();
        let exclusive = descriptor.func.is_exclusive();

        self.systems.push(SystemMeta {
            id: id.clone(),
            system_ref: descriptor.system_ref.clone(),
            name,
            label: self.label.clone(),
            priority: descriptor.priority.unwrap_or(0),
            insertion: index,
            sets: descriptor.sets,
            after,
            before: descriptor.before,
            dependencies: Vec::new(),
            in_state: descriptor.in_state,
            event: descriptor.event,
            exclusive,
            once: descriptor.once,
        });
        self.bodies.push(Some(SystemBody {
            func: descriptor.func,
            run_if: descriptor.run_if,
        }));
        self.by_id.insert(id.clone(), index);
        self.by_ref.insert(descriptor.system_ref, index);

        debug!(schedule = %self.label, system = %id, "registered system");
        Ok(id)
    }

    pub fn add_systems<I>(&mut self, descriptors: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = SystemDescriptor<C>>,
    {
        descriptors
            .into_iter()
            .map(|d| self.add_system(d))
            .collect()
    }

    pub fn configure_set(&mut self, set: SystemSet) -> Result<()> {
        if self.is_compiled() {
            return Err(TickdagError::AlreadyCompiled(self.label.clone()));
        }
        if self.sets.contains_key(set.name()) {
            return Err(TickdagError::DuplicateSet {
                schedule: self.label.clone(),
                set: set.name().to_string(),
            });
        }

        debug!(schedule = %self.label, set = %set.name(), "configured system set");
        self.sets.insert(set.name().to_string(), set);
        Ok(())
    }

    pub fn configure_sets<I>(&mut self, sets: I) -> Result<()>
    where
        I: IntoIterator<Item = SystemSet>,
    {
        for set in sets {
            self.configure_set(set)?;
        }
        Ok(())
    }

    /// Resolve dependencies, reject cycles and freeze the linear order.
    ///
    /// Idempotent: later calls return the cached list. On error nothing is
    /// committed and the schedule stays open.
    pub fn compile(&mut self) -> Result<&CompiledSchedule<C>> {
        let compiled = match self.compiled.take() {
            Some(compiled) => {
                debug!(schedule = %self.label, "schedule already compiled; reusing order");
                compiled
            }
            None => {
                let plan = self.prepare()?;
                self.commit(plan)
            }
        };
        Ok(&*self.compiled.insert(compiled))
    }

    /// Every fallible compile step, without touching the schedule.
    pub(crate) fn prepare(&self) -> Result<CompilePlan> {
        let resolver = Resolver::new(&self.systems, &self.by_ref, &self.sets)?;
        let mut graph = DependencyGraph::with_nodes(self.systems.iter().map(|m| m.id.as_str()));
        resolver.resolve_into(&mut graph)?;

        graph.detect_cycle()?;

        let keys: Vec<TieBreak> = self
            .systems
            .iter()
            .map(|m| TieBreak {
                priority: m.priority,
                name: m.name.clone(),
                insertion: m.insertion,
            })
            .collect();
        let order = graph.linear_order(&keys)?;

        Ok(CompilePlan { graph, order })
    }

    /// Freeze a plan produced by [`Schedule::prepare`]. Cannot fail.
    pub(crate) fn commit(&mut self, plan: CompilePlan) -> CompiledSchedule<C> {
        let CompilePlan { graph, order } = plan;

        for (idx, meta) in self.systems.iter_mut().enumerate() {
            meta.dependencies = graph
                .predecessors(idx)
                .into_iter()
                .map(|p| graph.id(p).to_string())
                .collect();
            meta.after.clear();
        }

        let mut systems = Vec::with_capacity(order.len());
        for idx in order {
            if let Some(body) = self.bodies[idx].take() {
                let wrapped = CompiledSystem::new(self.systems[idx].clone(), body.func, body.run_if);
                systems.push(Rc::new(RefCell::new(wrapped)));
            }
        }

        info!(
            schedule = %self.label,
            systems = systems.len(),
            edges = graph.edge_count(),
            "compiled schedule"
        );

        self.graph = Some(graph);
        CompiledSchedule::new(systems)
    }

    /// Store a committed list; used by the aggregate compile.
    pub(crate) fn install(&mut self, compiled: CompiledSchedule<C>) -> &CompiledSchedule<C> {
        self.compiled.insert(compiled)
    }

    pub fn state(&self) -> ScheduleState {
        ScheduleState {
            compiled: self.is_compiled(),
            system_count: self.systems.len(),
            set_count: self.sets.len(),
        }
    }

    pub fn graph(&self) -> GraphSnapshot {
        GraphSnapshot {
            systems: self.systems.clone(),
            sets: self.sets.values().cloned().collect(),
            edges: self
                .graph
                .as_ref()
                .map(DependencyGraph::edges)
                .unwrap_or_default(),
        }
    }

    /// Metadata of the system registered under `id`.
    pub fn system(&self, id: &str) -> Option<&SystemMeta> {
        self.by_id.get(id).map(|&idx| &self.systems[idx])
    }

    pub fn compiled(&self) -> Option<&CompiledSchedule<C>> {
        self.compiled.as_ref()
    }

    /// Drop every system and set, reopen registration and restart the id
    /// counter.
    pub fn reset(&mut self) {
        self.systems.clear();
        self.bodies.clear();
        self.by_id.clear();
        self.by_ref.clear();
        self.sets.clear();
        self.counter = 0;
        self.graph = None;
        self.compiled = None;
        info!(schedule = %self.label, "schedule reset");
    }
}
