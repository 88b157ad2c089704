// src/schedule/resolve.rs

//! Dependency resolution: turning `after` / `before` declarations (on
//! systems and on sets) into concrete system-to-system edges.

use std::collections::{BTreeSet, HashMap, VecDeque};

use indexmap::IndexMap;
use tracing::trace;

use crate::errors::{Result, TickdagError};
use crate::schedule::graph::DependencyGraph;
use crate::system::{Dependency, SystemMeta, SystemRef, SystemSet};

/// Lookup tables shared by both resolution phases.
pub(crate) struct Resolver<'a> {
    systems: &'a [SystemMeta],
    by_ref: &'a HashMap<SystemRef, usize>,
    configured: &'a IndexMap<String, SystemSet>,
    /// Set name -> member system indices.
    members: HashMap<&'a str, Vec<usize>>,
    /// Set name -> names of sets it runs after.
    set_preds: HashMap<String, BTreeSet<String>>,
    /// Set name -> names of sets that run after it.
    set_succs: HashMap<String, BTreeSet<String>>,
}

/// Which way set expansion walks the set-level edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Walk {
    /// Follow the sets a set runs after (for `after` targets).
    Predecessors,
    /// Follow the sets that run after a set (for `before` targets).
    Successors,
}

impl<'a> Resolver<'a> {
    /// Phase 1: set-level edges.
    ///
    /// `after` becomes a set -> set predecessor edge; `before` inserts the
    /// reverse edge. A set is known if it was configured or if any system
    /// declares membership in it.
    pub(crate) fn new(
        systems: &'a [SystemMeta],
        by_ref: &'a HashMap<SystemRef, usize>,
        sets: &'a IndexMap<String, SystemSet>,
    ) -> Result<Self> {
        let mut members: HashMap<&'a str, Vec<usize>> = HashMap::new();
        for (idx, meta) in systems.iter().enumerate() {
            for set in &meta.sets {
                members.entry(set.as_str()).or_default().push(idx);
            }
        }

        let is_known = |name: &str| sets.contains_key(name) || members.contains_key(name);

        let mut set_preds: HashMap<String, BTreeSet<String>> = HashMap::new();
        let mut set_succs: HashMap<String, BTreeSet<String>> = HashMap::new();
        let mut link = |pred: &str, succ: &str| {
            set_preds
                .entry(succ.to_string())
                .or_default()
                .insert(pred.to_string());
            set_succs
                .entry(pred.to_string())
                .or_default()
                .insert(succ.to_string());
        };
        for (name, set) in sets {
            for other in set.after_sets() {
                check_set_ref(name, other, is_known(other))?;
                link(other, name);
            }
            for other in set.before_sets() {
                check_set_ref(name, other, is_known(other))?;
                link(name, other);
            }
        }

        Ok(Self {
            systems,
            by_ref,
            configured: sets,
            members,
            set_preds,
            set_succs,
        })
    }

    /// Phase 2: system-level edges, written into `graph`.
    pub(crate) fn resolve_into(&self, graph: &mut DependencyGraph) -> Result<()> {
        for (idx, meta) in self.systems.iter().enumerate() {
            for dep in &meta.after {
                for pred in self.resolve_target(meta, dep, Walk::Predecessors)? {
                    graph.add_edge(pred, idx);
                }
            }

            for dep in &meta.before {
                for succ in self.resolve_target(meta, dep, Walk::Successors)? {
                    graph.add_edge(idx, succ);
                }
            }

            // Set-level ordering applies to every member.
            for set in &meta.sets {
                if let Some(preds) = self.set_preds.get(set) {
                    for pred_set in preds {
                        for pred in self.expand_set(pred_set, Walk::Predecessors) {
                            graph.add_edge(pred, idx);
                        }
                    }
                }
            }

            trace!(system = %meta.id, preds = ?graph.predecessors(idx), "resolved dependencies");
        }

        Ok(())
    }

    fn resolve_target(&self, meta: &SystemMeta, dep: &Dependency, walk: Walk) -> Result<Vec<usize>> {
        match dep {
            Dependency::System(target) => match self.by_ref.get(target) {
                Some(&idx) => Ok(vec![idx]),
                None => Err(TickdagError::Unresolved {
                    system: meta.id.clone(),
                    target: target.type_name().to_string(),
                }),
            },
            Dependency::Set(name) => {
                if !self.configured.contains_key(name) && !self.members.contains_key(name.as_str()) {
                    return Err(TickdagError::UnknownSet {
                        set: name.clone(),
                        referenced_by: meta.id.clone(),
                    });
                }
                Ok(self.expand_set(name, walk))
            }
        }
    }

    /// Members of `set`, plus members of every set reached by walking the
    /// set-level edges in one direction: the sets it (transitively) runs
    /// after, or the sets that (transitively) run after it.
    fn expand_set(&self, set: &str, walk: Walk) -> Vec<usize> {
        let edges = match walk {
            Walk::Predecessors => &self.set_preds,
            Walk::Successors => &self.set_succs,
        };
        let mut out = BTreeSet::new();
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([set.to_string()]);

        while let Some(name) = queue.pop_front() {
            if !seen.insert(name.clone()) {
                continue;
            }
            if let Some(members) = self.members.get(name.as_str()) {
                out.extend(members.iter().copied());
            }
            if let Some(next) = edges.get(&name) {
                queue.extend(next.iter().cloned());
            }
        }

        out.into_iter().collect()
    }
}

fn check_set_ref(set: &str, other: &str, known: bool) -> Result<()> {
    if set == other {
        return Err(TickdagError::SelfReferentialSet(set.to_string()));
    }
    if !known {
        return Err(TickdagError::UnknownSet {
            set: other.to_string(),
            referenced_by: set.to_string(),
        });
    }
    Ok(())
}
