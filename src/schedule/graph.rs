// src/schedule/graph.rs

//! Resolved dependency graph, cycle detection and linear ordering.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::errors::{Result, TickdagError};

/// Sort key used to break ties between systems with no edge between them.
///
/// `(priority, name, insertion index)`; the index is unique, so this is a
/// strict total order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct TieBreak {
    pub priority: i32,
    pub name: String,
    pub insertion: usize,
}

/// Resolved "runs after" relation between the systems of one schedule.
///
/// Node `i` is the `i`-th registered system; an edge `a -> b` means `a`
/// must run before `b`.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

impl DependencyGraph {
    pub(crate) fn with_nodes<'a>(ids: impl IntoIterator<Item = &'a str>) -> Self {
        let mut graph = DiGraph::new();
        for id in ids {
            graph.add_node(id.to_string());
        }
        Self { graph }
    }

    /// Record that `before` must run before `after`; self-edges are dropped.
    pub(crate) fn add_edge(&mut self, before: usize, after: usize) {
        if before != after {
            self.graph
                .update_edge(NodeIndex::new(before), NodeIndex::new(after), ());
        }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn id(&self, node: usize) -> &str {
        &self.graph[NodeIndex::new(node)]
    }

    /// Resolved predecessors of `node`, ascending.
    pub fn predecessors(&self, node: usize) -> Vec<usize> {
        self.neighbors(node, Direction::Incoming)
    }

    /// Resolved successors of `node`, ascending.
    pub fn successors(&self, node: usize) -> Vec<usize> {
        self.neighbors(node, Direction::Outgoing)
    }

    fn neighbors(&self, node: usize, dir: Direction) -> Vec<usize> {
        let mut out: Vec<usize> = self
            .graph
            .neighbors_directed(NodeIndex::new(node), dir)
            .map(NodeIndex::index)
            .collect();
        out.sort_unstable();
        out
    }

    /// All edges as `(predecessor id, successor id)`, in node order.
    pub fn edges(&self) -> Vec<(String, String)> {
        (0..self.node_count())
            .flat_map(|node| {
                self.successors(node)
                    .into_iter()
                    .map(move |succ| (node, succ))
            })
            .map(|(a, b)| (self.id(a).to_string(), self.id(b).to_string()))
            .collect()
    }

    /// Depth-first search over predecessor edges with an explicit recursion
    /// stack; the first back edge found is reported.
    pub(crate) fn detect_cycle(&self) -> Result<()> {
        let n = self.node_count();
        let mut marks = vec![Mark::Unvisited; n];

        for root in 0..n {
            if marks[root] != Mark::Unvisited {
                continue;
            }

            marks[root] = Mark::OnStack;
            let mut stack: Vec<(usize, Vec<usize>)> = vec![(root, self.pending_preds(root))];

            loop {
                let Some(top) = stack.last_mut() else {
                    break;
                };
                let node = top.0;

                match top.1.pop() {
                    Some(pred) => match marks[pred] {
                        Mark::OnStack => {
                            return Err(TickdagError::Cycle {
                                system: self.id(node).to_string(),
                                depends_on: self.id(pred).to_string(),
                            });
                        }
                        Mark::Unvisited => {
                            marks[pred] = Mark::OnStack;
                            stack.push((pred, self.pending_preds(pred)));
                        }
                        Mark::Done => {}
                    },
                    None => {
                        marks[node] = Mark::Done;
                        stack.pop();
                    }
                }
            }
        }

        Ok(())
    }

    /// Predecessors in pop order (smallest index popped first).
    fn pending_preds(&self, node: usize) -> Vec<usize> {
        let mut preds = self.predecessors(node);
        preds.reverse();
        preds
    }

    /// Kahn's algorithm; among ready nodes the smallest [`TieBreak`] goes first.
    pub(crate) fn linear_order(&self, keys: &[TieBreak]) -> Result<Vec<usize>> {
        let n = self.node_count();
        let mut in_degree: Vec<usize> = (0..n)
            .map(|node| {
                self.graph
                    .neighbors_directed(NodeIndex::new(node), Direction::Incoming)
                    .count()
            })
            .collect();

        let mut ready: BinaryHeap<Reverse<(&TieBreak, usize)>> = (0..n)
            .filter(|&node| in_degree[node] == 0)
            .map(|node| Reverse((&keys[node], node)))
            .collect();

        let mut order = Vec::with_capacity(n);
        while let Some(Reverse((_, node))) = ready.pop() {
            order.push(node);
            for succ in self.successors(node) {
                in_degree[succ] -= 1;
                if in_degree[succ] == 0 {
                    ready.push(Reverse((&keys[succ], succ)));
                }
            }
        }

        if order.len() != n {
            return Err(TickdagError::CycleEscaped {
                ordered: order.len(),
                total: n,
            });
        }

        Ok(order)
    }
}
