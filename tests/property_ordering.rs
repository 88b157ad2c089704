// tests/property_ordering.rs
mod common;
use crate::common::{TestWorld, record};

use std::collections::BTreeSet;

use proptest::prelude::*;
use tickdag::{Schedule, SystemRef};

/// A random DAG: system `i` may only point at systems `0..i`, so the
/// declared graph is acyclic by construction.
#[derive(Debug, Clone)]
struct Dag {
    /// `after[i]`: systems `i` runs after.
    after: Vec<BTreeSet<usize>>,
    /// `(lo, hi)` with `lo < hi`: system `lo` declares `before = hi`.
    before: Vec<(usize, usize)>,
    priorities: Vec<i32>,
    /// Registration order.
    order: Vec<usize>,
}

fn dag_strategy(max_systems: usize) -> impl Strategy<Value = Dag> {
    (1..=max_systems).prop_flat_map(|n| {
        let after = proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..3), n);
        let before = proptest::collection::vec((any::<usize>(), any::<usize>()), 0..n);
        let priorities = proptest::collection::vec(-5i32..5, n);
        let order = Just((0..n).collect::<Vec<_>>()).prop_shuffle();

        (after, before, priorities, order).prop_map(move |(raw_after, raw_before, priorities, order)| {
            let after = raw_after
                .into_iter()
                .enumerate()
                .map(|(i, deps)| {
                    if i == 0 {
                        BTreeSet::new()
                    } else {
                        deps.into_iter().map(|d| d % i).collect()
                    }
                })
                .collect();
            let before = raw_before
                .into_iter()
                .filter_map(|(a, b)| {
                    let (lo, hi) = (a % n, b % n);
                    (lo < hi).then_some((lo, hi))
                })
                .collect();
            Dag {
                after,
                before,
                priorities,
                order,
            }
        })
    })
}

fn name(i: usize) -> String {
    format!("s{i:02}")
}

fn build(dag: &Dag) -> Schedule<TestWorld> {
    let mut schedule = Schedule::new("update");
    for &i in &dag.order {
        let mut desc = record(&name(i));
        if dag.after[i].is_empty() {
            desc = desc.priority(dag.priorities[i]);
        } else {
            for &dep in &dag.after[i] {
                desc = desc.after(SystemRef::named(name(dep)));
            }
        }
        for &(lo, hi) in &dag.before {
            if lo == i {
                desc = desc.before(SystemRef::named(name(hi)));
            }
        }
        schedule.add_system(desc).unwrap();
    }
    schedule
}

proptest! {
    #[test]
    fn every_declared_edge_is_respected(dag in dag_strategy(12)) {
        let mut schedule = build(&dag);
        let names = schedule.compile().unwrap().names();
        let index = |i: usize| names.iter().position(|n| *n == name(i)).unwrap();

        prop_assert_eq!(names.len(), dag.after.len());
        for (i, deps) in dag.after.iter().enumerate() {
            for &dep in deps {
                prop_assert!(index(dep) < index(i), "{} after {} violated: {:?}", name(i), name(dep), names);
            }
        }
        for &(lo, hi) in &dag.before {
            prop_assert!(index(lo) < index(hi), "{} before {} violated: {:?}", name(lo), name(hi), names);
        }
    }

    #[test]
    fn order_does_not_depend_on_registration_order(dag in dag_strategy(10)) {
        let mut shuffled = build(&dag);
        let mut sorted = build(&Dag { order: (0..dag.after.len()).collect(), ..dag.clone() });

        prop_assert_eq!(
            shuffled.compile().unwrap().names(),
            sorted.compile().unwrap().names()
        );
    }

    #[test]
    fn cycles_are_always_rejected(n in 2usize..8) {
        // s00 -> s01 -> ... -> s(n-1) -> s00
        let mut schedule = Schedule::<TestWorld>::new("update");
        for i in 0..n {
            let prev = (i + n - 1) % n;
            schedule
                .add_system(record(&name(i)).after(SystemRef::named(name(prev))))
                .unwrap();
        }
        prop_assert!(schedule.compile().is_err());
        prop_assert!(!schedule.is_compiled());
    }
}
