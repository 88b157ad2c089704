//! A context type for tests that records which systems ran, in order.

use std::cell::{Cell, RefCell};

use tickdag::{SystemContext, SystemDescriptor, SystemRef};

#[derive(Debug, Default)]
pub struct TestWorld {
    log: RefCell<Vec<String>>,
    /// Bumped by exclusive systems only.
    pub writes: u64,
    /// Free-form flag for run conditions.
    pub gate: Cell<bool>,
}

impl TestWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, tag: &str) {
        self.log.borrow_mut().push(tag.to_string());
    }

    /// Invocation order so far.
    pub fn log(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    pub fn count(&self, tag: &str) -> usize {
        self.log.borrow().iter().filter(|t| *t == tag).count()
    }

    pub fn clear(&self) {
        self.log.borrow_mut().clear();
    }
}

/// A shared system that appends `tag` to the world's log.
///
/// Each call yields a distinct identity (`SystemRef::named(tag)`), so several
/// recorders can live in one schedule.
pub fn record(tag: &str) -> SystemDescriptor<TestWorld> {
    let owned = tag.to_string();
    SystemDescriptor::new(move |world: &TestWorld, _: &mut SystemContext<'_>| {
        world.push(&owned);
        Ok(())
    })
    .identified_as(SystemRef::named(tag))
    .named(tag)
}

/// Like [`record`], but exclusive: also bumps `writes`.
pub fn record_exclusive(tag: &str) -> SystemDescriptor<TestWorld> {
    let owned = tag.to_string();
    SystemDescriptor::exclusive(move |world: &mut TestWorld, _: &mut SystemContext<'_>| {
        world.writes += 1;
        world.push(&owned);
        Ok(())
    })
    .identified_as(SystemRef::named(tag))
    .named(tag)
}
