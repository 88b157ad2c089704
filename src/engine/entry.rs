// src/engine/entry.rs

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::engine::diagnostics::{ErrorHistory, ProfileRing};
use crate::engine::EngineOptions;
use crate::schedule::{CompiledSystem, SharedSystem};
use crate::system::{EntryStorage, SystemDescriptor, SystemMeta};

/// Per-entry loop state: the shared compiled system plus everything the loop
/// tracks about it between ticks.
pub struct LoopSystemEntry<C> {
    pub(crate) id: String,
    pub(crate) channel: String,
    pub(crate) system: SharedSystem<C>,
    pub(crate) enabled: bool,
    pub(crate) fired: bool,
    pub(crate) storage: EntryStorage,
    pub(crate) errors: ErrorHistory,
    pub(crate) profile: ProfileRing,
}

impl<C> fmt::Debug for LoopSystemEntry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopSystemEntry")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .field("enabled", &self.enabled)
            .field("fired", &self.fired)
            .field("storage", &self.storage)
            .field("errors", &self.errors.len())
            .finish_non_exhaustive()
    }
}

impl<C> LoopSystemEntry<C> {
    pub(crate) fn new(system: SharedSystem<C>, channel: String, options: &EngineOptions) -> Self {
        let id = system.borrow().id().to_string();
        Self {
            id,
            channel,
            system,
            enabled: true,
            fired: false,
            storage: EntryStorage::new(),
            errors: ErrorHistory::new(options.error_history),
            profile: ProfileRing::new(options.profile_window),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// True once a one-shot entry has been invoked.
    pub fn has_fired(&self) -> bool {
        self.fired
    }

    pub fn storage(&self) -> &EntryStorage {
        &self.storage
    }

    pub fn errors(&self) -> &ErrorHistory {
        &self.errors
    }

    pub fn profile(&self) -> &ProfileRing {
        &self.profile
    }

    pub fn system(&self) -> &SharedSystem<C> {
        &self.system
    }
}

/// Wrap a descriptor scheduled straight onto the loop, bypassing any
/// schedule. Ordering declarations have nothing to resolve against here and
/// are kept only as metadata.
pub(crate) fn standalone<C>(
    descriptor: SystemDescriptor<C>,
    id: String,
    label: &str,
    insertion: usize,
) -> SharedSystem<C> {
    let name = descriptor.display_name();
    let exclusive = descriptor.func.is_exclusive();
    let meta = SystemMeta {
        id,
        system_ref: descriptor.system_ref,
        name,
        label: label.to_string(),
        priority: descriptor.priority.unwrap_or(0),
        insertion,
        sets: descriptor.sets,
        after: descriptor.after.unwrap_or_default(),
        before: descriptor.before,
        dependencies: Vec::new(),
        in_state: descriptor.in_state,
        event: descriptor.event,
        exclusive,
        once: descriptor.once,
    };
    Rc::new(RefCell::new(CompiledSystem::new(
        meta,
        descriptor.func,
        descriptor.run_if,
    )))
}
