// src/engine/mod.rs

//! Execution engine.
//!
//! The engine is split into a synchronous core and a thin async shell:
//!
//! - [`Loop`] owns every scheduled entry, groups them by channel and
//!   runs one channel tick per [`Loop::step`]. It has no tokio types and is
//!   unit tested directly.
//! - [`trigger`] holds the host-side trigger sources. They run as tokio tasks
//!   and only forward [`Trigger`] values.
//! - [`runtime::drive`] consumes those triggers and steps the loop for each
//!   one.

pub mod arena;
pub mod clock;
pub mod core;
pub mod diagnostics;
pub mod entry;
pub mod runtime;
pub mod trigger;

use std::time::Duration;

use crate::errors::InvocationFailure;
use crate::types::ErrorPolicy;

pub use arena::EntryHandle;
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use self::core::Loop;
pub use diagnostics::{
    ERROR_HISTORY_CAPACITY, ErrorHistory, ErrorRecord, PROFILE_WINDOW, ProfileRing,
    ProfileSummary,
};
pub use entry::LoopSystemEntry;
pub use runtime::{RunSummary, drive, drive_until};
pub use trigger::{ChannelSource, IntervalSource, Subscription, Trigger, TriggerSource};

/// Engine-wide options, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    pub error_policy: ErrorPolicy,
    /// Record invocation durations into each entry's profile ring.
    pub profiling: bool,
    pub profile_window: usize,
    pub error_history: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            error_policy: ErrorPolicy::default(),
            profiling: true,
            profile_window: PROFILE_WINDOW,
            error_history: ERROR_HISTORY_CAPACITY,
        }
    }
}

impl EngineOptions {
    pub fn with_policy(policy: ErrorPolicy) -> Self {
        Self {
            error_policy: policy,
            ..Self::default()
        }
    }
}

/// What happened during one channel tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub channel: String,
    /// 1-based tick number of the channel; 0 when the channel is unknown.
    pub tick: u64,
    pub generation: bool,
    pub elapsed: Duration,
    /// Ids of the entries whose body was called, in order.
    pub invoked: Vec<String>,
    pub skipped: usize,
    /// Failures caught this tick; always empty under the silent policy.
    pub failures: Vec<InvocationFailure>,
}

impl TickReport {
    pub(crate) fn empty(channel: &str) -> Self {
        Self {
            channel: channel.to_string(),
            ..Self::default()
        }
    }
}
