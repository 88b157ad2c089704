// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::engine::EngineOptions;
use crate::engine::diagnostics::{ERROR_HISTORY_CAPACITY, PROFILE_WINDOW};
use crate::types::{DEFAULT_SCHEDULE, ErrorPolicy};

/// Plan file exactly as deserialized, before any semantic checks.
///
/// ```toml
/// [engine]
/// error_policy = "track"
///
/// [set.physics]
/// before = ["render"]
///
/// [system.integrate]
/// sets = ["physics"]
/// after = ["input"]
/// ```
///
/// Every section is optional at this stage; [`ConfigFile`] is the
/// validated form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub engine: EngineSection,

    /// `[set.<name>]` sections.
    #[serde(default)]
    pub set: BTreeMap<String, SetConfig>,

    /// `[system.<name>]` sections.
    #[serde(default)]
    pub system: BTreeMap<String, SystemConfig>,
}

/// Validated plan. Only produced through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    engine: EngineSection,
    set: BTreeMap<String, SetConfig>,
    system: BTreeMap<String, SystemConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        engine: EngineSection,
        set: BTreeMap<String, SetConfig>,
        system: BTreeMap<String, SystemConfig>,
    ) -> Self {
        Self {
            engine,
            set,
            system,
        }
    }

    pub fn engine(&self) -> &EngineSection {
        &self.engine
    }

    pub fn sets(&self) -> &BTreeMap<String, SetConfig> {
        &self.set
    }

    pub fn systems(&self) -> &BTreeMap<String, SystemConfig> {
        &self.system
    }

    /// Schedule labels in registration order: `engine.schedule_order` first,
    /// then any other label in the order it first appears.
    pub fn schedule_labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = Vec::new();
        let mentioned = self
            .engine
            .schedule_order
            .iter()
            .chain(self.system.values().map(|s| &s.schedule))
            .chain(self.set.values().map(|s| &s.schedule));
        for label in mentioned {
            if !labels.contains(label) {
                labels.push(label.clone());
            }
        }
        labels
    }
}

/// `[engine]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    #[serde(default)]
    pub error_policy: ErrorPolicy,

    #[serde(default = "default_true")]
    pub profiling: bool,

    #[serde(default = "default_profile_window")]
    pub profile_window: usize,

    #[serde(default = "default_error_history")]
    pub error_history: usize,

    /// Initial application state for `in_state` gates.
    #[serde(default)]
    pub state: Option<String>,

    /// Labels to register first, in this order.
    #[serde(default)]
    pub schedule_order: Vec<String>,

    /// `[engine.channel.<name>]` sections.
    #[serde(default)]
    pub channel: BTreeMap<String, ChannelConfig>,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            error_policy: ErrorPolicy::default(),
            profiling: true,
            profile_window: default_profile_window(),
            error_history: default_error_history(),
            state: None,
            schedule_order: Vec::new(),
            channel: BTreeMap::new(),
        }
    }
}

impl EngineSection {
    pub fn options(&self) -> EngineOptions {
        EngineOptions {
            error_policy: self.error_policy,
            profiling: self.profiling,
            profile_window: self.profile_window,
            error_history: self.error_history,
        }
    }

    /// Interval for `channel` in realtime mode.
    pub fn interval_ms(&self, channel: &str) -> u64 {
        self.channel
            .get(channel)
            .map_or(DEFAULT_INTERVAL_MS, |c| c.interval_ms)
    }
}

pub const DEFAULT_INTERVAL_MS: u64 = 16;

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

/// `[set.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SetConfig {
    #[serde(default = "default_schedule")]
    pub schedule: String,

    /// Sets this set runs after.
    #[serde(default)]
    pub after: Vec<String>,

    /// Sets this set runs before.
    #[serde(default)]
    pub before: Vec<String>,
}

/// `[system.<name>]` section.
///
/// `after` / `before` entries name either a system or a set of the same
/// schedule; systems win when both would match, which validation forbids
/// anyway.
#[derive(Debug, Clone, Deserialize)]
pub struct SystemConfig {
    #[serde(default = "default_schedule")]
    pub schedule: String,

    #[serde(default)]
    pub sets: Vec<String>,

    /// `None` when absent; `Some(vec![])` is rejected during validation.
    #[serde(default)]
    pub after: Option<Vec<String>>,

    #[serde(default)]
    pub before: Vec<String>,

    #[serde(default)]
    pub priority: Option<i32>,

    /// Explicit channel; defaults to the schedule label.
    #[serde(default)]
    pub event: Option<String>,

    #[serde(default)]
    pub once: bool,

    #[serde(default)]
    pub in_state: Option<String>,

    /// Run with mutable access to the plan world.
    #[serde(default)]
    pub exclusive: bool,

    /// Make the generated system fail on every n-th tick of its channel.
    #[serde(default)]
    pub fail_every: Option<u64>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            schedule: default_schedule(),
            sets: Vec::new(),
            after: None,
            before: Vec::new(),
            priority: None,
            event: None,
            once: false,
            in_state: None,
            exclusive: false,
            fail_every: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_profile_window() -> usize {
    PROFILE_WINDOW
}

fn default_error_history() -> usize {
    ERROR_HISTORY_CAPACITY
}

fn default_interval_ms() -> u64 {
    DEFAULT_INTERVAL_MS
}

fn default_schedule() -> String {
    DEFAULT_SCHEDULE.to_string()
}
