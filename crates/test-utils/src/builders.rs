#![allow(dead_code)]

use tickdag::ErrorPolicy;
use tickdag::config::{ConfigFile, RawConfigFile, SetConfig, SystemConfig};

/// Builder for plan configs to simplify test setup.
pub struct PlanBuilder {
    config: RawConfigFile,
}

impl PlanBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn with_system(mut self, name: &str, system: SystemConfig) -> Self {
        self.config.system.insert(name.to_string(), system);
        self
    }

    pub fn with_set(mut self, name: &str, set: SetConfig) -> Self {
        self.config.set.insert(name.to_string(), set);
        self
    }

    pub fn with_policy(mut self, policy: ErrorPolicy) -> Self {
        self.config.engine.error_policy = policy;
        self
    }

    pub fn with_state(mut self, state: &str) -> Self {
        self.config.engine.state = Some(state.to_string());
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid plan from builder")
    }
}

impl Default for PlanBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `SystemConfig`.
pub struct SystemConfigBuilder {
    system: SystemConfig,
}

impl SystemConfigBuilder {
    pub fn new() -> Self {
        Self {
            system: SystemConfig::default(),
        }
    }

    pub fn schedule(mut self, label: &str) -> Self {
        self.system.schedule = label.to_string();
        self
    }

    pub fn in_set(mut self, set: &str) -> Self {
        self.system.sets.push(set.to_string());
        self
    }

    pub fn after(mut self, target: &str) -> Self {
        self.system
            .after
            .get_or_insert_with(Vec::new)
            .push(target.to_string());
        self
    }

    pub fn before(mut self, target: &str) -> Self {
        self.system.before.push(target.to_string());
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.system.priority = Some(priority);
        self
    }

    pub fn event(mut self, event: &str) -> Self {
        self.system.event = Some(event.to_string());
        self
    }

    pub fn once(mut self) -> Self {
        self.system.once = true;
        self
    }

    pub fn in_state(mut self, state: &str) -> Self {
        self.system.in_state = Some(state.to_string());
        self
    }

    pub fn exclusive(mut self) -> Self {
        self.system.exclusive = true;
        self
    }

    pub fn fail_every(mut self, n: u64) -> Self {
        self.system.fail_every = Some(n);
        self
    }

    pub fn build(self) -> SystemConfig {
        self.system
    }
}

impl Default for SystemConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `SetConfig`.
pub struct SetConfigBuilder {
    set: SetConfig,
}

impl SetConfigBuilder {
    pub fn new(schedule: &str) -> Self {
        Self {
            set: SetConfig {
                schedule: schedule.to_string(),
                after: Vec::new(),
                before: Vec::new(),
            },
        }
    }

    pub fn after(mut self, set: &str) -> Self {
        self.set.after.push(set.to_string());
        self
    }

    pub fn before(mut self, set: &str) -> Self {
        self.set.before.push(set.to_string());
        self
    }

    pub fn build(self) -> SetConfig {
        self.set
    }
}
