// src/config/validate.rs

use std::collections::{BTreeMap, BTreeSet};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{Result, TickdagError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::TickdagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.engine, raw.set, raw.system))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_systems(cfg)?;
    validate_engine_section(cfg)?;

    let names = ScheduleNames::collect(cfg);
    validate_names(cfg, &names)?;
    validate_sets(cfg, &names)?;
    validate_systems(cfg, &names)?;
    Ok(())
}

fn config_error(message: String) -> TickdagError {
    TickdagError::ConfigError(message)
}

fn ensure_has_systems(cfg: &RawConfigFile) -> Result<()> {
    if cfg.system.is_empty() {
        return Err(config_error(
            "plan must contain at least one [system.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_engine_section(cfg: &RawConfigFile) -> Result<()> {
    // error_policy is validated during deserialization.
    if cfg.engine.profile_window == 0 {
        return Err(config_error(
            "[engine].profile_window must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.engine.error_history == 0 {
        return Err(config_error(
            "[engine].error_history must be >= 1 (got 0)".to_string(),
        ));
    }
    for (name, channel) in &cfg.engine.channel {
        if channel.interval_ms == 0 {
            return Err(config_error(format!(
                "[engine.channel.{name}].interval_ms must be >= 1 (got 0)"
            )));
        }
    }
    Ok(())
}

/// System and set names known per schedule label.
#[derive(Debug, Default)]
struct ScheduleNames<'a> {
    systems: BTreeMap<&'a str, BTreeSet<&'a str>>,
    /// Configured sets plus sets that systems declare membership in.
    sets: BTreeMap<&'a str, BTreeSet<&'a str>>,
}

impl<'a> ScheduleNames<'a> {
    fn collect(cfg: &'a RawConfigFile) -> Self {
        let mut names = Self::default();
        for (name, system) in &cfg.system {
            let label = system.schedule.as_str();
            names.systems.entry(label).or_default().insert(name.as_str());
            for set in &system.sets {
                names.sets.entry(label).or_default().insert(set.as_str());
            }
        }
        for (name, set) in &cfg.set {
            names
                .sets
                .entry(set.schedule.as_str())
                .or_default()
                .insert(name.as_str());
        }
        names
    }

    fn is_system(&self, label: &str, name: &str) -> bool {
        self.systems.get(label).is_some_and(|s| s.contains(name))
    }

    fn is_set(&self, label: &str, name: &str) -> bool {
        self.sets.get(label).is_some_and(|s| s.contains(name))
    }
}

fn validate_names(cfg: &RawConfigFile, names: &ScheduleNames<'_>) -> Result<()> {
    for (name, system) in &cfg.system {
        if names.is_set(&system.schedule, name) {
            return Err(config_error(format!(
                "'{name}' is both a system and a set in schedule '{}'",
                system.schedule
            )));
        }
    }
    Ok(())
}

fn validate_sets(cfg: &RawConfigFile, names: &ScheduleNames<'_>) -> Result<()> {
    for (name, set) in &cfg.set {
        for (field, other) in set
            .after
            .iter()
            .map(|o| ("after", o))
            .chain(set.before.iter().map(|o| ("before", o)))
        {
            if other == name {
                return Err(config_error(format!(
                    "set '{name}' cannot reference itself in `{field}`"
                )));
            }
            if !names.is_set(&set.schedule, other) {
                return Err(config_error(format!(
                    "set '{name}' has unknown set '{other}' in `{field}` (schedule '{}')",
                    set.schedule
                )));
            }
        }
    }
    Ok(())
}

fn validate_systems(cfg: &RawConfigFile, names: &ScheduleNames<'_>) -> Result<()> {
    for (name, system) in &cfg.system {
        let after = match &system.after {
            Some(after) if after.is_empty() => {
                return Err(config_error(format!(
                    "system '{name}' has an empty `after` list; omit the key instead"
                )));
            }
            Some(after) => after.as_slice(),
            None => &[],
        };

        if system.priority.is_some() && !after.is_empty() {
            return Err(config_error(format!(
                "system '{name}' sets both `priority` and `after`"
            )));
        }

        if system.fail_every == Some(0) {
            return Err(config_error(format!(
                "system '{name}' has fail_every = 0; use a value >= 1 or omit it"
            )));
        }

        for (field, target) in after
            .iter()
            .map(|t| ("after", t))
            .chain(system.before.iter().map(|t| ("before", t)))
        {
            if target == name {
                return Err(config_error(format!(
                    "system '{name}' cannot reference itself in `{field}`"
                )));
            }
            if !names.is_system(&system.schedule, target) && !names.is_set(&system.schedule, target) {
                return Err(config_error(format!(
                    "system '{name}' has unknown dependency '{target}' in `{field}` (schedule '{}')",
                    system.schedule
                )));
            }
        }
    }
    Ok(())
}
