// src/config/mod.rs

//! Plan files: TOML descriptions of schedules, sets and engine options.
//!
//! - `model.rs`: serde data model.
//! - `loader.rs`: reading a plan from disk.
//! - `validate.rs`: `RawConfigFile` -> `ConfigFile` checks.
//! - `plan.rs`: turning a validated plan into runnable [`Schedules`](crate::Schedules).

pub mod loader;
pub mod model;
pub mod plan;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    ChannelConfig, ConfigFile, EngineSection, RawConfigFile, SetConfig, SystemConfig,
};
pub use plan::{PlanWorld, build_schedules};
