// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Read and deserialize a plan file without semantic validation.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;
    debug!(
        path = %path.display(),
        systems = config.system.len(),
        sets = config.set.len(),
        "plan file parsed"
    );

    Ok(config)
}

/// Read a plan file and validate it.
///
/// Validation covers references, naming and numeric bounds. Dependency
/// cycles are left to schedule compilation, which reports the offending
/// edge.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// `Tickdag.toml` in the current directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Tickdag.toml")
}
