// src/errors.rs

//! Crate-wide error type and helpers.

use thiserror::Error;

use crate::engine::EntryHandle;

/// A single system failure caught during a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationFailure {
    /// Id of the failing entry.
    pub system: String,
    /// Rendered error (or panic payload).
    pub message: String,
    /// Whether the body panicked instead of returning `Err`.
    pub panicked: bool,
}

#[derive(Error, Debug)]
pub enum TickdagError {
    #[error("system `{system}` is already registered in schedule `{schedule}`")]
    DuplicateSystem { schedule: String, system: String },

    #[error("system set `{set}` is already configured in schedule `{schedule}`")]
    DuplicateSet { schedule: String, set: String },

    #[error("schedule `{0}` is already compiled; registration is closed")]
    AlreadyCompiled(String),

    #[error("`{target}` referenced by `{system}` is not scheduled")]
    Unresolved { system: String, target: String },

    #[error("system set `{set}` referenced by `{referenced_by}` is not configured")]
    UnknownSet { set: String, referenced_by: String },

    #[error("system set `{0}` cannot be ordered relative to itself")]
    SelfReferentialSet(String),

    #[error("system `{0}` declares an empty `after` list")]
    EmptyAfter(String),

    #[error("system `{0}` declares both a priority and `after` constraints")]
    PriorityWithAfter(String),

    #[error("no loop entry for handle {0}")]
    UnknownEntry(EntryHandle),

    #[error("dependency cycle detected: `{system}` runs after `{depends_on}`, which already depends on it")]
    Cycle { system: String, depends_on: String },

    #[error("cycle escaped detection: ordered {ordered} of {total} systems")]
    CycleEscaped { ordered: usize, total: usize },

    #[error("{} system(s) failed on channel `{channel}`: {}", .failures.len(), summarize(.failures))]
    SystemsFailed {
        channel: String,
        failures: Vec<InvocationFailure>,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),
}

/// Coarse classification of [`TickdagError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// API misuse; the calling operation was rejected.
    Usage,
    /// The declared ordering constraints contain a cycle.
    Cycle,
    /// One or more system bodies failed during a tick.
    Invocation,
    /// Loading or validating configuration failed.
    Config,
}

impl TickdagError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TickdagError::DuplicateSystem { .. }
            | TickdagError::DuplicateSet { .. }
            | TickdagError::AlreadyCompiled(_)
            | TickdagError::Unresolved { .. }
            | TickdagError::UnknownSet { .. }
            | TickdagError::SelfReferentialSet(_)
            | TickdagError::EmptyAfter(_)
            | TickdagError::PriorityWithAfter(_)
            | TickdagError::UnknownEntry(_) => ErrorKind::Usage,
            TickdagError::Cycle { .. } | TickdagError::CycleEscaped { .. } => ErrorKind::Cycle,
            TickdagError::SystemsFailed { .. } => ErrorKind::Invocation,
            TickdagError::ConfigError(_)
            | TickdagError::IoError(_)
            | TickdagError::TomlError(_) => ErrorKind::Config,
        }
    }
}

fn summarize(failures: &[InvocationFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.system, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TickdagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_the_error_source() {
        let io = TickdagError::from(std::io::Error::other("disk gone"));
        assert_eq!(io.kind(), ErrorKind::Config);
        assert_eq!(
            TickdagError::ConfigError("bad".into()).kind(),
            ErrorKind::Config
        );
        assert_eq!(
            TickdagError::CycleEscaped { ordered: 1, total: 2 }.kind(),
            ErrorKind::Cycle
        );
        assert_eq!(
            TickdagError::EmptyAfter("a".into()).kind(),
            ErrorKind::Usage
        );
    }
}
