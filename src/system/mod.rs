// src/system/mod.rs

//! The work-unit model: what a registered system *is*.
//!
//! - [`descriptor`] holds [`SystemDescriptor`], the builder users fill in
//!   before registration, plus the callable identity [`SystemRef`].
//! - [`set`] holds [`SystemSet`], named groups with set-level ordering.
//! - [`context`] holds the per-invocation [`SystemContext`] and the
//!   persistent per-entry [`EntryStorage`].

pub mod context;
pub mod descriptor;
pub mod set;

pub use context::{EntryStorage, SystemContext};
pub use descriptor::{
    Dependency, RunCondition, SystemDescriptor, SystemFn, SystemMeta, SystemRef, SystemResult,
};
pub use set::SystemSet;
