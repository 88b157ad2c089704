// src/system/set.rs

/// A named group of systems with set-level ordering constraints.
///
/// ```ignore
/// schedule.configure_set(SystemSet::new("physics").after("input").before("render"))?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemSet {
    name: String,
    after: Vec<String>,
    before: Vec<String>,
}

impl SystemSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            after: Vec::new(),
            before: Vec::new(),
        }
    }

    /// Every member of this set runs after every member of `set`.
    pub fn after(mut self, set: impl Into<String>) -> Self {
        self.after.push(set.into());
        self
    }

    /// Every member of this set runs before every member of `set`.
    pub fn before(mut self, set: impl Into<String>) -> Self {
        self.before.push(set.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn after_sets(&self) -> &[String] {
        &self.after
    }

    pub fn before_sets(&self) -> &[String] {
        &self.before
    }
}
