// src/system/descriptor.rs

//! System descriptors and callable identity.

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::system::context::SystemContext;

/// Return type of every system body.
pub type SystemResult = anyhow::Result<()>;

/// Predicate deciding, per tick, whether a system body runs.
pub type RunCondition<C> = Box<dyn FnMut(&C) -> bool>;

type SharedBody<C> = Box<dyn FnMut(&C, &mut SystemContext<'_>) -> SystemResult>;
type ExclusiveBody<C> = Box<dyn FnMut(&mut C, &mut SystemContext<'_>) -> SystemResult>;

/// A system body, tagged once at registration.
///
/// Shared systems only read the external context (interior mutability or a
/// command buffer is their business); exclusive systems get it mutably.
pub enum SystemFn<C> {
    Shared(SharedBody<C>),
    Exclusive(ExclusiveBody<C>),
}

impl<C> SystemFn<C> {
    pub fn is_exclusive(&self) -> bool {
        matches!(self, SystemFn::Exclusive(_))
    }

    pub(crate) fn call(&mut self, ctx: &mut C, cx: &mut SystemContext<'_>) -> SystemResult {
        match self {
            SystemFn::Shared(body) => body(&*ctx, cx),
            SystemFn::Exclusive(body) => body(ctx, cx),
        }
    }
}

impl<C> fmt::Debug for SystemFn<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SystemFn::Shared(_) => f.write_str("SystemFn::Shared(..)"),
            SystemFn::Exclusive(_) => f.write_str("SystemFn::Exclusive(..)"),
        }
    }
}

/// Identity of a registered callable.
///
/// Every `fn` item and every closure has its own concrete type, so the type
/// is the identity by default. Systems built at runtime from one closure type
/// (e.g. from a config file) need an explicit [`SystemRef::named`] identity.
#[derive(Clone)]
pub enum SystemRef {
    Type {
        id: TypeId,
        name: &'static str,
    },
    Named(Arc<str>),
}

impl SystemRef {
    /// Identity of the callable `f`.
    pub fn of<F: 'static>(_f: &F) -> Self {
        SystemRef::Type {
            id: TypeId::of::<F>(),
            name: std::any::type_name::<F>(),
        }
    }

    pub fn named(name: impl AsRef<str>) -> Self {
        SystemRef::Named(Arc::from(name.as_ref()))
    }

    /// Full type path or explicit name.
    pub fn type_name(&self) -> &str {
        match self {
            SystemRef::Type { name, .. } => *name,
            SystemRef::Named(name) => &**name,
        }
    }

    /// Last path segment of the type name, or `None` for closures.
    pub fn short_name(&self) -> Option<&str> {
        match self {
            SystemRef::Type { name, .. } => {
                let name: &'static str = *name;
                let path = name.split('<').next().unwrap_or(name);
                let last = path.rsplit("::").next().unwrap_or(path);
                if last.is_empty() || last.starts_with("{{") {
                    None
                } else {
                    Some(last)
                }
            }
            SystemRef::Named(name) => Some(&**name),
        }
    }
}

impl PartialEq for SystemRef {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (SystemRef::Type { id: a, .. }, SystemRef::Type { id: b, .. }) => a == b,
            (SystemRef::Named(a), SystemRef::Named(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for SystemRef {}

impl Hash for SystemRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            SystemRef::Type { id, .. } => {
                0u8.hash(state);
                id.hash(state);
            }
            SystemRef::Named(name) => {
                1u8.hash(state);
                name.hash(state);
            }
        }
    }
}

impl fmt::Debug for SystemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SystemRef({})", self.type_name())
    }
}

impl fmt::Display for SystemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// One ordering target in an `after` / `before` list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Dependency {
    System(SystemRef),
    Set(String),
}

impl From<SystemRef> for Dependency {
    fn from(r: SystemRef) -> Self {
        Dependency::System(r)
    }
}

impl From<&str> for Dependency {
    fn from(set: &str) -> Self {
        Dependency::Set(set.to_string())
    }
}

impl From<String> for Dependency {
    fn from(set: String) -> Self {
        Dependency::Set(set)
    }
}

/// Scheduling metadata of a system, detached from its body.
///
/// Filled in at registration; `dependencies` is only written by the
/// compiler, after which `after` is cleared.
#[derive(Debug, Clone)]
pub struct SystemMeta {
    pub(crate) id: String,
    pub(crate) system_ref: SystemRef,
    pub(crate) name: String,
    pub(crate) label: String,
    pub(crate) priority: i32,
    pub(crate) insertion: usize,
    pub(crate) sets: Vec<String>,
    pub(crate) after: Vec<Dependency>,
    pub(crate) before: Vec<Dependency>,
    pub(crate) dependencies: Vec<String>,
    pub(crate) in_state: Option<String>,
    pub(crate) event: Option<String>,
    pub(crate) exclusive: bool,
    pub(crate) once: bool,
}

impl SystemMeta {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn system_ref(&self) -> &SystemRef {
        &self.system_ref
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Schedule label the system was registered under.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn sets(&self) -> &[String] {
        &self.sets
    }

    /// Declared predecessors; empty once the owning schedule is compiled.
    pub fn after(&self) -> &[Dependency] {
        &self.after
    }

    pub fn before(&self) -> &[Dependency] {
        &self.before
    }

    /// Resolved predecessor ids (only populated by `compile`).
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn in_state(&self) -> Option<&str> {
        self.in_state.as_deref()
    }

    pub fn event(&self) -> Option<&str> {
        self.event.as_deref()
    }

    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    pub fn is_once(&self) -> bool {
        self.once
    }

    /// Channel this system runs under: explicit event, else its schedule label.
    pub fn channel(&self) -> &str {
        self.event.as_deref().unwrap_or(&self.label)
    }
}

/// Builder describing a system before registration.
///
/// ```ignore
/// fn integrate(world: &World, cx: &mut SystemContext) -> SystemResult { Ok(()) }
///
/// let desc = SystemDescriptor::new(integrate)
///     .in_set("physics")
///     .after(SystemRef::of(&apply_input))
///     .run_if(|world: &World| !world.paused());
/// ```
pub struct SystemDescriptor<C> {
    pub(crate) system_ref: SystemRef,
    pub(crate) func: SystemFn<C>,
    pub(crate) name: Option<String>,
    pub(crate) priority: Option<i32>,
    pub(crate) sets: Vec<String>,
    pub(crate) after: Option<Vec<Dependency>>,
    pub(crate) before: Vec<Dependency>,
    pub(crate) run_if: Option<RunCondition<C>>,
    pub(crate) in_state: Option<String>,
    pub(crate) event: Option<String>,
    pub(crate) once: bool,
}

impl<C: 'static> SystemDescriptor<C> {
    /// Describe a shared system (reads the external context).
    pub fn new<F>(f: F) -> Self
    where
        F: FnMut(&C, &mut SystemContext<'_>) -> SystemResult + 'static,
    {
        let system_ref = SystemRef::of(&f);
        Self::from_parts(system_ref, SystemFn::Shared(Box::new(f)))
    }

    /// Describe an exclusive system (mutates the external context).
    pub fn exclusive<F>(f: F) -> Self
    where
        F: FnMut(&mut C, &mut SystemContext<'_>) -> SystemResult + 'static,
    {
        let system_ref = SystemRef::of(&f);
        Self::from_parts(system_ref, SystemFn::Exclusive(Box::new(f)))
    }

    fn from_parts(system_ref: SystemRef, func: SystemFn<C>) -> Self {
        Self {
            system_ref,
            func,
            name: None,
            priority: None,
            sets: Vec::new(),
            after: None,
            before: Vec::new(),
            run_if: None,
            in_state: None,
            event: None,
            once: false,
        }
    }

    /// Override the callable identity.
    pub fn identified_as(mut self, system_ref: SystemRef) -> Self {
        self.system_ref = system_ref;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Lower runs earlier among systems not ordered by an edge.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn in_set(mut self, set: impl Into<String>) -> Self {
        self.sets.push(set.into());
        self
    }

    pub fn after(mut self, dep: impl Into<Dependency>) -> Self {
        self.after.get_or_insert_with(Vec::new).push(dep.into());
        self
    }

    /// Add a whole `after` list; an empty list is rejected at registration.
    pub fn after_all<I>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = Dependency>,
    {
        self.after.get_or_insert_with(Vec::new).extend(deps);
        self
    }

    pub fn before(mut self, dep: impl Into<Dependency>) -> Self {
        self.before.push(dep.into());
        self
    }

    pub fn run_if<P>(mut self, condition: P) -> Self
    where
        P: FnMut(&C) -> bool + 'static,
    {
        self.run_if = Some(Box::new(condition));
        self
    }

    /// Only run while the engine's application state equals `state`.
    pub fn in_state(mut self, state: impl Into<String>) -> Self {
        self.in_state = Some(state.into());
        self
    }

    /// Run under the trigger channel `event` instead of the schedule label.
    pub fn on_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    /// Fire at most once over the entry's lifetime.
    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }
}

impl<C> SystemDescriptor<C> {
    pub fn system_ref(&self) -> &SystemRef {
        &self.system_ref
    }

    pub fn is_exclusive(&self) -> bool {
        self.func.is_exclusive()
    }

    /// Explicit name, else the callable's short type name, else `system`.
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.system_ref.short_name().map(str::to_string))
            .unwrap_or_else(|| "system".to_string())
    }
}

impl<C> fmt::Debug for SystemDescriptor<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemDescriptor")
            .field("system_ref", &self.system_ref)
            .field("func", &self.func)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("sets", &self.sets)
            .field("after", &self.after)
            .field("before", &self.before)
            .field("run_if", &self.run_if.is_some())
            .field("in_state", &self.in_state)
            .field("event", &self.event)
            .field("once", &self.once)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct World;

    fn physics(_: &World, _: &mut SystemContext<'_>) -> SystemResult {
        Ok(())
    }

    fn render(_: &World, _: &mut SystemContext<'_>) -> SystemResult {
        Ok(())
    }

    #[test]
    fn fn_items_have_distinct_identities() {
        assert_eq!(SystemRef::of(&physics), SystemRef::of(&physics));
        assert_ne!(SystemRef::of(&physics), SystemRef::of(&render));
    }

    #[test]
    fn short_name_strips_module_path() {
        assert_eq!(SystemRef::of(&physics).short_name(), Some("physics"));
        assert_eq!(SystemRef::named("spawn").short_name(), Some("spawn"));
    }

    #[test]
    fn closures_have_no_short_name() {
        let f = |_: &World, _: &mut SystemContext<'_>| -> SystemResult { Ok(()) };
        assert_eq!(SystemRef::of(&f).short_name(), None);
        assert_eq!(SystemDescriptor::new(f).display_name(), "system");
    }

    #[test]
    fn named_identity_never_equals_type_identity() {
        assert_ne!(SystemRef::named("physics"), SystemRef::of(&physics));
    }

    #[test]
    fn explicit_name_wins_over_type_name() {
        let desc = SystemDescriptor::new(physics).named("integrate");
        assert_eq!(desc.display_name(), "integrate");
        assert!(!desc.is_exclusive());
    }

    #[test]
    fn str_dependencies_are_sets() {
        assert_eq!(Dependency::from("render"), Dependency::Set("render".into()));
    }
}
