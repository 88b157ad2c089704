// src/system/context.rs

//! Per-invocation context handed to system bodies.

use std::any::Any;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::time::Duration;

/// Key/value storage private to one loop entry.
///
/// Values survive across ticks and across `replace_system`; they are dropped
/// when the entry is evicted.
#[derive(Default)]
pub struct EntryStorage {
    slots: HashMap<String, Box<dyn Any>>,
}

impl fmt::Debug for EntryStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.slots.keys().collect();
        keys.sort();
        f.debug_struct("EntryStorage").field("keys", &keys).finish()
    }
}

impl EntryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow the value stored under `key`, if it exists and has type `T`.
    pub fn get<T: 'static>(&self, key: &str) -> Option<&T> {
        self.slots.get(key).and_then(|v| (**v).downcast_ref::<T>())
    }

    pub fn get_mut<T: 'static>(&mut self, key: &str) -> Option<&mut T> {
        self.slots.get_mut(key).and_then(|v| (**v).downcast_mut::<T>())
    }

    /// Store `value` under `key`, returning the previous value if it had type `T`.
    pub fn insert<T: 'static>(&mut self, key: impl Into<String>, value: T) -> Option<T> {
        self.slots
            .insert(key.into(), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    /// Get the value under `key`, initialising it first when missing or when
    /// the stored value has a different type.
    pub fn get_or_insert_with<T: 'static>(
        &mut self,
        key: &str,
        init: impl FnOnce() -> T,
    ) -> &mut T {
        let slot = match self.slots.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if !(**occupied.get()).is::<T>() {
                    occupied.insert(Box::new(init()));
                }
                occupied.into_mut()
            }
            Entry::Vacant(vacant) => vacant.insert(Box::new(init())),
        };

        match (**slot).downcast_mut::<T>() {
            Some(value) => value,
            None => unreachable!("slot `{key}` was just checked to hold the requested type"),
        }
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.slots.remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

/// What a system body sees besides the external context.
///
/// The generation flag flips once per channel tick, so helpers that keep
/// state in [`EntryStorage`] can tell a new tick apart from a second call
/// within the same tick.
#[derive(Debug)]
pub struct SystemContext<'a> {
    generation: bool,
    delta: Duration,
    tick: u64,
    channel: &'a str,
    storage: &'a mut EntryStorage,
}

impl<'a> SystemContext<'a> {
    pub fn new(
        channel: &'a str,
        tick: u64,
        generation: bool,
        delta: Duration,
        storage: &'a mut EntryStorage,
    ) -> Self {
        Self {
            generation,
            delta,
            tick,
            channel,
            storage,
        }
    }

    pub fn generation(&self) -> bool {
        self.generation
    }

    /// Time elapsed since the previous trigger of this channel.
    pub fn delta(&self) -> Duration {
        self.delta
    }

    /// 1-based tick counter of the channel.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn channel(&self) -> &str {
        self.channel
    }

    pub fn storage(&mut self) -> &mut EntryStorage {
        self.storage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_returns_previous_value_of_same_type() {
        let mut storage = EntryStorage::new();
        assert_eq!(storage.insert("count", 1u32), None);
        assert_eq!(storage.insert("count", 2u32), Some(1));
        assert_eq!(storage.get::<u32>("count"), Some(&2));
    }

    #[test]
    fn get_with_wrong_type_is_none() {
        let mut storage = EntryStorage::new();
        storage.insert("name", String::from("physics"));
        assert!(storage.get::<u32>("name").is_none());
        assert_eq!(storage.get::<String>("name").map(String::as_str), Some("physics"));
    }

    #[test]
    fn get_or_insert_with_replaces_mismatched_type() {
        let mut storage = EntryStorage::new();
        storage.insert("acc", "not a number");

        *storage.get_or_insert_with("acc", || 0.0f64) += 1.5;
        *storage.get_or_insert_with("acc", || 0.0f64) += 1.5;

        assert_eq!(storage.get::<f64>("acc"), Some(&3.0));
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn context_exposes_storage() {
        let mut storage = EntryStorage::new();
        {
            let mut cx = SystemContext::new("update", 3, true, Duration::from_millis(16), &mut storage);
            assert_eq!(cx.channel(), "update");
            assert_eq!(cx.tick(), 3);
            assert!(cx.generation());
            cx.storage().insert("seen", true);
        }
        assert!(storage.contains("seen"));
    }
}
