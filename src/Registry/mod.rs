//! Stable-id-indexed arenas. Every publication, subscription, image, and
//! channel endpoint the conductor tracks is looked up by a monotonically
//! increasing registration id handed back to the client at creation time,
//! never by a raw pointer -- a client can hold onto an id indefinitely
//! without it dangling, and the conductor can freely move or drop the
//! underlying value.
//!
//! Backed by a `parking_lot::RwLock`-guarded table, the same lock used
//! throughout the crate for small, rarely-contended shared state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationId(i64);

impl RegistrationId {
    pub fn value(self) -> i64 {
        self.0
    }

    /// Rebuild a registration id from the raw `i64` a client command
    /// carries. The client only ever got that value back from a prior
    /// `RegistrationIdGenerator::next()`, so this is not a new allocation,
    /// just recovering the typed handle for a registry lookup.
    pub fn from_raw(value: i64) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out unique, strictly increasing registration ids for the
/// lifetime of a driver process.
pub struct RegistrationIdGenerator {
    next: AtomicI64,
}

impl Default for RegistrationIdGenerator {
    fn default() -> Self {
        Self { next: AtomicI64::new(1) }
    }
}

impl RegistrationIdGenerator {
    pub fn next(&self) -> RegistrationId {
        RegistrationId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// A registration-id-keyed table of `T`, safe to share across the
/// conductor and the threads handling client command submissions.
pub struct Registry<T> {
    entries: RwLock<HashMap<RegistrationId, T>>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self { entries: RwLock::new(HashMap::new()) }
    }
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: RegistrationId, value: T) {
        self.entries.write().insert(id, value);
    }

    pub fn remove(&self, id: RegistrationId) -> Option<T> {
        self.entries.write().remove(&id)
    }

    pub fn contains(&self, id: RegistrationId) -> bool {
        self.entries.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn with<R>(&self, id: RegistrationId, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.entries.read().get(&id).map(f)
    }

    pub fn with_mut<R>(&self, id: RegistrationId, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.entries.write().get_mut(&id).map(f)
    }

    pub fn retain(&self, mut keep: impl FnMut(RegistrationId, &T) -> bool) {
        self.entries.write().retain(|id, v| keep(*id, v));
    }

    pub fn ids(&self) -> Vec<RegistrationId> {
        self.entries.read().keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_strictly_increasing() {
        let gen = RegistrationIdGenerator::default();
        let a = gen.next();
        let b = gen.next();
        assert!(b.value() > a.value());
    }

    #[test]
    fn insert_lookup_remove_round_trips() {
        let registry: Registry<&'static str> = Registry::new();
        let gen = RegistrationIdGenerator::default();
        let id = gen.next();
        registry.insert(id, "publication");
        assert_eq!(registry.with(id, |v| *v), Some("publication"));
        assert_eq!(registry.remove(id), Some("publication"));
        assert!(!registry.contains(id));
    }

    #[test]
    fn retain_drops_entries_failing_the_predicate() {
        let registry: Registry<i32> = Registry::new();
        let gen = RegistrationIdGenerator::default();
        let keep = gen.next();
        let drop = gen.next();
        registry.insert(keep, 1);
        registry.insert(drop, 2);
        registry.retain(|_, v| *v == 1);
        assert!(registry.contains(keep));
        assert!(!registry.contains(drop));
    }
}
