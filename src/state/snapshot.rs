//! Immutable, structurally shared state snapshots.
//!
//! A `Snapshot` is one published version of the store's full key/value
//! state. Cloning is an O(1) pointer bump, so adopting a snapshot (the
//! replay path's hot operation) never copies data. Deriving a new snapshot
//! with `with`/`with_entries` clones the key map but shares every unchanged
//! value node, and the source snapshot stays valid and untouched.

use crate::types::StateMap;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// One immutable version of the store's full state.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    entries: Arc<BTreeMap<String, Arc<Value>>>,
}

impl Snapshot {
    /// Empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from a plain mapping, deep-copying every value.
    pub fn from_map(map: &StateMap) -> Self {
        let entries = map
            .iter()
            .map(|(key, value)| (key.clone(), Arc::new(value.clone())))
            .collect();
        Self {
            entries: Arc::new(entries),
        }
    }

    /// Look up a value by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key).map(Arc::as_ref)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Derive a new snapshot with one key replaced.
    pub fn with(&self, key: &str, value: Value) -> Self {
        let mut entries = BTreeMap::clone(&self.entries);
        entries.insert(key.to_string(), Arc::new(value));
        Self {
            entries: Arc::new(entries),
        }
    }

    /// Derive a new snapshot with every key in `updates` overwritten.
    pub fn with_entries(&self, updates: &StateMap) -> Self {
        let mut entries = BTreeMap::clone(&self.entries);
        for (key, value) in updates {
            entries.insert(key.clone(), Arc::new(value.clone()));
        }
        Self {
            entries: Arc::new(entries),
        }
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_ref()))
    }

    /// Iterate keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Defensive full copy as a plain mapping.
    ///
    /// The returned map is independently mutable; changing it never affects
    /// this snapshot or the store it came from.
    pub fn to_map(&self) -> StateMap {
        self.entries
            .iter()
            .map(|(key, value)| (key.clone(), Value::clone(value)))
            .collect()
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
