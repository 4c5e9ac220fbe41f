//! Normalized entity store.
//!
//! One map per entity kind, each slot holding either a value or a retained
//! fetch failure. Absence is a real state too: "never asked" is different
//! from "asked and it failed".

use std::collections::HashMap;
use std::hash::Hash;
use syllabus_core::ErrorMark;

/// State of one entity slot.
///
/// An explicit tagged union rather than a runtime type check on the stored
/// value, so call sites are forced to handle all three states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntitySlot<V> {
    /// No fetch has populated this slot.
    Absent,
    /// The entity as last seen from the backend (or a mutation response).
    Value(V),
    /// The last fetch for this entity failed; retained in place of data.
    Errored(ErrorMark),
}

impl<V> EntitySlot<V> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn is_value(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    pub fn is_errored(&self) -> bool {
        matches!(self, Self::Errored(_))
    }

    /// The value, if this slot holds one.
    pub fn value(&self) -> Option<&V> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<V> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    /// The retained failure, if this slot holds one.
    pub fn error(&self) -> Option<&ErrorMark> {
        match self {
            Self::Errored(mark) => Some(mark),
            _ => None,
        }
    }
}

/// Map of entity id to slot. `Absent` is represented by a missing key and
/// materialized on read.
#[derive(Debug)]
pub struct EntityStore<K, V> {
    slots: HashMap<K, EntitySlot<V>>,
}

impl<K, V> Default for EntityStore<K, V> {
    fn default() -> Self {
        Self {
            slots: HashMap::new(),
        }
    }
}

impl<K, V> EntityStore<K, V>
where
    K: Eq + Hash + Copy,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            slots: HashMap::new(),
        }
    }

    /// Snapshot of a slot. Misses materialize as `Absent`.
    pub fn get(&self, id: K) -> EntitySlot<V> {
        self.slots.get(&id).cloned().unwrap_or(EntitySlot::Absent)
    }

    /// Borrow the value in a slot, if the slot holds one.
    pub fn value(&self, id: K) -> Option<&V> {
        self.slots.get(&id).and_then(EntitySlot::value)
    }

    /// Overwrite a slot with a value, unconditionally.
    pub fn put(&mut self, id: K, value: V) {
        self.slots.insert(id, EntitySlot::Value(value));
    }

    /// Overwrite a slot with a retained fetch failure.
    pub fn put_error(&mut self, id: K, mark: ErrorMark) {
        self.slots.insert(id, EntitySlot::Errored(mark));
    }

    /// Delete a slot entirely; subsequent reads see `Absent`.
    pub fn remove(&mut self, id: K) {
        self.slots.remove(&id);
    }

    pub fn contains_value(&self, id: K) -> bool {
        self.value(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
