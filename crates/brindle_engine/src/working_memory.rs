//! Fact storage for a session.
//!
//! Facts and globals live in persistent maps, so snapshotting a session or
//! handing a read-only view to the network is cheap.

use std::sync::Arc;

use brindle_foundation::{FactHandle, LtMap, Object, Result, Value};
use brindle_language::{FactView, RuntimeContext};

/// The facts and global values of one session.
#[derive(Clone, Debug)]
pub struct WorkingMemory {
    facts: LtMap<FactHandle, Object>,
    globals: LtMap<Arc<str>, Value>,
    next_handle: FactHandle,
}

impl Default for WorkingMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkingMemory {
    /// Creates an empty memory. The first handle is 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            facts: LtMap::new(),
            globals: LtMap::new(),
            next_handle: FactHandle::new(1),
        }
    }

    /// Allocates a fresh handle. Handles are never reused.
    pub fn allocate(&mut self) -> FactHandle {
        let handle = self.next_handle;
        self.next_handle = handle.next();
        handle
    }

    /// Stores (or replaces) the fact under `handle`.
    pub fn put(&mut self, handle: FactHandle, fact: Object) {
        self.facts = self.facts.insert(handle, fact);
        if handle >= self.next_handle {
            self.next_handle = handle.next();
        }
    }

    /// Removes a fact, returning it.
    pub fn remove(&mut self, handle: FactHandle) -> Option<Object> {
        let fact = self.facts.get(&handle).cloned()?;
        self.facts = self.facts.remove(&handle);
        Some(fact)
    }

    /// Returns a fact.
    #[must_use]
    pub fn get(&self, handle: FactHandle) -> Option<&Object> {
        self.facts.get(&handle)
    }

    /// Returns true if the handle refers to a live fact.
    #[must_use]
    pub fn contains(&self, handle: FactHandle) -> bool {
        self.facts.contains_key(&handle)
    }

    /// Iterates over facts in handle order.
    pub fn iter(&self) -> impl Iterator<Item = (FactHandle, &Object)> {
        self.facts.iter().map(|(handle, fact)| (*handle, fact))
    }

    /// Returns the number of facts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.facts.len()
    }

    /// Returns true if there are no facts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Returns the handle the next insert will get.
    #[must_use]
    pub fn next_handle(&self) -> FactHandle {
        self.next_handle
    }

    /// Moves the handle counter forward (never back).
    pub fn reserve_until(&mut self, next: FactHandle) {
        if next > self.next_handle {
            self.next_handle = next;
        }
    }

    /// Returns a global's value, if it has been set.
    #[must_use]
    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// Sets a global's value.
    pub fn set_global(&mut self, name: &str, value: Value) {
        self.globals = self.globals.insert(Arc::from(name), value);
    }

    /// Iterates over set globals in name order.
    pub fn globals(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.globals.iter().map(|(name, value)| (&**name, value))
    }
}

impl FactView for WorkingMemory {
    fn fact(&self, handle: FactHandle) -> Option<&Object> {
        self.get(handle)
    }

    fn global(&self, name: &str) -> Option<&Value> {
        WorkingMemory::global(self, name)
    }
}

impl RuntimeContext for WorkingMemory {
    fn set_global(&mut self, name: &str, value: Value) -> Result<()> {
        WorkingMemory::set_global(self, name, value);
        Ok(())
    }
}
