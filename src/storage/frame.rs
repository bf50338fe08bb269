// ============================================================================
// Storage Frame
// ============================================================================

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::storage::layered::LayeredStorage;

/// Type-erased value held by a storage frame.
pub type StoredValue = Arc<dyn Any + Send + Sync>;

/// Deferred computation for a lazily evaluated attribute.
pub type LazyValue = Arc<dyn Fn(&LayeredStorage) -> StoredValue + Send + Sync>;

pub(crate) enum Slot {
    Eager(StoredValue),
    Lazy(LazyValue),
}

/// One scope in a layered storage chain.
///
/// A frame owns the attributes written into its scope plus a private
/// memoization map for lazy attributes it defines. Parent frames are
/// reachable only through [`LayeredStorage`] lookup and are never mutated
/// from a child.
#[derive(Default)]
pub struct Frame {
    slots: HashMap<String, Slot>,
    // Results of lazy slots computed on this frame instance. Never promoted
    // to ancestor frames.
    memo: Mutex<HashMap<String, StoredValue>>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an attribute value in this frame, shadowing any parent value
    /// of the same name.
    pub fn set<T: Any + Send + Sync>(&mut self, name: impl Into<String>, value: T) {
        self.set_value(name, Arc::new(value));
    }

    pub fn set_value(&mut self, name: impl Into<String>, value: StoredValue) {
        self.slots.insert(name.into(), Slot::Eager(value));
    }

    /// Registers an attribute computed on first access and memoized on this
    /// frame instance.
    pub fn set_lazy<F>(&mut self, name: impl Into<String>, compute: F)
    where
        F: Fn(&LayeredStorage) -> StoredValue + Send + Sync + 'static,
    {
        self.slots.insert(name.into(), Slot::Lazy(Arc::new(compute)));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    pub(crate) fn slot(&self, name: &str) -> Option<&Slot> {
        self.slots.get(name)
    }

    pub(crate) fn memoized(&self, name: &str) -> Option<StoredValue> {
        self.memo
            .lock()
            .ok()
            .and_then(|memo| memo.get(name).cloned())
    }

    pub(crate) fn memoize(&self, name: &str, value: StoredValue) {
        if let Ok(mut memo) = self.memo.lock() {
            memo.insert(name.to_owned(), value);
        }
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.slots.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("Frame").field("attributes", &names).finish()
    }
}
