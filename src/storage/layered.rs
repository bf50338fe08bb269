// ============================================================================
// Layered Storage
// ============================================================================
//
// A stack of storage frames composing per-request context. Writes always go
// to the top frame; reads fall back down the chain, so a nested scope can
// shadow attributes without mutating the scopes below it.

use std::any::Any;
use std::sync::Arc;

use crate::core::StorageError;
use crate::storage::frame::{Frame, Slot, StoredValue};

/// Versioned frame stack with parent-chain attribute lookup.
///
/// # Examples
///
/// ```
/// use webloom::storage::LayeredStorage;
///
/// let mut storage = LayeredStorage::new();
/// storage.set("namespace", "docs".to_string());
///
/// storage.push_frame();
/// storage.set("namespace", "docs.admin".to_string());
/// assert_eq!(*storage.get::<String>("namespace").unwrap(), "docs.admin");
///
/// storage.pop_frame();
/// assert_eq!(*storage.get::<String>("namespace").unwrap(), "docs");
/// ```
pub struct LayeredStorage {
    frames: Vec<Frame>,
}

impl LayeredStorage {
    pub fn new() -> Self {
        Self {
            frames: vec![Frame::new()],
        }
    }

    /// Opens a nested scope. Subsequent writes land in the new frame.
    pub fn push_frame(&mut self) -> &mut Frame {
        self.frames.push(Frame::new());
        self.top_mut()
    }

    /// Discards the top frame together with its memoized values. The root
    /// frame is never popped.
    pub fn pop_frame(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn root(&self) -> &Frame {
        &self.frames[0]
    }

    pub fn root_mut(&mut self) -> &mut Frame {
        &mut self.frames[0]
    }

    pub fn top(&self) -> &Frame {
        // frames always holds at least the root
        self.frames.last().expect("root frame")
    }

    pub fn top_mut(&mut self) -> &mut Frame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    /// Stores an attribute in the top frame.
    pub fn set<T: Any + Send + Sync>(&mut self, name: impl Into<String>, value: T) {
        self.top_mut().set(name, value);
    }

    /// Registers a lazily computed attribute on the top frame.
    pub fn set_lazy<F>(&mut self, name: impl Into<String>, compute: F)
    where
        F: Fn(&LayeredStorage) -> StoredValue + Send + Sync + 'static,
    {
        self.top_mut().set_lazy(name, compute);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.frames.iter().any(|frame| frame.contains(name))
    }

    /// Looks the attribute up from the top frame down the parent chain.
    /// Lazy attributes are computed on first access and memoized on the
    /// frame that defines them.
    pub fn get_raw(&self, name: &str) -> Result<StoredValue, StorageError> {
        for frame in self.frames.iter().rev() {
            match frame.slot(name) {
                Some(Slot::Eager(value)) => return Ok(value.clone()),
                Some(Slot::Lazy(compute)) => {
                    if let Some(value) = frame.memoized(name) {
                        return Ok(value);
                    }
                    let compute = compute.clone();
                    let value = compute(self);
                    frame.memoize(name, value.clone());
                    return Ok(value);
                }
                None => continue,
            }
        }
        Err(StorageError::AttributeNotFound(name.to_owned()))
    }

    /// Typed lookup. Fails with `WrongType` when the attribute exists but
    /// holds a value of another type.
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, StorageError> {
        self.get_raw(name)?
            .downcast::<T>()
            .map_err(|_| StorageError::WrongType {
                name: name.to_owned(),
                expected: std::any::type_name::<T>(),
            })
    }

    /// Typed lookup that treats both "absent" and "wrong type" as `None`.
    pub fn try_get<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.get(name).ok()
    }
}

impl Default for LayeredStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LayeredStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayeredStorage")
            .field("frames", &self.frames)
            .finish()
    }
}
