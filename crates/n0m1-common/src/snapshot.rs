//! Immutable configuration snapshots replaced as a whole on reload.

use parking_lot::RwLock;
use std::sync::Arc;

/// Shared cell holding the current configuration snapshot.
///
/// Readers take an `Arc` to the snapshot they started with and keep using it
/// for the rest of their step; `replace` installs a new snapshot for the
/// next reader. A snapshot is never mutated in place.
#[derive(Debug)]
pub struct Snapshot<T> {
    current: Arc<RwLock<Arc<T>>>,
}

impl<T> Clone for Snapshot<T> {
    fn clone(&self) -> Self {
        Self {
            current: Arc::clone(&self.current),
        }
    }
}

impl<T> Snapshot<T> {
    pub fn new(value: T) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(value))),
        }
    }

    /// Returns the snapshot that is current right now.
    pub fn load(&self) -> Arc<T> {
        Arc::clone(&self.current.read())
    }

    /// Installs `value` and returns the snapshot it replaced.
    pub fn replace(&self, value: T) -> Arc<T> {
        let mut guard = self.current.write();
        std::mem::replace(&mut *guard, Arc::new(value))
    }
}
