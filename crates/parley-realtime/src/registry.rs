//! Thread-safe subscriber bookkeeping.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Handle returned when a subscriber is registered.
///
/// Ids increase monotonically from 1 and are only reused after
/// [`SubscriberRegistry::clear`] resets the counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Entries<H: ?Sized> {
    counter: u64,
    handlers: BTreeMap<u64, Arc<H>>,
}

/// Registry mapping subscription ids to handlers.
///
/// Every operation takes the same lock for a single map operation. Dispatch
/// works on [`snapshot`](Self::snapshot), so handlers can add or remove
/// subscribers while an event is being delivered.
pub struct SubscriberRegistry<H: ?Sized> {
    entries: Mutex<Entries<H>>,
}

impl<H: ?Sized> std::fmt::Debug for SubscriberRegistry<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.entries.lock();
        f.debug_struct("SubscriberRegistry")
            .field("counter", &entries.counter)
            .field("len", &entries.handlers.len())
            .finish()
    }
}

impl<H: ?Sized> SubscriberRegistry<H> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Entries {
                counter: 0,
                handlers: BTreeMap::new(),
            }),
        }
    }

    /// Register a handler and return its id.
    pub fn add(&self, handler: Arc<H>) -> SubscriptionId {
        let mut entries = self.entries.lock();
        entries.counter += 1;
        let id = entries.counter;
        entries.handlers.insert(id, handler);
        SubscriptionId(id)
    }

    /// Reserve the next id without registering anything.
    ///
    /// Lets several registries draw ids from this one counter.
    pub fn allocate(&self) -> SubscriptionId {
        let mut entries = self.entries.lock();
        entries.counter += 1;
        SubscriptionId(entries.counter)
    }

    /// Register a handler under an id reserved with [`allocate`](Self::allocate)
    /// on some registry. Returns `false`, leaving the registry untouched, if
    /// the id is already taken here.
    pub fn insert(&self, id: SubscriptionId, handler: Arc<H>) -> bool {
        let mut entries = self.entries.lock();
        if entries.handlers.contains_key(&id.0) {
            return false;
        }
        entries.handlers.insert(id.0, handler);
        true
    }

    /// Remove a handler. Unknown ids are ignored.
    ///
    /// Returns whether an entry was removed.
    pub fn remove(&self, id: SubscriptionId) -> bool {
        self.entries.lock().handlers.remove(&id.0).is_some()
    }

    /// Copy of the live handlers, most recently added first.
    pub fn snapshot(&self) -> Vec<Arc<H>> {
        self.entries.lock().handlers.values().rev().cloned().collect()
    }

    /// Drop every handler and reset the id counter.
    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        entries.handlers.clear();
        entries.counter = 0;
    }

    /// Whether an id is currently registered.
    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.entries.lock().handlers.contains_key(&id.0)
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.entries.lock().handlers.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<H: ?Sized> Default for SubscriberRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}
