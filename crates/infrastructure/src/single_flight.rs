//! Request coalescing for identical cache misses
//!
//! When several callers miss the cache for the same key at the same time,
//! only the first (the leader) runs the fetch. The others wait on the same
//! slot and receive a clone of the leader's result. If the leader is
//! cancelled before it finishes, the next waiter runs its own fetch instead.

use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, Weak},
};

use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::trace;

type Slot<T> = AsyncMutex<Option<T>>;

/// Deduplicates concurrent work by string key
pub struct SingleFlight<T> {
    slots: Mutex<HashMap<String, Weak<Slot<T>>>>,
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> std::fmt::Debug for SingleFlight<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlight")
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl<T: Clone> SingleFlight<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `func` unless a call with the same key is already running, in
    /// which case wait for and share its result
    ///
    /// Results are not retained once every waiter has been served; a later
    /// call with the same key runs `func` again.
    pub async fn work<F, Fut>(&self, key: &str, func: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let slot = self.slot(key);
        let mut guard = slot.lock().await;
        if let Some(value) = guard.as_ref() {
            trace!(key, "Joined in-flight request");
            return value.clone();
        }

        let value = func().await;
        *guard = Some(value.clone());

        let mut slots = self.slots.lock();
        if slots
            .get(key)
            .is_some_and(|weak| std::ptr::eq(weak.as_ptr(), Arc::as_ptr(&slot)))
        {
            slots.remove(key);
        }
        value
    }

    fn slot(&self, key: &str) -> Arc<Slot<T>> {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get(key).and_then(Weak::upgrade) {
            return slot;
        }
        slots.retain(|_, weak| weak.strong_count() > 0);
        let slot = Arc::new(AsyncMutex::new(None));
        slots.insert(key.to_string(), Arc::downgrade(&slot));
        slot
    }
}

impl<T> SingleFlight<T> {
    /// Number of keys with a running or waiting call
    pub fn in_flight(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}
