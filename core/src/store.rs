//! Reactive state container.
//!
//! A [`Store`] holds a single value, applies pure transformations to it
//! through [`Store::update`], and notifies subscribers with a snapshot of
//! the new value after every change. Business logic lives in the
//! transformation closures; subscriber callbacks only observe.
//!
//! Cloning a `Store` produces another handle to the same underlying state,
//! so components can share one store without sharing a mutable alias.
//!
//! # Example
//!
//! ```
//! use pomonote_core::store::Store;
//!
//! let store = Store::new(0u32);
//! let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
//! let seen_clone = std::sync::Arc::clone(&seen);
//!
//! let sub = store.subscribe(move |value| {
//!     seen_clone.lock().unwrap().push(*value);
//! });
//!
//! store.update(|value| *value += 1);
//! store.update(|value| *value += 1);
//! drop(sub);
//! store.update(|value| *value += 1);
//!
//! // Initial snapshot plus the two updates observed before unsubscribe.
//! assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
//! assert_eq!(store.get(), 3);
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

type Callback<T> = Box<dyn Fn(&T) + Send + Sync>;

struct StoreInner<T> {
    value: RwLock<T>,
    subscribers: Mutex<HashMap<u64, Callback<T>>>,
    next_id: AtomicU64,
}

/// An observable state holder.
pub struct Store<T> {
    inner: Arc<StoreInner<T>>,
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("value", &*self.inner.value.read())
            .finish_non_exhaustive()
    }
}

impl<T: Clone + Send + Sync + 'static> Store<T> {
    /// Creates a store holding `initial`.
    #[must_use]
    pub fn new(initial: T) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                value: RwLock::new(initial),
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Returns a snapshot of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Replaces the value and notifies subscribers.
    pub fn set(&self, value: T) {
        self.update(|current| *current = value);
    }

    /// Applies a transformation to the value and notifies subscribers with
    /// the result.
    ///
    /// The value lock is released before any callback runs, so callbacks
    /// may freely call [`Store::get`].
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let snapshot = {
            let mut guard = self.inner.value.write();
            f(&mut guard);
            guard.clone()
        };
        self.notify(&snapshot);
    }

    /// Registers a subscriber callback.
    ///
    /// The callback is invoked immediately with the current value, then
    /// once after every update. Dropping the returned [`Subscription`]
    /// unsubscribes.
    #[must_use]
    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let snapshot = self.inner.value.read().clone();
        callback(&snapshot);
        self.inner
            .subscribers
            .lock()
            .insert(id, Box::new(callback));

        let weak: Weak<StoreInner<T>> = Arc::downgrade(&self.inner);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.subscribers.lock().remove(&id);
                }
            })),
        }
    }

    fn notify(&self, snapshot: &T) {
        let subscribers = self.inner.subscribers.lock();
        for callback in subscribers.values() {
            callback(snapshot);
        }
    }
}

/// Handle for an active subscription. Unsubscribes on drop.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Explicitly ends the subscription.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
