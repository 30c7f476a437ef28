//! Active-task tracker.
//!
//! Holds at most one "currently timed" task. The pointer is a lookup key
//! (block anchor, with a path+line fallback), never an aliasing reference
//! into registry-owned memory: the tracker keeps its own snapshot of the
//! record, and [`ActiveTaskTracker::resolve`] re-resolves that key freshly
//! against the authoritative collection on every read.
//!
//! "No active task" is a valid, common state; consumers substitute the
//! neutral placeholder record when they need task facts regardless.

use crate::store::{Store, Subscription};
use crate::task::{TaskCollection, TaskRecord};

/// The tracked task snapshot plus its pin flag.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveTask {
    /// Owned snapshot of the task record at last sync.
    pub task: TaskRecord,
    /// A pinned task survives a timer reset instead of being cleared.
    pub pinned: bool,
}

/// Holder of the single active-task pointer.
#[derive(Debug, Clone)]
pub struct ActiveTaskTracker {
    store: Store<Option<ActiveTask>>,
}

impl Default for ActiveTaskTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ActiveTaskTracker {
    /// Creates a tracker with no active task.
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: Store::new(None),
        }
    }

    /// Replaces the pointer with `task`, unpinned.
    pub fn activate(&self, task: TaskRecord) {
        self.store.set(Some(ActiveTask {
            task,
            pinned: false,
        }));
    }

    /// Empties the pointer.
    pub fn clear(&self) {
        self.store.set(None);
    }

    /// Replaces the snapshot in place without changing identity.
    ///
    /// Used by the registry after a document edit to push refreshed field
    /// values for the same anchor. The pin flag is preserved. A no-op when
    /// nothing is active.
    pub fn sync(&self, task: TaskRecord) {
        self.store.update(|current| {
            if let Some(active) = current.as_mut() {
                active.task = task;
            }
        });
    }

    /// Local-only edit of the snapshot's description.
    ///
    /// Does not write through to the source document; that is a host-level
    /// affordance.
    pub fn rename(&self, description: &str) {
        self.store.update(|current| {
            if let Some(active) = current.as_mut() {
                active.task.description = description.to_string();
            }
        });
    }

    /// Sets the pin flag on the current task, if any.
    pub fn set_pinned(&self, pinned: bool) {
        self.store.update(|current| {
            if let Some(active) = current.as_mut() {
                active.pinned = pinned;
            }
        });
    }

    /// Whether the current task is pinned. `false` when nothing is active.
    #[must_use]
    pub fn is_pinned(&self) -> bool {
        self.store.get().is_some_and(|active| active.pinned)
    }

    /// Snaps the current pointer state.
    #[must_use]
    pub fn snapshot(&self) -> Option<ActiveTask> {
        self.store.get()
    }

    /// The current task's block anchor, if any.
    #[must_use]
    pub fn anchor(&self) -> Option<String> {
        self.store
            .get()
            .and_then(|active| active.task.block_anchor)
    }

    /// Re-resolves the pointer against `collection`.
    ///
    /// Resolution is by block anchor first, then by path+line. A miss
    /// returns `None` but leaves the stored snapshot untouched, so the
    /// last-known values remain available for display.
    #[must_use]
    pub fn resolve(&self, collection: &TaskCollection) -> Option<TaskRecord> {
        let active = self.store.get()?;
        if let Some(anchor) = active.task.block_anchor.as_deref() {
            if let Some(found) = collection.find_by_anchor(anchor) {
                return Some(found.clone());
            }
        }
        collection
            .find_by_position(&active.task.path, active.task.line)
            .cloned()
    }

    /// Registers a subscriber on the pointer state.
    #[must_use]
    pub fn subscribe(
        &self,
        callback: impl Fn(&Option<ActiveTask>) + Send + Sync + 'static,
    ) -> Subscription {
        self.store.subscribe(callback)
    }
}
