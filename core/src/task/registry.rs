//! Task registry: the vault-wide task collection.
//!
//! The registry exclusively owns the [`TaskCollection`] and exposes it as
//! read-only snapshots through a reactive store. It is refreshed two ways:
//! a full reload at startup, and per-document updates driven by vault
//! change notifications — a single edit never forces a full rescan.
//!
//! After each per-document update the registry resyncs the active-task
//! tracker: if the tracked pointer carries a block anchor that still
//! exists in the fresh records, the refreshed field values are pushed into
//! the pointer so displayed task text follows live edits without a
//! reselect.

use std::path::Path;

use tracing::{debug, info, warn};

use crate::notice::{Notice, Notices};
use crate::store::{Store, Subscription};
use crate::task::parser::{Dialect, TaskParser};
use crate::task::tracker::ActiveTaskTracker;
use crate::task::TaskCollection;
use crate::vault::{ListItem, Vault};

/// Maintains the full, file-scoped collection of parsed task records.
#[derive(Debug)]
pub struct TaskRegistry {
    parser: TaskParser,
    store: Store<TaskCollection>,
    tracker: ActiveTaskTracker,
    notices: Notices,
}

impl TaskRegistry {
    /// Creates an empty registry for the given dialect.
    #[must_use]
    pub fn new(dialect: Dialect, tracker: ActiveTaskTracker, notices: Notices) -> Self {
        Self {
            parser: TaskParser::new(dialect),
            store: Store::new(TaskCollection::new()),
            tracker,
            notices,
        }
    }

    /// Snapshot of the current collection.
    #[must_use]
    pub fn collection(&self) -> TaskCollection {
        self.store.get()
    }

    /// Registers a subscriber on the collection.
    #[must_use]
    pub fn subscribe(
        &self,
        callback: impl Fn(&TaskCollection) + Send + Sync + 'static,
    ) -> Subscription {
        self.store.subscribe(callback)
    }

    /// Re-parses every document in the vault and replaces the entire
    /// collection.
    ///
    /// A document that fails to read is skipped with a warning; it never
    /// aborts processing of the remaining documents.
    pub fn reload(&self, vault: &dyn Vault) {
        let documents = match vault.list_documents() {
            Ok(documents) => documents,
            Err(e) => {
                warn!(error = %e, "Vault scan failed, keeping previous collection");
                return;
            }
        };

        let mut records = Vec::new();
        let mut skipped = 0usize;
        for path in &documents {
            let text = match vault.read_document(path) {
                Ok(text) => text,
                Err(e) => {
                    self.notices.emit(Notice::DocumentSkipped {
                        path: path.clone(),
                        message: e.to_string(),
                    });
                    skipped += 1;
                    continue;
                }
            };
            let items = vault.metadata_index(&text);
            records.extend(self.parser.parse_document(path, &text, &items));
        }

        info!(
            documents = documents.len(),
            skipped,
            tasks = records.len(),
            "Task collection reloaded"
        );
        self.store.update(|collection| collection.replace_all(records));
    }

    /// Re-parses a single document and replaces its slice of the
    /// collection, then resyncs the active-task pointer.
    pub fn update_document(&self, path: &Path, text: &str, items: &[ListItem]) {
        let records = self.parser.parse_document(path, text, items);
        debug!(
            path = %path.display(),
            tasks = records.len(),
            "Document slice replaced"
        );
        self.store
            .update(|collection| collection.replace_document(path, records));
        self.resync_tracker();
    }

    /// Drops a removed document's records from the collection.
    pub fn remove_document(&self, path: &Path) {
        self.store
            .update(|collection| collection.replace_document(path, Vec::new()));
        debug!(path = %path.display(), "Document records dropped");
    }

    /// Pushes refreshed field values into the tracker when its anchor
    /// still resolves. A miss leaves the tracker's snapshot untouched.
    fn resync_tracker(&self) {
        let Some(anchor) = self.tracker.anchor() else {
            return;
        };
        let collection = self.store.get();
        if let Some(found) = collection.find_by_anchor(&anchor) {
            self.tracker.sync(found.clone());
        } else {
            debug!(anchor, "Active task anchor not found after update");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::{index_list_items, FsVault};
    use std::fs;
    use tempfile::TempDir;

    fn seeded_vault() -> (TempDir, FsVault) {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("alpha.md"),
            "- [ ] first task ^a1\n- [ ] second task\n",
        )
        .unwrap();
        fs::write(dir.path().join("beta.md"), "- [x] finished ^b1\n").unwrap();
        let vault = FsVault::open(dir.path().to_path_buf(), None).unwrap();
        (dir, vault)
    }

    #[test]
    fn reload_populates_collection() {
        let (_dir, vault) = seeded_vault();
        let registry = TaskRegistry::new(Dialect::Tasks, ActiveTaskTracker::new(), Notices::disabled());

        registry.reload(&vault);

        let collection = registry.collection();
        assert_eq!(collection.len(), 3);
        assert!(collection.find_by_anchor("a1").is_some());
        assert!(collection.find_by_anchor("b1").is_some());
    }

    #[test]
    fn update_document_replaces_only_that_slice() {
        let (dir, vault) = seeded_vault();
        let registry = TaskRegistry::new(Dialect::Tasks, ActiveTaskTracker::new(), Notices::disabled());
        registry.reload(&vault);

        let path = dir.path().join("alpha.md");
        let text = "- [ ] rewritten ^a9\n";
        registry.update_document(&path, text, &index_list_items(text));

        let collection = registry.collection();
        assert_eq!(collection.len(), 2);
        assert!(collection.find_by_anchor("a9").is_some());
        assert!(collection.find_by_anchor("a1").is_none());
        assert!(collection.find_by_anchor("b1").is_some());
    }

    #[test]
    fn update_resyncs_tracker_by_anchor() {
        let (dir, vault) = seeded_vault();
        let tracker = ActiveTaskTracker::new();
        let registry = TaskRegistry::new(Dialect::Tasks, tracker.clone(), Notices::disabled());
        registry.reload(&vault);

        let original = registry.collection().find_by_anchor("a1").unwrap().clone();
        tracker.activate(original);

        let path = dir.path().join("alpha.md");
        let text = "- [ ] first task, edited (actual/expected:: 1/2) ^a1\n";
        registry.update_document(&path, text, &index_list_items(text));

        let active = tracker.snapshot().unwrap();
        assert_eq!(active.task.description, "first task, edited");
        assert_eq!(active.task.actual, 1);
        assert_eq!(active.task.expected, 2);
    }

    #[test]
    fn update_with_deleted_anchor_keeps_tracker_snapshot() {
        // Scenario: the tracked line is deleted; the displayed snapshot
        // must remain the last value observed.
        let (dir, vault) = seeded_vault();
        let tracker = ActiveTaskTracker::new();
        let registry = TaskRegistry::new(Dialect::Tasks, tracker.clone(), Notices::disabled());
        registry.reload(&vault);

        tracker.activate(registry.collection().find_by_anchor("a1").unwrap().clone());

        let path = dir.path().join("alpha.md");
        let text = "- [ ] unrelated replacement\n";
        registry.update_document(&path, text, &index_list_items(text));

        let active = tracker.snapshot().unwrap();
        assert_eq!(active.task.description, "first task");
        assert!(registry.collection().find_by_anchor("a1").is_none());
    }

    #[test]
    fn remove_document_drops_its_records() {
        let (dir, vault) = seeded_vault();
        let registry = TaskRegistry::new(Dialect::Tasks, ActiveTaskTracker::new(), Notices::disabled());
        registry.reload(&vault);

        registry.remove_document(&dir.path().join("beta.md"));

        let collection = registry.collection();
        assert_eq!(collection.len(), 2);
        assert!(collection.find_by_anchor("b1").is_none());
    }

    #[test]
    fn reload_skips_unreadable_documents() {
        let (dir, vault) = seeded_vault();
        // Invalid UTF-8 makes read_to_string fail for this entry.
        fs::write(dir.path().join("broken.md"), [0xFF, 0xFE, 0x00, 0xFF]).unwrap();

        let registry = TaskRegistry::new(Dialect::Tasks, ActiveTaskTracker::new(), Notices::disabled());
        registry.reload(&vault);

        assert_eq!(registry.collection().len(), 3);
    }

    #[test]
    fn reload_reports_skipped_documents() {
        let (dir, vault) = seeded_vault();
        fs::write(dir.path().join("broken.md"), [0xFF, 0xFE, 0x00, 0xFF]).unwrap();

        let (notices, mut rx) = Notices::channel();
        let registry = TaskRegistry::new(Dialect::Tasks, ActiveTaskTracker::new(), notices);
        registry.reload(&vault);

        match rx.try_recv().expect("skip should be reported") {
            Notice::DocumentSkipped { path, .. } => {
                assert_eq!(path, dir.path().join("broken.md"));
            }
            other => panic!("unexpected notice: {other:?}"),
        }
    }
}
