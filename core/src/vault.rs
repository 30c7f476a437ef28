//! Document store contract and filesystem implementation.
//!
//! The core never touches the host application's documents directly; it
//! goes through the [`Vault`] trait, which mirrors the narrow contract the
//! host exposes: list, read, write, a structural list-item index, periodic
//! note resolution, and create-on-demand.
//!
//! [`FsVault`] backs that contract with a plain directory of markdown
//! files. [`VaultWatcher`] layers change notifications on top using the
//! [`notify`] crate: the notify callback is kept lightweight by sending raw
//! events through an internal channel to a dedicated async task, which
//! reads the changed document and computes its index before emitting a
//! [`VaultEvent`].

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Datelike, Local};
use notify::{
    event::{CreateKind, ModifyKind, RemoveKind},
    Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

/// Errors that can occur during vault operations.
#[derive(Error, Debug)]
pub enum VaultError {
    /// Failed to read or write a document.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The vault root directory does not exist or is inaccessible.
    #[error("vault directory does not exist: {0}")]
    DirectoryNotFound(PathBuf),

    /// Failed to initialize the file system watcher.
    #[error("failed to create watcher: {0}")]
    WatcherInit(#[from] notify::Error),
}

/// Result type for vault operations.
pub type Result<T> = std::result::Result<T, VaultError>;

/// One entry of a document's structural list-item index.
///
/// The index is the pre-computed view the host's metadata cache provides:
/// which lines are list items, whether each carries a checkbox, and the raw
/// checkbox marker string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListItem {
    /// Zero-based line number within the document.
    pub line: usize,
    /// Whether the list item carries a checkbox (`[ ]`, `[x]`, ...).
    pub is_task: bool,
    /// Raw status marker between the brackets, e.g. `" "` or `"x"`.
    pub marker: String,
}

/// Kinds of periodic notes the host can resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodicKind {
    /// One note per calendar day (`YYYY-MM-DD.md`).
    Daily,
    /// One note per ISO week (`YYYY-Www.md`).
    Weekly,
}

/// Narrow document-store contract the core depends on.
///
/// All methods are synchronous; callers that must not block (the daemon's
/// event loop) invoke them from spawned tasks holding only captured
/// snapshots.
pub trait Vault: Send + Sync {
    /// Lists every markdown document in the vault.
    fn list_documents(&self) -> Result<Vec<PathBuf>>;

    /// Reads a document's full text.
    fn read_document(&self, path: &Path) -> Result<String>;

    /// Replaces a document's full text.
    fn write_document(&self, path: &Path, text: &str) -> Result<()>;

    /// Resolves (creating if needed) the periodic note for `kind`.
    fn resolve_periodic_note(&self, kind: PeriodicKind) -> Result<PathBuf>;

    /// Ensures a document exists at `path`, creating it (and parent
    /// directories) if absent.
    fn ensure_document(&self, path: &Path) -> Result<PathBuf>;

    /// Computes the structural list-item index for a document's text.
    fn metadata_index(&self, text: &str) -> Vec<ListItem> {
        index_list_items(text)
    }
}

/// Builds the list-item index for a document.
///
/// A line is a list item when, after optional leading whitespace, it starts
/// with `- `, `* `, or `+ `. It is a task item when the marker is followed
/// by a bracketed status such as `[ ]` or `[x]`.
#[must_use]
pub fn index_list_items(text: &str) -> Vec<ListItem> {
    let mut items = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let trimmed = line.trim_start();
        let Some(rest) = trimmed
            .strip_prefix("- ")
            .or_else(|| trimmed.strip_prefix("* "))
            .or_else(|| trimmed.strip_prefix("+ "))
        else {
            continue;
        };

        let mut item = ListItem {
            line: line_no,
            is_task: false,
            marker: String::new(),
        };
        let rest = rest.trim_start();
        if let Some(after) = rest.strip_prefix('[') {
            if let Some(close) = after.find(']') {
                // Checkbox markers are a single character in practice, but
                // the index carries whatever sits between the brackets.
                item.is_task = true;
                item.marker = after[..close].to_string();
            }
        }
        items.push(item);
    }
    items
}

/// Filesystem-backed vault rooted at a directory of markdown files.
#[derive(Debug, Clone)]
pub struct FsVault {
    root: PathBuf,
    periodic_dir: PathBuf,
}

impl FsVault {
    /// Opens a vault rooted at `root`.
    ///
    /// Periodic notes are resolved under `periodic_dir` when given,
    /// otherwise directly under the vault root.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::DirectoryNotFound`] if `root` does not exist.
    pub fn open(root: PathBuf, periodic_dir: Option<PathBuf>) -> Result<Self> {
        if !root.is_dir() {
            return Err(VaultError::DirectoryNotFound(root));
        }
        let periodic_dir = periodic_dir.unwrap_or_else(|| root.clone());
        Ok(Self { root, periodic_dir })
    }

    /// Returns the vault root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Vault for FsVault {
    fn list_documents(&self) -> Result<Vec<PathBuf>> {
        let mut documents = Vec::new();
        scan_directory_recursive(&self.root, &mut documents)?;
        documents.sort();
        debug!(count = documents.len(), "Scanned vault documents");
        Ok(documents)
    }

    fn read_document(&self, path: &Path) -> Result<String> {
        Ok(fs::read_to_string(path)?)
    }

    fn write_document(&self, path: &Path, text: &str) -> Result<()> {
        fs::write(path, text)?;
        Ok(())
    }

    fn resolve_periodic_note(&self, kind: PeriodicKind) -> Result<PathBuf> {
        let now = Local::now();
        let name = match kind {
            PeriodicKind::Daily => format!("{}.md", now.format("%Y-%m-%d")),
            PeriodicKind::Weekly => {
                let week = now.iso_week();
                format!("{}-W{:02}.md", week.year(), week.week())
            }
        };
        self.ensure_document(&self.periodic_dir.join(name))
    }

    fn ensure_document(&self, path: &Path) -> Result<PathBuf> {
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, "")?;
            info!(path = %path.display(), "Created document");
        }
        Ok(path)
    }
}

/// Recursively collects `.md` files under `dir`.
fn scan_directory_recursive(dir: &Path, documents: &mut Vec<PathBuf>) -> Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            warn!(dir = %dir.display(), "Permission denied, skipping directory");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            scan_directory_recursive(&path, documents)?;
        } else if path.extension().is_some_and(|ext| ext == "md") {
            documents.push(path);
        }
    }

    Ok(())
}

/// Change notifications emitted by [`VaultWatcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultEvent {
    /// A document was created or its content changed. Carries the fresh
    /// text and list-item index so consumers never re-read the store.
    DocumentChanged {
        /// Path of the changed document.
        path: PathBuf,
        /// Full document text after the change.
        text: String,
        /// Structural list-item index of `text`.
        items: Vec<ListItem>,
    },

    /// A document was removed.
    DocumentRemoved(PathBuf),
}

/// Internal events from the notify callback, processed by the async task.
#[derive(Debug)]
enum InternalEvent {
    Changed(PathBuf),
    Removed(PathBuf),
}

/// File system watcher emitting [`VaultEvent`]s for markdown documents.
#[derive(Debug)]
pub struct VaultWatcher {
    /// Kept alive to maintain the watch subscription. Dropping this stops
    /// watching for events.
    #[allow(dead_code)]
    watcher: RecommendedWatcher,

    /// The root directory being watched.
    watch_dir: PathBuf,
}

impl VaultWatcher {
    /// Starts watching the vault's root directory recursively.
    ///
    /// # Errors
    ///
    /// Returns an error if the watch directory does not exist or the file
    /// system watcher cannot be initialized.
    pub fn new(watch_dir: PathBuf, event_sender: mpsc::Sender<VaultEvent>) -> Result<Self> {
        if !watch_dir.exists() {
            return Err(VaultError::DirectoryNotFound(watch_dir));
        }

        // Internal channel bridging the sync notify callback to the async
        // processing task.
        let (internal_tx, internal_rx) = mpsc::channel::<InternalEvent>(1000);

        tokio::spawn(async move {
            process_internal_events(internal_rx, event_sender).await;
        });

        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| {
                handle_notify_event(res, &internal_tx);
            },
            Config::default(),
        )?;
        watcher.watch(&watch_dir, RecursiveMode::Recursive)?;

        info!(watch_dir = %watch_dir.display(), "Started vault watch");

        Ok(Self { watcher, watch_dir })
    }

    /// Returns the directory being watched.
    #[must_use]
    pub fn watch_dir(&self) -> &Path {
        &self.watch_dir
    }
}

/// Handles events from the notify crate.
///
/// The callback only filters and forwards; all file I/O is done by the
/// async processing task.
fn handle_notify_event(
    res: std::result::Result<Event, notify::Error>,
    internal_tx: &mpsc::Sender<InternalEvent>,
) {
    let event = match res {
        Ok(event) => event,
        Err(e) => {
            error!(error = %e, "Vault watcher error");
            return;
        }
    };

    trace!(kind = ?event.kind, paths = ?event.paths, "Received notify event");

    for path in &event.paths {
        if path.extension().is_none_or(|ext| ext != "md") {
            continue;
        }

        let internal_event = match event.kind {
            EventKind::Create(CreateKind::File | CreateKind::Any)
            | EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any) => {
                Some(InternalEvent::Changed(path.clone()))
            }
            EventKind::Remove(RemoveKind::File | RemoveKind::Any) => {
                Some(InternalEvent::Removed(path.clone()))
            }
            _ => {
                trace!(kind = ?event.kind, path = %path.display(), "Ignoring event kind");
                None
            }
        };

        if let Some(evt) = internal_event {
            // try_send so the notify thread never blocks; a full channel
            // drops the event, which the next change will supersede.
            if let Err(e) = internal_tx.try_send(evt) {
                warn!(error = %e, "Failed to queue internal event, channel may be full");
            }
        }
    }
}

/// Async task reading changed documents and emitting vault events.
async fn process_internal_events(
    mut rx: mpsc::Receiver<InternalEvent>,
    sender: mpsc::Sender<VaultEvent>,
) {
    while let Some(event) = rx.recv().await {
        let vault_event = match event {
            InternalEvent::Changed(path) => match fs::read_to_string(&path) {
                Ok(text) => {
                    let items = index_list_items(&text);
                    debug!(
                        path = %path.display(),
                        items = items.len(),
                        "Document changed"
                    );
                    VaultEvent::DocumentChanged { path, text, items }
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to read changed document");
                    continue;
                }
            },
            InternalEvent::Removed(path) => {
                info!(path = %path.display(), "Document removed");
                VaultEvent::DocumentRemoved(path)
            }
        };

        if sender.send(vault_event).await.is_err() {
            debug!("Vault event receiver dropped, stopping processor");
            break;
        }
    }
}
