//! Task records and the components that keep them current.
//!
//! - [`parser`]: extracts [`TaskRecord`]s from document text
//! - [`registry`]: maintains the vault-wide [`TaskCollection`]
//! - [`tracker`]: holds the single active-task pointer

pub mod parser;
pub mod registry;
pub mod tracker;

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Priority of a task, as authored inline in the task text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// No priority annotation.
    #[default]
    None,
    /// Low priority.
    Low,
    /// Medium priority.
    Medium,
    /// High priority.
    High,
}

/// One parsed actionable line item.
///
/// Records are created fresh every time their source document is parsed and
/// never mutated in place; a changed document produces a new generation of
/// records. Within a document a record is identified by line number; across
/// documents by `(path, block_anchor)` when the anchor is present.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Source document path. Empty for the neutral placeholder.
    pub path: PathBuf,
    /// Zero-based line number within the source document.
    pub line: usize,
    /// Raw line text as authored.
    pub text: String,
    /// Clean description with inline annotations stripped.
    pub description: String,
    /// Whether the checkbox is checked.
    pub checked: bool,
    /// Stable block anchor including the leading caret, e.g. `^abc1`.
    pub block_anchor: Option<String>,
    /// Raw status marker between the brackets.
    pub status: String,
    /// Creation date annotation.
    pub created: Option<NaiveDate>,
    /// Start date annotation.
    pub start: Option<NaiveDate>,
    /// Scheduled date annotation.
    pub scheduled: Option<NaiveDate>,
    /// Due date annotation.
    pub due: Option<NaiveDate>,
    /// Cancellation date annotation.
    pub cancelled: Option<NaiveDate>,
    /// Completion date annotation.
    pub done: Option<NaiveDate>,
    /// Priority annotation.
    pub priority: Priority,
    /// Recurrence rule, kept opaque.
    pub recurrence: Option<String>,
    /// Inline tags, without the leading `#`.
    pub tags: Vec<String>,
    /// Completed pomodoro count.
    pub actual: u32,
    /// Planned pomodoro count; 0 means unbounded.
    pub expected: u32,
}

impl TaskRecord {
    /// Builds the neutral placeholder used when no task is active.
    ///
    /// Carries the tracker's file path when known so the logger can still
    /// target the focused document; everything else is empty.
    #[must_use]
    pub fn placeholder(path: Option<PathBuf>) -> Self {
        Self {
            path: path.unwrap_or_default(),
            ..Self::default()
        }
    }

    /// Whether this record is the neutral placeholder (no source line).
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.text.is_empty() && self.block_anchor.is_none()
    }

    /// The block anchor without its leading caret, if present.
    #[must_use]
    pub fn anchor_id(&self) -> Option<&str> {
        self.block_anchor
            .as_deref()
            .map(|a| a.strip_prefix('^').unwrap_or(a))
    }
}

/// The vault-wide set of task records for the current process lifetime.
///
/// Holds at most one record per `(path, line)` for a given document
/// generation. Document updates replace that document's slice wholesale;
/// records of unaffected documents are carried over unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskCollection {
    records: Vec<TaskRecord>,
}

impl TaskCollection {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All records, in document-scan order.
    #[must_use]
    pub fn records(&self) -> &[TaskRecord] {
        &self.records
    }

    /// Number of records across all documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the collection holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Replaces the entire collection.
    pub fn replace_all(&mut self, records: Vec<TaskRecord>) {
        self.records = records;
    }

    /// Replaces one document's slice: removes its old records, then
    /// appends the new generation.
    pub fn replace_document(&mut self, path: &Path, records: Vec<TaskRecord>) {
        self.records.retain(|r| r.path != path);
        self.records.extend(records);
    }

    /// Finds a record by block anchor (with or without the leading caret).
    #[must_use]
    pub fn find_by_anchor(&self, anchor: &str) -> Option<&TaskRecord> {
        let wanted = anchor.strip_prefix('^').unwrap_or(anchor);
        self.records
            .iter()
            .find(|r| r.anchor_id() == Some(wanted))
    }

    /// Finds a record by source position.
    #[must_use]
    pub fn find_by_position(&self, path: &Path, line: usize) -> Option<&TaskRecord> {
        self.records.iter().find(|r| r.path == path && r.line == line)
    }
}
