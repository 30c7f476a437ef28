//! Task parser: document text to [`TaskRecord`]s.
//!
//! Parsing is a pure function over a document's text plus its list-item
//! index. Every line flagged as a checkable task is split into a
//! components triple (status marker, free-text body, optional trailing
//! block anchor) by a line-shape grammar, and the body is handed to the
//! configured dialect's deserializer to extract inline field annotations.
//!
//! Parsing is tolerant end to end: lines that do not match the task shape
//! are skipped silently, and a body the dialect cannot make sense of still
//! yields a record with an empty description and zero counts. Nothing in
//! this module returns an error.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use chrono::NaiveDate;
use regex::Regex;
use tracing::trace;

use crate::task::{Priority, TaskRecord};
use crate::vault::ListItem;

/// Inline-annotation syntax for task metadata.
///
/// A closed set of variants selected by configuration; each implements the
/// same body-to-fields contract and is dispatched by a match, never by
/// runtime type inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    /// Emoji-keyed trailing annotations plus `(actual/expected:: a/e)`.
    #[default]
    Tasks,
    /// Bracketed `[key:: value]` / `(key:: value)` inline fields.
    Dataview,
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tasks" => Ok(Self::Tasks),
            "dataview" => Ok(Self::Dataview),
            other => Err(format!("unknown dialect '{other}', expected tasks|dataview")),
        }
    }
}

/// The components triple of a checkable task line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskComponents {
    /// Leading indentation, verbatim.
    pub indent: String,
    /// Status marker between the brackets.
    pub status: String,
    /// Free-text body between the status and the anchor.
    pub body: String,
    /// Trailing block anchor including the caret, if present.
    pub anchor: Option<String>,
}

/// Field values a dialect deserializer extracts from a task body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskFields {
    /// Clean description with annotations stripped.
    pub description: String,
    /// Creation date.
    pub created: Option<NaiveDate>,
    /// Start date.
    pub start: Option<NaiveDate>,
    /// Scheduled date.
    pub scheduled: Option<NaiveDate>,
    /// Due date.
    pub due: Option<NaiveDate>,
    /// Cancellation date.
    pub cancelled: Option<NaiveDate>,
    /// Completion date.
    pub done: Option<NaiveDate>,
    /// Priority.
    pub priority: Priority,
    /// Recurrence rule, opaque.
    pub recurrence: Option<String>,
    /// Tags without the leading `#`.
    pub tags: Vec<String>,
    /// Completed pomodoro count.
    pub actual: u32,
    /// Planned pomodoro count; 0 means unbounded.
    pub expected: u32,
}

/// Parser for one configured dialect, with its grammar compiled once.
#[derive(Debug)]
pub struct TaskParser {
    dialect: Dialect,
    line_shape: Regex,
    trailing_anchor: Regex,
    tag: Regex,
    whitespace_runs: Regex,
    // Tasks dialect: trailing annotations, tried repeatedly end-of-body.
    tasks_trailing: Vec<(TrailingKind, Regex)>,
    // Dataview dialect: one global inline-field matcher.
    dataview_field: Regex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrailingKind {
    Pomodoro,
    Created,
    Start,
    Scheduled,
    Due,
    Cancelled,
    Done,
    Priority,
    Recurrence,
    Tag,
}

const DATE: &str = r"(\d{4}-\d{2}-\d{2})";

impl TaskParser {
    /// Builds a parser for the given dialect.
    #[must_use]
    pub fn new(dialect: Dialect) -> Self {
        let date_trailing = |emoji: &str| format!(r"{emoji}\s*{DATE}\s*$");
        let tasks_trailing = vec![
            (
                TrailingKind::Pomodoro,
                Regex::new(r"\(actual/expected::\s*([0-9]*(?:/[0-9]*)?)\)\s*$")
                    .expect("invalid regex"),
            ),
            (
                TrailingKind::Created,
                Regex::new(&date_trailing("➕")).expect("invalid regex"),
            ),
            (
                TrailingKind::Start,
                Regex::new(&date_trailing("🛫")).expect("invalid regex"),
            ),
            (
                TrailingKind::Scheduled,
                Regex::new(&date_trailing("⏳")).expect("invalid regex"),
            ),
            (
                TrailingKind::Due,
                Regex::new(&date_trailing("📅")).expect("invalid regex"),
            ),
            (
                TrailingKind::Cancelled,
                Regex::new(&date_trailing("❌")).expect("invalid regex"),
            ),
            (
                TrailingKind::Done,
                Regex::new(&date_trailing("✅")).expect("invalid regex"),
            ),
            (
                TrailingKind::Priority,
                Regex::new(r"(⏫|🔼|🔽)\s*$").expect("invalid regex"),
            ),
            (
                TrailingKind::Recurrence,
                Regex::new(r"🔁\s*([A-Za-z0-9,! ]+?)\s*$").expect("invalid regex"),
            ),
            (
                TrailingKind::Tag,
                Regex::new(r"#([A-Za-z0-9_/-]+)\s*$").expect("invalid regex"),
            ),
        ];

        Self {
            dialect,
            line_shape: Regex::new(r"^(?P<indent>[ \t]*)[-*+] \[(?P<status>.)\][ \t]?(?P<body>.*)$")
                .expect("invalid regex"),
            trailing_anchor: Regex::new(r"\s*(\^[A-Za-z0-9_-]+)\s*$").expect("invalid regex"),
            tag: Regex::new(r"#([A-Za-z0-9_/-]+)").expect("invalid regex"),
            whitespace_runs: Regex::new(r"\s{2,}").expect("invalid regex"),
            tasks_trailing,
            dataview_field: Regex::new(
                r"[(\[]\s*([A-Za-z][A-Za-z0-9_/-]*)\s*::\s*([^)\]]*)[)\]]",
            )
            .expect("invalid regex"),
        }
    }

    /// The dialect this parser was built for.
    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Parses one document into task records.
    ///
    /// Only index entries flagged as checkable tasks are considered. When
    /// several index entries share a line number the last one wins, so the
    /// result holds at most one record per line.
    #[must_use]
    pub fn parse_document(
        &self,
        path: &Path,
        text: &str,
        items: &[ListItem],
    ) -> Vec<TaskRecord> {
        let lines: Vec<&str> = text.lines().collect();
        let mut by_line: BTreeMap<usize, TaskRecord> = BTreeMap::new();

        for item in items.iter().filter(|i| i.is_task) {
            let Some(line) = lines.get(item.line) else {
                trace!(line = item.line, "Index entry past end of document");
                continue;
            };
            let Some(components) = self.split_components(line) else {
                continue;
            };
            let fields = self.deserialize(&components.body);
            by_line.insert(
                item.line,
                TaskRecord {
                    path: path.to_path_buf(),
                    line: item.line,
                    text: (*line).to_string(),
                    description: fields.description,
                    checked: matches!(components.status.as_str(), "x" | "X"),
                    block_anchor: components.anchor,
                    status: components.status,
                    created: fields.created,
                    start: fields.start,
                    scheduled: fields.scheduled,
                    due: fields.due,
                    cancelled: fields.cancelled,
                    done: fields.done,
                    priority: fields.priority,
                    recurrence: fields.recurrence,
                    tags: fields.tags,
                    actual: fields.actual,
                    expected: fields.expected,
                },
            );
        }

        by_line.into_values().collect()
    }

    /// Splits a line into its components triple, or `None` when the line
    /// does not match the checkable-task shape.
    #[must_use]
    pub fn split_components(&self, line: &str) -> Option<TaskComponents> {
        let caps = self.line_shape.captures(line)?;
        let mut body = caps["body"].to_string();

        let anchor_match = self
            .trailing_anchor
            .captures(&body)
            .map(|anchor_caps| {
                let token = anchor_caps[1].to_string();
                let start = anchor_caps.get(0).map_or(body.len(), |m| m.start());
                (token, start)
            });
        let anchor = anchor_match.map(|(token, start)| {
            body.truncate(start);
            token
        });

        Some(TaskComponents {
            indent: caps["indent"].to_string(),
            status: caps["status"].to_string(),
            body: body.trim().to_string(),
            anchor,
        })
    }

    /// Extracts field annotations from a body using the configured
    /// dialect.
    #[must_use]
    pub fn deserialize(&self, body: &str) -> TaskFields {
        let mut fields = match self.dialect {
            Dialect::Tasks => self.deserialize_tasks(body),
            Dialect::Dataview => self.deserialize_dataview(body),
        };
        fields.tags.sort();
        fields.tags.dedup();
        fields
    }

    /// Tasks dialect: annotations live at the end of the body and are
    /// consumed right-to-left until none match.
    fn deserialize_tasks(&self, body: &str) -> TaskFields {
        let mut fields = TaskFields::default();
        let mut rest = body.trim_end().to_string();

        'strip: loop {
            for (kind, re) in &self.tasks_trailing {
                let Some(caps) = re.captures(&rest) else {
                    continue;
                };
                let value = caps.get(1).map(|m| m.as_str().to_string());
                let start = caps.get(0).map_or(0, |m| m.start());
                apply_field(&mut fields, *kind, value);
                rest.truncate(start);
                rest.truncate(rest.trim_end().len());
                continue 'strip;
            }
            break;
        }

        fields.description = self.clean_description(&rest);
        fields
    }

    /// Dataview dialect: `[key:: value]` fields may appear anywhere in the
    /// body; known keys are consumed, unknown ones stay in the
    /// description.
    fn deserialize_dataview(&self, body: &str) -> TaskFields {
        let mut fields = TaskFields::default();
        let mut description = String::with_capacity(body.len());
        let mut last_end = 0;

        for caps in self.dataview_field.captures_iter(body) {
            let whole = caps.get(0).expect("match has a whole capture");
            let key = caps[1].to_ascii_lowercase();
            let value = caps[2].trim().to_string();

            let Some(kind) = dataview_kind(&key) else {
                continue;
            };
            apply_field(&mut fields, kind, Some(value));
            description.push_str(&body[last_end..whole.start()]);
            last_end = whole.end();
        }
        description.push_str(&body[last_end..]);

        // Tags are collected (and stripped) from wherever they appear.
        for caps in self.tag.captures_iter(&description) {
            fields.tags.push(caps[1].to_string());
        }
        let description = self.tag.replace_all(&description, "");

        fields.description = self.clean_description(&description);
        fields
    }

    fn clean_description(&self, s: &str) -> String {
        self.whitespace_runs.replace_all(s, " ").trim().to_string()
    }
}

/// Maps a dataview field key to its annotation kind.
fn dataview_kind(key: &str) -> Option<TrailingKind> {
    match key {
        "pomodoro" | "actual/expected" => Some(TrailingKind::Pomodoro),
        "created" => Some(TrailingKind::Created),
        "start" => Some(TrailingKind::Start),
        "scheduled" => Some(TrailingKind::Scheduled),
        "due" => Some(TrailingKind::Due),
        "cancelled" => Some(TrailingKind::Cancelled),
        "done" | "completion" => Some(TrailingKind::Done),
        "priority" => Some(TrailingKind::Priority),
        "repeat" | "recurrence" => Some(TrailingKind::Recurrence),
        _ => None,
    }
}

/// Applies one extracted annotation value onto the field set.
fn apply_field(fields: &mut TaskFields, kind: TrailingKind, value: Option<String>) {
    let value = value.unwrap_or_default();
    match kind {
        TrailingKind::Pomodoro => {
            let (actual, expected) = split_counts(&value);
            fields.actual = actual;
            fields.expected = expected;
        }
        TrailingKind::Created => fields.created = parse_date(&value),
        TrailingKind::Start => fields.start = parse_date(&value),
        TrailingKind::Scheduled => fields.scheduled = parse_date(&value),
        TrailingKind::Due => fields.due = parse_date(&value),
        TrailingKind::Cancelled => fields.cancelled = parse_date(&value),
        TrailingKind::Done => fields.done = parse_date(&value),
        TrailingKind::Priority => fields.priority = parse_priority(&value),
        TrailingKind::Recurrence => {
            if !value.is_empty() {
                fields.recurrence = Some(value);
            }
        }
        TrailingKind::Tag => fields.tags.push(value),
    }
}

/// Splits an `actual/expected` annotation into its two counts.
///
/// Either side may be empty; an empty or unparseable side defaults to 0,
/// and a missing right side means "unbounded" (0).
#[must_use]
pub fn split_counts(s: &str) -> (u32, u32) {
    match s.split_once('/') {
        Some((actual, expected)) => (parse_count(actual), parse_count(expected)),
        None => (parse_count(s), 0),
    }
}

fn parse_count(s: &str) -> u32 {
    s.trim().parse().unwrap_or(0)
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

fn parse_priority(s: &str) -> Priority {
    match s {
        "⏫" => Priority::High,
        "🔼" => Priority::Medium,
        "🔽" => Priority::Low,
        other => match other.to_ascii_lowercase().as_str() {
            "high" => Priority::High,
            "medium" => Priority::Medium,
            "low" => Priority::Low,
            _ => Priority::None,
        },
    }
}
