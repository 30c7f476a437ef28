//! Session logger: turns an ended session into one log line in a
//! document.
//!
//! Logging is a three-step pipeline: resolve the target document, format
//! the entry, insert it. Each step can bow out without failing the timer:
//! a filtered level or disabled destination simply skips the write, and
//! every I/O problem degrades to a [`Notice`] instead of an error.
//!
//! Insertion is block-anchored: when the session's task carries a block
//! anchor that can be located in the target document, the entry is
//! appended at the end of the existing run of child log lines under that
//! task. Without an anchor (or when it cannot be found) the entry goes to
//! the end of the document.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::notice::{Notice, Notices};
use crate::timer::{LogContext, Mode};
use crate::vault::{PeriodicKind, Vault};

/// Indent unit used for child log lines.
const INDENT_UNIT: &str = "\t";

/// Which session modes get logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Log every session.
    #[default]
    All,
    /// Log only work sessions.
    Work,
    /// Log only break sessions.
    Break,
}

impl LogLevel {
    /// Whether a session in `mode` passes this filter.
    #[must_use]
    pub fn allows(self, mode: Mode) -> bool {
        match self {
            Self::All => true,
            Self::Work => mode == Mode::Work,
            Self::Break => mode == Mode::Break,
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "work" => Ok(Self::Work),
            "break" => Ok(Self::Break),
            other => Err(format!("unknown log level '{other}', expected all|work|break")),
        }
    }
}

/// Built-in log line formats, plus the pluggable custom one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// `**{MODE}({N}m)**: {HH:mm} - {HH:mm}`
    Simple,
    /// Structured bullet with inline fields; see [`format_verbose`].
    #[default]
    Verbose,
    /// Delegates entirely to the installed [`TemplateEngine`].
    Custom,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "simple" => Ok(Self::Simple),
            "verbose" => Ok(Self::Verbose),
            "custom" => Ok(Self::Custom),
            other => Err(format!(
                "unknown log format '{other}', expected simple|verbose|custom"
            )),
        }
    }
}

/// Where session logs go when the focused document does not apply.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LogDestination {
    /// Logging disabled.
    #[default]
    Disabled,
    /// The daily periodic note.
    Daily,
    /// The weekly periodic note.
    Weekly,
    /// A fixed document, created on demand.
    File(PathBuf),
}

/// Logger configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    /// Fallback destination.
    pub destination: LogDestination,
    /// Entry format.
    pub format: LogFormat,
    /// Mode filter.
    pub level: LogLevel,
    /// Prefer the active task's own document as the target.
    pub log_focused: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            destination: LogDestination::Disabled,
            format: LogFormat::Verbose,
            level: LogLevel::All,
            log_focused: true,
        }
    }
}

/// Error raised by a custom template evaluation.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct TemplateError(pub String);

/// External template evaluator backing [`LogFormat::Custom`].
///
/// Opaque to this core: whatever it renders is inserted verbatim, and an
/// empty result suppresses the write.
pub trait TemplateEngine: Send + Sync {
    /// Renders the log entry for an ended session.
    fn render(&self, context: &LogContext) -> Result<String, TemplateError>;
}

/// Writes session log entries into vault documents.
pub struct SessionLogger {
    vault: Arc<dyn Vault>,
    settings: LogSettings,
    template: Option<Box<dyn TemplateEngine>>,
    notices: Notices,
}

impl std::fmt::Debug for SessionLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLogger")
            .field("settings", &self.settings)
            .field("has_template", &self.template.is_some())
            .finish_non_exhaustive()
    }
}

impl SessionLogger {
    /// Creates a logger writing through `vault`.
    #[must_use]
    pub fn new(vault: Arc<dyn Vault>, settings: LogSettings, notices: Notices) -> Self {
        Self {
            vault,
            settings,
            template: None,
            notices,
        }
    }

    /// Installs the template evaluator used by [`LogFormat::Custom`].
    #[must_use]
    pub fn with_template(mut self, template: Box<dyn TemplateEngine>) -> Self {
        self.template = Some(template);
        self
    }

    /// Processes one ended session.
    ///
    /// Returns the document the entry was written to, or `None` when the
    /// session was filtered, produced an empty entry, or the write
    /// failed. Performs no deduplication: processing the same context
    /// twice appends two lines.
    pub fn process(&self, context: &LogContext) -> Option<PathBuf> {
        if !self.settings.level.allows(context.state.mode) {
            debug!(mode = %context.state.mode, "Session filtered by log level");
            return None;
        }

        let target = self.resolve_destination(context)?;
        let entry = self.format_entry(context);
        if entry.is_empty() {
            debug!("Empty log entry, nothing written");
            return None;
        }

        self.insert_entry(&target, &entry, context)?;
        info!(
            target = %target.display(),
            mode = %context.state.mode,
            minutes = context.duration_minutes(),
            "Session logged"
        );
        Some(target)
    }

    /// Resolves the target document for a session, creating periodic or
    /// fixed destinations on demand.
    fn resolve_destination(&self, context: &LogContext) -> Option<PathBuf> {
        if self.settings.log_focused && !context.task.path.as_os_str().is_empty() {
            return Some(context.task.path.clone());
        }

        let resolved = match &self.settings.destination {
            LogDestination::Disabled => return None,
            LogDestination::Daily => self.vault.resolve_periodic_note(PeriodicKind::Daily),
            LogDestination::Weekly => self.vault.resolve_periodic_note(PeriodicKind::Weekly),
            LogDestination::File(path) => self.vault.ensure_document(path),
        };

        match resolved {
            Ok(path) => Some(path),
            Err(e) => {
                self.notices.emit(Notice::IoFailed {
                    path: PathBuf::new(),
                    message: format!("failed to resolve log destination: {e}"),
                });
                None
            }
        }
    }

    /// Formats the entry per the configured format. An empty string means
    /// "do not write".
    fn format_entry(&self, context: &LogContext) -> String {
        match self.settings.format {
            LogFormat::Simple => format_simple(context),
            LogFormat::Verbose => format_verbose(context),
            LogFormat::Custom => match &self.template {
                Some(template) => match template.render(context) {
                    Ok(entry) => entry,
                    Err(e) => {
                        self.notices.emit(Notice::TemplateFailed {
                            message: e.to_string(),
                        });
                        String::new()
                    }
                },
                None => {
                    self.notices.emit(Notice::TemplateFailed {
                        message: "no template engine installed".to_string(),
                    });
                    String::new()
                }
            },
        }
    }

    /// Reads the target, inserts the entry, and writes the whole document
    /// back. Returns `None` on I/O failure.
    fn insert_entry(&self, target: &Path, entry: &str, context: &LogContext) -> Option<()> {
        let text = match self.vault.read_document(target) {
            Ok(text) => text,
            Err(e) => {
                self.notices.emit(Notice::IoFailed {
                    path: target.to_path_buf(),
                    message: e.to_string(),
                });
                return None;
            }
        };

        let anchor = context
            .task
            .block_anchor
            .as_deref()
            .map(|token| (token, context.task.line));
        let (new_text, anchored) = insert_log_line(&text, entry, anchor);

        if context.task.block_anchor.is_some() && !anchored {
            self.notices.emit(Notice::AnchorMissing {
                path: target.to_path_buf(),
                anchor: context.task.block_anchor.clone().unwrap_or_default(),
            });
        }

        if let Err(e) = self.vault.write_document(target, &new_text) {
            self.notices.emit(Notice::IoFailed {
                path: target.to_path_buf(),
                message: e.to_string(),
            });
            return None;
        }
        Some(())
    }
}

/// Formats the SIMPLE entry: `**{MODE}({N}m)**: {HH:mm} - {HH:mm}`.
///
/// An unfinished break session yields an empty string (skipped); an
/// unfinished work session is still formatted, capturing partial work.
#[must_use]
pub fn format_simple(context: &LogContext) -> String {
    if context.state.mode == Mode::Break && !context.finished() {
        return String::new();
    }
    format!(
        "**{}({}m)**: {} - {}",
        context.state.mode,
        context.duration_minutes(),
        context.begin.format("%H:%M"),
        context.end.format("%H:%M"),
    )
}

/// Formats the VERBOSE entry:
/// `- {emoji} (pomodoro::{MODE}) (taskID:: {anchor}) (duration:: {N}m)
/// (begin:: {YYYY-MM-DD HH:mm}) - (end:: {YYYY-MM-DD HH:mm})`
/// with 🍅 for work and 🥤 for break.
///
/// Applies the same unfinished-break skip as [`format_simple`].
#[must_use]
pub fn format_verbose(context: &LogContext) -> String {
    if context.state.mode == Mode::Break && !context.finished() {
        return String::new();
    }
    let emoji = match context.state.mode {
        Mode::Work => "🍅",
        Mode::Break => "🥤",
    };
    format!(
        "- {} (pomodoro::{}) (taskID:: {}) (duration:: {}m) (begin:: {}) - (end:: {})",
        emoji,
        context.state.mode,
        context.task.anchor_id().unwrap_or(""),
        context.duration_minutes(),
        context.begin.format("%Y-%m-%d %H:%M"),
        context.end.format("%Y-%m-%d %H:%M"),
    )
}

/// A line holds the anchor only at a token boundary, so `^abc1` does not
/// match a line carrying `^abc10`.
fn holds_anchor(line: &str, token: &str) -> bool {
    line.match_indices(token).any(|(start, _)| {
        line[start + token.len()..]
            .chars()
            .next()
            .is_none_or(char::is_whitespace)
    })
}

/// Inserts a log entry into document text.
///
/// With an anchor, the host line is located by the recorded line number
/// first (fast path) and a full scan second; the entry is then indented
/// one level deeper than the host and placed after the existing run of
/// blank or child log lines. Without an anchor, or when the anchor cannot
/// be found, the entry is appended at the end behind a blank separator.
///
/// Returns the new text and whether the anchored placement succeeded.
#[must_use]
pub fn insert_log_line(text: &str, entry: &str, anchor: Option<(&str, usize)>) -> (String, bool) {
    let mut lines: Vec<String> = text.lines().map(String::from).collect();
    let mut anchored = false;

    let host = anchor.and_then(|(token, recorded_line)| {
        if lines
            .get(recorded_line)
            .is_some_and(|line| holds_anchor(line, token))
        {
            Some(recorded_line)
        } else {
            lines.iter().position(|line| holds_anchor(line, token))
        }
    });

    match host {
        Some(host_line) => {
            let host_indent: String = lines[host_line]
                .chars()
                .take_while(|c| c.is_whitespace())
                .collect();
            let child_indent = format!("{host_indent}{INDENT_UNIT}");

            let mut insert_at = host_line + 1;
            while insert_at < lines.len() {
                let line = &lines[insert_at];
                let is_blank = line.trim().is_empty();
                let is_child_log = line
                    .strip_prefix(child_indent.as_str())
                    .is_some_and(|rest| rest.trim_start().starts_with("- "));
                if is_blank || is_child_log {
                    insert_at += 1;
                } else {
                    break;
                }
            }

            lines.insert(insert_at, format!("{child_indent}{entry}"));
            anchored = true;
        }
        None => {
            if lines.last().is_some_and(|last| !last.trim().is_empty()) {
                lines.push(String::new());
            }
            lines.push(entry.to_string());
        }
    }

    let mut result = lines.join("\n");
    if text.is_empty() || text.ends_with('\n') {
        result.push('\n');
    }
    (result, anchored)
}
