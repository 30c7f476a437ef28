//! User-facing transient notices.
//!
//! The core never aborts the running timer over a recoverable failure.
//! Instead, components emit a [`Notice`] describing what went wrong and
//! which fallback was taken. The host (the daemon, or an embedding UI)
//! receives notices over a channel and surfaces them however it likes.
//!
//! Every notice is also logged at `warn` level at the emission site, so a
//! host that drops the receiver still gets structured log output.

use std::path::PathBuf;

use tokio::sync::mpsc;
use tracing::warn;

/// A non-blocking, user-visible warning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The active task's block anchor was not found in the target document;
    /// the log entry was appended at the end instead.
    AnchorMissing {
        /// Document that was searched.
        path: PathBuf,
        /// The anchor token that could not be located.
        anchor: String,
    },

    /// A document read or write was rejected by the store. The operation
    /// was aborted; no retry is attempted.
    IoFailed {
        /// Document involved in the failed operation.
        path: PathBuf,
        /// Human-readable failure description.
        message: String,
    },

    /// Custom template evaluation failed; the session was not logged.
    TemplateFailed {
        /// Human-readable failure description.
        message: String,
    },

    /// A document could not be parsed during a registry pass and was
    /// skipped.
    DocumentSkipped {
        /// Document that was skipped.
        path: PathBuf,
        /// Human-readable failure description.
        message: String,
    },
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AnchorMissing { path, anchor } => write!(
                f,
                "anchor {} not found in {}; log appended at end",
                anchor,
                path.display()
            ),
            Self::IoFailed { path, message } => {
                write!(f, "I/O failure on {}: {}", path.display(), message)
            }
            Self::TemplateFailed { message } => {
                write!(f, "log template failed: {message}; session not logged")
            }
            Self::DocumentSkipped { path, message } => {
                write!(f, "skipped {}: {}", path.display(), message)
            }
        }
    }
}

/// Cloneable emission handle for notices.
///
/// Sending never blocks and never fails loudly: if the receiving side has
/// gone away the notice is dropped after being logged.
#[derive(Debug, Clone)]
pub struct Notices {
    tx: mpsc::UnboundedSender<Notice>,
}

impl Notices {
    /// Creates a notice channel, returning the emission handle and the
    /// receiving end.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Creates a handle with no receiver. Notices are still logged.
    ///
    /// Useful for tests and for embedders that only want the `tracing`
    /// output.
    #[must_use]
    pub fn disabled() -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self { tx }
    }

    /// Emits a notice.
    pub fn emit(&self, notice: Notice) {
        warn!(notice = %notice, "User notice");
        // Dropped receiver is fine; the warn! above already recorded it.
        let _ = self.tx.send(notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notice_display_anchor_missing() {
        let notice = Notice::AnchorMissing {
            path: PathBuf::from("/vault/daily.md"),
            anchor: "^abc1".to_string(),
        };
        assert_eq!(
            notice.to_string(),
            "anchor ^abc1 not found in /vault/daily.md; log appended at end"
        );
    }

    #[test]
    fn notice_display_template_failed() {
        let notice = Notice::TemplateFailed {
            message: "unknown variable".to_string(),
        };
        assert_eq!(
            notice.to_string(),
            "log template failed: unknown variable; session not logged"
        );
    }

    #[tokio::test]
    async fn emitted_notice_is_received() {
        let (notices, mut rx) = Notices::channel();
        notices.emit(Notice::TemplateFailed {
            message: "boom".to_string(),
        });
        let received = rx.recv().await.expect("notice should arrive");
        assert!(matches!(received, Notice::TemplateFailed { .. }));
    }

    #[test]
    fn disabled_handle_does_not_panic() {
        let notices = Notices::disabled();
        notices.emit(Notice::IoFailed {
            path: PathBuf::from("/x"),
            message: "denied".to_string(),
        });
    }
}
