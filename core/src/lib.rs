//! Pomonote - a pomodoro timer that lives inside a markdown note vault.
//!
//! This crate provides the core of a pomodoro workflow built on plain
//! markdown files: tasks are checkbox lines in your notes, the active
//! task is tracked across edits, and finished sessions are logged back
//! into the documents they belong to.
//!
//! # Overview
//!
//! A vault watcher feeds document changes into the task registry, which
//! re-parses tasks per document and keeps the active-task pointer valid.
//! The timer engine runs the WORK/BREAK state machine off a background
//! tick source; when a session ends it captures a log context and hands
//! it to the session logger, which inserts a log line anchored under the
//! active task's block reference. An offline corrector repairs log lines
//! whose end times were mangled by machine sleep.
//!
//! # Modules
//!
//! - [`timer`]: WORK/BREAK timer state machine and log context capture
//! - [`ticker`]: background tick source driving the timer
//! - [`task`]: task parsing, the registry, and the active-task tracker
//! - [`logger`]: session log formatting and block-anchored insertion
//! - [`corrector`]: offline repair pass over logged end times
//! - [`vault`]: document store access and the file system watcher
//! - [`store`]: reactive state holder with subscriber callbacks
//! - [`notice`]: user-visible warnings that never fail an operation
//! - [`config`]: configuration from environment variables
//! - [`error`]: error types for core operations

pub mod config;
pub mod corrector;
pub mod error;
pub mod logger;
pub mod notice;
pub mod store;
pub mod task;
pub mod ticker;
pub mod timer;
pub mod vault;

pub use config::Config;
pub use corrector::{CorrectionReport, LogCorrector};
pub use error::{CoreError, Result};
pub use logger::{LogDestination, LogFormat, LogLevel, LogSettings, SessionLogger, TemplateEngine};
pub use notice::{Notice, Notices};
pub use store::{Store, Subscription};
pub use task::parser::{Dialect, TaskParser};
pub use task::registry::TaskRegistry;
pub use task::tracker::{ActiveTask, ActiveTaskTracker};
pub use task::{TaskCollection, TaskRecord};
pub use ticker::{TickerHandle, DEFAULT_TICK_MS};
pub use timer::{LogContext, Mode, TimerEngine, TimerSettings, TimerState};
pub use vault::{FsVault, PeriodicKind, Vault, VaultEvent, VaultWatcher};
