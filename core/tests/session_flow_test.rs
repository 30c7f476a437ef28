//! Integration tests for the full session flow.
//!
//! These tests drive the timer engine against a real temporary vault and
//! verify that finished sessions end up as log lines in the right
//! documents, anchored under the active task, and that the repair pass
//! round-trips with the logger's output.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use tokio::sync::mpsc;

use pomonote_core::corrector::LogCorrector;
use pomonote_core::logger::{LogDestination, LogSettings, SessionLogger};
use pomonote_core::notice::Notices;
use pomonote_core::task::parser::Dialect;
use pomonote_core::task::registry::TaskRegistry;
use pomonote_core::task::tracker::ActiveTaskTracker;
use pomonote_core::ticker::TickerHandle;
use pomonote_core::timer::{LogContext, Mode, TimerEngine, TimerSettings, MILLIS_PER_MINUTE};
use pomonote_core::vault::FsVault;

// ============================================================================
// Helper Functions
// ============================================================================

/// Creates a vault directory holding one note with an anchored task.
fn create_test_vault() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let note = dir.path().join("projects.md");
    fs::write(
        &note,
        "# Projects\n\n- [ ] Write report (actual/expected:: 2/5) ^abc1\n- [ ] Other work\n",
    )
    .expect("Failed to write note");
    (dir, note)
}

/// Builds an engine plus its collaborators over the given vault root.
fn build_engine(
    root: &Path,
    settings: TimerSettings,
) -> (
    Arc<FsVault>,
    TaskRegistry,
    ActiveTaskTracker,
    TimerEngine,
    mpsc::UnboundedReceiver<LogContext>,
) {
    let vault = Arc::new(FsVault::open(root.to_path_buf(), None).expect("Failed to open vault"));
    let tracker = ActiveTaskTracker::new();
    let registry = TaskRegistry::new(Dialect::Tasks, tracker.clone(), Notices::disabled());
    registry.reload(vault.as_ref());

    let (log_tx, log_rx) = mpsc::unbounded_channel();
    let engine = TimerEngine::new(settings, tracker.clone(), TickerHandle::detached(), log_tx);
    (vault, registry, tracker, engine, log_rx)
}

/// Drives the engine through a full session of `minutes` in one-minute ticks.
fn run_full_session(engine: &TimerEngine, minutes: u64) {
    engine.start();
    for _ in 0..minutes {
        engine.tick(MILLIS_PER_MINUTE);
    }
}

// ============================================================================
// Session -> Log Flow
// ============================================================================

#[test]
fn finished_work_session_is_logged_under_the_task() {
    let (dir, note) = create_test_vault();
    let settings = TimerSettings {
        work_minutes: 25,
        break_minutes: 5,
        autostart: false,
    };
    let (vault, registry, tracker, engine, mut log_rx) = build_engine(dir.path(), settings);

    // Pick the anchored task as the active one.
    let task = registry
        .collection()
        .find_by_anchor("abc1")
        .expect("task parsed from vault")
        .clone();
    assert_eq!(task.actual, 2);
    assert_eq!(task.expected, 5);
    tracker.activate(task);

    run_full_session(&engine, 25);

    // Exactly one session ended; the engine flipped to a fresh break.
    let context = log_rx.try_recv().expect("one log context dispatched");
    assert!(log_rx.try_recv().is_err());
    let state = engine.state();
    assert_eq!(state.mode, Mode::Break);
    assert!(!state.running);
    assert!(!state.in_session);
    assert_eq!(state.elapsed_ms, 0);
    assert_eq!(state.count_ms, 5 * MILLIS_PER_MINUTE);

    // The logger lands the entry in the task's own document, indented
    // under the anchored line.
    let logger = SessionLogger::new(vault, LogSettings::default(), Notices::disabled());
    let target = logger.process(&context).expect("entry written");
    assert_eq!(target, note);

    let text = fs::read_to_string(&note).expect("note readable");
    let lines: Vec<&str> = text.lines().collect();
    assert!(lines[2].contains("^abc1"));
    assert!(lines[3].starts_with('\t'));
    assert!(lines[3].contains("(pomodoro::WORK)"));
    assert!(lines[3].contains("(taskID:: abc1)"));
    assert!(lines[3].contains("(duration:: 25m)"));
    // The unrelated task below is untouched.
    assert!(text.contains("- [ ] Other work"));
}

#[test]
fn second_session_lands_after_the_first_log_line() {
    let (dir, note) = create_test_vault();
    let settings = TimerSettings {
        work_minutes: 10,
        break_minutes: 0,
        autostart: false,
    };
    let (vault, registry, tracker, engine, mut log_rx) = build_engine(dir.path(), settings);

    let task = registry.collection().find_by_anchor("abc1").unwrap().clone();
    tracker.activate(task);

    let logger = SessionLogger::new(vault, LogSettings::default(), Notices::disabled());
    run_full_session(&engine, 10);
    logger.process(&log_rx.try_recv().unwrap()).unwrap();
    run_full_session(&engine, 10);
    logger.process(&log_rx.try_recv().unwrap()).unwrap();

    let text = fs::read_to_string(&note).unwrap();
    let log_lines: Vec<usize> = text
        .lines()
        .enumerate()
        .filter(|(_, l)| l.contains("(pomodoro::WORK)"))
        .map(|(i, _)| i)
        .collect();
    // Both entries sit directly under the task, in write order.
    assert_eq!(log_lines, vec![3, 4]);
}

#[test]
fn reset_below_threshold_writes_nothing() {
    let (dir, note) = create_test_vault();
    let (_vault, registry, tracker, engine, mut log_rx) =
        build_engine(dir.path(), TimerSettings::default());

    let task = registry.collection().find_by_anchor("abc1").unwrap().clone();
    tracker.activate(task);

    engine.start();
    engine.tick(30_000);
    engine.reset();

    assert!(log_rx.try_recv().is_err());
    let text = fs::read_to_string(&note).unwrap();
    assert!(!text.contains("pomodoro::"));
}

#[test]
fn reset_past_threshold_logs_the_partial_work_session() {
    let (dir, note) = create_test_vault();
    let (vault, registry, tracker, engine, mut log_rx) =
        build_engine(dir.path(), TimerSettings::default());

    let task = registry.collection().find_by_anchor("abc1").unwrap().clone();
    tracker.activate(task);

    engine.start();
    for _ in 0..7 {
        engine.tick(MILLIS_PER_MINUTE);
    }
    engine.reset();

    let context = log_rx.try_recv().expect("partial session logged");
    let logger = SessionLogger::new(vault, LogSettings::default(), Notices::disabled());
    logger.process(&context).expect("entry written");

    let text = fs::read_to_string(&note).unwrap();
    assert!(text.contains("(duration:: 7m)"));
}

#[test]
fn placeholder_session_goes_to_the_fixed_log_file() {
    let dir = tempfile::tempdir().unwrap();
    let settings = TimerSettings {
        work_minutes: 25,
        break_minutes: 5,
        autostart: false,
    };
    let (vault, _registry, _tracker, engine, mut log_rx) = build_engine(dir.path(), settings);

    // No active task at all.
    run_full_session(&engine, 25);
    let context = log_rx.try_recv().unwrap();

    let log_settings = LogSettings {
        destination: LogDestination::File(PathBuf::from("logs/pomodoro.md")),
        ..LogSettings::default()
    };
    let logger = SessionLogger::new(vault, log_settings, Notices::disabled());
    let target = logger.process(&context).expect("entry written");
    assert_eq!(target, dir.path().join("logs/pomodoro.md"));

    let text = fs::read_to_string(&target).unwrap();
    assert!(text.contains("(taskID:: )"));
}

// ============================================================================
// Logger -> Corrector Round Trip
// ============================================================================

#[test]
fn corrector_repairs_a_corrupted_logged_session() {
    let (dir, note) = create_test_vault();
    let settings = TimerSettings {
        work_minutes: 30,
        break_minutes: 5,
        autostart: false,
    };
    let (vault, registry, tracker, engine, mut log_rx) = build_engine(dir.path(), settings);

    let task = registry.collection().find_by_anchor("abc1").unwrap().clone();
    tracker.activate(task);

    run_full_session(&engine, 30);
    let logger = SessionLogger::new(vault.clone(), LogSettings::default(), Notices::disabled());
    logger.process(&log_rx.try_recv().unwrap()).unwrap();

    // A fresh log line is self-consistent, so the corrector leaves it.
    let corrector = LogCorrector::new();
    let report = corrector
        .correct_document(vault.as_ref(), &note)
        .expect("repair pass runs");
    assert_eq!(report.lines_scanned, 1);
    assert!(!report.changed());

    // Simulate a sleep artifact: force the end time back to the begin time.
    let text = fs::read_to_string(&note).unwrap();
    let begin = text
        .lines()
        .find_map(|l| {
            let start = l.find("(begin:: ")? + "(begin:: ".len();
            Some(l[start..start + 16].to_string())
        })
        .expect("begin timestamp present");
    let corrupted = regex::Regex::new(r"\(end:: [0-9: -]+\)")
        .unwrap()
        .replace(&text, format!("(end:: {begin})"))
        .into_owned();
    fs::write(&note, corrupted).unwrap();

    let report = corrector.correct_document(vault.as_ref(), &note).unwrap();
    assert_eq!(report.lines_corrected, 1);

    // Running it again changes nothing further.
    let repaired = fs::read_to_string(&note).unwrap();
    let report = corrector.correct_document(vault.as_ref(), &note).unwrap();
    assert!(!report.changed());
    assert_eq!(fs::read_to_string(&note).unwrap(), repaired);
}
