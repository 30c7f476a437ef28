//! Timer engine: the work/break session state machine.
//!
//! One engine instance exists per process. It is driven by two inputs
//! only: elapsed-time deltas from the [`crate::ticker`] task and
//! user-initiated operations. All state lives in a reactive store and is
//! mutated synchronously; session-end logging is dispatched fire-and-forget
//! over a channel, so a slow document write never blocks tick processing.
//!
//! # States
//!
//! - **Idle**: `in_session == false`, `running == false`
//! - **Running**: `in_session == true`, `running == true`
//! - **Paused**: `in_session == true`, `running == false`
//!
//! Invariants, maintained by every operation: `elapsed <= count`,
//! `running` implies `in_session`, and `start_time` is `Some` exactly when
//! `in_session`.

use chrono::{DateTime, Duration as ChronoDuration, Local};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::store::{Store, Subscription};
use crate::task::tracker::ActiveTaskTracker;
use crate::task::TaskRecord;
use crate::ticker::TickerHandle;

/// Milliseconds per whole minute.
pub const MILLIS_PER_MINUTE: u64 = 60_000;

/// Minimum elapsed time for a manually reset session to be logged.
const MIN_LOG_ELAPSED_MS: u64 = MILLIS_PER_MINUTE;

/// Session mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Mode {
    /// A focus session.
    Work,
    /// A rest session.
    Break,
}

impl Mode {
    /// The other mode.
    #[must_use]
    pub fn flipped(self) -> Self {
        match self {
            Self::Work => Self::Break,
            Self::Break => Self::Work,
        }
    }

    /// Uppercase wire form, as written into log lines.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Work => "WORK",
            Self::Break => "BREAK",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User-configurable session lengths and the autostart flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimerSettings {
    /// Work session length in whole minutes.
    pub work_minutes: u64,
    /// Break session length in whole minutes. 0 disables breaks entirely.
    pub break_minutes: u64,
    /// Whether the next session starts automatically when one ends.
    pub autostart: bool,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            work_minutes: 25,
            break_minutes: 5,
            autostart: false,
        }
    }
}

/// Snapshot of the timer state machine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimerState {
    /// Current session mode.
    pub mode: Mode,
    /// Elapsed time within the current session, in milliseconds.
    pub elapsed_ms: u64,
    /// Target duration of the current session, in milliseconds.
    pub count_ms: u64,
    /// Whether ticks currently advance `elapsed_ms`.
    pub running: bool,
    /// Whether a session is underway (running or paused), as opposed to
    /// idle and ready to start.
    pub in_session: bool,
    /// Wall-clock start of the current session. `Some` iff `in_session`.
    pub start_time: Option<DateTime<Local>>,
    /// Configured lengths and autostart.
    pub settings: TimerSettings,
}

impl TimerState {
    /// Initial idle state for the given settings: Work mode, full target.
    #[must_use]
    pub fn new(settings: TimerSettings) -> Self {
        let mut state = Self {
            mode: Mode::Work,
            elapsed_ms: 0,
            count_ms: 0,
            running: false,
            in_session: false,
            start_time: None,
            settings,
        };
        state.count_ms = state.target_ms();
        state
    }

    /// Target duration for the current mode, from the configured lengths.
    #[must_use]
    pub fn target_ms(&self) -> u64 {
        let minutes = match self.mode {
            Mode::Work => self.settings.work_minutes,
            Mode::Break => self.settings.break_minutes,
        };
        minutes * MILLIS_PER_MINUTE
    }

    /// Remaining time in the current session, in milliseconds.
    #[must_use]
    pub fn remained_ms(&self) -> u64 {
        self.count_ms.saturating_sub(self.elapsed_ms)
    }

    /// Whether elapsed time has reached the target.
    #[must_use]
    pub fn finished(&self) -> bool {
        self.elapsed_ms == self.count_ms
    }

    /// Remaining time formatted as zero-padded `MM:SS`.
    #[must_use]
    pub fn format_remaining(&self) -> String {
        let total_secs = self.remained_ms() / 1000;
        format!("{:02}:{:02}", total_secs / 60, total_secs % 60)
    }
}

/// Everything the session logger needs about one ended session.
///
/// Captured from live state *before* the engine mutates toward the next
/// session, then handed off by value; the logger never reads engine state.
#[derive(Debug, Clone)]
pub struct LogContext {
    /// Timer state at capture time.
    pub state: TimerState,
    /// The active task at capture time, or the neutral placeholder.
    pub task: TaskRecord,
    /// Wall-clock session begin.
    pub begin: DateTime<Local>,
    /// Wall-clock session end (capture time).
    pub end: DateTime<Local>,
}

impl LogContext {
    /// Logged duration: whole elapsed minutes, rounding down.
    #[must_use]
    pub fn duration_minutes(&self) -> u64 {
        self.state.elapsed_ms / MILLIS_PER_MINUTE
    }

    /// Whether the session ran to its full target.
    #[must_use]
    pub fn finished(&self) -> bool {
        self.state.finished()
    }
}

/// The timer state machine.
pub struct TimerEngine {
    store: Store<TimerState>,
    tracker: ActiveTaskTracker,
    ticker: TickerHandle,
    log_tx: mpsc::UnboundedSender<LogContext>,
}

impl std::fmt::Debug for TimerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerEngine")
            .field("state", &self.store.get())
            .finish_non_exhaustive()
    }
}

impl TimerEngine {
    /// Creates an idle engine.
    ///
    /// `log_tx` receives a [`LogContext`] for every session that warrants
    /// a log entry; the receiving side owns the actual write.
    #[must_use]
    pub fn new(
        settings: TimerSettings,
        tracker: ActiveTaskTracker,
        ticker: TickerHandle,
        log_tx: mpsc::UnboundedSender<LogContext>,
    ) -> Self {
        Self {
            store: Store::new(TimerState::new(settings)),
            tracker,
            ticker,
            log_tx,
        }
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> TimerState {
        self.store.get()
    }

    /// Registers a subscriber on the timer state.
    #[must_use]
    pub fn subscribe(
        &self,
        callback: impl Fn(&TimerState) + Send + Sync + 'static,
    ) -> Subscription {
        self.store.subscribe(callback)
    }

    /// Idle→Running or Paused→Running.
    ///
    /// Entering from idle resets elapsed time, recomputes the target from
    /// the current mode, and stamps the session start time.
    pub fn start(&self) {
        self.store.update(|state| {
            if !state.in_session {
                state.elapsed_ms = 0;
                state.count_ms = state.target_ms();
                state.start_time = Some(Local::now());
                state.in_session = true;
            }
            state.running = true;
        });
        self.ticker.resume();
        debug!(mode = %self.store.get().mode, "Timer started");
    }

    /// Running→Paused. Ticks arriving while paused are ignored.
    pub fn pause(&self) {
        self.store.update(|state| state.running = false);
        self.ticker.suspend();
        debug!("Timer paused");
    }

    /// Starts when stopped, pauses when running.
    pub fn toggle_timer(&self) {
        if self.store.get().running {
            self.pause();
        } else {
            self.start();
        }
    }

    /// Advances elapsed time by `delta_ms`.
    ///
    /// A tick arriving while not running is a stale or paused tick and is
    /// dropped. Elapsed time is clamped to the target; reaching it
    /// triggers exactly one timeup.
    pub fn tick(&self, delta_ms: u64) {
        if !self.store.get().running {
            return;
        }
        let mut timed_out = false;
        self.store.update(|state| {
            state.elapsed_ms = (state.elapsed_ms + delta_ms).min(state.count_ms);
            timed_out = state.elapsed_ms == state.count_ms;
        });
        if timed_out {
            self.timeup();
        }
    }

    /// Ends the current session as complete: captures the log context,
    /// dispatches it, moves to the next session's idle state, and
    /// autostarts when configured.
    ///
    /// Also the entry point for a manual early finish.
    pub fn timeup(&self) {
        info!(mode = %self.store.get().mode, "Session ended");
        self.dispatch_log();
        self.end_session();
        if self.store.get().settings.autostart {
            self.start();
        }
    }

    /// Resets to idle. A session that ran at least one full minute is
    /// logged first, reflecting the pre-reset state. Clears the active
    /// task unless it is pinned.
    pub fn reset(&self) {
        if self.store.get().elapsed_ms >= MIN_LOG_ELAPSED_MS {
            self.dispatch_log();
        }
        self.store.update(|state| {
            state.count_ms = state.target_ms();
            state.elapsed_ms = 0;
            state.in_session = false;
            state.running = false;
            state.start_time = None;
        });
        self.ticker.suspend();
        if !self.tracker.is_pinned() {
            self.tracker.clear();
        }
        debug!("Timer reset");
    }

    /// Forces the session to end and the mode to advance, without
    /// logging. The callback observes the resulting state for caller-side
    /// notification.
    pub fn toggle_mode(&self, callback: impl FnOnce(&TimerState)) {
        self.end_session();
        let state = self.store.get();
        callback(&state);
    }

    /// Stores new configured lengths and applies them to the idle
    /// display.
    pub fn set_durations(&self, work_minutes: u64, break_minutes: u64) {
        self.store.update(|state| {
            state.settings.work_minutes = work_minutes;
            state.settings.break_minutes = break_minutes;
        });
        self.setup_timer();
    }

    /// Stores the autostart flag.
    pub fn set_autostart(&self, autostart: bool) {
        self.store.update(|state| state.settings.autostart = autostart);
    }

    /// Re-applies configured lengths to the target when idle, keeping the
    /// idle display in sync with settings changes. A no-op mid-session.
    pub fn setup_timer(&self) {
        self.store.update(|state| {
            if !state.running && !state.in_session {
                state.count_ms = state.target_ms();
            }
        });
    }

    /// Stops the tick source. Called once at process teardown.
    pub fn shutdown(&mut self) {
        self.ticker.shutdown();
    }

    /// Captures the log context from live state and dispatches it.
    ///
    /// Capture happens before any state mutation, so the context reflects
    /// the session that just ended, never the one about to start.
    fn dispatch_log(&self) {
        let state = self.store.get();
        let end = Local::now();
        let begin = state.start_time.unwrap_or_else(|| {
            end - ChronoDuration::milliseconds(state.elapsed_ms as i64)
        });
        let task = match self.tracker.snapshot() {
            Some(active) => active.task,
            None => TaskRecord::placeholder(None),
        };

        let context = LogContext {
            state,
            task,
            begin,
            end,
        };
        if self.log_tx.send(context).is_err() {
            warn!("Session log receiver dropped, entry discarded");
        }
    }

    /// Moves to the next session's idle state: flips the mode (unless
    /// breaks are disabled), recomputes the target, and stops the tick
    /// source.
    fn end_session(&self) {
        self.store.update(|state| {
            if state.settings.break_minutes > 0 {
                state.mode = state.mode.flipped();
            }
            state.count_ms = state.target_ms();
            state.elapsed_ms = 0;
            state.in_session = false;
            state.running = false;
            state.start_time = None;
        });
        self.ticker.suspend();
    }
}
