//! Background tick source.
//!
//! A dedicated tokio task owns the monotonic clock and pushes elapsed-time
//! deltas through a channel to the single-threaded state mutator. Only
//! plain millisecond values cross the channel boundary; the clock handle
//! itself never leaves the task.
//!
//! While suspended the task keeps ticking internally and re-arms its
//! reference instant, so the first delta after a resume covers at most one
//! interval and never the whole pause.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, trace};

/// Default tick interval in milliseconds.
pub const DEFAULT_TICK_MS: u64 = 1000;

/// Control handle for the tick task.
///
/// All methods are synchronous and non-blocking; they flip a watch flag
/// the task observes on its next interval boundary.
#[derive(Debug)]
pub struct TickerHandle {
    active: watch::Sender<bool>,
    /// Kept for cleanup. Aborted on [`TickerHandle::shutdown`].
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl TickerHandle {
    /// Spawns the tick task.
    ///
    /// Deltas are delivered over `tick_tx` only while the ticker is
    /// resumed. The task starts suspended.
    #[must_use]
    pub fn spawn(interval_ms: u64, tick_tx: mpsc::Sender<u64>) -> Self {
        let (active, active_rx) = watch::channel(false);
        let task_handle = tokio::spawn(run_ticker(interval_ms, active_rx, tick_tx));
        Self {
            active,
            task_handle: Some(task_handle),
        }
    }

    /// A handle with no running task, for tests and embedders that drive
    /// [`crate::timer::TimerEngine::tick`] themselves.
    #[must_use]
    pub fn detached() -> Self {
        let (active, _rx) = watch::channel(false);
        Self {
            active,
            task_handle: None,
        }
    }

    /// Starts (or continues) delta delivery.
    pub fn resume(&self) {
        self.active.send_replace(true);
    }

    /// Stops delta delivery. The task stays alive for the next resume.
    pub fn suspend(&self) {
        self.active.send_replace(false);
    }

    /// Whether deltas are currently being delivered.
    #[must_use]
    pub fn is_running(&self) -> bool {
        *self.active.borrow()
    }

    /// Stops the tick task for good.
    pub fn shutdown(&mut self) {
        self.active.send_replace(false);
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
            debug!("Ticker task stopped");
        }
    }
}

impl Drop for TickerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The tick task body.
async fn run_ticker(interval_ms: u64, active: watch::Receiver<bool>, tick_tx: mpsc::Sender<u64>) {
    let mut ticker = interval(Duration::from_millis(interval_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last = Instant::now();

    loop {
        ticker.tick().await;
        let now = Instant::now();

        if !*active.borrow() {
            // Re-arm so a resume does not report the suspended span.
            last = now;
            continue;
        }

        let delta_ms = now.duration_since(last).as_millis().min(u128::from(u64::MAX)) as u64;
        last = now;
        trace!(delta_ms, "Tick");

        if tick_tx.send(delta_ms).await.is_err() {
            debug!("Tick receiver dropped, ticker exiting");
            break;
        }
    }
}
