//! Pomonote - pomodoro timer for markdown note vaults.
//!
//! This binary runs the timer daemon against a vault of markdown notes,
//! logging finished sessions back into the documents they belong to.
//!
//! # Commands
//!
//! - `pomonote run`: Start the timer daemon
//! - `pomonote scan`: Parse and list every task in the vault
//! - `pomonote repair <file>`: Fix mangled end times in a log document
//!
//! # Environment Variables
//!
//! See the [`config`] module for available configuration options.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pomonote_core::config::Config;
use pomonote_core::corrector::LogCorrector;
use pomonote_core::logger::SessionLogger;
use pomonote_core::notice::Notices;
use pomonote_core::task::registry::TaskRegistry;
use pomonote_core::task::tracker::ActiveTaskTracker;
use pomonote_core::ticker::TickerHandle;
use pomonote_core::timer::{LogContext, TimerEngine};
use pomonote_core::vault::{FsVault, VaultEvent, VaultWatcher};

/// Capacity of the vault event channel.
const VAULT_EVENT_BUFFER: usize = 1000;

/// Capacity of the tick channel.
const TICK_BUFFER: usize = 64;

/// Pomonote - pomodoro timer for markdown note vaults.
///
/// Tasks are checkbox lines in your notes; finished sessions are logged
/// back under the task they belong to.
#[derive(Parser, Debug)]
#[command(name = "pomonote")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    POMONOTE_VAULT_DIR        Vault root directory (required)
    POMONOTE_WORK_MINUTES     Work session length (default: 25)
    POMONOTE_BREAK_MINUTES    Break length, 0 disables breaks (default: 5)
    POMONOTE_AUTOSTART        Chain sessions automatically (default: false)
    POMONOTE_LOG_DESTINATION  none|daily|weekly|file (default: none)
    POMONOTE_LOG_FORMAT       simple|verbose|custom (default: verbose)

EXAMPLES:
    # List every task in the vault
    export POMONOTE_VAULT_DIR=~/notes
    pomonote scan

    # Start the daemon, logging into daily notes
    export POMONOTE_LOG_DESTINATION=daily
    pomonote run

    # Repair a log document after a laptop sleep
    pomonote repair logs/pomodoro.md
")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Start the timer daemon.
    ///
    /// Watches the vault for document changes and accepts timer commands
    /// on stdin: start, pause, toggle, reset, finish, mode, task <anchor>,
    /// pin, unpin, status, quit.
    Run,

    /// Parse the vault and list every task found.
    Scan {
        /// Emit the task list as JSON instead of plain lines.
        #[arg(long)]
        json: bool,
    },

    /// Rewrite mangled end times in a log document.
    ///
    /// Work lines whose real elapsed time is under 3 minutes but whose
    /// logged duration exceeds 20 minutes get their end time recomputed
    /// from begin + duration.
    Repair {
        /// Log document path, relative to the vault root.
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    match cli.command {
        Command::Scan { json } => run_scan(json),
        Command::Repair { file } => run_repair(file),
        Command::Run => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to create tokio runtime")?;

            runtime.block_on(run_daemon())
        }
    }
}

/// Runs the scan command: parse the whole vault, print every task.
fn run_scan(json: bool) -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    let vault = FsVault::open(config.vault_dir.clone(), config.periodic_dir.clone())
        .context("Failed to open vault")?;

    let registry = TaskRegistry::new(config.dialect, ActiveTaskTracker::new(), Notices::disabled());
    registry.reload(&vault);
    let collection = registry.collection();

    if json {
        println!("{}", serde_json::to_string_pretty(collection.records())?);
        return Ok(());
    }

    for task in collection.records() {
        let anchor = task.anchor_id().unwrap_or("-");
        let checked = if task.checked { "x" } else { " " };
        println!(
            "[{}] {}  ({}/{})  {}:{}  ^{}",
            checked,
            task.description,
            task.actual,
            task.expected,
            task.path.display(),
            task.line + 1,
            anchor,
        );
    }
    info!(tasks = collection.len(), "Scan complete");
    Ok(())
}

/// Runs the repair command on one log document.
fn run_repair(file: PathBuf) -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    let vault = FsVault::open(config.vault_dir.clone(), config.periodic_dir.clone())
        .context("Failed to open vault")?;

    let path = if file.is_absolute() {
        file
    } else {
        config.vault_dir.join(file)
    };

    let corrector = LogCorrector::new();
    let report = corrector
        .correct_document(&vault, &path)
        .context("Failed to repair log document")?;

    if report.changed() {
        println!(
            "Corrected {} of {} work log lines in {}",
            report.lines_corrected,
            report.lines_scanned,
            path.display()
        );
    } else {
        println!(
            "No corrections needed ({} work log lines checked)",
            report.lines_scanned
        );
    }
    Ok(())
}

/// Runs the timer daemon.
async fn run_daemon() -> Result<()> {
    info!("Starting pomonote");

    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        vault = %config.vault_dir.display(),
        work_minutes = config.timer.work_minutes,
        break_minutes = config.timer.break_minutes,
        autostart = config.timer.autostart,
        "Configuration loaded"
    );

    let vault = Arc::new(
        FsVault::open(config.vault_dir.clone(), config.periodic_dir.clone())
            .context("Failed to open vault")?,
    );

    // Notice channel: anchor misses, skipped documents and write failures
    // surface on the console without failing the timer.
    let (notices, mut notice_rx) = Notices::channel();

    // Task layer: tracker + registry, primed from a full vault scan.
    let tracker = ActiveTaskTracker::new();
    let registry = TaskRegistry::new(config.dialect, tracker.clone(), notices.clone());
    registry.reload(vault.as_ref());
    info!(tasks = registry.collection().len(), "Initial vault scan complete");

    // Document change notifications.
    let (vault_tx, mut vault_rx) = mpsc::channel::<VaultEvent>(VAULT_EVENT_BUFFER);
    let _watcher = VaultWatcher::new(config.vault_dir.clone(), vault_tx).context(format!(
        "Failed to initialize vault watcher for {}",
        config.vault_dir.display()
    ))?;

    let logger = Arc::new(SessionLogger::new(vault.clone(), config.log.clone(), notices));

    // Timer engine driven by the background ticker.
    let (tick_tx, mut tick_rx) = mpsc::channel::<u64>(TICK_BUFFER);
    let ticker = TickerHandle::spawn(config.tick_ms, tick_tx);
    let (log_tx, mut log_rx) = mpsc::unbounded_channel::<LogContext>();
    let mut engine = TimerEngine::new(config.timer, tracker.clone(), ticker, log_tx);

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    info!("Daemon running. Type 'start' to begin, 'quit' to stop, Ctrl+C to exit.");

    loop {
        tokio::select! {
            _ = wait_for_shutdown() => {
                info!("Shutdown signal received");
                break;
            }

            Some(delta_ms) = tick_rx.recv() => {
                engine.tick(delta_ms);
            }

            Some(context) = log_rx.recv() => {
                // File writes run off the loop; ticks keep flowing while a
                // slow write is in flight.
                let logger = Arc::clone(&logger);
                tokio::task::spawn_blocking(move || {
                    logger.process(&context);
                });
            }

            Some(event) = vault_rx.recv() => {
                handle_vault_event(event, &registry);
            }

            Some(notice) = notice_rx.recv() => {
                eprintln!("notice: {notice}");
            }

            line = stdin.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) => {
                        if !handle_command(line.trim(), &engine, &tracker, &registry) {
                            break;
                        }
                    }
                    Ok(None) => {
                        // Stdin closed; keep running on ticks and signals.
                        info!("Stdin closed, commands disabled");
                        stdin_open = false;
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to read command");
                    }
                }
            }
        }
    }

    info!("Shutting down...");
    engine.shutdown();
    info!("Pomonote stopped");
    Ok(())
}

/// Applies one document change notification to the task registry.
fn handle_vault_event(event: VaultEvent, registry: &TaskRegistry) {
    match event {
        VaultEvent::DocumentChanged { path, text, items } => {
            registry.update_document(&path, &text, &items);
        }
        VaultEvent::DocumentRemoved(path) => {
            registry.remove_document(&path);
        }
    }
}

/// Handles one stdin command. Returns `false` when the daemon should stop.
fn handle_command(
    command: &str,
    engine: &TimerEngine,
    tracker: &ActiveTaskTracker,
    registry: &TaskRegistry,
) -> bool {
    let mut parts = command.splitn(2, char::is_whitespace);
    let verb = parts.next().unwrap_or_default();
    let argument = parts.next().map(str::trim).unwrap_or_default();

    match verb {
        "" => {}
        "start" => engine.start(),
        "pause" => engine.pause(),
        "toggle" => engine.toggle_timer(),
        "reset" => engine.reset(),
        "finish" => engine.timeup(),
        "mode" => engine.toggle_mode(|state| {
            println!("mode: {} ({})", state.mode, state.format_remaining());
        }),
        "task" => {
            if argument.is_empty() {
                eprintln!("usage: task <anchor>");
            } else {
                match registry.collection().find_by_anchor(argument) {
                    Some(task) => {
                        println!("active: {}", task.description);
                        tracker.activate(task.clone());
                    }
                    None => eprintln!("no task with anchor '{argument}'"),
                }
            }
        }
        "pin" => tracker.set_pinned(true),
        "unpin" => tracker.set_pinned(false),
        "status" => {
            let state = engine.state();
            let active = tracker
                .snapshot()
                .map(|a| a.task.description)
                .unwrap_or_else(|| "-".to_string());
            println!(
                "{} {}  running={} in_session={}  task={}",
                state.mode,
                state.format_remaining(),
                state.running,
                state.in_session,
                active,
            );
        }
        "quit" | "exit" => return false,
        other => eprintln!("unknown command '{other}'"),
    }
    true
}

/// Initializes the logging subsystem.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .init();
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
