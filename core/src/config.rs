//! Configuration parsed from environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `POMONOTE_VAULT_DIR` | Yes | - | Root directory of the note vault |
//! | `POMONOTE_PERIODIC_DIR` | No | vault root | Directory for daily/weekly notes, relative to the vault |
//! | `POMONOTE_WORK_MINUTES` | No | 25 | Work session length in minutes |
//! | `POMONOTE_BREAK_MINUTES` | No | 5 | Break length in minutes (0 disables breaks) |
//! | `POMONOTE_AUTOSTART` | No | false | Start the next session automatically on timeout |
//! | `POMONOTE_LOG_DESTINATION` | No | none | `none`, `daily`, `weekly`, or `file` |
//! | `POMONOTE_LOG_FILE` | If destination=file | - | Log document path, relative to the vault |
//! | `POMONOTE_LOG_FORMAT` | No | verbose | `simple`, `verbose`, or `custom` |
//! | `POMONOTE_LOG_LEVEL` | No | all | `all`, `work`, or `break` |
//! | `POMONOTE_LOG_FOCUSED` | No | true | Log into the active task's own document |
//! | `POMONOTE_TASK_DIALECT` | No | tasks | Task annotation dialect: `tasks` or `dataview` |
//! | `POMONOTE_TICK_MS` | No | 1000 | Timer tick interval in milliseconds |
//!
//! # Example
//!
//! ```no_run
//! use pomonote_core::config::Config;
//!
//! let config = Config::from_env().expect("Failed to load configuration");
//! println!("Vault: {}", config.vault_dir.display());
//! ```

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use directories::BaseDirs;
use thiserror::Error;

use crate::logger::{LogDestination, LogFormat, LogLevel, LogSettings};
use crate::task::parser::Dialect;
use crate::ticker::DEFAULT_TICK_MS;
use crate::timer::TimerSettings;

/// Default work session length in minutes.
const DEFAULT_WORK_MINUTES: u64 = 25;

/// Default break length in minutes.
const DEFAULT_BREAK_MINUTES: u64 = 5;

/// Errors that can occur during configuration parsing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Environment variable has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to determine home directory.
    #[error("failed to determine home directory")]
    NoHomeDirectory,
}

/// Configuration for the pomonote daemon.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory of the note vault.
    pub vault_dir: PathBuf,

    /// Directory holding periodic notes, relative to the vault root.
    /// If `None`, periodic notes live in the vault root.
    pub periodic_dir: Option<PathBuf>,

    /// Timer durations and autostart behavior.
    pub timer: TimerSettings,

    /// Session logging behavior.
    pub log: LogSettings,

    /// Task annotation dialect used by the parser.
    pub dialect: Dialect,

    /// Timer tick interval in milliseconds.
    pub tick_ms: u64,
}

impl Config {
    /// Creates a new `Config` by parsing environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - `POMONOTE_VAULT_DIR` is not set
    /// - `POMONOTE_LOG_DESTINATION` is `file` but `POMONOTE_LOG_FILE` is not set
    /// - Any variable is set to a value that does not parse
    /// - The home directory cannot be determined (needed for `~` expansion)
    pub fn from_env() -> Result<Self, ConfigError> {
        // Required: POMONOTE_VAULT_DIR
        let vault_dir = env::var("POMONOTE_VAULT_DIR")
            .map_err(|_| ConfigError::MissingEnvVar("POMONOTE_VAULT_DIR".to_string()))?;
        let vault_dir = expand_home(&vault_dir)?;

        // Optional: POMONOTE_PERIODIC_DIR (default: vault root)
        let periodic_dir = env::var("POMONOTE_PERIODIC_DIR").ok().map(PathBuf::from);

        let work_minutes = parse_minutes("POMONOTE_WORK_MINUTES", DEFAULT_WORK_MINUTES, 1)?;
        let break_minutes = parse_minutes("POMONOTE_BREAK_MINUTES", DEFAULT_BREAK_MINUTES, 0)?;
        let autostart = parse_bool("POMONOTE_AUTOSTART", false)?;

        // Optional: POMONOTE_LOG_DESTINATION (default: none)
        let destination = match env::var("POMONOTE_LOG_DESTINATION") {
            Ok(val) => match val.to_ascii_lowercase().as_str() {
                "none" => LogDestination::Disabled,
                "daily" => LogDestination::Daily,
                "weekly" => LogDestination::Weekly,
                "file" => {
                    let path = env::var("POMONOTE_LOG_FILE").map_err(|_| {
                        ConfigError::MissingEnvVar("POMONOTE_LOG_FILE".to_string())
                    })?;
                    LogDestination::File(PathBuf::from(path))
                }
                other => {
                    return Err(ConfigError::InvalidValue {
                        key: "POMONOTE_LOG_DESTINATION".to_string(),
                        message: format!("expected none|daily|weekly|file, got '{other}'"),
                    });
                }
            },
            Err(_) => LogDestination::Disabled,
        };

        let format = parse_from_str("POMONOTE_LOG_FORMAT", LogFormat::Verbose)?;
        let level = parse_from_str("POMONOTE_LOG_LEVEL", LogLevel::All)?;
        let log_focused = parse_bool("POMONOTE_LOG_FOCUSED", true)?;
        let dialect = parse_from_str("POMONOTE_TASK_DIALECT", Dialect::Tasks)?;

        // Optional: POMONOTE_TICK_MS (default: 1000, must be > 0)
        let tick_ms = match env::var("POMONOTE_TICK_MS") {
            Ok(val) => {
                let ms = val.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                    key: "POMONOTE_TICK_MS".to_string(),
                    message: format!("expected positive integer, got '{val}'"),
                })?;
                if ms == 0 {
                    return Err(ConfigError::InvalidValue {
                        key: "POMONOTE_TICK_MS".to_string(),
                        message: "tick interval must be greater than 0".to_string(),
                    });
                }
                ms
            }
            Err(_) => DEFAULT_TICK_MS,
        };

        Ok(Self {
            vault_dir,
            periodic_dir,
            timer: TimerSettings {
                work_minutes,
                break_minutes,
                autostart,
            },
            log: LogSettings {
                destination,
                format,
                level,
                log_focused,
            },
            dialect,
            tick_ms,
        })
    }
}

/// Expands a leading `~` to the user's home directory.
fn expand_home(path: &str) -> Result<PathBuf, ConfigError> {
    if path == "~" {
        let base_dirs = BaseDirs::new().ok_or(ConfigError::NoHomeDirectory)?;
        return Ok(base_dirs.home_dir().to_path_buf());
    }
    if let Some(rest) = path.strip_prefix("~/") {
        let base_dirs = BaseDirs::new().ok_or(ConfigError::NoHomeDirectory)?;
        return Ok(base_dirs.home_dir().join(rest));
    }
    Ok(PathBuf::from(path))
}

/// Parses an optional minute count with a lower bound.
fn parse_minutes(key: &str, default: u64, min: u64) -> Result<u64, ConfigError> {
    match env::var(key) {
        Ok(val) => {
            let minutes = val.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected integer, got '{val}'"),
            })?;
            if minutes < min {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!("must be at least {min}, got {minutes}"),
                });
            }
            Ok(minutes)
        }
        Err(_) => Ok(default),
    }
}

/// Parses an optional boolean accepting `true`/`false`/`1`/`0`.
fn parse_bool(key: &str, default: bool) -> Result<bool, ConfigError> {
    match env::var(key) {
        Ok(val) => match val.to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            other => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected true|false, got '{other}'"),
            }),
        },
        Err(_) => Ok(default),
    }
}

/// Parses an optional keyword value through the type's `FromStr`.
fn parse_from_str<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr<Err = String>,
{
    match env::var(key) {
        Ok(val) => val.parse().map_err(|message| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    /// Helper to run tests with isolated environment variables.
    /// Clears all POMONOTE_* vars before the test and restores them after.
    fn with_clean_env<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let saved_vars: Vec<(String, String)> = env::vars()
            .filter(|(k, _)| k.starts_with("POMONOTE_"))
            .collect();

        for (key, _) in &saved_vars {
            env::remove_var(key);
        }

        let result = f();

        for (key, value) in saved_vars {
            env::set_var(key, value);
        }

        result
    }

    #[test]
    #[serial]
    fn test_missing_vault_dir() {
        with_clean_env(|| {
            let result = Config::from_env();
            assert!(result.is_err());

            let err = result.unwrap_err();
            assert!(matches!(err, ConfigError::MissingEnvVar(ref s) if s == "POMONOTE_VAULT_DIR"));
        });
    }

    #[test]
    #[serial]
    fn test_minimal_config() {
        with_clean_env(|| {
            env::set_var("POMONOTE_VAULT_DIR", "/vault");

            let config = Config::from_env().expect("should parse minimal config");

            assert_eq!(config.vault_dir, PathBuf::from("/vault"));
            assert!(config.periodic_dir.is_none());
            assert_eq!(config.timer.work_minutes, DEFAULT_WORK_MINUTES);
            assert_eq!(config.timer.break_minutes, DEFAULT_BREAK_MINUTES);
            assert!(!config.timer.autostart);
            assert_eq!(config.log.destination, LogDestination::Disabled);
            assert_eq!(config.log.format, LogFormat::Verbose);
            assert_eq!(config.log.level, LogLevel::All);
            assert!(config.log.log_focused);
            assert_eq!(config.dialect, Dialect::Tasks);
            assert_eq!(config.tick_ms, DEFAULT_TICK_MS);
        });
    }

    #[test]
    #[serial]
    fn test_full_config() {
        with_clean_env(|| {
            env::set_var("POMONOTE_VAULT_DIR", "/vault");
            env::set_var("POMONOTE_PERIODIC_DIR", "journal");
            env::set_var("POMONOTE_WORK_MINUTES", "50");
            env::set_var("POMONOTE_BREAK_MINUTES", "10");
            env::set_var("POMONOTE_AUTOSTART", "true");
            env::set_var("POMONOTE_LOG_DESTINATION", "daily");
            env::set_var("POMONOTE_LOG_FORMAT", "simple");
            env::set_var("POMONOTE_LOG_LEVEL", "work");
            env::set_var("POMONOTE_LOG_FOCUSED", "false");
            env::set_var("POMONOTE_TASK_DIALECT", "dataview");
            env::set_var("POMONOTE_TICK_MS", "250");

            let config = Config::from_env().expect("should parse full config");

            assert_eq!(config.periodic_dir, Some(PathBuf::from("journal")));
            assert_eq!(config.timer.work_minutes, 50);
            assert_eq!(config.timer.break_minutes, 10);
            assert!(config.timer.autostart);
            assert_eq!(config.log.destination, LogDestination::Daily);
            assert_eq!(config.log.format, LogFormat::Simple);
            assert_eq!(config.log.level, LogLevel::Work);
            assert!(!config.log.log_focused);
            assert_eq!(config.dialect, Dialect::Dataview);
            assert_eq!(config.tick_ms, 250);
        });
    }

    #[test]
    #[serial]
    fn test_file_destination_requires_path() {
        with_clean_env(|| {
            env::set_var("POMONOTE_VAULT_DIR", "/vault");
            env::set_var("POMONOTE_LOG_DESTINATION", "file");

            let result = Config::from_env();
            assert!(result.is_err());

            let err = result.unwrap_err();
            assert!(matches!(err, ConfigError::MissingEnvVar(ref s) if s == "POMONOTE_LOG_FILE"));
        });
    }

    #[test]
    #[serial]
    fn test_file_destination_with_path() {
        with_clean_env(|| {
            env::set_var("POMONOTE_VAULT_DIR", "/vault");
            env::set_var("POMONOTE_LOG_DESTINATION", "file");
            env::set_var("POMONOTE_LOG_FILE", "logs/pomodoro.md");

            let config = Config::from_env().expect("should parse file destination");
            assert_eq!(
                config.log.destination,
                LogDestination::File(PathBuf::from("logs/pomodoro.md"))
            );
        });
    }

    #[test]
    #[serial]
    fn test_invalid_destination_rejected() {
        with_clean_env(|| {
            env::set_var("POMONOTE_VAULT_DIR", "/vault");
            env::set_var("POMONOTE_LOG_DESTINATION", "clipboard");

            let result = Config::from_env();
            let err = result.unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidValue { ref key, .. } if key == "POMONOTE_LOG_DESTINATION"
            ));
        });
    }

    #[test]
    #[serial]
    fn test_zero_work_minutes_rejected() {
        with_clean_env(|| {
            env::set_var("POMONOTE_VAULT_DIR", "/vault");
            env::set_var("POMONOTE_WORK_MINUTES", "0");

            let result = Config::from_env();
            let err = result.unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidValue { ref key, ref message }
                    if key == "POMONOTE_WORK_MINUTES" && message.contains("at least 1")
            ));
        });
    }

    #[test]
    #[serial]
    fn test_zero_break_minutes_allowed() {
        with_clean_env(|| {
            env::set_var("POMONOTE_VAULT_DIR", "/vault");
            env::set_var("POMONOTE_BREAK_MINUTES", "0");

            let config = Config::from_env().expect("zero breaks are valid");
            assert_eq!(config.timer.break_minutes, 0);
        });
    }

    #[test]
    #[serial]
    fn test_invalid_autostart_rejected() {
        with_clean_env(|| {
            env::set_var("POMONOTE_VAULT_DIR", "/vault");
            env::set_var("POMONOTE_AUTOSTART", "maybe");

            let result = Config::from_env();
            let err = result.unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidValue { ref key, .. } if key == "POMONOTE_AUTOSTART"
            ));
        });
    }

    #[test]
    #[serial]
    fn test_zero_tick_rejected() {
        with_clean_env(|| {
            env::set_var("POMONOTE_VAULT_DIR", "/vault");
            env::set_var("POMONOTE_TICK_MS", "0");

            let result = Config::from_env();
            let err = result.unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidValue { ref key, ref message }
                    if key == "POMONOTE_TICK_MS" && message.contains("greater than 0")
            ));
        });
    }

    #[test]
    #[serial]
    fn test_tilde_expansion() {
        with_clean_env(|| {
            env::set_var("POMONOTE_VAULT_DIR", "~/notes");

            let config = Config::from_env().expect("should expand home");
            assert!(config.vault_dir.is_absolute());
            assert!(config.vault_dir.ends_with("notes"));
        });
    }
}
