//! Offline repair pass over a log document.
//!
//! A machine sleep or clock jump during a work session can stamp an end
//! time only seconds after the begin time while the logged duration says
//! otherwise. The corrector detects that signature on verbose work lines
//! and rewrites the end time from `begin + duration`, leaving duration
//! and begin untouched.

use std::path::Path;

use chrono::{Duration, NaiveDateTime};
use regex::Regex;
use tracing::{debug, info};

use crate::error::Result;
use crate::vault::Vault;

/// Timestamp layout used inside verbose log annotations.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Real elapsed minutes below this are suspiciously short.
const REAL_MINUTES_MAX: i64 = 3;

/// Logged durations above this are long enough to trust over the clock.
const LOGGED_MINUTES_MIN: i64 = 20;

/// Outcome of one correction pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CorrectionReport {
    /// Verbose work lines inspected.
    pub lines_scanned: usize,
    /// Lines whose end time was rewritten.
    pub lines_corrected: usize,
}

impl CorrectionReport {
    /// Whether the pass changed anything.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.lines_corrected > 0
    }
}

/// Rewrites bogus end times on verbose work log lines.
#[derive(Debug)]
pub struct LogCorrector {
    work_line: Regex,
}

impl Default for LogCorrector {
    fn default() -> Self {
        Self::new()
    }
}

impl LogCorrector {
    /// Creates a corrector with the verbose work line pattern compiled.
    #[must_use]
    pub fn new() -> Self {
        let work_line = Regex::new(
            r"^(?P<head>\s*- 🍅 \(pomodoro::WORK\).*\(duration:: (?P<dur>\d+)m\) \(begin:: (?P<begin>\d{4}-\d{2}-\d{2} \d{2}:\d{2})\) - \(end:: )(?P<end>\d{4}-\d{2}-\d{2} \d{2}:\d{2})\)$",
        )
        .expect("invalid regex");
        Self { work_line }
    }

    /// Corrects a document in place through the vault.
    ///
    /// Writes the document back only when at least one line changed.
    pub fn correct_document(&self, vault: &dyn Vault, path: &Path) -> Result<CorrectionReport> {
        let text = vault.read_document(path)?;
        let (corrected, report) = self.correct_text(&text);
        if report.changed() {
            vault.write_document(path, &corrected)?;
            info!(
                path = %path.display(),
                corrected = report.lines_corrected,
                scanned = report.lines_scanned,
                "Log end times corrected"
            );
        } else {
            info!(
                path = %path.display(),
                scanned = report.lines_scanned,
                "No corrections needed"
            );
        }
        Ok(report)
    }

    /// Pure correction pass over document text.
    ///
    /// Lines that do not match the verbose work shape, or whose timestamps
    /// do not meet the mismatch heuristic, pass through unchanged.
    #[must_use]
    pub fn correct_text(&self, text: &str) -> (String, CorrectionReport) {
        let mut report = CorrectionReport::default();
        let lines: Vec<String> = text
            .lines()
            .map(|line| self.correct_line(line, &mut report))
            .collect();

        let mut result = lines.join("\n");
        if text.is_empty() || text.ends_with('\n') {
            result.push('\n');
        }
        (result, report)
    }

    fn correct_line(&self, line: &str, report: &mut CorrectionReport) -> String {
        let Some(caps) = self.work_line.captures(line) else {
            return line.to_string();
        };
        report.lines_scanned += 1;

        let logged: i64 = match caps["dur"].parse() {
            Ok(minutes) => minutes,
            Err(_) => return line.to_string(),
        };
        let (Ok(begin), Ok(end)) = (
            NaiveDateTime::parse_from_str(&caps["begin"], TIMESTAMP_FORMAT),
            NaiveDateTime::parse_from_str(&caps["end"], TIMESTAMP_FORMAT),
        ) else {
            return line.to_string();
        };

        let real = (end - begin).num_minutes();
        if real >= REAL_MINUTES_MAX || logged <= LOGGED_MINUTES_MIN {
            return line.to_string();
        }

        let fixed_end = begin + Duration::minutes(logged);
        report.lines_corrected += 1;
        debug!(
            begin = %caps["begin"],
            old_end = %caps["end"],
            logged,
            real,
            "Rewriting log end time"
        );
        format!("{}{})", &caps["head"], fixed_end.format(TIMESTAMP_FORMAT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::format_verbose;
    use crate::task::TaskRecord;
    use crate::timer::{LogContext, Mode, TimerSettings, TimerState, MILLIS_PER_MINUTE};
    use crate::vault::FsVault;
    use chrono::TimeZone;
    use std::fs;
    use tempfile::TempDir;

    const MATCHING_LINE: &str = "- 🍅 (pomodoro::WORK) (taskID:: abc1) (duration:: 7m) \
                                 (begin:: 2024-01-01 10:00) - (end:: 2024-01-01 10:07)";

    #[test]
    fn consistent_line_is_left_unchanged() {
        let corrector = LogCorrector::new();
        let (text, report) = corrector.correct_text(MATCHING_LINE);
        assert_eq!(text.trim_end(), MATCHING_LINE);
        assert_eq!(report.lines_scanned, 1);
        assert!(!report.changed());
    }

    #[test]
    fn short_logged_duration_is_not_corrected() {
        // Real duration 1 minute but logged only 7: below the trust
        // threshold, so the line stays as written.
        let line = "- 🍅 (pomodoro::WORK) (taskID:: abc1) (duration:: 7m) \
                    (begin:: 2024-01-01 10:00) - (end:: 2024-01-01 10:01)";
        let corrector = LogCorrector::new();
        let (text, report) = corrector.correct_text(line);
        assert_eq!(text.trim_end(), line);
        assert!(!report.changed());
    }

    #[test]
    fn mismatched_line_gets_end_rewritten() {
        let line = "- 🍅 (pomodoro::WORK) (taskID:: abc1) (duration:: 30m) \
                    (begin:: 2024-01-01 10:00) - (end:: 2024-01-01 10:01)";
        let corrector = LogCorrector::new();
        let (text, report) = corrector.correct_text(line);
        assert_eq!(
            text.trim_end(),
            "- 🍅 (pomodoro::WORK) (taskID:: abc1) (duration:: 30m) \
             (begin:: 2024-01-01 10:00) - (end:: 2024-01-01 10:30)"
        );
        assert_eq!(report.lines_corrected, 1);
    }

    #[test]
    fn correction_crossing_midnight() {
        let line = "- 🍅 (pomodoro::WORK) (taskID:: abc1) (duration:: 45m) \
                    (begin:: 2024-01-01 23:50) - (end:: 2024-01-01 23:51)";
        let corrector = LogCorrector::new();
        let (text, _) = corrector.correct_text(line);
        assert!(text.contains("(end:: 2024-01-02 00:35)"));
    }

    #[test]
    fn indented_child_line_is_corrected() {
        let line = "\t- 🍅 (pomodoro::WORK) (taskID:: abc1) (duration:: 25m) \
                    (begin:: 2024-01-01 10:00) - (end:: 2024-01-01 10:00)";
        let corrector = LogCorrector::new();
        let (text, report) = corrector.correct_text(line);
        assert!(text.starts_with('\t'));
        assert!(text.contains("(end:: 2024-01-01 10:25)"));
        assert_eq!(report.lines_corrected, 1);
    }

    #[test]
    fn break_and_prose_lines_pass_through() {
        let doc = "# Log\n\
                   - 🥤 (pomodoro::BREAK) (taskID:: ) (duration:: 5m) \
                   (begin:: 2024-01-01 10:25) - (end:: 2024-01-01 10:26)\n\
                   plain prose line\n\
                   **WORK(25m)**: 10:00 - 10:25\n";
        let corrector = LogCorrector::new();
        let (text, report) = corrector.correct_text(doc);
        assert_eq!(text, doc);
        assert_eq!(report.lines_scanned, 0);
    }

    #[test]
    fn corrector_is_idempotent() {
        let doc = format!(
            "- 🍅 (pomodoro::WORK) (taskID:: a) (duration:: 30m) \
             (begin:: 2024-01-01 10:00) - (end:: 2024-01-01 10:01)\n\
             {MATCHING_LINE}\n"
        );
        let corrector = LogCorrector::new();
        let (first, report) = corrector.correct_text(&doc);
        assert!(report.changed());
        let (second, report) = corrector.correct_text(&first);
        assert_eq!(first, second);
        assert!(!report.changed());
    }

    #[test]
    fn formatter_output_round_trips_through_pattern() {
        let mut state = TimerState::new(TimerSettings::default());
        state.mode = Mode::Work;
        state.elapsed_ms = 25 * MILLIS_PER_MINUTE;
        state.count_ms = state.elapsed_ms;
        let begin = chrono::Local.with_ymd_and_hms(2024, 3, 5, 9, 30, 0).unwrap();
        let mut task = TaskRecord::placeholder(None);
        task.block_anchor = Some("^xy9z".to_string());
        let context = LogContext {
            state,
            task,
            begin,
            end: begin + chrono::Duration::minutes(25),
        };

        let line = format_verbose(&context);
        let corrector = LogCorrector::new();
        let caps = corrector.work_line.captures(&line).expect("line matches");
        assert_eq!(&caps["dur"], "25");
        assert_eq!(&caps["begin"], "2024-03-05 09:30");
        assert_eq!(&caps["end"], "2024-03-05 09:55");
    }

    #[test]
    fn correct_document_writes_only_when_changed() {
        let dir = TempDir::new().unwrap();
        let vault = FsVault::open(dir.path().to_path_buf(), None).unwrap();
        let path = dir.path().join("log.md");
        fs::write(&path, format!("{MATCHING_LINE}\n")).unwrap();

        let corrector = LogCorrector::new();
        let report = corrector.correct_document(&vault, &path).unwrap();
        assert!(!report.changed());
        assert_eq!(fs::read_to_string(&path).unwrap(), format!("{MATCHING_LINE}\n"));

        let broken = "- 🍅 (pomodoro::WORK) (taskID:: abc1) (duration:: 30m) \
                      (begin:: 2024-01-01 10:00) - (end:: 2024-01-01 10:01)\n";
        fs::write(&path, broken).unwrap();
        let report = corrector.correct_document(&vault, &path).unwrap();
        assert_eq!(report.lines_corrected, 1);
        assert!(fs::read_to_string(&path)
            .unwrap()
            .contains("(end:: 2024-01-01 10:30)"));
    }
}
