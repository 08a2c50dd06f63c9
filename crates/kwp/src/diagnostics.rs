//! 📝 Diagnostics: the run's paper trail.
//!
//! 🎬 *[a 10GB file scrolls past. somewhere around line 4,812,331 a product list
//! forgets its revenue column. nobody panics. one line gets written down.]*
//!
//! This is the per-run log artifact that ships next to the report. It is leveled,
//! it opens its file only when the first message actually lands (no empty log
//! files littering the outbound folder), it buffers, and it keeps a running tally
//! of Error-level messages for the end-of-run summary.
//!
//! Every message is also mirrored into `tracing`, so an operator tailing the
//! console sees the same story the log file tells. 🦆
//!
//! 🧠 Knowledge graph:
//! - Constructed by the `Supervisor`, handed down by `&mut` to every stage.
//! - Lifecycle: `write` (lazy open) → `flush` → `close`. `Drop` flushes as a last resort.
//! - I/O failures are sticky: the first one is kept and surfaced by `close()`,
//!   which the supervisor treats as a stage failure.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// 🎚️ How loud the diagnostics log is allowed to be.
///
/// Ordered: `None < Error < Info < Debug`. A message lands in the file when its
/// level is not `None` and is at or below the configured threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    None,
    Error,
    Info,
    #[default]
    Debug,
}

impl LogLevel {
    /// 🏷️ The bracketed label written at the start of each log line.
    pub fn label(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Error => "Error",
            Self::Info => "Info",
            Self::Debug => "Debug",
        }
    }
}

/// 🔧 Diagnostics knobs. Lives here, next to the thing it configures.
#[derive(Debug, Deserialize, Clone)]
pub struct DiagnosticsConfig {
    /// 📄 Log file name inside the output directory. `{date}` expands to `YYYY-MM-DD`.
    #[serde(default = "default_log_file_name")]
    pub file_name: String,
    /// 🎚️ Threshold. Defaults to `debug`, i.e. everything.
    #[serde(default)]
    pub level: LogLevel,
    /// 📦 BufWriter capacity in bytes.
    #[serde(default = "default_log_buffer_bytes")]
    pub buffer_bytes: usize,
}

fn default_log_file_name() -> String {
    "{date}_Log.txt".to_string()
}

// -- 📦 1 MiB. one potential message per input line adds up fast on a 10GB file.
fn default_log_buffer_bytes() -> usize {
    1024 * 1024
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            file_name: default_log_file_name(),
            level: LogLevel::default(),
            buffer_bytes: default_log_buffer_bytes(),
        }
    }
}

/// 📝 The lazily-opened, buffered, leveled diagnostics sink.
pub struct Diagnostics {
    path: PathBuf,
    level: LogLevel,
    buffer_bytes: usize,
    writer: Option<BufWriter<File>>,
    // -- 🔒 once true, a reopen appends instead of truncating what we already wrote
    has_opened: bool,
    error_count: u64,
    failure: Option<io::Error>,
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("path", &self.path)
            .field("level", &self.level)
            .field("error_count", &self.error_count)
            .field("is_open", &self.writer.is_some())
            .finish()
    }
}

impl Diagnostics {
    /// 🚀 Build a sink pointed at `path`. Nothing touches the disk yet.
    pub fn new(path: impl Into<PathBuf>, config: &DiagnosticsConfig) -> Self {
        Self {
            path: path.into(),
            level: config.level,
            buffer_bytes: config.buffer_bytes.max(1),
            writer: None,
            has_opened: false,
            error_count: 0,
            failure: None,
        }
    }

    /// ✍️ Record one message. Never fails; I/O trouble is parked until `close()`.
    pub fn write(&mut self, level: LogLevel, message: impl fmt::Display) {
        match level {
            LogLevel::None => return,
            LogLevel::Error => {
                self.error_count += 1;
                error!("{}", message);
            }
            LogLevel::Info => info!("{}", message),
            LogLevel::Debug => debug!("{}", message),
        }

        if level > self.level || self.failure.is_some() {
            return;
        }

        let outcome = self
            .ensure_open()
            .and_then(|writer| writeln!(writer, "[{}]\t{}", level.label(), message));
        if let Err(err) = outcome {
            self.park_failure(err);
        }
    }

    pub fn error(&mut self, message: impl fmt::Display) {
        self.write(LogLevel::Error, message);
    }

    pub fn info(&mut self, message: impl fmt::Display) {
        self.write(LogLevel::Info, message);
    }

    pub fn debug(&mut self, message: impl fmt::Display) {
        self.write(LogLevel::Debug, message);
    }

    /// 🔢 How many Error-level messages have been recorded this run.
    pub fn error_count(&self) -> u64 {
        self.error_count
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 🤔 Did anything ever make it to disk? The publisher skips the log if not.
    pub fn was_opened(&self) -> bool {
        self.has_opened
    }

    /// 🚽 Push buffered lines to disk without letting go of the file.
    pub fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(err) = writer.flush() {
                self.park_failure(err);
            }
        }
        self.take_failure()
    }

    /// 🗑️ Flush and release the file. Safe to call twice. A later `write` reopens in append mode.
    pub fn close(&mut self) -> Result<()> {
        let flushed = self.flush();
        self.writer = None;
        flushed
    }

    fn ensure_open(&mut self) -> io::Result<&mut BufWriter<File>> {
        if self.writer.is_none() {
            let mut options = OpenOptions::new();
            options.create(true);
            if self.has_opened {
                options.append(true);
            } else {
                options.write(true).truncate(true);
            }
            let file = options.open(&self.path)?;
            self.has_opened = true;
            self.writer = Some(BufWriter::with_capacity(self.buffer_bytes, file));
        }
        // -- ✅ just filled it above if it was empty
        self.writer
            .as_mut()
            .ok_or_else(|| io::Error::other("diagnostics writer vanished"))
    }

    fn park_failure(&mut self, err: io::Error) {
        warn!(
            "💀 diagnostics log '{}' stopped accepting writes: {}",
            self.path.display(),
            err
        );
        self.writer = None;
        if self.failure.is_none() {
            self.failure = Some(err);
        }
    }

    fn take_failure(&mut self) -> Result<()> {
        match self.failure.take() {
            Some(err) => Err(err).context(format!(
                "💀 The diagnostics log '{}' refused to be written. The run's paper trail has a hole in it.",
                self.path.display()
            )),
            None => Ok(()),
        }
    }
}

impl Drop for Diagnostics {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.flush();
        }
    }
}

/// ⏱️ `m:ss.ssss` for the "Parsing Time" / "Sorting Time" debug lines.
pub fn format_stage_time(elapsed: Duration) -> String {
    let total = elapsed.as_secs_f64();
    let minutes = (total / 60.0).floor();
    let seconds = total - minutes * 60.0;
    format!("{}:{:07.4}", minutes as u64, seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_level(level: LogLevel) -> DiagnosticsConfig {
        DiagnosticsConfig {
            level,
            ..DiagnosticsConfig::default()
        }
    }

    #[test]
    fn the_one_where_nothing_is_written_and_no_file_appears() -> Result<()> {
        let the_dir = tempfile::tempdir()?;
        let the_path = the_dir.path().join("quiet.txt");
        let mut diagnostics = Diagnostics::new(&the_path, &DiagnosticsConfig::default());

        diagnostics.close()?;

        assert!(!the_path.exists(), "an empty run must not leave an empty log behind");
        assert!(!diagnostics.was_opened());
        Ok(())
    }

    #[test]
    fn the_one_where_levels_get_their_brackets() -> Result<()> {
        let the_dir = tempfile::tempdir()?;
        let the_path = the_dir.path().join("log.txt");
        let mut diagnostics = Diagnostics::new(&the_path, &DiagnosticsConfig::default());

        diagnostics.error("Line: 3\t bad things");
        diagnostics.info("File finished processing.");
        diagnostics.debug("Purchase found for ip 1.2.3.4");
        diagnostics.close()?;

        let the_contents = std::fs::read_to_string(&the_path)?;
        assert_eq!(
            the_contents,
            "[Error]\tLine: 3\t bad things\n[Info]\tFile finished processing.\n[Debug]\tPurchase found for ip 1.2.3.4\n"
        );
        assert_eq!(diagnostics.error_count(), 1);
        Ok(())
    }

    #[test]
    fn the_one_where_the_threshold_filters_but_errors_still_count() -> Result<()> {
        let the_dir = tempfile::tempdir()?;
        let the_path = the_dir.path().join("log.txt");
        let mut diagnostics = Diagnostics::new(&the_path, &config_with_level(LogLevel::Error));

        diagnostics.debug("too chatty");
        diagnostics.info("also too chatty");
        diagnostics.error("this one matters");
        diagnostics.close()?;

        let the_contents = std::fs::read_to_string(&the_path)?;
        assert_eq!(the_contents, "[Error]\tthis one matters\n");

        let mut the_silent_one =
            Diagnostics::new(the_dir.path().join("none.txt"), &config_with_level(LogLevel::None));
        the_silent_one.error("counted, not written");
        the_silent_one.close()?;
        assert_eq!(the_silent_one.error_count(), 1);
        assert!(!the_dir.path().join("none.txt").exists());
        Ok(())
    }

    #[test]
    fn the_one_where_none_level_messages_are_ignored_entirely() -> Result<()> {
        let the_dir = tempfile::tempdir()?;
        let the_path = the_dir.path().join("log.txt");
        let mut diagnostics = Diagnostics::new(&the_path, &DiagnosticsConfig::default());

        diagnostics.write(LogLevel::None, "shh");
        diagnostics.close()?;

        assert!(!the_path.exists());
        assert_eq!(diagnostics.error_count(), 0);
        Ok(())
    }

    #[test]
    fn the_one_where_writing_after_close_appends_instead_of_truncating() -> Result<()> {
        let the_dir = tempfile::tempdir()?;
        let the_path = the_dir.path().join("log.txt");
        let mut diagnostics = Diagnostics::new(&the_path, &DiagnosticsConfig::default());

        diagnostics.info("first");
        diagnostics.close()?;
        diagnostics.info("second");
        diagnostics.close()?;

        assert_eq!(
            std::fs::read_to_string(&the_path)?,
            "[Info]\tfirst\n[Info]\tsecond\n"
        );
        Ok(())
    }

    #[test]
    fn the_one_where_an_unopenable_log_surfaces_on_close() {
        let the_dir = tempfile::tempdir().expect("💀 tempdir said no");
        let the_path = the_dir.path().join("no_such_dir").join("log.txt");
        let mut diagnostics = Diagnostics::new(&the_path, &DiagnosticsConfig::default());

        diagnostics.error("nobody will read this");
        diagnostics.error("or this");

        assert_eq!(diagnostics.error_count(), 2);
        assert!(diagnostics.close().is_err(), "the parked io error must come out of close()");
        assert!(diagnostics.close().is_ok(), "the failure is reported once");
    }

    #[test]
    fn the_one_where_stage_time_reads_like_a_stopwatch() {
        assert_eq!(format_stage_time(Duration::from_millis(3_141)), "0:03.1410");
        assert_eq!(format_stage_time(Duration::from_secs(125)), "2:05.0000");
    }
}
