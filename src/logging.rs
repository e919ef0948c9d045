/// Structured logging for the neutron monitor utilities
///
/// Log lines carry a timestamp, level, data source tag and, where it
/// applies, the station the message is about. Lines go to stderr and can
/// also be appended to a file for runs started by a scheduler.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use chrono::Utc;
use log::Level;

use crate::config::LoggingConfig;
use crate::error::{NmdbError, Result};
use crate::ingest::nmdb::FeedReport;
use crate::ingest::pipeline::IngestOutcome;

// ---------------------------------------------------------------------------
// Data Source Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Feed,
    Database,
    Plot,
    System,
}

impl DataSource {
    /// `log` target for records from this source.
    pub fn target(&self) -> &'static str {
        match self {
            DataSource::Feed => "FEED",
            DataSource::Database => "DB",
            DataSource::Plot => "PLOT",
            DataSource::System => "SYS",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.target())
    }
}

// ---------------------------------------------------------------------------
// Logger setup
// ---------------------------------------------------------------------------

/// Writes every log line to stderr and to an append-only file.
struct TeeWriter {
    file: File,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

fn open_log_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| NmdbError::config(format!("Couldn't open log file {}: {}", path.display(), e)))
}

/// Initialize the global logger. `RUST_LOG` overrides the configured level.
pub fn init_logger(config: &LoggingConfig) -> Result<()> {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(config.level)
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {} {}",
                Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
                level_label(record.level()),
                record.args()
            )
        });

    if let Some(path) = &config.file {
        let file = open_log_file(path)?;
        builder.target(env_logger::Target::Pipe(Box::new(TeeWriter { file })));
    }

    builder
        .try_init()
        .map_err(|e| NmdbError::config(format!("Logger already initialized: {}", e)))
}

fn level_label(level: Level) -> &'static str {
    match level {
        Level::Error => "ERROR",
        Level::Warn => "WARN",
        Level::Info => "INFO",
        Level::Debug => "DEBUG",
        Level::Trace => "TRACE",
    }
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

/// "FEED [OULU]: message", or "FEED: message" without a station.
pub fn format_context(source: DataSource, station: Option<&str>, message: &str) -> String {
    let station_part = station.map(|s| format!(" [{}]", s)).unwrap_or_default();
    format!("{}{}: {}", source, station_part, message)
}

fn emit(level: Level, source: DataSource, station: Option<&str>, message: &str) {
    log::log!(target: source.target(), level, "{}", format_context(source, station, message));
}

/// Log a general informational message
pub fn info(source: DataSource, station: Option<&str>, message: &str) {
    emit(Level::Info, source, station, message);
}

/// Log a warning message
pub fn warn(source: DataSource, station: Option<&str>, message: &str) {
    emit(Level::Warn, source, station, message);
}

/// Log an error message
pub fn error(source: DataSource, station: Option<&str>, message: &str) {
    emit(Level::Error, source, station, message);
}

/// Log a debug message
pub fn debug(source: DataSource, station: Option<&str>, message: &str) {
    emit(Level::Debug, source, station, message);
}

// ---------------------------------------------------------------------------
// Summary Logging
// ---------------------------------------------------------------------------

/// Log each malformed feed line, then a one-line parse summary.
pub fn log_feed_report(report: &FeedReport) {
    for skipped in &report.skipped {
        warn(
            DataSource::Feed,
            None,
            &format!(
                "Couldn't process line {} ({}): {}",
                skipped.line_number, skipped.reason, skipped.content
            ),
        );
    }

    let message = format!(
        "Parsed {} values from {} stations, skipped {} malformed lines",
        report.candidates.len(),
        report.candidates.stations().len(),
        report.skipped.len()
    );
    if report.skipped.is_empty() {
        info(DataSource::Feed, None, &message);
    } else {
        warn(DataSource::Feed, None, &message);
    }
}

/// Log the result of one ingest run.
pub fn log_ingest_outcome(outcome: &IngestOutcome) {
    match outcome {
        IngestOutcome::Committed(summary) => {
            let message = format!(
                "Inserted {} of {} new values ({} already present, {} at or below watermark)",
                summary.inserted,
                summary.new_after_watermark,
                summary.already_present,
                summary.candidates - summary.new_after_watermark
            );
            info(DataSource::Database, None, &message);
        }
        IngestOutcome::Contended { table, .. } => {
            warn(
                DataSource::Database,
                None,
                &format!("Someone already writing to table {}, nothing written", table),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_context_with_station() {
        assert_eq!(
            format_context(DataSource::Feed, Some("OULU"), "parsed"),
            "FEED [OULU]: parsed"
        );
        assert_eq!(format_context(DataSource::Database, None, "locked"), "DB: locked");
    }

    #[test]
    fn test_tee_writer_appends_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nmdb.log");
        let mut tee = TeeWriter { file: open_log_file(&path).unwrap() };
        tee.write_all(b"first\n").unwrap();
        tee.flush().unwrap();

        let mut tee = TeeWriter { file: open_log_file(&path).unwrap() };
        tee.write_all(b"second\n").unwrap();
        tee.flush().unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }
}
