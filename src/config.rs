//! Process configuration.
//!
//! Each utility parses its command line once, optionally merges a TOML
//! config file underneath it, and ends up with immutable config values that
//! are passed explicitly to the code that needs them.
//!
//! Precedence is command line, then config file, then built-in defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use clap::Args;
use log::LevelFilter;
use serde::Deserialize;

use crate::error::{NmdbError, Result};

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

pub const DEFAULT_DB_NAME: &str = "test";
pub const DEFAULT_DB_USER: &str = "test";
pub const DEFAULT_DB_PASSWORD_ENV: &str = "NMDBPW";
pub const DEFAULT_DB_HOST: &str = "localhost";
pub const DEFAULT_DB_PORT: u16 = 5432;
pub const DEFAULT_TABLE: &str = "test";

pub const DEFAULT_FEED_URL: &str = "https://www.nmdb.eu/rt/realtime.txt";
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_PLOT_TITLE: &str = "Realtime nmdb.eu data";
pub const DEFAULT_TIME_FORMAT: &str = "%H:%M";
pub const DEFAULT_PLOT_PATH: &str = "draw.png";
// 6.4 x 4.8 inches at 300 dpi
pub const DEFAULT_PLOT_WIDTH: u32 = 1920;
pub const DEFAULT_PLOT_HEIGHT: u32 = 1440;

// ---------------------------------------------------------------------------
// Command line argument groups
// ---------------------------------------------------------------------------

/// Database connection options shared by every utility.
#[derive(Args, Debug, Clone, Default)]
pub struct DatabaseArgs {
    /// Operate on database named N [default: test]
    #[arg(long, value_name = "N")]
    pub db_name: Option<String>,

    /// Operate on database as user U [default: test]
    #[arg(long, value_name = "U")]
    pub db_user: Option<String>,

    /// Use password from env var S for database connection [default: NMDBPW]
    #[arg(long, value_name = "S")]
    pub db_password_env: Option<String>,

    /// Operate on database at address H [default: localhost]
    #[arg(long, value_name = "H")]
    pub db_host: Option<String>,

    /// Operate on database at port P [default: 5432]
    #[arg(long, value_name = "P")]
    pub db_port: Option<u16>,

    /// Use table T in database N [default: test]
    #[arg(long, value_name = "T")]
    pub table: Option<String>,
}

/// Options every utility accepts besides the database ones.
#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    #[command(flatten)]
    pub database: DatabaseArgs,

    /// Read defaults from this TOML file
    #[arg(long, value_name = "PATH", env = "NMDB_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Also append log lines to this file
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

/// Time range of the list and draw utilities.
#[derive(Args, Debug, Clone, Default)]
pub struct TimeRangeArgs {
    /// Start from this time (UTC, e.g. 2024-01-01T00:00:00Z; default 1 day ago)
    #[arg(long)]
    pub start: Option<String>,

    /// End at this time (UTC; default now)
    #[arg(long)]
    pub end: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct FetchArgs {
    /// URL for downloading new data [default: https://www.nmdb.eu/rt/realtime.txt]
    #[arg(long)]
    pub url: Option<String>,

    /// Give up on the download after this many seconds [default: 30]
    #[arg(long, value_name = "SECS")]
    pub timeout_secs: Option<u64>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct PlotArgs {
    /// Format of values on time axis [default: %H:%M]
    #[arg(long)]
    pub format: Option<String>,

    /// Plot title to use [default: "Realtime nmdb.eu data"]
    #[arg(long)]
    pub title: Option<String>,

    /// Save plot in PATH [default: draw.png]
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// TrueType font for the title and axis labels
    #[arg(long, value_name = "TTF")]
    pub font: Option<PathBuf>,

    /// Image width in pixels [default: 1920]
    #[arg(long)]
    pub width: Option<u32>,

    /// Image height in pixels [default: 1440]
    #[arg(long)]
    pub height: Option<u32>,
}

// ---------------------------------------------------------------------------
// Config file
// ---------------------------------------------------------------------------

/// Contents of the optional TOML config file; every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub database: DatabaseSection,
    pub fetch: FetchSection,
    pub plot: PlotSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseSection {
    pub name: Option<String>,
    pub user: Option<String>,
    pub password_env: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub table: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchSection {
    pub url: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlotSection {
    pub format: Option<String>,
    pub title: Option<String>,
    pub path: Option<PathBuf>,
    pub font: Option<PathBuf>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    pub level: Option<String>,
    pub file: Option<PathBuf>,
}

impl FileConfig {
    /// Load the config file, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<FileConfig> {
        let Some(path) = path else {
            return Ok(FileConfig::default());
        };
        let text = fs::read_to_string(path).map_err(|e| {
            NmdbError::config(format!("Couldn't read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml(&text)
            .map_err(|e| NmdbError::config(format!("Invalid config file {}: {}", path.display(), e)))
    }

    pub fn from_toml(text: &str) -> std::result::Result<FileConfig, toml::de::Error> {
        toml::from_str(text)
    }
}

// ---------------------------------------------------------------------------
// Table names
// ---------------------------------------------------------------------------

/// A table name that is safe to splice into SQL text.
///
/// Accepts plain or schema-qualified identifiers made of ASCII letters,
/// digits and underscores, not starting with a digit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName(String);

impl TableName {
    pub fn parse(name: &str) -> Result<TableName> {
        let valid_segment = |segment: &str| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
                _ => return false,
            }
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        };
        let segments: Vec<&str> = name.split('.').collect();
        if segments.len() > 2 || !segments.iter().all(|s| valid_segment(s)) {
            return Err(NmdbError::config(format!("Invalid table name {:?}", name)));
        }
        Ok(TableName(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub name: String,
    pub user: String,
    pub password_env: String,
    pub host: String,
    pub port: u16,
    pub table: TableName,
}

impl DatabaseConfig {
    pub fn resolve(args: &DatabaseArgs, file: &DatabaseSection) -> Result<DatabaseConfig> {
        let pick = |cli: &Option<String>, from_file: &Option<String>, default: &str| {
            cli.clone()
                .or_else(|| from_file.clone())
                .unwrap_or_else(|| default.to_string())
        };
        let table = pick(&args.table, &file.table, DEFAULT_TABLE);
        Ok(DatabaseConfig {
            name: pick(&args.db_name, &file.name, DEFAULT_DB_NAME),
            user: pick(&args.db_user, &file.user, DEFAULT_DB_USER),
            password_env: pick(&args.db_password_env, &file.password_env, DEFAULT_DB_PASSWORD_ENV),
            host: pick(&args.db_host, &file.host, DEFAULT_DB_HOST),
            port: args.db_port.or(file.port).unwrap_or(DEFAULT_DB_PORT),
            table: TableName::parse(&table)?,
        })
    }

    /// Read the password from the configured environment variable.
    pub fn password(&self) -> Result<String> {
        self.password_with(|key| std::env::var(key).ok())
    }

    pub fn password_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Result<String> {
        lookup(&self.password_env).ok_or_else(|| {
            NmdbError::config(format!(
                "Environment variable for db password {} doesn't exist",
                self.password_env
            ))
        })
    }

    /// Human readable description used in diagnostics.
    pub fn describe(&self) -> String {
        format!("database {} at {}:{}", self.name, self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub url: String,
    pub timeout: Duration,
    pub user_agent: String,
}

impl FetchConfig {
    pub fn resolve(args: &FetchArgs, file: &FetchSection) -> FetchConfig {
        let secs = args
            .timeout_secs
            .or(file.timeout_secs)
            .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS);
        FetchConfig {
            url: args
                .url
                .clone()
                .or_else(|| file.url.clone())
                .unwrap_or_else(|| DEFAULT_FEED_URL.to_string()),
            timeout: Duration::from_secs(secs),
            user_agent: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlotConfig {
    pub title: String,
    pub time_format: String,
    pub path: PathBuf,
    pub font: Option<PathBuf>,
    pub width: u32,
    pub height: u32,
}

impl PlotConfig {
    pub fn resolve(args: &PlotArgs, file: &PlotSection) -> Result<PlotConfig> {
        let width = args.width.or(file.width).unwrap_or(DEFAULT_PLOT_WIDTH);
        let height = args.height.or(file.height).unwrap_or(DEFAULT_PLOT_HEIGHT);
        if width < 100 || height < 100 {
            return Err(NmdbError::config(format!(
                "Plot size {}x{} too small, need at least 100x100",
                width, height
            )));
        }
        let time_format = args
            .format
            .clone()
            .or_else(|| file.format.clone())
            .unwrap_or_else(|| DEFAULT_TIME_FORMAT.to_string());
        validate_time_format(&time_format)?;
        Ok(PlotConfig {
            title: args
                .title
                .clone()
                .or_else(|| file.title.clone())
                .unwrap_or_else(|| DEFAULT_PLOT_TITLE.to_string()),
            time_format,
            path: args
                .path
                .clone()
                .or_else(|| file.path.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PLOT_PATH)),
            font: args.font.clone().or_else(|| file.font.clone()),
            width,
            height,
        })
    }
}

/// Reject strftime strings chrono can't render.
pub fn validate_time_format(format: &str) -> Result<()> {
    let invalid = StrftimeItems::new(format).any(|item| matches!(item, Item::Error));
    if invalid || format.is_empty() {
        return Err(NmdbError::config(format!("Invalid time axis format {:?}", format)));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: LevelFilter,
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    pub fn resolve(args: &CommonArgs, file: &LoggingSection) -> Result<LoggingConfig> {
        let level = if args.verbose {
            LevelFilter::Debug
        } else {
            match &file.level {
                Some(level) => level
                    .parse()
                    .map_err(|_| NmdbError::config(format!("Invalid log level {:?}", level)))?,
                None => LevelFilter::Info,
            }
        };
        Ok(LoggingConfig {
            level,
            file: args.log_file.clone().or_else(|| file.file.clone()),
        })
    }
}

// ---------------------------------------------------------------------------
// Time range
// ---------------------------------------------------------------------------

/// Inclusive UTC range for the read-side queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeRange {
    /// Resolve `--start`/`--end`, defaulting to the day before `now`.
    pub fn resolve(args: &TimeRangeArgs, now: DateTime<Utc>) -> Result<TimeRange> {
        let start = match &args.start {
            Some(text) => parse_instant(text).map_err(|e| {
                NmdbError::config(format!("Invalid start time {:?}: {}", text, e))
            })?,
            None => (now - chrono::Duration::days(1)).naive_utc(),
        };
        let end = match &args.end {
            Some(text) => parse_instant(text)
                .map_err(|e| NmdbError::config(format!("Invalid end time {:?}: {}", text, e)))?,
            None => now.naive_utc(),
        };
        if start > end {
            return Err(NmdbError::config(format!(
                "Start time {} is after end time {}",
                start, end
            )));
        }
        Ok(TimeRange {
            start: start.with_nanosecond(0).unwrap_or(start),
            end: end.with_nanosecond(0).unwrap_or(end),
        })
    }
}

/// Parse a timestamp carrying an offset and convert it to naive UTC.
///
/// Accepts RFC 3339 ("Z" or "+02:00") and the "+0200" form.
pub fn parse_instant(text: &str) -> std::result::Result<NaiveDateTime, chrono::ParseError> {
    let text = text.trim();
    DateTime::parse_from_rfc3339(text)
        .or_else(|_| DateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%z"))
        .map(|dt| dt.naive_utc())
}
