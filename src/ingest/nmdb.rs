/// NMDB (Neutron Monitor Database) realtime feed client
///
/// Downloads the realtime text file published by nmdb.eu and turns it into
/// a candidate set of measurements.
///
/// Feed format, one observation per line:
///   2024-01-01 00:01:00;OULU;112.345
/// Lines starting with '#' are comments.

use std::fmt;

use chrono::NaiveDateTime;

use crate::config::FetchConfig;
use crate::error::{NmdbError, Result};
use crate::model::{CandidateSet, FEED_DATETIME_FORMAT};

const COMMENT_MARKER: char = '#';
const FIELD_DELIMITER: char = ';';

// ============================================================================
// Parse results
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Fewer than three delimited fields.
    MissingFields(usize),
    BadTimestamp,
    EmptyStation,
    BadValue,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingFields(n) => write!(f, "expected 3 fields, found {}", n),
            SkipReason::BadTimestamp => write!(f, "unparseable timestamp"),
            SkipReason::EmptyStation => write!(f, "empty station code"),
            SkipReason::BadValue => write!(f, "non-numeric value"),
        }
    }
}

/// A feed line that was excluded from the candidate set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLine {
    /// 1-based line number in the downloaded text.
    pub line_number: usize,
    pub content: String,
    pub reason: SkipReason,
}

/// Everything learned from one download.
#[derive(Debug, Clone, Default)]
pub struct FeedReport {
    pub candidates: CandidateSet,
    pub skipped: Vec<SkippedLine>,
    pub comments: usize,
    /// Lines that repeated an earlier `(station, timestamp)` and replaced it.
    pub overwritten: usize,
}

// ============================================================================
// API Client Functions
// ============================================================================

/// Build the blocking HTTP client used for the feed download.
pub fn build_client(config: &FetchConfig) -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(config.timeout)
        .build()
        .map_err(|e| NmdbError::connectivity(config.url.clone(), e))
}

/// Download the realtime feed as text.
pub fn fetch_realtime(client: &reqwest::blocking::Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .header("Accept", "text/plain")
        .send()
        .map_err(|e| NmdbError::connectivity(url, e))?;

    if !response.status().is_success() {
        return Err(NmdbError::connectivity(
            url,
            format!("HTTP error: {}", response.status()),
        ));
    }

    response.text().map_err(|e| NmdbError::connectivity(url, e))
}

// ============================================================================
// Feed parsing
// ============================================================================

/// Parse the whole feed. Malformed lines are recorded, never fatal.
///
/// When the same `(station, timestamp)` appears twice the later line wins.
pub fn parse_feed(text: &str) -> FeedReport {
    let mut report = FeedReport::default();

    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with(COMMENT_MARKER) {
            report.comments += 1;
            continue;
        }

        match parse_line(line) {
            Ok((timestamp, station, value)) => {
                if report.candidates.insert(station, timestamp, value).is_some() {
                    report.overwritten += 1;
                }
            }
            Err(reason) => report.skipped.push(SkippedLine {
                line_number: index + 1,
                content: line.to_string(),
                reason,
            }),
        }
    }

    report
}

/// Split one non-comment line into `(timestamp, station, value)`.
///
/// Fields past the third are ignored.
pub fn parse_line(line: &str) -> std::result::Result<(NaiveDateTime, &str, f64), SkipReason> {
    let fields: Vec<&str> = line.split(FIELD_DELIMITER).collect();
    if fields.len() < 3 {
        return Err(SkipReason::MissingFields(fields.len()));
    }

    let timestamp = NaiveDateTime::parse_from_str(fields[0].trim(), FEED_DATETIME_FORMAT)
        .map_err(|_| SkipReason::BadTimestamp)?;

    let station = fields[1].trim();
    if station.is_empty() {
        return Err(SkipReason::EmptyStation);
    }

    let value: f64 = fields[2].trim().parse().map_err(|_| SkipReason::BadValue)?;

    Ok((timestamp, station, value))
}

// ============================================================================
// Tests
// ============================================================================
