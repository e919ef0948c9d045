/// Measurement, CandidateSet, Watermark
/// core data structures shared by the fetch, list and draw utilities.
///
/// This module contains no I/O. Timestamps are naive civil times that are
/// implicitly UTC, at second precision.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use crate::error::{NmdbError, Result};

// ---------------------------------------------------------------------------
// Timestamp formats
// ---------------------------------------------------------------------------

/// Date-time format of the realtime feed, e.g. "2024-01-01 00:01:00".
pub const FEED_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Date-time format of the `datetime` column, e.g. "2024-01-01T00:01:00".
///
/// Fixed width, so lexical order in the database equals time order.
pub const STORED_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub fn format_stored(timestamp: &NaiveDateTime) -> String {
    timestamp.format(STORED_DATETIME_FORMAT).to_string()
}

pub fn parse_stored(text: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text.trim(), STORED_DATETIME_FORMAT)
        .map_err(|e| NmdbError::parse(format!("stored datetime {:?}: {}", text, e)))
}

/// Render a value the way it reads back from a `real` column.
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    let text = (value as f32).to_string();
    if value.is_finite() && !text.contains('.') {
        format!("{}.0", text)
    } else {
        text
    }
}

// ---------------------------------------------------------------------------
// Measurement
// ---------------------------------------------------------------------------

/// One neutron monitor observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub timestamp: NaiveDateTime,
    pub station: String,
    pub value: f64,
}

impl Measurement {
    pub fn new(timestamp: NaiveDateTime, station: impl Into<String>, value: f64) -> Self {
        Self {
            timestamp,
            station: station.into(),
            value,
        }
    }

    pub fn stored_datetime(&self) -> String {
        format_stored(&self.timestamp)
    }
}

// ---------------------------------------------------------------------------
// Watermark
// ---------------------------------------------------------------------------

/// Latest timestamp already persisted for one station.
///
/// `Watermark::NONE` stands for "no rows yet" and sorts below every real
/// timestamp, so a new station admits all of its candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Watermark(Option<NaiveDateTime>);

impl Watermark {
    pub const NONE: Watermark = Watermark(None);

    pub fn at(timestamp: NaiveDateTime) -> Self {
        Watermark(Some(timestamp))
    }

    pub fn from_latest(latest: Option<NaiveDateTime>) -> Self {
        Watermark(latest)
    }

    pub fn latest(&self) -> Option<NaiveDateTime> {
        self.0
    }

    /// True when `timestamp` is strictly newer than the watermark.
    pub fn admits(&self, timestamp: &NaiveDateTime) -> bool {
        match self.0 {
            None => true,
            Some(latest) => *timestamp > latest,
        }
    }
}

// ---------------------------------------------------------------------------
// Candidate set
// ---------------------------------------------------------------------------

/// Measurements keyed by `(station, timestamp)`.
///
/// Ordered by station first, so all rows of one station are contiguous and
/// iteration within a station runs oldest to newest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateSet {
    entries: BTreeMap<(String, NaiveDateTime), f64>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any earlier value for the same key.
    ///
    /// Returns the replaced value.
    pub fn insert(&mut self, station: &str, timestamp: NaiveDateTime, value: f64) -> Option<f64> {
        self.entries.insert((station.to_string(), timestamp), value)
    }

    pub fn get(&self, station: &str, timestamp: &NaiveDateTime) -> Option<f64> {
        self.entries.get(&(station.to_string(), *timestamp)).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct stations in sorted order.
    pub fn stations(&self) -> Vec<&str> {
        let mut stations: Vec<&str> = Vec::new();
        for (station, _) in self.entries.keys() {
            if stations.last() != Some(&station.as_str()) {
                stations.push(station.as_str());
            }
        }
        stations
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &NaiveDateTime, f64)> + '_ {
        self.entries
            .iter()
            .map(|((station, timestamp), value)| (station.as_str(), timestamp, *value))
    }

    /// Keep only entries newer than their station's watermark.
    ///
    /// Stations missing from `watermarks` are treated as having no prior
    /// data.
    pub fn newer_than(&self, watermarks: &BTreeMap<String, Watermark>) -> CandidateSet {
        let entries = self
            .entries
            .iter()
            .filter(|((station, timestamp), _)| {
                watermarks
                    .get(station)
                    .copied()
                    .unwrap_or(Watermark::NONE)
                    .admits(timestamp)
            })
            .map(|(key, value)| (key.clone(), *value))
            .collect();
        CandidateSet { entries }
    }

    pub fn into_measurements(self) -> Vec<Measurement> {
        self.entries
            .into_iter()
            .map(|((station, timestamp), value)| Measurement {
                timestamp,
                station,
                value,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(text: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(text, FEED_DATETIME_FORMAT).unwrap()
    }

    #[test]
    fn test_stored_format_round_trips_to_second_precision() {
        let t = ts("2024-01-01 00:01:00");
        assert_eq!(format_stored(&t), "2024-01-01T00:01:00");
        assert_eq!(parse_stored("2024-01-01T00:01:00").unwrap(), t);
        assert!(parse_stored("2024-01-01 00:01:00").is_err());
    }

    #[test]
    fn test_watermark_none_admits_everything() {
        assert!(Watermark::NONE.admits(&ts("1900-01-01 00:00:00")));
        assert!(Watermark::NONE < Watermark::at(ts("1900-01-01 00:00:00")));
    }

    #[test]
    fn test_watermark_is_strict() {
        let mark = Watermark::at(ts("2024-01-01 00:01:00"));
        assert!(!mark.admits(&ts("2024-01-01 00:00:00")));
        assert!(!mark.admits(&ts("2024-01-01 00:01:00")));
        assert!(mark.admits(&ts("2024-01-01 00:01:01")));
    }

    #[test]
    fn test_candidate_insert_last_wins() {
        let mut set = CandidateSet::new();
        assert_eq!(set.insert("STA1", ts("2024-01-01 00:00:00"), 1.0), None);
        assert_eq!(set.insert("STA1", ts("2024-01-01 00:00:00"), 2.0), Some(1.0));
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("STA1", &ts("2024-01-01 00:00:00")), Some(2.0));
    }

    #[test]
    fn test_stations_are_distinct_and_sorted() {
        let mut set = CandidateSet::new();
        set.insert("OULU", ts("2024-01-01 00:00:00"), 1.0);
        set.insert("APTY", ts("2024-01-01 00:01:00"), 1.0);
        set.insert("OULU", ts("2024-01-01 00:01:00"), 1.0);
        assert_eq!(set.stations(), vec!["APTY", "OULU"]);
    }

    #[test]
    fn test_newer_than_filters_per_station() {
        let mut set = CandidateSet::new();
        set.insert("STA1", ts("2024-01-01 00:00:00"), 1.0);
        set.insert("STA1", ts("2024-01-01 00:02:00"), 2.0);
        set.insert("STA2", ts("2024-01-01 00:00:00"), 3.0);

        let mut marks = BTreeMap::new();
        marks.insert("STA1".to_string(), Watermark::at(ts("2024-01-01 00:01:00")));

        let fresh = set.newer_than(&marks);
        assert_eq!(fresh.len(), 2);
        assert_eq!(fresh.get("STA1", &ts("2024-01-01 00:02:00")), Some(2.0));
        assert_eq!(fresh.get("STA2", &ts("2024-01-01 00:00:00")), Some(3.0));
    }

    #[test]
    fn test_format_value_matches_real_column() {
        assert_eq!(format_value(12.7), "12.7");
        assert_eq!(format_value(99.0), "99.0");
        assert_eq!(format_value(-3.25), "-3.25");
        assert_eq!(format_value(f64::NAN), "nan");
    }
}
