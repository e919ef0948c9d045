//! Grouping of range query results by station and time.
//!
//! Both read-side utilities need the same shape: every timestamp seen in
//! the range, and for each station either its value or a gap.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

use chrono::NaiveDateTime;

use crate::model::{Measurement, format_stored, format_value};

/// Station × time grid over the union of observed timestamps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StationGrid {
    pub stations: Vec<String>,
    pub timestamps: Vec<NaiveDateTime>,
    series: BTreeMap<String, BTreeMap<NaiveDateTime, f64>>,
}

impl StationGrid {
    pub fn from_measurements(measurements: impl IntoIterator<Item = Measurement>) -> Self {
        let mut series: BTreeMap<String, BTreeMap<NaiveDateTime, f64>> = BTreeMap::new();
        let mut timestamps = BTreeSet::new();
        for m in measurements {
            timestamps.insert(m.timestamp);
            series.entry(m.station).or_default().insert(m.timestamp, m.value);
        }
        StationGrid {
            stations: series.keys().cloned().collect(),
            timestamps: timestamps.into_iter().collect(),
            series,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn value(&self, station: &str, timestamp: &NaiveDateTime) -> Option<f64> {
        self.series.get(station)?.get(timestamp).copied()
    }

    /// Observations of one station, oldest first.
    pub fn series(&self, station: &str) -> impl Iterator<Item = (NaiveDateTime, f64)> + '_ {
        self.series
            .get(station)
            .into_iter()
            .flat_map(|points| points.iter().map(|(t, v)| (*t, *v)))
    }

    /// One row per timestamp, one cell per station in `stations` order.
    pub fn rows(&self) -> impl Iterator<Item = (NaiveDateTime, Vec<Option<f64>>)> + '_ {
        self.timestamps.iter().map(move |t| {
            let cells = self.stations.iter().map(|s| self.value(s, t)).collect();
            (*t, cells)
        })
    }

    /// Smallest and largest finite value, if any.
    pub fn value_bounds(&self) -> Option<(f64, f64)> {
        self.series
            .values()
            .flat_map(|points| points.values().copied())
            .filter(|v| v.is_finite())
            .fold(None, |bounds, v| match bounds {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}

/// Text listing with `nan` for missing observations.
///
/// Every station column is right-aligned to its widest value.
pub fn render_listing(grid: &StationGrid) -> String {
    let mut out = String::new();

    out.push_str("# time (UTC), value at station ");
    for station in &grid.stations {
        let _ = write!(out, "{}, ", station);
    }
    out.push('\n');
    out.push_str("# missing observation(s) given as nan\n");

    let rows: Vec<(String, Vec<String>)> = grid
        .rows()
        .map(|(t, cells)| {
            let cells = cells
                .into_iter()
                .map(|cell| format_value(cell.unwrap_or(f64::NAN)))
                .collect();
            (format_stored(&t), cells)
        })
        .collect();

    let mut widths = vec![0usize; grid.stations.len()];
    for (_, cells) in &rows {
        for (width, cell) in widths.iter_mut().zip(cells) {
            *width = (*width).max(cell.len());
        }
    }

    for (time, cells) in &rows {
        out.push_str(time);
        for (cell, width) in cells.iter().zip(&widths) {
            let _ = write!(out, " {:>width$}", cell, width = width);
        }
        out.push('\n');
    }
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(text: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S").unwrap()
    }

    fn overlapping() -> StationGrid {
        StationGrid::from_measurements(vec![
            Measurement::new(ts("2024-01-01T00:00:00"), "OULU", 112.5),
            Measurement::new(ts("2024-01-01T00:01:00"), "OULU", 113.25),
            Measurement::new(ts("2024-01-01T00:01:00"), "APTY", 98.0),
            Measurement::new(ts("2024-01-01T00:02:00"), "APTY", 97.5),
        ])
    }

    #[test]
    fn test_grid_fills_union_of_timestamps() {
        let grid = overlapping();
        assert_eq!(grid.stations, vec!["APTY", "OULU"]);
        assert_eq!(grid.timestamps.len(), 3);

        let rows: Vec<_> = grid.rows().collect();
        assert_eq!(rows[0].1, vec![None, Some(112.5)]);
        assert_eq!(rows[1].1, vec![Some(98.0), Some(113.25)]);
        assert_eq!(rows[2].1, vec![Some(97.5), None]);
    }

    #[test]
    fn test_listing_marks_gaps_with_nan() {
        let listing = render_listing(&overlapping());
        let expected = "\
# time (UTC), value at station APTY, OULU, \n\
# missing observation(s) given as nan\n\
2024-01-01T00:00:00  nan  112.5\n\
2024-01-01T00:01:00 98.0 113.25\n\
2024-01-01T00:02:00 97.5    nan\n\
\n";
        assert_eq!(listing, expected);
    }

    #[test]
    fn test_empty_listing_has_headers_only() {
        let listing = render_listing(&StationGrid::default());
        assert_eq!(
            listing,
            "# time (UTC), value at station \n# missing observation(s) given as nan\n\n"
        );
    }

    #[test]
    fn test_series_and_bounds() {
        let grid = overlapping();
        let oulu: Vec<_> = grid.series("OULU").collect();
        assert_eq!(oulu.len(), 2);
        assert!(oulu[0].0 < oulu[1].0);
        assert_eq!(grid.series("NONE").count(), 0);
        assert_eq!(grid.value_bounds(), Some((97.5, 113.25)));
        assert_eq!(StationGrid::default().value_bounds(), None);
    }
}
