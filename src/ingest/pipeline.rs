//! Watermark filtering and the exclusive, existence-checked insert.
//!
//! One ingest run:
//!   candidates -> watermark per station -> new set
//!   -> exclusive NOWAIT lock -> insert rows that are still absent -> commit
//!
//! The table must already exist (`Store::ensure_table`) before a run starts.

use std::collections::BTreeMap;

use crate::error::{NmdbError, Result};
use crate::logging::{self, DataSource};
use crate::model::{CandidateSet, Measurement, Watermark};
use crate::store::{Store, StoreWriter};

/// Counts from a committed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    /// Valid measurements parsed from the feed.
    pub candidates: usize,
    /// Candidates strictly newer than their station's watermark.
    pub new_after_watermark: usize,
    /// Rows actually written.
    pub inserted: usize,
    /// New candidates found already present under the lock.
    pub already_present: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Committed(IngestSummary),
    /// Another writer held the lock; nothing was written.
    Contended { table: String, candidates: usize },
}

impl IngestOutcome {
    pub fn inserted(&self) -> usize {
        match self {
            IngestOutcome::Committed(summary) => summary.inserted,
            IngestOutcome::Contended { .. } => 0,
        }
    }
}

/// Look up each station's watermark once.
pub fn resolve_watermarks<S: Store>(
    store: &mut S,
    candidates: &CandidateSet,
) -> Result<BTreeMap<String, Watermark>> {
    let mut watermarks = BTreeMap::new();
    for station in candidates.stations() {
        let watermark = Watermark::from_latest(store.latest_timestamp(station)?);
        if let Some(latest) = watermark.latest() {
            logging::debug(
                DataSource::Database,
                Some(station),
                &format!("watermark {}", latest),
            );
        }
        watermarks.insert(station.to_string(), watermark);
    }
    Ok(watermarks)
}

/// Candidates strictly newer than the persisted data of their station.
pub fn select_new<S: Store>(store: &mut S, candidates: &CandidateSet) -> Result<CandidateSet> {
    let watermarks = resolve_watermarks(store, candidates)?;
    Ok(candidates.newer_than(&watermarks))
}

/// Insert every measurement that is not already stored.
///
/// Returns `(inserted, already_present)`.
pub fn insert_absent<W: StoreWriter>(writer: &mut W, new_data: &CandidateSet) -> Result<(usize, usize)> {
    let mut inserted = 0;
    let mut present = 0;
    for (station, timestamp, value) in new_data.iter() {
        if writer.contains(station, timestamp)? {
            present += 1;
            continue;
        }
        writer.insert(&Measurement::new(*timestamp, station, value))?;
        inserted += 1;
    }
    Ok((inserted, present))
}

/// Run the dedup and insert steps for one parsed feed.
///
/// Lock contention is an outcome, not an error. Any other failure while the
/// lock is held drops the transaction uncommitted.
pub fn ingest<S: Store>(store: &mut S, candidates: &CandidateSet) -> Result<IngestOutcome> {
    let new_data = select_new(store, candidates)?;

    let mut writer = match store.begin_exclusive() {
        Ok(writer) => writer,
        Err(NmdbError::Contention { table }) => {
            return Ok(IngestOutcome::Contended {
                table,
                candidates: candidates.len(),
            });
        }
        Err(e) => return Err(e),
    };

    let (inserted, already_present) = insert_absent(&mut writer, &new_data)?;
    writer.commit()?;

    Ok(IngestOutcome::Committed(IngestSummary {
        candidates: candidates.len(),
        new_after_watermark: new_data.len(),
        inserted,
        already_present,
    }))
}
