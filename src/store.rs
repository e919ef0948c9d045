//! Storage seam for the ingest pipeline.
//!
//! `Store` covers the reads the pipeline does before it holds the lock;
//! `StoreWriter` is the exclusive write window. The PostgreSQL
//! implementation lives in `db`.

use chrono::NaiveDateTime;

use crate::error::Result;
use crate::model::Measurement;

pub trait Store {
    type Writer<'a>: StoreWriter
    where
        Self: 'a;

    /// Create the measurement table if it does not exist yet.
    fn ensure_table(&mut self) -> Result<()>;

    /// Newest persisted timestamp for `station`, `None` when it has no rows.
    fn latest_timestamp(&mut self, station: &str) -> Result<Option<NaiveDateTime>>;

    /// Begin a transaction holding the table's exclusive lock.
    ///
    /// Must not wait: when another writer holds the lock this returns
    /// `NmdbError::Contention` immediately.
    fn begin_exclusive(&mut self) -> Result<Self::Writer<'_>>;
}

/// Writes inside the exclusive transaction. Dropping without `commit`
/// discards everything written.
pub trait StoreWriter {
    fn contains(&mut self, station: &str, timestamp: &NaiveDateTime) -> Result<bool>;

    fn insert(&mut self, measurement: &Measurement) -> Result<()>;

    fn commit(self) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod memory {
    //! In-process store for exercising the pipeline without a database.

    use std::collections::BTreeMap;

    use super::*;
    use crate::error::NmdbError;

    #[derive(Debug, Default)]
    pub struct MemoryStore {
        pub rows: BTreeMap<(String, NaiveDateTime), f64>,
        pub table_created: bool,
        /// Simulates another process holding the table lock.
        pub locked_elsewhere: bool,
        /// Fail the n-th insert (0-based) inside a write window.
        pub fail_insert_at: Option<usize>,
        pub watermark_queries: usize,
    }

    impl MemoryStore {
        pub fn with_rows(rows: &[Measurement]) -> Self {
            let mut store = MemoryStore::default();
            for m in rows {
                store.put(m);
            }
            store
        }

        /// Write a row directly, as another process would.
        pub fn put(&mut self, m: &Measurement) {
            self.rows.insert((m.station.clone(), m.timestamp), m.value);
        }
    }

    pub struct MemoryWriter<'a> {
        store: &'a mut MemoryStore,
        pending: Vec<Measurement>,
    }

    impl Store for MemoryStore {
        type Writer<'a> = MemoryWriter<'a>;

        fn ensure_table(&mut self) -> Result<()> {
            self.table_created = true;
            Ok(())
        }

        fn latest_timestamp(&mut self, station: &str) -> Result<Option<NaiveDateTime>> {
            self.watermark_queries += 1;
            Ok(self
                .rows
                .keys()
                .filter(|(s, _)| s == station)
                .map(|(_, t)| *t)
                .max())
        }

        fn begin_exclusive(&mut self) -> Result<Self::Writer<'_>> {
            if self.locked_elsewhere {
                return Err(NmdbError::Contention { table: "memory".to_string() });
            }
            Ok(MemoryWriter { store: self, pending: Vec::new() })
        }
    }

    impl StoreWriter for MemoryWriter<'_> {
        fn contains(&mut self, station: &str, timestamp: &NaiveDateTime) -> Result<bool> {
            let key = (station.to_string(), *timestamp);
            Ok(self.store.rows.contains_key(&key)
                || self
                    .pending
                    .iter()
                    .any(|m| m.station == station && m.timestamp == *timestamp))
        }

        fn insert(&mut self, measurement: &Measurement) -> Result<()> {
            if self.store.fail_insert_at == Some(self.pending.len()) {
                return Err(NmdbError::parse("simulated insert failure"));
            }
            self.pending.push(measurement.clone());
            Ok(())
        }

        fn commit(self) -> Result<()> {
            for m in &self.pending {
                self.store.put(m);
            }
            Ok(())
        }
    }
}
