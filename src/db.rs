/// PostgreSQL access for the measurement table.
///
/// Table layout, created on first fetch:
///   datetime varchar  -- "YYYY-MM-DDTHH:MM:SS", UTC
///   station  varchar
///   value    real
///
/// The table name comes from configuration and is spliced into statements,
/// which is why it is a validated `TableName` rather than a `&str`.

use chrono::NaiveDateTime;
use postgres::error::SqlState;
use postgres::{Client, NoTls, Transaction};

use crate::config::{DatabaseConfig, TableName, TimeRange};
use crate::error::{NmdbError, Result};
use crate::logging::{self, DataSource};
use crate::model::{Measurement, format_stored, parse_stored};
use crate::store::{Store, StoreWriter};

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// Open a connection using the configured credentials.
pub fn connect(config: &DatabaseConfig, password: &str) -> Result<Client> {
    postgres::Config::new()
        .dbname(&config.name)
        .user(&config.user)
        .password(password)
        .host(&config.host)
        .port(config.port)
        .application_name(env!("CARGO_PKG_NAME"))
        .connect(NoTls)
        .map_err(|e| NmdbError::connectivity(config.describe(), e))
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

fn create_table_sql(table: &TableName) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (datetime varchar, station varchar, value real)",
        table
    )
}

fn lock_table_sql(table: &TableName) -> String {
    format!("LOCK TABLE {} IN EXCLUSIVE MODE NOWAIT", table)
}

fn latest_sql(table: &TableName) -> String {
    format!("SELECT max(datetime) FROM {} WHERE station = $1", table)
}

fn exists_sql(table: &TableName) -> String {
    format!(
        "SELECT EXISTS (SELECT FROM {} WHERE datetime = $1 AND station = $2)",
        table
    )
}

fn insert_sql(table: &TableName) -> String {
    format!(
        "INSERT INTO {} (datetime, station, value) VALUES ($1, $2, $3)",
        table
    )
}

fn range_sql(table: &TableName) -> String {
    format!(
        "SELECT datetime, station, value FROM {} \
         WHERE datetime >= $1 AND datetime <= $2 \
         ORDER BY datetime, station",
        table
    )
}

// ---------------------------------------------------------------------------
// Store implementation
// ---------------------------------------------------------------------------

pub struct PgStore<'c> {
    client: &'c mut Client,
    table: TableName,
}

impl<'c> PgStore<'c> {
    pub fn new(client: &'c mut Client, table: TableName) -> Self {
        Self { client, table }
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }
}

pub struct PgWriter<'a> {
    tx: Transaction<'a>,
    table: &'a TableName,
}

impl Store for PgStore<'_> {
    type Writer<'a>
        = PgWriter<'a>
    where
        Self: 'a;

    fn ensure_table(&mut self) -> Result<()> {
        self.client.batch_execute(&create_table_sql(&self.table))?;
        Ok(())
    }

    fn latest_timestamp(&mut self, station: &str) -> Result<Option<NaiveDateTime>> {
        let row = self.client.query_one(&latest_sql(&self.table), &[&station])?;
        let latest: Option<String> = row.get(0);
        latest.as_deref().map(parse_stored).transpose()
    }

    fn begin_exclusive(&mut self) -> Result<Self::Writer<'_>> {
        let table = &self.table;
        let mut tx = self.client.transaction()?;

        if let Err(e) = tx.batch_execute(&lock_table_sql(table)) {
            if e.code() == Some(&SqlState::LOCK_NOT_AVAILABLE) {
                return Err(NmdbError::Contention { table: table.to_string() });
            }
            return Err(e.into());
        }

        logging::debug(DataSource::Database, None, &format!("locked table {}", table));
        Ok(PgWriter { tx, table })
    }
}

impl StoreWriter for PgWriter<'_> {
    fn contains(&mut self, station: &str, timestamp: &NaiveDateTime) -> Result<bool> {
        let row = self
            .tx
            .query_one(&exists_sql(self.table), &[&format_stored(timestamp), &station])?;
        Ok(row.get(0))
    }

    fn insert(&mut self, measurement: &Measurement) -> Result<()> {
        // column is real
        let value = measurement.value as f32;
        self.tx.execute(
            &insert_sql(self.table),
            &[&measurement.stored_datetime(), &measurement.station, &value],
        )?;
        Ok(())
    }

    fn commit(self) -> Result<()> {
        self.tx.commit()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Read side
// ---------------------------------------------------------------------------

/// All measurements with `range.start <= datetime <= range.end`.
pub fn select_range(
    client: &mut Client,
    table: &TableName,
    range: &TimeRange,
) -> Result<Vec<Measurement>> {
    let rows = client.query(
        &range_sql(table),
        &[&format_stored(&range.start), &format_stored(&range.end)],
    )?;

    let mut measurements = Vec::with_capacity(rows.len());
    for row in rows {
        let datetime: String = row.get(0);
        let station: String = row.get(1);
        let value: Option<f32> = row.get(2);
        measurements.push(Measurement {
            timestamp: parse_stored(&datetime)?,
            station,
            value: value.map(f64::from).unwrap_or(f64::NAN),
        });
    }

    logging::debug(
        DataSource::Database,
        None,
        &format!(
            "{} rows from {} between {} and {}",
            measurements.len(),
            table,
            range.start,
            range.end
        ),
    );
    Ok(measurements)
}
