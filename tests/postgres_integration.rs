/// Integration tests for the fetch pipeline against a real PostgreSQL
///
/// These tests verify:
/// 1. The measurement table is created on demand
/// 2. A parsed feed lands in the table exactly once
/// 3. A second fetch holding the lock makes the other one back off
/// 4. Range queries feed the listing with gap filling
///
/// Prerequisites:
/// - PostgreSQL reachable through DATABASE_URL (in .env or the environment)
/// - The user may create and drop tables in its default schema
///
/// Run with: cargo test --test postgres_integration -- --ignored --test-threads=1

use chrono::NaiveDateTime;
use postgres::{Client, NoTls};
use std::env;

use nmdb_service::config::{TableName, TimeRange};
use nmdb_service::db::{self, PgStore};
use nmdb_service::ingest::nmdb::parse_feed;
use nmdb_service::ingest::pipeline::{self, IngestOutcome};
use nmdb_service::report::{StationGrid, render_listing};
use nmdb_service::store::Store;

const SAMPLE_FEED: &str = "2024-01-01 00:00:00;STA1;12.5\n\
                           2024-01-01 00:01:00;STA1;12.7\n\
                           #comment\n\
                           badline\n\
                           2024-01-01 00:00:30;STA2;99.0";

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn connect() -> Client {
    dotenv::dotenv().ok();
    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    Client::connect(&database_url, NoTls).expect("Failed to connect to test database")
}

/// A fresh, empty table name private to one test.
fn fresh_table(client: &mut Client, name: &str) -> TableName {
    let table = TableName::parse(&format!("nmdb_test_{}_{}", std::process::id(), name))
        .expect("valid test table name");
    client
        .batch_execute(&format!("DROP TABLE IF EXISTS {}", table))
        .expect("Failed to drop old test table");
    table
}

fn drop_table(client: &mut Client, table: &TableName) {
    let _ = client.batch_execute(&format!("DROP TABLE IF EXISTS {}", table));
}

fn row_count(client: &mut Client, table: &TableName) -> i64 {
    client
        .query_one(&format!("SELECT COUNT(*) FROM {}", table), &[])
        .map(|row| row.get(0))
        .unwrap_or(0)
}

fn ts(text: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S").unwrap()
}

// ---------------------------------------------------------------------------
// Ingest
// ---------------------------------------------------------------------------

#[test]
#[ignore] // Needs a PostgreSQL instance
fn test_sample_feed_inserts_three_then_nothing() {
    let mut client = connect();
    let table = fresh_table(&mut client, "sample");

    let report = parse_feed(SAMPLE_FEED);
    assert_eq!(report.skipped.len(), 1);

    {
        let mut store = PgStore::new(&mut client, table.clone());
        store.ensure_table().expect("create table");
        store.ensure_table().expect("create table twice");

        let first = pipeline::ingest(&mut store, &report.candidates).expect("first ingest");
        assert_eq!(first.inserted(), 3);

        let second = pipeline::ingest(&mut store, &report.candidates).expect("second ingest");
        assert_eq!(second.inserted(), 0);
    }

    assert_eq!(row_count(&mut client, &table), 3);

    let stored: String = client
        .query_one(
            &format!("SELECT datetime FROM {} WHERE station = 'STA2'", table),
            &[],
        )
        .unwrap()
        .get(0);
    assert_eq!(stored, "2024-01-01T00:00:30");

    drop_table(&mut client, &table);
}

#[test]
#[ignore] // Needs a PostgreSQL instance
fn test_watermark_comes_from_existing_rows() {
    let mut client = connect();
    let table = fresh_table(&mut client, "watermark");

    {
        let mut store = PgStore::new(&mut client, table.clone());
        store.ensure_table().unwrap();
        assert_eq!(store.latest_timestamp("STA1").unwrap(), None);
    }

    client
        .execute(
            &format!(
                "INSERT INTO {} (datetime, station, value) VALUES ('2024-01-01T00:00:30', 'STA1', 1.0)",
                table
            ),
            &[],
        )
        .unwrap();

    let mut store = PgStore::new(&mut client, table.clone());
    assert_eq!(
        store.latest_timestamp("STA1").unwrap(),
        Some(ts("2024-01-01T00:00:30"))
    );

    let report = parse_feed(SAMPLE_FEED);
    let outcome = pipeline::ingest(&mut store, &report.candidates).unwrap();
    match outcome {
        IngestOutcome::Committed(summary) => {
            // STA1 00:00:00 is below the watermark
            assert_eq!(summary.new_after_watermark, 2);
            assert_eq!(summary.inserted, 2);
        }
        other => panic!("expected a committed run, got {:?}", other),
    }

    drop(store);
    drop_table(&mut client, &table);
}

#[test]
#[ignore] // Needs a PostgreSQL instance
fn test_locked_table_makes_second_writer_back_off() {
    let mut holder = connect();
    let table = fresh_table(&mut holder, "contention");
    {
        let mut store = PgStore::new(&mut holder, table.clone());
        store.ensure_table().unwrap();
    }

    let mut tx = holder.transaction().unwrap();
    tx.batch_execute(&format!("LOCK TABLE {} IN EXCLUSIVE MODE", table))
        .unwrap();

    let mut client = connect();
    let report = parse_feed(SAMPLE_FEED);
    let started = std::time::Instant::now();
    let outcome = {
        let mut store = PgStore::new(&mut client, table.clone());
        pipeline::ingest(&mut store, &report.candidates).expect("contention is not an error")
    };
    assert!(started.elapsed() < std::time::Duration::from_secs(5), "must not wait for the lock");

    assert!(matches!(outcome, IngestOutcome::Contended { .. }));
    assert_eq!(outcome.inserted(), 0);

    tx.rollback().unwrap();
    assert_eq!(row_count(&mut client, &table), 0);

    drop_table(&mut client, &table);
}

// ---------------------------------------------------------------------------
// Read side
// ---------------------------------------------------------------------------

#[test]
#[ignore] // Needs a PostgreSQL instance
fn test_range_query_feeds_gap_filled_listing() {
    let mut client = connect();
    let table = fresh_table(&mut client, "listing");

    {
        let mut store = PgStore::new(&mut client, table.clone());
        store.ensure_table().unwrap();
        pipeline::ingest(&mut store, &parse_feed(SAMPLE_FEED).candidates).unwrap();
    }

    let range = TimeRange {
        start: ts("2024-01-01T00:00:00"),
        end: ts("2024-01-01T00:00:59"),
    };
    let measurements = db::select_range(&mut client, &table, &range).unwrap();
    assert_eq!(measurements.len(), 2);

    let listing = render_listing(&StationGrid::from_measurements(measurements));
    let expected = "\
# time (UTC), value at station STA1, STA2, \n\
# missing observation(s) given as nan\n\
2024-01-01T00:00:00 12.5  nan\n\
2024-01-01T00:00:30  nan 99.0\n\
\n";
    assert_eq!(listing, expected);

    drop_table(&mut client, &table);
}
