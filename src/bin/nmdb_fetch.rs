//! Fetches realtime neutron monitor data into PostgreSQL.
//!
//! Meant to run from a scheduler. When another fetch holds the table lock
//! this run writes nothing and still exits successfully.

use std::process::ExitCode;

use clap::Parser;
use nmdb_service::config::{
    CommonArgs, DatabaseConfig, FetchArgs, FetchConfig, FileConfig, LoggingConfig,
};
use nmdb_service::db::{self, PgStore};
use nmdb_service::error::Result;
use nmdb_service::ingest::nmdb;
use nmdb_service::ingest::pipeline::{self, IngestOutcome};
use nmdb_service::logging::{self, DataSource};
use nmdb_service::store::Store;

/// Fetches neutron monitor data into postgresql.
#[derive(Parser, Debug)]
#[command(name = "nmdb_fetch", version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(flatten)]
    fetch: FetchArgs,
}

fn run(cli: &Cli) -> Result<()> {
    let file = FileConfig::load(cli.common.config.as_deref())?;
    logging::init_logger(&LoggingConfig::resolve(&cli.common, &file.logging)?)?;

    logging::debug(
        DataSource::System,
        None,
        &format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
    );

    let database = DatabaseConfig::resolve(&cli.common.database, &file.database)?;
    let fetch = FetchConfig::resolve(&cli.fetch, &file.fetch);
    let password = database.password()?;

    let mut client = db::connect(&database, &password)?;
    let mut store = PgStore::new(&mut client, database.table.clone());
    store.ensure_table()?;

    logging::info(DataSource::Feed, None, &format!("Downloading {}", fetch.url));
    let http = nmdb::build_client(&fetch)?;
    let text = nmdb::fetch_realtime(&http, &fetch.url)?;
    let report = nmdb::parse_feed(&text);
    logging::log_feed_report(&report);

    let outcome = pipeline::ingest(&mut store, &report.candidates)?;
    logging::log_ingest_outcome(&outcome);

    match outcome {
        IngestOutcome::Committed(summary) => {
            println!("{} new values added to database", summary.inserted);
        }
        IngestOutcome::Contended { table, .. } => {
            println!(
                "Someone already writing to table {} of database {}",
                table, database.name
            );
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::from(&e)
        }
    }
}
