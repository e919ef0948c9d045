//! Lists neutron monitor data from PostgreSQL as an aligned text table.

use std::process::ExitCode;

use chrono::Utc;
use clap::Parser;
use nmdb_service::config::{
    CommonArgs, DatabaseConfig, FileConfig, LoggingConfig, TimeRange, TimeRangeArgs,
};
use nmdb_service::db;
use nmdb_service::error::Result;
use nmdb_service::report::{StationGrid, render_listing};

/// Lists neutron monitor data from postgresql.
#[derive(Parser, Debug)]
#[command(name = "nmdb_list", version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(flatten)]
    range: TimeRangeArgs,
}

fn run(cli: &Cli) -> Result<()> {
    let file = FileConfig::load(cli.common.config.as_deref())?;
    nmdb_service::logging::init_logger(&LoggingConfig::resolve(&cli.common, &file.logging)?)?;

    let range = TimeRange::resolve(&cli.range, Utc::now())?;
    let database = DatabaseConfig::resolve(&cli.common.database, &file.database)?;
    let password = database.password()?;

    let mut client = db::connect(&database, &password)?;
    let measurements = db::select_range(&mut client, &database.table, &range)?;

    print!("{}", render_listing(&StationGrid::from_measurements(measurements)));
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
