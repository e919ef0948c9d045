//! Plots neutron monitor data from PostgreSQL into an image file.

use std::process::ExitCode;

use chrono::Utc;
use clap::Parser;
use nmdb_service::config::{
    CommonArgs, DatabaseConfig, FileConfig, LoggingConfig, PlotArgs, PlotConfig, TimeRange,
    TimeRangeArgs,
};
use nmdb_service::db;
use nmdb_service::error::Result;
use nmdb_service::logging::{self, DataSource};
use nmdb_service::plot;
use nmdb_service::report::StationGrid;

/// Plots neutron monitor data from postgresql.
#[derive(Parser, Debug)]
#[command(name = "nmdb_draw", version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(flatten)]
    range: TimeRangeArgs,

    #[command(flatten)]
    plot: PlotArgs,
}

fn run(cli: &Cli) -> Result<()> {
    let file = FileConfig::load(cli.common.config.as_deref())?;
    logging::init_logger(&LoggingConfig::resolve(&cli.common, &file.logging)?)?;

    let range = TimeRange::resolve(&cli.range, Utc::now())?;
    let plot_config = PlotConfig::resolve(&cli.plot, &file.plot)?;
    let font = plot_config.font.as_deref().map(plot::load_font).transpose()?;
    if font.is_none() {
        logging::warn(
            DataSource::Plot,
            None,
            "No font given, title and axis labels are left out",
        );
    }

    let database = DatabaseConfig::resolve(&cli.common.database, &file.database)?;
    let password = database.password()?;

    let mut client = db::connect(&database, &password)?;
    let measurements = db::select_range(&mut client, &database.table, &range)?;
    let grid = StationGrid::from_measurements(measurements);

    let img = plot::render_scatter(&grid, &plot_config, font.as_ref());
    plot::save(&img, &plot_config.path)?;
    logging::info(
        DataSource::Plot,
        None,
        &format!(
            "Saved {} stations over {} timestamps to {}",
            grid.stations.len(),
            grid.timestamps.len(),
            plot_config.path.display()
        ),
    );
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
