//! Create Cloud-Optimized GeoTIFFs and STAC metadata from NOAA NClimGrid netCDF files.
use std::{path::PathBuf, process::ExitCode};

use clap::{Args, Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colored::Colorize;
use error_stack::ResultExt;

use nclimgrid_stac::config::{PipelineArgs, RangeArgs};
use nclimgrid_stac::default_files::default_config_toml;

mod create_collection;
mod create_items;

fn main() -> ExitCode {
    let clargs = Cli::parse();

    env_logger::Builder::new()
        .filter_level(clargs.verbose.log_level_filter())
        .init();

    let res = match clargs.command {
        Actions::CreateItems(args) => create_items::create_items_cli(args),
        Actions::CreateCollection(args) => create_collection::create_collection_cli(args),
        Actions::WriteConfig(args) => write_config(args),
    };

    if let Err(e) = res {
        eprintln!("An error occurred:\n{e:?}");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{0}")]
    BadInput(String),
    #[error("I/O error: {0}")]
    IoError(String),
    #[error("There was an error creating the COGs and Items.")]
    PipelineError,
}

// ---------------------- //
// Command line interface //
// ---------------------- //

#[derive(Debug, Parser)]
struct Cli {
    #[command(subcommand)]
    command: Actions,

    #[command(flatten)]
    verbose: Verbosity<WarnLevel>,
}

#[derive(Debug, Subcommand)]
enum Actions {
    /// Create COGs and STAC Items for each day or month in a set of netCDF files.
    CreateItems(CreateItemsCli),
    /// Create a STAC Collection, with Items and COGs, from a list of netCDF files.
    CreateCollection(CreateCollectionCli),
    /// Write an example configuration file.
    WriteConfig(WriteConfigCli),
}

#[derive(Debug, Args)]
struct CreateItemsCli {
    /// HREF to the netCDF file of one of the four variables (prcp, tavg,
    /// tmax, or tmin). The files for the other three variables must be
    /// next to it.
    infile: String,

    /// Directory to write the COGs to.
    cog_dir: PathBuf,

    /// Directory to write the STAC Item JSON files to.
    item_dir: PathBuf,

    #[command(flatten)]
    pipeline: PipelineArgs,

    #[command(flatten)]
    range: RangeArgs,
}

#[derive(Debug, Args)]
struct CreateCollectionCli {
    /// Text file listing one netCDF HREF per line, for one variable of each
    /// set of files. All entries must be daily or all monthly. Local paths may
    /// be glob patterns.
    infile: PathBuf,

    /// Directory to write the collection to. It is placed in a "daily" or
    /// "monthly" subdirectory.
    outdir: PathBuf,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[derive(Debug, Args)]
struct WriteConfigCli {
    /// Where to write the configuration file.
    path: PathBuf,

    /// Overwrite the file if it already exists.
    #[clap(short = 'f', long)]
    force: bool,
}

fn write_config(args: WriteConfigCli) -> error_stack::Result<(), CliError> {
    if args.path.exists() && !args.force {
        return Err(CliError::BadInput(format!(
            "{} already exists, use --force to overwrite it", args.path.display()
        )).into());
    }
    std::fs::write(&args.path, default_config_toml())
        .change_context_lazy(|| CliError::IoError(
            format!("Could not write configuration file {}", args.path.display())
        ))?;
    println!("Wrote {}", args.path.display());
    Ok(())
}

/// Print which COGs were written and which already existed.
fn print_cog_summary(created: &[String], reused: &[String]) {
    if created.is_empty() && reused.is_empty() {
        println!("No COGs were needed.");
        return;
    }

    println!("\nCOG summary:");
    for href in created {
        println!("{:^8} {href}", "CREATED".on_green().black().bold());
    }
    for href in reused {
        println!("{:^8} {href}", "REUSED".on_yellow().black().bold());
    }
    println!("\n{} created, {} reused", created.len(), reused.len());
}
