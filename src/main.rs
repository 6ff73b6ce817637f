//! l1calo-h5 - CMS Calorimeter Layer-1 Trigger ntuple to HDF5 converter
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use l1calo_h5::convert::{convert, ConvertOptions};
use l1calo_h5::data::io::{resolve_input_file, resolve_output_dir};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Convert CMS Calorimeter Layer-1 Trigger region energy deposits from ROOT to HDF5 format
#[derive(Parser, Debug)]
#[command(name = "l1calo-h5", version)]
struct CliArgs {
    /// Input ROOT file
    #[arg(value_parser = parse_input_file)]
    filepath: PathBuf,

    /// Output directory, `dataset.h5` is written inside it
    #[arg(value_parser = parse_output_dir)]
    savepath: PathBuf,
}

fn parse_input_file(value: &str) -> std::result::Result<PathBuf, String> {
    resolve_input_file(value).map_err(|e| e.to_string())
}

fn parse_output_dir(value: &str) -> std::result::Result<PathBuf, String> {
    resolve_output_dir(value).map_err(|e| e.to_string())
}

fn main() -> ExitCode {
    let args = CliArgs::parse();
    setup_logging();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &CliArgs) -> Result<()> {
    let output = convert(&args.filepath, &args.savepath, &ConvertOptions::default())
        .with_context(|| format!("Failed to convert '{}'", args.filepath.display()))?;
    info!("Done: {}", output.display());
    Ok(())
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("l1calo_h5=info,warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
