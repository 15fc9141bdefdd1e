//! Command-line parsing for the decoupling pipeline.
//!
//! Argument parsing stays here; `app` turns parsed args into the plain config
//! structs in `domain` and dispatches.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::analysis::MAX_LAG;
use crate::io::DEFAULT_VEHICLE_YEAR_PATTERN;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "decouple",
    version,
    about = "Finland road transport: emissions vs electricity and vehicle registrations"
)]
pub struct Cli {
    /// Log at debug level (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load the three source exports and write the merged yearly table.
    Preprocess(PreprocessArgs),
    /// Compute correlations, lag/rolling correlations and OLS on the merged table.
    Analyze(AnalyzeArgs),
    /// Render PNG figures from the merged table.
    Plot(PlotArgs),
    /// Run preprocess, analyze and plot in sequence.
    ///
    /// This is also what a bare `decouple --data-dir ...` runs.
    Run(RunArgs),
}

/// Source file locations.
#[derive(Debug, Args, Clone)]
pub struct SourceArgs {
    /// Directory holding the raw exports.
    #[arg(long, env = "DECOUPLE_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Emissions export (default: DATA_DIR/Greenhouse_gas_emissions.csv).
    #[arg(long, value_name = "FILE")]
    pub emissions: Option<PathBuf>,

    /// Electricity export (default: DATA_DIR/Electricity_consumption.csv).
    #[arg(long, value_name = "FILE")]
    pub electricity: Option<PathBuf>,

    /// Vehicle registrations export (default: DATA_DIR/Reg_vehicles.csv).
    #[arg(long, value_name = "FILE")]
    pub vehicles: Option<PathBuf>,

    /// Regex matching year columns of the vehicles export; group 1 is the year.
    #[arg(long, value_name = "REGEX", default_value = DEFAULT_VEHICLE_YEAR_PATTERN)]
    pub vehicle_year_pattern: String,
}

/// Analyzer tuning.
#[derive(Debug, Args, Clone)]
pub struct StatsArgs {
    /// Rolling correlation window (years, at least 2).
    #[arg(long, default_value_t = 5)]
    pub rolling_window: usize,

    /// Largest lag (years) for lag correlations, at most the 23-year study span.
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(i32).range(0..=MAX_LAG as i64))]
    pub max_lag: i32,
}

/// Figure size.
#[derive(Debug, Args, Clone)]
pub struct FigureArgs {
    /// Figure width (pixels).
    #[arg(long, default_value_t = 1200)]
    pub width: u32,

    /// Figure height (pixels).
    #[arg(long, default_value_t = 800)]
    pub height: u32,
}

#[derive(Debug, Args, Clone)]
pub struct PreprocessArgs {
    #[command(flatten)]
    pub sources: SourceArgs,

    /// Output directory.
    #[arg(long, env = "DECOUPLE_OUT_DIR", default_value = "out")]
    pub out_dir: PathBuf,
}

#[derive(Debug, Args, Clone)]
pub struct AnalyzeArgs {
    /// Merged table (default: OUT_DIR/merged_finland_2001_2024.csv).
    #[arg(long, value_name = "FILE")]
    pub in_csv: Option<PathBuf>,

    /// Output directory.
    #[arg(long, env = "DECOUPLE_OUT_DIR", default_value = "out")]
    pub out_dir: PathBuf,

    #[command(flatten)]
    pub stats: StatsArgs,
}

#[derive(Debug, Args, Clone)]
pub struct PlotArgs {
    /// Merged table (default: OUT_DIR/merged_finland_2001_2024.csv).
    #[arg(long, value_name = "FILE")]
    pub in_csv: Option<PathBuf>,

    /// Figure directory.
    #[arg(long, env = "DECOUPLE_OUT_DIR", default_value = "out")]
    pub out_dir: PathBuf,

    #[command(flatten)]
    pub figure: FigureArgs,

    #[command(flatten)]
    pub stats: StatsArgs,
}

#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub sources: SourceArgs,

    /// Output directory; figures go to OUT_DIR/figures.
    #[arg(long, env = "DECOUPLE_OUT_DIR", default_value = "out")]
    pub out_dir: PathBuf,

    #[command(flatten)]
    pub stats: StatsArgs,

    #[command(flatten)]
    pub figure: FigureArgs,
}
