//! Top-level application orchestration.
//!
//! `src/main.rs` stays tiny; this module:
//! - parses CLI arguments and installs logging
//! - resolves args into stage configs
//! - runs the requested stage(s) and prints what was written

use std::path::{Path, PathBuf};

use clap::Parser;

use crate::cli::{AnalyzeArgs, Command, FigureArgs, PlotArgs, PreprocessArgs, RunArgs, SourceArgs, StatsArgs};
use crate::domain::{AnalysisConfig, PreprocessConfig, RenderConfig};
use crate::error::AppError;
use crate::io::{MERGED_FILE, default_source_paths};
use crate::report::{format_preprocess_summary, format_written};

pub mod pipeline;

/// Figure subdirectory used by `run`.
pub const FIGURES_DIR: &str = "figures";

/// Entry point for the `decouple` binary.
pub fn run() -> Result<(), AppError> {
    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);
    crate::logging::init(cli.verbose);

    match cli.command {
        Command::Preprocess(args) => handle_preprocess(args),
        Command::Analyze(args) => handle_analyze(args),
        Command::Plot(args) => handle_plot(args),
        Command::Run(args) => handle_run(args),
    }
}

fn handle_preprocess(args: PreprocessArgs) -> Result<(), AppError> {
    let config = preprocess_config(&args.sources, &args.out_dir);
    let out = pipeline::run_preprocess(&config)?;
    print!("{}", format_preprocess_summary(&out.sources, &out.table, &out.written));
    Ok(())
}

fn handle_analyze(args: AnalyzeArgs) -> Result<(), AppError> {
    let in_csv = merged_input(args.in_csv, &args.out_dir);
    let config = analysis_config(in_csv, &args.out_dir, &args.stats);
    let out = pipeline::run_analysis(&config)?;
    println!("{}", out.summary);
    println!("Analysis done. Files written:");
    print!("{}", format_written(&out.written));
    Ok(())
}

fn handle_plot(args: PlotArgs) -> Result<(), AppError> {
    let in_csv = merged_input(args.in_csv, &args.out_dir);
    let config = render_config(in_csv, &args.out_dir, &args.figure, &args.stats);
    let report = pipeline::run_render(&config)?;
    print_render_report(&report);
    Ok(())
}

fn handle_run(args: RunArgs) -> Result<(), AppError> {
    let merged = args.out_dir.join(MERGED_FILE);
    let preprocess = preprocess_config(&args.sources, &args.out_dir);
    let analysis = analysis_config(merged.clone(), &args.out_dir, &args.stats);
    let render = render_config(merged, &args.out_dir.join(FIGURES_DIR), &args.figure, &args.stats);

    let out = pipeline::run_all(&preprocess, &analysis, &render)?;
    print!(
        "{}",
        format_preprocess_summary(&out.preprocess.sources, &out.preprocess.table, &out.preprocess.written)
    );
    println!("{}", out.analysis.summary);
    println!("Analysis done. Files written:");
    print!("{}", format_written(&out.analysis.written));
    print_render_report(&out.render);
    Ok(())
}

fn print_render_report(report: &crate::plot::RenderReport) {
    println!("Plots done. Files written:");
    print!("{}", format_written(&report.written));
    for (name, err) in &report.failed {
        println!("- skipped {name}: {err}");
    }
}

/// Resolve source paths; explicit file flags win over the data directory.
pub fn preprocess_config(sources: &SourceArgs, out_dir: &Path) -> PreprocessConfig {
    let (emissions, electricity, vehicles) = default_source_paths(&sources.data_dir);
    PreprocessConfig {
        emissions_path: sources.emissions.clone().unwrap_or(emissions),
        electricity_path: sources.electricity.clone().unwrap_or(electricity),
        vehicles_path: sources.vehicles.clone().unwrap_or(vehicles),
        out_dir: out_dir.to_path_buf(),
        vehicle_year_pattern: sources.vehicle_year_pattern.clone(),
    }
}

pub fn analysis_config(in_csv: PathBuf, out_dir: &Path, stats: &StatsArgs) -> AnalysisConfig {
    AnalysisConfig {
        in_csv,
        out_dir: out_dir.to_path_buf(),
        rolling_window: stats.rolling_window,
        max_lag: stats.max_lag,
    }
}

pub fn render_config(in_csv: PathBuf, out_dir: &Path, figure: &FigureArgs, stats: &StatsArgs) -> RenderConfig {
    RenderConfig {
        in_csv,
        out_dir: out_dir.to_path_buf(),
        width: figure.width,
        height: figure.height,
        rolling_window: stats.rolling_window,
        max_lag: stats.max_lag,
    }
}

fn merged_input(in_csv: Option<PathBuf>, out_dir: &Path) -> PathBuf {
    in_csv.unwrap_or_else(|| out_dir.join(MERGED_FILE))
}

/// Rewrite argv so a bare flag list runs the whole pipeline.
///
/// Rules:
/// - `decouple`                        -> `decouple run`
/// - `decouple --data-dir d ...`       -> `decouple run --data-dir d ...`
/// - `decouple --help/--version/-h`    -> unchanged (top-level help/version)
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let Some(arg1) = argv.get(1).cloned() else {
        argv.push("run".to_string());
        return argv;
    };

    let is_top_level_help_or_version = matches!(
        arg1.as_str(),
        "-h" | "--help" | "-V" | "--version" | "help"
    );
    if is_top_level_help_or_version {
        return argv;
    }

    if arg1.starts_with('-') {
        argv.insert(1, "run".to_string());
    }
    argv
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn bare_invocation_runs_everything() {
        assert_eq!(rewrite_args(argv(&["decouple"])), argv(&["decouple", "run"]));
        assert_eq!(
            rewrite_args(argv(&["decouple", "--data-dir", "d"])),
            argv(&["decouple", "run", "--data-dir", "d"])
        );
    }

    #[test]
    fn subcommands_and_help_pass_through() {
        for args in [
            &["decouple", "analyze", "--out-dir", "o"][..],
            &["decouple", "--help"][..],
            &["decouple", "-V"][..],
        ] {
            assert_eq!(rewrite_args(argv(args)), argv(args));
        }
    }

    #[test]
    fn explicit_source_files_override_data_dir() {
        let cli = crate::cli::Cli::parse_from([
            "decouple",
            "preprocess",
            "--data-dir",
            "raw",
            "--vehicles",
            "elsewhere/veh.csv",
            "--out-dir",
            "o",
        ]);
        let Command::Preprocess(args) = cli.command else {
            panic!("expected preprocess");
        };
        let config = preprocess_config(&args.sources, &args.out_dir);
        assert_eq!(config.emissions_path, Path::new("raw").join(crate::io::EMISSIONS_FILE));
        assert_eq!(config.vehicles_path, PathBuf::from("elsewhere/veh.csv"));
    }
}
