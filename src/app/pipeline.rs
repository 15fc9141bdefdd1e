//! Stage runners shared by every subcommand.
//!
//! Each stage computes everything in memory first and only then writes, so a
//! failing stage leaves no partial artifacts:
//! sources -> merged table -> analysis artifacts -> figures

use std::path::PathBuf;

use tracing::{info, warn};

use crate::analysis::{Analysis, analyze};
use crate::domain::{AnalysisConfig, Metric, MergedTable, PreprocessConfig, RenderConfig};
use crate::error::AppError;
use crate::io::ingest::{LoadedSources, load_sources, merge_sources};
use crate::io::{MERGED_FILE, read_merged_csv, write_analysis_artifacts, write_merged_csv, write_series_csv};
use crate::plot::{RenderReport, render_all};
use crate::report::format_analysis_summary;

/// Outputs of the loader stage.
#[derive(Debug, Clone)]
pub struct PreprocessOutput {
    pub sources: LoadedSources,
    pub table: MergedTable,
    pub merged_path: PathBuf,
    pub written: Vec<PathBuf>,
}

/// Load, filter and merge the three sources, then write intermediates and the merged table.
pub fn run_preprocess(config: &PreprocessConfig) -> Result<PreprocessOutput, AppError> {
    info!(
        emissions = %config.emissions_path.display(),
        electricity = %config.electricity_path.display(),
        vehicles = %config.vehicles_path.display(),
        "preprocess: loading sources"
    );
    let sources = load_sources(config)?;
    let table = merge_sources(&sources)?;

    let mut written = Vec::new();
    for (metric, series) in [
        (Metric::Emissions, &sources.emissions),
        (Metric::Electricity, &sources.electricity),
        (Metric::Vehicles, &sources.vehicles),
    ] {
        let path = config.out_dir.join(format!("{}.csv", metric.column()));
        write_series_csv(&path, metric.column(), series)?;
        written.push(path);
    }

    let merged_path = config.out_dir.join(MERGED_FILE);
    write_merged_csv(&merged_path, &table)?;
    written.push(merged_path.clone());

    info!(rows = table.len(), path = %merged_path.display(), "preprocess: merged table written");
    Ok(PreprocessOutput {
        sources,
        table,
        merged_path,
        written,
    })
}

/// Outputs of the analyzer stage.
#[derive(Debug, Clone)]
pub struct AnalysisOutput {
    pub analysis: Analysis,
    pub summary: String,
    pub written: Vec<PathBuf>,
}

/// Read the merged table, compute statistics and write the analysis artifacts.
pub fn run_analysis(config: &AnalysisConfig) -> Result<AnalysisOutput, AppError> {
    info!(input = %config.in_csv.display(), "analyze: reading merged table");
    let table = read_merged_csv(&config.in_csv)?;
    let analysis = analyze(&table, config.rolling_window, config.max_lag)?;
    let summary = format_analysis_summary(&analysis, &config.in_csv);
    let written = write_analysis_artifacts(&config.out_dir, &analysis, &summary)?;

    info!(files = written.len(), out_dir = %config.out_dir.display(), "analyze: artifacts written");
    Ok(AnalysisOutput {
        analysis,
        summary,
        written,
    })
}

/// Render every figure; fails only when the input is unreadable or no figure rendered.
pub fn run_render(config: &RenderConfig) -> Result<RenderReport, AppError> {
    info!(input = %config.in_csv.display(), "plot: reading merged table");
    let table = read_merged_csv(&config.in_csv)?;
    let report = render_all(&table, config)?;

    if report.written.is_empty() {
        let reasons: Vec<String> = report
            .failed
            .iter()
            .map(|(name, e)| format!("{name}: {e}"))
            .collect();
        return Err(AppError::render(format!(
            "No figure could be rendered:\n  {}",
            reasons.join("\n  ")
        )));
    }
    if !report.failed.is_empty() {
        warn!(
            rendered = report.written.len(),
            failed = report.failed.len(),
            "plot: some figures were skipped"
        );
    }
    Ok(report)
}

/// Outputs of a full run.
#[derive(Debug)]
pub struct RunOutput {
    pub preprocess: PreprocessOutput,
    pub analysis: AnalysisOutput,
    pub render: RenderReport,
}

/// Preprocess, then analyze and render from the merged table just written.
pub fn run_all(
    preprocess: &PreprocessConfig,
    analysis: &AnalysisConfig,
    render: &RenderConfig,
) -> Result<RunOutput, AppError> {
    let preprocess = run_preprocess(preprocess)?;
    let analysis = run_analysis(analysis)?;
    let render = run_render(render)?;
    Ok(RunOutput {
        preprocess,
        analysis,
        render,
    })
}
