//! Artifact writers.
//!
//! Exports are meant to be easy to consume in spreadsheets or downstream
//! scripts. Every file goes through [`write_atomic`], so a failed run never
//! leaves a truncated artifact behind.

use std::fs;
use std::path::{Path, PathBuf};

use crate::analysis::{Analysis, LagSeries};
use crate::domain::Metric;
use crate::error::AppError;
use crate::report::{fmt_opt, NA};

pub const SUMMARY_TXT: &str = "analysis_summary.txt";
pub const SUMMARY_JSON: &str = "analysis_summary.json";
pub const CORRELATIONS_CSV: &str = "correlations_summary.csv";
pub const DERIVATIVES_CSV: &str = "merged_with_derivatives.csv";

/// Write `bytes` to a sibling temp file, then rename it over `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            AppError::io(format!("Failed to create output dir '{}': {e}", parent.display()))
        })?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, bytes).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        AppError::io(format!("Failed to write '{}': {e}", tmp.display()))
    })?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        AppError::io(format!("Failed to move '{}' into place: {e}", path.display()))
    })
}

/// File name of the lag-correlation CSV for one driver.
pub fn lagcorr_file(driver: Metric) -> String {
    format!("lagcorr_{}.csv", driver.short_name())
}

/// Write every analyzer artifact into `out_dir`; returns the paths written.
///
/// Contents are fully rendered in memory before the first file is touched.
pub fn write_analysis_artifacts(
    out_dir: &Path,
    analysis: &Analysis,
    summary_text: &str,
) -> Result<Vec<PathBuf>, AppError> {
    let mut files: Vec<(PathBuf, Vec<u8>)> = vec![
        (out_dir.join(SUMMARY_TXT), summary_text.as_bytes().to_vec()),
        (out_dir.join(CORRELATIONS_CSV), correlations_csv(analysis)?),
        (out_dir.join(DERIVATIVES_CSV), derivatives_csv(analysis)?),
    ];
    for series in &analysis.lags {
        files.push((out_dir.join(lagcorr_file(series.driver)), lagcorr_csv(series)?));
    }
    let json = serde_json::to_vec_pretty(analysis)
        .map_err(|e| AppError::io(format!("Failed to encode analysis JSON: {e}")))?;
    files.push((out_dir.join(SUMMARY_JSON), json));

    for (path, bytes) in &files {
        write_atomic(path, bytes)?;
    }
    Ok(files.into_iter().map(|(path, _)| path).collect())
}

fn finish(writer: csv::Writer<Vec<u8>>, name: &str) -> Result<Vec<u8>, AppError> {
    writer
        .into_inner()
        .map_err(|e| AppError::io(format!("Failed to finish {name}: {e}")))
}

fn correlations_csv(analysis: &Analysis) -> Result<Vec<u8>, AppError> {
    let mut w = csv::Writer::from_writer(Vec::new());
    let err = |e: csv::Error| AppError::io(format!("Failed to encode {CORRELATIONS_CSV}: {e}"));

    w.write_record(["metric", "pearson_r", "n"]).map_err(err)?;
    let pairs = [
        ("levels", &analysis.levels, Metric::Emissions.column(), Metric::Electricity.column(), "electricity"),
        ("levels", &analysis.levels, Metric::Emissions.column(), Metric::Vehicles.column(), "vehicles"),
        ("deltas", &analysis.deltas, Metric::Emissions.delta_column(), Metric::Electricity.delta_column(), "electricity"),
        ("deltas", &analysis.deltas, Metric::Emissions.delta_column(), Metric::Vehicles.delta_column(), "vehicles"),
    ];
    for (kind, matrix, row, col, label) in pairs {
        w.write_record([
            format!("{kind}_{label}"),
            fmt_opt(matrix.get(row, col)),
            matrix.n.to_string(),
        ])
        .map_err(err)?;
    }
    finish(w, CORRELATIONS_CSV)
}

fn derivatives_csv(analysis: &Analysis) -> Result<Vec<u8>, AppError> {
    let mut w = csv::Writer::from_writer(Vec::new());
    let err = |e: csv::Error| AppError::io(format!("Failed to encode {DERIVATIVES_CSV}: {e}"));

    let mut header = vec!["year".to_string()];
    header.extend(Metric::ALL.iter().map(|m| m.column().to_string()));
    header.extend(Metric::ALL.iter().map(|m| m.z_column().to_string()));
    header.extend(Metric::ALL.iter().map(|m| m.delta_column().to_string()));
    header.push("roll_corr_elec".to_string());
    header.push("roll_corr_veh".to_string());
    w.write_record(&header).map_err(err)?;

    for r in &analysis.derived {
        w.write_record([
            r.year.to_string(),
            r.emissions_ktco2e.to_string(),
            r.electricity_gwh.to_string(),
            r.vehicles_first_reg.to_string(),
            fmt_opt(r.emissions_z),
            fmt_opt(r.electricity_z),
            fmt_opt(r.vehicles_z),
            opt_raw(r.d_emissions),
            opt_raw(r.d_electricity),
            opt_raw(r.d_vehicles),
            fmt_opt(r.roll_corr_elec),
            fmt_opt(r.roll_corr_veh),
        ])
        .map_err(err)?;
    }
    finish(w, DERIVATIVES_CSV)
}

fn lagcorr_csv(series: &LagSeries) -> Result<Vec<u8>, AppError> {
    let name = lagcorr_file(series.driver);
    let mut w = csv::Writer::from_writer(Vec::new());
    let err = |e: csv::Error| AppError::io(format!("Failed to encode {name}: {e}"));

    w.write_record(["lag", "corr", "n"]).map_err(err)?;
    for l in &series.lags {
        w.write_record([l.lag.to_string(), fmt_opt(l.r), l.n.to_string()])
            .map_err(err)?;
    }
    finish(w, &name)
}

fn opt_raw(v: Option<f64>) -> String {
    v.map(|v| v.to_string()).unwrap_or_else(|| NA.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_creates_parents_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.csv");
        write_atomic(&path, b"a,b\n").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"a,b\n");
        assert!(!dir.path().join("nested").join("out.csv.tmp").exists());
    }

    #[test]
    fn failed_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        // A directory squatting on the temp name makes the write fail.
        let path = dir.path().join("out.csv");
        fs::create_dir(dir.path().join("out.csv.tmp")).unwrap();
        assert!(write_atomic(&path, b"x").is_err());
        assert!(!path.exists());
    }

    #[test]
    fn lagcorr_files_are_named_per_driver() {
        assert_eq!(lagcorr_file(Metric::Electricity), "lagcorr_electricity.csv");
        assert_eq!(lagcorr_file(Metric::Vehicles), "lagcorr_vehicles.csv");
    }
}
