//! Read/write the merged table CSV.
//!
//! The merged CSV is the hand-off artifact between stages: the loader writes
//! it once, the analyzer and renderer only read it. The schema is the
//! serde layout of `domain::AnnualRecord`.

use std::fs::File;
use std::path::Path;

use crate::domain::{AnnualRecord, Metric, MergedTable, YearSeries};
use crate::error::AppError;
use crate::io::export::write_atomic;

/// Default merged table file name inside the output directory.
pub const MERGED_FILE: &str = "merged_finland_2001_2024.csv";

/// Serialize the merged table to CSV bytes.
pub fn merged_csv_bytes(table: &MergedTable) -> Result<Vec<u8>, AppError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for record in table.records() {
        writer
            .serialize(record)
            .map_err(|e| AppError::io(format!("Failed to encode merged row {}: {e}", record.year)))?;
    }
    writer
        .into_inner()
        .map_err(|e| AppError::io(format!("Failed to finish merged CSV: {e}")))
}

/// Write the merged table CSV.
pub fn write_merged_csv(path: &Path, table: &MergedTable) -> Result<(), AppError> {
    write_atomic(path, &merged_csv_bytes(table)?)
}

/// Write one source's `(year, value)` intermediate.
pub fn write_series_csv(path: &Path, column: &str, series: &YearSeries) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let encode_err = |e: csv::Error| AppError::io(format!("Failed to encode '{}': {e}", path.display()));

    writer.write_record(["year", column]).map_err(encode_err)?;
    for (year, value) in &series.values {
        writer
            .write_record([year.to_string(), value.to_string()])
            .map_err(encode_err)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::io(format!("Failed to finish '{}': {e}", path.display())))?;
    write_atomic(path, &bytes)
}

/// Read and validate a merged table CSV.
pub fn read_merged_csv(path: &Path) -> Result<MergedTable, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("Failed to open merged CSV '{}': {e}", path.display())))?;

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| AppError::format(format!("Failed to read header of '{}': {e}", path.display())))?
        .clone();

    let missing: Vec<&str> = std::iter::once("year")
        .chain(Metric::ALL.iter().map(|m| m.column()))
        .filter(|col| !headers.iter().any(|h| h == *col))
        .collect();
    if !missing.is_empty() {
        return Err(AppError::format(format!(
            "Missing columns in '{}': {}",
            path.display(),
            missing.join(", ")
        )));
    }

    let mut records = Vec::new();
    for (idx, result) in reader.deserialize::<AnnualRecord>().enumerate() {
        let record = result.map_err(|e| {
            AppError::format(format!("Invalid row {} in '{}': {e}", idx + 2, path.display()))
        })?;
        records.push(record);
    }

    MergedTable::new(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> MergedTable {
        MergedTable::new(vec![
            AnnualRecord {
                year: 2020,
                emissions_ktco2e: 10.5,
                electricity_gwh: 80000.0,
                vehicles_first_reg: 96000,
            },
            AnnualRecord {
                year: 2021,
                emissions_ktco2e: 10.25,
                electricity_gwh: 84000.0,
                vehicles_first_reg: 98000,
            },
        ])
        .unwrap()
    }

    #[test]
    fn merged_csv_has_expected_header() {
        let bytes = merged_csv_bytes(&table()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("year,emissions_ktco2e,electricity_gwh,vehicles_first_reg\n"));
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn merged_csv_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MERGED_FILE);
        write_merged_csv(&path, &table()).unwrap();
        assert_eq!(read_merged_csv(&path).unwrap(), table());
    }

    #[test]
    fn missing_columns_are_named() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "year,emissions_ktco2e\n2020,1.0\n").unwrap();
        let err = read_merged_csv(&path).unwrap_err();
        assert!(err.message().contains("electricity_gwh"), "{err}");
        assert!(err.message().contains("vehicles_first_reg"), "{err}");
    }
}
