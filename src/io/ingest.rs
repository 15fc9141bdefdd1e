//! Source CSV ingest and the year-aligned merge.
//!
//! This module turns the three heterogeneous StatsFin exports into clean
//! `(year -> value)` series and joins them into the merged annual table.
//!
//! Design goals:
//! - **Fixed encodings** per source (no sniffing; decode errors are fatal)
//! - **Schema checks up front** (clear errors naming file, column, pattern)
//! - **Deterministic behavior** (ordered maps, no hidden state)
//! - **Separation of concerns**: no statistics here

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use csv::StringRecord;
use regex::Regex;
use tracing::{debug, info};

use crate::domain::{
    in_study_range, AnnualRecord, MergedTable, PreprocessConfig, SourceEncoding, YearSeries,
    ELECTRICITY_ENCODING, EMISSIONS_ENCODING, VEHICLES_ENCODING,
};
use crate::error::AppError;

pub const EMISSIONS_FILE: &str = "Greenhouse_gas_emissions.csv";
pub const ELECTRICITY_FILE: &str = "Electricity_consumption.csv";
pub const VEHICLES_FILE: &str = "Reg_vehicles.csv";

/// Title/blank lines StatsFin writes above the header row.
pub const PREAMBLE_LINES: usize = 2;

/// Default matcher for the vehicles export's year columns (`"2001 Number"`,
/// `"2024 Number (preliminary)"`, ...). Group 1 is the year.
pub const DEFAULT_VEHICLE_YEAR_PATTERN: &str = r"(?i)^\s*((?:19|20)\d{2})\s+number\b";

const EMISSIONS_CATEGORY_COLUMN: &str = "emission category";
const EMISSIONS_CATEGORY_PATTERN: &str = r"(?i)\broad\b";
const EMISSIONS_VALUE_PREFIX: &str = "emission,";

const ELECTRICITY_SECTOR_COLUMN: &str = "electricity consumption sector";
const ELECTRICITY_SECTOR_PATTERN: &str = r"(?i)\btotal\b";
const ELECTRICITY_VALUE_FRAGMENT: &str = "quantity";

const VEHICLE_CLASS_COLUMN: &str = "vehicle class";
const VEHICLE_CLASS_PATTERN: &str = r"(?i)all automobiles";
const VEHICLE_REGION_COLUMN: &str = "region";
const VEHICLE_REGION_PATTERN: &str = r"(?i)mainland finland";

/// The three loaded sources, before merging.
#[derive(Debug, Clone)]
pub struct LoadedSources {
    pub emissions: YearSeries,
    pub electricity: YearSeries,
    pub vehicles: YearSeries,
}

/// How the value column of a long-format export is located.
#[derive(Debug, Clone, Copy)]
enum ValueColumn {
    StartsWith(&'static str),
    Contains(&'static str),
}

impl ValueColumn {
    fn matches(self, header: &str) -> bool {
        match self {
            ValueColumn::StartsWith(prefix) => header.starts_with(prefix),
            ValueColumn::Contains(fragment) => header.contains(fragment),
        }
    }

    fn describe(self) -> String {
        match self {
            ValueColumn::StartsWith(prefix) => format!("a column starting with '{prefix}'"),
            ValueColumn::Contains(fragment) => format!("a column containing '{fragment}'"),
        }
    }
}

/// Row filter + value column for a long-format (one row per year/category) export.
#[derive(Debug, Clone, Copy)]
struct LongFormat {
    category_column: &'static str,
    category_pattern: &'static str,
    value_column: ValueColumn,
}

const EMISSIONS_FORMAT: LongFormat = LongFormat {
    category_column: EMISSIONS_CATEGORY_COLUMN,
    category_pattern: EMISSIONS_CATEGORY_PATTERN,
    value_column: ValueColumn::StartsWith(EMISSIONS_VALUE_PREFIX),
};

const ELECTRICITY_FORMAT: LongFormat = LongFormat {
    category_column: ELECTRICITY_SECTOR_COLUMN,
    category_pattern: ELECTRICITY_SECTOR_PATTERN,
    value_column: ValueColumn::Contains(ELECTRICITY_VALUE_FRAGMENT),
};

/// Resolve the three source paths inside a data directory.
pub fn default_source_paths(data_dir: &Path) -> (PathBuf, PathBuf, PathBuf) {
    (
        data_dir.join(EMISSIONS_FILE),
        data_dir.join(ELECTRICITY_FILE),
        data_dir.join(VEHICLES_FILE),
    )
}

/// Compile and validate the vehicles year-column pattern.
pub fn compile_year_pattern(pattern: &str) -> Result<Regex, AppError> {
    let re = Regex::new(pattern)
        .map_err(|e| AppError::io(format!("Invalid vehicle year pattern '{pattern}': {e}")))?;
    if re.captures_len() < 2 {
        return Err(AppError::io(format!(
            "Vehicle year pattern '{pattern}' must contain a capture group for the year."
        )));
    }
    Ok(re)
}

/// Load all three sources named by `config`.
pub fn load_sources(config: &PreprocessConfig) -> Result<LoadedSources, AppError> {
    let year_pattern = compile_year_pattern(&config.vehicle_year_pattern)?;

    let emissions = load_emissions(&config.emissions_path)?;
    let electricity = load_electricity(&config.electricity_path)?;
    let vehicles = load_vehicles(&config.vehicles_path, &year_pattern)?;

    Ok(LoadedSources {
        emissions,
        electricity,
        vehicles,
    })
}

pub fn load_emissions(path: &Path) -> Result<YearSeries, AppError> {
    let text = read_source_text(path, EMISSIONS_ENCODING)?;
    let series = parse_long_format(&text, &path.display().to_string(), &EMISSIONS_FORMAT)?;
    log_loaded("emissions", path, &series);
    Ok(series)
}

pub fn load_electricity(path: &Path) -> Result<YearSeries, AppError> {
    let text = read_source_text(path, ELECTRICITY_ENCODING)?;
    let series = parse_long_format(&text, &path.display().to_string(), &ELECTRICITY_FORMAT)?;
    log_loaded("electricity", path, &series);
    Ok(series)
}

pub fn load_vehicles(path: &Path, year_pattern: &Regex) -> Result<YearSeries, AppError> {
    let text = read_source_text(path, VEHICLES_ENCODING)?;
    let series = parse_vehicles(&text, &path.display().to_string(), year_pattern)?;
    log_loaded("vehicles", path, &series);
    Ok(series)
}

fn log_loaded(name: &str, path: &Path, series: &YearSeries) {
    info!(
        source = name,
        path = %path.display(),
        years = series.len(),
        first = ?series.first_year(),
        last = ?series.last_year(),
        "loaded source"
    );
}

/// Read a file and decode it with its fixed encoding.
pub fn read_source_text(path: &Path, encoding: SourceEncoding) -> Result<String, AppError> {
    let bytes = fs::read(path)
        .map_err(|e| AppError::io(format!("Failed to read input '{}': {e}", path.display())))?;
    decode(&bytes, encoding).map_err(|e| {
        AppError::decode(format!(
            "Failed to decode '{}' as {}: {e}",
            path.display(),
            encoding.label()
        ))
    })
}

/// Decode raw bytes. Latin-1 cannot fail: each byte is its own code point.
pub fn decode(bytes: &[u8], encoding: SourceEncoding) -> Result<String, String> {
    match encoding {
        SourceEncoding::Utf8 => String::from_utf8(bytes.to_vec()).map_err(|e| e.to_string()),
        SourceEncoding::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
    }
}

/// Parse a long-format export: filter rows by category, sum values per year.
fn parse_long_format(text: &str, source: &str, format: &LongFormat) -> Result<YearSeries, AppError> {
    let (headers, records) = read_table(text, source)?;
    let header_map = normalized_headers(&headers);

    let year_idx = find_column(&header_map, |h| h == "year").ok_or_else(|| {
        AppError::format(format!("{source}: missing required column 'year'."))
    })?;
    let category_idx = find_column(&header_map, |h| h == format.category_column).ok_or_else(|| {
        AppError::format(format!(
            "{source}: missing required column '{}'.",
            format.category_column
        ))
    })?;
    let value_idx = find_column(&header_map, |h| format.value_column.matches(h)).ok_or_else(|| {
        AppError::format(format!(
            "{source}: cannot find the value column (expected {}).",
            format.value_column.describe()
        ))
    })?;

    let category = Regex::new(format.category_pattern)
        .map_err(|e| AppError::format(format!("Invalid category pattern: {e}")))?;

    let mut values = BTreeMap::new();
    let mut matched_rows = 0usize;

    for record in &records {
        let Some(cat) = record.get(category_idx) else { continue };
        if !category.is_match(cat) {
            continue;
        }
        matched_rows += 1;

        let Some(year) = record.get(year_idx).and_then(parse_year) else {
            continue;
        };
        let Some(value) = record.get(value_idx).and_then(parse_number) else {
            continue;
        };
        if in_study_range(year) {
            *values.entry(year).or_insert(0.0) += value;
        }
    }

    if matched_rows == 0 {
        return Err(AppError::format(format!(
            "{source}: no row in column '{}' matches '{}'.",
            format.category_column, format.category_pattern
        )));
    }
    debug!(source, matched_rows, years = values.len(), "filtered long-format rows");

    Ok(YearSeries { values })
}

/// Parse the wide vehicles export: pick the all-automobiles/mainland row,
/// read each year column located by `year_pattern`.
fn parse_vehicles(text: &str, source: &str, year_pattern: &Regex) -> Result<YearSeries, AppError> {
    let (headers, records) = read_table(text, source)?;
    let header_map = normalized_headers(&headers);

    let class_idx = find_column(&header_map, |h| h == VEHICLE_CLASS_COLUMN).ok_or_else(|| {
        AppError::format(format!("{source}: missing required column 'Vehicle class'."))
    })?;
    let region_idx = find_column(&header_map, |h| h == VEHICLE_REGION_COLUMN).ok_or_else(|| {
        AppError::format(format!("{source}: missing required column 'Region'."))
    })?;

    let class = Regex::new(VEHICLE_CLASS_PATTERN)
        .map_err(|e| AppError::format(format!("Invalid vehicle class pattern: {e}")))?;
    let region = Regex::new(VEHICLE_REGION_PATTERN)
        .map_err(|e| AppError::format(format!("Invalid region pattern: {e}")))?;

    let row = records
        .iter()
        .find(|r| {
            r.get(class_idx).is_some_and(|v| class.is_match(v))
                && r.get(region_idx).is_some_and(|v| region.is_match(v))
        })
        .ok_or_else(|| {
            AppError::format(format!(
                "{source}: no row matches Vehicle class '{VEHICLE_CLASS_PATTERN}' and Region '{VEHICLE_REGION_PATTERN}'."
            ))
        })?;

    let year_columns: Vec<(usize, i32)> = headers
        .iter()
        .enumerate()
        .filter_map(|(idx, name)| {
            let name = name.trim_start_matches('\u{feff}');
            let caps = year_pattern.captures(name)?;
            let year = caps.get(1)?.as_str().parse::<i32>().ok()?;
            Some((idx, year))
        })
        .collect();

    if year_columns.is_empty() {
        return Err(AppError::format(format!(
            "{source}: no year columns match '{}' (expected headers like '2001 Number').",
            year_pattern.as_str()
        )));
    }
    debug!(source, year_columns = year_columns.len(), "matched vehicle year columns");

    let values = year_columns
        .into_iter()
        .filter(|&(_, year)| in_study_range(year))
        .filter_map(|(idx, year)| Some((year, row.get(idx).and_then(parse_number)?)))
        .collect();

    Ok(YearSeries { values })
}

/// Inner-join the three sources on year.
///
/// Years missing from any source (or outside the study range) are dropped.
/// The result is sorted ascending and must be non-empty.
pub fn merge_sources(sources: &LoadedSources) -> Result<MergedTable, AppError> {
    let mut records = Vec::new();

    for (&year, &emissions) in &sources.emissions.values {
        if !in_study_range(year) {
            continue;
        }
        let (Some(electricity), Some(vehicles)) =
            (sources.electricity.get(year), sources.vehicles.get(year))
        else {
            debug!(year, "year missing from at least one source; dropped");
            continue;
        };
        records.push(AnnualRecord {
            year,
            emissions_ktco2e: emissions,
            electricity_gwh: electricity,
            vehicles_first_reg: to_count(vehicles, year)?,
        });
    }

    let table = MergedTable::new(records)?;
    info!(rows = table.len(), "merged sources on year");
    Ok(table)
}

fn to_count(value: f64, year: i32) -> Result<u64, AppError> {
    if !value.is_finite() || value < 0.0 {
        return Err(AppError::format(format!(
            "Vehicle first registrations for {year} is not a non-negative count: {value}"
        )));
    }
    Ok(value.round() as u64)
}

/// Skip the preamble, then read header + records.
fn read_table(text: &str, source: &str) -> Result<(StringRecord, Vec<StringRecord>), AppError> {
    let body = skip_lines(text, PREAMBLE_LINES).ok_or_else(|| {
        AppError::format(format!(
            "{source}: expected {PREAMBLE_LINES} preamble lines followed by a header row."
        ))
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| AppError::format(format!("{source}: failed to read CSV header: {e}")))?
        .clone();

    let mut records = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        // +2: 1-based, and the header row.
        let line = idx + 2 + PREAMBLE_LINES;
        let record = result
            .map_err(|e| AppError::format(format!("{source}: CSV parse error near line {line}: {e}")))?;
        records.push(record);
    }

    Ok((headers, records))
}

fn skip_lines(text: &str, n: usize) -> Option<&str> {
    let mut rest = text;
    for _ in 0..n {
        let idx = rest.find('\n')?;
        rest = &rest[idx + 1..];
    }
    if rest.trim().is_empty() { None } else { Some(rest) }
}

fn normalized_headers(headers: &StringRecord) -> Vec<String> {
    headers.iter().map(normalize_header_name).collect()
}

/// Lowercase, collapse internal whitespace, strip a UTF-8 BOM.
pub fn normalize_header_name(name: &str) -> String {
    let name = name.trim_start_matches('\u{feff}');
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn find_column(headers: &[String], pred: impl Fn(&str) -> bool) -> Option<usize> {
    headers.iter().position(|h| pred(h))
}

fn parse_year(s: &str) -> Option<i32> {
    let s = s.trim();
    if let Ok(y) = s.parse::<i32>() {
        return Some(y);
    }
    let v = s.parse::<f64>().ok()?;
    if v.is_finite() && v.fract() == 0.0 { Some(v as i32) } else { None }
}

/// Parse a numeric cell; StatsFin placeholders (`..`, `.`, `-`) and blanks yield `None`.
fn parse_number(s: &str) -> Option<f64> {
    let v = s.trim().parse::<f64>().ok()?;
    if v.is_finite() { Some(v) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMISSIONS: &str = "\
\"Greenhouse gas emissions by category\"\n\
\n\
\"Year\",\"Emission category\",\"Greenhouse gas\",\"Emission, thousand tonnes of CO2 eq. (GWP=AR5)\"\n\
\"2000\",\"1A3b Road transportation\",\"Total\",\"11000.0\"\n\
\"2001\",\"1A3b Road transportation\",\"Total\",\"11100.5\"\n\
\"2001\",\"1A3a Domestic aviation\",\"Total\",\"300.0\"\n\
\"2002\",\"1A3b Road transportation\",\"Total\",\"..\"\n\
\"2003\",\"1A3b Road transportation\",\"Total\",\"11300.0\"\n";

    #[test]
    fn emissions_keep_road_rows_in_range() {
        let series = parse_long_format(EMISSIONS, "emissions", &EMISSIONS_FORMAT).unwrap();
        assert_eq!(series.values.len(), 2);
        assert_eq!(series.get(2001), Some(11100.5));
        assert_eq!(series.get(2002), None);
        assert_eq!(series.get(2003), Some(11300.0));
        assert_eq!(series.get(2000), None);
    }

    #[test]
    fn long_format_sums_duplicate_years() {
        let text = "t\n\nYear,Electricity consumption sector,Quantity (GWh)\n\
2010,Total consumption,50\n2010,Total consumption,25\n2010,Industry,999\n";
        let series = parse_long_format(text, "electricity", &ELECTRICITY_FORMAT).unwrap();
        assert_eq!(series.get(2010), Some(75.0));
    }

    #[test]
    fn missing_category_is_a_format_error() {
        let text = "t\n\nYear,Electricity consumption sector,Quantity (GWh)\n2010,Industry,1\n";
        let err = parse_long_format(text, "electricity", &ELECTRICITY_FORMAT).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_FORMAT);
        assert!(err.message().contains("total"), "{err}");
    }

    #[test]
    fn missing_value_column_is_reported() {
        let text = "t\n\nYear,Emission category,Amount\n2010,Road,1\n";
        let err = parse_long_format(text, "emissions", &EMISSIONS_FORMAT).unwrap_err();
        assert!(err.message().contains("emission,"), "{err}");
    }

    #[test]
    fn vehicles_match_year_columns_with_trailing_qualifiers() {
        let text = "Title\n\n\"Vehicle class\",\"Region\",\"2001 Number\",\"2002 Number (preliminary)\",\"Note\"\n\
\"Passenger cars\",\"MAINLAND FINLAND\",\"1\",\"2\",\"x\"\n\
\"All automobiles\",\"Uusimaa\",\"3\",\"4\",\"x\"\n\
\"All automobiles\",\"MAINLAND FINLAND\",\"140000\",\"150000\",\"x\"\n";
        let re = compile_year_pattern(DEFAULT_VEHICLE_YEAR_PATTERN).unwrap();
        let series = parse_vehicles(text, "vehicles", &re).unwrap();
        assert_eq!(series.get(2001), Some(140000.0));
        assert_eq!(series.get(2002), Some(150000.0));
        assert_eq!(series.len(), 2);
    }

    #[test]
    fn vehicles_pattern_is_configurable() {
        let text = "Title\n\nVehicle class,Region,Year 2001,Year 2002\nAll automobiles,MAINLAND FINLAND,5,6\n";
        let default = compile_year_pattern(DEFAULT_VEHICLE_YEAR_PATTERN).unwrap();
        assert!(parse_vehicles(text, "vehicles", &default).is_err());

        let custom = compile_year_pattern(r"^Year (\d{4})$").unwrap();
        let series = parse_vehicles(text, "vehicles", &custom).unwrap();
        assert_eq!(series.get(2002), Some(6.0));
    }

    #[test]
    fn year_pattern_requires_a_capture_group() {
        assert!(compile_year_pattern(r"\d{4} Number").is_err());
        assert!(compile_year_pattern(r"(").is_err());
    }

    #[test]
    fn latin1_decodes_every_byte_and_utf8_rejects_invalid() {
        let bytes = b"S\xe4hk\xf6";
        assert_eq!(decode(bytes, SourceEncoding::Latin1).unwrap(), "S\u{e4}hk\u{f6}");
        assert!(decode(bytes, SourceEncoding::Utf8).is_err());
    }

    #[test]
    fn merge_is_an_inner_join_sorted_by_year() {
        let sources = LoadedSources {
            emissions: [(2003, 3.0), (2001, 1.0), (2002, 2.0)].into_iter().collect(),
            electricity: [(2001, 10.0), (2002, 20.0), (2003, 30.0)].into_iter().collect(),
            vehicles: [(2001, 100.0), (2003, 300.0)].into_iter().collect(),
        };
        let table = merge_sources(&sources).unwrap();
        assert_eq!(table.years(), vec![2001, 2003]);
        assert_eq!(table.records()[1].vehicles_first_reg, 300);
    }

    #[test]
    fn merge_without_overlap_fails() {
        let sources = LoadedSources {
            emissions: [(2001, 1.0)].into_iter().collect(),
            electricity: [(2002, 1.0)].into_iter().collect(),
            vehicles: [(2001, 1.0)].into_iter().collect(),
        };
        let err = merge_sources(&sources).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_EMPTY);
    }

    #[test]
    fn header_normalization_collapses_whitespace() {
        assert_eq!(
            normalize_header_name("\u{feff}Emission  category "),
            "emission category"
        );
    }

    #[test]
    fn preamble_must_be_followed_by_a_header() {
        let err = parse_long_format("only one line\n", "x", &EMISSIONS_FORMAT).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_FORMAT);
    }
}
