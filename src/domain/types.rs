//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - built once by the loader and passed read-only to analysis and rendering
//! - written to / read back from the merged CSV artifact
//! - exported as part of the JSON summary

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// First calendar year kept by the pipeline.
pub const YEAR_MIN: i32 = 2001;
/// Last calendar year kept by the pipeline.
pub const YEAR_MAX: i32 = 2024;

/// Returns true when `year` lies inside `[YEAR_MIN, YEAR_MAX]`.
pub fn in_study_range(year: i32) -> bool {
    (YEAR_MIN..=YEAR_MAX).contains(&year)
}

/// Text encoding a source export is stored in.
///
/// Encodings are fixed per source rather than sniffed, so a mis-saved file
/// fails loudly instead of producing mojibake category names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEncoding {
    Utf8,
    /// ISO-8859-1: every byte maps to the code point of the same value.
    Latin1,
}

impl SourceEncoding {
    pub fn label(self) -> &'static str {
        match self {
            SourceEncoding::Utf8 => "UTF-8",
            SourceEncoding::Latin1 => "Latin-1",
        }
    }
}

pub const EMISSIONS_ENCODING: SourceEncoding = SourceEncoding::Utf8;
pub const ELECTRICITY_ENCODING: SourceEncoding = SourceEncoding::Latin1;
pub const VEHICLES_ENCODING: SourceEncoding = SourceEncoding::Latin1;

/// One of the three yearly metrics carried by the merged table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Emissions,
    Electricity,
    Vehicles,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Emissions, Metric::Electricity, Metric::Vehicles];

    /// Column name in the merged CSV.
    pub fn column(self) -> &'static str {
        match self {
            Metric::Emissions => "emissions_ktco2e",
            Metric::Electricity => "electricity_gwh",
            Metric::Vehicles => "vehicles_first_reg",
        }
    }

    /// Column name of the year-over-year delta.
    pub fn delta_column(self) -> &'static str {
        match self {
            Metric::Emissions => "d_emissions",
            Metric::Electricity => "d_electricity",
            Metric::Vehicles => "d_vehicles",
        }
    }

    /// Column name of the z-scored level.
    pub fn z_column(self) -> &'static str {
        match self {
            Metric::Emissions => "emissions_z",
            Metric::Electricity => "electricity_z",
            Metric::Vehicles => "vehicles_z",
        }
    }

    /// Human-readable label for reports and chart legends.
    pub fn display_name(self) -> &'static str {
        match self {
            Metric::Emissions => "Road transport emissions (kt CO2e)",
            Metric::Electricity => "Electricity consumption (GWh)",
            Metric::Vehicles => "Vehicle first registrations",
        }
    }

    pub fn short_name(self) -> &'static str {
        match self {
            Metric::Emissions => "emissions",
            Metric::Electricity => "electricity",
            Metric::Vehicles => "vehicles",
        }
    }
}

/// One merged row: all three metrics for a single calendar year.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnnualRecord {
    pub year: i32,
    pub emissions_ktco2e: f64,
    pub electricity_gwh: f64,
    pub vehicles_first_reg: u64,
}

impl AnnualRecord {
    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Emissions => self.emissions_ktco2e,
            Metric::Electricity => self.electricity_gwh,
            Metric::Vehicles => self.vehicles_first_reg as f64,
        }
    }
}

/// The merged annual time series.
///
/// Invariants (checked by [`MergedTable::new`]):
/// - at least one row
/// - years strictly ascending (so unique)
/// - every year inside `[YEAR_MIN, YEAR_MAX]`
#[derive(Debug, Clone, PartialEq)]
pub struct MergedTable {
    records: Vec<AnnualRecord>,
}

impl MergedTable {
    pub fn new(records: Vec<AnnualRecord>) -> Result<Self, AppError> {
        if records.is_empty() {
            return Err(AppError::empty(format!(
                "Merged table is empty: no year in {YEAR_MIN}..={YEAR_MAX} is present in all three sources."
            )));
        }
        for r in &records {
            if !in_study_range(r.year) {
                return Err(AppError::format(format!(
                    "Year {} is outside the study range {YEAR_MIN}..={YEAR_MAX}.",
                    r.year
                )));
            }
        }
        for pair in records.windows(2) {
            if pair[1].year <= pair[0].year {
                return Err(AppError::format(format!(
                    "Merged table years must be unique and ascending (found {} after {}).",
                    pair[1].year, pair[0].year
                )));
            }
        }
        Ok(Self { records })
    }

    pub fn records(&self) -> &[AnnualRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn years(&self) -> Vec<i32> {
        self.records.iter().map(|r| r.year).collect()
    }

    /// Values of one metric in year order.
    pub fn column(&self, metric: Metric) -> Vec<f64> {
        self.records.iter().map(|r| r.value(metric)).collect()
    }

    /// `(year, value)` pairs for one metric.
    pub fn series(&self, metric: Metric) -> Vec<(i32, f64)> {
        self.records.iter().map(|r| (r.year, r.value(metric))).collect()
    }
}

/// One source's yearly values, ordered by year.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct YearSeries {
    pub values: BTreeMap<i32, f64>,
}

impl YearSeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, year: i32) -> Option<f64> {
        self.values.get(&year).copied()
    }

    pub fn first_year(&self) -> Option<i32> {
        self.values.keys().next().copied()
    }

    pub fn last_year(&self) -> Option<i32> {
        self.values.keys().next_back().copied()
    }
}

impl FromIterator<(i32, f64)> for YearSeries {
    fn from_iter<T: IntoIterator<Item = (i32, f64)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Resolved input locations and matching rules for the loader stage.
#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    pub emissions_path: PathBuf,
    pub electricity_path: PathBuf,
    pub vehicles_path: PathBuf,
    pub out_dir: PathBuf,
    /// Regex locating year columns in the wide vehicles export.
    ///
    /// Must contain one capture group matching the four-digit year.
    pub vehicle_year_pattern: String,
}

/// Analyzer stage settings.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub in_csv: PathBuf,
    pub out_dir: PathBuf,
    /// Rolling correlation window length (years).
    pub rolling_window: usize,
    /// Lag correlations are computed for `-max_lag..=max_lag`.
    pub max_lag: i32,
}

/// Renderer stage settings.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub in_csv: PathBuf,
    pub out_dir: PathBuf,
    pub width: u32,
    pub height: u32,
    pub rolling_window: usize,
    pub max_lag: i32,
}
