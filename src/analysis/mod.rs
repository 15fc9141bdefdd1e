//! The analyzer stage: every statistic computed from the merged table.
//!
//! The work is split the same way for every run:
//! - per-year derivations (z-scores, deltas, rolling correlations)
//! - pairwise Pearson matrices on levels and on deltas
//! - lag correlations of each driver against emissions
//! - two OLS fits (levels, deltas)
//!
//! Everything here is pure; writing artifacts is the caller's job.

use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::{Metric, MergedTable, YEAR_MAX, YEAR_MIN};
use crate::error::AppError;
use crate::math::{
    correlation_matrix, fit_ols, lag_correlation, rolling_correlation, year_deltas, zscores,
    LagCorrelation, OlsFit,
};

/// Drivers compared against emissions in rolling/lag correlations.
pub const DRIVERS: [Metric; 2] = [Metric::Electricity, Metric::Vehicles];

/// One year of derived values, aligned with the merged table.
#[derive(Debug, Clone, Serialize)]
pub struct DerivedRow {
    pub year: i32,
    pub emissions_ktco2e: f64,
    pub electricity_gwh: f64,
    pub vehicles_first_reg: f64,
    pub emissions_z: Option<f64>,
    pub electricity_z: Option<f64>,
    pub vehicles_z: Option<f64>,
    pub d_emissions: Option<f64>,
    pub d_electricity: Option<f64>,
    pub d_vehicles: Option<f64>,
    pub roll_corr_elec: Option<f64>,
    pub roll_corr_veh: Option<f64>,
}

/// Square Pearson matrix with row/column labels.
#[derive(Debug, Clone, Serialize)]
pub struct CorrelationMatrix {
    pub labels: Vec<String>,
    /// Number of rows the matrix was computed over.
    pub n: usize,
    pub values: Vec<Vec<Option<f64>>>,
}

impl CorrelationMatrix {
    pub fn get(&self, row: &str, col: &str) -> Option<f64> {
        let i = self.labels.iter().position(|l| l == row)?;
        let j = self.labels.iter().position(|l| l == col)?;
        self.values[i][j]
    }
}

/// Rolling correlation of emissions against one driver.
#[derive(Debug, Clone, Serialize)]
pub struct RollingSeries {
    pub driver: Metric,
    pub window: usize,
    /// `(final year of window, r)`.
    pub points: Vec<(i32, Option<f64>)>,
}

/// Lag correlations of emissions against one driver.
#[derive(Debug, Clone, Serialize)]
pub struct LagSeries {
    pub driver: Metric,
    pub lags: Vec<LagCorrelation>,
}

/// All analyzer outputs for one run.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub n_years: usize,
    pub first_year: i32,
    pub last_year: i32,
    pub rolling_window: usize,
    pub max_lag: i32,
    pub levels: CorrelationMatrix,
    pub deltas: CorrelationMatrix,
    pub derived: Vec<DerivedRow>,
    pub rolling: Vec<RollingSeries>,
    pub lags: Vec<LagSeries>,
    pub ols_levels: OlsFit,
    pub ols_deltas: OlsFit,
}

/// Largest meaningful lag: beyond the study span no year pair exists.
pub const MAX_LAG: i32 = YEAR_MAX - YEAR_MIN;

/// Reject lags outside `0..=MAX_LAG`.
pub fn check_max_lag(max_lag: i32) -> Result<(), AppError> {
    if !(0..=MAX_LAG).contains(&max_lag) {
        return Err(AppError::io(format!(
            "Max lag must be between 0 and {MAX_LAG} years (got {max_lag})."
        )));
    }
    Ok(())
}

/// Run every computation over the merged table.
pub fn analyze(table: &MergedTable, rolling_window: usize, max_lag: i32) -> Result<Analysis, AppError> {
    if rolling_window < 2 {
        return Err(AppError::io(format!(
            "Rolling window must be at least 2 years (got {rolling_window})."
        )));
    }
    check_max_lag(max_lag)?;

    let years = table.years();
    let levels_cols: Vec<Vec<f64>> = Metric::ALL.iter().map(|&m| table.column(m)).collect();
    let z_cols: Vec<Vec<Option<f64>>> = levels_cols.iter().map(|c| zscores(c)).collect();
    let delta_cols: Vec<Vec<Option<f64>>> = Metric::ALL
        .iter()
        .map(|&m| year_deltas(&table.series(m)))
        .collect();

    let levels = CorrelationMatrix {
        labels: Metric::ALL.iter().map(|m| m.column().to_string()).collect(),
        n: table.len(),
        values: correlation_matrix(&levels_cols),
    };

    // All three columns share the same years, so their deltas are defined on the same rows.
    let delta_values: Vec<Vec<f64>> = delta_cols
        .iter()
        .map(|c| c.iter().flatten().copied().collect())
        .collect();
    let deltas = CorrelationMatrix {
        labels: Metric::ALL.iter().map(|m| m.delta_column().to_string()).collect(),
        n: delta_values[0].len(),
        values: correlation_matrix(&delta_values),
    };

    let rolling: Vec<RollingSeries> = DRIVERS
        .iter()
        .map(|&driver| rolling_series(table, driver, rolling_window))
        .collect();
    if rolling
        .iter()
        .all(|s| s.points.iter().all(|(_, r)| r.is_none()))
    {
        warn!(
            rolling_window,
            years = table.len(),
            "no complete rolling window; rolling correlations are undefined"
        );
    }

    let lags = DRIVERS
        .iter()
        .map(|&driver| lag_series(table, driver, max_lag))
        .collect();

    let derived = years
        .iter()
        .enumerate()
        .map(|(i, &year)| DerivedRow {
            year,
            emissions_ktco2e: levels_cols[0][i],
            electricity_gwh: levels_cols[1][i],
            vehicles_first_reg: levels_cols[2][i],
            emissions_z: z_cols[0][i],
            electricity_z: z_cols[1][i],
            vehicles_z: z_cols[2][i],
            d_emissions: delta_cols[0][i],
            d_electricity: delta_cols[1][i],
            d_vehicles: delta_cols[2][i],
            roll_corr_elec: rolling[0].points[i].1,
            roll_corr_veh: rolling[1].points[i].1,
        })
        .collect();

    let as_options = |c: &[f64]| c.iter().copied().map(Some).collect::<Vec<_>>();
    let ols_levels = fit_ols(
        Metric::Emissions.column(),
        &as_options(&levels_cols[0]),
        &[
            (Metric::Electricity.column(), as_options(&levels_cols[1])),
            (Metric::Vehicles.column(), as_options(&levels_cols[2])),
        ],
    )?;
    let ols_deltas = fit_ols(
        Metric::Emissions.delta_column(),
        &delta_cols[0],
        &[
            (Metric::Electricity.delta_column(), delta_cols[1].clone()),
            (Metric::Vehicles.delta_column(), delta_cols[2].clone()),
        ],
    )?;
    debug!(
        r2_levels = ols_levels.r_squared,
        r2_deltas = ols_deltas.r_squared,
        "fitted OLS models"
    );

    Ok(Analysis {
        n_years: table.len(),
        first_year: years[0],
        last_year: years[years.len() - 1],
        rolling_window,
        max_lag,
        levels,
        deltas,
        derived,
        rolling,
        lags,
        ols_levels,
        ols_deltas,
    })
}

/// Rolling correlation of emissions vs `driver`, labelled by window end year.
pub fn rolling_series(table: &MergedTable, driver: Metric, window: usize) -> RollingSeries {
    RollingSeries {
        driver,
        window,
        points: rolling_correlation(
            &table.series(Metric::Emissions),
            &table.series(driver),
            window,
        ),
    }
}

/// Emissions at `t` against `driver` at `t + k`; positive `k` = driver lags.
pub fn lag_series(table: &MergedTable, driver: Metric, max_lag: i32) -> LagSeries {
    LagSeries {
        driver,
        lags: lag_correlation(&table.series(Metric::Emissions), &table.series(driver), max_lag),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AnnualRecord;

    fn table(rows: &[(i32, f64, f64, u64)]) -> MergedTable {
        MergedTable::new(
            rows.iter()
                .map(|&(year, e, el, v)| AnnualRecord {
                    year,
                    emissions_ktco2e: e,
                    electricity_gwh: el,
                    vehicles_first_reg: v,
                })
                .collect(),
        )
        .unwrap()
    }

    fn sample() -> MergedTable {
        table(&[
            (2015, 11.0, 82.0, 108),
            (2016, 11.6, 85.0, 118),
            (2017, 11.2, 85.5, 115),
            (2018, 11.4, 87.0, 120),
            (2019, 10.9, 86.0, 114),
            (2020, 10.2, 81.0, 96),
            (2021, 10.4, 84.0, 98),
            (2022, 9.6, 80.0, 81),
        ])
    }

    #[test]
    fn derived_rows_align_with_years() {
        let a = analyze(&sample(), 5, 3).unwrap();
        assert_eq!(a.derived.len(), 8);
        assert_eq!(a.derived[0].year, 2015);
        assert!(a.derived[0].d_emissions.is_none());
        assert!((a.derived[1].d_emissions.unwrap() - 0.6).abs() < 1e-9);
        assert!(a.derived[3].roll_corr_elec.is_none());
        assert!(a.derived[4].roll_corr_elec.is_some());
        assert_eq!(a.deltas.n, 7);
    }

    #[test]
    fn lag_zero_matches_levels_matrix() {
        let a = analyze(&sample(), 5, 3).unwrap();
        let lag0 = a.lags[0].lags.iter().find(|l| l.lag == 0).unwrap();
        assert_eq!(lag0.r, a.levels.get("emissions_ktco2e", "electricity_gwh"));
        assert_eq!(a.lags[0].lags.len(), 7);
    }

    #[test]
    fn delta_regression_needs_five_years() {
        let t = table(&[
            (2020, 1.0, 2.0, 3),
            (2021, 2.0, 1.0, 5),
            (2022, 4.0, 3.0, 4),
            (2023, 3.0, 5.0, 6),
        ]);
        let err = analyze(&t, 5, 3).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_INSUFFICIENT);
        assert!(err.message().contains("d_emissions"), "{err}");
    }

    #[test]
    fn invalid_settings_are_rejected() {
        assert!(analyze(&sample(), 1, 3).is_err());
        assert!(analyze(&sample(), 5, -1).is_err());
    }

    #[test]
    fn lags_beyond_the_study_span_are_rejected() {
        let err = analyze(&sample(), 5, 20_000_000).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_IO);
        assert!(analyze(&sample(), 5, MAX_LAG).is_ok());
        assert!(check_max_lag(MAX_LAG + 1).is_err());
    }

    #[test]
    fn deltas_after_a_missing_year_are_undefined() {
        let t = table(&[
            (2017, 11.2, 70.0, 115),
            (2018, 11.4, 74.0, 120),
            (2019, 10.9, 73.0, 114),
            (2020, 10.2, 78.0, 96),
            (2021, 10.4, 81.0, 98),
            (2022, 9.6, 81.0, 81),
            (2024, 9.1, 90.0, 77),
        ]);
        let a = analyze(&t, 5, 3).unwrap();
        let last = a.derived.last().unwrap();
        assert_eq!(last.year, 2024);
        assert!(last.d_emissions.is_none());
        assert!(last.d_electricity.is_none());
        assert!(last.d_vehicles.is_none());
        assert_eq!(a.deltas.n, 5);
        assert_eq!(a.ols_deltas.n, 5);
    }
}
