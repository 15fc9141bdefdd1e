//! Formatted text output: the statistics summary artifact and stage listings.
//!
//! We keep formatting code in one place so:
//! - the math code stays clean and testable
//! - output changes are localized (important for snapshot-style tests)

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::analysis::{Analysis, CorrelationMatrix, DerivedRow, LagSeries, RollingSeries};
use crate::domain::{Metric, MergedTable};
use crate::io::ingest::LoadedSources;
use crate::math::OlsFit;

/// Placeholder for undefined statistics.
pub const NA: &str = "NA";

/// Render the full human-readable statistics summary.
pub fn format_analysis_summary(analysis: &Analysis, source: &Path) -> String {
    let mut out = String::new();

    out.push_str("=== Finland road transport: emissions vs electricity & vehicles ===\n");
    let _ = writeln!(out, "Input: {}", source.display());
    let _ = writeln!(
        out,
        "Years: {}-{} (n={})",
        analysis.first_year, analysis.last_year, analysis.n_years
    );
    out.push_str("Conventions: z-scores use the sample SD (n-1); deltas are X[t] - X[previous row];\n");
    let _ = writeln!(
        out,
        "             rolling windows span {} calendar years, labelled by their final year;",
        analysis.rolling_window
    );
    out.push_str("             lag k pairs emissions[t] with driver[t+k] (k > 0: driver lags emissions).\n");

    out.push('\n');
    out.push_str(&format_matrix("Pearson correlation (levels)", &analysis.levels));
    out.push('\n');
    out.push_str(&format_matrix("Pearson correlation (deltas)", &analysis.deltas));

    out.push('\n');
    out.push_str(&format_derived(&analysis.derived));

    out.push('\n');
    out.push_str(&format_rolling(&analysis.rolling));

    out.push('\n');
    out.push_str(&format_lags(&analysis.lags, analysis.max_lag));

    out.push('\n');
    out.push_str(&format_ols(
        "OLS (levels): emissions_ktco2e ~ electricity_gwh + vehicles_first_reg",
        &analysis.ols_levels,
    ));
    out.push('\n');
    out.push_str(&format_ols(
        "OLS (deltas): d_emissions ~ d_electricity + d_vehicles",
        &analysis.ols_deltas,
    ));

    out
}

fn format_matrix(title: &str, m: &CorrelationMatrix) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "--- {title}, n={} ---", m.n);

    let mut header = format!("{:<20}", "");
    for label in &m.labels {
        let _ = write!(header, " {label:>20}");
    }
    out.push_str(header.trim_end());
    out.push('\n');

    for (label, row) in m.labels.iter().zip(&m.values) {
        let mut line = format!("{label:<20}");
        for v in row {
            let _ = write!(line, " {:>20}", fmt_opt(*v));
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

fn format_derived(rows: &[DerivedRow]) -> String {
    let mut out = String::new();
    out.push_str("--- Per-year z-scores and deltas ---\n");

    let mut header = format!("{:<6}", "year");
    for m in Metric::ALL {
        let _ = write!(header, " {:>14}", m.z_column());
    }
    for m in Metric::ALL {
        let _ = write!(header, " {:>14}", m.delta_column());
    }
    out.push_str(header.trim_end());
    out.push('\n');

    for r in rows {
        let mut line = format!("{:<6}", r.year);
        for v in [r.emissions_z, r.electricity_z, r.vehicles_z] {
            let _ = write!(line, " {:>14}", fmt_short_opt(v));
        }
        for v in [r.d_emissions, r.d_electricity, r.d_vehicles] {
            let _ = write!(line, " {:>14}", fmt_short_opt(v));
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

fn format_rolling(series: &[RollingSeries]) -> String {
    let mut out = String::new();
    let window = series.first().map(|s| s.window).unwrap_or_default();
    let _ = writeln!(out, "--- Rolling correlation with emissions ({window}-year window) ---");

    let mut header = format!("{:<6}", "year");
    for s in series {
        let _ = write!(header, " {:>14}", s.driver.short_name());
    }
    out.push_str(header.trim_end());
    out.push('\n');

    let years: Vec<i32> = series
        .first()
        .map(|s| s.points.iter().map(|(y, _)| *y).collect())
        .unwrap_or_default();
    for (i, year) in years.iter().enumerate() {
        let mut line = format!("{year:<6}");
        for s in series {
            let _ = write!(line, " {:>14}", fmt_opt(s.points[i].1));
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

fn format_lags(series: &[LagSeries], max_lag: i32) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "--- Lag correlation with emissions (±{max_lag} years) ---");

    let mut header = format!("{:<6}", "lag");
    for s in series {
        let _ = write!(header, " {:>14} {:>4}", s.driver.short_name(), "n");
    }
    out.push_str(header.trim_end());
    out.push('\n');

    for lag in -max_lag..=max_lag {
        let mut line = format!("{lag:<6}");
        for s in series {
            let entry = s.lags.iter().find(|l| l.lag == lag);
            let _ = write!(
                line,
                " {:>14} {:>4}",
                fmt_opt(entry.and_then(|l| l.r)),
                entry.map(|l| l.n).unwrap_or_default()
            );
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

fn format_ols(title: &str, fit: &OlsFit) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "--- {title} ---");
    let _ = writeln!(out, "Dep. variable: {}", fit.dependent);
    let _ = writeln!(out, "Observations: {}   Df residuals: {}", fit.n, fit.df_resid);
    let _ = writeln!(
        out,
        "R-squared: {}   Adj. R-squared: {}",
        fmt_num(fit.r_squared),
        fmt_num(fit.adj_r_squared)
    );
    let _ = writeln!(
        out,
        "F-statistic: {}   Prob (F-statistic): {}",
        fmt_num(fit.f_stat),
        fmt_num(fit.f_p_value)
    );

    out.push_str(
        format!(
            "{:<20} {:>14} {:>14} {:>10} {:>10} {:>14} {:>14}",
            "term", "coef", "std err", "t", "P>|t|", "[0.025", "0.975]"
        )
        .trim_end(),
    );
    out.push('\n');

    for c in &fit.coefficients {
        let _ = writeln!(
            out,
            "{:<20} {:>14} {:>14} {:>10} {:>10} {:>14} {:>14}",
            c.name,
            fmt_num(c.estimate),
            fmt_num(c.std_error),
            fmt_short(c.t_stat),
            fmt_short(c.p_value),
            fmt_num(c.ci_low),
            fmt_num(c.ci_high),
        );
    }
    out
}

/// Listing printed after the loader stage.
pub fn format_preprocess_summary(sources: &LoadedSources, table: &MergedTable, written: &[PathBuf]) -> String {
    let mut out = String::new();
    out.push_str("Preprocess done.\n");
    for (metric, series) in [
        (Metric::Emissions, &sources.emissions),
        (Metric::Electricity, &sources.electricity),
        (Metric::Vehicles, &sources.vehicles),
    ] {
        let _ = writeln!(
            out,
            "  {:<12} {} years ({})",
            metric.short_name(),
            series.len(),
            year_span(series.first_year(), series.last_year())
        );
    }
    let years = table.years();
    let _ = writeln!(
        out,
        "  {:<12} {} years ({})",
        "merged",
        table.len(),
        year_span(years.first().copied(), years.last().copied())
    );
    out.push_str(&format_written(written));
    out
}

/// `- path` lines for a list of written artifacts.
pub fn format_written(written: &[PathBuf]) -> String {
    written
        .iter()
        .map(|p| format!("- {}\n", p.display()))
        .collect()
}

fn year_span(first: Option<i32>, last: Option<i32>) -> String {
    match (first, last) {
        (Some(a), Some(b)) => format!("{a}-{b}"),
        _ => "none".to_string(),
    }
}

/// Six-decimal value or `NA`.
pub fn fmt_opt(v: Option<f64>) -> String {
    match v {
        Some(v) => fmt_num(v),
        None => NA.to_string(),
    }
}

pub fn fmt_num(v: f64) -> String {
    if v.is_finite() { format!("{v:.6}") } else { NA.to_string() }
}

fn fmt_short(v: f64) -> String {
    if v.is_finite() { format!("{v:.3}") } else { NA.to_string() }
}

fn fmt_short_opt(v: Option<f64>) -> String {
    v.map(fmt_short).unwrap_or_else(|| NA.to_string())
}
