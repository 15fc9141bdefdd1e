//! PNG figures rendered with Plotters' bitmap backend.
//!
//! Every figure is drawn from the merged table; derived series (z-scores,
//! rolling and lag correlations) are recomputed with the same functions the
//! analyzer uses, so plots and summary never disagree.
//!
//! Each figure is rendered to a `*.partial.png` sibling and renamed into place
//! once `present()` succeeds.

use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use nalgebra::{DMatrix, DVector};
use plotters::coord::Shift;
use plotters::prelude::*;
use tracing::{info, warn};

use crate::analysis::{check_max_lag, lag_series, rolling_series, DRIVERS};
use crate::domain::{Metric, MergedTable, RenderConfig};
use crate::error::AppError;
use crate::math::{solve_least_squares, zscores};

pub const FIG_TIMESERIES: &str = "fig_timeseries_normalized.png";
pub const FIG_SCATTER_ELECTRICITY: &str = "fig_scatter_emissions_vs_electricity.png";
pub const FIG_SCATTER_VEHICLES: &str = "fig_scatter_emissions_vs_vehicles.png";
pub const FIG_ROLLING: &str = "fig_rolling_correlations.png";
pub const FIG_LAG: &str = "fig_lag_correlations.png";

type Canvas<'a> = DrawingArea<BitMapBackend<'a>, Shift>;

/// Points sampled along a scatter trendline.
const TREND_SAMPLES: usize = 60;

const EMISSIONS_COLOR: RGBColor = RGBColor(31, 119, 180);
const ELECTRICITY_COLOR: RGBColor = RGBColor(255, 127, 14);
const VEHICLES_COLOR: RGBColor = RGBColor(44, 160, 44);
const TREND_COLOR: RGBColor = RGBColor(214, 39, 40);

fn metric_color(metric: Metric) -> RGBColor {
    match metric {
        Metric::Emissions => EMISSIONS_COLOR,
        Metric::Electricity => ELECTRICITY_COLOR,
        Metric::Vehicles => VEHICLES_COLOR,
    }
}

/// The five output figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Figure {
    Timeseries,
    Scatter(Metric),
    Rolling,
    Lag,
}

impl Figure {
    pub const ALL: [Figure; 5] = [
        Figure::Timeseries,
        Figure::Scatter(Metric::Electricity),
        Figure::Scatter(Metric::Vehicles),
        Figure::Rolling,
        Figure::Lag,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            Figure::Timeseries => FIG_TIMESERIES,
            Figure::Scatter(Metric::Vehicles) => FIG_SCATTER_VEHICLES,
            Figure::Scatter(_) => FIG_SCATTER_ELECTRICITY,
            Figure::Rolling => FIG_ROLLING,
            Figure::Lag => FIG_LAG,
        }
    }
}

/// Outcome of a render pass: which figures were written and which failed.
#[derive(Debug, Default)]
pub struct RenderReport {
    pub written: Vec<PathBuf>,
    pub failed: Vec<(String, AppError)>,
}

/// Render all five figures into `config.out_dir`.
///
/// A failing figure is recorded in the report; the remaining figures still render.
pub fn render_all(table: &MergedTable, config: &RenderConfig) -> Result<RenderReport, AppError> {
    fs::create_dir_all(&config.out_dir).map_err(|e| {
        AppError::io(format!(
            "Failed to create figure dir '{}': {e}",
            config.out_dir.display()
        ))
    })?;

    let size = (config.width, config.height);
    let mut report = RenderReport::default();

    for figure in Figure::ALL {
        let name = figure.file_name();
        let path = config.out_dir.join(name);
        let drawn = render_to(&path, |partial| {
            render_png(partial, size, |root| draw_figure(figure, root, &path, table, config))
        });
        match drawn {
            Ok(()) => {
                info!(figure = name, "rendered figure");
                report.written.push(path);
            }
            Err(e) => {
                warn!(figure = name, error = %e, "figure failed to render");
                report.failed.push((name.to_string(), e));
            }
        }
    }

    Ok(report)
}

/// Draw into a partial file, then move it over `path`.
fn render_to(path: &Path, draw: impl FnOnce(&Path) -> Result<(), AppError>) -> Result<(), AppError> {
    let partial = path.with_extension("partial.png");
    if let Err(e) = draw(&partial) {
        let _ = fs::remove_file(&partial);
        return Err(e);
    }
    fs::rename(&partial, path).map_err(|e| {
        let _ = fs::remove_file(&partial);
        AppError::io(format!("Failed to move '{}' into place: {e}", path.display()))
    })
}

fn draw_figure(
    figure: Figure,
    root: &Canvas<'_>,
    path: &Path,
    table: &MergedTable,
    config: &RenderConfig,
) -> Result<(), AppError> {
    match figure {
        Figure::Timeseries => draw_timeseries(root, path, table),
        Figure::Scatter(driver) => draw_scatter(root, path, table, driver),
        Figure::Rolling => draw_rolling(root, path, table, config.rolling_window),
        Figure::Lag => draw_lags(root, path, table, config.max_lag),
    }
}

/// Open a white PNG canvas at `path`, draw, and flush it to disk.
fn render_png(
    path: &Path,
    size: (u32, u32),
    draw: impl FnOnce(&Canvas<'_>) -> Result<(), AppError>,
) -> Result<(), AppError> {
    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE).map_err(|e| draw_err(path, e))?;
    draw(&root)?;
    root.present().map_err(|e| draw_err(path, e))
}

fn draw_err(path: &Path, e: impl std::fmt::Display) -> AppError {
    AppError::render(format!("Failed to draw '{}': {e}", path.display()))
}

/// Z-scored series of all three metrics over the years.
fn draw_timeseries(root: &Canvas<'_>, path: &Path, table: &MergedTable) -> Result<(), AppError> {
    let years = table.years();
    let series: Vec<(Metric, Vec<(f64, f64)>)> = Metric::ALL
        .iter()
        .map(|&m| {
            let z = zscores(&table.column(m));
            let points = years
                .iter()
                .zip(z)
                .filter_map(|(&y, z)| Some((y as f64, z?)))
                .collect();
            (m, points)
        })
        .collect();

    let all_y: Vec<f64> = series.iter().flat_map(|(_, pts)| pts.iter().map(|p| p.1)).collect();
    let y_range = padded_range(&all_y).ok_or_else(|| {
        AppError::insufficient("Normalized series are undefined (fewer than two years or constant columns).")
    })?;
    let x_range = year_range(&years);

    let mut chart = ChartBuilder::on(root)
        .caption("Finland: normalized metrics (z-scores)", ("sans-serif", 28))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range, y_range)
        .map_err(|e| draw_err(path, e))?;

    chart
        .configure_mesh()
        .x_desc("Year")
        .y_desc("Z-score")
        .x_label_formatter(&|v| format!("{v:.0}"))
        .draw()
        .map_err(|e| draw_err(path, e))?;

    for (metric, points) in series {
        let color = metric_color(metric);
        chart
            .draw_series(LineSeries::new(points, color.stroke_width(2)))
            .map_err(|e| draw_err(path, e))?
            .label(format!("{} (z)", metric.display_name()))
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8).filled())
        .border_style(BLACK.stroke_width(1))
        .draw()
        .map_err(|e| draw_err(path, e))?;

    Ok(())
}

/// Emissions against one driver, with a least-squares trendline.
fn draw_scatter(root: &Canvas<'_>, path: &Path, table: &MergedTable, driver: Metric) -> Result<(), AppError> {
    let xs = table.column(driver);
    let ys = table.column(Metric::Emissions);
    let points: Vec<(f64, f64)> = xs.iter().copied().zip(ys.iter().copied()).collect();

    let x_range = padded_range(&xs)
        .ok_or_else(|| AppError::insufficient(format!("No {} values to plot.", driver.short_name())))?;
    let y_range = padded_range(&ys)
        .ok_or_else(|| AppError::insufficient("No emissions values to plot."))?;

    let caption = format!("Emissions vs {}", driver.short_name());
    let mut chart = ChartBuilder::on(root)
        .caption(caption, ("sans-serif", 28))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(x_range.clone(), y_range)
        .map_err(|e| draw_err(path, e))?;

    chart
        .configure_mesh()
        .x_desc(driver.display_name())
        .y_desc(Metric::Emissions.display_name())
        .draw()
        .map_err(|e| draw_err(path, e))?;

    let color = metric_color(driver);
    chart
        .draw_series(points.iter().map(|&p| Circle::new(p, 5, color.filled())))
        .map_err(|e| draw_err(path, e))?
        .label("Data")
        .legend(move |(x, y)| Circle::new((x + 10, y), 5, color.filled()));

    if let Some((intercept, slope)) = trendline(&xs, &ys) {
        let (x0, x1) = (x_range.start, x_range.end);
        let line = (0..TREND_SAMPLES).map(|i| {
            let x = x0 + (x1 - x0) * i as f64 / (TREND_SAMPLES - 1) as f64;
            (x, intercept + slope * x)
        });
        chart
            .draw_series(LineSeries::new(line, TREND_COLOR.stroke_width(2)))
            .map_err(|e| draw_err(path, e))?
            .label("Trend")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], TREND_COLOR.stroke_width(2)));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8).filled())
        .border_style(BLACK.stroke_width(1))
        .draw()
        .map_err(|e| draw_err(path, e))?;

    Ok(())
}

/// Rolling correlation of emissions with each driver.
fn draw_rolling(root: &Canvas<'_>, path: &Path, table: &MergedTable, window: usize) -> Result<(), AppError> {
    let series: Vec<_> = DRIVERS
        .iter()
        .map(|&d| rolling_series(table, d, window))
        .collect();
    if series.iter().all(|s| s.points.iter().all(|(_, r)| r.is_none())) {
        return Err(AppError::insufficient(format!(
            "No complete {window}-year window; rolling correlations are undefined."
        )));
    }

    let years = table.years();
    let mut chart = ChartBuilder::on(root)
        .caption(format!("{window}-year rolling correlations"), ("sans-serif", 28))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(year_range(&years), -1.1..1.1)
        .map_err(|e| draw_err(path, e))?;

    chart
        .configure_mesh()
        .x_desc("Year (window end)")
        .y_desc("Pearson r")
        .x_label_formatter(&|v| format!("{v:.0}"))
        .draw()
        .map_err(|e| draw_err(path, e))?;

    let x_range = year_range(&years);
    chart
        .draw_series(LineSeries::new(
            [(x_range.start, 0.0), (x_range.end, 0.0)],
            BLACK.stroke_width(1),
        ))
        .map_err(|e| draw_err(path, e))?;

    for s in &series {
        let color = metric_color(s.driver);
        let label = format!("Emissions vs {}", s.driver.short_name());
        for (i, segment) in defined_segments(&s.points).into_iter().enumerate() {
            let anno = chart
                .draw_series(LineSeries::new(segment, color.stroke_width(2)))
                .map_err(|e| draw_err(path, e))?;
            if i == 0 {
                anno.label(label.clone())
                    .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
            }
        }
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8).filled())
        .border_style(BLACK.stroke_width(1))
        .draw()
        .map_err(|e| draw_err(path, e))?;

    Ok(())
}

/// Stem plot of lag correlations for each driver.
fn draw_lags(root: &Canvas<'_>, path: &Path, table: &MergedTable, max_lag: i32) -> Result<(), AppError> {
    check_max_lag(max_lag)?;
    let series: Vec<_> = DRIVERS
        .iter()
        .map(|&d| lag_series(table, d, max_lag))
        .collect();
    if series.iter().all(|s| s.lags.iter().all(|l| l.r.is_none())) {
        return Err(AppError::insufficient("Lag correlations are undefined at every lag."));
    }

    let span = max_lag as f64 + 0.5;
    let mut chart = ChartBuilder::on(root)
        .caption(
            format!("Lag correlations (±{max_lag}y): drivers vs emissions"),
            ("sans-serif", 28),
        )
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(-span..span, -1.1..1.1)
        .map_err(|e| draw_err(path, e))?;

    chart
        .configure_mesh()
        .x_desc("Lag (years). Positive = driver lags emissions")
        .y_desc("Pearson r")
        .x_label_formatter(&|v| format!("{v:.0}"))
        .draw()
        .map_err(|e| draw_err(path, e))?;

    chart
        .draw_series(LineSeries::new([(-span, 0.0), (span, 0.0)], BLACK.stroke_width(1)))
        .map_err(|e| draw_err(path, e))?;

    let count = series.len() as f64;
    for (idx, s) in series.iter().enumerate() {
        let color = metric_color(s.driver);
        // Side-by-side stems so both drivers stay visible at each lag.
        let offset = (idx as f64 - (count - 1.0) / 2.0) * 0.15;
        let stems: Vec<(f64, f64)> = s
            .lags
            .iter()
            .filter_map(|l| Some((l.lag as f64 + offset, l.r?)))
            .collect();

        chart
            .draw_series(stems.iter().map(|&(x, r)| {
                PathElement::new(vec![(x, 0.0), (x, r)], color.stroke_width(2))
            }))
            .map_err(|e| draw_err(path, e))?;
        chart
            .draw_series(stems.iter().map(|&p| Circle::new(p, 5, color.filled())))
            .map_err(|e| draw_err(path, e))?
            .label(s.driver.display_name())
            .legend(move |(x, y)| Circle::new((x + 10, y), 5, color.filled()));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8).filled())
        .border_style(BLACK.stroke_width(1))
        .draw()
        .map_err(|e| draw_err(path, e))?;

    Ok(())
}

/// `(intercept, slope)` of `y ~ x`, or `None` with fewer than two distinct x.
fn trendline(xs: &[f64], ys: &[f64]) -> Option<(f64, f64)> {
    if xs.len() < 2 || xs.len() != ys.len() {
        return None;
    }
    let first = xs[0];
    if xs.iter().all(|&x| x == first) {
        return None;
    }
    let x = DMatrix::from_fn(xs.len(), 2, |i, j| if j == 0 { 1.0 } else { xs[i] });
    let y = DVector::from_column_slice(ys);
    let beta = solve_least_squares(&x, &y)?;
    Some((beta[0], beta[1]))
}

/// Contiguous runs of defined values, for drawing gaps as breaks in the line.
fn defined_segments(points: &[(i32, Option<f64>)]) -> Vec<Vec<(f64, f64)>> {
    let mut segments = Vec::new();
    let mut current = Vec::new();
    for &(year, r) in points {
        match r {
            Some(r) => current.push((year as f64, r)),
            None if !current.is_empty() => segments.push(std::mem::take(&mut current)),
            None => {}
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

fn year_range(years: &[i32]) -> Range<f64> {
    let first = years.first().copied().unwrap_or_default() as f64;
    let last = years.last().copied().unwrap_or_default() as f64;
    (first - 0.5)..(last + 0.5)
}

/// Min..max of finite values with 5% padding; widened when all values are equal.
fn padded_range(values: &[f64]) -> Option<Range<f64>> {
    let finite = values.iter().copied().filter(|v| v.is_finite());
    let (lo, hi) = finite.fold(None, |acc: Option<(f64, f64)>, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })?;
    let span = hi - lo;
    if span <= f64::EPSILON * hi.abs().max(1.0) {
        let pad = (hi.abs() * 0.05).max(1.0);
        return Some((lo - pad)..(hi + pad));
    }
    Some((lo - span * 0.05)..(hi + span * 0.05))
}
