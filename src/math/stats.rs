//! Descriptive statistics over short annual series.
//!
//! Conventions:
//! - Standard deviation is the **sample** estimate (`n - 1` denominator).
//! - Undefined results (too few points, zero variance) are `None`, never NaN.
//! - Series that carry years are `(year, value)` pairs sorted by year; windows
//!   and lags are expressed in calendar years, so a year missing from the
//!   table simply contributes no point.

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(xs: &[f64]) -> Option<f64> {
    if xs.is_empty() {
        return None;
    }
    Some(xs.iter().sum::<f64>() / xs.len() as f64)
}

/// Sample standard deviation (`n - 1` denominator), `None` when `n < 2`.
pub fn sample_std(xs: &[f64]) -> Option<f64> {
    if xs.len() < 2 {
        return None;
    }
    let m = mean(xs)?;
    let ss = xs.iter().map(|x| (x - m).powi(2)).sum::<f64>();
    Some((ss / (xs.len() as f64 - 1.0)).sqrt())
}

/// Z-scores using the sample standard deviation.
///
/// Every entry is `None` when the column is constant or has fewer than two values.
pub fn zscores(xs: &[f64]) -> Vec<Option<f64>> {
    match (mean(xs), sample_std(xs)) {
        (Some(m), Some(s)) if s > 0.0 => xs.iter().map(|x| Some((x - m) / s)).collect(),
        _ => vec![None; xs.len()],
    }
}

/// First differences: `out[i] = xs[i + 1] - xs[i]`. Length is `n - 1`.
pub fn deltas(xs: &[f64]) -> Vec<f64> {
    xs.windows(2).map(|w| w[1] - w[0]).collect()
}

/// Year-over-year deltas aligned to the input rows.
///
/// `out[i] = x[year] - x[year - 1]`, defined only when the previous calendar
/// year is the previous row. The first row, and any row after a missing year,
/// is `None`.
pub fn year_deltas(series: &[(i32, f64)]) -> Vec<Option<f64>> {
    series
        .iter()
        .enumerate()
        .map(|(i, &(year, x))| {
            let &(prev_year, prev) = series.get(i.checked_sub(1)?)?;
            (prev_year == year - 1).then_some(x - prev)
        })
        .collect()
}

/// Pearson correlation coefficient.
///
/// `None` when the inputs differ in length, have fewer than two points, or
/// either side has zero variance.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let mx = mean(xs)?;
    let my = mean(ys)?;

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mx;
        let dy = y - my;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }

    if sxx <= 0.0 || syy <= 0.0 {
        return None;
    }
    let r = sxy / (sxx * syy).sqrt();
    if r.is_finite() { Some(r.clamp(-1.0, 1.0)) } else { None }
}

/// Pairwise Pearson matrix over equally long columns.
pub fn correlation_matrix(columns: &[Vec<f64>]) -> Vec<Vec<Option<f64>>> {
    columns
        .iter()
        .map(|a| columns.iter().map(|b| pearson(a, b)).collect())
        .collect()
}

/// Rolling Pearson correlation over `window` consecutive calendar years.
///
/// One entry per year of `a`, labelled by the window's final year. The value is
/// `None` until the window holds `window` years present in both series.
pub fn rolling_correlation(a: &[(i32, f64)], b: &[(i32, f64)], window: usize) -> Vec<(i32, Option<f64>)> {
    let span = window as i32;
    a.iter()
        .map(|&(end, _)| {
            let start = end - span + 1;
            let (xs, ys): (Vec<f64>, Vec<f64>) = a
                .iter()
                .filter(|(year, _)| (start..=end).contains(year))
                .filter_map(|&(year, x)| Some((x, lookup(b, year)?)))
                .unzip();
            let r = if window >= 2 && xs.len() >= window {
                pearson(&xs, &ys)
            } else {
                None
            };
            (end, r)
        })
        .collect()
}

/// Correlation at one lag.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct LagCorrelation {
    pub lag: i32,
    /// Number of year pairs available after shifting.
    pub n: usize,
    pub r: Option<f64>,
}

/// Correlate `a[t]` with `b[t + k]` for every `k` in `-max_lag..=max_lag`.
///
/// Positive `k` means `b` lags `a`. `k = 0` is the plain contemporaneous
/// correlation over the common years.
pub fn lag_correlation(a: &[(i32, f64)], b: &[(i32, f64)], max_lag: i32) -> Vec<LagCorrelation> {
    (-max_lag..=max_lag)
        .map(|lag| {
            let (xs, ys): (Vec<f64>, Vec<f64>) = a
                .iter()
                .filter_map(|&(year, x)| Some((x, lookup(b, year + lag)?)))
                .unzip();
            LagCorrelation {
                lag,
                n: xs.len(),
                r: pearson(&xs, &ys),
            }
        })
        .collect()
}

fn lookup(series: &[(i32, f64)], year: i32) -> Option<f64> {
    series
        .binary_search_by_key(&year, |&(y, _)| y)
        .ok()
        .map(|idx| series[idx].1)
}
