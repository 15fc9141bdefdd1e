//! Ordinary least squares with inference.
//!
//! The pipeline fits two small regressions (levels and year-over-year deltas),
//! each with an intercept and two regressors:
//!
//! ```text
//! minimize Σ (y_i - x_i^T β)^2
//! ```
//!
//! Implementation choices:
//! - β is solved with SVD so tall, mildly ill-conditioned designs still solve.
//!   (Nalgebra's `QR::solve` is intended for square systems and will panic for
//!   non-square matrices.)
//! - Standard errors come from `σ² (XᵀX)⁻¹` with `σ² = SSE / (n - p)`.
//! - p-values are two-sided Student t; the overall F-test uses Fisher–Snedecor.

use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, FisherSnedecor, StudentsT};

use crate::error::AppError;

/// Name used for the intercept term in reports.
pub const INTERCEPT: &str = "const";

/// Confidence level of the reported coefficient intervals.
pub const CONFIDENCE: f64 = 0.95;

/// Smallest singular value, relative to the largest, for a full-rank design.
const RANK_TOL: f64 = 1e-10;

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// One estimated coefficient.
#[derive(Debug, Clone, Serialize)]
pub struct Coefficient {
    pub name: String,
    pub estimate: f64,
    pub std_error: f64,
    pub t_stat: f64,
    pub p_value: f64,
    pub ci_low: f64,
    pub ci_high: f64,
}

/// A fitted OLS model.
#[derive(Debug, Clone, Serialize)]
pub struct OlsFit {
    pub dependent: String,
    pub n: usize,
    pub df_resid: usize,
    /// Intercept first, then regressors in the order given.
    pub coefficients: Vec<Coefficient>,
    pub r_squared: f64,
    pub adj_r_squared: f64,
    pub f_stat: f64,
    pub f_p_value: f64,
    pub sse: f64,
}

impl OlsFit {
    pub fn coefficient(&self, name: &str) -> Option<&Coefficient> {
        self.coefficients.iter().find(|c| c.name == name)
    }

    pub fn intercept(&self) -> Option<&Coefficient> {
        self.coefficient(INTERCEPT)
    }
}

/// Fit `y ~ 1 + regressors` by OLS.
///
/// Rows where `y` or any regressor is `None` are dropped first. At least
/// `regressors + 2` complete rows are required.
pub fn fit_ols(
    dependent: &str,
    y: &[Option<f64>],
    regressors: &[(&str, Vec<Option<f64>>)],
) -> Result<OlsFit, AppError> {
    if regressors.iter().any(|(_, col)| col.len() != y.len()) {
        return Err(AppError::insufficient(format!(
            "OLS for '{dependent}': regressor columns differ in length from the dependent column."
        )));
    }

    let rows: Vec<(f64, Vec<f64>)> = (0..y.len())
        .filter_map(|i| {
            let yi = y[i]?;
            let xi = regressors
                .iter()
                .map(|(_, col)| col[i])
                .collect::<Option<Vec<f64>>>()?;
            Some((yi, xi))
        })
        .collect();

    let k = regressors.len();
    let p = k + 1;
    let n = rows.len();
    if n < k + 2 {
        return Err(AppError::insufficient(format!(
            "OLS for '{dependent}' needs at least {} complete rows, found {n}.",
            k + 2
        )));
    }

    let x = DMatrix::from_fn(n, p, |i, j| if j == 0 { 1.0 } else { rows[i].1[j - 1] });
    let yv = DVector::from_iterator(n, rows.iter().map(|(yi, _)| *yi));

    // Relative rank check; `try_inverse` alone accepts near-zero pivots.
    let singular_values = x.clone().svd(false, false).singular_values;
    if singular_values.min() <= singular_values.max() * RANK_TOL {
        return Err(AppError::insufficient(format!(
            "OLS for '{dependent}': regressors are perfectly collinear (XᵀX is singular)."
        )));
    }

    let beta = solve_least_squares(&x, &yv).ok_or_else(|| {
        AppError::insufficient(format!("OLS for '{dependent}': design matrix is ill-conditioned."))
    })?;
    let xtx_inv = (x.transpose() * &x).try_inverse().ok_or_else(|| {
        AppError::insufficient(format!(
            "OLS for '{dependent}': regressors are perfectly collinear (XᵀX is singular)."
        ))
    })?;

    let residuals = &yv - &x * &beta;
    let sse = residuals.dot(&residuals);
    let df_resid = n - p;
    let sigma2 = sse / df_resid as f64;

    let y_mean = yv.mean();
    let sst = yv.iter().map(|v| (v - y_mean).powi(2)).sum::<f64>();
    let r_squared = if sst > 0.0 { 1.0 - sse / sst } else { f64::NAN };
    let adj_r_squared = 1.0 - (1.0 - r_squared) * (n as f64 - 1.0) / df_resid as f64;

    let t_dist = StudentsT::new(0.0, 1.0, df_resid as f64)
        .map_err(|e| AppError::insufficient(format!("Failed to create t-distribution: {e}")))?;
    let t_crit = t_dist.inverse_cdf(1.0 - (1.0 - CONFIDENCE) / 2.0);

    let names = std::iter::once(INTERCEPT).chain(regressors.iter().map(|(name, _)| *name));
    let coefficients = names
        .enumerate()
        .map(|(j, name)| {
            let estimate = beta[j];
            let std_error = (sigma2 * xtx_inv[(j, j)]).max(0.0).sqrt();
            let t_stat = estimate / std_error;
            Coefficient {
                name: name.to_string(),
                estimate,
                std_error,
                t_stat,
                p_value: two_sided_p(&t_dist, t_stat),
                ci_low: estimate - t_crit * std_error,
                ci_high: estimate + t_crit * std_error,
            }
        })
        .collect();

    let f_stat = ((sst - sse) / k as f64) / sigma2;
    let f_p_value = upper_tail_f(f_stat, k as f64, df_resid as f64);

    Ok(OlsFit {
        dependent: dependent.to_string(),
        n,
        df_resid,
        coefficients,
        r_squared,
        adj_r_squared,
        f_stat,
        f_p_value,
        sse,
    })
}

fn two_sided_p(t_dist: &StudentsT, t_stat: f64) -> f64 {
    if t_stat.is_nan() {
        return f64::NAN;
    }
    if t_stat.is_infinite() {
        return 0.0;
    }
    (2.0 * (1.0 - t_dist.cdf(t_stat.abs()))).clamp(0.0, 1.0)
}

fn upper_tail_f(f_stat: f64, df1: f64, df2: f64) -> f64 {
    if f_stat.is_nan() {
        return f64::NAN;
    }
    if f_stat.is_infinite() {
        return 0.0;
    }
    match FisherSnedecor::new(df1, df2) {
        Ok(dist) => (1.0 - dist.cdf(f_stat.max(0.0))).clamp(0.0, 1.0),
        Err(_) => f64::NAN,
    }
}
