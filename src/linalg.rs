//! Dense regression helpers shared by the fitters.
//!
//! Everything here is small, dense, and solved by explicit inversion of the normal
//! equations. The problems are at most a few hundred rows by a few dozen columns.

use crate::error::TsirError;
use nalgebra::{DMatrix, DVector};

/// Coefficients, their covariance, and the raw-scale residual of a least squares fit.
#[derive(Debug, Clone)]
pub struct LeastSquaresFit {
    pub coefficients: DVector<f64>,
    pub covariance: DMatrix<f64>,
    /// `Y - X·β`, always in the units of the inputs.
    pub residual: DVector<f64>,
}

impl LeastSquaresFit {
    #[must_use]
    pub fn residual_sum_of_squares(&self) -> f64 {
        self.residual.norm_squared()
    }
}

fn column_moments(values: impl Iterator<Item = f64> + Clone, n: usize) -> (f64, f64) {
    let mean = values.clone().sum::<f64>() / n as f64;
    let var = values.map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
    (mean, var.sqrt())
}

/// Weighted least squares, reducing to OLS when `weights` is `None`.
///
/// Solves `β = (XᵀWX)⁻¹XᵀWY` and estimates the coefficient covariance from the sample
/// variance `RSS / (n - p)`. With `standardize`, the columns of `X` and `Y` are centered and
/// scaled by their population standard deviation before solving, which keeps the inversion
/// well conditioned when the inputs are large cumulative sums; the coefficients and
/// covariance are mapped back to the original scale afterwards.
///
/// # Errors
///
/// `NumericDegeneracy` when there are no residual degrees of freedom, a column has zero
/// variance under standardization, or the normal equations are singular.
/// `InputShapeError` when the lengths of `X`, `Y` and the weights disagree.
pub fn weighted_least_squares(
    x: &DMatrix<f64>,
    y: &DVector<f64>,
    weights: Option<&[f64]>,
    standardize: bool,
) -> Result<LeastSquaresFit, TsirError> {
    let (n, p) = x.shape();
    if y.len() != n {
        return Err(TsirError::InputShapeError(format!(
            "design matrix has {n} rows but response has {} entries",
            y.len()
        )));
    }
    if let Some(w) = weights {
        if w.len() != n {
            return Err(TsirError::InputShapeError(format!(
                "design matrix has {n} rows but {} weights were given",
                w.len()
            )));
        }
    }
    if n <= p {
        return Err(TsirError::NumericDegeneracy(format!(
            "{n} observations cannot identify {p} coefficients"
        )));
    }

    let (xs, ys, scales) = if standardize {
        let (mu_y, sig_y) = column_moments(y.iter().copied(), n);
        if sig_y == 0.0 || !sig_y.is_finite() {
            return Err(TsirError::NumericDegeneracy(
                "response has zero variance".to_string(),
            ));
        }
        let mut xs = x.clone();
        let mut scales = Vec::with_capacity(p);
        for j in 0..p {
            let (mu_x, sig_x) = column_moments(x.column(j).iter().copied(), n);
            if sig_x == 0.0 || !sig_x.is_finite() {
                return Err(TsirError::NumericDegeneracy(format!(
                    "feature {j} has zero variance"
                )));
            }
            for i in 0..n {
                xs[(i, j)] = (x[(i, j)] - mu_x) / sig_x;
            }
            scales.push(sig_y / sig_x);
        }
        let ys = y.map(|v| (v - mu_y) / sig_y);
        (xs, ys, Some(scales))
    } else {
        (x.clone(), y.clone(), None)
    };

    let xtw = DMatrix::from_fn(p, n, |i, j| {
        xs[(j, i)] * weights.map_or(1.0, |w| w[j])
    });
    let xtwx_inv = (&xtw * &xs).try_inverse().ok_or_else(|| {
        TsirError::NumericDegeneracy("normal equations are singular".to_string())
    })?;
    let mut beta = &xtwx_inv * (&xtw * &ys);

    let solved_residual = &ys - &xs * &beta;
    let var = solved_residual.norm_squared() / (n - p) as f64;
    let mut covariance = xtwx_inv * var;

    if let Some(scales) = scales {
        for i in 0..p {
            beta[i] *= scales[i];
            for j in 0..p {
                covariance[(i, j)] *= scales[i] * scales[j];
            }
        }
    }
    let residual = y - x * &beta;

    Ok(LeastSquaresFit {
        coefficients: beta,
        covariance,
        residual,
    })
}

/// Ordinary least squares on the raw inputs.
///
/// # Errors
///
/// See [`weighted_least_squares`].
pub fn ordinary_least_squares(
    x: &DMatrix<f64>,
    y: &DVector<f64>,
) -> Result<LeastSquaresFit, TsirError> {
    weighted_least_squares(x, y, None, false)
}

/// An `n × n` lower-triangular matrix of ones. With `include_diagonal = false` the diagonal is
/// zero as well, so `(A·v)[i] = Σ_{k<i} v[k]`.
#[must_use]
pub fn lower_triangular_ones(n: usize, include_diagonal: bool) -> DMatrix<f64> {
    DMatrix::from_fn(n, n, |i, j| {
        if j < i || (include_diagonal && i == j) {
            1.0
        } else {
            0.0
        }
    })
}

/// Cumulative-sum operator whose first column is zeroed: `(A·v)[i] = Σ_{k=1}^{i} v[k]`.
#[must_use]
pub fn cumulative_operator(n: usize) -> DMatrix<f64> {
    let mut a = lower_triangular_ones(n, true);
    a.column_mut(0).fill(0.0);
    a
}

/// One-hot periodic phase design. Row `r` has a single one in column `(r + offset) % period`,
/// which is the identity block tiled down `rows` rows and shifted by `offset`.
#[must_use]
pub fn phase_design(period: usize, rows: usize, offset: usize) -> DMatrix<f64> {
    DMatrix::from_fn(rows, period, |i, j| {
        if (i + offset) % period == j {
            1.0
        } else {
            0.0
        }
    })
}

/// Design matrix `[1, t]` for `t = 0..n`.
#[must_use]
pub fn linear_trend_design(n: usize) -> DMatrix<f64> {
    DMatrix::from_fn(n, 2, |i, j| if j == 0 { 1.0 } else { i as f64 })
}
