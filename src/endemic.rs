//! Susceptibility estimates that assume the seasonal cycle is stable.
//!
//! If a region's seasonal profile repeats year after year, the births that enter the
//! susceptible pool must on average balance the infections the profile implies. The
//! cumulative endemic burden over one (or several) years is therefore a proxy for the
//! demographic pressure, and a straight-line fit to it gives an intercept and a slope.
//! Subtracting the cumulative cases and campaign doses actually observed from that pressure
//! leaves the relative susceptibility.

use crate::error::TsirError;
use crate::linalg::{cumulative_operator, linear_trend_design, lower_triangular_ones};
use crate::seasonality::{SeasonalProfile, MONTHS};
use log::{debug, trace, warn};
use nalgebra::{DMatrix, DVector};

/// Intercept and slope of the linear demographic pressure.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DemographicPressure {
    pub intercept: f64,
    pub slope: f64,
}

impl DemographicPressure {
    #[must_use]
    pub fn at(&self, t: usize) -> f64 {
        self.intercept + self.slope * t as f64
    }
}

/// Relative susceptibility reconstructed from demographic pressure, cumulative cases and
/// cumulative campaign doses. `thetas` holds the case coefficient first and, when the window
/// contains campaigns, the dose coefficient second.
#[derive(Clone, Debug)]
pub struct SusceptibilityReconstruction {
    pub success: bool,
    pub thetas: Vec<f64>,
    pub theta_cov: DMatrix<f64>,
    pub vol_scale: f64,
    pub z: Vec<f64>,
    pub z_err: Vec<f64>,
}

/// The endemic decomposition `rel_S = X·α − A1·gf`.
#[derive(Clone, Debug)]
pub struct EndemicSusceptibility {
    pub pressure: DemographicPressure,
    /// Cumulative endemic burden `A1·gf`.
    pub burden: Vec<f64>,
    /// Implied linear pressure `X·α`.
    pub implied_pressure: Vec<f64>,
    pub relative: Vec<f64>,
}

/// Post-training linear extrapolation of the relative susceptibility.
#[derive(Clone, Debug)]
pub struct SusceptibilityForecast {
    pub z: Vec<f64>,
    pub z_err: Vec<f64>,
}

fn tile(values: &DVector<f64>, extent: usize) -> DVector<f64> {
    let n = values.len();
    DVector::from_fn(n * extent, |i, _| values[i % n])
}

fn fit_pressure(gf: &DVector<f64>) -> Result<(DemographicPressure, DVector<f64>), TsirError> {
    let n = gf.len();
    let burden = cumulative_operator(n) * gf;
    let x = linear_trend_design(n);
    let xtx_inv = (x.transpose() * &x).try_inverse().ok_or_else(|| {
        TsirError::NumericDegeneracy("trend design is singular".to_string())
    })?;
    let alphas = xtx_inv * x.transpose() * &burden;
    Ok((
        DemographicPressure {
            intercept: alphas[0],
            slope: alphas[1],
        },
        burden,
    ))
}

/// Demographic pressure implied by a stable seasonal cycle.
///
/// The infection Green's function is `gf = exp(A0·(2μ + σ²))` with `A0` the strictly
/// lower-triangular ones, repeated `stability_extent` years. The pressure is the linear
/// fit to its cumulative sum.
///
/// # Errors
///
/// `InputShapeError` if `stability_extent` is zero.
pub fn demographic_pressure(
    profile: &SeasonalProfile,
    stability_extent: usize,
) -> Result<DemographicPressure, TsirError> {
    if stability_extent == 0 {
        return Err(TsirError::InputShapeError(
            "stability extent must be at least one year".to_string(),
        ));
    }
    let a0 = lower_triangular_ones(MONTHS, false);
    let exponent = profile.mu.zip_map(&profile.sigma, |m, s| 2.0 * m + s * s);
    let gf = (a0 * exponent).map(f64::exp);
    let (pressure, _) = fit_pressure(&tile(&gf, stability_extent))?;
    debug!(
        "{}: demographic pressure intercept {:.4}, slope {:.4}",
        profile.region, pressure.intercept, pressure.slope
    );
    Ok(pressure)
}

/// Covariance-aware endemic decomposition. The Green's function uses the full posterior
/// covariance, `exp(A0·2μ + ½·diag(A0·4Σ·A0ᵀ))`.
///
/// # Errors
///
/// `InputShapeError` if `stability_extent` is zero.
pub fn endemic_relative_susceptibility(
    profile: &SeasonalProfile,
    stability_extent: usize,
) -> Result<EndemicSusceptibility, TsirError> {
    if stability_extent == 0 {
        return Err(TsirError::InputShapeError(
            "stability extent must be at least one year".to_string(),
        ));
    }
    let a0 = lower_triangular_ones(MONTHS, false);
    let mean = &a0 * (&profile.mu * 2.0);
    let var = (&a0 * (&profile.cov * 4.0) * a0.transpose()).diagonal();
    let gf = mean.zip_map(&var, |m, v| (m + 0.5 * v).exp());
    let (pressure, burden) = fit_pressure(&tile(&gf, stability_extent))?;

    let implied_pressure: Vec<f64> = (0..burden.len()).map(|t| pressure.at(t)).collect();
    let relative = implied_pressure
        .iter()
        .zip(burden.iter())
        .map(|(p, b)| p - b)
        .collect();
    Ok(EndemicSusceptibility {
        pressure,
        burden: burden.iter().copied().collect(),
        implied_pressure,
        relative,
    })
}

/// Reconstructs relative susceptibility over a monthly window.
///
/// `cases` and `doses` (campaign doses, conventionally in millions) cover the window;
/// `residuals` are the seasonality model residuals over all but the last month. The result
/// has one entry per month except the last.
///
/// # Errors
///
/// `InputShapeError` on mismatched lengths or windows shorter than three months,
/// `NumericDegeneracy` if the cumulative design is singular.
pub fn relative_susceptibility(
    pressure: &DemographicPressure,
    cases: &[f64],
    doses: &[f64],
    residuals: &[f64],
) -> Result<SusceptibilityReconstruction, TsirError> {
    let n = cases.len();
    if n < 3 {
        return Err(TsirError::InputShapeError(
            "relative susceptibility needs at least three months".to_string(),
        ));
    }
    if doses.len() != n || residuals.len() != n - 1 {
        return Err(TsirError::InputShapeError(format!(
            "{n} months of cases with {} months of doses and {} residuals",
            doses.len(),
            residuals.len()
        )));
    }
    trace!("reconstructing relative susceptibility over {n} months");

    let m = n - 1;
    let a1 = cumulative_operator(m);
    let demo = DVector::from_fn(m, |t, _| pressure.at(t));
    let cum_cases = &a1 * DVector::from_column_slice(&cases[1..]);
    let cum_doses = &a1 * DVector::from_column_slice(&doses[..m]);
    let campaigns = cum_doses.iter().any(|d| *d != 0.0);
    let xr = if campaigns {
        DMatrix::from_columns(&[cum_cases, cum_doses])
    } else {
        DMatrix::from_columns(&[cum_cases])
    };

    let inv = (xr.transpose() * &xr).try_inverse().ok_or_else(|| {
        TsirError::NumericDegeneracy("cumulative case design is singular".to_string())
    })?;
    let thetas = &inv * xr.transpose() * &demo;
    let mut z = &demo - &xr * &thetas;
    let theta_cov = inv * (z.norm_squared() / m as f64);
    let mut z_err: Vec<f64> = xr
        .row_iter()
        .map(|row| (&row * &theta_cov * row.transpose())[(0, 0)].max(0.0).sqrt())
        .collect();

    let vol_scale = z
        .iter()
        .zip(residuals)
        .map(|(z, r)| z * (r.exp() - 1.0))
        .sum::<f64>()
        / z.norm_squared();
    z *= vol_scale;
    for e in &mut z_err {
        *e *= vol_scale;
    }

    let success = thetas.iter().all(|t| *t > 0.0) && vol_scale > 0.0;
    if !success {
        warn!("relative susceptibility is unstable: thetas {thetas:?}, volatility scale {vol_scale}");
    }
    Ok(SusceptibilityReconstruction {
        success,
        thetas: thetas.iter().copied().collect(),
        theta_cov,
        vol_scale,
        z: z.iter().copied().collect(),
        z_err,
    })
}

/// Extends a reconstruction past its window. `future_doses[0]` is the last month of the
/// window; each later month adds `slope·vol_scale` and removes the scaled cumulative doses.
/// The error band stays at the last reconstructed error.
#[must_use]
pub fn forecast(
    reconstruction: &SusceptibilityReconstruction,
    pressure: &DemographicPressure,
    future_doses: &[f64],
) -> SusceptibilityForecast {
    let z_last = reconstruction.z.last().copied().unwrap_or(0.0);
    let err_last = reconstruction.z_err.last().copied().unwrap_or(0.0);
    let theta_doses = reconstruction.thetas.get(1).copied().unwrap_or(0.0);
    let vol = reconstruction.vol_scale;

    let mut cumulative = future_doses.first().copied().unwrap_or(0.0);
    let mut z = Vec::with_capacity(future_doses.len().saturating_sub(1));
    for (k, doses) in future_doses.iter().enumerate().skip(1) {
        cumulative += doses;
        z.push(z_last + k as f64 * pressure.slope * vol - vol * cumulative * theta_doses);
    }
    let z_err = vec![err_last; z.len()];
    SusceptibilityForecast { z, z_err }
}
