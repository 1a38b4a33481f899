//! Monthly seasonality profiles of the effective reproduction number.
//!
//! For each region the half log case ratio `0.5·(ln(C_{t+1}+1) − ln(C_t+1))` is regressed on
//! a periodic month-of-year indicator under a cyclic second-difference (random walk 2)
//! prior. The prior precision is `D2ᵀD2·(2⁴/4)`, which is the total variation of a sine over
//! one year, so the regression operator `(XᵀX + P)⁻¹` is shared by every region fit on the
//! same window.
//!
//! The log-normal summaries (mean, error, 10th/90th percentiles) and the probability that a
//! month is a low season follow from the posterior mean and variance of each month's
//! log-`R_eff`.

use crate::error::TsirError;
use crate::linalg::phase_design;
use crate::numeric::{normal_cdf, normal_quantile};
use crate::tsir::TsirModel;
use indexmap::IndexMap;
use log::{debug, trace};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

pub const MONTHS: usize = 12;

/// Posterior probability a month must reach to be called a low or high season.
pub const SEASON_THRESHOLD: f64 = 0.8;

const LOW_BAND: f64 = 0.1;
const HIGH_BAND: f64 = 0.9;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeasonClass {
    Low,
    High,
    Transition,
}

impl SeasonClass {
    /// Class of a month with low-season probability `p_low`.
    #[must_use]
    pub fn from_p_low(p_low: f64) -> Self {
        if p_low >= SEASON_THRESHOLD {
            SeasonClass::Low
        } else if 1.0 - p_low >= SEASON_THRESHOLD {
            SeasonClass::High
        } else {
            SeasonClass::Transition
        }
    }
}

/// The fitted profile for one region. Vectors are indexed by month, January first.
#[derive(Clone, Debug)]
pub struct SeasonalProfile {
    pub region: String,
    pub mu: DVector<f64>,
    pub cov: DMatrix<f64>,
    pub sigma: DVector<f64>,
    pub reff: DVector<f64>,
    pub reff_err: DVector<f64>,
    pub reff_low: DVector<f64>,
    pub reff_high: DVector<f64>,
    pub p_low: DVector<f64>,
    /// `ln_cr − X·μ` over the fitting window.
    pub residuals: Vec<f64>,
}

/// A profile evaluated on a fine grid of fractional months in `[1, 13]`.
#[derive(Clone, Debug)]
pub struct InterpolatedProfile {
    pub months: Vec<f64>,
    pub reff: Vec<f64>,
    pub reff_low: Vec<f64>,
    pub reff_high: Vec<f64>,
    pub p_low: Vec<f64>,
}

fn lognormal_band(mu: f64, sigma: f64, q: f64) -> f64 {
    (mu + sigma * normal_quantile(q)).exp()
}

impl SeasonalProfile {
    /// Builds the log-normal summaries from a posterior mean and covariance of log-`R_eff`.
    #[must_use]
    pub fn from_posterior(
        region: &str,
        mu: DVector<f64>,
        cov: DMatrix<f64>,
        residuals: Vec<f64>,
    ) -> Self {
        let sigma = cov.diagonal().map(f64::sqrt);
        let reff = mu.zip_map(&sigma, |m, s| (m + s * s / 2.0).exp());
        let reff_err = sigma.zip_map(&reff, |s, r| ((s * s).exp() - 1.0).sqrt() * r);
        let reff_low = mu.zip_map(&sigma, |m, s| lognormal_band(m, s, LOW_BAND));
        let reff_high = mu.zip_map(&sigma, |m, s| lognormal_band(m, s, HIGH_BAND));
        let p_low = mu.zip_map(&sigma, |m, s| normal_cdf(-m / s));
        SeasonalProfile {
            region: region.to_string(),
            mu,
            cov,
            sigma,
            reff,
            reff_err,
            reff_low,
            reff_high,
            p_low,
            residuals,
        }
    }

    /// Low, high or transition class for each month.
    #[must_use]
    pub fn classify(&self) -> [SeasonClass; MONTHS] {
        let mut classes = [SeasonClass::Transition; MONTHS];
        for (class, p) in classes.iter_mut().zip(self.p_low.iter()) {
            *class = SeasonClass::from_p_low(*p);
        }
        classes
    }

    /// 1-based months classified as high season.
    #[must_use]
    pub fn high_season_months(&self) -> Vec<u32> {
        self.classify()
            .iter()
            .zip(1..)
            .filter(|(c, _)| **c == SeasonClass::High)
            .map(|(_, m)| m)
            .collect()
    }

    /// Evaluates the profile between months with the periodic trigonometric interpolant,
    /// on `points` evenly spaced months from 1 to 13 inclusive.
    #[must_use]
    pub fn interpolate(&self, points: usize) -> InterpolatedProfile {
        let step = if points > 1 {
            MONTHS as f64 / (points - 1) as f64
        } else {
            0.0
        };
        let months: Vec<f64> = (0..points).map(|i| 1.0 + step * i as f64).collect();
        let x = DMatrix::from_fn(points, MONTHS, |i, k| {
            trigonometric_kernel(months[i] - (k + 1) as f64)
        });
        let mu = &x * &self.mu;
        let cov = &x * &self.cov * x.transpose();
        let sigma: Vec<f64> = cov.diagonal().iter().map(|v| v.max(0.0).sqrt()).collect();

        InterpolatedProfile {
            reff: mu
                .iter()
                .zip(&sigma)
                .map(|(m, s)| (m + s * s / 2.0).exp())
                .collect(),
            reff_low: mu
                .iter()
                .zip(&sigma)
                .map(|(m, s)| lognormal_band(*m, *s, LOW_BAND))
                .collect(),
            reff_high: mu
                .iter()
                .zip(&sigma)
                .map(|(m, s)| lognormal_band(*m, *s, HIGH_BAND))
                .collect(),
            p_low: mu
                .iter()
                .zip(&sigma)
                .map(|(m, s)| normal_cdf(-m / s))
                .collect(),
            months,
        }
    }
}

/// `sin(πΔ) / (12·tan(πΔ/12))`, equal to 1 whenever `Δ` is a whole number of years.
fn trigonometric_kernel(delta: f64) -> f64 {
    let denominator = MONTHS as f64 * (PI * delta / MONTHS as f64).tan();
    if denominator.abs() < 1e-12 {
        1.0
    } else {
        (PI * delta).sin() / denominator
    }
}

/// Cyclic random walk 2 prior precision for a period of `n`.
#[must_use]
pub fn cyclic_rw2_precision(n: usize) -> DMatrix<f64> {
    let d2 = DMatrix::from_fn(n, n, |i, j| {
        if i == j {
            -2.0
        } else if (i + 1) % n == j || (j + 1) % n == i {
            1.0
        } else {
            0.0
        }
    });
    d2.transpose() * d2 * (2.0_f64.powi(4) / 4.0)
}

/// Profiles for a set of regions fit on a common window.
#[derive(Clone, Debug)]
pub struct ProfileRegression {
    pub penalty: DMatrix<f64>,
    /// `(XᵀX + P)⁻¹`
    pub operator: DMatrix<f64>,
    pub profiles: IndexMap<String, SeasonalProfile>,
}

impl ProfileRegression {
    /// Fits every region's monthly case series. All series must have the same length and at
    /// least two months, and their first value falls in calendar month `first_month`
    /// (1 is January). Phases are aligned to the calendar, so profile index 0 is always the
    /// January to February growth.
    ///
    /// # Errors
    ///
    /// `InputShapeError` for empty input, a month outside `1..=12`, mismatched lengths, or
    /// negative or non-finite counts. `NumericDegeneracy` if the regression operator cannot
    /// be inverted.
    pub fn fit(first_month: u32, series: &[(&str, &[f64])]) -> Result<Self, TsirError> {
        if !(1..=12).contains(&first_month) {
            return Err(TsirError::InputShapeError(format!(
                "month {first_month} is not a calendar month"
            )));
        }
        let Some((_, first)) = series.first() else {
            return Err(TsirError::InputShapeError(
                "no case series to fit".to_string(),
            ));
        };
        let len = first.len();
        if len < 2 {
            return Err(TsirError::InputShapeError(
                "a profile needs at least two months of cases".to_string(),
            ));
        }
        for (region, cases) in series {
            if cases.len() != len {
                return Err(TsirError::InputShapeError(format!(
                    "{region} has {} months of cases, expected {len}",
                    cases.len()
                )));
            }
            if cases.iter().any(|c| !c.is_finite() || *c < 0.0) {
                return Err(TsirError::InputShapeError(format!(
                    "{region} has negative or non-finite case counts"
                )));
            }
        }
        trace!("fitting seasonality profiles for {} regions", series.len());

        let rows = len - 1;
        let penalty = cyclic_rw2_precision(MONTHS);
        let x = phase_design(MONTHS, rows, first_month as usize - 1);
        let operator = (x.transpose() * &x + &penalty)
            .try_inverse()
            .ok_or_else(|| {
                TsirError::NumericDegeneracy("profile regression operator is singular".to_string())
            })?;
        let dof = (rows + MONTHS - 3) as f64;

        let mut profiles = IndexMap::new();
        for (region, cases) in series {
            let ln_cr = DVector::from_fn(rows, |t, _| {
                0.5 * ((cases[t + 1] + 1.0).ln() - (cases[t] + 1.0).ln())
            });
            let mu = &operator * x.transpose() * &ln_cr;
            let residual = &ln_cr - &x * &mu;
            let prior = (mu.transpose() * &penalty * &mu)[(0, 0)];
            let var = (residual.norm_squared() + prior) / dof;
            let cov = &operator * var;
            let profile =
                SeasonalProfile::from_posterior(region, mu, cov, residual.iter().copied().collect());
            debug!(
                "{region}: high season months {:?}",
                profile.high_season_months()
            );
            profiles.insert((*region).to_string(), profile);
        }

        Ok(ProfileRegression {
            penalty,
            operator,
            profiles,
        })
    }

    #[must_use]
    pub fn profile(&self, region: &str) -> Option<&SeasonalProfile> {
        self.profiles.get(region)
    }
}

/// Relative seasonal `R_eff` implied by a fitted TSIR model: `exp(θ + var/2)` over the
/// periodic coefficients, its log-normal error, and the profile centered on its mean.
#[derive(Clone, Debug)]
pub struct TsirSeasonality {
    pub rel_reff: Vec<f64>,
    pub rel_reff_err: Vec<f64>,
}

#[must_use]
pub fn tsir_seasonality(model: &TsirModel) -> TsirSeasonality {
    let tau = model.periodicity;
    let reff: Vec<f64> = (0..tau)
        .map(|k| (model.params[k] + 0.5 * model.params_cov[(k, k)]).exp())
        .collect();
    let rel_reff_err = (0..tau)
        .map(|k| (model.params_cov[(k, k)].exp() - 1.0).sqrt() * reff[k])
        .collect();
    let mean = reff.iter().sum::<f64>() / tau as f64;
    TsirSeasonality {
        rel_reff: reff.iter().map(|r| r - mean).collect(),
        rel_reff_err,
    }
}
