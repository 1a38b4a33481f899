use crate::error::TsirError;
use crate::linalg::{ordinary_least_squares, phase_design};
use log::{debug, trace};
use nalgebra::{DMatrix, DVector};

/// A fitted TSIR transmission model.
///
/// `params` holds the log seasonal transmission rates first (one per phase), then the mixing
/// exponent `alpha`, then the inverse mean susceptible population. `beta` is the seasonal
/// transmission rate per susceptible, `exp(θ_k)/S̄`.
#[derive(Clone, Debug, PartialEq)]
pub struct TsirModel {
    pub params: DVector<f64>,
    pub params_cov: DMatrix<f64>,
    pub beta: Vec<f64>,
    pub beta_std: Vec<f64>,
    pub alpha: f64,
    pub alpha_std: f64,
    pub s_bar: f64,
    pub s_bar_std: f64,
    pub std_log_e: f64,
    pub scale_factor: f64,
    pub periodicity: usize,
}

impl TsirModel {
    /// Expected infections at `step` given the previous step's susceptibles and infections.
    #[must_use]
    pub fn intensity(&self, step: usize, susceptibles: f64, infections: f64) -> f64 {
        self.scale_factor
            * self.beta[step % self.periodicity]
            * susceptibles
            * infections.powf(self.alpha)
    }

    /// Deterministic trajectory from the given initial conditions. `births` and `sia` set the
    /// length; campaigns at step `i - 1` act on the susceptibles at step `i`.
    #[must_use]
    pub fn skeleton(
        &self,
        initial_infections: f64,
        initial_susceptibles: f64,
        births: &[f64],
        sia: &[f64],
    ) -> (Vec<f64>, Vec<f64>) {
        let n = births.len().min(sia.len());
        let mut infections = Vec::with_capacity(n);
        let mut susceptibles = Vec::with_capacity(n);
        if n == 0 {
            return (infections, susceptibles);
        }
        infections.push(initial_infections);
        susceptibles.push(initial_susceptibles);
        for i in 1..n {
            let s_prev = susceptibles[i - 1];
            let infected = self.intensity(i, s_prev, infections[i - 1]);
            infections.push(infected);
            susceptibles.push((s_prev + births[i] - infected) * (1.0 - sia[i - 1]));
        }
        (infections, susceptibles)
    }
}

/// Log-linear regression of `ln I_t` on the phase of `t`, `ln I_{t-1}` and `Z_{t-1}`.
///
/// # Errors
///
/// `InputShapeError` when `z` and `infections` differ in length or `periodicity` is zero.
/// `NumericDegeneracy` when an inferred infection count is not positive, or there are too
/// few steps for `periodicity + 2` coefficients.
pub fn transmission_regression(
    z: &[f64],
    infections: &[f64],
    periodicity: usize,
) -> Result<TsirModel, TsirError> {
    if z.len() != infections.len() {
        return Err(TsirError::InputShapeError(format!(
            "{} susceptible deviations for {} infection counts",
            z.len(),
            infections.len()
        )));
    }
    if periodicity == 0 {
        return Err(TsirError::InputShapeError(
            "periodicity must be positive".to_string(),
        ));
    }
    if let Some(bad) = infections.iter().position(|i| *i <= 0.0 || !i.is_finite()) {
        return Err(TsirError::NumericDegeneracy(format!(
            "inferred infections at step {bad} are {}, logs are undefined",
            infections[bad]
        )));
    }
    if infections.len() < 2 {
        return Err(TsirError::NumericDegeneracy(
            "transmission regression needs at least two steps".to_string(),
        ));
    }
    let rows = infections.len() - 1;
    let p = periodicity + 2;
    trace!("transmission regression over {rows} steps with {p} coefficients");

    let phases = phase_design(periodicity, rows, 1);
    let x = DMatrix::from_fn(rows, p, |i, j| {
        if j < periodicity {
            phases[(i, j)]
        } else if j == periodicity {
            infections[i].ln()
        } else {
            z[i]
        }
    });
    let y = DVector::from_fn(rows, |i, _| infections[i + 1].ln());
    let fit = ordinary_least_squares(&x, &y)?;
    let var = fit.residual_sum_of_squares() / (rows - p) as f64;

    let params = fit.coefficients;
    let cov = fit.covariance;
    let inv_s_bar = params[periodicity + 1];
    let s_bar = 1.0 / inv_s_bar;
    let beta = (0..periodicity)
        .map(|k| params[k].exp() * inv_s_bar)
        .collect();
    let beta_std = (0..periodicity)
        .map(|k| {
            let sig2 = cov[(k, k)] + cov[(periodicity + 1, periodicity + 1)] / (s_bar * s_bar);
            params[k].exp() * sig2.sqrt() / s_bar
        })
        .collect();

    let model = TsirModel {
        alpha: params[periodicity],
        alpha_std: cov[(periodicity, periodicity)].sqrt(),
        s_bar,
        s_bar_std: cov[(periodicity + 1, periodicity + 1)].sqrt() / (inv_s_bar * inv_s_bar),
        std_log_e: var.sqrt(),
        scale_factor: 1.0,
        periodicity,
        beta,
        beta_std,
        params,
        params_cov: cov,
    };
    debug!(
        "transmission fit: alpha {:.4} ± {:.4}, S_bar {:.1} ± {:.1}, std(log E) {:.4}",
        model.alpha, model.alpha_std, model.s_bar, model.s_bar_std, model.std_log_e
    );
    Ok(model)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::assert_almost_eq;
    use std::f64::consts::PI;

    /// Log infections that follow the regression exactly.
    fn linearized_series(n: usize, periodicity: usize) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let b: Vec<f64> = (0..periodicity)
            .map(|k| 0.03 * 1000.0_f64.ln() + 0.2 * (2.0 * PI * k as f64 / periodicity as f64).sin())
            .collect();
        let z: Vec<f64> = (0..n).map(|t| 500.0 * (0.37 * t as f64).sin()).collect();
        let mut ln_i = vec![5.0];
        for t in 1..n {
            ln_i.push(b[t % periodicity] + 0.97 * ln_i[t - 1] + z[t - 1] / 50_000.0);
        }
        (b, z, ln_i.iter().map(|v| v.exp()).collect())
    }

    #[test]
    fn recovers_generating_parameters() {
        let (b, z, infections) = linearized_series(120, 12);
        let model = transmission_regression(&z, &infections, 12).unwrap();
        assert_almost_eq!(model.alpha, 0.97, 1e-8);
        assert_almost_eq!(model.s_bar, 50_000.0, 1e-3);
        for k in 0..12 {
            assert_almost_eq!(model.params[k], b[k], 1e-8);
            assert_almost_eq!(model.beta[k], b[k].exp() / 50_000.0, 1e-12);
        }
        assert!(model.std_log_e < 1e-8);
        assert_eq!(model.scale_factor, 1.0);
        assert_eq!(model.params_cov.shape(), (14, 14));
    }

    #[test]
    fn non_positive_infections_are_degenerate() {
        let z = vec![0.0; 40];
        let mut infections = vec![10.0; 40];
        infections[7] = 0.0;
        assert!(matches!(
            transmission_regression(&z, &infections, 4),
            Err(TsirError::NumericDegeneracy(_))
        ));
    }

    #[test]
    fn too_few_steps_are_degenerate() {
        let (_, z, infections) = linearized_series(10, 12);
        assert!(matches!(
            transmission_regression(&z, &infections, 12),
            Err(TsirError::NumericDegeneracy(_))
        ));
    }

    #[test]
    fn skeleton_applies_campaigns_to_next_step() {
        let model = TsirModel {
            params: DVector::zeros(3),
            params_cov: DMatrix::zeros(3, 3),
            beta: vec![0.001],
            beta_std: vec![0.0],
            alpha: 1.0,
            alpha_std: 0.0,
            s_bar: 1000.0,
            s_bar_std: 0.0,
            std_log_e: 0.0,
            scale_factor: 1.0,
            periodicity: 1,
        };
        let (i, s) = model.skeleton(10.0, 1000.0, &[0.0, 5.0, 5.0], &[0.0, 0.5, 0.0]);
        assert_almost_eq!(i[1], 10.0, 1e-12);
        assert_almost_eq!(s[1], 995.0, 1e-12);
        assert_almost_eq!(i[2], 0.001 * 995.0 * 10.0, 1e-12);
        assert_almost_eq!(s[2], (995.0 + 5.0 - i[2]) * 0.5, 1e-12);
    }
}
