#![allow(clippy::approx_constant)]
//! Floating point helpers and the small set of summary statistics used across the crate.
//!
//! `almost_eq` is a convenience wrapper around the approx crate. The error function and its
//! inverse come from statrs; everything here works on plain `f64` slices.

use approx::AbsDiffEq;
use statrs::function::erf::{erf, erf_inv};
use std::f64::consts::SQRT_2;

/// Targeted accuracy instantiated over `f64`
pub const ACC: f64 = 10e-11;

/// Compares if two floats are close via `approx::abs_diff_eq` using a maximum absolute difference
/// (epsilon) of `acc`.
#[must_use]
pub fn almost_eq(a: f64, b: f64, acc: f64) -> bool {
    if a.is_infinite() && b.is_infinite() {
        return a == b;
    }
    a.abs_diff_eq(&b, acc)
}

/// Arithmetic mean. Returns NaN for an empty slice.
#[must_use]
pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (`ddof = 0`).
#[must_use]
pub fn std(values: &[f64]) -> f64 {
    let mu = mean(values);
    let ss: f64 = values.iter().map(|v| (v - mu).powi(2)).sum();
    (ss / values.len() as f64).sqrt()
}

/// The `q`-th percentile (`q` in [0, 100]) using linear interpolation between the closest
/// ranks. NaN values sort last.
#[must_use]
pub fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    percentile_of_sorted(&sorted, q)
}

/// Same as [`percentile`] but for data that is already sorted ascending.
#[must_use]
pub fn percentile_of_sorted(sorted: &[f64], q: f64) -> f64 {
    let position = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

/// Coefficient of determination of `predicted` against `observed`.
///
/// A constant `observed` series scores 1.0 when matched exactly and 0.0 otherwise.
#[must_use]
pub fn r2_score(observed: &[f64], predicted: &[f64]) -> f64 {
    let mu = mean(observed);
    let ss_res: f64 = observed
        .iter()
        .zip(predicted)
        .map(|(o, p)| (o - p).powi(2))
        .sum();
    let ss_tot: f64 = observed.iter().map(|o| (o - mu).powi(2)).sum();
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

/// Standard normal cumulative distribution function.
#[must_use]
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / SQRT_2))
}

/// Standard normal quantile for probability `p` in (0, 1).
#[must_use]
pub fn normal_quantile(p: f64) -> f64 {
    SQRT_2 * erf_inv(2.0 * p - 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_almost_eq;

    #[test]
    fn almost_eq_within_tolerance() {
        let a = 1.0;
        let b = 1.0 + 0.5e-11;
        // within ACC = 10e-11
        assert!(almost_eq(a, b, ACC));
    }

    #[test]
    fn almost_eq_outside_tolerance() {
        let a = 1.0;
        let b = 1.0 + 2e-10;
        assert!(!almost_eq(a, b, ACC));
    }

    #[test]
    fn almost_eq_infinities() {
        assert!(almost_eq(f64::INFINITY, f64::INFINITY, ACC));
        assert!(!almost_eq(f64::INFINITY, f64::NEG_INFINITY, ACC));
    }

    #[test]
    fn mean_and_population_std() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_almost_eq!(mean(&values), 5.0, ACC);
        assert_almost_eq!(std(&values), 2.0, ACC);
    }

    #[test]
    fn percentile_interpolates_between_ranks() {
        let values = [4.0, 1.0, 3.0, 2.0];
        assert_almost_eq!(percentile(&values, 0.0), 1.0, ACC);
        assert_almost_eq!(percentile(&values, 50.0), 2.5, ACC);
        assert_almost_eq!(percentile(&values, 100.0), 4.0, ACC);
        // position = 0.1 * 3 = 0.3
        assert_almost_eq!(percentile(&values, 10.0), 1.3, 1e-12);
        assert!(percentile(&[], 50.0).is_nan());
    }

    #[test]
    fn r2_of_perfect_and_mean_predictions() {
        let observed = [1.0, 2.0, 3.0, 4.0];
        assert_almost_eq!(r2_score(&observed, &observed), 1.0, ACC);
        assert_almost_eq!(r2_score(&observed, &[2.5; 4]), 0.0, ACC);
        assert!(r2_score(&observed, &[10.0; 4]) < 0.0);
        assert_almost_eq!(r2_score(&[3.0; 3], &[3.0; 3]), 1.0, ACC);
    }

    #[test]
    fn normal_cdf_and_quantile_agree() {
        assert_almost_eq!(normal_cdf(0.0), 0.5, 1e-12);
        assert_almost_eq!(normal_cdf(1.959_963_984_540_054), 0.975, 1e-9);
        assert_almost_eq!(normal_quantile(0.9), 1.281_551_565_545, 1e-9);
        assert_almost_eq!(normal_quantile(0.1), -1.281_551_565_545, 1e-9);
        for p in [0.05, 0.3, 0.5, 0.8] {
            assert_almost_eq!(normal_cdf(normal_quantile(p)), p, 1e-9);
        }
    }

    #[test]
    fn assert_almost_eq_macro_passes() {
        assert_almost_eq!(3.14159265, 3.14159264, 1e-7);
    }

    #[test]
    #[should_panic(expected = "assertion failed")]
    fn assert_almost_eq_macro_panics() {
        assert_almost_eq!(1.0, 1.001, 1e-4);
    }
}
