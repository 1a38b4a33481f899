use crate::error::TsirError;
use crate::linalg::weighted_least_squares;
use crate::panel::TimePanel;
use log::trace;
use nalgebra::{DMatrix, DVector};

/// Reporting rate, susceptible deviation `Z_t` and inferred infections `I_t` from the
/// balance of cumulative births against cumulative cases.
#[derive(Clone, Debug, PartialEq)]
pub struct SusceptibleReconstruction {
    pub reporting_rate: f64,
    pub reporting_rate_var: f64,
    pub z: Vec<f64>,
    pub infections: Vec<f64>,
}

/// Cumulative sum through the campaign survival fractions:
/// `out[0] = v[0]`, `out[r] = (out[r-1] + v[r])·(1 - sia[r-1])`.
fn campaign_adjusted_cumsum(values: &[f64], sia: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    for (r, v) in values.iter().enumerate() {
        let next = match out.last() {
            None => *v,
            Some(previous) => (previous + v) * (1.0 - sia[r - 1]),
        };
        out.push(next);
    }
    out
}

/// Reconstructs susceptibles for a fully observed panel given per-step campaign efficacies.
///
/// Without campaigns the cumulative births are regressed on cumulative cases alone. With
/// campaigns both series are carried through the campaign survival fractions and a second
/// feature, the cumulative campaign removal, makes the mean susceptible level identifiable.
/// A campaign on the final step has no later step to act on and is ignored.
///
/// # Errors
///
/// `InputShapeError` if the panel has unobserved rows, `sia` has the wrong length, or an
/// efficacy is outside `[0, 1)`. `NumericDegeneracy` if the regression cannot be solved.
pub fn reconstruct_susceptibles(
    panel: &TimePanel,
    sia: &[f64],
) -> Result<SusceptibleReconstruction, TsirError> {
    let n = panel.len();
    if panel.n_observed() != n {
        return Err(TsirError::InputShapeError(format!(
            "{}: reconstruction needs case counts on every row",
            panel.region()
        )));
    }
    if sia.len() != n {
        return Err(TsirError::InputShapeError(format!(
            "{}: {} campaign efficacies for {n} rows",
            panel.region(),
            sia.len()
        )));
    }
    if let Some(bad) = sia.iter().find(|s| !(0.0..1.0).contains(*s)) {
        return Err(TsirError::InputShapeError(format!(
            "{}: campaign efficacy {bad} is outside [0, 1)",
            panel.region()
        )));
    }

    let cases_plus: Vec<f64> = panel.cases().iter().map(|c| c + 1.0).collect();
    let births_plus: Vec<f64> = panel.adjusted_births().iter().map(|b| b + 1.0).collect();
    let weights: Vec<f64> = cases_plus.iter().map(|c| 1.0 / c.sqrt()).collect();
    let campaigns = sia[..n.saturating_sub(1)].iter().any(|s| *s != 0.0);
    trace!(
        "{}: reconstructing susceptibles over {n} steps, campaigns: {campaigns}",
        panel.region()
    );

    let (x, y) = if campaigns {
        let removal: Vec<f64> = std::iter::once(0.0)
            .chain(sia[..n - 1].iter().map(|s| s / (1.0 - s)))
            .collect();
        let x0 = campaign_adjusted_cumsum(&cases_plus, sia);
        let x1 = campaign_adjusted_cumsum(&removal, sia);
        let y = campaign_adjusted_cumsum(&births_plus, sia);
        (
            DMatrix::from_fn(n, 2, |i, j| if j == 0 { x0[i] } else { x1[i] }),
            DVector::from_vec(y),
        )
    } else {
        let mut total = 0.0;
        let x0: Vec<f64> = cases_plus
            .iter()
            .map(|c| {
                total += c;
                total
            })
            .collect();
        let mut total = 0.0;
        let y: Vec<f64> = births_plus
            .iter()
            .map(|b| {
                total += b;
                total
            })
            .collect();
        (DMatrix::from_column_slice(n, 1, &x0), DVector::from_vec(y))
    };

    let fit = weighted_least_squares(&x, &y, Some(&weights), true)?;
    let rho = fit.coefficients[0];
    Ok(SusceptibleReconstruction {
        reporting_rate: 1.0 / rho,
        reporting_rate_var: fit.covariance[(0, 0)] / rho.powi(4),
        z: fit.residual.iter().copied().collect(),
        infections: cases_plus.iter().map(|c| rho * c - 1.0).collect(),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::assert_almost_eq;
    use crate::panel::{Frequency, PanelRow};
    use chrono::NaiveDate;

    fn panel(cases: &[f64], births: &[f64]) -> TimePanel {
        let start = NaiveDate::from_ymd_opt(2010, 1, 15).unwrap();
        let dates = Frequency::Monthly.range(start, NaiveDate::from_ymd_opt(2100, 1, 1).unwrap());
        let rows = cases
            .iter()
            .zip(births)
            .zip(dates)
            .map(|((c, b), date)| PanelRow {
                date,
                cases: Some(*c),
                adjusted_births: *b,
                target_fraction: 0.0,
            })
            .collect();
        TimePanel::new("test", Frequency::Monthly, rows).unwrap()
    }

    #[test]
    fn adjusted_cumsum_matches_the_dense_operator() {
        let v = [1.0, 2.0, 3.0, 4.0];
        let sia = [0.5, 0.0, 0.25, 0.9];
        let out = campaign_adjusted_cumsum(&v, &sia);
        assert_eq!(out[0], 1.0);
        assert_almost_eq!(out[1], 3.0 * 0.5, 1e-12);
        assert_almost_eq!(out[2], 4.5 * 1.0, 1e-12);
        assert_almost_eq!(out[3], 8.5 * 0.75, 1e-12);
        assert_eq!(campaign_adjusted_cumsum(&v, &[0.0; 4]), vec![1.0, 3.0, 6.0, 10.0]);
    }

    #[test]
    fn reporting_rate_without_campaigns() {
        // Cases are a fixed fraction of births, so cumulative births are an exact multiple
        // of cumulative cases.
        let births: Vec<f64> = (0..60).map(|t| 400.0 + 50.0 * (t as f64 * 0.5).sin()).collect();
        let cases: Vec<f64> = births.iter().map(|b| 0.25 * (b + 1.0) - 1.0).collect();
        let result = reconstruct_susceptibles(&panel(&cases, &births), &[0.0; 60]).unwrap();
        assert_almost_eq!(result.reporting_rate, 0.25, 1e-9);
        assert!(result.reporting_rate_var >= 0.0);
        for z in &result.z {
            assert_almost_eq!(*z, 0.0, 1e-6);
        }
        for (i, b) in result.infections.iter().zip(&births) {
            assert_almost_eq!(*i, *b, 1e-6);
        }
    }

    #[test]
    fn campaigns_enter_as_a_second_feature() {
        let births: Vec<f64> = (0..60).map(|t| 400.0 + 50.0 * (t as f64 * 0.5).sin()).collect();
        let cases: Vec<f64> = (0..60).map(|t| 100.0 + 30.0 * (t as f64 * 0.3).cos()).collect();
        let mut sia = vec![0.0; 60];
        sia[30] = 0.4;
        let result = reconstruct_susceptibles(&panel(&cases, &births), &sia).unwrap();
        assert!(result.reporting_rate > 0.0);
        assert_eq!(result.z.len(), 60);

        // A campaign on the last step does not count.
        let mut late = vec![0.0; 60];
        late[59] = 0.4;
        let unadjusted = reconstruct_susceptibles(&panel(&cases, &births), &[0.0; 60]).unwrap();
        let result = reconstruct_susceptibles(&panel(&cases, &births), &late).unwrap();
        assert_eq!(result, unadjusted);
    }

    #[test]
    fn rejects_bad_efficacies_and_lengths() {
        let births = vec![100.0; 10];
        let cases = vec![10.0; 10];
        let p = panel(&cases, &births);
        assert!(matches!(
            reconstruct_susceptibles(&p, &[0.0; 9]),
            Err(TsirError::InputShapeError(_))
        ));
        let mut sia = vec![0.0; 10];
        sia[3] = 1.0;
        assert!(reconstruct_susceptibles(&p, &sia).is_err());
    }
}
