use crate::error::TsirError;
use crate::numeric::r2_score;
use crate::optimize::{LbfgsbOptimizer, ObjectiveFunction, OptimizationResult, OptimizerConfig};
use crate::panel::{AugmentedPanel, AugmentedRow, TimePanel};
use crate::parameters::Parameters;
use crate::tsir::reconstruction::{reconstruct_susceptibles, SusceptibleReconstruction};
use crate::tsir::transmission::{transmission_regression, TsirModel};
use log::{info, trace, warn};
use serde::{Deserialize, Serialize};

/// How well a skeleton tracks the reconstructed infections.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    /// Coefficient of determination.
    #[default]
    RSquared,
    /// Negative half sum of squared errors.
    MeanSquaredError,
}

/// Scores a vector of per-campaign efficacies by refitting the model with them and comparing
/// its deterministic skeleton with the reconstructed infections.
pub struct SkeletonObjective<'a> {
    panel: &'a TimePanel,
    campaign_rows: Vec<usize>,
    periodicity: usize,
    criterion: Criterion,
    cutoff: usize,
}

struct Evaluation {
    sia: Vec<f64>,
    reconstruction: SusceptibleReconstruction,
    model: TsirModel,
    score: f64,
}

impl<'a> SkeletonObjective<'a> {
    /// `panel` must be fully observed. Every row with a nonzero campaign fraction gets one
    /// efficacy parameter.
    #[must_use]
    pub fn new(
        panel: &'a TimePanel,
        periodicity: usize,
        criterion: Criterion,
        cutoff: usize,
    ) -> Self {
        let campaign_rows = panel
            .rows()
            .iter()
            .enumerate()
            .filter(|(_, r)| r.target_fraction != 0.0)
            .map(|(i, _)| i)
            .collect();
        SkeletonObjective {
            panel,
            campaign_rows,
            periodicity,
            criterion,
            cutoff,
        }
    }

    #[must_use]
    pub fn num_parameters(&self) -> usize {
        self.campaign_rows.len()
    }

    /// Per-row campaign efficacy: `theta · target_fraction` on campaign rows, zero elsewhere.
    #[must_use]
    pub fn sia_for(&self, theta: &[f64]) -> Vec<f64> {
        let mut sia = vec![0.0; self.panel.len()];
        let rows = self.panel.rows();
        for (row, efficacy) in self.campaign_rows.iter().zip(theta) {
            sia[*row] = efficacy * rows[*row].target_fraction;
        }
        sia
    }

    fn evaluation(&self, theta: &[f64]) -> Result<Evaluation, TsirError> {
        let sia = self.sia_for(theta);
        let reconstruction = reconstruct_susceptibles(self.panel, &sia)?;
        let model =
            transmission_regression(&reconstruction.z, &reconstruction.infections, self.periodicity)?;
        let (skeleton, _) = model.skeleton(
            reconstruction.infections[0],
            model.s_bar + reconstruction.z[0],
            &self.panel.adjusted_births(),
            &sia,
        );
        let cutoff = self.cutoff.min(skeleton.len());
        let observed = &reconstruction.infections[cutoff..];
        let predicted = &skeleton[cutoff..];
        let score = match self.criterion {
            Criterion::RSquared => r2_score(observed, predicted),
            Criterion::MeanSquaredError => {
                -0.5 * observed
                    .iter()
                    .zip(predicted)
                    .map(|(o, p)| (o - p).powi(2))
                    .sum::<f64>()
            }
        };
        Ok(Evaluation {
            sia,
            reconstruction,
            model,
            score,
        })
    }

    /// The skeleton score for `theta`; larger is better.
    ///
    /// # Errors
    ///
    /// Whatever the reconstruction or the transmission regression reports for these
    /// efficacies.
    pub fn score(&self, theta: &[f64]) -> Result<f64, TsirError> {
        self.evaluation(theta).map(|e| e.score)
    }
}

impl ObjectiveFunction for SkeletonObjective<'_> {
    fn evaluate(&self, x: &[f64]) -> f64 {
        match self.score(x) {
            Ok(score) if score.is_finite() => -score,
            Ok(_) => f64::INFINITY,
            Err(e) => {
                trace!("efficacies {x:?} cannot be evaluated: {e}");
                f64::INFINITY
            }
        }
    }
}

/// The outcome of fitting one region.
#[derive(Clone, Debug)]
pub struct TsirFit {
    /// The fitted rows with campaign efficacy, `Z_t` and `I_t` filled in.
    pub panel: AugmentedPanel,
    pub model: TsirModel,
    pub reporting_rate: f64,
    pub reporting_rate_var: f64,
    /// One efficacy per campaign, in date order.
    pub efficacies: Vec<f64>,
    pub convergence: OptimizationResult,
    pub skeleton_score: f64,
}

/// Fits campaign efficacies and the transmission model for a region.
#[derive(Clone, Debug)]
pub struct TsirFitter {
    pub periodicity: usize,
    pub initial_efficacy: f64,
    pub efficacy_upper_bound: f64,
    pub criterion: Criterion,
    pub cutoff: usize,
    pub optimizer: OptimizerConfig,
}

impl Default for TsirFitter {
    fn default() -> Self {
        TsirFitter::new(24)
    }
}

impl TsirFitter {
    #[must_use]
    pub fn new(periodicity: usize) -> Self {
        TsirFitter {
            periodicity,
            initial_efficacy: 0.25,
            efficacy_upper_bound: 0.999,
            criterion: Criterion::RSquared,
            cutoff: 0,
            optimizer: OptimizerConfig::default(),
        }
    }

    #[must_use]
    pub fn from_parameters(parameters: &Parameters) -> Self {
        TsirFitter {
            periodicity: parameters.periodicity,
            initial_efficacy: parameters.initial_efficacy,
            efficacy_upper_bound: parameters.efficacy_upper_bound,
            criterion: parameters.criterion,
            cutoff: parameters.skeleton_cutoff,
            optimizer: OptimizerConfig::default(),
        }
    }

    /// Fits the observed rows of `panel`.
    ///
    /// Regions without campaigns have nothing to optimize: the direct reconstruction is used
    /// and the result is marked converged. Optimizer non-convergence is logged and reported on
    /// `TsirFit::convergence`, not raised.
    ///
    /// # Errors
    ///
    /// `InputShapeError` if the panel has no observed rows, and any error from the final
    /// reconstruction or transmission regression.
    pub fn fit(&self, panel: &TimePanel) -> Result<TsirFit, TsirError> {
        let observed = panel.observed();
        if observed.is_empty() {
            return Err(TsirError::InputShapeError(format!(
                "{} has no observed cases",
                panel.region()
            )));
        }
        if self.periodicity != panel.frequency().periods_per_year() {
            warn!(
                "{}: periodicity {} differs from the {} steps per year of the panel",
                panel.region(),
                self.periodicity,
                panel.frequency().periods_per_year()
            );
        }

        let objective = SkeletonObjective::new(&observed, self.periodicity, self.criterion, self.cutoff);
        let num_parameters = objective.num_parameters();
        let convergence = if num_parameters == 0 {
            let fun = objective.evaluate(&[]);
            OptimizationResult {
                x: vec![],
                fun,
                iterations: 0,
                evaluations: 1,
                converged: true,
                message: "no campaigns to fit".to_string(),
            }
        } else {
            let x0 = vec![self.initial_efficacy; num_parameters];
            let bounds = vec![(0.0, self.efficacy_upper_bound); num_parameters];
            LbfgsbOptimizer::new(self.optimizer).minimize(&objective, &x0, &bounds)?
        };
        if !convergence.converged {
            warn!(
                "{}: efficacy fit did not converge ({})",
                panel.region(),
                convergence.message
            );
        }

        let Evaluation {
            sia,
            reconstruction,
            model,
            score,
        } = objective.evaluation(&convergence.x)?;
        info!(
            "{}: {} campaigns, reporting rate {:.4}, skeleton score {:.4}",
            panel.region(),
            num_parameters,
            reconstruction.reporting_rate,
            score
        );

        let rows = observed
            .rows()
            .iter()
            .enumerate()
            .map(|(i, row)| AugmentedRow {
                date: row.date,
                cases: row.cases,
                adjusted_births: row.adjusted_births,
                target_fraction: row.target_fraction,
                sia: sia[i],
                z: Some(reconstruction.z[i]),
                infections: Some(reconstruction.infections[i]),
            })
            .collect();

        Ok(TsirFit {
            panel: AugmentedPanel {
                region: panel.region().to_string(),
                frequency: panel.frequency(),
                rows,
            },
            model,
            reporting_rate: reconstruction.reporting_rate,
            reporting_rate_var: reconstruction.reporting_rate_var,
            efficacies: convergence.x.clone(),
            convergence,
            skeleton_score: score,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::assert_almost_eq;
    use crate::panel::{Frequency, PanelRow};
    use chrono::NaiveDate;
    use std::f64::consts::PI;

    /// Cases from a deterministic TSIR run with one campaign of efficacy `efficacy` at
    /// step `campaign`, reported at 40%.
    fn simulated_panel(efficacy: f64, campaign: Option<usize>) -> TimePanel {
        let n = 144;
        let (s_bar, i_star, alpha): (f64, f64, f64) = (30_000.0, 2000.0, 0.97);
        let beta: Vec<f64> = (0..12)
            .map(|k| (0.1 * (2.0 * PI * k as f64 / 12.0).sin()).exp() * i_star.powf(1.0 - alpha) / s_bar)
            .collect();
        let mut target = vec![0.0; n];
        if let Some(c) = campaign {
            target[c] = 1.0;
        }
        let mut infections = vec![i_star];
        let mut susceptibles = vec![s_bar];
        for t in 1..n {
            let i = beta[t % 12] * susceptibles[t - 1] * infections[t - 1].powf(alpha);
            infections.push(i);
            susceptibles.push((susceptibles[t - 1] + i_star - i) * (1.0 - efficacy * target[t - 1]));
        }
        let start = NaiveDate::from_ymd_opt(2010, 1, 15).unwrap();
        let dates = Frequency::Monthly.range(start, NaiveDate::from_ymd_opt(2030, 1, 1).unwrap());
        let rows = (0..n)
            .map(|t| PanelRow {
                date: dates[t],
                cases: Some(0.4 * infections[t]),
                adjusted_births: i_star,
                target_fraction: target[t],
            })
            .collect();
        TimePanel::new("simulated", Frequency::Monthly, rows).unwrap()
    }

    #[test]
    fn recovers_campaign_efficacy() {
        let panel = simulated_panel(0.3, Some(72));
        let fit = TsirFitter::new(12).fit(&panel).unwrap();
        assert_eq!(fit.efficacies.len(), 1);
        assert_almost_eq!(fit.efficacies[0], 0.3, 0.05);
        assert!(fit.skeleton_score > 0.95);
        assert!(fit.reporting_rate > 0.0);
        assert_almost_eq!(fit.panel.rows[72].sia, fit.efficacies[0], 1e-12);
        assert!(fit.panel.rows.iter().enumerate().all(|(i, r)| i == 72 || r.sia == 0.0));
        assert!(fit.model.alpha > 0.0);
    }

    #[test]
    fn regions_without_campaigns_skip_the_optimizer() {
        let panel = simulated_panel(0.0, None);
        let fit = TsirFitter::new(12).fit(&panel).unwrap();
        assert!(fit.convergence.converged);
        assert!(fit.efficacies.is_empty());
        assert_eq!(fit.convergence.iterations, 0);
        assert_eq!(fit.panel.len(), 144);
        assert_eq!(fit.panel.infections().len(), 144);
        assert_almost_eq!(fit.convergence.fun, -fit.skeleton_score, 1e-12);
    }

    #[test]
    fn mean_squared_error_criterion_and_cutoff() {
        let panel = simulated_panel(0.3, Some(72));
        let objective = SkeletonObjective::new(&panel, 12, Criterion::MeanSquaredError, 10);
        assert_eq!(objective.num_parameters(), 1);
        let sia = objective.sia_for(&[0.5]);
        assert_eq!(sia[72], 0.5);
        assert!(objective.score(&[0.3]).unwrap() <= 0.0);
        assert!(objective.evaluate(&[0.3]) >= 0.0);
    }
}
