//! Monte Carlo forward simulation of a fitted TSIR model.
//!
//! Every replicate starts from the first reconstructed infection count and `S̄ + Z_0`. Within
//! the historical window the force of infection is driven by the reconstructed infections of
//! the previous step; past it, by the replicate's own previous draw. Each step draws
//! `I_t = λ_t·exp(σ·ε)` with `ε ~ N(0, 1)` and carries the susceptibles through births and
//! the previous step's campaign. Negative draws are clipped to zero after the susceptible
//! update.
//!
//! Draws are taken step by step, replicate by replicate, so two runs sharing a generator
//! stream see the same `ε` at the same `(replicate, step)`.

use crate::error::TsirError;
use crate::numeric::percentile_of_sorted;
use crate::panel::AugmentedPanel;
use crate::tsir::TsirModel;
use log::{debug, trace};
use nalgebra::DMatrix;
use rand::Rng;
use rand_distr::StandardNormal;

/// Simulated trajectories, one row per replicate and one column per time step.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleEnsemble {
    pub infections: DMatrix<f64>,
    pub susceptibles: DMatrix<f64>,
}

/// Per-step band of one compartment.
#[derive(Clone, Debug, PartialEq)]
pub struct Band {
    pub low: Vec<f64>,
    pub mid: Vec<f64>,
    pub high: Vec<f64>,
    pub mean: Vec<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EnsembleSummary {
    pub infections: Band,
    pub susceptibles: Band,
}

/// Free-running and one-step-ahead ensembles over the historical window.
#[derive(Clone, Debug, PartialEq)]
pub struct FittedSamples {
    pub full: SampleEnsemble,
    pub one_step: SampleEnsemble,
}

fn column_percentiles(samples: &DMatrix<f64>, qs: &[f64]) -> Vec<Vec<f64>> {
    let mut out = vec![Vec::with_capacity(samples.ncols()); qs.len()];
    for column in samples.column_iter() {
        let mut sorted: Vec<f64> = column.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        for (band, q) in out.iter_mut().zip(qs) {
            band.push(percentile_of_sorted(&sorted, *q));
        }
    }
    out
}

fn column_means(samples: &DMatrix<f64>) -> Vec<f64> {
    samples.column_iter().map(|c| c.mean()).collect()
}

fn band(samples: &DMatrix<f64>, low: f64, mid: f64, high: f64) -> Band {
    let mut bands = column_percentiles(samples, &[low, mid, high]).into_iter();
    Band {
        low: bands.next().unwrap_or_default(),
        mid: bands.next().unwrap_or_default(),
        high: bands.next().unwrap_or_default(),
        mean: column_means(samples),
    }
}

impl SampleEnsemble {
    #[must_use]
    pub fn num_samples(&self) -> usize {
        self.infections.nrows()
    }

    #[must_use]
    pub fn num_steps(&self) -> usize {
        self.infections.ncols()
    }

    /// Per-step infection percentiles, one vector per entry of `qs` (each in [0, 100]).
    #[must_use]
    pub fn percentiles(&self, qs: &[f64]) -> Vec<Vec<f64>> {
        column_percentiles(&self.infections, qs)
    }

    /// Per-step mean infections.
    #[must_use]
    pub fn mean(&self) -> Vec<f64> {
        column_means(&self.infections)
    }

    /// Per-step mean susceptibles.
    #[must_use]
    pub fn mean_susceptibles(&self) -> Vec<f64> {
        column_means(&self.susceptibles)
    }

    /// Low/mid/high percentile bands and the mean for both compartments.
    #[must_use]
    pub fn summary(&self, low: f64, mid: f64, high: f64) -> EnsembleSummary {
        EnsembleSummary {
            infections: band(&self.infections, low, mid, high),
            susceptibles: band(&self.susceptibles, low, mid, high),
        }
    }
}

/// Draws Monte Carlo trajectories from a fitted model.
#[derive(Clone, Debug)]
pub struct StochasticExtrapolator<'a> {
    model: &'a TsirModel,
    num_samples: usize,
}

impl<'a> StochasticExtrapolator<'a> {
    #[must_use]
    pub fn new(model: &'a TsirModel, num_samples: usize) -> Self {
        StochasticExtrapolator { model, num_samples }
    }

    #[must_use]
    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    fn check(&self, panel: &AugmentedPanel) -> Result<(Vec<f64>, f64), TsirError> {
        if self.num_samples == 0 {
            return Err(TsirError::InputShapeError(
                "at least one sample is needed".to_string(),
            ));
        }
        if panel.is_empty() {
            return Err(TsirError::InputShapeError(format!(
                "{}: nothing to simulate",
                panel.region
            )));
        }
        let infections = panel.infections();
        let n_observed = panel.n_observed();
        if infections.is_empty() || infections.len() < n_observed {
            return Err(TsirError::InputShapeError(format!(
                "{}: reconstructed infections cover {} of {n_observed} observed rows",
                panel.region,
                infections.len()
            )));
        }
        let Some(z0) = panel.rows[0].z else {
            return Err(TsirError::InputShapeError(format!(
                "{}: no susceptible deviation on the first row",
                panel.region
            )));
        };
        if let Some(row) = panel
            .rows
            .iter()
            .find(|r| !r.adjusted_births.is_finite() || !(0.0..1.0).contains(&r.sia))
        {
            return Err(TsirError::InputShapeError(format!(
                "{}: births {} and campaign efficacy {} on {} are not a usable scenario",
                panel.region, row.adjusted_births, row.sia, row.date
            )));
        }
        Ok((infections, self.model.s_bar + z0))
    }

    /// Simulates `num_samples` trajectories over every row of `panel`.
    ///
    /// # Errors
    ///
    /// `InputShapeError` when the panel is empty, lacks reconstructed infections on its
    /// observed rows or `Z` on its first row, or has unusable births or campaign values.
    pub fn extrapolate<R: Rng>(
        &self,
        panel: &AugmentedPanel,
        rng: &mut R,
    ) -> Result<SampleEnsemble, TsirError> {
        let (observed, s0) = self.check(panel)?;
        let n = panel.len();
        let n_data = panel.n_observed();
        let births = panel.adjusted_births();
        let sia = panel.sia();
        let sigma = self.model.std_log_e;
        trace!(
            "{}: extrapolating {} samples over {n} steps ({n_data} with data)",
            panel.region,
            self.num_samples
        );

        let mut infections = DMatrix::zeros(self.num_samples, n);
        let mut susceptibles = DMatrix::zeros(self.num_samples, n);
        infections.column_mut(0).fill(observed[0]);
        susceptibles.column_mut(0).fill(s0);
        for i in 1..n {
            for s in 0..self.num_samples {
                let previous = if i <= n_data {
                    observed[i - 1]
                } else {
                    infections[(s, i - 1)]
                };
                let s_prev = susceptibles[(s, i - 1)];
                let epsilon: f64 = rng.sample(StandardNormal);
                let infected = self.model.intensity(i, s_prev, previous) * (sigma * epsilon).exp();
                susceptibles[(s, i)] = (s_prev + births[i] - infected) * (1.0 - sia[i - 1]);
                infections[(s, i)] = infected.max(0.0);
            }
        }
        debug!(
            "{}: final mean infections {:.1}",
            panel.region,
            infections.column(n - 1).mean()
        );
        Ok(SampleEnsemble {
            infections,
            susceptibles,
        })
    }

    /// Samples the model over the historical window only, both free-running from the first
    /// step and one step ahead from the reconstructed infections.
    ///
    /// # Errors
    ///
    /// As [`StochasticExtrapolator::extrapolate`].
    pub fn sample_fitted<R: Rng>(
        &self,
        panel: &AugmentedPanel,
        rng: &mut R,
    ) -> Result<FittedSamples, TsirError> {
        let (observed, s0) = self.check(panel)?;
        let n = observed.len();
        let births = panel.adjusted_births();
        let sia = panel.sia();
        let sigma = self.model.std_log_e;

        let mut full = SampleEnsemble {
            infections: DMatrix::zeros(self.num_samples, n),
            susceptibles: DMatrix::zeros(self.num_samples, n),
        };
        let mut one_step = full.clone();
        for ensemble in [&mut full, &mut one_step] {
            ensemble.infections.column_mut(0).fill(observed[0]);
            ensemble.susceptibles.column_mut(0).fill(s0);
        }
        for i in 1..n {
            for s in 0..self.num_samples {
                let s_prev = full.susceptibles[(s, i - 1)];
                let epsilon: f64 = rng.sample(StandardNormal);
                let infected = self
                    .model
                    .intensity(i, s_prev, full.infections[(s, i - 1)])
                    * (sigma * epsilon).exp();
                full.susceptibles[(s, i)] = (s_prev + births[i] - infected) * (1.0 - sia[i - 1]);
                full.infections[(s, i)] = infected.max(0.0);
            }
            for s in 0..self.num_samples {
                let s_prev = one_step.susceptibles[(s, i - 1)];
                let epsilon: f64 = rng.sample(StandardNormal);
                let infected =
                    self.model.intensity(i, s_prev, observed[i - 1]) * (sigma * epsilon).exp();
                one_step.susceptibles[(s, i)] =
                    (s_prev + births[i] - infected) * (1.0 - sia[i - 1]);
                one_step.infections[(s, i)] = infected.max(0.0);
            }
        }
        Ok(FittedSamples { full, one_step })
    }
}
