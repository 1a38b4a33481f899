//! Counterfactual campaign scenarios and the burden they avert.
//!
//! The baseline extends a fitted panel past the data with the last adjusted births carried
//! forward and no campaigns. Each scenario adds one campaign to the baseline. Every run draws
//! from a fresh generator for the same [`RngId`](crate::random::RngId), so baseline and
//! scenario replicates share their noise and the averted burden is a paired difference.

use crate::define_rng;
use crate::error::TsirError;
use crate::extrapolate::{SampleEnsemble, StochasticExtrapolator};
use crate::numeric::{mean, percentile, std};
use crate::panel::{nearest_index, AugmentedPanel, Frequency};
use crate::random::RandomSource;
use crate::tsir::TsirModel;
use chrono::{Datelike, NaiveDate};
use log::{debug, info, trace};
use nalgebra::DMatrix;

define_rng!(ScenarioRng);

/// A fitted panel extended to a horizon with fully specified births and campaigns.
#[derive(Clone, Debug, PartialEq)]
pub struct ScenarioPanel {
    panel: AugmentedPanel,
}

impl ScenarioPanel {
    /// Extends `fit_panel` to `horizon_end` with forward-filled births and no future campaigns.
    #[must_use]
    pub fn baseline(fit_panel: &AugmentedPanel, horizon_end: NaiveDate) -> Self {
        ScenarioPanel {
            panel: fit_panel.extend_to(horizon_end),
        }
    }

    /// A copy with a campaign of `efficacy` on the grid date nearest `date`.
    #[must_use]
    pub fn with_campaign(&self, date: NaiveDate, efficacy: f64) -> Self {
        ScenarioPanel {
            panel: self.panel.with_campaign(date, efficacy),
        }
    }

    #[must_use]
    pub fn panel(&self) -> &AugmentedPanel {
        &self.panel
    }

    #[must_use]
    pub fn into_panel(self) -> AugmentedPanel {
        self.panel
    }
}

/// End of the burden window that starts at `start`: the same month and day `years` later.
/// Windows starting on the 29th end on the 28th so that February 29th never needs a leap
/// year.
///
/// # Errors
///
/// `DateError` when the resulting date does not exist.
pub fn burden_window_end(start: NaiveDate, years: i32) -> Result<NaiveDate, TsirError> {
    let day = if start.day() == 29 { 28 } else { start.day() };
    NaiveDate::from_ymd_opt(start.year() + years, start.month(), day).ok_or_else(|| {
        TsirError::DateError(format!("{start} plus {years} years is not a calendar date"))
    })
}

/// Every `stride`-th grid date in `[start, end]`.
#[must_use]
pub fn scenario_dates(
    start: NaiveDate,
    end: NaiveDate,
    frequency: Frequency,
    stride: usize,
) -> Vec<NaiveDate> {
    frequency
        .range(start, end)
        .into_iter()
        .step_by(stride.max(1))
        .collect()
}

/// Summary of per-replicate total infections over a window.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BurdenEstimate {
    pub mean: f64,
    pub std: f64,
    pub low: f64,
    pub high: f64,
}

/// Sums each replicate's infections over the steps `[start, end)`, where both ends are
/// snapped to the nearest dates, and summarizes the totals with the `low_q` and `high_q`
/// percentiles.
#[must_use]
pub fn burden_estimate(
    samples: &DMatrix<f64>,
    dates: &[NaiveDate],
    start: NaiveDate,
    end: NaiveDate,
    low_q: f64,
    high_q: f64,
) -> BurdenEstimate {
    let start_idx = nearest_index(dates, start);
    let end_idx = nearest_index(dates, end).max(start_idx);
    let totals: Vec<f64> = samples
        .row_iter()
        .map(|row| row.iter().skip(start_idx).take(end_idx - start_idx).sum())
        .collect();
    BurdenEstimate {
        mean: mean(&totals),
        std: std(&totals),
        low: percentile(&totals, low_q),
        high: percentile(&totals, high_q),
    }
}

/// Outcome of injecting one campaign.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ScenarioComparison {
    pub scenario_date: NaiveDate,
    /// Baseline susceptibles over the two grid steps starting at the scenario date.
    pub avg_s: f64,
    pub std_s: f64,
    pub low_s: f64,
    pub high_s: f64,
    pub baseline: BurdenEstimate,
    pub scenario: BurdenEstimate,
    pub averted: BurdenEstimate,
}

/// Runs the baseline and campaign scenarios for one fitted region.
#[derive(Clone, Debug)]
pub struct ScenarioComparator<'a> {
    model: &'a TsirModel,
    baseline: ScenarioPanel,
    source: RandomSource,
    num_samples: usize,
    burden_window_years: i32,
    efficacy: Option<f64>,
    low_q: f64,
    high_q: f64,
}

impl<'a> ScenarioComparator<'a> {
    /// The injected campaign defaults to the mean nonzero historical efficacy, and burden
    /// bands to the 5th and 95th percentiles over a five year window.
    #[must_use]
    pub fn new(
        model: &'a TsirModel,
        baseline: ScenarioPanel,
        source: RandomSource,
        num_samples: usize,
    ) -> Self {
        let efficacy = baseline.panel().mean_campaign_efficacy();
        ScenarioComparator {
            model,
            baseline,
            source,
            num_samples,
            burden_window_years: 5,
            efficacy,
            low_q: 5.0,
            high_q: 95.0,
        }
    }

    #[must_use]
    pub fn with_efficacy(mut self, efficacy: f64) -> Self {
        self.efficacy = Some(efficacy);
        self
    }

    #[must_use]
    pub fn with_burden_window(mut self, years: i32) -> Self {
        self.burden_window_years = years;
        self
    }

    #[must_use]
    pub fn with_percentiles(mut self, low_q: f64, high_q: f64) -> Self {
        self.low_q = low_q;
        self.high_q = high_q;
        self
    }

    #[must_use]
    pub fn baseline_panel(&self) -> &ScenarioPanel {
        &self.baseline
    }

    fn run(&self, panel: &AugmentedPanel) -> Result<SampleEnsemble, TsirError> {
        let mut rng = self.source.rng(ScenarioRng);
        StochasticExtrapolator::new(self.model, self.num_samples).extrapolate(panel, &mut rng)
    }

    /// Simulates the baseline.
    ///
    /// # Errors
    ///
    /// Any error from the extrapolator.
    pub fn run_baseline(&self) -> Result<SampleEnsemble, TsirError> {
        self.run(self.baseline.panel())
    }

    /// Simulates the baseline, then one scenario per date.
    ///
    /// # Errors
    ///
    /// `InputShapeError` when there is no campaign efficacy to inject, and any error from
    /// the extrapolator or burden window arithmetic.
    pub fn compare(&self, dates: &[NaiveDate]) -> Result<Vec<ScenarioComparison>, TsirError> {
        let baseline = self.run_baseline()?;
        self.compare_against(&baseline, dates)
    }

    /// Like [`ScenarioComparator::compare`] with an already simulated baseline.
    ///
    /// # Errors
    ///
    /// As [`ScenarioComparator::compare`].
    pub fn compare_against(
        &self,
        baseline: &SampleEnsemble,
        dates: &[NaiveDate],
    ) -> Result<Vec<ScenarioComparison>, TsirError> {
        let panel = self.baseline.panel();
        let Some(efficacy) = self.efficacy else {
            return Err(TsirError::InputShapeError(format!(
                "{}: no historical campaigns to size the injected campaign",
                panel.region
            )));
        };
        let grid = panel.dates();
        info!(
            "{}: comparing {} scenarios with campaign efficacy {efficacy:.3}",
            panel.region,
            dates.len()
        );

        let mut comparisons = Vec::with_capacity(dates.len());
        for date in dates {
            trace!("{}: scenario campaign on {date}", panel.region);
            let scenario = self.run(self.baseline.with_campaign(*date, efficacy).panel())?;
            let end = burden_window_end(*date, self.burden_window_years)?;

            let idx = nearest_index(&grid, *date);
            let last = (idx + 2).min(baseline.num_steps());
            let block: Vec<f64> = baseline
                .susceptibles
                .columns(idx, last - idx)
                .iter()
                .copied()
                .collect();

            let averted = &baseline.infections - &scenario.infections;
            let comparison = ScenarioComparison {
                scenario_date: *date,
                avg_s: mean(&block),
                std_s: std(&block),
                low_s: percentile(&block, self.low_q),
                high_s: percentile(&block, self.high_q),
                baseline: burden_estimate(
                    &baseline.infections,
                    &grid,
                    *date,
                    end,
                    self.low_q,
                    self.high_q,
                ),
                scenario: burden_estimate(
                    &scenario.infections,
                    &grid,
                    *date,
                    end,
                    self.low_q,
                    self.high_q,
                ),
                averted: burden_estimate(&averted, &grid, *date, end, self.low_q, self.high_q),
            };
            debug!(
                "{}: campaign on {date} averts {:.1} ± {:.1}",
                panel.region, comparison.averted.mean, comparison.averted.std
            );
            comparisons.push(comparison);
        }
        Ok(comparisons)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::assert_almost_eq;
    use crate::panel::AugmentedRow;
    use nalgebra::DVector;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn model() -> TsirModel {
        TsirModel {
            params: DVector::zeros(4),
            params_cov: DMatrix::zeros(4, 4),
            beta: vec![0.9 / 5000.0, 1.1 / 5000.0],
            beta_std: vec![0.0; 2],
            alpha: 0.95,
            alpha_std: 0.0,
            s_bar: 5000.0,
            s_bar_std: 0.0,
            std_log_e: 0.2,
            scale_factor: 1.0,
            periodicity: 2,
        }
    }

    fn fit_panel() -> AugmentedPanel {
        let dates = Frequency::SemiMonthly.range(date(2020, 1, 1), date(2020, 12, 31));
        let rows = dates
            .iter()
            .enumerate()
            .map(|(t, d)| AugmentedRow {
                date: *d,
                cases: Some(50.0),
                adjusted_births: 150.0,
                target_fraction: if t == 10 { 1.0 } else { 0.0 },
                sia: if t == 10 { 0.4 } else { 0.0 },
                z: Some(0.0),
                infections: Some(150.0),
            })
            .collect();
        AugmentedPanel {
            region: "test".to_string(),
            frequency: Frequency::SemiMonthly,
            rows,
        }
    }

    #[test]
    fn burden_window_keeps_month_and_day() {
        assert_eq!(burden_window_end(date(2035, 1, 15), 5).unwrap(), date(2040, 1, 15));
        assert_eq!(burden_window_end(date(2035, 1, 31), 5).unwrap(), date(2040, 1, 31));
        assert_eq!(burden_window_end(date(2036, 2, 29), 5).unwrap(), date(2041, 2, 28));
        // The 29th is moved in every month.
        assert_eq!(burden_window_end(date(2035, 3, 29), 1).unwrap(), date(2036, 3, 28));
    }

    #[test]
    fn scenario_dates_take_every_other_grid_date() {
        let dates = scenario_dates(date(2035, 1, 1), date(2036, 12, 31), Frequency::SemiMonthly, 2);
        assert_eq!(dates.len(), 24);
        assert!(dates.iter().all(|d| d.day() == 15));
        assert_eq!(dates[0], date(2035, 1, 15));
        assert_eq!(dates[23], date(2036, 12, 15));
    }

    #[test]
    fn burden_sums_the_half_open_window() {
        let dates = Frequency::Monthly.range(date(2020, 1, 1), date(2020, 12, 31));
        let samples = DMatrix::from_fn(3, 12, |r, c| (r + 1) as f64 * c as f64);
        let estimate = burden_estimate(&samples, &dates, date(2020, 3, 15), date(2020, 6, 14), 5.0, 95.0);
        // Columns 2..5 sum to 9 per unit of row scale.
        assert_almost_eq!(estimate.mean, 18.0, 1e-12);
        assert_almost_eq!(estimate.std, (6.0_f64).sqrt() * 9.0 / 3.0, 1e-12);
        assert_almost_eq!(estimate.low, 9.0 + 0.1 * 9.0, 1e-12);
        assert_almost_eq!(estimate.high, 27.0 - 0.1 * 9.0, 1e-12);

        let empty = burden_estimate(&samples, &dates, date(2020, 6, 15), date(2020, 3, 15), 5.0, 95.0);
        assert_eq!(empty.mean, 0.0);
    }

    #[test]
    fn baseline_extends_without_campaigns() {
        let baseline = ScenarioPanel::baseline(&fit_panel(), date(2022, 12, 31));
        let panel = baseline.panel();
        assert_eq!(panel.len(), 72);
        assert_eq!(panel.n_observed(), 24);
        assert!(panel.rows[24..].iter().all(|r| r.sia == 0.0 && r.adjusted_births == 150.0));
        let scenario = baseline.with_campaign(date(2022, 3, 14), 0.4);
        assert_eq!(scenario.panel().rows[52].date, date(2022, 3, 15));
        assert_eq!(scenario.panel().rows[52].sia, 0.4);
    }

    #[test]
    fn identical_scenarios_avert_nothing() {
        let model = model();
        let baseline = ScenarioPanel::baseline(&fit_panel(), date(2026, 12, 31));
        let comparator = ScenarioComparator::new(&model, baseline, RandomSource::new(23), 200)
            .with_efficacy(0.0)
            .with_burden_window(2);
        let dates = scenario_dates(date(2022, 1, 1), date(2022, 12, 31), Frequency::SemiMonthly, 6);
        let comparisons = comparator.compare(&dates).unwrap();
        assert_eq!(comparisons.len(), 4);
        for c in &comparisons {
            assert_eq!(c.averted.mean, 0.0);
            assert_eq!(c.averted.std, 0.0);
            assert_eq!(c.baseline, c.scenario);
            assert!(c.baseline.mean > 0.0);
            assert!(c.low_s <= c.high_s);
        }
    }

    #[test]
    fn campaigns_avert_infections() {
        let model = model();
        let baseline = ScenarioPanel::baseline(&fit_panel(), date(2026, 12, 31));
        let comparator = ScenarioComparator::new(&model, baseline, RandomSource::new(23), 200)
            .with_efficacy(0.9)
            .with_burden_window(2);
        let comparisons = comparator.compare(&[date(2022, 6, 15)]).unwrap();
        let c = comparisons[0];
        assert_almost_eq!(
            c.averted.mean,
            c.baseline.mean - c.scenario.mean,
            1e-6 * c.baseline.mean
        );
        assert!(c.averted.mean > 0.0);
    }

    #[test]
    fn default_efficacy_is_the_historical_mean() {
        let model = model();
        let mut panel = fit_panel();
        panel.rows[5].sia = 0.2;
        let baseline = ScenarioPanel::baseline(&panel, date(2023, 12, 31));
        let comparator = ScenarioComparator::new(&model, baseline.clone(), RandomSource::new(1), 10);
        assert_almost_eq!(comparator.efficacy.unwrap(), 0.3, 1e-12);

        for row in &mut panel.rows {
            row.sia = 0.0;
        }
        let comparator = ScenarioComparator::new(
            &model,
            ScenarioPanel::baseline(&panel, date(2023, 12, 31)),
            RandomSource::new(1),
            10,
        );
        assert!(matches!(
            comparator.compare(&[date(2022, 6, 15)]),
            Err(TsirError::InputShapeError(_))
        ));
    }
}
