//! Per-region time panels on a regular calendar grid.
//!
//! A `TimePanel` is what the data preparation collaborator hands to the fitters: one row per
//! grid date with the observed case count (if any), routine-immunization adjusted births,
//! and the fraction of the population targeted by a vaccination campaign on that date.
//! Observed rows always come first; trailing rows without case counts form the
//! extrapolation region.
//!
//! An `AugmentedPanel` is the fitter's copy of a `TimePanel` with the campaign efficacy
//! (`sia`), susceptible deviation (`z`) and inferred infections appended.

use crate::error::TsirError;
use chrono::{Datelike, Months, NaiveDate};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Calendar grid used for a panel.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    /// One date per month, on the 15th.
    Monthly,
    /// Two dates per month, the 15th and the last day of the month.
    SemiMonthly,
}

/// Last day of the month containing `date`.
#[must_use]
pub fn month_end(date: NaiveDate) -> NaiveDate {
    let first = date.with_day(1).unwrap_or(date);
    first
        .checked_add_months(Months::new(1))
        .and_then(|d| d.pred_opt())
        .unwrap_or(date)
}

fn fifteenth(date: NaiveDate) -> NaiveDate {
    date.with_day(15).unwrap_or(date)
}

impl Frequency {
    /// Number of grid dates per year.
    #[must_use]
    pub fn periods_per_year(self) -> usize {
        match self {
            Frequency::Monthly => 12,
            Frequency::SemiMonthly => 24,
        }
    }

    /// Whether `date` lies on this grid.
    #[must_use]
    pub fn is_anchor(self, date: NaiveDate) -> bool {
        match self {
            Frequency::Monthly => date.day() == 15,
            Frequency::SemiMonthly => date.day() == 15 || date == month_end(date),
        }
    }

    /// The first grid date on or after `date`.
    #[must_use]
    pub fn anchor_on_or_after(self, date: NaiveDate) -> NaiveDate {
        if date.day() <= 15 {
            return fifteenth(date);
        }
        match self {
            Frequency::Monthly => {
                fifteenth(date.checked_add_months(Months::new(1)).unwrap_or(date))
            }
            Frequency::SemiMonthly => month_end(date),
        }
    }

    /// The grid date following `date`, which must itself be on the grid.
    #[must_use]
    pub fn next(self, date: NaiveDate) -> NaiveDate {
        match self {
            Frequency::Monthly => {
                fifteenth(date.checked_add_months(Months::new(1)).unwrap_or(date))
            }
            Frequency::SemiMonthly => {
                if date.day() == 15 {
                    month_end(date)
                } else {
                    fifteenth(date.succ_opt().unwrap_or(date))
                }
            }
        }
    }

    /// All grid dates in `[start, end]`.
    #[must_use]
    pub fn range(self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        let mut dates = Vec::new();
        let mut current = self.anchor_on_or_after(start);
        while current <= end {
            dates.push(current);
            current = self.next(current);
        }
        dates
    }
}

/// Adjusts births for routine immunization: first-dose efficacy 0.9, two-dose efficacy 0.99.
#[must_use]
pub fn adjusted_births(births: f64, mcv1: f64, mcv2: Option<f64>) -> f64 {
    match mcv2 {
        Some(mcv2) => births * (1.0 - 0.9 * mcv1 * (1.0 - mcv2) - 0.99 * mcv1 * mcv2),
        None => births * (1.0 - 0.9 * mcv1),
    }
}

/// Forward-fills then back-fills a demographic covariate. Returns `None` if nothing is
/// observed. Never use this for case counts.
#[must_use]
pub fn fill_covariates(values: &[Option<f64>]) -> Option<Vec<f64>> {
    let first = values.iter().flatten().copied().next()?;
    let mut last = first;
    Some(
        values
            .iter()
            .map(|v| {
                if let Some(v) = v {
                    last = *v;
                }
                last
            })
            .collect(),
    )
}

/// Index of the date in `dates` closest to `target`. Ties go to the earlier date.
#[must_use]
pub fn nearest_index(dates: &[NaiveDate], target: NaiveDate) -> usize {
    dates
        .iter()
        .enumerate()
        .min_by_key(|(_, d)| (**d - target).num_days().abs())
        .map_or(0, |(i, _)| i)
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PanelRow {
    pub date: NaiveDate,
    pub cases: Option<f64>,
    pub adjusted_births: f64,
    pub target_fraction: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TimePanel {
    region: String,
    frequency: Frequency,
    rows: Vec<PanelRow>,
}

fn check_grid(frequency: Frequency, dates: impl Iterator<Item = NaiveDate>) -> Result<(), TsirError> {
    let mut previous: Option<NaiveDate> = None;
    for date in dates {
        if !frequency.is_anchor(date) {
            return Err(TsirError::InputShapeError(format!(
                "{date} is not on the {frequency:?} grid"
            )));
        }
        if let Some(previous) = previous {
            if frequency.next(previous) != date {
                return Err(TsirError::InputShapeError(format!(
                    "time index is not regular between {previous} and {date}"
                )));
            }
        }
        previous = Some(date);
    }
    Ok(())
}

impl TimePanel {
    /// Validates and wraps a region's rows.
    ///
    /// # Errors
    ///
    /// `InputShapeError` if the panel is empty, the dates are not consecutive grid dates,
    /// a campaign fraction is outside [0, 1], births or cases are negative or not finite,
    /// or an observed row follows an unobserved one.
    pub fn new(
        region: impl Into<String>,
        frequency: Frequency,
        rows: Vec<PanelRow>,
    ) -> Result<Self, TsirError> {
        let region = region.into();
        if rows.is_empty() {
            return Err(TsirError::InputShapeError(format!(
                "panel for {region} has no rows"
            )));
        }
        check_grid(frequency, rows.iter().map(|r| r.date))?;

        let mut seen_unobserved = false;
        for row in &rows {
            if !(0.0..=1.0).contains(&row.target_fraction) {
                return Err(TsirError::InputShapeError(format!(
                    "{region} {}: campaign fraction {} is outside [0, 1]",
                    row.date, row.target_fraction
                )));
            }
            if !row.adjusted_births.is_finite() || row.adjusted_births < 0.0 {
                return Err(TsirError::InputShapeError(format!(
                    "{region} {}: adjusted births {} must be finite and non-negative",
                    row.date, row.adjusted_births
                )));
            }
            match row.cases {
                Some(c) if !c.is_finite() || c < 0.0 => {
                    return Err(TsirError::InputShapeError(format!(
                        "{region} {}: case count {c} must be finite and non-negative",
                        row.date
                    )));
                }
                Some(_) if seen_unobserved => {
                    return Err(TsirError::InputShapeError(format!(
                        "{region} {}: observed cases after the extrapolation region began",
                        row.date
                    )));
                }
                Some(_) => {}
                None => seen_unobserved = true,
            }
        }

        Ok(TimePanel {
            region,
            frequency,
            rows,
        })
    }

    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    #[must_use]
    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    #[must_use]
    pub fn rows(&self) -> &[PanelRow] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of leading rows with observed case counts.
    #[must_use]
    pub fn n_observed(&self) -> usize {
        self.rows.iter().take_while(|r| r.cases.is_some()).count()
    }

    #[must_use]
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.rows.iter().map(|r| r.date).collect()
    }

    /// Case counts of the observed rows.
    #[must_use]
    pub fn cases(&self) -> Vec<f64> {
        self.rows.iter().map_while(|r| r.cases).collect()
    }

    #[must_use]
    pub fn adjusted_births(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.adjusted_births).collect()
    }

    #[must_use]
    pub fn target_fractions(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.target_fraction).collect()
    }

    /// The historical portion of the panel, i.e. the rows with case data.
    #[must_use]
    pub fn observed(&self) -> TimePanel {
        TimePanel {
            region: self.region.clone(),
            frequency: self.frequency,
            rows: self.rows[..self.n_observed()].to_vec(),
        }
    }

    /// Observed cases summed by calendar month, from the first January on and over complete
    /// months only. Dates are the 15th of each month.
    #[must_use]
    pub fn monthly_cases(&self) -> (Vec<NaiveDate>, Vec<f64>) {
        let per_month = self.frequency.periods_per_year() / 12;
        let mut months: Vec<(NaiveDate, f64, usize)> = Vec::new();
        for row in self.rows.iter().take_while(|r| r.cases.is_some()) {
            let month = fifteenth(row.date);
            let cases = row.cases.unwrap_or(0.0);
            match months.last_mut() {
                Some((m, total, count)) if *m == month => {
                    *total += cases;
                    *count += 1;
                }
                _ => months.push((month, cases, 1)),
            }
        }
        months
            .into_iter()
            .filter(|(_, _, count)| *count == per_month)
            .skip_while(|(m, _, _)| m.month() != 1)
            .map(|(m, total, _)| (m, total))
            .unzip()
    }

    /// Index of the row whose date is nearest `date`.
    #[must_use]
    pub fn nearest_index(&self, date: NaiveDate) -> usize {
        nearest_index(&self.dates(), date)
    }

    /// Appends unobserved rows up to `end`, carrying the last adjusted births forward with
    /// no campaigns.
    #[must_use]
    pub fn extend_to(&self, end: NaiveDate) -> TimePanel {
        let mut rows = self.rows.clone();
        if let Some(last) = self.rows.last().copied() {
            let mut date = self.frequency.next(last.date);
            while date <= end {
                rows.push(PanelRow {
                    date,
                    cases: None,
                    adjusted_births: last.adjusted_births,
                    target_fraction: 0.0,
                });
                date = self.frequency.next(date);
            }
        }
        TimePanel {
            region: self.region.clone(),
            frequency: self.frequency,
            rows,
        }
    }

    /// Rows whose dates fall in `[start, end]`.
    ///
    /// # Errors
    ///
    /// `InputShapeError` if the window contains no rows.
    pub fn window(&self, start: NaiveDate, end: NaiveDate) -> Result<TimePanel, TsirError> {
        let rows: Vec<PanelRow> = self
            .rows
            .iter()
            .filter(|r| r.date >= start && r.date <= end)
            .copied()
            .collect();
        TimePanel::new(self.region.clone(), self.frequency, rows)
    }

    /// Replaces the campaign fractions.
    ///
    /// # Errors
    ///
    /// `InputShapeError` if the length differs or a fraction is outside [0, 1].
    pub fn with_target_fractions(&self, fractions: &[f64]) -> Result<TimePanel, TsirError> {
        if fractions.len() != self.rows.len() {
            return Err(TsirError::InputShapeError(format!(
                "{} campaign fractions for a panel of {} rows",
                fractions.len(),
                self.rows.len()
            )));
        }
        let rows = self
            .rows
            .iter()
            .zip(fractions)
            .map(|(row, f)| PanelRow {
                target_fraction: *f,
                ..*row
            })
            .collect();
        TimePanel::new(self.region.clone(), self.frequency, rows)
    }
}

/// A fitted copy of a `TimePanel`. `sia` spans every row; `z` and `infections` are `Some`
/// on the rows the model was fit to.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AugmentedRow {
    pub date: NaiveDate,
    pub cases: Option<f64>,
    pub adjusted_births: f64,
    pub target_fraction: f64,
    pub sia: f64,
    pub z: Option<f64>,
    pub infections: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AugmentedPanel {
    pub region: String,
    pub frequency: Frequency,
    pub rows: Vec<AugmentedRow>,
}

impl AugmentedPanel {
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of rows with observed case counts.
    #[must_use]
    pub fn n_observed(&self) -> usize {
        self.rows.iter().filter(|r| r.cases.is_some()).count()
    }

    #[must_use]
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.rows.iter().map(|r| r.date).collect()
    }

    #[must_use]
    pub fn sia(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.sia).collect()
    }

    #[must_use]
    pub fn adjusted_births(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.adjusted_births).collect()
    }

    /// Reconstructed infections over the leading rows that have them.
    #[must_use]
    pub fn infections(&self) -> Vec<f64> {
        self.rows.iter().map_while(|r| r.infections).collect()
    }

    /// Susceptible deviations over the leading rows that have them.
    #[must_use]
    pub fn z(&self) -> Vec<f64> {
        self.rows.iter().map_while(|r| r.z).collect()
    }

    /// Extends the panel to `end` on its grid. New rows carry the last adjusted births
    /// forward and have no campaigns, which is the "routine immunization as is" scenario.
    #[must_use]
    pub fn extend_to(&self, end: NaiveDate) -> AugmentedPanel {
        let mut rows = self.rows.clone();
        if let Some(last) = self.rows.last().copied() {
            let mut date = self.frequency.next(last.date);
            while date <= end {
                rows.push(AugmentedRow {
                    date,
                    cases: None,
                    adjusted_births: last.adjusted_births,
                    target_fraction: 0.0,
                    sia: 0.0,
                    z: None,
                    infections: None,
                });
                date = self.frequency.next(date);
            }
        }
        AugmentedPanel {
            region: self.region.clone(),
            frequency: self.frequency,
            rows,
        }
    }

    /// Replaces adjusted births from `from` onwards, e.g. for routine immunization scenarios.
    #[must_use]
    pub fn with_births_from(&self, from: NaiveDate, births: impl Fn(NaiveDate) -> f64) -> Self {
        let mut panel = self.clone();
        for row in panel.rows.iter_mut().filter(|r| r.date >= from) {
            row.adjusted_births = births(row.date);
        }
        panel
    }

    /// Sets the campaign efficacy on the grid date nearest `date`. An empty panel is
    /// returned unchanged.
    #[must_use]
    pub fn with_campaign(&self, date: NaiveDate, sia: f64) -> Self {
        let mut panel = self.clone();
        let index = nearest_index(&self.dates(), date);
        if let Some(row) = panel.rows.get_mut(index) {
            row.sia = sia;
        }
        panel
    }

    /// Mean of the nonzero campaign efficacies, the default size of an injected campaign.
    #[must_use]
    pub fn mean_campaign_efficacy(&self) -> Option<f64> {
        let nonzero: Vec<f64> = self.rows.iter().map(|r| r.sia).filter(|s| *s != 0.0).collect();
        if nonzero.is_empty() {
            None
        } else {
            Some(nonzero.iter().sum::<f64>() / nonzero.len() as f64)
        }
    }
}

#[derive(Debug, Deserialize)]
struct PanelRecord {
    region: String,
    date: NaiveDate,
    cases: Option<f64>,
    adjusted_births: Option<f64>,
    target_fraction: Option<f64>,
}

/// Loads a long-format panel CSV with columns
/// `region,date,cases,adjusted_births,target_fraction`. Empty `cases` marks the extrapolation
/// region; empty births are forward/back filled per region; empty fractions are zero.
///
/// # Errors
///
/// I/O and CSV errors, and `InputShapeError` for panels that fail validation or regions
/// with no births at all.
pub fn load_panels(
    path: &Path,
    frequency: Frequency,
) -> Result<IndexMap<String, TimePanel>, TsirError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut grouped: IndexMap<String, Vec<PanelRecord>> = IndexMap::new();
    for record in reader.deserialize() {
        let record: PanelRecord = record?;
        grouped.entry(record.region.clone()).or_default().push(record);
    }

    let mut panels = IndexMap::new();
    for (region, mut records) in grouped {
        records.sort_by_key(|r| r.date);
        let births: Vec<Option<f64>> = records.iter().map(|r| r.adjusted_births).collect();
        let births = fill_covariates(&births).ok_or_else(|| {
            TsirError::InputShapeError(format!("{region} has no adjusted births"))
        })?;
        let rows = records
            .iter()
            .zip(births)
            .map(|(r, b)| PanelRow {
                date: r.date,
                cases: r.cases,
                adjusted_births: b,
                target_fraction: r.target_fraction.unwrap_or(0.0),
            })
            .collect();
        panels.insert(region.clone(), TimePanel::new(region, frequency, rows)?);
    }
    Ok(panels)
}
