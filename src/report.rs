use crate::define_report;
use crate::error::TsirError;
use crate::extrapolate::EnsembleSummary;
use crate::panel::AugmentedRow;
use crate::scenario::ScenarioComparison;
use crate::seasonality::{SeasonClass, SeasonalProfile};
use crate::tsir::TsirFit;
use chrono::NaiveDate;
use csv::Writer;
use log::{debug, error};
use serde::{Deserialize, Serialize};
use std::any::TypeId;
use std::collections::HashMap;
use std::fs::{create_dir_all, File};
use std::path::{Path, PathBuf};

pub trait Report: Serialize + 'static {
    // Base file name, without prefix or extension
    fn name() -> &'static str;
}

/// Where reports go and whether existing files may be replaced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportOptions {
    pub file_prefix: String,
    pub directory: PathBuf,
    pub overwrite: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        ReportOptions {
            file_prefix: String::new(),
            directory: PathBuf::from("."),
            overwrite: false,
        }
    }
}

impl ReportOptions {
    #[must_use]
    pub fn new() -> Self {
        ReportOptions::default()
    }

    /// Prefix prepended to every report file name.
    pub fn file_prefix(&mut self, file_prefix: &str) -> &mut Self {
        self.file_prefix = file_prefix.to_string();
        self
    }

    pub fn directory(&mut self, directory: impl Into<PathBuf>) -> &mut Self {
        self.directory = directory.into();
        self
    }

    pub fn overwrite(&mut self, overwrite: bool) -> &mut Self {
        self.overwrite = overwrite;
        self
    }

    #[must_use]
    pub fn path_for<T: Report>(&self) -> PathBuf {
        self.directory
            .join(format!("{}{}.csv", self.file_prefix, T::name()))
    }
}

// Creates the file and any missing parent directories. Refuses to replace an existing file
// unless `overwrite` is set.
fn create_report_file(path: &Path, overwrite: bool) -> Result<File, TsirError> {
    if !overwrite && path.exists() {
        error!("report file already exists: {}", path.display());
        return Err(TsirError::ReportError(format!(
            "{} already exists; pass --overwrite to replace it",
            path.display()
        )));
    }
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    Ok(File::create(path)?)
}

/// Writes report rows to one CSV file per report type.
#[derive(Debug, Default)]
pub struct ReportWriter {
    options: ReportOptions,
    file_writers: HashMap<TypeId, Writer<File>>,
}

impl ReportWriter {
    #[must_use]
    pub fn new(options: ReportOptions) -> Self {
        ReportWriter {
            options,
            file_writers: HashMap::new(),
        }
    }

    #[must_use]
    pub fn options(&self) -> &ReportOptions {
        &self.options
    }

    /// Opens the file for `T`.
    ///
    /// # Errors
    ///
    /// `ReportError` if the file exists and overwriting is off, and I/O errors.
    pub fn add_report<T: Report>(&mut self) -> Result<(), TsirError> {
        let path = self.options.path_for::<T>();
        let file = create_report_file(&path, self.options.overwrite)?;
        debug!("writing {} to {}", T::name(), path.display());
        self.file_writers
            .insert(TypeId::of::<T>(), Writer::from_writer(file));
        Ok(())
    }

    /// Appends one row to the file for `T`.
    ///
    /// # Errors
    ///
    /// `ReportError` if `add_report::<T>()` was never called, and CSV or I/O errors.
    pub fn send_report<T: Report>(&mut self, report: &T) -> Result<(), TsirError> {
        let writer = self
            .file_writers
            .get_mut(&TypeId::of::<T>())
            .ok_or_else(|| TsirError::ReportError(format!("no writer for {}", T::name())))?;
        writer.serialize(report)?;
        writer.flush()?;
        Ok(())
    }

    /// Opens the file for `T` and writes all of `rows` to it.
    ///
    /// # Errors
    ///
    /// As [`ReportWriter::add_report`] and [`ReportWriter::send_report`].
    pub fn write_all<T: Report>(&mut self, rows: &[T]) -> Result<(), TsirError> {
        if !self.file_writers.contains_key(&TypeId::of::<T>()) {
            self.add_report::<T>()?;
        }
        for row in rows {
            self.send_report(row)?;
        }
        Ok(())
    }
}

/// One month of a fitted seasonality profile.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SeasonalProfileRow {
    pub region: String,
    pub month: u32,
    pub mu: f64,
    pub sigma: f64,
    pub reff: f64,
    pub reff_err: f64,
    pub reff_low: f64,
    pub reff_high: f64,
    pub p_low: f64,
    pub season: SeasonClass,
}
define_report!(SeasonalProfileRow, "seasonality");

impl SeasonalProfileRow {
    #[must_use]
    pub fn rows(profile: &SeasonalProfile) -> Vec<Self> {
        profile
            .classify()
            .iter()
            .enumerate()
            .map(|(m, season)| SeasonalProfileRow {
                region: profile.region.clone(),
                month: m as u32 + 1,
                mu: profile.mu[m],
                sigma: profile.sigma[m],
                reff: profile.reff[m],
                reff_err: profile.reff_err[m],
                reff_low: profile.reff_low[m],
                reff_high: profile.reff_high[m],
                p_low: profile.p_low[m],
                season: *season,
            })
            .collect()
    }
}

/// Relative susceptibility from the endemic stability projection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelativeSusceptibilityRow {
    pub region: String,
    pub date: NaiveDate,
    pub z: f64,
    pub z_err: f64,
    pub forecast: bool,
}
define_report!(RelativeSusceptibilityRow, "relative_susceptibility");

/// A fitted panel row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TsirPanelRow {
    pub region: String,
    pub date: NaiveDate,
    pub cases: Option<f64>,
    pub adjusted_births: f64,
    pub target_fraction: f64,
    pub sia: f64,
    pub z: Option<f64>,
    pub infections: Option<f64>,
}
define_report!(TsirPanelRow, "tsir_panel");

impl TsirPanelRow {
    #[must_use]
    pub fn new(region: &str, row: &AugmentedRow) -> Self {
        TsirPanelRow {
            region: region.to_string(),
            date: row.date,
            cases: row.cases,
            adjusted_births: row.adjusted_births,
            target_fraction: row.target_fraction,
            sia: row.sia,
            z: row.z,
            infections: row.infections,
        }
    }
}

/// Per-date bands of an extrapolated ensemble.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnsembleSummaryRow {
    pub region: String,
    pub date: NaiveDate,
    pub infections_low: f64,
    pub infections_mid: f64,
    pub infections_high: f64,
    pub infections_mean: f64,
    pub susceptibles_low: f64,
    pub susceptibles_mid: f64,
    pub susceptibles_high: f64,
    pub susceptibles_mean: f64,
}
define_report!(EnsembleSummaryRow, "extrapolation");

impl EnsembleSummaryRow {
    #[must_use]
    pub fn rows(region: &str, dates: &[NaiveDate], summary: &EnsembleSummary) -> Vec<Self> {
        let (i, s) = (&summary.infections, &summary.susceptibles);
        dates
            .iter()
            .enumerate()
            .take(i.mean.len())
            .map(|(t, date)| EnsembleSummaryRow {
                region: region.to_string(),
                date: *date,
                infections_low: i.low[t],
                infections_mid: i.mid[t],
                infections_high: i.high[t],
                infections_mean: i.mean[t],
                susceptibles_low: s.low[t],
                susceptibles_mid: s.mid[t],
                susceptibles_high: s.high[t],
                susceptibles_mean: s.mean[t],
            })
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScenarioComparisonRow {
    pub region: String,
    pub sia_date: NaiveDate,
    #[serde(rename = "avg_S")]
    pub avg_s: f64,
    #[serde(rename = "std_S")]
    pub std_s: f64,
    #[serde(rename = "low_S")]
    pub low_s: f64,
    #[serde(rename = "high_S")]
    pub high_s: f64,
    pub avg_base: f64,
    pub std_base: f64,
    pub avg_total: f64,
    pub std_total: f64,
    pub avg_averted: f64,
    pub std_averted: f64,
    pub low_av: f64,
    pub high_av: f64,
}
define_report!(ScenarioComparisonRow, "sia_comparisons");

impl ScenarioComparisonRow {
    #[must_use]
    pub fn new(region: &str, comparison: &ScenarioComparison) -> Self {
        ScenarioComparisonRow {
            region: region.to_string(),
            sia_date: comparison.scenario_date,
            avg_s: comparison.avg_s,
            std_s: comparison.std_s,
            low_s: comparison.low_s,
            high_s: comparison.high_s,
            avg_base: comparison.baseline.mean,
            std_base: comparison.baseline.std,
            avg_total: comparison.scenario.mean,
            std_total: comparison.scenario.std,
            avg_averted: comparison.averted.mean,
            std_averted: comparison.averted.std,
            low_av: comparison.averted.low,
            high_av: comparison.averted.high,
        }
    }
}

/// One fitted scalar with its standard error where there is one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelParameterRow {
    pub region: String,
    pub parameter: String,
    pub value: f64,
    pub std: Option<f64>,
}
define_report!(ModelParameterRow, "model_parameters");

impl ModelParameterRow {
    fn new(region: &str, parameter: impl Into<String>, value: f64, std: Option<f64>) -> Self {
        ModelParameterRow {
            region: region.to_string(),
            parameter: parameter.into(),
            value,
            std,
        }
    }

    /// Reporting rate, `alpha`, `S̄`, process noise, skeleton score, the seasonal
    /// transmission rates and the campaign efficacies.
    #[must_use]
    pub fn rows(fit: &TsirFit) -> Vec<Self> {
        let region = fit.panel.region.as_str();
        let model = &fit.model;
        let mut rows = vec![
            Self::new(
                region,
                "reporting_rate",
                fit.reporting_rate,
                Some(fit.reporting_rate_var.sqrt()),
            ),
            Self::new(region, "alpha", model.alpha, Some(model.alpha_std)),
            Self::new(region, "s_bar", model.s_bar, Some(model.s_bar_std)),
            Self::new(region, "std_log_e", model.std_log_e, None),
            Self::new(region, "skeleton_score", fit.skeleton_score, None),
        ];
        rows.extend(
            model
                .beta
                .iter()
                .zip(&model.beta_std)
                .enumerate()
                .map(|(k, (b, s))| Self::new(region, format!("beta_{k}"), *b, Some(*s))),
        );
        let campaign_dates = fit
            .panel
            .rows
            .iter()
            .filter(|r| r.target_fraction != 0.0)
            .map(|r| r.date);
        rows.extend(
            fit.efficacies
                .iter()
                .zip(campaign_dates)
                .map(|(e, date)| Self::new(region, format!("efficacy_{date}"), *e, None)),
        );
        rows
    }
}
