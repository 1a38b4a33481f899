//! Run configuration, read from a JSON file.
//!
//! Every field has a default, so `{}` is a valid configuration:
//!
//! ```json
//! {
//!     "periodicity": 24,
//!     "num_samples": 10000,
//!     "seed": 23,
//!     "horizon_end": "2045-12-31",
//!     "scenario_start": "2035-01-01",
//!     "scenario_end": "2036-12-31"
//! }
//! ```

use crate::error::TsirError;
use crate::panel::Frequency;
use crate::tsir::Criterion;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

fn default_frequency() -> Frequency {
    Frequency::SemiMonthly
}
fn default_periodicity() -> usize {
    24
}
fn default_num_samples() -> usize {
    10_000
}
fn default_seed() -> u64 {
    23
}
fn default_initial_efficacy() -> f64 {
    0.25
}
fn default_efficacy_upper_bound() -> f64 {
    0.999
}
fn default_burden_window_years() -> i32 {
    5
}
fn default_percentiles() -> [f64; 3] {
    [2.5, 50.0, 97.5]
}
fn default_stability_extent() -> usize {
    1
}
fn default_scenario_stride() -> usize {
    2
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Parameters {
    /// Grid of the input panels.
    #[serde(default = "default_frequency")]
    pub frequency: Frequency,
    /// Seasonal phases in the transmission regression, usually the grid steps per year.
    #[serde(default = "default_periodicity")]
    pub periodicity: usize,
    #[serde(default = "default_num_samples")]
    pub num_samples: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_initial_efficacy")]
    pub initial_efficacy: f64,
    #[serde(default = "default_efficacy_upper_bound")]
    pub efficacy_upper_bound: f64,
    #[serde(default)]
    pub criterion: Criterion,
    /// Leading steps left out of the skeleton score.
    #[serde(default)]
    pub skeleton_cutoff: usize,
    #[serde(default = "default_burden_window_years")]
    pub burden_window_years: i32,
    /// Low, mid and high percentiles of the extrapolation bands.
    #[serde(default = "default_percentiles")]
    pub percentiles: [f64; 3],
    /// Years the seasonal profile is tiled over in the endemic stability projection.
    #[serde(default = "default_stability_extent")]
    pub stability_extent: usize,
    /// Last simulated date. Without it there is no extrapolation.
    #[serde(default)]
    pub horizon_end: Option<NaiveDate>,
    #[serde(default)]
    pub scenario_start: Option<NaiveDate>,
    #[serde(default)]
    pub scenario_end: Option<NaiveDate>,
    /// Scenarios are tried on every `scenario_stride`-th grid date of the window.
    #[serde(default = "default_scenario_stride")]
    pub scenario_stride: usize,
}

impl Default for Parameters {
    fn default() -> Self {
        Parameters {
            frequency: default_frequency(),
            periodicity: default_periodicity(),
            num_samples: default_num_samples(),
            seed: default_seed(),
            initial_efficacy: default_initial_efficacy(),
            efficacy_upper_bound: default_efficacy_upper_bound(),
            criterion: Criterion::default(),
            skeleton_cutoff: 0,
            burden_window_years: default_burden_window_years(),
            percentiles: default_percentiles(),
            stability_extent: default_stability_extent(),
            horizon_end: None,
            scenario_start: None,
            scenario_end: None,
            scenario_stride: default_scenario_stride(),
        }
    }
}

fn invalid(msg: impl Into<String>) -> Result<(), TsirError> {
    Err(TsirError::InputShapeError(msg.into()))
}

impl Parameters {
    /// # Errors
    ///
    /// `InputShapeError` naming the first field with a value the fitters cannot use.
    pub fn validate(&self) -> Result<(), TsirError> {
        if self.periodicity == 0 {
            return invalid("periodicity must be positive");
        }
        if self.num_samples == 0 {
            return invalid("num_samples must be positive");
        }
        if !(0.0..1.0).contains(&self.efficacy_upper_bound) {
            return invalid("efficacy_upper_bound must be in [0, 1)");
        }
        if !(0.0..=self.efficacy_upper_bound).contains(&self.initial_efficacy) {
            return invalid("initial_efficacy must be in [0, efficacy_upper_bound]");
        }
        if self.burden_window_years <= 0 {
            return invalid("burden_window_years must be positive");
        }
        let [low, mid, high] = self.percentiles;
        if !(0.0 <= low && low <= mid && mid <= high && high <= 100.0) {
            return invalid("percentiles must be ascending within [0, 100]");
        }
        if self.stability_extent == 0 {
            return invalid("stability_extent must be positive");
        }
        if self.scenario_stride == 0 {
            return invalid("scenario_stride must be positive");
        }
        if let (Some(start), Some(end)) = (self.scenario_start, self.scenario_end) {
            if start > end {
                return invalid("scenario_start is after scenario_end");
            }
        }
        Ok(())
    }
}

/// Reads and validates parameters from a JSON file.
///
/// # Errors
///
/// I/O and JSON errors, and anything [`Parameters::validate`] rejects.
pub fn load_parameters(path: &Path) -> Result<Parameters, TsirError> {
    let reader = BufReader::new(File::open(path)?);
    let parameters: Parameters = serde_json::from_reader(reader)?;
    parameters.validate()?;
    Ok(parameters)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn empty_object_gives_defaults() {
        let parameters: Parameters = serde_json::from_str("{}").unwrap();
        assert_eq!(parameters, Parameters::default());
        assert_eq!(parameters.periodicity, 24);
        assert_eq!(parameters.num_samples, 10_000);
        assert_eq!(parameters.seed, 23);
        assert_eq!(parameters.criterion, Criterion::RSquared);
        assert!(parameters.validate().is_ok());
    }

    #[test]
    fn loads_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"frequency": "monthly", "periodicity": 12, "num_samples": 50,
                "criterion": "mean_squared_error", "horizon_end": "2030-12-31"}}"#
        )
        .unwrap();
        let parameters = load_parameters(file.path()).unwrap();
        assert_eq!(parameters.frequency, Frequency::Monthly);
        assert_eq!(parameters.periodicity, 12);
        assert_eq!(parameters.num_samples, 50);
        assert_eq!(parameters.criterion, Criterion::MeanSquaredError);
        assert_eq!(parameters.horizon_end, NaiveDate::from_ymd_opt(2030, 12, 31));
        assert_eq!(parameters.burden_window_years, 5);
    }

    #[test]
    fn rejects_unknown_fields_and_bad_values() {
        assert!(serde_json::from_str::<Parameters>(r#"{"periodicty": 24}"#).is_err());

        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"efficacy_upper_bound": 1.0}}"#).unwrap();
        assert!(matches!(
            load_parameters(file.path()),
            Err(TsirError::InputShapeError(_))
        ));

        let parameters = Parameters {
            percentiles: [97.5, 50.0, 2.5],
            ..Parameters::default()
        };
        assert!(parameters.validate().is_err());

        let parameters = Parameters {
            scenario_start: NaiveDate::from_ymd_opt(2036, 1, 1),
            scenario_end: NaiveDate::from_ymd_opt(2035, 1, 1),
            ..Parameters::default()
        };
        assert!(parameters.validate().is_err());
    }
}
