//! Measles transmission and susceptibility dynamics from case time series
//!
//! The crate fits time-series SIR (TSIR) models to per-region case counts,
//! estimates campaign efficacies, and extrapolates future burden under
//! vaccination scenarios. A run moves through these stages:
//! * A seasonality profile regression that estimates a smooth monthly
//!   log-`R_eff` cycle per region (`seasonality`).
//! * An endemic stability projection that turns the profile into a relative
//!   susceptibility reconstruction (`endemic`).
//! * The TSIR fitter that reconstructs susceptibles, regresses transmission
//!   and optimizes campaign efficacies against the model's deterministic
//!   skeleton (`tsir`).
//! * A Monte Carlo extrapolator that samples the fitted model past the data
//!   (`extrapolate`).
//! * A scenario comparator that injects counterfactual campaigns and
//!   summarizes the burden they avert (`scenario`).
//!
//! Inputs are `TimePanel`s (`panel`) and a `CampaignCalendar` (`calendar`);
//! outputs are CSV reports (`report`). Randomness only comes from an explicit
//! `RandomSource` (`random`).
pub mod calendar;
pub mod endemic;
pub mod error;
pub mod extrapolate;
pub mod hashing;
pub mod linalg;
pub mod log;
pub mod macros;
pub mod numeric;
pub mod optimize;
pub mod panel;
pub mod parameters;
pub mod random;
pub mod report;
pub mod runner;
pub mod scenario;
pub mod seasonality;
pub mod tsir;

pub use calendar::{CampaignCalendar, CampaignRecord};
pub use error::TsirError;
pub use extrapolate::{SampleEnsemble, StochasticExtrapolator};
pub use crate::log::{
    debug, disable_logging, enable_logging, error, info, remove_module_filter, set_log_level,
    set_module_filter, set_module_filters, trace, warn, LevelFilter,
};
pub use panel::{AugmentedPanel, Frequency, TimePanel};
pub use parameters::Parameters;
pub use random::{RandomSource, RngId};
pub use report::{Report, ReportOptions, ReportWriter};
pub use scenario::{ScenarioComparator, ScenarioPanel};
pub use seasonality::{ProfileRegression, SeasonalProfile};
pub use tsir::{TsirFit, TsirFitter, TsirModel};

// Re-exports for the macros
pub use csv;
pub use rand;
