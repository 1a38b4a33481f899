//! Time-series SIR model fitting.
//!
//! A fit runs in three stages that feed each other:
//!
//! 1. [`reconstruct_susceptibles`] balances cumulative births against cumulative cases to get
//!    a reporting rate, the susceptible deviation `Z_t` and the inferred infections `I_t`.
//! 2. [`transmission_regression`] regresses `ln I_t` on the seasonal phase, `ln I_{t-1}` and
//!    `Z_{t-1}` to get the seasonal transmission rates, the mixing exponent `alpha` and the
//!    mean susceptible population `S̄`.
//! 3. [`TsirFitter`] chooses the campaign efficacies that make the model's deterministic
//!    skeleton track `I_t` best, by maximizing the skeleton score over `[0, 0.999]` per
//!    campaign.
//!
//! Regions without campaigns skip the third stage.

mod fit;
mod reconstruction;
mod transmission;

pub use fit::{Criterion, SkeletonObjective, TsirFit, TsirFitter};
pub use reconstruction::{reconstruct_susceptibles, SusceptibleReconstruction};
pub use transmission::{transmission_regression, TsirModel};
