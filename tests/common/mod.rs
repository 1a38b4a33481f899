#![allow(dead_code)]

use chrono::NaiveDate;
use std::f64::consts::PI;
use std::fmt::Write as _;
use std::path::Path;
use tsir::panel::PanelRow;
use tsir::{Frequency, TimePanel, TsirModel};

pub const STEPS: usize = 144;
pub const S_BAR: f64 = 30_000.0;
pub const I_STAR: f64 = 2000.0;
pub const ALPHA: f64 = 0.97;
pub const REPORTING: f64 = 0.4;
pub const CAMPAIGN: usize = 72;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Seasonal transmission rates with a fixed point at `I_STAR` infections and `S_BAR`
/// susceptibles when births equal `I_STAR`.
pub fn seasonal_beta(alpha: f64, amplitude: f64) -> Vec<f64> {
    (0..12)
        .map(|k| {
            (amplitude * (2.0 * PI * k as f64 / 12.0).sin()).exp() * I_STAR.powf(1.0 - alpha)
                / S_BAR
        })
        .collect()
}

pub fn model(alpha: f64, amplitude: f64, std_log_e: f64) -> TsirModel {
    let beta = seasonal_beta(alpha, amplitude);
    let mut params: Vec<f64> = beta.iter().map(|b| (b * S_BAR).ln()).collect();
    params.push(alpha);
    params.push(1.0 / S_BAR);
    TsirModel {
        params: nalgebra::DVector::from_vec(params),
        params_cov: nalgebra::DMatrix::zeros(14, 14),
        beta_std: vec![0.0; 12],
        beta,
        alpha,
        alpha_std: 0.0,
        s_bar: S_BAR,
        s_bar_std: 0.0,
        std_log_e,
        scale_factor: 1.0,
        periodicity: 12,
    }
}

/// Monthly cases from a deterministic TSIR run reported at `REPORTING`, with one campaign of
/// `efficacy` at step `CAMPAIGN` when given. `future` unobserved rows follow the data.
pub fn simulated_panel(efficacy: Option<f64>, future: usize) -> TimePanel {
    match efficacy {
        Some(efficacy) => simulated_campaign_panel(efficacy, 1.0, future),
        None => simulated_campaign_panel(0.0, 0.0, future),
    }
}

/// As `simulated_panel`, with the campaign at `CAMPAIGN` reaching `target_fraction` of the
/// susceptibles at `efficacy`.
pub fn simulated_campaign_panel(efficacy: f64, target_fraction: f64, future: usize) -> TimePanel {
    let beta = seasonal_beta(ALPHA, 0.1);
    let mut target = vec![0.0; STEPS];
    target[CAMPAIGN] = target_fraction;
    let mut infections = vec![I_STAR];
    let mut susceptibles = vec![S_BAR];
    for t in 1..STEPS {
        let i = beta[t % 12] * susceptibles[t - 1] * infections[t - 1].powf(ALPHA);
        infections.push(i);
        susceptibles.push((susceptibles[t - 1] + I_STAR - i) * (1.0 - efficacy * target[t - 1]));
    }
    let dates = Frequency::Monthly.range(date(2010, 1, 1), date(2040, 1, 1));
    let rows = (0..STEPS + future)
        .map(|t| PanelRow {
            date: dates[t],
            cases: infections.get(t).map(|i| REPORTING * i),
            adjusted_births: I_STAR,
            target_fraction: target.get(t).copied().unwrap_or(0.0),
        })
        .collect();
    TimePanel::new("simulated", Frequency::Monthly, rows).unwrap()
}

/// Writes panels in the long `region,date,cases,adjusted_births,target_fraction` layout.
pub fn write_panel_csv(path: &Path, panels: &[&TimePanel]) {
    let mut out = String::from("region,date,cases,adjusted_births,target_fraction\n");
    for panel in panels {
        for row in panel.rows() {
            let cases = row.cases.map(|c| c.to_string()).unwrap_or_default();
            writeln!(
                out,
                "{},{},{},{},{}",
                panel.region(),
                row.date,
                cases,
                row.adjusted_births,
                row.target_fraction
            )
            .unwrap();
        }
    }
    std::fs::write(path, out).unwrap();
}
