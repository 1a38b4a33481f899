use chrono::NaiveDate;
use criterion::{criterion_group, criterion_main, Criterion};
use nalgebra::{DMatrix, DVector};
use std::f64::consts::PI;
use tsir::panel::AugmentedRow;
use tsir::scenario::ScenarioPanel;
use tsir::{AugmentedPanel, Frequency, RandomSource, ScenarioComparator, TsirModel};

static SEED: u64 = 123;
static NUM_SAMPLES: usize = 1000;
static S_BAR: f64 = 30_000.0;
static BIRTHS: f64 = 2000.0;
static ALPHA: f64 = 0.97;

fn model() -> TsirModel {
    let beta: Vec<f64> = (0..24)
        .map(|k| (0.1 * (2.0 * PI * k as f64 / 24.0).sin()).exp() * BIRTHS.powf(1.0 - ALPHA) / S_BAR)
        .collect();
    let mut params: Vec<f64> = beta.iter().map(|b| (b * S_BAR).ln()).collect();
    params.extend([ALPHA, 1.0 / S_BAR]);
    TsirModel {
        params: DVector::from_vec(params),
        params_cov: DMatrix::zeros(26, 26),
        beta_std: vec![0.0; 24],
        beta,
        alpha: ALPHA,
        alpha_std: 0.0,
        s_bar: S_BAR,
        s_bar_std: 0.0,
        std_log_e: 0.2,
        scale_factor: 1.0,
        periodicity: 24,
    }
}

/// Ten years of semi-monthly history at the fixed point, extended ten more years.
fn baseline() -> ScenarioPanel {
    let start = NaiveDate::from_ymd_opt(2010, 1, 1).unwrap();
    let end = NaiveDate::from_ymd_opt(2019, 12, 31).unwrap();
    let rows = Frequency::SemiMonthly
        .range(start, end)
        .into_iter()
        .enumerate()
        .map(|(i, date)| AugmentedRow {
            date,
            cases: Some(0.5 * BIRTHS),
            adjusted_births: BIRTHS,
            target_fraction: if i == 120 { 1.0 } else { 0.0 },
            sia: if i == 120 { 0.3 } else { 0.0 },
            z: Some(0.0),
            infections: Some(BIRTHS),
        })
        .collect();
    let fit_panel = AugmentedPanel {
        region: "bench".to_string(),
        frequency: Frequency::SemiMonthly,
        rows,
    };
    ScenarioPanel::baseline(&fit_panel, NaiveDate::from_ymd_opt(2029, 12, 31).unwrap())
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let model = model();
    let comparator = ScenarioComparator::new(&model, baseline(), RandomSource::new(SEED), NUM_SAMPLES);
    c.bench_function("extrapolate baseline", |bencher| {
        bencher.iter_with_large_drop(|| comparator.run_baseline());
    });

    let dates = [NaiveDate::from_ymd_opt(2021, 1, 15).unwrap()];
    c.bench_function("compare one scenario", |bencher| {
        bencher.iter_with_large_drop(|| comparator.compare(&dates));
    });
}

criterion_group!(extrapolation_benches, criterion_benchmark);
criterion_main!(extrapolation_benches);
