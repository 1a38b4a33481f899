mod common;

use common::{date, simulated_panel};
use tsir::scenario::{burden_window_end, scenario_dates};
use tsir::{Frequency, RandomSource, ScenarioComparator, ScenarioPanel, TsirFitter};

#[test]
fn burden_window_clamps_day_29() {
    assert_eq!(burden_window_end(date(2024, 2, 29), 5).unwrap(), date(2029, 2, 28));
    assert_eq!(burden_window_end(date(2024, 1, 29), 5).unwrap(), date(2029, 1, 28));
    assert_eq!(burden_window_end(date(2024, 3, 15), 2).unwrap(), date(2026, 3, 15));
}

#[test]
fn baseline_runs_are_reproducible() {
    let fit = TsirFitter::new(12).fit(&simulated_panel(Some(0.3), 0)).unwrap();
    let baseline = ScenarioPanel::baseline(&fit.panel, date(2026, 12, 31));
    let comparator = ScenarioComparator::new(&fit.model, baseline, RandomSource::new(11), 32);
    let first = comparator.run_baseline().unwrap();
    let second = comparator.run_baseline().unwrap();
    assert_eq!(first, second);
}

#[test]
fn zero_efficacy_scenarios_avert_nothing() {
    let fit = TsirFitter::new(12).fit(&simulated_panel(Some(0.3), 0)).unwrap();
    let baseline = ScenarioPanel::baseline(&fit.panel, date(2030, 12, 31));
    let comparator = ScenarioComparator::new(&fit.model, baseline, RandomSource::new(5), 40)
        .with_efficacy(0.0);
    let dates = scenario_dates(date(2023, 1, 1), date(2023, 12, 31), Frequency::Monthly, 3);
    assert_eq!(dates.len(), 4);

    let comparisons = comparator.compare(&dates).unwrap();
    assert_eq!(comparisons.len(), 4);
    for c in &comparisons {
        assert_eq!(c.averted.mean, 0.0);
        assert_eq!(c.averted.std, 0.0);
        assert_eq!(c.baseline.mean, c.scenario.mean);
        assert!(c.avg_s > 0.0);
    }
}

#[test]
fn historical_efficacy_campaigns_avert_infections() {
    let fit = TsirFitter::new(12).fit(&simulated_panel(Some(0.3), 0)).unwrap();
    let baseline = ScenarioPanel::baseline(&fit.panel, date(2030, 12, 31));
    let comparator = ScenarioComparator::new(&fit.model, baseline, RandomSource::new(5), 40);
    let comparisons = comparator.compare(&[date(2023, 3, 15)]).unwrap();

    let c = &comparisons[0];
    assert_eq!(c.scenario_date, date(2023, 3, 15));
    assert!(c.averted.mean > 0.0);
    assert!(c.scenario.mean < c.baseline.mean);
    assert!(c.averted.low <= c.averted.high);
}

#[test]
fn regions_without_campaigns_have_no_default_efficacy() {
    let fit = TsirFitter::new(12).fit(&simulated_panel(None, 0)).unwrap();
    let baseline = ScenarioPanel::baseline(&fit.panel, date(2026, 12, 31));
    let comparator = ScenarioComparator::new(&fit.model, baseline, RandomSource::new(5), 8);
    assert!(comparator.compare(&[date(2023, 3, 15)]).is_err());
}
