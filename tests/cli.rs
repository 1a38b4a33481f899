mod common;

use assert_cmd::Command;
use common::{simulated_panel, write_panel_csv};
use std::fs;
use tempfile::tempdir;

#[test]
fn fits_and_writes_reports() {
    let dir = tempdir().unwrap();
    let panels = dir.path().join("panels.csv");
    write_panel_csv(&panels, &[&simulated_panel(Some(0.3), 12)]);
    let config = dir.path().join("config.json");
    fs::write(
        &config,
        r#"{
            "frequency": "monthly",
            "periodicity": 12,
            "num_samples": 40,
            "horizon_end": "2026-12-31",
            "scenario_start": "2022-06-01",
            "scenario_end": "2022-12-31",
            "burden_window_years": 2
        }"#,
    )
    .unwrap();
    let output = dir.path().join("out");

    Command::cargo_bin("tsir")
        .unwrap()
        .args(["-c", config.to_str().unwrap()])
        .args(["-o", output.to_str().unwrap()])
        .args(["--file-prefix", "sim_"])
        .args(["--panels", panels.to_str().unwrap()])
        .assert()
        .success();

    for name in [
        "seasonality",
        "tsir_panel",
        "model_parameters",
        "extrapolation",
        "sia_comparisons",
    ] {
        assert!(output.join(format!("sim_{name}.csv")).exists(), "missing {name}");
    }
    let tsir_panel = fs::read_to_string(output.join("sim_tsir_panel.csv")).unwrap();
    assert_eq!(tsir_panel.lines().count(), 1 + 144);
    let comparisons = fs::read_to_string(output.join("sim_sia_comparisons.csv")).unwrap();
    assert!(comparisons.starts_with("region,sia_date"));
    assert_eq!(comparisons.lines().count(), 1 + 4);
}

#[test]
fn refuses_to_overwrite_reports() {
    let dir = tempdir().unwrap();
    let panels = dir.path().join("panels.csv");
    write_panel_csv(&panels, &[&simulated_panel(None, 0)]);
    let config = dir.path().join("config.json");
    fs::write(&config, r#"{"frequency": "monthly", "periodicity": 12}"#).unwrap();
    let output = dir.path().join("out");
    let run = || {
        let mut cmd = Command::cargo_bin("tsir").unwrap();
        cmd.args(["-c", config.to_str().unwrap()])
            .args(["-o", output.to_str().unwrap()])
            .args(["--panels", panels.to_str().unwrap()]);
        cmd
    };

    run().assert().success();
    run().assert().failure();
    run().arg("--overwrite").assert().success();
}

#[test]
fn missing_panels_fail() {
    let dir = tempdir().unwrap();
    Command::cargo_bin("tsir")
        .unwrap()
        .args(["-o", dir.path().to_str().unwrap()])
        .args(["--panels", dir.path().join("absent.csv").to_str().unwrap()])
        .assert()
        .failure();
}
