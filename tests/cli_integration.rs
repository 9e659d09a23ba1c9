use std::process::Command;

#[derive(Debug)]
struct Kpis {
    grid_import_kwh: f64,
    curtailed_kwh: f64,
}

#[test]
fn scenario_files_run_via_cli_and_produce_distinct_dynamics() {
    let baseline = run_and_parse_kpis(&["--scenario", "scenarios/baseline.toml"]);
    let high_solar = run_and_parse_kpis(&["--scenario", "scenarios/high_solar.toml"]);
    let imbalanced = run_and_parse_kpis(&["--scenario", "scenarios/imbalanced.toml"]);
    let hot = run_and_parse_kpis(&["--scenario", "scenarios/hot_climate.toml"]);

    assert!(
        high_solar.curtailed_kwh > baseline.curtailed_kwh,
        "expected high_solar to curtail more: baseline={baseline:?}, high_solar={high_solar:?}"
    );
    assert!(
        (baseline.grid_import_kwh - imbalanced.grid_import_kwh).abs() > 0.1,
        "expected baseline and imbalanced imports to differ: {baseline:?} vs {imbalanced:?}"
    );
    assert!(hot.grid_import_kwh > 0.0);
}

#[test]
fn preset_and_seed_are_accepted() {
    let output = Command::new(env!("CARGO_BIN_EXE_bess-sim"))
        .args(["--preset", "imbalanced", "--seed", "7", "--quiet"])
        .output()
        .expect("bess-sim process should run");
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).expect("stdout should be valid UTF-8");
    assert!(stdout.starts_with("--- KPI Report ---"), "{stdout}");
}

#[test]
fn unknown_preset_exits_non_zero() {
    let output = Command::new(env!("CARGO_BIN_EXE_bess-sim"))
        .args(["--preset", "nope"])
        .output()
        .expect("bess-sim process should run");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown preset"), "{stderr}");
}

#[test]
fn telemetry_is_written() {
    let path = std::env::temp_dir().join(format!("bess-sim-{}.csv", std::process::id()));
    let output = Command::new(env!("CARGO_BIN_EXE_bess-sim"))
        .args(["--preset", "baseline", "--quiet", "--telemetry-out"])
        .arg(&path)
        .output()
        .expect("bess-sim process should run");
    assert!(output.status.success());

    let csv = std::fs::read_to_string(&path).expect("telemetry file should exist");
    let _ = std::fs::remove_file(&path);
    // header + 96 ticks
    assert_eq!(csv.lines().count(), 97);
}

fn run_and_parse_kpis(args: &[&str]) -> Kpis {
    let output = Command::new(env!("CARGO_BIN_EXE_bess-sim"))
        .args(args)
        .arg("--quiet")
        .output()
        .expect("bess-sim process should run");

    assert!(
        output.status.success(),
        "run failed for {args:?}: stderr={} ",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8(output.stdout).expect("stdout should be valid UTF-8");
    Kpis {
        grid_import_kwh: parse_metric(&stdout, "Grid import:", "kWh"),
        curtailed_kwh: parse_metric(&stdout, "Curtailed solar:", "kWh"),
    }
}

fn parse_metric(stdout: &str, label: &str, unit: &str) -> f64 {
    let line = stdout
        .lines()
        .find(|line| line.trim_start().starts_with(label))
        .unwrap_or_else(|| panic!("missing KPI line `{label}` in output: {stdout}"));

    let raw = line
        .split_once(':')
        .map(|(_, right)| right.trim())
        .unwrap_or_else(|| panic!("invalid KPI format for line `{line}`"));

    let numeric = raw.strip_suffix(unit).unwrap_or(raw).trim();
    numeric
        .parse::<f64>()
        .unwrap_or_else(|_| panic!("failed parsing `{numeric}` from KPI line `{line}`"))
}
