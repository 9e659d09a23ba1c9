//! bess-sim entry point: CLI wiring and config-driven simulation.

mod cli;

use std::process;

use bess_sim::config::ScenarioConfig;
use bess_sim::io::{export_csv, export_json_lines};
use bess_sim::sim::batch::run_presets;
use bess_sim::sim::kpi::KpiReport;
use clap::Parser;
use tracing::error;

use crate::cli::Args;

fn load_scenario(args: &Args) -> ScenarioConfig {
    // --scenario takes priority, then --preset, then baseline
    let loaded = if let Some(path) = &args.scenario {
        ScenarioConfig::from_toml_file(path)
    } else if let Some(name) = &args.preset {
        ScenarioConfig::from_preset(name)
    } else {
        Ok(ScenarioConfig::baseline())
    };
    match loaded {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    }
}

fn compare() {
    let mut failed = false;
    for result in run_presets() {
        match result {
            Ok(run) => println!("=== {} ===\n{}\n", run.name, run.kpi),
            Err(e) => {
                eprintln!("{e}");
                failed = true;
            }
        }
    }
    if failed {
        process::exit(1);
    }
}

fn main() {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(args.log_level())
        .with_writer(std::io::stderr)
        .init();

    if args.compare {
        compare();
        return;
    }

    let mut scenario = load_scenario(&args);
    if let Some(seed) = args.seed {
        scenario.simulation.seed = seed;
    }

    let errors = scenario.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }

    let mut sim = match scenario.build() {
        Ok(sim) => sim,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };
    let snapshots = sim.run();
    let kpi = KpiReport::from_snapshots(&snapshots);

    if !args.quiet {
        for s in &snapshots {
            println!("{s}");
        }
        println!();
    }
    println!("{kpi}");

    if let Some(path) = &args.telemetry_out {
        if let Err(e) = export_csv(&snapshots, path) {
            error!(path = %path.display(), "failed to write CSV: {e}");
            process::exit(1);
        }
        eprintln!("Telemetry written to {}", path.display());
    }

    if let Some(path) = &args.snapshots_out {
        if let Err(e) = export_json_lines(&snapshots, path) {
            error!(path = %path.display(), "failed to write snapshots: {e}");
            process::exit(1);
        }
        eprintln!("Snapshots written to {}", path.display());
    }
}
