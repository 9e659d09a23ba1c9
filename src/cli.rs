//! Command-line arguments.

use std::path::PathBuf;

use clap::{ArgGroup, Parser};
use tracing::Level;

#[derive(Debug, Parser)]
#[command(name = "bess-sim")]
#[command(author, version, about = "Battery energy storage simulator")]
#[command(
    long_about = "Simulates a battery pack under BMS protection and EMS dispatch \
    against seeded solar and demand profiles.\n\
    \nIf neither --scenario nor --preset is given, the baseline preset is used.\n\
    \nExamples:\n  \
    bess-sim --preset imbalanced --quiet\n  \
    bess-sim --scenario scenarios/baseline.toml --telemetry-out run.csv\n  \
    bess-sim --compare"
)]
#[command(group(ArgGroup::new("source").args(["scenario", "preset", "compare"])))]
pub struct Args {
    /// Load the scenario from a TOML file
    #[arg(long, value_name = "PATH")]
    pub scenario: Option<PathBuf>,

    /// Use a built-in preset (baseline, high_solar, hot_climate, imbalanced)
    #[arg(long, value_name = "NAME")]
    pub preset: Option<String>,

    /// Override the scenario's random seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Write one CSV row per tick
    #[arg(long, value_name = "PATH")]
    pub telemetry_out: Option<PathBuf>,

    /// Write full snapshots as JSON lines
    #[arg(long, value_name = "PATH")]
    pub snapshots_out: Option<PathBuf>,

    /// Run every preset and print one KPI report each
    #[arg(long)]
    pub compare: bool,

    /// Skip per-tick output and log warnings only
    #[arg(long, short, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log at debug level
    #[arg(long, short)]
    pub verbose: bool,
}

impl Args {
    /// Log level selected by `--quiet` / `--verbose`.
    pub fn log_level(&self) -> Level {
        if self.quiet {
            Level::WARN
        } else if self.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        }
    }
}
