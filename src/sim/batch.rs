//! Runs independent scenarios side by side.
//!
//! Every scenario owns its own pack, BMS and EMS, so scenarios share no
//! state. With the `parallel` feature they are spread over the rayon pool;
//! otherwise they run one after another. Results keep the input order
//! either way.

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::info;

use crate::config::ScenarioConfig;
use crate::error::ConfigError;

use super::kpi::KpiReport;
use super::types::SimSnapshot;

/// Outcome of one scenario.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub name: String,
    pub snapshots: Vec<SimSnapshot>,
    pub kpi: KpiReport,
}

fn run_one(name: &str, config: &ScenarioConfig) -> Result<BatchResult, ConfigError> {
    let mut sim = config.build()?;
    let snapshots = sim.run();
    let kpi = KpiReport::from_snapshots(&snapshots);
    info!(scenario = name, ticks = kpi.ticks, "scenario finished");
    Ok(BatchResult {
        name: name.to_string(),
        snapshots,
        kpi,
    })
}

/// Builds and runs every `(name, config)` pair.
///
/// A scenario that fails to build yields its `ConfigError` without
/// affecting the others.
pub fn run_batch(
    scenarios: &[(String, ScenarioConfig)],
) -> Vec<Result<BatchResult, ConfigError>> {
    #[cfg(feature = "parallel")]
    let iter = scenarios.par_iter();
    #[cfg(not(feature = "parallel"))]
    let iter = scenarios.iter();

    iter.map(|(name, config)| run_one(name, config)).collect()
}

/// Runs every built-in preset.
pub fn run_presets() -> Vec<Result<BatchResult, ConfigError>> {
    let scenarios: Vec<(String, ScenarioConfig)> = ScenarioConfig::PRESETS
        .iter()
        .filter_map(|name| {
            ScenarioConfig::from_preset(name)
                .ok()
                .map(|cfg| (name.to_string(), cfg))
        })
        .collect();
    run_batch(&scenarios)
}
