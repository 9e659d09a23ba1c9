//! Core simulation types: run configuration and the per-tick snapshot.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::battery::PackState;
use crate::bms::BmsOutput;
use crate::ems::EmsOutput;

/// Centralized simulation configuration.
///
/// Replaces any process-wide clock or seed: every random stream in a run is
/// derived from `seed`.
///
/// # Examples
///
/// ```
/// use bess_sim::sim::types::SimConfig;
///
/// let cfg = SimConfig::new(24, 1, 42);
/// assert_eq!(cfg.dt_seconds, 3600.0);
/// assert_eq!(cfg.total_steps(), 24);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    /// Number of simulation steps per day.
    pub steps_per_day: usize,
    /// Number of days to simulate.
    pub days: usize,
    /// Duration of one timestep in seconds, derived as `86400 / steps_per_day`.
    pub dt_seconds: f64,
    /// Master random seed for reproducibility.
    pub seed: u64,
}

impl SimConfig {
    /// Creates a new simulation configuration.
    ///
    /// # Arguments
    ///
    /// * `steps_per_day` - Number of timesteps per simulated day (must be > 0)
    /// * `days` - Number of days to simulate (must be > 0)
    /// * `seed` - Master random seed
    ///
    /// # Panics
    ///
    /// Panics if `steps_per_day` or `days` is zero.
    pub fn new(steps_per_day: usize, days: usize, seed: u64) -> Self {
        assert!(steps_per_day > 0, "steps_per_day must be > 0");
        assert!(days > 0, "days must be > 0");
        Self {
            steps_per_day,
            days,
            dt_seconds: 86_400.0 / steps_per_day as f64,
            seed,
        }
    }

    /// Total number of simulation steps across all days.
    pub fn total_steps(&self) -> usize {
        self.steps_per_day * self.days
    }

    /// Timestep in hours.
    pub fn dt_hours(&self) -> f64 {
        self.dt_seconds / 3600.0
    }

    /// Seed for an independent stream, offset from the master seed.
    pub fn derived_seed(&self, stream: u64) -> u64 {
        self.seed.wrapping_add(stream.wrapping_mul(0x9E37_79B9_7F4A_7C15))
    }
}

/// Complete, owned record of one tick, taken after the pack update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimSnapshot {
    /// Driver step index.
    pub step: u64,
    /// Simulated time at the end of the tick (s).
    pub time_s: f64,
    /// Hour of day at the start of the tick.
    pub hour_of_day: f64,
    pub dt_s: f64,
    pub solar_w: f64,
    pub demand_w: f64,
    /// Pack after the tick.
    pub pack: PackState,
    /// BMS view of the post-tick pack.
    pub bms: BmsOutput,
    /// EMS decision taken for this tick.
    pub dispatch: EmsOutput,
    /// Why the pack refused the tick, if it did.
    pub pack_error: Option<String>,
}

impl SimSnapshot {
    /// Current that actually flowed (A, positive = discharge).
    pub fn applied_current_a(&self) -> f64 {
        if self.pack_error.is_some() {
            0.0
        } else {
            self.dispatch.pack_current_request
        }
    }
}

impl fmt::Display for SimSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "t={:>4} ({:>5.2}h) | solar={:>7.0} W  demand={:>7.0} W | \
             I={:>7.2} A  V={:>6.1} V  SoC={:>5.1}% (spread {:.2}%)  T={:>5.1}°C | \
             bms={:<10} chg<={:>5.1} A dis<={:>5.1} A bal={} | \
             import={:>6.0} W export={:>6.0} W curtail={:>6.0} W{}",
            self.step,
            self.hour_of_day,
            self.solar_w,
            self.demand_w,
            self.applied_current_a(),
            self.pack.voltage_v,
            self.pack.soc * 100.0,
            self.pack.soc_spread() * 100.0,
            self.pack.temperature_c,
            self.bms.state,
            self.bms.max_charge_current,
            self.bms.max_discharge_current,
            self.bms.balancing_targets.len(),
            self.dispatch.grid_import_w,
            self.dispatch.grid_export_w,
            self.dispatch.curtailed_power_w,
            if self.pack_error.is_some() {
                " REJECTED"
            } else {
                ""
            },
        )
    }
}
