use rand::{SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use super::types::{Profile, gaussian_noise};
use crate::error::ConfigError;

/// Household demand shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DemandConfig {
    /// Mean base load (W).
    pub base_w: f64,
    /// Amplitude of the daily sinusoid (W).
    pub amplitude_w: f64,
    /// Hour of the sinusoid maximum.
    pub daily_peak_hour: f64,
    /// Height of the additional evening bump (W).
    pub evening_peak_w: f64,
    /// Centre of the evening bump (hour).
    pub evening_peak_hour: f64,
    /// Width (standard deviation) of the evening bump (hours).
    pub evening_peak_width_h: f64,
    /// Standard deviation of additive noise (W).
    pub noise_std_w: f64,
}

impl Default for DemandConfig {
    fn default() -> Self {
        Self {
            base_w: 1_500.0,
            amplitude_w: 500.0,
            daily_peak_hour: 14.0,
            evening_peak_w: 2_000.0,
            evening_peak_hour: 19.0,
            evening_peak_width_h: 1.5,
            noise_std_w: 150.0,
        }
    }
}

impl DemandConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("demand.base_w", self.base_w),
            ("demand.amplitude_w", self.amplitude_w),
            ("demand.evening_peak_w", self.evening_peak_w),
            ("demand.noise_std_w", self.noise_std_w),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::new(field, "must be >= 0"));
            }
        }
        if !(self.evening_peak_width_h > 0.0) {
            return Err(ConfigError::new("demand.evening_peak_width_h", "must be > 0"));
        }
        for (field, value) in [
            ("demand.daily_peak_hour", self.daily_peak_hour),
            ("demand.evening_peak_hour", self.evening_peak_hour),
        ] {
            if !(0.0..24.0).contains(&value) {
                return Err(ConfigError::new(field, "must be within [0, 24)"));
            }
        }
        Ok(())
    }
}

/// A demand generator modelling daily household consumption.
///
/// Demand is a sinusoidal daily pattern around `base_w`, plus a Gaussian
/// evening bump and seeded noise, floored at zero.
///
/// # Examples
///
/// ```
/// use bess_sim::profiles::{DemandConfig, DemandProfile, Profile};
///
/// let mut load = DemandProfile::new(DemandConfig::default(), 24, 42);
/// let evening = load.power_w(19);
/// assert!(evening > 0.0);
/// ```
#[derive(Debug, Clone)]
pub struct DemandProfile {
    config: DemandConfig,
    steps_per_day: usize,
    rng: StdRng,
}

impl DemandProfile {
    /// Creates a generator.
    ///
    /// # Arguments
    ///
    /// * `config` - Shape parameters
    /// * `steps_per_day` - Number of timesteps per simulated day
    /// * `seed` - Random seed for the noise stream
    pub fn new(config: DemandConfig, steps_per_day: usize, seed: u64) -> Self {
        Self {
            config,
            steps_per_day: steps_per_day.max(1),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Noise-free demand at `hour` of day.
    pub fn expected_w(&self, hour: f64) -> f64 {
        let c = &self.config;
        let angle = 2.0 * std::f64::consts::PI * (hour - c.daily_peak_hour) / 24.0;
        // wrap distance to the evening peak across midnight
        let mut dh = (hour - c.evening_peak_hour).abs();
        dh = dh.min(24.0 - dh);
        let bump = c.evening_peak_w * (-0.5 * (dh / c.evening_peak_width_h).powi(2)).exp();
        (c.base_w + c.amplitude_w * angle.cos() + bump).max(0.0)
    }
}

impl Profile for DemandProfile {
    fn power_w(&mut self, timestep: usize) -> f64 {
        let day_pos = (timestep % self.steps_per_day) as f64 / self.steps_per_day as f64;
        let noise = gaussian_noise(&mut self.rng, self.config.noise_std_w);
        (self.expected_w(day_pos * 24.0) + noise).max(0.0)
    }

    fn kind(&self) -> &'static str {
        "Demand"
    }
}
