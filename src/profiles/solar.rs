use rand::{SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use super::solar_ar1::SolarPvAr1;
use super::types::{Profile, daylight_frac, gaussian_noise, hour_to_step};
use crate::error::ConfigError;

/// Cloud model used by the solar generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolarModel {
    /// Clear-sky shape with independent multiplicative noise per step.
    #[default]
    Simple,
    /// Clear-sky shape scaled by a mean-reverting AR(1) cloud multiplier.
    Ar1,
}

/// Solar array configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolarConfig {
    pub model: SolarModel,
    /// Peak generation at solar noon (W).
    pub peak_w: f64,
    pub sunrise_hour: f64,
    pub sunset_hour: f64,
    /// Relative noise of the simple model.
    pub noise_std: f64,
    /// AR(1) persistence (0 = white noise, 1 = frozen).
    pub alpha: f64,
    /// AR(1) innovation standard deviation.
    pub cloud_noise_std: f64,
}

impl Default for SolarConfig {
    fn default() -> Self {
        Self {
            model: SolarModel::Simple,
            peak_w: 5_000.0,
            sunrise_hour: 6.0,
            sunset_hour: 18.0,
            noise_std: 0.05,
            alpha: 0.9,
            cloud_noise_std: 0.1,
        }
    }
}

impl SolarConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.peak_w.is_finite() && self.peak_w >= 0.0) {
            return Err(ConfigError::new("solar.peak_w", "must be >= 0"));
        }
        if !(0.0 <= self.sunrise_hour
            && self.sunrise_hour < self.sunset_hour
            && self.sunset_hour <= 24.0)
        {
            return Err(ConfigError::new(
                "solar.sunset_hour",
                "expected 0 <= sunrise_hour < sunset_hour <= 24",
            ));
        }
        if !(self.noise_std >= 0.0) {
            return Err(ConfigError::new("solar.noise_std", "must be >= 0"));
        }
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(ConfigError::new("solar.alpha", "must be within [0, 1]"));
        }
        if !(self.cloud_noise_std >= 0.0) {
            return Err(ConfigError::new("solar.cloud_noise_std", "must be >= 0"));
        }
        Ok(())
    }

    /// Daylight window as step indices.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` when the window collapses at this resolution.
    pub fn daylight_steps(&self, steps_per_day: usize) -> Result<(usize, usize), ConfigError> {
        let sunrise = hour_to_step(self.sunrise_hour, steps_per_day);
        let sunset = hour_to_step(self.sunset_hour, steps_per_day).min(steps_per_day);
        if sunrise >= sunset {
            return Err(ConfigError::new(
                "solar.sunset_hour",
                format!("daylight window is empty at {steps_per_day} steps per day"),
            ));
        }
        Ok((sunrise, sunset))
    }

    /// Builds the configured generator.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` for an invalid configuration.
    pub fn build(
        &self,
        steps_per_day: usize,
        seed: u64,
    ) -> Result<Box<dyn Profile + Send>, ConfigError> {
        self.validate()?;
        let (sunrise, sunset) = self.daylight_steps(steps_per_day)?;
        Ok(match self.model {
            SolarModel::Simple => Box::new(SolarPv::new(
                self.peak_w,
                sunrise,
                sunset,
                self.noise_std,
                steps_per_day,
                seed,
            )),
            SolarModel::Ar1 => Box::new(SolarPvAr1::new(
                self.peak_w,
                sunrise,
                sunset,
                self.alpha,
                self.cloud_noise_std,
                steps_per_day,
                seed,
            )),
        })
    }
}

/// Clear-sky solar array with per-step multiplicative noise.
#[derive(Debug, Clone)]
pub struct SolarPv {
    /// Peak generation at solar noon (W).
    pub peak_w: f64,
    steps_per_day: usize,
    pub sunrise_idx: usize,
    pub sunset_idx: usize,
    /// Relative noise standard deviation.
    pub noise_std: f64,
    rng: StdRng,
}

impl SolarPv {
    /// Creates a generator. Negative peak or noise values clamp to zero.
    ///
    /// The caller guarantees `sunrise_idx < sunset_idx <= steps_per_day`;
    /// [`SolarConfig::build`] checks this.
    pub fn new(
        peak_w: f64,
        sunrise_idx: usize,
        sunset_idx: usize,
        noise_std: f64,
        steps_per_day: usize,
        seed: u64,
    ) -> Self {
        Self {
            peak_w: peak_w.max(0.0),
            steps_per_day: steps_per_day.max(1),
            sunrise_idx,
            sunset_idx,
            noise_std: noise_std.max(0.0),
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Profile for SolarPv {
    fn power_w(&mut self, timestep: usize) -> f64 {
        let frac = daylight_frac(
            timestep,
            self.steps_per_day,
            self.sunrise_idx,
            self.sunset_idx,
        );
        if frac <= 0.0 {
            return 0.0;
        }
        let noise_mult = 1.0 + gaussian_noise(&mut self.rng, self.noise_std);
        (self.peak_w * frac * noise_mult).max(0.0)
    }

    fn kind(&self) -> &'static str {
        "SolarPV"
    }
}
