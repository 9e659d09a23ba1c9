//! Common types and helpers for the solar and demand generators.

use rand::{Rng, rngs::StdRng};

/// A seeded time series of non-negative power.
///
/// Implementations may keep internal state (noise streams, AR(1)
/// multipliers), so they must be queried in timestep order.
pub trait Profile {
    /// Power in watts (>= 0) at `timestep`.
    fn power_w(&mut self, timestep: usize) -> f64;

    /// Human-readable generator name.
    fn kind(&self) -> &'static str;
}

/// Gaussian noise via the Box-Muller transform.
///
/// # Arguments
///
/// * `rng` - Random number generator
/// * `std_dev` - Standard deviation of the noise
///
/// # Returns
///
/// A sample from N(0, `std_dev`²), or 0.0 when `std_dev <= 0`.
pub fn gaussian_noise(rng: &mut StdRng, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return 0.0;
    }

    let u1: f64 = rng.random::<f64>().clamp(1e-12, 1.0);
    let u2: f64 = rng.random::<f64>();
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    z0 * std_dev
}

/// Half-sine daylight shape: 0 outside `[sunrise_idx, sunset_idx)`, 1 at
/// solar noon.
pub fn daylight_frac(t: usize, steps_per_day: usize, sunrise_idx: usize, sunset_idx: usize) -> f64 {
    let t_day = t % steps_per_day.max(1);
    if t_day < sunrise_idx || t_day >= sunset_idx {
        return 0.0;
    }
    let span = (sunset_idx - sunrise_idx) as f64;
    let x = (t_day - sunrise_idx) as f64 / span;
    (std::f64::consts::PI * x).sin().max(0.0)
}

/// Converts an hour of day into a step index, rounding to the nearest step.
pub fn hour_to_step(hour: f64, steps_per_day: usize) -> usize {
    ((hour / 24.0) * steps_per_day as f64).round().max(0.0) as usize
}
