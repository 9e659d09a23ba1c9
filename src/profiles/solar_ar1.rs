//! Solar PV model with temporally correlated cloud variability (AR(1) process).

use rand::{SeedableRng, rngs::StdRng};

use super::types::{Profile, daylight_frac, gaussian_noise};

const MULTIPLIER_MIN: f64 = 0.2;
const MULTIPLIER_MAX: f64 = 1.2;

/// Solar array whose clear-sky output is scaled by a cloud multiplier that
/// reverts towards 1.0:
///
/// `m[t] = alpha * m[t-1] + (1 - alpha) * 1.0 + eps`, clamped to
/// `[0.2, 1.2]`, with `eps ~ N(0, cloud_noise_std²)`.
///
/// The multiplier advances every step, including at night, so cloud state
/// carries across the day.
#[derive(Debug, Clone)]
pub struct SolarPvAr1 {
    /// Peak generation at solar noon (W).
    pub peak_w: f64,
    steps_per_day: usize,
    pub sunrise_idx: usize,
    pub sunset_idx: usize,
    /// Persistence of the cloud multiplier.
    pub alpha: f64,
    /// Innovation standard deviation.
    pub cloud_noise_std: f64,
    multiplier: f64,
    rng: StdRng,
}

impl SolarPvAr1 {
    pub fn new(
        peak_w: f64,
        sunrise_idx: usize,
        sunset_idx: usize,
        alpha: f64,
        cloud_noise_std: f64,
        steps_per_day: usize,
        seed: u64,
    ) -> Self {
        Self {
            peak_w: peak_w.max(0.0),
            steps_per_day: steps_per_day.max(1),
            sunrise_idx,
            sunset_idx,
            alpha: alpha.clamp(0.0, 1.0),
            cloud_noise_std: cloud_noise_std.max(0.0),
            multiplier: 1.0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn advance_multiplier(&mut self) -> f64 {
        let eps = gaussian_noise(&mut self.rng, self.cloud_noise_std);
        self.multiplier = self.alpha * self.multiplier + (1.0 - self.alpha) + eps;
        self.multiplier = self.multiplier.clamp(MULTIPLIER_MIN, MULTIPLIER_MAX);
        self.multiplier
    }
}

impl Profile for SolarPvAr1 {
    fn power_w(&mut self, timestep: usize) -> f64 {
        let m = self.advance_multiplier();
        let frac = daylight_frac(
            timestep,
            self.steps_per_day,
            self.sunrise_idx,
            self.sunset_idx,
        );
        if frac <= 0.0 {
            return 0.0;
        }
        (self.peak_w * frac * m).max(0.0)
    }

    fn kind(&self) -> &'static str {
        "SolarPV_ar1"
    }
}
