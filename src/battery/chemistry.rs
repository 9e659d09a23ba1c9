//! Chemistry parameter sets and the open-circuit-voltage curve.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Minimum number of breakpoints accepted for an OCV table.
pub const MIN_OCV_POINTS: usize = 10;

/// Piecewise-linear open-circuit voltage as a function of SOC.
///
/// Breakpoints are `(soc, volts)` pairs with strictly increasing SOC spanning
/// exactly `0.0..=1.0` and non-decreasing voltage, so the curve has a
/// well-defined inverse over each strictly increasing segment.
///
/// # Examples
///
/// ```
/// use bess_sim::battery::chemistry::OcvCurve;
///
/// let points: Vec<(f64, f64)> = (0..=10)
///     .map(|i| (i as f64 / 10.0, 3.0 + 0.1 * i as f64))
///     .collect();
/// let ocv = OcvCurve::new(points).unwrap();
/// assert!((ocv.voltage_at(0.55) - 3.55).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<(f64, f64)>", into = "Vec<(f64, f64)>")]
pub struct OcvCurve {
    points: Vec<(f64, f64)>,
}

impl OcvCurve {
    /// Builds a curve from `(soc, volts)` breakpoints.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if there are fewer than [`MIN_OCV_POINTS`]
    /// points, the SOC axis is not strictly increasing from 0.0 to 1.0, a value
    /// is not finite, or the voltage decreases anywhere.
    pub fn new(points: Vec<(f64, f64)>) -> Result<Self, ConfigError> {
        const FIELD: &str = "pack.ocv_table";

        if points.len() < MIN_OCV_POINTS {
            return Err(ConfigError::new(
                FIELD,
                format!("needs at least {MIN_OCV_POINTS} breakpoints, got {}", points.len()),
            ));
        }
        if points.iter().any(|(s, v)| !s.is_finite() || !v.is_finite()) {
            return Err(ConfigError::new(FIELD, "breakpoints must be finite"));
        }
        let (first_soc, _) = points[0];
        let (last_soc, _) = points[points.len() - 1];
        if first_soc != 0.0 || last_soc != 1.0 {
            return Err(ConfigError::new(FIELD, "SOC axis must span 0.0 to 1.0"));
        }
        for pair in points.windows(2) {
            let ((s0, v0), (s1, v1)) = (pair[0], pair[1]);
            if s1 <= s0 {
                return Err(ConfigError::new(
                    FIELD,
                    format!("SOC must be strictly increasing (at soc={s1})"),
                ));
            }
            if v1 < v0 {
                return Err(ConfigError::new(
                    FIELD,
                    format!("voltage must be non-decreasing (at soc={s1})"),
                ));
            }
        }

        Ok(Self { points })
    }

    /// Open-circuit voltage at `soc`; SOC outside `[0, 1]` is clamped.
    pub fn voltage_at(&self, soc: f64) -> f64 {
        let soc = soc.clamp(0.0, 1.0);
        let idx = self
            .points
            .partition_point(|&(s, _)| s < soc)
            .clamp(1, self.points.len() - 1);
        let (s0, v0) = self.points[idx - 1];
        let (s1, v1) = self.points[idx];
        v0 + (v1 - v0) * (soc - s0) / (s1 - s0)
    }

    /// Inverse lookup: the lowest SOC whose OCV reaches `volts`.
    ///
    /// Voltages outside the table range clamp to SOC 0.0 or 1.0.
    pub fn soc_at(&self, volts: f64) -> f64 {
        let (_, v_min) = self.points[0];
        let (_, v_max) = self.points[self.points.len() - 1];
        if volts <= v_min {
            return 0.0;
        }
        if volts >= v_max {
            return 1.0;
        }
        let idx = self.points.partition_point(|&(_, v)| v < volts);
        let (s0, v0) = self.points[idx - 1];
        let (s1, v1) = self.points[idx];
        if v1 == v0 {
            return s0;
        }
        s0 + (s1 - s0) * (volts - v0) / (v1 - v0)
    }

    /// Voltage at SOC 0.0.
    pub fn min_voltage(&self) -> f64 {
        self.points[0].1
    }

    /// Voltage at SOC 1.0.
    pub fn max_voltage(&self) -> f64 {
        self.points[self.points.len() - 1].1
    }

    /// The raw breakpoints.
    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }
}

impl TryFrom<Vec<(f64, f64)>> for OcvCurve {
    type Error = ConfigError;

    fn try_from(points: Vec<(f64, f64)>) -> Result<Self, Self::Error> {
        Self::new(points)
    }
}

impl From<OcvCurve> for Vec<(f64, f64)> {
    fn from(curve: OcvCurve) -> Self {
        curve.points
    }
}

/// Supported cell chemistries.
///
/// Every chemistry feeds the same [`Cell`](super::Cell) update; only the
/// parameter set differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Chemistry {
    /// Nickel manganese cobalt oxide.
    #[default]
    Nmc,
    /// Lithium iron phosphate.
    Lfp,
    /// Lithium titanate.
    Lto,
}

const NMC_OCV: [f64; 11] = [
    3.00, 3.45, 3.55, 3.62, 3.68, 3.74, 3.82, 3.90, 3.98, 4.07, 4.20,
];
const LFP_OCV: [f64; 11] = [
    2.50, 3.10, 3.20, 3.25, 3.28, 3.30, 3.31, 3.32, 3.33, 3.35, 3.60,
];
const LTO_OCV: [f64; 11] = [
    1.80, 2.10, 2.20, 2.25, 2.30, 2.35, 2.40, 2.45, 2.50, 2.60, 2.80,
];

impl Chemistry {
    /// Name used in logs and tables.
    pub fn name(self) -> &'static str {
        match self {
            Self::Nmc => "NMC",
            Self::Lfp => "LFP",
            Self::Lto => "LTO",
        }
    }

    /// Built-in OCV curve sampled every 10 % SOC.
    pub fn ocv_curve(self) -> OcvCurve {
        let volts = match self {
            Self::Nmc => NMC_OCV,
            Self::Lfp => LFP_OCV,
            Self::Lto => LTO_OCV,
        };
        let points = volts
            .iter()
            .enumerate()
            .map(|(i, &v)| (i as f64 / 10.0, v))
            .collect();
        // Built-in tables already satisfy every `OcvCurve::new` rule.
        OcvCurve { points }
    }

    /// Typical internal resistance of a ~50 Ah cell (ohm).
    pub fn internal_resistance_ohm(self) -> f64 {
        match self {
            Self::Nmc => 0.0015,
            Self::Lfp => 0.0012,
            Self::Lto => 0.0008,
        }
    }

    /// Rated cycle life to end of life.
    pub fn cycle_life(self) -> f64 {
        match self {
            Self::Nmc => 1_000.0,
            Self::Lfp => 4_000.0,
            Self::Lto => 10_000.0,
        }
    }

    /// Absolute temperature at which a cell refuses current (°C).
    pub fn max_temperature_c(self) -> f64 {
        match self {
            Self::Nmc => 80.0,
            Self::Lfp => 85.0,
            Self::Lto => 90.0,
        }
    }

    /// Default per-cell voltage thresholds as `(lower, upper)` triples of
    /// `(warning, soft, hard)` volts.
    pub fn voltage_thresholds(self) -> ((f64, f64, f64), (f64, f64, f64)) {
        match self {
            Self::Nmc => ((3.40, 3.30, 3.00), (4.10, 4.15, 4.30)),
            Self::Lfp => ((2.90, 2.80, 2.40), (3.45, 3.50, 3.70)),
            Self::Lto => ((2.00, 1.95, 1.70), (2.65, 2.70, 2.90)),
        }
    }
}

/// Static parameters of one cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellParams {
    /// Chemistry tag the parameters were derived from.
    pub chemistry: Chemistry,
    /// Rated capacity (Ah).
    pub capacity_ah: f64,
    /// Internal resistance (ohm).
    pub internal_resistance_ohm: f64,
    /// Lumped thermal mass (J/K).
    pub thermal_mass_j_per_k: f64,
    /// Newtonian cooling coefficient `k` (1/s).
    pub cooling_coeff_per_s: f64,
    /// Ambient temperature (°C).
    pub ambient_c: f64,
    /// Absolute temperature limit enforced by the cell itself (°C).
    pub max_temperature_c: f64,
    /// Rated cycle life used for state-of-health estimation.
    pub cycle_life: f64,
    /// Open-circuit voltage curve.
    pub ocv: OcvCurve,
}

impl CellParams {
    /// Default parameter set for `chemistry` at `capacity_ah`.
    pub fn for_chemistry(chemistry: Chemistry, capacity_ah: f64) -> Self {
        Self {
            chemistry,
            capacity_ah,
            internal_resistance_ohm: chemistry.internal_resistance_ohm(),
            // ~0.9 kg of cell per 50 Ah at ~1 kJ/(kg·K)
            thermal_mass_j_per_k: 18.0 * capacity_ah,
            cooling_coeff_per_s: 0.002,
            ambient_c: 25.0,
            max_temperature_c: chemistry.max_temperature_c(),
            cycle_life: chemistry.cycle_life(),
            ocv: chemistry.ocv_curve(),
        }
    }

    /// Checks physical plausibility of every parameter.
    ///
    /// # Errors
    ///
    /// Returns the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("pack.capacity_ah", self.capacity_ah),
            ("pack.thermal_mass_j_per_k", self.thermal_mass_j_per_k),
            ("pack.cycle_life", self.cycle_life),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::new(field, "must be > 0"));
            }
        }
        let non_negative = [
            ("pack.internal_resistance_ohm", self.internal_resistance_ohm),
            ("pack.cooling_coeff_per_s", self.cooling_coeff_per_s),
        ];
        for (field, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::new(field, "must be >= 0"));
            }
        }
        if !self.ambient_c.is_finite() || self.max_temperature_c <= self.ambient_c {
            return Err(ConfigError::new(
                "pack.max_temperature_c",
                "must be above the ambient temperature",
            ));
        }
        Ok(())
    }
}
