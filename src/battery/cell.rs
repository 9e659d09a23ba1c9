//! Reduced-order single-cell model: OCV curve, series resistance and a
//! lumped thermal capacitance.

use serde::{Deserialize, Serialize};

use super::chemistry::CellParams;
use crate::error::ConfigError;

/// State of health below which a cell is reported as degraded.
pub const DEGRADED_STATE_OF_HEALTH: f64 = 0.8;

/// Rounding slack accepted at the SOC bounds before a fault is raised.
const SOC_EPSILON: f64 = 1e-9;

/// Health flag of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellHealth {
    #[default]
    Healthy,
    Degraded,
    Faulted,
}

/// Reason a cell refused a current.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CellFault {
    #[error("overcharge: SOC would reach {soc:.4}")]
    OverCharge { soc: f64 },
    #[error("overdischarge: SOC would reach {soc:.4}")]
    OverDischarge { soc: f64 },
    #[error("overtemperature: {temperature_c:.1} °C exceeds {limit_c:.1} °C")]
    OverTemperature { temperature_c: f64, limit_c: f64 },
}

/// Result of a successful preview, committed by [`Cell::commit`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellUpdate {
    soc: f64,
    temperature_c: f64,
    voltage_v: f64,
    current_a: f64,
    throughput_ah: f64,
}

/// A single battery cell.
///
/// Positive current discharges the cell. State only changes through
/// [`Cell::apply`] (or a preview/commit pair driven by the pack), and a failed
/// update leaves everything but the health flag untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    params: CellParams,
    soc: f64,
    temperature_c: f64,
    voltage_v: f64,
    current_a: f64,
    throughput_ah: f64,
    health: CellHealth,
}

impl Cell {
    /// Creates a rested cell at `soc` and the ambient temperature.
    ///
    /// # Arguments
    ///
    /// * `params` - Chemistry-derived parameters
    /// * `soc` - Initial state of charge (0.0 to 1.0)
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` when the parameters are implausible or `soc`
    /// lies outside `[0, 1]`.
    pub fn new(params: CellParams, soc: f64) -> Result<Self, ConfigError> {
        params.validate()?;
        if !(0.0..=1.0).contains(&soc) {
            return Err(ConfigError::new(
                "pack.initial_soc",
                format!("must be within [0, 1], got {soc}"),
            ));
        }
        let temperature_c = params.ambient_c;
        let voltage_v = params.ocv.voltage_at(soc);
        Ok(Self {
            params,
            soc,
            temperature_c,
            voltage_v,
            current_a: 0.0,
            throughput_ah: 0.0,
            health: CellHealth::Healthy,
        })
    }

    /// Applies `current_a` for `duration_s` seconds.
    ///
    /// # Errors
    ///
    /// Returns the matching [`CellFault`] when the step would leave SOC
    /// outside `[0, 1]` or push the temperature past the absolute limit. The
    /// cell is then marked faulted and its state is otherwise unchanged.
    pub fn apply(&mut self, current_a: f64, duration_s: f64) -> Result<(), CellFault> {
        match self.preview(current_a, duration_s) {
            Ok(update) => {
                self.commit(update);
                Ok(())
            }
            Err(fault) => {
                self.mark_faulted();
                Err(fault)
            }
        }
    }

    /// Computes the state that `apply` would produce without mutating the cell.
    pub fn preview(&self, current_a: f64, duration_s: f64) -> Result<CellUpdate, CellFault> {
        let capacity_as = 3600.0 * self.params.capacity_ah;
        let mut soc = self.soc - current_a * duration_s / capacity_as;

        if soc < -SOC_EPSILON {
            return Err(CellFault::OverDischarge { soc });
        }
        if soc > 1.0 + SOC_EPSILON {
            return Err(CellFault::OverCharge { soc });
        }
        soc = soc.clamp(0.0, 1.0);

        let temperature_c = self.temperature_after(current_a, duration_s);
        if temperature_c > self.params.max_temperature_c {
            return Err(CellFault::OverTemperature {
                temperature_c,
                limit_c: self.params.max_temperature_c,
            });
        }

        Ok(CellUpdate {
            soc,
            temperature_c,
            voltage_v: self.params.ocv.voltage_at(soc)
                - current_a * self.params.internal_resistance_ohm,
            current_a,
            throughput_ah: self.throughput_ah + current_a.abs() * duration_s / 3600.0,
        })
    }

    /// Exact solution of `dT/dt = I²R/m − k(T − T_amb)` over `duration_s`.
    fn temperature_after(&self, current_a: f64, duration_s: f64) -> f64 {
        let p = &self.params;
        let heat_w = current_a * current_a * p.internal_resistance_ohm;
        if p.cooling_coeff_per_s == 0.0 {
            return self.temperature_c + heat_w / p.thermal_mass_j_per_k * duration_s;
        }
        let t_eq = p.ambient_c + heat_w / (p.thermal_mass_j_per_k * p.cooling_coeff_per_s);
        t_eq + (self.temperature_c - t_eq) * (-p.cooling_coeff_per_s * duration_s).exp()
    }

    /// Commits a previewed update.
    pub fn commit(&mut self, update: CellUpdate) {
        self.soc = update.soc;
        self.temperature_c = update.temperature_c;
        self.voltage_v = update.voltage_v;
        self.current_a = update.current_a;
        self.throughput_ah = update.throughput_ah;
        if self.health != CellHealth::Faulted {
            self.health = if self.state_of_health() < DEGRADED_STATE_OF_HEALTH {
                CellHealth::Degraded
            } else {
                CellHealth::Healthy
            };
        }
    }

    pub(crate) fn mark_faulted(&mut self) {
        self.health = CellHealth::Faulted;
    }

    /// Returns a faulted cell to `Healthy` or `Degraded`.
    pub fn clear_fault(&mut self) {
        if self.health == CellHealth::Faulted {
            self.health = if self.state_of_health() < DEGRADED_STATE_OF_HEALTH {
                CellHealth::Degraded
            } else {
                CellHealth::Healthy
            };
        }
    }

    pub fn soc(&self) -> f64 {
        self.soc
    }

    /// Terminal voltage under the last applied current.
    pub fn voltage(&self) -> f64 {
        self.voltage_v
    }

    pub fn temperature(&self) -> f64 {
        self.temperature_c
    }

    pub fn current(&self) -> f64 {
        self.current_a
    }

    /// Cumulative charge moved in either direction (Ah).
    pub fn throughput_ah(&self) -> f64 {
        self.throughput_ah
    }

    pub fn health(&self) -> CellHealth {
        self.health
    }

    /// Equivalent full cycles (one cycle = one full discharge plus one full charge).
    pub fn equivalent_cycles(&self) -> f64 {
        self.throughput_ah / (2.0 * self.params.capacity_ah)
    }

    /// Remaining fraction of rated cycle life.
    pub fn state_of_health(&self) -> f64 {
        (1.0 - self.equivalent_cycles() / self.params.cycle_life).max(0.0)
    }

    pub fn capacity_ah(&self) -> f64 {
        self.params.capacity_ah
    }

    pub fn params(&self) -> &CellParams {
        &self.params
    }
}
