//! Energy management system: greedy single-pass dispatch of the pack against
//! solar, demand and the grid.

pub mod tariff;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use tariff::Tariff;

use crate::error::ConfigError;
use crate::forecast::RollingForecast;

/// Dispatch policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmsPolicy {
    /// SOC below which the EMS will not discharge.
    pub reserve_soc: f64,
    /// Grid export cap (W).
    pub max_export_w: f64,
    /// Grid import cap (W); unbounded when unset.
    pub max_import_w: Option<f64>,
    /// Off-peak grid charging runs while SOC is below this; disabled when unset.
    pub grid_charge_below_soc: Option<f64>,
    /// Length of the solar and demand history buffers (steps).
    pub forecast_window: usize,
}

impl Default for EmsPolicy {
    fn default() -> Self {
        Self {
            reserve_soc: 0.1,
            max_export_w: 5_000.0,
            max_import_w: None,
            grid_charge_below_soc: None,
            forecast_window: 96,
        }
    }
}

impl EmsPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..1.0).contains(&self.reserve_soc) {
            return Err(ConfigError::new("ems.reserve_soc", "must be within [0, 1)"));
        }
        if !(self.max_export_w.is_finite() && self.max_export_w >= 0.0) {
            return Err(ConfigError::new("ems.max_export_w", "must be >= 0"));
        }
        if let Some(cap) = self.max_import_w
            && !(cap.is_finite() && cap >= 0.0)
        {
            return Err(ConfigError::new("ems.max_import_w", "must be >= 0"));
        }
        if let Some(th) = self.grid_charge_below_soc
            && !(th > self.reserve_soc && th <= 1.0)
        {
            return Err(ConfigError::new(
                "ems.grid_charge_below_soc",
                "must be within (reserve_soc, 1]",
            ));
        }
        if self.forecast_window == 0 {
            return Err(ConfigError::new("ems.forecast_window", "must be > 0"));
        }
        Ok(())
    }
}

/// Everything the EMS needs for one tick, passed by value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmsInput {
    pub solar_w: f64,
    pub demand_w: f64,
    /// BMS charge limit (A, magnitude).
    pub max_charge_a: f64,
    /// BMS discharge limit (A, magnitude).
    pub max_discharge_a: f64,
    pub pack_voltage_v: f64,
    /// Aggregate pack SOC.
    pub soc: f64,
    pub min_cell_soc: f64,
    pub max_cell_soc: f64,
    pub pack_capacity_ah: f64,
    pub dt_s: f64,
    /// Hour of day (0.0..24.0) for tariff lookups.
    pub hour_of_day: f64,
}

/// What the pack is being asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    #[default]
    Idle,
    Discharge,
    SolarCharge,
    GridCharge,
}

impl DispatchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Discharge => "discharge",
            Self::SolarCharge => "solar_charge",
            Self::GridCharge => "grid_charge",
        }
    }
}

/// Dispatch result. Every power figure is a non-negative magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EmsOutput {
    /// Signed pack current: positive discharges, negative charges (A).
    pub pack_current_request: f64,
    /// Pack power magnitude at the current voltage (W).
    pub pack_power_w: f64,
    pub grid_import_w: f64,
    pub grid_export_w: f64,
    pub curtailed_power_w: f64,
    /// Deficit neither the pack nor a capped grid import could cover (W).
    pub unserved_power_w: f64,
    /// Import cost minus export revenue for the tick.
    pub grid_cost: f64,
    pub mode: DispatchMode,
}

/// Greedy dispatcher with rolling solar and demand history.
#[derive(Debug, Clone)]
pub struct Ems {
    policy: EmsPolicy,
    tariff: Tariff,
    solar: RollingForecast,
    demand: RollingForecast,
    last: Option<EmsOutput>,
}

impl Ems {
    /// # Errors
    ///
    /// Returns a `ConfigError` for an out-of-range policy or tariff value.
    pub fn new(policy: EmsPolicy, tariff: Tariff) -> Result<Self, ConfigError> {
        policy.validate()?;
        tariff.validate()?;
        Ok(Self {
            solar: RollingForecast::new(policy.forecast_window),
            demand: RollingForecast::new(policy.forecast_window),
            policy,
            tariff,
            last: None,
        })
    }

    pub fn policy(&self) -> &EmsPolicy {
        &self.policy
    }

    pub fn tariff(&self) -> &Tariff {
        &self.tariff
    }

    pub fn solar_history(&self) -> &RollingForecast {
        &self.solar
    }

    pub fn demand_history(&self) -> &RollingForecast {
        &self.demand
    }

    /// Last setpoint produced by [`Ems::dispatch`].
    pub fn last_setpoint(&self) -> Option<&EmsOutput> {
        self.last.as_ref()
    }

    /// Computes the pack current request and grid breakdown for one tick.
    ///
    /// Deficit is served from the pack first, within the BMS discharge
    /// limit, the reserve floor and the emptiest cell; the grid covers the
    /// rest. Surplus charges the pack within the BMS charge limit and the
    /// fullest cell's headroom, then exports up to the cap and curtails the
    /// remainder. Off-peak grid charging, when enabled, replaces discharging
    /// while SOC is below its threshold and the solar history does not
    /// promise enough surplus to refill the pack.
    pub fn dispatch(&mut self, input: &EmsInput) -> EmsOutput {
        let solar_w = sanitize("solar_w", input.solar_w);
        let demand_w = sanitize("demand_w", input.demand_w);
        let max_charge_a = sanitize("max_charge_a", input.max_charge_a);
        let max_discharge_a = sanitize("max_discharge_a", input.max_discharge_a);

        let grid_charge = self.grid_charge_wanted(input);
        self.solar.push(solar_w);
        self.demand.push(demand_w);

        let volts = input.pack_voltage_v;
        let pack_usable = volts.is_finite() && volts > 0.0 && input.dt_s > 0.0;
        // Amps that move the pack by one unit of SOC over this tick.
        let amps_per_soc = if pack_usable {
            input.pack_capacity_ah * 3600.0 / input.dt_s
        } else {
            0.0
        };

        let net_w = demand_w - solar_w;
        let mut out = EmsOutput::default();

        if net_w < 0.0 {
            let surplus_w = -net_w;
            let charge_a = if pack_usable {
                let headroom_a = ((1.0 - input.max_cell_soc) * amps_per_soc).max(0.0);
                (surplus_w / volts).min(max_charge_a).min(headroom_a)
            } else {
                0.0
            };
            out.pack_current_request = -charge_a;
            let left_w = (surplus_w - charge_a * volts.max(0.0)).max(0.0);
            out.grid_export_w = left_w.min(self.policy.max_export_w);
            out.curtailed_power_w = left_w - out.grid_export_w;
            if charge_a > 0.0 {
                out.mode = DispatchMode::SolarCharge;
            }
        } else if let Some(target) = grid_charge.filter(|_| pack_usable) {
            let import_room_w = self
                .policy
                .max_import_w
                .map_or(f64::INFINITY, |cap| (cap - net_w).max(0.0));
            let headroom_a = ((1.0 - input.max_cell_soc) * amps_per_soc).max(0.0);
            let charge_a = max_charge_a
                .min(headroom_a)
                .min(((target - input.soc) * amps_per_soc).max(0.0))
                .min(import_room_w / volts);
            out.pack_current_request = -charge_a;
            self.import(&mut out, net_w + charge_a * volts);
            if charge_a > 0.0 {
                out.mode = DispatchMode::GridCharge;
            }
        } else {
            let discharge_a = if pack_usable {
                let reserve_a = ((input.soc - self.policy.reserve_soc) * amps_per_soc).max(0.0);
                let floor_a = (input.min_cell_soc * amps_per_soc).max(0.0);
                (net_w / volts)
                    .min(max_discharge_a)
                    .min(reserve_a)
                    .min(floor_a)
            } else {
                0.0
            };
            out.pack_current_request = discharge_a;
            self.import(&mut out, net_w - discharge_a * volts.max(0.0));
            if discharge_a > 0.0 {
                out.mode = DispatchMode::Discharge;
            }
        }

        let clamped = out.pack_current_request.clamp(-max_charge_a, max_discharge_a);
        if clamped != out.pack_current_request {
            warn!(
                requested = out.pack_current_request,
                clamped, "dispatch clamped to BMS limits"
            );
            out.pack_current_request = clamped;
        }
        if out.pack_current_request == 0.0 {
            // normalise -0.0 and drop any residual mode
            out.pack_current_request = 0.0;
            out.mode = DispatchMode::Idle;
        }
        out.pack_power_w = out.pack_current_request.abs() * volts.max(0.0);
        out.grid_cost = self.tariff.cost(
            out.grid_import_w,
            out.grid_export_w,
            input.dt_s.max(0.0),
            input.hour_of_day,
        );

        debug!(
            current = out.pack_current_request,
            import_w = out.grid_import_w,
            export_w = out.grid_export_w,
            curtailed_w = out.curtailed_power_w,
            mode = ?out.mode,
            "ems dispatch"
        );
        self.last = Some(out);
        out
    }

    /// Splits a grid draw into import and unserved under the import cap.
    fn import(&self, out: &mut EmsOutput, draw_w: f64) {
        let draw_w = draw_w.max(0.0);
        out.grid_import_w = match self.policy.max_import_w {
            Some(cap) => draw_w.min(cap),
            None => draw_w,
        };
        out.unserved_power_w = draw_w - out.grid_import_w;
    }

    /// Target SOC for off-peak grid charging on this tick, if it should run.
    fn grid_charge_wanted(&self, input: &EmsInput) -> Option<f64> {
        let threshold = self.policy.grid_charge_below_soc?;
        if input.soc >= threshold || self.tariff.is_peak(input.hour_of_day) {
            return None;
        }
        let horizon = self.policy.forecast_window;
        let expected_surplus_wh: f64 = self
            .solar
            .forecast(horizon)
            .into_iter()
            .zip(self.demand.forecast(horizon))
            .map(|(s, d)| (s - d).max(0.0) * input.dt_s / 3600.0)
            .sum();
        let needed_wh =
            (threshold - input.soc) * input.pack_capacity_ah * input.pack_voltage_v.max(0.0);
        if expected_surplus_wh >= needed_wh {
            return None;
        }
        Some(threshold)
    }
}

fn sanitize(name: &'static str, value: f64) -> f64 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        warn!(input = name, value, "invalid EMS input, using 0");
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn ems(policy: EmsPolicy) -> Ems {
        Ems::new(policy, Tariff::default()).unwrap()
    }

    fn input(solar_w: f64, demand_w: f64) -> EmsInput {
        EmsInput {
            solar_w,
            demand_w,
            max_charge_a: 25.0,
            max_discharge_a: 20.0,
            pack_voltage_v: 400.0,
            soc: 0.5,
            min_cell_soc: 0.5,
            max_cell_soc: 0.5,
            pack_capacity_ah: 50.0,
            dt_s: 900.0,
            hour_of_day: 12.0,
        }
    }

    #[test]
    fn deficit_is_served_by_pack() {
        let mut e = ems(EmsPolicy::default());
        let out = e.dispatch(&input(0.0, 2000.0));
        assert_abs_diff_eq!(out.pack_current_request, 5.0, epsilon = 1e-12);
        assert_eq!(out.grid_import_w, 0.0);
        assert_eq!(out.mode, DispatchMode::Discharge);
    }

    #[test]
    fn surplus_charges_then_exports_then_curtails() {
        let mut e = ems(EmsPolicy {
            max_export_w: 1000.0,
            ..EmsPolicy::default()
        });
        let mut inp = input(6000.0, 1000.0);
        inp.max_charge_a = 7.5;
        let out = e.dispatch(&inp);
        assert_abs_diff_eq!(out.pack_current_request, -7.5, epsilon = 1e-12);
        assert_abs_diff_eq!(out.grid_export_w, 1000.0, epsilon = 1e-9);
        assert_abs_diff_eq!(out.curtailed_power_w, 1000.0, epsilon = 1e-9);
        assert_eq!(out.grid_import_w, 0.0);
    }

    #[test]
    fn fully_absorbed_surplus_exports_nothing() {
        let mut e = ems(EmsPolicy::default());
        let mut inp = input(1960.594216362624, 88.56227091762085);
        inp.max_charge_a = 50.68;
        inp.soc = 0.0;
        inp.min_cell_soc = 0.0;
        inp.max_cell_soc = 0.0;
        let out = e.dispatch(&inp);
        assert_abs_diff_eq!(
            out.pack_current_request,
            -(1960.594216362624 - 88.56227091762085) / 400.0,
            epsilon = 1e-12
        );
        assert!(out.grid_export_w >= 0.0, "export {}", out.grid_export_w);
        assert!(out.curtailed_power_w >= 0.0, "curtailed {}", out.curtailed_power_w);
        assert!(out.grid_export_w < 1e-9);
    }

    #[test]
    fn deficit_beyond_limit_is_imported() {
        let mut e = ems(EmsPolicy::default());
        let out = e.dispatch(&input(0.0, 10_000.0));
        assert_eq!(out.pack_current_request, 20.0);
        assert_abs_diff_eq!(out.grid_import_w, 2000.0, epsilon = 1e-9);
        assert_eq!(out.unserved_power_w, 0.0);
    }

    #[test]
    fn import_cap_leaves_unserved() {
        let mut e = ems(EmsPolicy {
            max_import_w: Some(500.0),
            ..EmsPolicy::default()
        });
        let out = e.dispatch(&input(0.0, 10_000.0));
        assert_eq!(out.grid_import_w, 500.0);
        assert_abs_diff_eq!(out.unserved_power_w, 1500.0, epsilon = 1e-9);
    }

    #[test]
    fn reserve_floor_limits_discharge() {
        let mut e = ems(EmsPolicy::default());
        let mut inp = input(0.0, 8000.0);
        inp.soc = 0.105;
        let out = e.dispatch(&inp);
        // 0.005 * 50 Ah * 3600 / 900 s = 1 A
        assert_abs_diff_eq!(out.pack_current_request, 1.0, epsilon = 1e-9);

        inp.soc = 0.09;
        let out = e.dispatch(&inp);
        assert_eq!(out.pack_current_request, 0.0);
        assert_eq!(out.grid_import_w, 8000.0);
        assert_eq!(out.mode, DispatchMode::Idle);
    }

    #[test]
    fn full_cell_blocks_charging() {
        let mut e = ems(EmsPolicy::default());
        let mut inp = input(3000.0, 0.0);
        inp.max_cell_soc = 1.0;
        let out = e.dispatch(&inp);
        assert_eq!(out.pack_current_request, 0.0);
        assert_eq!(out.grid_export_w, 3000.0);
    }

    #[test]
    fn zero_voltage_means_no_pack_action() {
        let mut e = ems(EmsPolicy::default());
        let mut inp = input(0.0, 1000.0);
        inp.pack_voltage_v = 0.0;
        let out = e.dispatch(&inp);
        assert_eq!(out.pack_current_request, 0.0);
        assert_eq!(out.grid_import_w, 1000.0);
    }

    #[test]
    fn invalid_inputs_are_zeroed() {
        let mut e = ems(EmsPolicy::default());
        let out = e.dispatch(&input(f64::NAN, -50.0));
        assert_eq!(out.pack_current_request, 0.0);
        assert_eq!(out.grid_import_w, 0.0);
        assert_eq!(e.solar_history().last(), Some(0.0));
    }

    #[test]
    fn off_peak_grid_charging_below_threshold() {
        let mut e = ems(EmsPolicy {
            grid_charge_below_soc: Some(0.4),
            ..EmsPolicy::default()
        });
        let mut inp = input(0.0, 1000.0);
        inp.soc = 0.3;
        inp.hour_of_day = 3.0;
        let out = e.dispatch(&inp);
        assert_eq!(out.mode, DispatchMode::GridCharge);
        // limited by the 0.1 SOC left to the threshold: 0.1 * 50 Ah * 3600 / 900 s
        assert_abs_diff_eq!(out.pack_current_request, -20.0, epsilon = 1e-9);
        assert_abs_diff_eq!(out.grid_import_w, 1000.0 + 20.0 * 400.0, epsilon = 1e-6);

        inp.hour_of_day = 19.0;
        let out = e.dispatch(&inp);
        assert_eq!(out.mode, DispatchMode::Discharge);
    }

    #[test]
    fn expected_solar_surplus_skips_grid_charging() {
        let mut e = ems(EmsPolicy {
            grid_charge_below_soc: Some(0.4),
            forecast_window: 4,
            ..EmsPolicy::default()
        });
        for _ in 0..4 {
            e.dispatch(&input(20_000.0, 0.0));
        }
        let mut inp = input(0.0, 1000.0);
        inp.soc = 0.35;
        inp.hour_of_day = 3.0;
        assert_eq!(e.dispatch(&inp).mode, DispatchMode::Discharge);
    }

    #[test]
    fn tariff_prices_the_tick() {
        let mut e = ems(EmsPolicy::default());
        let mut inp = input(0.0, 10_000.0);
        inp.dt_s = 3600.0;
        inp.hour_of_day = 19.0;
        let out = e.dispatch(&inp);
        // 2 kWh at 0.375
        assert_abs_diff_eq!(out.grid_cost, 0.75, epsilon = 1e-9);
        assert_eq!(e.last_setpoint(), Some(&out));
    }

    #[test]
    fn policy_validation() {
        let bad = EmsPolicy {
            reserve_soc: 1.0,
            ..EmsPolicy::default()
        };
        assert_eq!(bad.validate().unwrap_err().field, "ems.reserve_soc");
        let bad = EmsPolicy {
            grid_charge_below_soc: Some(0.05),
            ..EmsPolicy::default()
        };
        assert!(bad.validate().is_err());
    }
}
