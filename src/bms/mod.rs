//! Battery management system: safety state machine, current limits and
//! passive balancing over a [`PackState`].

pub mod balancing;
pub mod events;
pub mod threshold;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use balancing::{Balancer, BalancingConfig, SessionChange};
pub use events::{BmsEvent, BmsEventKind, EventLog};
pub use threshold::{BmsState, Bound, Threshold};

use crate::battery::{BalanceCommand, Chemistry, PackState};
use crate::error::ConfigError;

/// Condition that can raise the BMS above `Normal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    OverVoltage,
    UnderVoltage,
    OverTemperature,
    UnderTemperature,
    OverCurrent,
    CellImbalance,
}

impl Trigger {
    pub const ALL: [Trigger; 6] = [
        Trigger::OverVoltage,
        Trigger::UnderVoltage,
        Trigger::OverTemperature,
        Trigger::UnderTemperature,
        Trigger::OverCurrent,
        Trigger::CellImbalance,
    ];

    /// Which current directions a protective latch on this trigger derates,
    /// as `(charge, discharge)`.
    fn derates(self) -> (bool, bool) {
        match self {
            Self::OverVoltage | Self::UnderTemperature => (true, false),
            Self::UnderVoltage => (false, true),
            Self::OverTemperature | Self::OverCurrent => (true, true),
            Self::CellImbalance => (false, false),
        }
    }
}

/// Cause of a `Fault`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    OverVoltage,
    UnderVoltage,
    OverTemperature,
    UnderTemperature,
    OverCurrent,
    /// A cell refused a pack tick.
    CellFault,
}

impl FaultKind {
    fn from_trigger(trigger: Trigger) -> Option<Self> {
        match trigger {
            Trigger::OverVoltage => Some(Self::OverVoltage),
            Trigger::UnderVoltage => Some(Self::UnderVoltage),
            Trigger::OverTemperature => Some(Self::OverTemperature),
            Trigger::UnderTemperature => Some(Self::UnderTemperature),
            Trigger::OverCurrent => Some(Self::OverCurrent),
            Trigger::CellImbalance => None,
        }
    }
}

/// Errors returned by [`Bms::reset`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BmsError {
    #[error("reset refused: {violations:?} still outside soft limits")]
    UnsafeToReset { violations: Vec<Trigger> },
    #[error("reset refused: BMS is not in fault")]
    NotFaulted,
}

/// Every BMS tunable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BmsConfig {
    /// Per-cell voltage, upper bound (V).
    pub over_voltage: Threshold,
    /// Per-cell voltage, lower bound (V).
    pub under_voltage: Threshold,
    /// Per-cell temperature, upper bound (°C).
    pub over_temperature: Threshold,
    /// Per-cell temperature, lower bound (°C).
    pub under_temperature: Threshold,
    /// |Pack current|, upper bound (A).
    pub over_current: Threshold,
    pub rated_charge_current_a: f64,
    pub rated_discharge_current_a: f64,
    /// SOC spread above which `CellImbalance` raises a warning.
    pub imbalance_warning_spread: f64,
    /// Consecutive pack ticks a trigger must stay lower before it releases.
    pub hysteresis_ticks: u32,
    pub balancing: BalancingConfig,
    /// Pack state of health below which replacement is recommended.
    pub min_state_of_health: f64,
    pub event_log_capacity: usize,
}

impl BmsConfig {
    /// Defaults for `chemistry`; only the voltage windows differ.
    pub fn for_chemistry(chemistry: Chemistry) -> Self {
        let (lower, upper) = chemistry.voltage_thresholds();
        Self {
            over_voltage: Threshold::new(upper.0, upper.1, upper.2),
            under_voltage: Threshold::new(lower.0, lower.1, lower.2),
            over_temperature: Threshold::new(45.0, 50.0, 60.0),
            under_temperature: Threshold::new(5.0, 0.0, -20.0),
            over_current: Threshold::new(55.0, 60.0, 75.0),
            rated_charge_current_a: 25.0,
            rated_discharge_current_a: 50.0,
            imbalance_warning_spread: 0.05,
            hysteresis_ticks: 3,
            balancing: BalancingConfig::default(),
            min_state_of_health: 0.8,
            event_log_capacity: 256,
        }
    }

    fn threshold(&self, trigger: Trigger) -> Option<(&Threshold, Bound)> {
        match trigger {
            Trigger::OverVoltage => Some((&self.over_voltage, Bound::Upper)),
            Trigger::UnderVoltage => Some((&self.under_voltage, Bound::Lower)),
            Trigger::OverTemperature => Some((&self.over_temperature, Bound::Upper)),
            Trigger::UnderTemperature => Some((&self.under_temperature, Bound::Lower)),
            Trigger::OverCurrent => Some((&self.over_current, Bound::Upper)),
            Trigger::CellImbalance => None,
        }
    }

    /// Checks every threshold and limit.
    ///
    /// # Errors
    ///
    /// Returns the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.over_voltage.validate("bms.over_voltage", Bound::Upper)?;
        self.under_voltage.validate("bms.under_voltage", Bound::Lower)?;
        self.over_temperature
            .validate("bms.over_temperature", Bound::Upper)?;
        self.under_temperature
            .validate("bms.under_temperature", Bound::Lower)?;
        self.over_current.validate("bms.over_current", Bound::Upper)?;
        if self.over_current.warning < 0.0 {
            return Err(ConfigError::new("bms.over_current", "limits must be >= 0"));
        }
        if self.under_voltage.warning >= self.over_voltage.warning {
            return Err(ConfigError::new(
                "bms.under_voltage",
                "warning must be below the over-voltage warning",
            ));
        }
        for (field, value) in [
            ("bms.rated_charge_current_a", self.rated_charge_current_a),
            ("bms.rated_discharge_current_a", self.rated_discharge_current_a),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::new(field, "must be >= 0"));
            }
        }
        if !(self.imbalance_warning_spread > 0.0 && self.imbalance_warning_spread < 1.0) {
            return Err(ConfigError::new(
                "bms.imbalance_warning_spread",
                "must be within (0, 1)",
            ));
        }
        if !(0.0..=1.0).contains(&self.min_state_of_health) {
            return Err(ConfigError::new(
                "bms.min_state_of_health",
                "must be within [0, 1]",
            ));
        }
        self.balancing.validate()
    }
}

impl Default for BmsConfig {
    fn default() -> Self {
        Self::for_chemistry(Chemistry::default())
    }
}

/// Result of one evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BmsOutput {
    /// Pack tick this output describes.
    pub tick: u64,
    pub state: BmsState,
    /// Triggers currently latched above `Normal`.
    pub triggers: BTreeSet<Trigger>,
    /// Allowed charge current magnitude (A).
    pub max_charge_current: f64,
    /// Allowed discharge current magnitude (A).
    pub max_discharge_current: f64,
    pub balancing_targets: BTreeSet<usize>,
    pub balancing: Vec<BalanceCommand>,
    /// Active faults and the tick each was first detected on.
    pub faults: BTreeMap<FaultKind, u64>,
    pub replacement_recommended: bool,
}

/// Per-trigger hysteresis latch.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Latch {
    level: BmsState,
    /// Consecutive ticks observed below `level`.
    calm_ticks: u32,
    charge_factor: f64,
    discharge_factor: f64,
}

impl Default for Latch {
    fn default() -> Self {
        Self {
            level: BmsState::Normal,
            calm_ticks: 0,
            charge_factor: 1.0,
            discharge_factor: 1.0,
        }
    }
}

/// Raw reading of one trigger on one tick.
#[derive(Debug, Clone, Copy)]
struct Reading {
    level: BmsState,
    charge_factor: f64,
    discharge_factor: f64,
}

/// The battery management system.
///
/// # Examples
///
/// ```
/// use bess_sim::battery::{CellParams, Chemistry, Pack};
/// use bess_sim::bms::{Bms, BmsConfig, BmsState};
///
/// let pack = Pack::new(4, 1, CellParams::for_chemistry(Chemistry::Nmc, 50.0), 0.5).unwrap();
/// let mut bms = Bms::new(BmsConfig::default()).unwrap();
/// let out = bms.evaluate(&pack.state());
/// assert_eq!(out.state, BmsState::Normal);
/// assert_eq!(out.max_discharge_current, 50.0);
/// ```
#[derive(Debug, Clone)]
pub struct Bms {
    config: BmsConfig,
    state: BmsState,
    latches: BTreeMap<Trigger, Latch>,
    faults: BTreeMap<FaultKind, u64>,
    balancer: Balancer,
    replacement_recommended: bool,
    events: EventLog,
    last: Option<BmsOutput>,
}

impl Bms {
    /// Creates a BMS in `Normal`.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if any threshold is misordered or a limit is
    /// out of range.
    pub fn new(config: BmsConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            balancer: Balancer::new(config.balancing.clone()),
            events: EventLog::new(config.event_log_capacity),
            config,
            state: BmsState::Normal,
            latches: BTreeMap::new(),
            faults: BTreeMap::new(),
            replacement_recommended: false,
            last: None,
        })
    }

    pub fn config(&self) -> &BmsConfig {
        &self.config
    }

    pub fn state(&self) -> BmsState {
        self.state
    }

    pub fn faults(&self) -> &BTreeMap<FaultKind, u64> {
        &self.faults
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Evaluates `pack` and returns limits and balancing commands.
    ///
    /// Evaluating the same pack tick twice returns the cached output and
    /// leaves hysteresis counters untouched.
    pub fn evaluate(&mut self, pack: &PackState) -> BmsOutput {
        if let Some(last) = &self.last
            && last.tick == pack.tick
        {
            return last.clone();
        }

        let tick = pack.tick;
        let mut highest = BmsState::Normal;
        let mut detected = Vec::new();

        for trigger in Trigger::ALL {
            let reading = self.read(trigger, pack);
            if reading.level == BmsState::Fault
                && let Some(kind) = FaultKind::from_trigger(trigger)
            {
                detected.push(kind);
            }
            let level = self.update_latch(tick, trigger, reading);
            highest = highest.max(level);
        }
        if pack.any_faulted() {
            detected.push(FaultKind::CellFault);
        }

        for kind in detected {
            if !self.faults.contains_key(&kind) {
                self.faults.insert(kind, tick);
                self.events
                    .push(tick, BmsEventKind::FaultDetected { fault: kind });
            }
        }

        let next = if self.state == BmsState::Fault || !self.faults.is_empty() {
            BmsState::Fault
        } else {
            highest
        };
        if next != self.state {
            self.events.push(
                tick,
                BmsEventKind::StateChanged {
                    from: self.state,
                    to: next,
                },
            );
            self.state = next;
        }

        let permitted = matches!(self.state, BmsState::Normal | BmsState::Warning);
        let spread = pack.soc_spread();
        match self.balancer.update(pack, permitted) {
            SessionChange::Started => self
                .events
                .push(tick, BmsEventKind::BalancingStarted { spread }),
            SessionChange::Converged => self.events.push(
                tick,
                BmsEventKind::BalancingFinished {
                    spread,
                    converged: true,
                },
            ),
            SessionChange::Interrupted => self.events.push(
                tick,
                BmsEventKind::BalancingFinished {
                    spread,
                    converged: false,
                },
            ),
            SessionChange::None => {}
        }

        if !self.replacement_recommended && pack.state_of_health < self.config.min_state_of_health
        {
            self.replacement_recommended = true;
            self.events.push(
                tick,
                BmsEventKind::ReplacementRecommended {
                    state_of_health: pack.state_of_health,
                },
            );
        }

        let output = self.output(pack);
        debug!(
            tick,
            state = %output.state,
            max_charge = output.max_charge_current,
            max_discharge = output.max_discharge_current,
            targets = output.balancing_targets.len(),
            "bms evaluated"
        );
        self.last = Some(output.clone());
        output
    }

    /// Clears a fault once every measured value is back inside its soft
    /// limits.
    ///
    /// On success faults, latches and any balancing session are cleared and
    /// the BMS returns to `Normal`. The caller is responsible for clearing
    /// the cells' own fault flags.
    ///
    /// # Errors
    ///
    /// * `BmsError::NotFaulted` if the BMS is not in `Fault`
    /// * `BmsError::UnsafeToReset` if any value is still at or beyond a soft limit
    pub fn reset(&mut self, pack: &PackState) -> Result<(), BmsError> {
        if self.state != BmsState::Fault {
            return Err(BmsError::NotFaulted);
        }

        let violations: Vec<Trigger> = Trigger::ALL
            .into_iter()
            .filter(|&t| match self.config.threshold(t) {
                Some((threshold, bound)) => !threshold.within_soft(measure(t, pack), bound),
                None => false,
            })
            .collect();
        if !violations.is_empty() {
            self.events.push(
                pack.tick,
                BmsEventKind::ResetRefused {
                    violations: violations.clone(),
                },
            );
            return Err(BmsError::UnsafeToReset { violations });
        }

        self.faults.clear();
        self.latches.clear();
        self.balancer.reset();
        self.last = None;
        self.events.push(pack.tick, BmsEventKind::ResetAccepted);
        self.events.push(
            pack.tick,
            BmsEventKind::StateChanged {
                from: BmsState::Fault,
                to: BmsState::Normal,
            },
        );
        self.state = BmsState::Normal;
        Ok(())
    }

    fn read(&self, trigger: Trigger, pack: &PackState) -> Reading {
        let Some((threshold, bound)) = self.config.threshold(trigger) else {
            let level = if pack.soc_spread() > self.config.imbalance_warning_spread {
                BmsState::Warning
            } else {
                BmsState::Normal
            };
            return Reading {
                level,
                charge_factor: 1.0,
                discharge_factor: 1.0,
            };
        };

        let value = measure(trigger, pack);
        let level = threshold.classify(value, bound);
        let factor = match level {
            BmsState::Protective => threshold.derate(value, bound),
            BmsState::Fault => 0.0,
            _ => 1.0,
        };
        let (charge, discharge) = trigger.derates();
        Reading {
            level,
            charge_factor: if charge { factor } else { 1.0 },
            discharge_factor: if discharge { factor } else { 1.0 },
        }
    }

    /// Escalates immediately; releases after `hysteresis_ticks` calmer ticks.
    fn update_latch(&mut self, tick: u64, trigger: Trigger, reading: Reading) -> BmsState {
        let hysteresis = self.config.hysteresis_ticks;
        let latch = self.latches.entry(trigger).or_default();
        let before = latch.level;

        if reading.level >= latch.level {
            latch.level = reading.level;
            latch.calm_ticks = 0;
            latch.charge_factor = reading.charge_factor;
            latch.discharge_factor = reading.discharge_factor;
        } else {
            latch.calm_ticks += 1;
            if latch.calm_ticks >= hysteresis {
                latch.level = reading.level;
                latch.calm_ticks = 0;
                latch.charge_factor = reading.charge_factor;
                latch.discharge_factor = reading.discharge_factor;
            }
        }

        let after = latch.level;
        if after > before && matches!(after, BmsState::Warning | BmsState::Protective) {
            self.events
                .push(tick, BmsEventKind::TriggerRaised { trigger, level: after });
        } else if after < before {
            self.events
                .push(tick, BmsEventKind::TriggerCleared { trigger, level: after });
        }
        after
    }

    fn output(&self, pack: &PackState) -> BmsOutput {
        let triggers = self
            .latches
            .iter()
            .filter(|(_, l)| l.level > BmsState::Normal)
            .map(|(&t, _)| t)
            .collect();

        let (charge, discharge, targets, balancing) = if self.state == BmsState::Fault {
            (0.0, 0.0, BTreeSet::new(), Vec::new())
        } else {
            let charge_factor = self
                .latches
                .values()
                .map(|l| l.charge_factor)
                .fold(1.0, f64::min);
            let discharge_factor = self
                .latches
                .values()
                .map(|l| l.discharge_factor)
                .fold(1.0, f64::min);
            (
                self.config.rated_charge_current_a * charge_factor,
                self.config.rated_discharge_current_a * discharge_factor,
                self.balancer.targets().clone(),
                self.balancer.commands(pack),
            )
        };

        BmsOutput {
            tick: pack.tick,
            state: self.state,
            triggers,
            max_charge_current: charge,
            max_discharge_current: discharge,
            balancing_targets: targets,
            balancing,
            faults: self.faults.clone(),
            replacement_recommended: self.replacement_recommended,
        }
    }
}

/// The pack figure a trigger watches.
fn measure(trigger: Trigger, pack: &PackState) -> f64 {
    match trigger {
        Trigger::OverVoltage => pack.max_cell_voltage(),
        Trigger::UnderVoltage => pack.min_cell_voltage(),
        Trigger::OverTemperature => pack.temperature_c,
        Trigger::UnderTemperature => pack.min_temperature_c,
        Trigger::OverCurrent => pack.current_a.abs(),
        Trigger::CellImbalance => pack.soc_spread(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battery::{CellHealth, CellParams, Pack};
    use approx::assert_abs_diff_eq;

    fn nmc_pack(socs: &[f64]) -> Pack {
        let params = CellParams::for_chemistry(Chemistry::Nmc, 50.0);
        Pack::with_cell_socs(socs.len(), 1, params, socs).unwrap()
    }

    fn bms() -> Bms {
        Bms::new(BmsConfig::default()).unwrap()
    }

    fn with_temperature(state: &PackState, temperature_c: f64) -> PackState {
        let mut s = state.clone();
        s.tick += 1;
        s.temperature_c = temperature_c;
        for c in &mut s.cells {
            c.temperature_c = temperature_c;
        }
        s.min_temperature_c = temperature_c;
        s
    }

    #[test]
    fn test_normal_pack_gets_rated_limits() {
        let pack = nmc_pack(&[0.5, 0.5, 0.5, 0.5]);
        let out = bms().evaluate(&pack.state());
        assert_eq!(out.state, BmsState::Normal);
        assert_eq!(out.max_charge_current, 25.0);
        assert_eq!(out.max_discharge_current, 50.0);
        assert!(out.triggers.is_empty());
        assert!(out.faults.is_empty());
    }

    #[test]
    fn test_rejects_misordered_thresholds() {
        let mut cfg = BmsConfig::default();
        cfg.over_temperature = Threshold::new(50.0, 45.0, 60.0);
        let err = Bms::new(cfg).unwrap_err();
        assert_eq!(err.field, "bms.over_temperature");
    }

    #[test]
    fn test_imbalance_raises_warning_only() {
        let pack = nmc_pack(&[0.40, 0.50, 0.50, 0.50]);
        let out = bms().evaluate(&pack.state());
        assert_eq!(out.state, BmsState::Warning);
        assert!(out.triggers.contains(&Trigger::CellImbalance));
        assert_eq!(out.max_discharge_current, 50.0);
    }

    #[test]
    fn test_protective_derates_both_directions_on_heat() {
        let base = nmc_pack(&[0.5; 4]).state();
        let hot = with_temperature(&base, 55.0);
        let out = bms().evaluate(&hot);
        assert_eq!(out.state, BmsState::Protective);
        assert_abs_diff_eq!(out.max_charge_current, 12.5, epsilon = 1e-9);
        assert_abs_diff_eq!(out.max_discharge_current, 25.0, epsilon = 1e-9);
    }

    #[test]
    fn test_cold_derates_charge_only() {
        let base = nmc_pack(&[0.5; 4]).state();
        let cold = with_temperature(&base, -10.0);
        let out = bms().evaluate(&cold);
        assert_eq!(out.state, BmsState::Protective);
        assert_abs_diff_eq!(out.max_charge_current, 12.5, epsilon = 1e-9);
        assert_eq!(out.max_discharge_current, 50.0);
    }

    #[test]
    fn test_high_cell_voltage_derates_charge() {
        let mut pack = nmc_pack(&[0.97, 0.9, 0.9, 0.9]);
        // 0.97 rests at 4.161 V, inside the 4.15..4.30 soft band
        pack.apply(0.0, &[], 1.0).unwrap();
        let out = bms().evaluate(&pack.state());
        assert_eq!(out.state, BmsState::Protective);
        assert!(out.triggers.contains(&Trigger::OverVoltage));
        assert!(out.max_charge_current < 25.0);
        assert_eq!(out.max_discharge_current, 50.0);
    }

    #[test]
    fn test_hard_limit_faults_and_zeroes_limits() {
        let base = nmc_pack(&[0.5; 4]).state();
        let out = bms().evaluate(&with_temperature(&base, 61.0));
        assert_eq!(out.state, BmsState::Fault);
        assert_eq!(out.max_charge_current, 0.0);
        assert_eq!(out.max_discharge_current, 0.0);
        assert_eq!(out.faults.get(&FaultKind::OverTemperature), Some(&1));
    }

    #[test]
    fn test_faulted_cell_faults_bms() {
        let mut pack = nmc_pack(&[0.01, 0.5]);
        assert!(pack.apply(50.0, &[], 3600.0).is_err());
        let out = bms().evaluate(&pack.state());
        assert_eq!(out.state, BmsState::Fault);
        assert!(out.faults.contains_key(&FaultKind::CellFault));
    }

    #[test]
    fn test_fault_is_terminal_until_reset() {
        let base = nmc_pack(&[0.5; 4]).state();
        let mut b = bms();
        let hot = with_temperature(&base, 65.0);
        assert_eq!(b.evaluate(&hot).state, BmsState::Fault);

        let mut cool = with_temperature(&hot, 25.0);
        for _ in 0..20 {
            cool.tick += 1;
            assert_eq!(b.evaluate(&cool).state, BmsState::Fault);
        }
        b.reset(&cool).unwrap();
        assert_eq!(b.state(), BmsState::Normal);
        cool.tick += 1;
        assert_eq!(b.evaluate(&cool).state, BmsState::Normal);
        assert!(b.faults().is_empty());
    }

    #[test]
    fn test_reset_refused_while_unsafe() {
        let base = nmc_pack(&[0.5; 4]).state();
        let mut b = bms();
        let hot = with_temperature(&base, 65.0);
        b.evaluate(&hot);
        let still_warm = with_temperature(&hot, 52.0);
        match b.reset(&still_warm) {
            Err(BmsError::UnsafeToReset { violations }) => {
                assert_eq!(violations, vec![Trigger::OverTemperature]);
            }
            other => panic!("expected UnsafeToReset, got {other:?}"),
        }
        assert_eq!(b.state(), BmsState::Fault);
    }

    #[test]
    fn test_reset_outside_fault_is_refused() {
        let pack = nmc_pack(&[0.5; 2]);
        assert_eq!(bms().reset(&pack.state()), Err(BmsError::NotFaulted));
    }

    #[test]
    fn test_same_tick_is_cached() {
        let base = nmc_pack(&[0.5; 4]).state();
        let mut b = bms();
        let hot = with_temperature(&base, 47.0);
        let first = b.evaluate(&hot);
        let cool = with_temperature(&hot, 25.0);
        b.evaluate(&cool);
        let latch_before = b.latches[&Trigger::OverTemperature];
        for _ in 0..10 {
            assert_eq!(b.evaluate(&cool).state, BmsState::Warning);
        }
        assert_eq!(b.latches[&Trigger::OverTemperature], latch_before);
        assert_eq!(first.state, BmsState::Warning);
    }

    #[test]
    fn test_hysteresis_delays_release() {
        let base = nmc_pack(&[0.5; 4]).state();
        let mut b = bms();
        let mut s = with_temperature(&base, 55.0);
        assert_eq!(b.evaluate(&s).state, BmsState::Protective);
        let held = b.evaluate(&s).max_charge_current;

        s = with_temperature(&s, 25.0);
        assert_eq!(b.evaluate(&s).state, BmsState::Protective);
        assert_eq!(b.last.as_ref().map(|o| o.max_charge_current), Some(held));
        s.tick += 1;
        assert_eq!(b.evaluate(&s).state, BmsState::Protective);
        s.tick += 1;
        let out = b.evaluate(&s);
        assert_eq!(out.state, BmsState::Normal);
        assert_eq!(out.max_charge_current, 25.0);
    }

    #[test]
    fn test_chatter_at_boundary_keeps_latch() {
        let base = nmc_pack(&[0.5; 4]).state();
        let mut b = bms();
        let mut s = base.clone();
        for i in 0..12 {
            let t = if i % 2 == 0 { 50.5 } else { 49.5 };
            s = with_temperature(&s, t);
            assert_eq!(b.evaluate(&s).state, BmsState::Protective);
        }
    }

    #[test]
    fn test_balancing_commands_only_when_permitted() {
        let pack = nmc_pack(&[0.50, 0.52, 0.55, 0.48]);
        let mut b = bms();
        let out = b.evaluate(&pack.state());
        assert_eq!(out.state, BmsState::Warning);
        assert_eq!(out.balancing_targets.len(), 2);
        assert_eq!(out.balancing.len(), 2);

        let hot = with_temperature(&pack.state(), 55.0);
        let out = b.evaluate(&hot);
        assert!(out.balancing.is_empty());
        assert!(b.events().iter().any(|e| matches!(
            e.kind,
            BmsEventKind::BalancingFinished {
                converged: false,
                ..
            }
        )));
    }

    #[test]
    fn test_replacement_recommended_once() {
        let pack = nmc_pack(&[0.5; 2]);
        let mut state = pack.state();
        state.state_of_health = 0.75;
        for c in &mut state.cells {
            c.health = CellHealth::Degraded;
        }
        let mut b = bms();
        assert!(b.evaluate(&state).replacement_recommended);
        state.tick += 1;
        b.evaluate(&state);
        let count = b
            .events()
            .iter()
            .filter(|e| matches!(e.kind, BmsEventKind::ReplacementRecommended { .. }))
            .count();
        assert_eq!(count, 1);
    }
}
