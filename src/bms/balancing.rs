//! Passive (dissipative) cell balancing.
//!
//! A session opens when the SOC spread exceeds `start_spread`. On every tick of
//! a session the fullest cells, those above the midpoint of the current SOC
//! range, join the target set and bleed `bleed_current_a` with the emptiest
//! cell as their floor. A target leaves once it is within `tolerance` of the
//! emptiest cell, and the session closes when the whole spread is.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::battery::{BalanceCommand, PackState};
use crate::error::ConfigError;

/// Balancing tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BalancingConfig {
    /// SOC spread that opens a session (fraction).
    pub start_spread: f64,
    /// SOC distance from the emptiest cell that counts as balanced.
    pub tolerance: f64,
    /// Bleed current per target cell (A).
    pub bleed_current_a: f64,
    /// Largest |pack current| at which balancing may run (A).
    pub max_pack_current_a: f64,
}

impl Default for BalancingConfig {
    fn default() -> Self {
        Self {
            start_spread: 0.02,
            tolerance: 0.005,
            bleed_current_a: 2.0,
            max_pack_current_a: 5.0,
        }
    }
}

impl BalancingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tolerance > 0.0 && self.tolerance.is_finite()) {
            return Err(ConfigError::new("bms.balancing.tolerance", "must be > 0"));
        }
        if !(self.start_spread >= self.tolerance && self.start_spread < 1.0) {
            return Err(ConfigError::new(
                "bms.balancing.start_spread",
                "must be within [tolerance, 1)",
            ));
        }
        if !(self.bleed_current_a > 0.0 && self.bleed_current_a.is_finite()) {
            return Err(ConfigError::new(
                "bms.balancing.bleed_current_a",
                "must be > 0",
            ));
        }
        if !(self.max_pack_current_a >= 0.0 && self.max_pack_current_a.is_finite()) {
            return Err(ConfigError::new(
                "bms.balancing.max_pack_current_a",
                "must be >= 0",
            ));
        }
        Ok(())
    }
}

/// Session transitions reported by [`Balancer::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionChange {
    None,
    Started,
    Converged,
    Interrupted,
}

/// Balancing session state.
#[derive(Debug, Clone, Default)]
pub struct Balancer {
    config: BalancingConfig,
    active: bool,
    targets: BTreeSet<usize>,
}

impl Balancer {
    pub fn new(config: BalancingConfig) -> Self {
        Self {
            config,
            active: false,
            targets: BTreeSet::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn targets(&self) -> &BTreeSet<usize> {
        &self.targets
    }

    /// Advances the session for a new pack tick.
    ///
    /// `permitted` is false whenever the safety state forbids balancing; an
    /// open session is then interrupted and its targets dropped.
    pub fn update(&mut self, state: &PackState, permitted: bool) -> SessionChange {
        let idle = state.current_a.abs() <= self.config.max_pack_current_a;
        if !(permitted && idle) {
            self.targets.clear();
            if self.active {
                self.active = false;
                return SessionChange::Interrupted;
            }
            return SessionChange::None;
        }

        let spread = state.soc_spread();
        let mut change = SessionChange::None;
        if !self.active {
            if spread <= self.config.start_spread {
                return SessionChange::None;
            }
            self.active = true;
            change = SessionChange::Started;
        }

        if spread <= self.config.tolerance {
            self.active = false;
            self.targets.clear();
            return SessionChange::Converged;
        }

        let floor = state.min_soc;
        let midpoint = floor + spread / 2.0;
        for (i, cell) in state.cells.iter().enumerate() {
            if cell.soc - floor <= self.config.tolerance {
                self.targets.remove(&i);
            } else if cell.soc > midpoint {
                self.targets.insert(i);
            }
        }
        change
    }

    /// Bleed commands for the current targets.
    pub fn commands(&self, state: &PackState) -> Vec<BalanceCommand> {
        self.targets
            .iter()
            .map(|&cell| BalanceCommand {
                cell,
                current_a: self.config.bleed_current_a,
                floor_soc: state.min_soc,
            })
            .collect()
    }

    /// Ends any session without reporting it.
    pub fn reset(&mut self) {
        self.active = false;
        self.targets.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battery::{CellParams, Chemistry, Pack};

    fn pack(socs: &[f64]) -> Pack {
        let params = CellParams::for_chemistry(Chemistry::Nmc, 50.0);
        Pack::with_cell_socs(socs.len(), 1, params, socs).unwrap()
    }

    #[test]
    fn no_session_below_start_spread() {
        let p = pack(&[0.50, 0.51, 0.505]);
        let mut b = Balancer::new(BalancingConfig::default());
        assert_eq!(b.update(&p.state(), true), SessionChange::None);
        assert!(b.targets().is_empty());
    }

    #[test]
    fn selects_cells_above_midpoint() {
        let p = pack(&[0.50, 0.52, 0.55, 0.48]);
        let mut b = Balancer::new(BalancingConfig::default());
        assert_eq!(b.update(&p.state(), true), SessionChange::Started);
        // midpoint 0.515
        assert_eq!(b.targets().iter().copied().collect::<Vec<_>>(), vec![1, 2]);
        let cmds = b.commands(&p.state());
        assert!(cmds.iter().all(|c| c.floor_soc == 0.48 && c.current_a == 2.0));
    }

    #[test]
    fn single_low_cell_still_selects_the_rest() {
        // mean + half-spread would be 0.5675 and select nothing here
        let p = pack(&[0.48, 0.55, 0.55, 0.55]);
        let mut b = Balancer::new(BalancingConfig::default());
        assert_eq!(b.update(&p.state(), true), SessionChange::Started);
        assert_eq!(
            b.targets().iter().copied().collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn interrupted_when_not_permitted() {
        let p = pack(&[0.50, 0.60]);
        let mut b = Balancer::new(BalancingConfig::default());
        b.update(&p.state(), true);
        assert!(b.is_active());
        assert_eq!(b.update(&p.state(), false), SessionChange::Interrupted);
        assert!(b.targets().is_empty());
    }

    #[test]
    fn skipped_under_load() {
        let mut p = pack(&[0.50, 0.60]);
        p.apply(20.0, &[], 1.0).unwrap();
        let mut b = Balancer::new(BalancingConfig::default());
        assert_eq!(b.update(&p.state(), true), SessionChange::None);
    }

    #[test]
    fn converges_on_idle_pack() {
        let mut p = pack(&[0.50, 0.52, 0.55, 0.48]);
        let mut b = Balancer::new(BalancingConfig::default());
        let mut converged = false;
        for _ in 0..500 {
            let state = p.state();
            if b.update(&state, true) == SessionChange::Converged {
                converged = true;
                break;
            }
            p.apply(0.0, &b.commands(&state), 900.0).unwrap();
        }
        assert!(converged);
        assert!(p.state().soc_spread() <= 0.005 + 1e-12);
    }

    #[test]
    fn rejects_tolerance_above_start_spread() {
        let cfg = BalancingConfig {
            tolerance: 0.05,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
