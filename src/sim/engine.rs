//! Simulation driver: BMS → EMS → Pack, once per tick.

use tracing::{debug, info, instrument, warn};

use crate::battery::{BalanceCommand, Pack};
use crate::bms::{Bms, BmsError};
use crate::ems::{Ems, EmsInput};
use crate::profiles::Profile;

use super::clock::{Clock, hour_of_day};
use super::types::{SimConfig, SimSnapshot};

/// Owns one pack, one BMS and one EMS and advances them in lockstep.
///
/// Cell faults inside a tick do not stop the run: the pack rejects the tick,
/// the BMS reports `Fault` on the next evaluation and the EMS then requests
/// zero current until [`Simulation::reset_bms`] succeeds.
pub struct Simulation {
    config: SimConfig,
    pack: Pack,
    bms: Bms,
    ems: Ems,
    solar: Option<Box<dyn Profile + Send>>,
    demand: Option<Box<dyn Profile + Send>>,
    step: u64,
    elapsed_s: f64,
}

impl Simulation {
    /// Creates a driver with no profiles attached.
    ///
    /// # Arguments
    ///
    /// * `config` - Run length, resolution and seed
    /// * `pack` - Assembled pack
    /// * `bms` - Battery management system for `pack`
    /// * `ems` - Dispatch optimizer
    pub fn new(config: SimConfig, pack: Pack, bms: Bms, ems: Ems) -> Self {
        Self {
            config,
            pack,
            bms,
            ems,
            solar: None,
            demand: None,
            step: 0,
            elapsed_s: 0.0,
        }
    }

    /// Attaches the solar and demand generators used by [`Simulation::run`].
    pub fn with_profiles(
        mut self,
        solar: Box<dyn Profile + Send>,
        demand: Box<dyn Profile + Send>,
    ) -> Self {
        self.solar = Some(solar);
        self.demand = Some(demand);
        self
    }

    /// Advances one tick and returns the post-tick snapshot.
    ///
    /// # Arguments
    ///
    /// * `solar_w` - Solar generation over the tick (W)
    /// * `demand_w` - Household demand over the tick (W)
    /// * `dt_s` - Tick length (s)
    pub fn step(&mut self, solar_w: f64, demand_w: f64, dt_s: f64) -> SimSnapshot {
        self.advance(solar_w, demand_w, dt_s, hour_of_day(self.elapsed_s))
    }

    fn advance(
        &mut self,
        solar_w: f64,
        demand_w: f64,
        dt_s: f64,
        hour_of_day: f64,
    ) -> SimSnapshot {
        let before = self.pack.state();
        let limits = self.bms.evaluate(&before);

        let input = EmsInput {
            solar_w,
            demand_w,
            max_charge_a: limits.max_charge_current,
            max_discharge_a: limits.max_discharge_current,
            pack_voltage_v: before.voltage_v,
            soc: before.soc,
            min_cell_soc: before.min_soc,
            max_cell_soc: before.max_soc,
            pack_capacity_ah: before.capacity_ah,
            dt_s,
            hour_of_day,
        };
        let dispatch = self.ems.dispatch(&input);

        // Bleeds only run alongside a request inside the balancing window.
        let window_a = self.bms.config().balancing.max_pack_current_a;
        let balancing: &[BalanceCommand] = if dispatch.pack_current_request.abs() <= window_a {
            limits.balancing.as_slice()
        } else {
            if !limits.balancing.is_empty() {
                debug!(
                    step = self.step,
                    current_a = dispatch.pack_current_request,
                    "balancing suspended for this tick"
                );
            }
            &[]
        };

        let pack_error = match self
            .pack
            .apply(dispatch.pack_current_request, balancing, dt_s)
        {
            Ok(()) => None,
            Err(err) => {
                warn!(step = self.step, error = %err, "pack tick rejected");
                Some(err.to_string())
            }
        };

        let after = self.pack.state();
        let bms = self.bms.evaluate(&after);

        self.elapsed_s += dt_s.max(0.0);
        let snapshot = SimSnapshot {
            step: self.step,
            time_s: self.elapsed_s,
            hour_of_day,
            dt_s,
            solar_w,
            demand_w,
            pack: after,
            bms,
            dispatch,
            pack_error,
        };
        self.step += 1;
        snapshot
    }

    /// Clears a BMS fault and the cells' fault flags.
    ///
    /// # Errors
    ///
    /// Propagates [`BmsError`] when the BMS is not faulted or the pack is
    /// still outside its soft limits.
    pub fn reset_bms(&mut self) -> Result<(), BmsError> {
        self.bms.reset(&self.pack.state())?;
        self.pack.clear_faults();
        info!(step = self.step, "bms reset, cell faults cleared");
        Ok(())
    }

    /// Runs `steps_per_day × days` ticks driven by the attached profiles.
    ///
    /// Missing profiles contribute 0 W.
    #[instrument(skip(self), fields(steps = self.config.total_steps(), seed = self.config.seed))]
    pub fn run(&mut self) -> Vec<SimSnapshot> {
        let dt_s = self.config.dt_seconds;
        let mut clock = Clock::new(self.elapsed_s, self.config.total_steps(), dt_s);
        let mut snapshots = Vec::with_capacity(clock.remaining());

        clock.run(|tick| {
            let t = tick.index;
            let solar_w = self.solar.as_mut().map_or(0.0, |p| p.power_w(t));
            let demand_w = self.demand.as_mut().map_or(0.0, |p| p.power_w(t));
            snapshots.push(self.advance(solar_w, demand_w, dt_s, tick.hour_of_day));
        });

        if let Some(last) = snapshots.last() {
            info!(
                final_soc = last.pack.soc,
                bms = %last.bms.state,
                "run finished"
            );
        }
        snapshots
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn pack(&self) -> &Pack {
        &self.pack
    }

    pub fn bms(&self) -> &Bms {
        &self.bms
    }

    pub fn ems(&self) -> &Ems {
        &self.ems
    }
}
