//! Shared test fixtures for integration tests.
#![allow(dead_code)]

use bess_sim::battery::{CellParams, Chemistry, Pack};
use bess_sim::bms::{Bms, BmsConfig};
use bess_sim::ems::{Ems, EmsInput, EmsPolicy, Tariff};
use bess_sim::sim::{SimConfig, Simulation};

/// 15-minute ticks.
pub const DT_S: f64 = 900.0;

/// NMC cell parameters at `capacity_ah`.
pub fn nmc(capacity_ah: f64) -> CellParams {
    CellParams::for_chemistry(Chemistry::Nmc, capacity_ah)
}

/// `socs.len()`S1P NMC pack of 50 Ah cells.
pub fn series_pack(socs: &[f64]) -> Pack {
    Pack::with_cell_socs(socs.len(), 1, nmc(50.0), socs).unwrap()
}

/// Default NMC BMS.
pub fn default_bms() -> Bms {
    Bms::new(BmsConfig::default()).unwrap()
}

/// EMS with `policy` and the default tariff.
pub fn ems_with(policy: EmsPolicy) -> Ems {
    Ems::new(policy, Tariff::default()).unwrap()
}

/// Driver around `pack` with default BMS and EMS, 96 steps per day.
pub fn simulation(pack: Pack) -> Simulation {
    Simulation::new(
        SimConfig::new(96, 1, 42),
        pack,
        default_bms(),
        ems_with(EmsPolicy::default()),
    )
}

/// EMS input for a 400 V, 50 Ah pack at half charge around noon.
pub fn ems_input(solar_w: f64, demand_w: f64) -> EmsInput {
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
        dt_s: DT_S,
        hour_of_day: 12.0,
    }
}
