//! Post-hoc KPI computation from simulation snapshots.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::bms::BmsState;

use super::types::SimSnapshot;

const J_PER_KWH: f64 = 3.6e6;

/// Aggregate indicators of one complete run.
///
/// Computed from `&[SimSnapshot]` so the report always agrees with the
/// recorded ticks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiReport {
    pub ticks: usize,
    /// Energy bought from the grid (kWh).
    pub grid_import_kwh: f64,
    /// Energy sold to the grid (kWh).
    pub grid_export_kwh: f64,
    pub curtailed_kwh: f64,
    /// Demand neither the pack nor the grid could cover (kWh).
    pub unserved_kwh: f64,
    /// Share of solar generation consumed on site or stored, in `[0, 1]`.
    pub self_consumption: f64,
    /// Import cost minus export revenue.
    pub net_cost: f64,
    /// Pack terminal energy throughput (kWh, sum of |I·V|·dt).
    pub throughput_kwh: f64,
    pub throughput_ah: f64,
    /// `throughput_ah / (2 · capacity_ah)`.
    pub equivalent_cycles: f64,
    /// Ticks spent in each BMS state, taken from the post-tick evaluation.
    pub ticks_by_state: BTreeMap<BmsState, usize>,
    /// Number of transitions into `Fault`.
    pub fault_entries: usize,
    /// Ticks the pack refused.
    pub rejected_ticks: usize,
    pub peak_temperature_c: f64,
    pub max_soc_spread: f64,
    pub final_soc_spread: f64,
    pub final_soc: f64,
    pub final_state_of_health: f64,
}

impl KpiReport {
    /// Computes all KPIs from the complete snapshot record.
    ///
    /// An empty record yields an all-zero report.
    pub fn from_snapshots(snapshots: &[SimSnapshot]) -> Self {
        let Some(last) = snapshots.last() else {
            return Self {
                ticks: 0,
                grid_import_kwh: 0.0,
                grid_export_kwh: 0.0,
                curtailed_kwh: 0.0,
                unserved_kwh: 0.0,
                self_consumption: 0.0,
                net_cost: 0.0,
                throughput_kwh: 0.0,
                throughput_ah: 0.0,
                equivalent_cycles: 0.0,
                ticks_by_state: BTreeMap::new(),
                fault_entries: 0,
                rejected_ticks: 0,
                peak_temperature_c: 0.0,
                max_soc_spread: 0.0,
                final_soc_spread: 0.0,
                final_soc: 0.0,
                final_state_of_health: 0.0,
            };
        };

        let mut import_j = 0.0;
        let mut export_j = 0.0;
        let mut curtailed_j = 0.0;
        let mut unserved_j = 0.0;
        let mut solar_j = 0.0;
        let mut net_cost = 0.0;
        let mut throughput_j = 0.0;
        let mut throughput_as = 0.0;
        let mut ticks_by_state = BTreeMap::new();
        let mut fault_entries = 0;
        let mut rejected_ticks = 0;
        let mut peak_temperature_c = f64::NEG_INFINITY;
        let mut max_soc_spread: f64 = 0.0;
        let mut previous_state = BmsState::Normal;

        for s in snapshots {
            let dt = s.dt_s.max(0.0);
            import_j += s.dispatch.grid_import_w * dt;
            export_j += s.dispatch.grid_export_w * dt;
            curtailed_j += s.dispatch.curtailed_power_w * dt;
            unserved_j += s.dispatch.unserved_power_w * dt;
            solar_j += s.solar_w.max(0.0) * dt;
            net_cost += s.dispatch.grid_cost;

            let current = s.pack.current_a.abs();
            throughput_as += current * dt;
            throughput_j += current * s.pack.voltage_v * dt;

            *ticks_by_state.entry(s.bms.state).or_insert(0) += 1;
            if s.bms.state == BmsState::Fault && previous_state != BmsState::Fault {
                fault_entries += 1;
            }
            previous_state = s.bms.state;
            if s.pack_error.is_some() {
                rejected_ticks += 1;
            }

            peak_temperature_c = peak_temperature_c.max(s.pack.temperature_c);
            max_soc_spread = max_soc_spread.max(s.pack.soc_spread());
        }

        let self_consumption = if solar_j > 0.0 {
            ((solar_j - export_j - curtailed_j) / solar_j).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let throughput_ah = throughput_as / 3600.0;
        let equivalent_cycles = if last.pack.capacity_ah > 0.0 {
            throughput_ah / (2.0 * last.pack.capacity_ah)
        } else {
            0.0
        };

        Self {
            ticks: snapshots.len(),
            grid_import_kwh: import_j / J_PER_KWH,
            grid_export_kwh: export_j / J_PER_KWH,
            curtailed_kwh: curtailed_j / J_PER_KWH,
            unserved_kwh: unserved_j / J_PER_KWH,
            self_consumption,
            net_cost,
            throughput_kwh: throughput_j / J_PER_KWH,
            throughput_ah,
            equivalent_cycles,
            ticks_by_state,
            fault_entries,
            rejected_ticks,
            peak_temperature_c,
            max_soc_spread,
            final_soc_spread: last.pack.soc_spread(),
            final_soc: last.pack.soc,
            final_state_of_health: last.pack.state_of_health,
        }
    }

    /// Ticks spent in `state`.
    pub fn ticks_in(&self, state: BmsState) -> usize {
        self.ticks_by_state.get(&state).copied().unwrap_or(0)
    }
}

impl fmt::Display for KpiReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- KPI Report ---")?;
        writeln!(f, "Ticks:                 {}", self.ticks)?;
        writeln!(f, "Grid import:           {:.2} kWh", self.grid_import_kwh)?;
        writeln!(f, "Grid export:           {:.2} kWh", self.grid_export_kwh)?;
        writeln!(f, "Curtailed solar:       {:.2} kWh", self.curtailed_kwh)?;
        writeln!(f, "Unserved demand:       {:.2} kWh", self.unserved_kwh)?;
        writeln!(
            f,
            "Self-consumption:      {:.1}%",
            self.self_consumption * 100.0
        )?;
        writeln!(f, "Net grid cost:         {:.2}", self.net_cost)?;
        writeln!(
            f,
            "Pack throughput:       {:.2} kWh / {:.1} Ah ({:.3} equiv. cycles)",
            self.throughput_kwh, self.throughput_ah, self.equivalent_cycles
        )?;
        writeln!(
            f,
            "BMS ticks:             normal={} warning={} protective={} fault={}",
            self.ticks_in(BmsState::Normal),
            self.ticks_in(BmsState::Warning),
            self.ticks_in(BmsState::Protective),
            self.ticks_in(BmsState::Fault),
        )?;
        writeln!(
            f,
            "Faults / rejections:   {} / {}",
            self.fault_entries, self.rejected_ticks
        )?;
        writeln!(f, "Peak temperature:      {:.1} °C", self.peak_temperature_c)?;
        writeln!(
            f,
            "SoC spread:            max {:.2}%, final {:.2}%",
            self.max_soc_spread * 100.0,
            self.final_soc_spread * 100.0
        )?;
        write!(
            f,
            "Final SoC / SoH:       {:.1}% / {:.3}",
            self.final_soc * 100.0,
            self.final_state_of_health
        )
    }
}
