//! Series/parallel pack of cells and its serializable state view.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::cell::{Cell, CellFault, CellHealth, CellUpdate};
use super::chemistry::CellParams;
use crate::error::ConfigError;

/// How the pack reports a single SOC figure for cells that disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SocAggregation {
    /// Arithmetic mean over all cells.
    #[default]
    Mean,
    /// Lowest cell SOC; the pack is as empty as its weakest cell.
    Weakest,
}

/// Passive bleed request for one cell, issued by the BMS.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BalanceCommand {
    /// Cell index in pack order.
    pub cell: usize,
    /// Requested bleed current (A, discharge).
    pub current_a: f64,
    /// SOC the bleed must never push the cell below.
    pub floor_soc: f64,
}

/// A cell fault tagged with the cell that raised it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CellFaultAt {
    pub cell: usize,
    pub fault: CellFault,
}

/// Reason a pack tick was rejected. No cell state changed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PackError {
    #[error("tick {tick} rejected: {}", summarize(.faults))]
    CellFaults { tick: u64, faults: Vec<CellFaultAt> },
    #[error("balancing command for cell {cell} but the pack has {cells} cells")]
    UnknownCell { cell: usize, cells: usize },
    #[error("invalid step: {current_a} A for {dt_s} s")]
    InvalidStep { current_a: f64, dt_s: f64 },
}

fn summarize(faults: &[CellFaultAt]) -> String {
    match faults.first() {
        Some(first) => format!(
            "{} cell fault(s), first on cell {}: {}",
            faults.len(),
            first.cell,
            first.fault
        ),
        None => "no cell faults".to_string(),
    }
}

/// Snapshot of one cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellState {
    pub soc: f64,
    pub voltage_v: f64,
    pub temperature_c: f64,
    pub current_a: f64,
    pub throughput_ah: f64,
    pub state_of_health: f64,
    pub health: CellHealth,
}

/// Owned, serializable view of a pack after its latest tick.
///
/// `tick` counts `apply` calls, so two states with the same tick describe the
/// same physical state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackState {
    pub tick: u64,
    pub series: usize,
    pub parallel: usize,
    pub current_a: f64,
    pub voltage_v: f64,
    pub soc: f64,
    pub min_soc: f64,
    pub max_soc: f64,
    pub temperature_c: f64,
    pub min_temperature_c: f64,
    pub capacity_ah: f64,
    /// Lowest cell state of health.
    pub state_of_health: f64,
    pub cells: Vec<CellState>,
}

impl PackState {
    /// Difference between the fullest and emptiest cell.
    pub fn soc_spread(&self) -> f64 {
        self.max_soc - self.min_soc
    }

    pub fn max_cell_voltage(&self) -> f64 {
        self.cells
            .iter()
            .map(|c| c.voltage_v)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn min_cell_voltage(&self) -> f64 {
        self.cells
            .iter()
            .map(|c| c.voltage_v)
            .fold(f64::INFINITY, f64::min)
    }

    pub fn any_faulted(&self) -> bool {
        self.cells.iter().any(|c| c.health == CellHealth::Faulted)
    }
}

/// `S` series groups of `P` parallel cells.
///
/// Cells are stored group by group: cell `s * P + p` is the `p`-th cell of
/// series group `s`. Every group carries the full pack current, split evenly
/// over its `P` cells.
#[derive(Debug, Clone)]
pub struct Pack {
    cells: Vec<Cell>,
    series: usize,
    parallel: usize,
    aggregation: SocAggregation,
    current_a: f64,
    tick: u64,
}

/// Largest number of cells a pack may hold.
pub const MAX_CELLS: usize = 100_000;

/// Number of cells in an `series`×`parallel` topology.
///
/// # Errors
///
/// Returns a `ConfigError` for an empty topology or one above [`MAX_CELLS`].
pub fn cell_count(series: usize, parallel: usize) -> Result<usize, ConfigError> {
    if series == 0 {
        return Err(ConfigError::new("pack.series", "must be > 0"));
    }
    if parallel == 0 {
        return Err(ConfigError::new("pack.parallel", "must be > 0"));
    }
    series
        .checked_mul(parallel)
        .filter(|&n| n <= MAX_CELLS)
        .ok_or_else(|| {
            ConfigError::new(
                "pack.series",
                format!("series × parallel must be <= {MAX_CELLS} cells"),
            )
        })
}

impl Pack {
    /// Assembles a pack with every cell at `initial_soc`.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` for an empty topology or invalid cell parameters.
    pub fn new(
        series: usize,
        parallel: usize,
        params: CellParams,
        initial_soc: f64,
    ) -> Result<Self, ConfigError> {
        let socs = vec![initial_soc; cell_count(series, parallel)?];
        Self::with_cell_socs(series, parallel, params, &socs)
    }

    /// Assembles a pack with one initial SOC per cell, in pack order.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` for an empty topology, a SOC list whose length
    /// is not `series * parallel`, or invalid cell parameters.
    pub fn with_cell_socs(
        series: usize,
        parallel: usize,
        params: CellParams,
        socs: &[f64],
    ) -> Result<Self, ConfigError> {
        let expected = cell_count(series, parallel)?;
        if socs.len() != expected {
            return Err(ConfigError::new(
                "pack.initial_socs",
                format!("expected {expected} values, got {}", socs.len()),
            ));
        }
        let cells = socs
            .iter()
            .map(|&soc| Cell::new(params.clone(), soc))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            cells,
            series,
            parallel,
            aggregation: SocAggregation::default(),
            current_a: 0.0,
            tick: 0,
        })
    }

    /// Sets the SOC aggregation rule.
    pub fn with_aggregation(mut self, aggregation: SocAggregation) -> Self {
        self.aggregation = aggregation;
        self
    }

    /// Applies `current_a` (positive = discharge) and any balancing bleeds
    /// for `dt_s` seconds.
    ///
    /// The tick counter advances whether or not the tick commits. Bleed
    /// currents are clamped to be non-negative and capped so a bled cell
    /// cannot end below its command's floor.
    ///
    /// # Errors
    ///
    /// Rejects the whole tick if any cell would fault; those cells are
    /// marked faulted, no cell state changes and the pack current reads
    /// zero.
    pub fn apply(
        &mut self,
        current_a: f64,
        balancing: &[BalanceCommand],
        dt_s: f64,
    ) -> Result<(), PackError> {
        self.tick += 1;

        if !current_a.is_finite() || !dt_s.is_finite() || dt_s < 0.0 {
            self.current_a = 0.0;
            return Err(PackError::InvalidStep { current_a, dt_s });
        }

        let mut bleed = vec![0.0; self.cells.len()];
        for cmd in balancing {
            let Some(cell) = self.cells.get(cmd.cell) else {
                self.current_a = 0.0;
                return Err(PackError::UnknownCell {
                    cell: cmd.cell,
                    cells: self.cells.len(),
                });
            };
            let mut amps = cmd.current_a.max(0.0);
            if dt_s > 0.0 {
                let headroom = (cell.soc() - cmd.floor_soc).max(0.0);
                amps = amps.min(headroom * cell.capacity_ah() * 3600.0 / dt_s);
            }
            bleed[cmd.cell] = f64::max(bleed[cmd.cell], amps);
        }

        let per_cell = current_a / self.parallel as f64;
        let mut updates: Vec<CellUpdate> = Vec::with_capacity(self.cells.len());
        let mut faults = Vec::new();
        for (i, cell) in self.cells.iter().enumerate() {
            match cell.preview(per_cell + bleed[i], dt_s) {
                Ok(update) => updates.push(update),
                Err(fault) => faults.push(CellFaultAt { cell: i, fault }),
            }
        }

        if !faults.is_empty() {
            for f in &faults {
                self.cells[f.cell].mark_faulted();
            }
            self.current_a = 0.0;
            warn!(
                tick = self.tick,
                faults = faults.len(),
                current_a,
                "pack tick rejected"
            );
            return Err(PackError::CellFaults {
                tick: self.tick,
                faults,
            });
        }

        for (cell, update) in self.cells.iter_mut().zip(updates) {
            cell.commit(update);
        }
        self.current_a = current_a;
        Ok(())
    }

    /// Clears the fault flag of every cell.
    pub fn clear_faults(&mut self) {
        for cell in &mut self.cells {
            cell.clear_fault();
        }
    }

    /// Sum over series groups of the mean group voltage.
    pub fn voltage(&self) -> f64 {
        self.cells
            .chunks(self.parallel)
            .map(|group| group.iter().map(Cell::voltage).sum::<f64>() / self.parallel as f64)
            .sum()
    }

    /// Aggregate SOC according to the configured [`SocAggregation`].
    pub fn soc(&self) -> f64 {
        match self.aggregation {
            SocAggregation::Mean => {
                self.cells.iter().map(Cell::soc).sum::<f64>() / self.cells.len() as f64
            }
            SocAggregation::Weakest => self.min_soc(),
        }
    }

    pub fn min_soc(&self) -> f64 {
        self.cells.iter().map(Cell::soc).fold(f64::INFINITY, f64::min)
    }

    pub fn max_soc(&self) -> f64 {
        self.cells
            .iter()
            .map(Cell::soc)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Hottest cell temperature.
    pub fn temperature(&self) -> f64 {
        self.cells
            .iter()
            .map(Cell::temperature)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Last committed pack current.
    pub fn current(&self) -> f64 {
        self.current_a
    }

    /// Usable pack capacity: `P` times the cell capacity.
    pub fn capacity_ah(&self) -> f64 {
        self.cells[0].capacity_ah() * self.parallel as f64
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn series(&self) -> usize {
        self.series
    }

    pub fn parallel(&self) -> usize {
        self.parallel
    }

    pub fn aggregation(&self) -> SocAggregation {
        self.aggregation
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Builds the owned state view consumed by the BMS and the snapshot.
    pub fn state(&self) -> PackState {
        let cells: Vec<CellState> = self
            .cells
            .iter()
            .map(|c| CellState {
                soc: c.soc(),
                voltage_v: c.voltage(),
                temperature_c: c.temperature(),
                current_a: c.current(),
                throughput_ah: c.throughput_ah(),
                state_of_health: c.state_of_health(),
                health: c.health(),
            })
            .collect();

        PackState {
            tick: self.tick,
            series: self.series,
            parallel: self.parallel,
            current_a: self.current_a,
            voltage_v: self.voltage(),
            soc: self.soc(),
            min_soc: self.min_soc(),
            max_soc: self.max_soc(),
            temperature_c: self.temperature(),
            min_temperature_c: cells
                .iter()
                .map(|c| c.temperature_c)
                .fold(f64::INFINITY, f64::min),
            capacity_ah: self.capacity_ah(),
            state_of_health: cells
                .iter()
                .map(|c| c.state_of_health)
                .fold(f64::INFINITY, f64::min),
            cells,
        }
    }
}
