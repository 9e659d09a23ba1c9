//! Cell and pack physical model.

pub mod cell;
pub mod chemistry;
pub mod pack;

pub use cell::{Cell, CellFault, CellHealth};
pub use chemistry::{CellParams, Chemistry, OcvCurve};
pub use pack::{
    BalanceCommand, CellState, MAX_CELLS, Pack, PackError, PackState, SocAggregation, cell_count,
};
