//! Battery energy storage simulator.
//!
//! Cells and packs, a BMS that guards and balances them, and an EMS that
//! dispatches the pack against solar generation and household demand.

pub mod battery;
pub mod bms;
/// TOML scenarios and built-in presets.
pub mod config;
pub mod ems;
pub mod error;
pub mod forecast;
/// CSV and JSON-lines snapshot export.
pub mod io;
pub mod profiles;
/// Simulation driver, clock, KPIs and batch runner.
pub mod sim;

pub use error::ConfigError;
