/// Scenario batches, optionally on the rayon pool.
pub mod batch;
/// Fixed-step simulation clock.
pub mod clock;
pub mod engine;
pub mod kpi;
pub mod types;

pub use engine::Simulation;
pub use kpi::KpiReport;
pub use types::{SimConfig, SimSnapshot};
