//! Seeded solar and demand generators that feed the simulation driver.

pub mod demand;
pub mod solar;
pub mod solar_ar1;
pub mod types;

pub use demand::{DemandConfig, DemandProfile};
pub use solar::{SolarConfig, SolarModel, SolarPv};
pub use solar_ar1::SolarPvAr1;
pub use types::Profile;
