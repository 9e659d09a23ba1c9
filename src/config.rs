//! TOML-based scenario configuration and preset definitions.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::battery::{CellParams, Chemistry, OcvCurve, Pack, SocAggregation, cell_count};
use crate::bms::{BalancingConfig, Bms, BmsConfig, Threshold};
use crate::ems::{Ems, EmsPolicy, Tariff};
use crate::error::ConfigError;
use crate::profiles::{DemandConfig, DemandProfile, SolarConfig, SolarModel};
use crate::sim::engine::Simulation;
use crate::sim::types::SimConfig;

/// Seed stream offsets for the profile generators.
const SOLAR_STREAM: u64 = 1;
const DEMAND_STREAM: u64 = 2;

/// Top-level scenario configuration parsed from TOML.
///
/// Every section is optional and defaults to the baseline scenario. Load
/// from TOML with [`ScenarioConfig::from_toml_file`] or pick a built-in
/// preset with [`ScenarioConfig::from_preset`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioConfig {
    pub simulation: SimulationConfig,
    pub pack: PackConfig,
    pub bms: BmsSection,
    pub ems: EmsPolicy,
    pub tariff: Tariff,
    pub demand: DemandConfig,
    pub solar: SolarConfig,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self::baseline()
    }
}

/// Simulation timing and seed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Number of timesteps per simulated day (must be > 0).
    pub steps_per_day: usize,
    /// Number of days to simulate (must be > 0).
    pub days: usize,
    /// Master random seed.
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            steps_per_day: 96,
            days: 1,
            seed: 42,
        }
    }
}

/// Pack topology and cell parameters.
///
/// Cell parameters start from the chemistry defaults; any field set here
/// overrides them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PackConfig {
    pub series: usize,
    pub parallel: usize,
    pub chemistry: Chemistry,
    /// Capacity of one cell (Ah).
    pub capacity_ah: f64,
    /// SOC of every cell at start, unless `initial_socs` is given.
    pub initial_soc: f64,
    /// One SOC per cell, in pack order.
    pub initial_socs: Option<Vec<f64>>,
    pub soc_aggregation: SocAggregation,
    pub ambient_c: f64,
    pub internal_resistance_ohm: Option<f64>,
    pub thermal_mass_j_per_k: Option<f64>,
    pub cooling_coeff_per_s: Option<f64>,
    pub max_temperature_c: Option<f64>,
    pub cycle_life: Option<f64>,
    /// `[[soc, volts], ...]` replacing the chemistry's OCV curve.
    pub ocv_table: Option<Vec<(f64, f64)>>,
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            series: 96,
            parallel: 1,
            chemistry: Chemistry::Nmc,
            capacity_ah: 50.0,
            initial_soc: 0.5,
            initial_socs: None,
            soc_aggregation: SocAggregation::Mean,
            ambient_c: 25.0,
            internal_resistance_ohm: None,
            thermal_mass_j_per_k: None,
            cooling_coeff_per_s: None,
            max_temperature_c: None,
            cycle_life: None,
            ocv_table: None,
        }
    }
}

impl PackConfig {
    /// Resolves the parameters shared by every cell.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` for an invalid OCV table or implausible
    /// parameter.
    pub fn cell_params(&self) -> Result<CellParams, ConfigError> {
        let mut params = CellParams::for_chemistry(self.chemistry, self.capacity_ah);
        params.ambient_c = self.ambient_c;
        if let Some(r) = self.internal_resistance_ohm {
            params.internal_resistance_ohm = r;
        }
        if let Some(m) = self.thermal_mass_j_per_k {
            params.thermal_mass_j_per_k = m;
        }
        if let Some(k) = self.cooling_coeff_per_s {
            params.cooling_coeff_per_s = k;
        }
        if let Some(t) = self.max_temperature_c {
            params.max_temperature_c = t;
        }
        if let Some(n) = self.cycle_life {
            params.cycle_life = n;
        }
        if let Some(table) = &self.ocv_table {
            params.ocv = OcvCurve::new(table.clone())?;
        }
        params.validate()?;
        Ok(params)
    }

    /// Assembles the pack.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` for an invalid topology, SOC list or cell
    /// parameter.
    pub fn build(&self) -> Result<Pack, ConfigError> {
        let params = self.cell_params()?;
        let pack = match &self.initial_socs {
            Some(socs) => Pack::with_cell_socs(self.series, self.parallel, params, socs)?,
            None => Pack::new(self.series, self.parallel, params, self.initial_soc)?,
        };
        Ok(pack.with_aggregation(self.soc_aggregation))
    }
}

/// `[bms]` section.
///
/// Unset thresholds fall back to the chemistry defaults of `[pack]`, so a
/// scenario only names the limits it changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BmsSection {
    pub over_voltage: Option<Threshold>,
    pub under_voltage: Option<Threshold>,
    pub over_temperature: Option<Threshold>,
    pub under_temperature: Option<Threshold>,
    pub over_current: Option<Threshold>,
    pub rated_charge_current_a: Option<f64>,
    pub rated_discharge_current_a: Option<f64>,
    pub imbalance_warning_spread: Option<f64>,
    pub hysteresis_ticks: Option<u32>,
    pub min_state_of_health: Option<f64>,
    pub event_log_capacity: Option<usize>,
    pub balancing: BalancingConfig,
}

impl BmsSection {
    /// Merges this section over the defaults of `chemistry`.
    pub fn resolve(&self, chemistry: Chemistry) -> BmsConfig {
        let base = BmsConfig::for_chemistry(chemistry);
        BmsConfig {
            over_voltage: self.over_voltage.unwrap_or(base.over_voltage),
            under_voltage: self.under_voltage.unwrap_or(base.under_voltage),
            over_temperature: self.over_temperature.unwrap_or(base.over_temperature),
            under_temperature: self.under_temperature.unwrap_or(base.under_temperature),
            over_current: self.over_current.unwrap_or(base.over_current),
            rated_charge_current_a: self
                .rated_charge_current_a
                .unwrap_or(base.rated_charge_current_a),
            rated_discharge_current_a: self
                .rated_discharge_current_a
                .unwrap_or(base.rated_discharge_current_a),
            imbalance_warning_spread: self
                .imbalance_warning_spread
                .unwrap_or(base.imbalance_warning_spread),
            hysteresis_ticks: self.hysteresis_ticks.unwrap_or(base.hysteresis_ticks),
            balancing: self.balancing.clone(),
            min_state_of_health: self
                .min_state_of_health
                .unwrap_or(base.min_state_of_health),
            event_log_capacity: self.event_log_capacity.unwrap_or(base.event_log_capacity),
        }
    }
}

impl ScenarioConfig {
    /// Available preset names.
    pub const PRESETS: &[&str] = &["baseline", "high_solar", "hot_climate", "imbalanced"];

    /// 96S1P NMC, 50 Ah cells, 5 kW of simple-model solar, one day at
    /// 15-minute resolution.
    pub fn baseline() -> Self {
        Self {
            simulation: SimulationConfig::default(),
            pack: PackConfig::default(),
            bms: BmsSection::default(),
            ems: EmsPolicy::default(),
            tariff: Tariff::default(),
            demand: DemandConfig::default(),
            solar: SolarConfig::default(),
        }
    }

    /// Oversized PV with AR(1) clouds and a tight export cap.
    pub fn high_solar() -> Self {
        Self {
            simulation: SimulationConfig {
                days: 2,
                ..SimulationConfig::default()
            },
            pack: PackConfig {
                parallel: 2,
                initial_soc: 0.3,
                ..PackConfig::default()
            },
            ems: EmsPolicy {
                max_export_w: 3_000.0,
                ..EmsPolicy::default()
            },
            demand: DemandConfig {
                base_w: 1_000.0,
                amplitude_w: 300.0,
                ..DemandConfig::default()
            },
            solar: SolarConfig {
                model: SolarModel::Ar1,
                peak_w: 12_000.0,
                sunrise_hour: 5.0,
                sunset_hour: 19.0,
                cloud_noise_std: 0.2,
                ..SolarConfig::default()
            },
            ..Self::baseline()
        }
    }

    /// Ambient above the soft over-temperature limit: the BMS runs the pack
    /// derated in `Protective` all day.
    pub fn hot_climate() -> Self {
        Self {
            pack: PackConfig {
                ambient_c: 52.0,
                initial_soc: 0.6,
                ..PackConfig::default()
            },
            demand: DemandConfig {
                base_w: 2_500.0,
                evening_peak_w: 2_500.0,
                ..DemandConfig::default()
            },
            ..Self::baseline()
        }
    }

    /// 16S1P LFP with a 6 % initial SOC spread, off-peak grid charging on.
    pub fn imbalanced() -> Self {
        let socs = (0..16).map(|i| 0.45 + 0.01 * (i % 7) as f64).collect();
        Self {
            pack: PackConfig {
                series: 16,
                chemistry: Chemistry::Lfp,
                capacity_ah: 100.0,
                initial_socs: Some(socs),
                ..PackConfig::default()
            },
            ems: EmsPolicy {
                grid_charge_below_soc: Some(0.4),
                ..EmsPolicy::default()
            },
            demand: DemandConfig {
                base_w: 600.0,
                amplitude_w: 200.0,
                evening_peak_w: 800.0,
                noise_std_w: 50.0,
                ..DemandConfig::default()
            },
            solar: SolarConfig {
                peak_w: 2_000.0,
                ..SolarConfig::default()
            },
            ..Self::baseline()
        }
    }

    /// Loads a scenario from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "baseline" => Ok(Self::baseline()),
            "high_solar" => Ok(Self::high_solar()),
            "hot_climate" => Ok(Self::hot_climate()),
            "imbalanced" => Ok(Self::imbalanced()),
            _ => Err(ConfigError::new(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a scenario from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new(
                "scenario",
                format!("cannot read \"{}\": {e}", path.display()),
            )
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Validates every section and returns all problems found.
    ///
    /// Returns an empty vector if the configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let s = &self.simulation;

        if s.steps_per_day == 0 {
            errors.push(ConfigError::new("simulation.steps_per_day", "must be > 0"));
        }
        if s.days == 0 {
            errors.push(ConfigError::new("simulation.days", "must be > 0"));
        }

        let p = &self.pack;
        let cells = match cell_count(p.series, p.parallel) {
            Ok(cells) => Some(cells),
            Err(err) => {
                errors.push(err);
                None
            }
        };
        match &p.initial_socs {
            Some(socs) => {
                if let Some(cells) = cells
                    && socs.len() != cells
                {
                    errors.push(ConfigError::new(
                        "pack.initial_socs",
                        format!("expected {cells} values, got {}", socs.len()),
                    ));
                }
                if let Some(bad) = socs.iter().find(|v| !(0.0..=1.0).contains(*v)) {
                    errors.push(ConfigError::new(
                        "pack.initial_socs",
                        format!("must be within [0, 1], got {bad}"),
                    ));
                }
            }
            None => {
                if !(0.0..=1.0).contains(&p.initial_soc) {
                    errors.push(ConfigError::new(
                        "pack.initial_soc",
                        "must be within [0, 1]",
                    ));
                }
            }
        }
        if let Err(e) = p.cell_params() {
            errors.push(e);
        }

        let component_checks = [
            self.bms.resolve(p.chemistry).validate(),
            self.ems.validate(),
            self.tariff.validate(),
            self.demand.validate(),
            self.solar.validate(),
        ];
        errors.extend(component_checks.into_iter().filter_map(Result::err));

        if s.steps_per_day > 0
            && self.solar.validate().is_ok()
            && let Err(e) = self.solar.daylight_steps(s.steps_per_day)
        {
            errors.push(e);
        }

        errors
    }

    /// Builds a ready-to-run simulation with profiles attached.
    ///
    /// # Errors
    ///
    /// Returns the first problem [`ScenarioConfig::validate`] finds.
    pub fn build(&self) -> Result<Simulation, ConfigError> {
        if let Some(first) = self.validate().into_iter().next() {
            return Err(first);
        }
        let s = &self.simulation;
        let sim_config = SimConfig::new(s.steps_per_day, s.days, s.seed);

        let pack = self.pack.build()?;
        let bms = Bms::new(self.bms.resolve(self.pack.chemistry))?;
        let ems = Ems::new(self.ems.clone(), self.tariff.clone())?;
        let solar = self
            .solar
            .build(s.steps_per_day, sim_config.derived_seed(SOLAR_STREAM))?;
        let demand = Box::new(DemandProfile::new(
            self.demand.clone(),
            s.steps_per_day,
            sim_config.derived_seed(DEMAND_STREAM),
        ));

        Ok(Simulation::new(sim_config, pack, bms, ems).with_profiles(solar, demand))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bms::BmsState;

    #[test]
    fn every_preset_is_valid() {
        for name in ScenarioConfig::PRESETS {
            let cfg = ScenarioConfig::from_preset(name).unwrap();
            let errors = cfg.validate();
            assert!(errors.is_empty(), "{name} should be valid: {errors:?}");
        }
    }

    #[test]
    fn from_preset_unknown() {
        let err = ScenarioConfig::from_preset("nonexistent").unwrap_err();
        assert_eq!(err.field, "preset");
        assert!(err.message.contains("unknown preset"));
    }

    #[test]
    fn empty_toml_is_baseline() {
        let cfg = ScenarioConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, ScenarioConfig::baseline());
    }

    #[test]
    fn valid_toml_parses() {
        let toml = r#"
[simulation]
steps_per_day = 48
days = 2
seed = 99

[pack]
series = 4
parallel = 2
chemistry = "lfp"
capacity_ah = 100.0
initial_soc = 0.7
soc_aggregation = "weakest"

[bms]
hysteresis_ticks = 5
over_temperature = { warning = 40.0, soft = 45.0, hard = 55.0 }

[bms.balancing]
start_spread = 0.03

[ems]
reserve_soc = 0.2
max_import_w = 8000.0

[tariff]
import_price = 0.30

[solar]
model = "ar1"
peak_w = 8000.0
"#;
        let cfg = ScenarioConfig::from_toml_str(toml).unwrap();
        assert_eq!(cfg.simulation.steps_per_day, 48);
        assert_eq!(cfg.pack.chemistry, Chemistry::Lfp);
        assert_eq!(cfg.pack.soc_aggregation, SocAggregation::Weakest);
        assert_eq!(cfg.solar.model, SolarModel::Ar1);
        assert_eq!(cfg.ems.max_import_w, Some(8000.0));

        let bms = cfg.bms.resolve(cfg.pack.chemistry);
        assert_eq!(bms.hysteresis_ticks, 5);
        assert_eq!(bms.over_temperature.soft, 45.0);
        assert_eq!(bms.balancing.start_spread, 0.03);
        assert_eq!(
            bms.over_voltage,
            BmsConfig::for_chemistry(Chemistry::Lfp).over_voltage
        );
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn invalid_toml_unknown_field() {
        let toml = r#"
[pack]
series = 4
bogus_field = true
"#;
        let err = ScenarioConfig::from_toml_str(toml).unwrap_err();
        assert_eq!(err.field, "toml");
    }

    #[test]
    fn validation_reports_every_problem() {
        let mut cfg = ScenarioConfig::baseline();
        cfg.simulation.steps_per_day = 0;
        cfg.pack.series = 0;
        cfg.ems.reserve_soc = 1.5;
        let errors = cfg.validate();
        for field in ["simulation.steps_per_day", "pack.series", "ems.reserve_soc"] {
            assert!(errors.iter().any(|e| e.field == field), "missing {field}");
        }
    }

    #[test]
    fn validation_catches_soc_list_length() {
        let mut cfg = ScenarioConfig::baseline();
        cfg.pack.initial_socs = Some(vec![0.5; 3]);
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "pack.initial_socs"));
        assert!(cfg.build().is_err());
    }

    #[test]
    fn validation_catches_non_monotonic_ocv() {
        let mut cfg = ScenarioConfig::baseline();
        let mut table: Vec<(f64, f64)> = (0..=10)
            .map(|i| (i as f64 / 10.0, 3.0 + 0.1 * i as f64))
            .collect();
        table[5].1 = 2.0;
        cfg.pack.ocv_table = Some(table);
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "pack.ocv_table"));
    }

    #[test]
    fn validation_reports_overflowing_topology() {
        let mut cfg = ScenarioConfig::baseline();
        cfg.pack.series = usize::MAX;
        cfg.pack.parallel = 2;
        cfg.pack.initial_socs = Some(vec![0.5; 4]);
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "pack.series"));
        assert!(!errors.iter().any(|e| e.field == "pack.initial_socs"));
        assert!(cfg.build().is_err());
    }

    #[test]
    fn validation_catches_misordered_threshold() {
        let mut cfg = ScenarioConfig::baseline();
        cfg.bms.over_voltage = Some(Threshold::new(4.2, 4.1, 4.3));
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "bms.over_voltage"));
    }

    #[test]
    fn build_baseline_runs_one_tick() {
        let mut sim = ScenarioConfig::baseline().build().unwrap();
        let snap = sim.step(0.0, 1_000.0, 900.0);
        assert_eq!(snap.pack.series, 96);
        assert_eq!(snap.bms.state, BmsState::Normal);
    }

    #[test]
    fn hot_climate_starts_protective() {
        let mut sim = ScenarioConfig::hot_climate().build().unwrap();
        let snap = sim.step(0.0, 2_000.0, 900.0);
        assert_eq!(snap.bms.state, BmsState::Protective);
        assert!(snap.bms.max_discharge_current < 50.0);
    }
}
