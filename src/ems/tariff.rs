//! Time-of-use tariff for grid cost accounting.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Flat import price with a peak multiplier and a flat export price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Tariff {
    /// Off-peak import price (currency per kWh).
    pub import_price: f64,
    /// Multiplier on `import_price` inside the peak window.
    pub peak_multiplier: f64,
    /// Peak window start, hour of day (inclusive).
    pub peak_start_hour: f64,
    /// Peak window end, hour of day (exclusive). May wrap past midnight.
    pub peak_end_hour: f64,
    /// Export remuneration (currency per kWh).
    pub export_price: f64,
}

impl Default for Tariff {
    fn default() -> Self {
        Self {
            import_price: 0.25,
            peak_multiplier: 1.5,
            peak_start_hour: 18.0,
            peak_end_hour: 21.0,
            export_price: 0.05,
        }
    }
}

impl Tariff {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("tariff.import_price", self.import_price),
            ("tariff.peak_multiplier", self.peak_multiplier),
            ("tariff.export_price", self.export_price),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::new(field, "must be >= 0"));
            }
        }
        for (field, value) in [
            ("tariff.peak_start_hour", self.peak_start_hour),
            ("tariff.peak_end_hour", self.peak_end_hour),
        ] {
            if !(0.0..=24.0).contains(&value) {
                return Err(ConfigError::new(field, "must be within [0, 24]"));
            }
        }
        Ok(())
    }

    /// Whether `hour` (0.0..24.0) falls in the peak window.
    pub fn is_peak(&self, hour: f64) -> bool {
        let (start, end) = (self.peak_start_hour, self.peak_end_hour);
        if start <= end {
            hour >= start && hour < end
        } else {
            hour >= start || hour < end
        }
    }

    /// Import price at `hour`.
    pub fn import_price_at(&self, hour: f64) -> f64 {
        if self.is_peak(hour) {
            self.import_price * self.peak_multiplier
        } else {
            self.import_price
        }
    }

    /// Net cost of one tick: import cost minus export revenue.
    pub fn cost(&self, import_w: f64, export_w: f64, dt_s: f64, hour: f64) -> f64 {
        let to_kwh = dt_s / 3600.0 / 1000.0;
        import_w * to_kwh * self.import_price_at(hour) - export_w * to_kwh * self.export_price
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn peak_window_applies_multiplier() {
        let t = Tariff::default();
        assert!(!t.is_peak(17.99));
        assert!(t.is_peak(18.0));
        assert!(!t.is_peak(21.0));
        assert_abs_diff_eq!(t.import_price_at(19.0), 0.375);
    }

    #[test]
    fn wrapping_peak_window() {
        let t = Tariff {
            peak_start_hour: 22.0,
            peak_end_hour: 2.0,
            ..Tariff::default()
        };
        assert!(t.is_peak(23.0));
        assert!(t.is_peak(1.0));
        assert!(!t.is_peak(12.0));
    }

    #[test]
    fn cost_nets_export_revenue() {
        let t = Tariff::default();
        // 1 kWh import at 0.25, 2 kWh export at 0.05
        let c = t.cost(1000.0, 2000.0, 3600.0, 10.0);
        assert_abs_diff_eq!(c, 0.15, epsilon = 1e-12);
    }

    #[test]
    fn rejects_out_of_day_hours() {
        let t = Tariff {
            peak_end_hour: 25.0,
            ..Tariff::default()
        };
        assert_eq!(t.validate().unwrap_err().field, "tariff.peak_end_hour");
    }
}
