//! Three-band thresholds and the severity/derate rules built on them.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Severity of a monitored quantity, ordered from benign to fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BmsState {
    #[default]
    Normal,
    Warning,
    Protective,
    Fault,
}

impl BmsState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Warning => "warning",
            Self::Protective => "protective",
            Self::Fault => "fault",
        }
    }
}

impl std::fmt::Display for BmsState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Which side of the threshold is dangerous.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    /// Values rising past the threshold are dangerous.
    Upper,
    /// Values falling past the threshold are dangerous.
    Lower,
}

/// Warning, soft and hard limits for one monitored quantity.
///
/// For an upper bound `warning < soft < hard`; for a lower bound
/// `warning > soft > hard`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Threshold {
    pub warning: f64,
    pub soft: f64,
    pub hard: f64,
}

impl Threshold {
    pub const fn new(warning: f64, soft: f64, hard: f64) -> Self {
        Self {
            warning,
            soft,
            hard,
        }
    }

    /// Checks band ordering for `bound`.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` naming `field` if a limit is not finite or the
    /// bands are out of order.
    pub fn validate(&self, field: &str, bound: Bound) -> Result<(), ConfigError> {
        let values = [self.warning, self.soft, self.hard];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ConfigError::new(field, "limits must be finite"));
        }
        let ordered = match bound {
            Bound::Upper => self.warning < self.soft && self.soft < self.hard,
            Bound::Lower => self.warning > self.soft && self.soft > self.hard,
        };
        if !ordered {
            let rule = match bound {
                Bound::Upper => "warning < soft < hard",
                Bound::Lower => "warning > soft > hard",
            };
            return Err(ConfigError::new(
                field,
                format!(
                    "expected {rule}, got {}/{}/{}",
                    self.warning, self.soft, self.hard
                ),
            ));
        }
        Ok(())
    }

    /// Signed distance past `limit` in the dangerous direction.
    fn excess(value: f64, limit: f64, bound: Bound) -> f64 {
        match bound {
            Bound::Upper => value - limit,
            Bound::Lower => limit - value,
        }
    }

    /// Band `value` falls in. Reaching a limit counts as entering its band.
    pub fn classify(&self, value: f64, bound: Bound) -> BmsState {
        if Self::excess(value, self.hard, bound) >= 0.0 {
            BmsState::Fault
        } else if Self::excess(value, self.soft, bound) >= 0.0 {
            BmsState::Protective
        } else if Self::excess(value, self.warning, bound) >= 0.0 {
            BmsState::Warning
        } else {
            BmsState::Normal
        }
    }

    /// Derate factor: 1.0 up to the soft limit, falling linearly to 0.0 at
    /// the hard limit.
    pub fn derate(&self, value: f64, bound: Bound) -> f64 {
        let span = (self.hard - self.soft).abs();
        let past_soft = Self::excess(value, self.soft, bound);
        if past_soft <= 0.0 {
            1.0
        } else {
            (1.0 - past_soft / span).clamp(0.0, 1.0)
        }
    }

    /// True when `value` is strictly inside the soft limit.
    pub fn within_soft(&self, value: f64, bound: Bound) -> bool {
        Self::excess(value, self.soft, bound) < 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const UPPER: Threshold = Threshold::new(4.10, 4.15, 4.30);
    const LOWER: Threshold = Threshold::new(5.0, 0.0, -20.0);

    #[test]
    fn classifies_upper_bands() {
        assert_eq!(UPPER.classify(4.00, Bound::Upper), BmsState::Normal);
        assert_eq!(UPPER.classify(4.12, Bound::Upper), BmsState::Warning);
        assert_eq!(UPPER.classify(4.15, Bound::Upper), BmsState::Protective);
        assert_eq!(UPPER.classify(4.30, Bound::Upper), BmsState::Fault);
    }

    #[test]
    fn classifies_lower_bands() {
        assert_eq!(LOWER.classify(20.0, Bound::Lower), BmsState::Normal);
        assert_eq!(LOWER.classify(3.0, Bound::Lower), BmsState::Warning);
        assert_eq!(LOWER.classify(-5.0, Bound::Lower), BmsState::Protective);
        assert_eq!(LOWER.classify(-25.0, Bound::Lower), BmsState::Fault);
    }

    #[test]
    fn derate_is_linear_between_soft_and_hard() {
        assert_eq!(UPPER.derate(4.10, Bound::Upper), 1.0);
        assert_abs_diff_eq!(UPPER.derate(4.225, Bound::Upper), 0.5, epsilon = 1e-9);
        assert_eq!(UPPER.derate(4.40, Bound::Upper), 0.0);
        assert_abs_diff_eq!(LOWER.derate(-10.0, Bound::Lower), 0.5, epsilon = 1e-9);
    }

    #[test]
    fn rejects_misordered_bands() {
        assert!(UPPER.validate("bms.over_voltage", Bound::Upper).is_ok());
        assert!(UPPER.validate("bms.over_voltage", Bound::Lower).is_err());
        let equal = Threshold::new(4.1, 4.1, 4.3);
        let err = equal.validate("bms.over_voltage", Bound::Upper).unwrap_err();
        assert_eq!(err.field, "bms.over_voltage");
        assert!(LOWER.validate("bms.under_temperature", Bound::Lower).is_ok());
    }
}
