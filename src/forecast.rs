//! Rolling forecast buffers used by the EMS.

use std::collections::VecDeque;

/// Bounded history with a naive "tomorrow is today" forecast.
///
/// Once the buffer holds a full window (typically one day of steps), the
/// forecast for the next step is the value observed one window ago.
#[derive(Debug, Clone, PartialEq)]
pub struct RollingForecast {
    history: VecDeque<f64>,
    window: usize,
}

impl RollingForecast {
    /// Creates an empty buffer keeping at most `window` values.
    ///
    /// # Panics
    ///
    /// Panics if `window` is zero.
    pub fn new(window: usize) -> Self {
        assert!(window > 0, "forecast window must be > 0");
        Self {
            history: VecDeque::with_capacity(window),
            window,
        }
    }

    /// Appends an observation, evicting the oldest once full.
    pub fn push(&mut self, value: f64) {
        if self.history.len() == self.window {
            self.history.pop_front();
        }
        self.history.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Most recent observation.
    pub fn last(&self) -> Option<f64> {
        self.history.back().copied()
    }

    /// Mean of the buffered values, or 0.0 when empty.
    pub fn mean(&self) -> f64 {
        if self.history.is_empty() {
            return 0.0;
        }
        self.history.iter().sum::<f64>() / self.history.len() as f64
    }

    /// Forecast for the next `horizon` steps.
    ///
    /// Replays the buffered history from its oldest value, repeating it to
    /// fill the horizon. An empty history forecasts zeros.
    ///
    /// # Arguments
    ///
    /// * `horizon` - Number of steps to forecast
    ///
    /// # Returns
    ///
    /// A vector of forecast values with length equal to `horizon`.
    pub fn forecast(&self, horizon: usize) -> Vec<f64> {
        if horizon == 0 {
            return Vec::new();
        }
        if self.history.is_empty() {
            return vec![0.0; horizon];
        }
        self.history.iter().copied().cycle().take(horizon).collect()
    }
}
