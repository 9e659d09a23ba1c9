/// Position of one tick on the simulated timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    /// Zero-based step index since the clock started.
    pub index: usize,
    /// Hour of day at the start of the tick, in `[0, 24)`.
    pub hour_of_day: f64,
}

/// Hour of day, in `[0, 24)`, at `elapsed_s` seconds into the run.
pub fn hour_of_day(elapsed_s: f64) -> f64 {
    (elapsed_s / 3600.0).rem_euclid(24.0)
}

/// Fixed-step simulation clock.
///
/// Hands out `total` ticks of `dt_s` seconds each, starting at `start_s`,
/// then stops.
///
/// # Examples
///
/// ```
/// use bess_sim::sim::clock::Clock;
///
/// let mut clock = Clock::new(0.0, 3, 3600.0);
/// let mut hours = Vec::new();
///
/// clock.run(|tick| hours.push(tick.hour_of_day));
/// assert_eq!(hours, vec![0.0, 1.0, 2.0]);
/// ```
#[derive(Debug, Clone)]
pub struct Clock {
    current: usize,
    total: usize,
    start_s: f64,
    dt_s: f64,
}

impl Clock {
    /// Creates a clock for `total` ticks of `dt_s` seconds from `start_s`.
    pub fn new(start_s: f64, total: usize, dt_s: f64) -> Self {
        Self {
            current: 0,
            total,
            start_s,
            dt_s,
        }
    }

    /// Advances by one tick.
    ///
    /// # Returns
    ///
    /// * `Some(tick)` - The tick that was just started
    /// * `None` - Once all ticks have been handed out
    pub fn tick(&mut self) -> Option<Tick> {
        if self.current >= self.total {
            return None;
        }
        let index = self.current;
        self.current += 1;
        Some(Tick {
            index,
            hour_of_day: hour_of_day(self.start_s + index as f64 * self.dt_s),
        })
    }

    /// Ticks remaining before the clock stops.
    pub fn remaining(&self) -> usize {
        self.total - self.current
    }

    /// Calls `f` for every remaining tick.
    pub fn run(&mut self, mut f: impl FnMut(Tick)) {
        while let Some(tick) = self.tick() {
            f(tick);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_sequence() {
        let mut clock = Clock::new(0.0, 2, 900.0);
        let first = clock.tick().unwrap();
        assert_eq!(first.index, 0);
        assert_eq!(first.hour_of_day, 0.0);
        let second = clock.tick().unwrap();
        assert_eq!(second.index, 1);
        assert_eq!(second.hour_of_day, 0.25);
        assert_eq!(clock.tick(), None);
    }

    #[test]
    fn test_hour_wraps_at_midnight() {
        let mut clock = Clock::new(0.0, 26, 3600.0);
        let hours: Vec<f64> = std::iter::from_fn(|| clock.tick())
            .map(|t| t.hour_of_day)
            .collect();
        assert_eq!(hours[23], 23.0);
        assert_eq!(hours[24], 0.0);
        assert_eq!(hours[25], 1.0);
    }

    #[test]
    fn test_offset_start() {
        let mut clock = Clock::new(23.0 * 3600.0, 2, 3600.0);
        let hours: Vec<f64> = std::iter::from_fn(|| clock.tick())
            .map(|t| t.hour_of_day)
            .collect();
        assert_eq!(hours, vec![23.0, 0.0]);
    }

    #[test]
    fn test_remaining_counts_down() {
        let mut clock = Clock::new(0.0, 3, 60.0);
        assert_eq!(clock.remaining(), 3);
        clock.tick();
        assert_eq!(clock.remaining(), 2);
    }

    #[test]
    fn test_empty_clock() {
        let mut clock = Clock::new(0.0, 0, 900.0);
        assert_eq!(clock.tick(), None);

        let mut was_called = false;
        clock.run(|_| was_called = true);
        assert!(!was_called);
    }
}
