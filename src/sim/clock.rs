//! Logical clock.

use crate::core::Time;

/// Monotonic logical time, advanced explicitly by the caller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationClock {
    time: Time,
}

impl SimulationClock {
    /// Start the clock at `time`.
    pub fn new(time: Time) -> Self {
        Self { time }
    }

    /// Current time.
    pub fn time(&self) -> Time {
        self.time
    }

    /// Move forward by `delta` and return the new time. Negative or
    /// non-finite steps are ignored so time never runs backwards.
    pub fn advance(&mut self, delta: Time) -> Time {
        if delta.is_finite() && delta > 0.0 {
            self.time += delta;
        }
        self.time
    }
}

impl Default for SimulationClock {
    fn default() -> Self {
        Self::new(0.0)
    }
}
