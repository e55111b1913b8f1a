//! Virtual clock for discrete-event simulation.
//!
//! The [`SimClock`] tracks simulation time independently of wall-clock time,
//! advancing only when events are processed. This enables deterministic,
//! repeatable simulations regardless of host machine speed.

use serde::{Deserialize, Serialize};

/// Virtual simulation clock.
///
/// Time is a real-valued cursor in the cost model's output unit (seconds with
/// the default coefficients). It never moves backwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimClock {
    now: f64,
}

impl SimClock {
    /// Create a new clock starting at time zero.
    pub fn new() -> Self {
        Self { now: 0.0 }
    }

    /// Create a clock starting at a specific time.
    pub fn starting_at(time: f64) -> Self {
        Self { now: time }
    }

    /// Current simulation time.
    pub fn now(&self) -> f64 {
        self.now
    }

    /// Advance the clock to a specific time.
    ///
    /// # Panics
    ///
    /// Panics in debug mode if `time` is in the past.
    pub fn advance_to(&mut self, time: f64) {
        debug_assert!(
            time >= self.now,
            "Cannot move clock backwards: current={}, target={}",
            self.now,
            time,
        );
        self.now = time;
    }

    /// Advance the clock by a non-negative duration.
    pub fn advance_by(&mut self, delta: f64) {
        debug_assert!(delta >= 0.0, "Negative clock delta: {}", delta);
        self.now += delta;
    }

    /// Whether the clock has reached `limit`, if one is set.
    pub fn reached(&self, limit: Option<f64>) -> bool {
        limit.is_some_and(|l| self.now >= l)
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}
