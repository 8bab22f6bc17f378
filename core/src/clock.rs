//! Run clock — tick count and the fixed step interval.

use crate::types::{RunId, Tick};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimClock {
    pub run_id:              RunId,
    pub current_tick:        Tick,
    pub fixed_delta_seconds: f64,
}

impl SimClock {
    pub fn new(run_id: RunId, fixed_delta_seconds: f64) -> Self {
        Self {
            run_id,
            current_tick: 0,
            fixed_delta_seconds,
        }
    }

    /// Record one environment step. Returns the new tick number.
    pub fn advance(&mut self) -> Tick {
        self.current_tick += 1;
        self.current_tick
    }

    /// Simulated seconds elapsed since the loop started.
    pub fn elapsed_seconds(&self) -> f64 {
        self.current_tick as f64 * self.fixed_delta_seconds
    }
}
