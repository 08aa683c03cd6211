//! Controller configuration
//!
//! Gains, geometry and control limits are owned by each controller instance.
//! A configuration can be built in code, deserialized from JSON, or adjusted
//! with a flat parameter map.

use super::error::ControlError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// Per-axis box on the control input
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlBounds {
    pub lower: [f64; 2],
    pub upper: [f64; 2],
}

impl Default for ControlBounds {
    fn default() -> Self {
        ControlBounds {
            lower: [-10000.0, -10000.0],
            upper: [10000.0, 10000.0],
        }
    }
}

impl ControlBounds {
    /// A symmetric box `[-limit, limit]` on both axes
    pub fn symmetric(limit: f64) -> Self {
        ControlBounds {
            lower: [-limit, -limit],
            upper: [limit, limit],
        }
    }

    /// No limits on either axis
    pub fn unbounded() -> Self {
        ControlBounds {
            lower: [f64::NEG_INFINITY; 2],
            upper: [f64::INFINITY; 2],
        }
    }
}

/// Tuning of the CLF-CBF controller
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// CLF decay rate ε
    pub convergence_rate: f64,
    /// CBF decay rate k
    pub barrier_gain: f64,
    pub agent_radius: f64,
    /// Clearance added on top of obstacle and agent radii
    pub safety_margin: f64,
    /// Integration step dt in seconds
    pub time_step: f64,
    pub bounds: ControlBounds,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            convergence_rate: 0.4,
            barrier_gain: 1.0,
            agent_radius: 0.5,
            safety_margin: 0.1,
            time_step: 0.4,
            bounds: ControlBounds::default(),
        }
    }
}

impl ControllerConfig {
    /// Check every field, returning the first problem found
    pub fn validate(&self) -> Result<(), ControlError> {
        positive("convergence_rate", self.convergence_rate)?;
        positive("barrier_gain", self.barrier_gain)?;
        positive("time_step", self.time_step)?;
        non_negative("agent_radius", self.agent_radius)?;
        non_negative("safety_margin", self.safety_margin)?;

        for axis in 0..2 {
            let (lower, upper) = (self.bounds.lower[axis], self.bounds.upper[axis]);
            if lower.is_nan() || upper.is_nan() || lower > upper {
                return Err(ControlError::InvalidConfiguration(format!(
                    "bounds for u{} are invalid: [{}, {}]",
                    axis + 1,
                    lower,
                    upper
                )));
            }
        }

        if !self.keeps_clearance_between_ticks() {
            warn!(
                barrier_gain = self.barrier_gain,
                time_step = self.time_step,
                "barrier_gain * time_step exceeds 1, clearance is not guaranteed between ticks"
            );
        }
        if !self.descends_every_tick() {
            warn!(
                convergence_rate = self.convergence_rate,
                time_step = self.time_step,
                "convergence_rate * time_step exceeds 4, a tick can overshoot the goal and raise V"
            );
        }

        Ok(())
    }

    /// `k·dt <= 1`: a non-negative barrier stays non-negative after integration
    pub fn keeps_clearance_between_ticks(&self) -> bool {
        self.barrier_gain * self.time_step <= 1.0
    }

    /// `ε·dt <= 4`: the integrated step never increases the distance to the goal
    pub fn descends_every_tick(&self) -> bool {
        self.convergence_rate * self.time_step <= 4.0
    }

    /// Summed clearance radius for an obstacle of the given radius
    pub fn clearance(&self, obstacle_radius: f64) -> f64 {
        obstacle_radius + self.agent_radius + self.safety_margin
    }

    /// Overwrite fields from a parameter map, then re-validate
    pub fn configure(&mut self, params: &HashMap<String, f64>) -> Result<(), ControlError> {
        let mut updated = *self;
        for (key, &value) in params {
            match key.as_str() {
                "convergence_rate" => updated.convergence_rate = value,
                "barrier_gain" => updated.barrier_gain = value,
                "agent_radius" => updated.agent_radius = value,
                "safety_margin" => updated.safety_margin = value,
                "time_step" => updated.time_step = value,
                "u1_min" => updated.bounds.lower[0] = value,
                "u1_max" => updated.bounds.upper[0] = value,
                "u2_min" => updated.bounds.lower[1] = value,
                "u2_max" => updated.bounds.upper[1] = value,
                _ => {
                    return Err(ControlError::InvalidConfiguration(format!(
                        "unknown parameter {}",
                        key
                    )))
                }
            }
        }

        updated.validate()?;
        *self = updated;
        Ok(())
    }
}

fn positive(name: &str, value: f64) -> Result<(), ControlError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ControlError::InvalidConfiguration(format!(
            "{} must be positive, got {}",
            name, value
        )))
    }
}

fn non_negative(name: &str, value: f64) -> Result<(), ControlError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ControlError::InvalidConfiguration(format!(
            "{} must be non-negative, got {}",
            name, value
        )))
    }
}
