//! Single-integrator kinematics

use crate::common::types::{Point2D, Velocity2D};

/// Advance a position by one step: `x + u * dt`
pub fn integrate(position: &Point2D, velocity: &Velocity2D, time_step: f64) -> Point2D {
    position + velocity * time_step
}
