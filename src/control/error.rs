//! Errors reported by the controller

use crate::common::types::{Point2D, Velocity2D};
use crate::solver::QpError;
use std::fmt;
use thiserror::Error;

/// The two optimization stages of a control tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Reference,
    SafetyFilter,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Reference => write!(f, "reference control"),
            Stage::SafetyFilter => write!(f, "safety filter"),
        }
    }
}

/// Why no safe control exists for a tick
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InfeasibilityCause {
    /// The agent is already inside the clearance of an obstacle
    #[error("obstacle {obstacle} clearance already violated (h = {barrier:.4})")]
    ClearanceViolated { obstacle: usize, barrier: f64 },
    #[error("barrier constraints of {obstacles} obstacles and the control bounds do not intersect")]
    EmptyFeasibleSet { obstacles: usize },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControlError {
    #[error("goal has not been set")]
    GoalNotSet,

    #[error("no control within bounds satisfies the CLF constraint at {}", fmt_point(.position))]
    ClfInfeasible { position: Point2D, goal: Point2D },

    #[error("safety filter infeasible at {}: {cause}", fmt_point(.position))]
    CbfInfeasible {
        position: Point2D,
        reference_velocity: Velocity2D,
        cause: InfeasibilityCause,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("invalid obstacle {index}: {reason}")]
    InvalidObstacle { index: usize, reason: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{stage} solve failed: {source}")]
    Solver {
        stage: Stage,
        #[source]
        source: QpError,
    },
}

fn fmt_point(point: &Point2D) -> String {
    format!("({:.3}, {:.3})", point.x, point.y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failing_stage() {
        let err = ControlError::Solver {
            stage: Stage::SafetyFilter,
            source: QpError::NotConvex,
        };
        assert_eq!(err.to_string(), "safety filter solve failed: objective is not strictly convex");
    }

    #[test]
    fn cbf_message_includes_position_and_cause() {
        let err = ControlError::CbfInfeasible {
            position: Point2D::new(1.0, 2.0),
            reference_velocity: Velocity2D::zeros(),
            cause: InfeasibilityCause::EmptyFeasibleSet { obstacles: 3 },
        };
        assert_eq!(
            err.to_string(),
            "safety filter infeasible at (1.000, 2.000): barrier constraints of 3 obstacles and the control bounds do not intersect"
        );
    }
}
