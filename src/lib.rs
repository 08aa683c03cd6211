//! Safe velocity control for a planar single-integrator agent.
//!
//! A Control Lyapunov Function drives the agent toward its goal, and one
//! Control Barrier Function per circular obstacle keeps it outside each
//! obstacle's clearance. Every tick solves two small quadratic programs: a
//! minimum-effort reference control, then its projection onto the safe set.
pub mod common;
pub mod control;
pub mod solver;

pub use crate::common::types::{Obstacle, Point2D, Velocity2D};
pub use crate::control::{
    ClfCbfController, ControlBounds, ControlError, ControlOutput, ControllerConfig, ControllerState,
};
pub use crate::solver::{ActiveSetSolver, ClarabelSolver, QpError, QpSolver, QuadraticProgram};
