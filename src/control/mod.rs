//! Control module: constraint construction, the two-stage QP controller and
//! single-integrator kinematics
pub mod config;
pub mod constraints;
pub mod controllers;
pub mod error;
pub mod integrator;
pub mod trajectory;

pub use self::config::{ControlBounds, ControllerConfig};
pub use self::controllers::{ClfCbfController, ControlOutput, ControllerState, SolvedPrograms};
pub use self::error::{ControlError, InfeasibilityCause, Stage};
