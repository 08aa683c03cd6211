//! CLF-CBF quadratic-program controller
//!
//! Each tick runs two programs. The reference stage finds the smallest
//! control that satisfies the Lyapunov decay condition toward the goal, and
//! the safety filter projects that reference onto the intersection of all
//! barrier half-planes and the control box. Both programs are built from
//! scratch on every call.

use super::config::ControllerConfig;
use super::constraints::{cbf_constraints, clf_constraint, ControlConstraint};
use super::error::{ControlError, InfeasibilityCause, Stage};
use super::integrator::integrate;
use crate::common::types::{Obstacle, Point2D, Velocity2D};
use crate::solver::{
    ActiveSetSolver, QpError, QpSolution, QpSolver, QuadraticObjective, QuadraticProgram, Variable,
};
use nalgebra::{DMatrix, DVector};
use tracing::{debug, warn};

/// Barrier values below this count as already inside the clearance
const CLEARANCE_TOLERANCE: f64 = 1e-9;

/// Lifecycle of a controller instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// No goal has been set yet
    Uninitialized,
    /// A goal is set and ticks can be computed
    Ready,
}

/// Result of one successful tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlOutput {
    /// Filtered, obstacle-safe control
    pub velocity: Velocity2D,
    pub next_position: Point2D,
    /// Goal-seeking control before safety filtering
    pub reference_velocity: Velocity2D,
}

/// Programs built during the most recent tick
#[derive(Debug, Clone, PartialEq)]
pub struct SolvedPrograms {
    pub reference: QuadraticProgram,
    /// Absent when the reference stage failed
    pub safety_filter: Option<QuadraticProgram>,
}

/// Goal-seeking controller with a barrier-function safety filter
#[derive(Debug)]
pub struct ClfCbfController {
    config: ControllerConfig,
    goal: Option<Point2D>,
    solver: Box<dyn QpSolver>,
    last_programs: Option<SolvedPrograms>,
}

impl ClfCbfController {
    /// Create a controller backed by the active-set solver
    pub fn new(config: ControllerConfig) -> Result<Self, ControlError> {
        Self::with_solver(config, ActiveSetSolver::new())
    }

    /// Create a controller with a specific solver backend
    pub fn with_solver<S: QpSolver + 'static>(config: ControllerConfig, solver: S) -> Result<Self, ControlError> {
        config.validate()?;
        debug!(solver = solver.name(), ?config, "created CLF-CBF controller");
        Ok(ClfCbfController {
            config,
            goal: None,
            solver: Box::new(solver),
            last_programs: None,
        })
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Get the name of the solver backend
    pub fn solver_name(&self) -> &str {
        self.solver.name()
    }

    /// Set or replace the goal
    pub fn set_goal(&mut self, goal: Point2D) {
        debug!(x = goal.x, y = goal.y, "goal set");
        self.goal = Some(goal);
    }

    pub fn goal(&self) -> Option<Point2D> {
        self.goal
    }

    pub fn state(&self) -> ControllerState {
        match self.goal {
            Some(_) => ControllerState::Ready,
            None => ControllerState::Uninitialized,
        }
    }

    /// Programs of the last tick, for offline inspection
    pub fn last_programs(&self) -> Option<&SolvedPrograms> {
        self.last_programs.as_ref()
    }

    /// Compute the safe control for one tick
    pub fn generate_control(
        &mut self,
        position: Point2D,
        obstacles: &[Obstacle],
    ) -> Result<ControlOutput, ControlError> {
        let goal = self.goal.ok_or(ControlError::GoalNotSet)?;
        check_inputs(&position, &goal, obstacles)?;
        self.last_programs = None;

        // Stage 1: minimum-effort control that decreases V
        let clf = clf_constraint(&position, &goal, &self.config);
        let reference_program = self.reference_program(&clf);
        let reference_result = self.solver.solve(&reference_program);
        self.last_programs = Some(SolvedPrograms {
            reference: reference_program,
            safety_filter: None,
        });

        let reference_velocity = match reference_result {
            Ok(solution) => control_from(&solution, Stage::Reference)?,
            Err(QpError::Infeasible) => {
                warn!(x = position.x, y = position.y, lyapunov = clf.value, "CLF constraint infeasible within bounds");
                return Err(ControlError::ClfInfeasible { position, goal });
            }
            Err(source) => {
                return Err(ControlError::Solver {
                    stage: Stage::Reference,
                    source,
                })
            }
        };
        debug!(u1 = reference_velocity.x, u2 = reference_velocity.y, "reference control");

        // Stage 2: closest control to the reference that keeps every h_i non-negative
        let barriers = cbf_constraints(&position, obstacles, &self.config);
        let filter_program = self.safety_filter_program(&reference_velocity, &barriers);

        if let Some(violated) = barriers.iter().position(|c| c.value < -CLEARANCE_TOLERANCE) {
            let barrier = barriers[violated].value;
            self.store_safety_filter(filter_program);
            warn!(obstacle = violated, barrier, "agent already inside obstacle clearance");
            return Err(ControlError::CbfInfeasible {
                position,
                reference_velocity,
                cause: InfeasibilityCause::ClearanceViolated {
                    obstacle: violated,
                    barrier,
                },
            });
        }

        let filter_result = self.solver.solve(&filter_program);
        self.store_safety_filter(filter_program);

        let velocity = match filter_result {
            Ok(solution) => control_from(&solution, Stage::SafetyFilter)?,
            Err(QpError::Infeasible) => {
                warn!(
                    x = position.x,
                    y = position.y,
                    obstacles = obstacles.len(),
                    "barrier constraints infeasible within bounds"
                );
                return Err(ControlError::CbfInfeasible {
                    position,
                    reference_velocity,
                    cause: InfeasibilityCause::EmptyFeasibleSet {
                        obstacles: obstacles.len(),
                    },
                });
            }
            Err(source) => {
                return Err(ControlError::Solver {
                    stage: Stage::SafetyFilter,
                    source,
                })
            }
        };

        let next_position = integrate(&position, &velocity, self.config.time_step);
        debug!(
            u1 = velocity.x,
            u2 = velocity.y,
            x = next_position.x,
            y = next_position.y,
            "filtered control"
        );

        Ok(ControlOutput {
            velocity,
            next_position,
            reference_velocity,
        })
    }

    fn store_safety_filter(&mut self, program: QuadraticProgram) {
        if let Some(programs) = self.last_programs.as_mut() {
            programs.safety_filter = Some(program);
        }
    }

    fn variables(&self) -> Vec<Variable> {
        let bounds = &self.config.bounds;
        (0..2)
            .map(|axis| Variable {
                name: format!("u{}", axis + 1),
                lower: bounds.lower[axis],
                upper: bounds.upper[axis],
            })
            .collect()
    }

    /// `min u1² + u2²` subject to the CLF constraint
    fn reference_program(&self, clf: &ControlConstraint) -> QuadraticProgram {
        QuadraticProgram {
            name: "reference_control".to_string(),
            objective: QuadraticObjective {
                hessian: DMatrix::identity(2, 2) * 2.0,
                linear: DVector::zeros(2),
                constant: 0.0,
            },
            variables: self.variables(),
            constraints: vec![clf.to_linear()],
        }
    }

    /// `min ||u - u_ref||²` subject to every CBF constraint
    fn safety_filter_program(&self, reference: &Velocity2D, barriers: &[ControlConstraint]) -> QuadraticProgram {
        QuadraticProgram {
            name: "safety_filter".to_string(),
            objective: QuadraticObjective {
                hessian: DMatrix::identity(2, 2) * 2.0,
                linear: DVector::from_vec(vec![-2.0 * reference.x, -2.0 * reference.y]),
                constant: reference.norm_squared(),
            },
            variables: self.variables(),
            constraints: barriers.iter().map(ControlConstraint::to_linear).collect(),
        }
    }
}

fn control_from(solution: &QpSolution, stage: Stage) -> Result<Velocity2D, ControlError> {
    if solution.values.len() != 2 {
        return Err(ControlError::Solver {
            stage,
            source: QpError::InvalidProblem(format!(
                "solver returned {} values for 2 variables",
                solution.values.len()
            )),
        });
    }
    Ok(Velocity2D::new(solution.values[0], solution.values[1]))
}

fn check_inputs(position: &Point2D, goal: &Point2D, obstacles: &[Obstacle]) -> Result<(), ControlError> {
    if !position.iter().all(|v| v.is_finite()) {
        return Err(ControlError::InvalidInput(format!("position {:?} is not finite", position.as_slice())));
    }
    if !goal.iter().all(|v| v.is_finite()) {
        return Err(ControlError::InvalidInput(format!("goal {:?} is not finite", goal.as_slice())));
    }

    for (index, obstacle) in obstacles.iter().enumerate() {
        if !obstacle.position.iter().all(|v| v.is_finite()) {
            return Err(ControlError::InvalidObstacle {
                index,
                reason: "position is not finite".to_string(),
            });
        }
        if !obstacle.radius.is_finite() || obstacle.radius < 0.0 {
            return Err(ControlError::InvalidObstacle {
                index,
                reason: format!("radius must be non-negative, got {}", obstacle.radius),
            });
        }
    }

    Ok(())
}
