//! CLF and CBF constraints on the control input
//!
//! Every constraint has the form `gradient · u + decay ⋚ 0`, an affine
//! half-plane in the two control variables derived from the current state
//! alone. They are rebuilt on every tick.

use super::config::ControllerConfig;
use crate::common::types::{distance_squared, Obstacle, Point2D, Velocity2D};
use crate::solver::{LinearConstraint, Sense};
use nalgebra::DVector;

/// Which certificate a constraint comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    /// `∇V · u + ε V <= 0`
    Lyapunov,
    /// `∇h_i · u + k h_i >= 0` for the obstacle at this index
    Barrier { obstacle: usize },
}

/// A CLF or CBF condition expressed on the control input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlConstraint {
    pub kind: ConstraintKind,
    pub gradient: Velocity2D,
    /// Decay term `ε V` or `k h`
    pub decay: f64,
    /// Value of `V` or `h` at the current position
    pub value: f64,
}

impl ControlConstraint {
    pub fn sense(&self) -> Sense {
        match self.kind {
            ConstraintKind::Lyapunov => Sense::LessEqual,
            ConstraintKind::Barrier { .. } => Sense::GreaterEqual,
        }
    }

    pub fn name(&self) -> String {
        match self.kind {
            ConstraintKind::Lyapunov => "relaxed_clf".to_string(),
            ConstraintKind::Barrier { obstacle } => format!("cbf_{}", obstacle),
        }
    }

    /// `gradient · u + decay`
    pub fn evaluate(&self, control: &Velocity2D) -> f64 {
        self.gradient.dot(control) + self.decay
    }

    pub fn is_satisfied_by(&self, control: &Velocity2D, tolerance: f64) -> bool {
        let residual = self.evaluate(control);
        match self.sense() {
            Sense::LessEqual => residual <= tolerance,
            Sense::GreaterEqual => residual >= -tolerance,
        }
    }

    /// Move the decay term to the right-hand side for the solver
    pub fn to_linear(&self) -> LinearConstraint {
        LinearConstraint {
            name: self.name(),
            coefficients: DVector::from_vec(vec![self.gradient.x, self.gradient.y]),
            sense: self.sense(),
            rhs: -self.decay,
        }
    }
}

/// `V(x) = ||x - g||²`
pub fn lyapunov(position: &Point2D, goal: &Point2D) -> f64 {
    distance_squared(position, goal)
}

/// `h(x) = ||x - p||² - (r + agent_radius + margin)²`
pub fn barrier(position: &Point2D, obstacle: &Obstacle, config: &ControllerConfig) -> f64 {
    distance_squared(position, &obstacle.position) - config.clearance(obstacle.radius).powi(2)
}

/// `2(x - g) · u + ε V(x) <= 0`
pub fn clf_constraint(position: &Point2D, goal: &Point2D, config: &ControllerConfig) -> ControlConstraint {
    let value = lyapunov(position, goal);
    ControlConstraint {
        kind: ConstraintKind::Lyapunov,
        gradient: 2.0 * (position - goal),
        decay: config.convergence_rate * value,
        value,
    }
}

/// `2(x - p_i) · u + k h_i(x) >= 0`, one per obstacle in input order
pub fn cbf_constraints(
    position: &Point2D,
    obstacles: &[Obstacle],
    config: &ControllerConfig,
) -> Vec<ControlConstraint> {
    obstacles
        .iter()
        .enumerate()
        .map(|(index, obstacle)| {
            let value = barrier(position, obstacle, config);
            ControlConstraint {
                kind: ConstraintKind::Barrier { obstacle: index },
                gradient: 2.0 * (position - obstacle.position),
                decay: config.barrier_gain * value,
                value,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn clf_matches_goal_offset() {
        let config = ControllerConfig::default();
        let constraint = clf_constraint(&Point2D::new(0.0, 0.0), &Point2D::new(10.0, 0.0), &config);

        assert_eq!(constraint.value, 100.0);
        assert_eq!(constraint.gradient, Velocity2D::new(-20.0, 0.0));
        assert_relative_eq!(constraint.decay, 40.0, epsilon = 1e-12);

        let linear = constraint.to_linear();
        assert_eq!(linear.name, "relaxed_clf");
        assert_eq!(linear.sense, Sense::LessEqual);
        assert_relative_eq!(linear.rhs, -40.0, epsilon = 1e-12);

        assert!(constraint.is_satisfied_by(&Velocity2D::new(2.0, 0.0), 1e-9));
        assert!(!constraint.is_satisfied_by(&Velocity2D::new(1.9, 0.0), 1e-9));
    }

    #[test]
    fn clf_vanishes_at_goal() {
        let config = ControllerConfig::default();
        let goal = Point2D::new(3.0, 4.0);
        let constraint = clf_constraint(&goal, &goal, &config);
        assert_eq!(constraint.value, 0.0);
        assert_eq!(constraint.gradient, Velocity2D::zeros());
        assert!(constraint.is_satisfied_by(&Velocity2D::zeros(), 0.0));
    }

    #[test]
    fn barrier_is_signed_clearance() {
        let config = ControllerConfig::default();
        let obstacle = Obstacle::new(3.0, 0.0, 0.5);

        assert_relative_eq!(barrier(&Point2D::new(0.0, 0.0), &obstacle, &config), 9.0 - 1.21, epsilon = 1e-12);
        assert_relative_eq!(barrier(&Point2D::new(1.9, 0.0), &obstacle, &config), 0.0, epsilon = 1e-12);
        assert!(barrier(&Point2D::new(2.5, 0.0), &obstacle, &config) < 0.0);
    }

    #[test]
    fn cbf_constraints_follow_obstacle_order() {
        let config = ControllerConfig::default();
        let obstacles = [Obstacle::new(3.0, 0.0, 0.5), Obstacle::new(0.0, -4.0, 1.0)];
        let constraints = cbf_constraints(&Point2D::new(0.0, 0.0), &obstacles, &config);

        assert_eq!(constraints.len(), 2);
        assert_eq!(constraints[0].kind, ConstraintKind::Barrier { obstacle: 0 });
        assert_eq!(constraints[1].kind, ConstraintKind::Barrier { obstacle: 1 });
        assert_eq!(constraints[0].gradient, Velocity2D::new(-6.0, 0.0));
        assert_eq!(constraints[1].gradient, Velocity2D::new(0.0, 8.0));

        let linear = constraints[1].to_linear();
        assert_eq!(linear.name, "cbf_1");
        assert_eq!(linear.sense, Sense::GreaterEqual);
        assert_relative_eq!(linear.rhs, -(16.0 - 1.6 * 1.6), epsilon = 1e-12);
    }

    #[test]
    fn zero_control_satisfies_barrier_outside_clearance() {
        let config = ControllerConfig::default();
        let obstacles = [Obstacle::new(1.5, 0.5, 0.2)];
        let constraints = cbf_constraints(&Point2D::new(0.0, 0.0), &obstacles, &config);
        assert!(constraints[0].value > 0.0);
        assert!(constraints[0].is_satisfied_by(&Velocity2D::zeros(), 0.0));
    }
}
