//! Quadratic program description and solver backends
//!
//! A `QuadraticProgram` is a complete, self-contained description of one
//! solve: objective, variable bounds and linear constraints. Solvers are
//! stateless and receive a fresh program on every call, so nothing from a
//! previous solve can leak into the next one.

pub mod active_set;
pub mod interior_point;
pub mod lp_format;

use nalgebra::{DMatrix, DVector};
use std::fmt::Debug;
use thiserror::Error;

pub use self::active_set::ActiveSetSolver;
pub use self::interior_point::ClarabelSolver;

/// Objective `½ xᵀHx + fᵀx + c`
#[derive(Debug, Clone, PartialEq)]
pub struct QuadraticObjective {
    pub hessian: DMatrix<f64>,
    pub linear: DVector<f64>,
    pub constant: f64,
}

impl QuadraticObjective {
    /// Evaluate the objective at `x`
    pub fn evaluate(&self, x: &DVector<f64>) -> f64 {
        0.5 * x.dot(&(&self.hessian * x)) + self.linear.dot(x) + self.constant
    }
}

/// Direction of a linear inequality
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    LessEqual,
    GreaterEqual,
}

/// `coefficients · x (<= | >=) rhs`
#[derive(Debug, Clone, PartialEq)]
pub struct LinearConstraint {
    pub name: String,
    pub coefficients: DVector<f64>,
    pub sense: Sense,
    pub rhs: f64,
}

impl LinearConstraint {
    /// Rewrite as `a · x <= b`
    pub fn as_less_equal(&self) -> (DVector<f64>, f64) {
        match self.sense {
            Sense::LessEqual => (self.coefficients.clone(), self.rhs),
            Sense::GreaterEqual => (-&self.coefficients, -self.rhs),
        }
    }
}

/// A named decision variable with box bounds (infinite values allowed)
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub lower: f64,
    pub upper: f64,
}

/// A convex quadratic program
#[derive(Debug, Clone, PartialEq)]
pub struct QuadraticProgram {
    pub name: String,
    pub objective: QuadraticObjective,
    pub variables: Vec<Variable>,
    pub constraints: Vec<LinearConstraint>,
}

impl QuadraticProgram {
    /// Number of decision variables
    pub fn dimension(&self) -> usize {
        self.variables.len()
    }

    /// Check dimensions and finiteness of every coefficient
    pub fn validate(&self) -> Result<(), QpError> {
        let n = self.dimension();
        if n == 0 {
            return Err(QpError::InvalidProblem("program has no variables".to_string()));
        }

        let hessian = &self.objective.hessian;
        if hessian.nrows() != n || hessian.ncols() != n {
            return Err(QpError::InvalidProblem(format!(
                "hessian is {}x{}, expected {}x{}",
                hessian.nrows(),
                hessian.ncols(),
                n,
                n
            )));
        }
        if self.objective.linear.len() != n {
            return Err(QpError::InvalidProblem(format!(
                "linear term has length {}, expected {}",
                self.objective.linear.len(),
                n
            )));
        }
        if hessian.iter().chain(self.objective.linear.iter()).any(|v| !v.is_finite())
            || !self.objective.constant.is_finite()
        {
            return Err(QpError::InvalidProblem("objective has non-finite coefficients".to_string()));
        }

        for variable in &self.variables {
            if variable.lower.is_nan() || variable.upper.is_nan() || variable.lower > variable.upper {
                return Err(QpError::InvalidProblem(format!(
                    "variable {} has invalid bounds [{}, {}]",
                    variable.name, variable.lower, variable.upper
                )));
            }
        }

        for constraint in &self.constraints {
            if constraint.coefficients.len() != n {
                return Err(QpError::InvalidProblem(format!(
                    "constraint {} has {} coefficients, expected {}",
                    constraint.name,
                    constraint.coefficients.len(),
                    n
                )));
            }
            if constraint.coefficients.iter().any(|v| !v.is_finite()) || !constraint.rhs.is_finite() {
                return Err(QpError::InvalidProblem(format!(
                    "constraint {} has non-finite coefficients",
                    constraint.name
                )));
            }
        }

        Ok(())
    }

    /// Stack constraints and finite variable bounds into `A x <= b`
    pub fn inequality_rows(&self) -> (DMatrix<f64>, DVector<f64>) {
        let n = self.dimension();
        let mut rows: Vec<(DVector<f64>, f64)> = self
            .constraints
            .iter()
            .map(|constraint| constraint.as_less_equal())
            .collect();

        for (j, variable) in self.variables.iter().enumerate() {
            let mut unit = DVector::zeros(n);
            unit[j] = 1.0;
            if variable.upper.is_finite() {
                rows.push((unit.clone(), variable.upper));
            }
            if variable.lower.is_finite() {
                rows.push((-unit, -variable.lower));
            }
        }

        let a = DMatrix::from_fn(rows.len(), n, |i, j| rows[i].0[j]);
        let b = DVector::from_iterator(rows.len(), rows.iter().map(|(_, rhs)| *rhs));
        (a, b)
    }
}

/// Primal optimum of a solved program
#[derive(Debug, Clone, PartialEq)]
pub struct QpSolution {
    pub values: DVector<f64>,
    pub objective: f64,
}

/// Reasons a solve can fail
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QpError {
    #[error("problem is infeasible")]
    Infeasible,
    #[error("problem is unbounded")]
    Unbounded,
    #[error("objective is not strictly convex")]
    NotConvex,
    #[error("invalid problem: {0}")]
    InvalidProblem(String),
    #[error("numerical failure: {0}")]
    NumericalFailure(String),
}

/// A convex QP solver backend
pub trait QpSolver: Debug + Send + Sync {
    /// Get the name of this solver
    fn name(&self) -> &str;

    /// Solve the program, returning the primal optimum
    fn solve(&self, problem: &QuadraticProgram) -> Result<QpSolution, QpError>;
}
