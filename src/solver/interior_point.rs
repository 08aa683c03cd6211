//! Interior-point backend built on Clarabel
//!
//! Constraints and finite variable bounds are passed as one nonnegative cone
//! `A x + s = b, s >= 0`. The result is accurate to the interior-point
//! tolerances rather than exact, so this backend suits larger programs and
//! cross-checks of the active-set solver.

use super::{QpError, QpSolution, QpSolver, QuadraticProgram};
use clarabel::algebra::CscMatrix;
use clarabel::solver::{
    DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus, SupportedConeT::NonnegativeConeT,
};
use nalgebra::{DMatrix, DVector};

/// Iteration limit and convergence tolerance of the interior-point solve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClarabelSettings {
    pub max_iter: u32,
    /// Used for the absolute and relative gap and for feasibility
    pub tolerance: f64,
}

impl Default for ClarabelSettings {
    fn default() -> Self {
        ClarabelSettings {
            max_iter: 200,
            tolerance: 1e-9,
        }
    }
}

/// Clarabel QP solver
#[derive(Debug, Clone, Default)]
pub struct ClarabelSolver {
    settings: ClarabelSettings,
}

impl ClarabelSolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: ClarabelSettings) -> Self {
        ClarabelSolver { settings }
    }
}

impl QpSolver for ClarabelSolver {
    fn name(&self) -> &str {
        "Clarabel"
    }

    fn solve(&self, problem: &QuadraticProgram) -> Result<QpSolution, QpError> {
        problem.validate()?;

        let hessian = &problem.objective.hessian;
        let symmetric = (hessian + hessian.transpose()) * 0.5;
        let cholesky = symmetric.clone().cholesky().ok_or(QpError::NotConvex)?;
        let (a, b) = problem.inequality_rows();

        // All-zero rows have no interior; they either hold trivially or never
        let mut kept = Vec::with_capacity(b.len());
        for i in 0..b.len() {
            if a.row(i).iter().any(|v| *v != 0.0) {
                kept.push(i);
            } else if b[i] < 0.0 {
                return Err(QpError::Infeasible);
            }
        }
        let a = a.select_rows(kept.iter());
        let b = b.select_rows(kept.iter());

        // Nothing to constrain, the unconstrained minimizer is the answer
        if b.is_empty() {
            let values = -cholesky.solve(&problem.objective.linear);
            let objective = problem.objective.evaluate(&values);
            return Ok(QpSolution { values, objective });
        }

        let p_csc = dmatrix_to_csc_upper_tri(&symmetric);
        let a_csc = dmatrix_to_csc(&a);
        let q: Vec<f64> = problem.objective.linear.iter().copied().collect();
        let b: Vec<f64> = b.iter().copied().collect();
        let cones = vec![NonnegativeConeT(b.len())];

        let settings = DefaultSettingsBuilder::default()
            .max_iter(self.settings.max_iter)
            .verbose(false)
            .tol_gap_abs(self.settings.tolerance)
            .tol_gap_rel(self.settings.tolerance)
            .tol_feas(self.settings.tolerance)
            .build()
            .map_err(|e| QpError::InvalidProblem(format!("solver settings: {}", e)))?;

        let mut solver = DefaultSolver::new(&p_csc, &q, &a_csc, &b, &cones, settings)
            .map_err(|e| QpError::InvalidProblem(format!("{:?}", e)))?;
        solver.solve();

        let solution = &solver.solution;
        match solution.status {
            SolverStatus::Solved | SolverStatus::AlmostSolved => {
                let values = DVector::from_column_slice(&solution.x);
                let objective = problem.objective.evaluate(&values);
                Ok(QpSolution { values, objective })
            }
            SolverStatus::PrimalInfeasible | SolverStatus::AlmostPrimalInfeasible => Err(QpError::Infeasible),
            SolverStatus::DualInfeasible | SolverStatus::AlmostDualInfeasible => Err(QpError::Unbounded),
            status => Err(QpError::NumericalFailure(format!("solver stopped with {:?}", status))),
        }
    }
}

/// Convert a nalgebra `DMatrix<f64>` to a Clarabel `CscMatrix<f64>`
fn dmatrix_to_csc(m: &DMatrix<f64>) -> CscMatrix<f64> {
    let (nrows, ncols) = m.shape();
    let mut colptr = vec![0usize; ncols + 1];
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();

    for j in 0..ncols {
        for i in 0..nrows {
            let v = m[(i, j)];
            if v != 0.0 {
                rowval.push(i);
                nzval.push(v);
            }
        }
        colptr[j + 1] = rowval.len();
    }

    CscMatrix::new(nrows, ncols, colptr, rowval, nzval)
}

/// Upper triangle of a symmetric matrix in CSC form
fn dmatrix_to_csc_upper_tri(m: &DMatrix<f64>) -> CscMatrix<f64> {
    let (nrows, ncols) = m.shape();
    let mut colptr = vec![0usize; ncols + 1];
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();

    for j in 0..ncols {
        for i in 0..=j.min(nrows - 1) {
            let v = m[(i, j)];
            if v != 0.0 {
                rowval.push(i);
                nzval.push(v);
            }
        }
        colptr[j + 1] = rowval.len();
    }

    CscMatrix::new(nrows, ncols, colptr, rowval, nzval)
}
