//! Dense active-set solver for small convex QPs
//!
//! The solver walks candidate active sets in order of increasing size. For
//! each set it solves the equality-constrained subproblem through the full
//! KKT system `[H Aᵀ; A 0]` with an LU factorization and one step of
//! iterative refinement, and accepts the first candidate that is primal
//! feasible with non-negative multipliers. For a strictly convex objective
//! that candidate is the unique optimum. Nearly parallel rows keep a
//! non-singular KKT matrix and are solved like any other set; exactly
//! dependent rows are covered by a smaller set of the same optimum.
//!
//! The number of candidates grows combinatorially with the dimension, so this
//! backend is meant for problems with a handful of variables such as a planar
//! control input.

use super::{QpError, QpSolution, QpSolver, QuadraticProgram};
use nalgebra::{DMatrix, DVector};

/// Numerical tolerances of the active-set solver
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveSetSettings {
    /// Allowed constraint violation, scaled by `1 + |b| + |a||x|`
    pub feasibility_tolerance: f64,
    /// Most negative multiplier still accepted, scaled by `1 + |Hx + f|`
    pub multiplier_tolerance: f64,
}

impl Default for ActiveSetSettings {
    fn default() -> Self {
        ActiveSetSettings {
            feasibility_tolerance: 1e-9,
            multiplier_tolerance: 1e-9,
        }
    }
}

/// Active-set QP solver
#[derive(Debug, Clone, Default)]
pub struct ActiveSetSolver {
    settings: ActiveSetSettings,
}

/// Primal point and multipliers of one equality-constrained subproblem
struct Candidate {
    x: DVector<f64>,
    multipliers: DVector<f64>,
}

impl ActiveSetSolver {
    /// Create a solver with default tolerances
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a solver with custom tolerances
    pub fn with_settings(settings: ActiveSetSettings) -> Self {
        ActiveSetSolver { settings }
    }

    pub fn settings(&self) -> &ActiveSetSettings {
        &self.settings
    }

    /// Minimize the objective with the `active` rows held as equalities
    fn solve_on_active_set(
        &self,
        hessian: &DMatrix<f64>,
        f: &DVector<f64>,
        a: &DMatrix<f64>,
        b: &DVector<f64>,
        active: &[usize],
    ) -> Option<Candidate> {
        let n = f.len();
        let k = active.len();

        let mut kkt = DMatrix::<f64>::zeros(n + k, n + k);
        kkt.view_mut((0, 0), (n, n)).copy_from(hessian);
        let mut rhs = DVector::<f64>::zeros(n + k);
        rhs.rows_mut(0, n).copy_from(&(-f));
        for (slot, &row) in active.iter().enumerate() {
            for j in 0..n {
                kkt[(n + slot, j)] = a[(row, j)];
                kkt[(j, n + slot)] = a[(row, j)];
            }
            rhs[n + slot] = b[row];
        }

        // Exactly dependent rows leave a zero pivot and no solution
        let lu = kkt.clone().lu();
        let mut z = lu.solve(&rhs)?;
        let residual = &rhs - &kkt * &z;
        if let Some(correction) = lu.solve(&residual) {
            z += correction;
        }
        if z.iter().any(|v| !v.is_finite()) {
            return None;
        }

        Some(Candidate {
            x: z.rows(0, n).into_owned(),
            multipliers: z.rows(n, k).into_owned(),
        })
    }

    fn is_feasible(&self, a: &DMatrix<f64>, b: &DVector<f64>, x: &DVector<f64>) -> bool {
        let x_norm = x.norm();
        (0..b.len()).all(|i| {
            let row = a.row(i);
            let slack = row.transpose().dot(x) - b[i];
            slack <= self.settings.feasibility_tolerance * (1.0 + b[i].abs() + row.norm() * x_norm)
        })
    }

    fn is_stationary(&self, hessian: &DMatrix<f64>, f: &DVector<f64>, candidate: &Candidate) -> bool {
        let gradient = hessian * &candidate.x + f;
        let floor = -self.settings.multiplier_tolerance * (1.0 + gradient.norm());
        candidate.multipliers.iter().all(|l| *l >= floor)
    }
}

impl QpSolver for ActiveSetSolver {
    fn name(&self) -> &str {
        "ActiveSet"
    }

    fn solve(&self, problem: &QuadraticProgram) -> Result<QpSolution, QpError> {
        problem.validate()?;

        let hessian = &problem.objective.hessian;
        let symmetric = (hessian + hessian.transpose()) * 0.5;
        if symmetric.clone().cholesky().is_none() {
            return Err(QpError::NotConvex);
        }
        let f = &problem.objective.linear;
        let (a, b) = problem.inequality_rows();

        let n = problem.dimension();
        let m = b.len();
        let mut feasible_seen = false;

        for size in 0..=n.min(m) {
            let mut active: Vec<usize> = (0..size).collect();
            loop {
                if let Some(candidate) = self.solve_on_active_set(&symmetric, f, &a, &b, &active) {
                    if self.is_feasible(&a, &b, &candidate.x) {
                        if self.is_stationary(&symmetric, f, &candidate) {
                            let objective = problem.objective.evaluate(&candidate.x);
                            return Ok(QpSolution {
                                values: candidate.x,
                                objective,
                            });
                        }
                        feasible_seen = true;
                    }
                }

                if !next_combination(&mut active, m) {
                    break;
                }
            }
        }

        // A feasible program always has a KKT point among the candidates
        if feasible_seen {
            Err(QpError::NumericalFailure(
                "no candidate active set satisfied the optimality conditions".to_string(),
            ))
        } else {
            Err(QpError::Infeasible)
        }
    }
}

/// Advance `indices` to the next lexicographic subset of `0..m`
fn next_combination(indices: &mut [usize], m: usize) -> bool {
    let k = indices.len();
    for i in (0..k).rev() {
        if indices[i] < m - k + i {
            indices[i] += 1;
            for j in i + 1..k {
                indices[j] = indices[j - 1] + 1;
            }
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::{LinearConstraint, QuadraticObjective, Sense, Variable};
    use approx::assert_relative_eq;

    /// `min ||x - target||²` over two free variables
    fn projection(target: (f64, f64), constraints: Vec<LinearConstraint>) -> QuadraticProgram {
        QuadraticProgram {
            name: "projection".to_string(),
            objective: QuadraticObjective {
                hessian: DMatrix::identity(2, 2) * 2.0,
                linear: DVector::from_vec(vec![-2.0 * target.0, -2.0 * target.1]),
                constant: target.0 * target.0 + target.1 * target.1,
            },
            variables: vec![
                Variable { name: "u1".to_string(), lower: f64::NEG_INFINITY, upper: f64::INFINITY },
                Variable { name: "u2".to_string(), lower: f64::NEG_INFINITY, upper: f64::INFINITY },
            ],
            constraints,
        }
    }

    fn constraint(name: &str, a: (f64, f64), sense: Sense, rhs: f64) -> LinearConstraint {
        LinearConstraint {
            name: name.to_string(),
            coefficients: DVector::from_vec(vec![a.0, a.1]),
            sense,
            rhs,
        }
    }

    #[test]
    fn unconstrained_minimum() {
        let solution = ActiveSetSolver::new().solve(&projection((1.0, 2.0), vec![])).unwrap();
        assert_relative_eq!(solution.values[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(solution.values[1], 2.0, epsilon = 1e-12);
        assert_relative_eq!(solution.objective, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn active_upper_bound() {
        let mut program = projection((1.0, 2.0), vec![]);
        program.variables[0].upper = 0.5;
        let solution = ActiveSetSolver::new().solve(&program).unwrap();
        assert_relative_eq!(solution.values[0], 0.5, epsilon = 1e-12);
        assert_relative_eq!(solution.values[1], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn projection_onto_half_plane() {
        let program = projection(
            (2.0, 0.0),
            vec![constraint("c0", (1.0, 1.0), Sense::LessEqual, 1.0)],
        );
        let solution = ActiveSetSolver::new().solve(&program).unwrap();
        assert_relative_eq!(solution.values[0], 1.5, epsilon = 1e-12);
        assert_relative_eq!(solution.values[1], -0.5, epsilon = 1e-12);
        assert_relative_eq!(solution.objective, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn projection_onto_corner() {
        let program = projection(
            (1.0, 1.0),
            vec![
                constraint("c0", (1.0, 0.0), Sense::LessEqual, 0.0),
                constraint("c1", (0.0, 1.0), Sense::LessEqual, 0.0),
            ],
        );
        let solution = ActiveSetSolver::new().solve(&program).unwrap();
        assert_relative_eq!(solution.values[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(solution.values[1], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn greater_equal_constraint() {
        let program = projection(
            (0.0, 0.0),
            vec![constraint("c0", (1.0, 0.0), Sense::GreaterEqual, 2.0)],
        );
        let solution = ActiveSetSolver::new().solve(&program).unwrap();
        assert_relative_eq!(solution.values[0], 2.0, epsilon = 1e-12);
        assert_relative_eq!(solution.values[1], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn duplicate_constraints_are_tolerated() {
        let program = projection(
            (3.0, 0.0),
            vec![
                constraint("c0", (1.0, 0.0), Sense::LessEqual, 1.0),
                constraint("c1", (1.0, 0.0), Sense::LessEqual, 1.0),
            ],
        );
        let solution = ActiveSetSolver::new().solve(&program).unwrap();
        assert_relative_eq!(solution.values[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(solution.values[1], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn zero_row_is_trivially_satisfied() {
        let program = projection(
            (0.0, 0.0),
            vec![constraint("c0", (0.0, 0.0), Sense::LessEqual, 0.0)],
        );
        let solution = ActiveSetSolver::new().solve(&program).unwrap();
        assert_eq!(solution.values[0], 0.0);
        assert_eq!(solution.values[1], 0.0);
    }

    #[test]
    fn contradictory_zero_row_is_infeasible() {
        let program = projection(
            (0.0, 0.0),
            vec![constraint("c0", (0.0, 0.0), Sense::LessEqual, -1.0)],
        );
        assert_eq!(ActiveSetSolver::new().solve(&program), Err(QpError::Infeasible));
    }

    #[test]
    fn constraint_outside_bounds_is_infeasible() {
        let mut program = projection(
            (0.0, 0.0),
            vec![constraint("c0", (1.0, 0.0), Sense::GreaterEqual, 2.0)],
        );
        program.variables[0].lower = -1.0;
        program.variables[0].upper = 1.0;
        assert_eq!(ActiveSetSolver::new().solve(&program), Err(QpError::Infeasible));
    }

    #[test]
    fn singular_hessian_is_not_convex() {
        let mut program = projection((0.0, 0.0), vec![]);
        program.objective.hessian = DMatrix::zeros(2, 2);
        assert_eq!(ActiveSetSolver::new().solve(&program), Err(QpError::NotConvex));
    }

    /// Thin wedge `0 <= u2 <= 1e-6 u1` whose apex is the projection of (-1, 1)
    fn thin_wedge() -> QuadraticProgram {
        projection(
            (-1.0, 1.0),
            vec![
                constraint("floor", (0.0, 1.0), Sense::GreaterEqual, 0.0),
                constraint("ceiling", (-1e-6, 1.0), Sense::LessEqual, 0.0),
            ],
        )
    }

    #[test]
    fn nearly_parallel_rows_meet_at_the_optimum() {
        let solution = ActiveSetSolver::new().solve(&thin_wedge()).unwrap();
        assert_relative_eq!(solution.values[0], 0.0, epsilon = 1e-6);
        assert_relative_eq!(solution.values[1], 0.0, epsilon = 1e-6);
        assert_relative_eq!(solution.objective, 2.0, epsilon = 1e-6);
    }

    #[test]
    fn nearly_parallel_rows_inside_a_box() {
        let mut program = thin_wedge();
        for variable in &mut program.variables {
            variable.lower = -10.0;
            variable.upper = 10.0;
        }
        let solution = ActiveSetSolver::new().solve(&program).unwrap();
        assert_relative_eq!(solution.values[0], 0.0, epsilon = 1e-6);
        assert_relative_eq!(solution.values[1], 0.0, epsilon = 1e-6);
        assert_relative_eq!(solution.objective, 2.0, epsilon = 1e-6);
    }

    #[test]
    fn custom_settings_are_kept() {
        let settings = ActiveSetSettings {
            feasibility_tolerance: 1e-7,
            multiplier_tolerance: 1e-7,
        };
        let solver = ActiveSetSolver::with_settings(settings);
        assert_eq!(solver.settings(), &settings);

        let solution = solver.solve(&thin_wedge()).unwrap();
        assert_relative_eq!(solution.objective, 2.0, epsilon = 1e-6);
    }

    #[test]
    fn solver_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ActiveSetSolver>();
    }

    #[test]
    fn combinations_are_lexicographic() {
        let mut indices = vec![0, 1];
        let mut seen = vec![indices.clone()];
        while next_combination(&mut indices, 4) {
            seen.push(indices.clone());
        }
        assert_eq!(
            seen,
            vec![
                vec![0, 1],
                vec![0, 2],
                vec![0, 3],
                vec![1, 2],
                vec![1, 3],
                vec![2, 3]
            ]
        );
    }
}
