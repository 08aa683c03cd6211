//! CPLEX LP text rendering of a `QuadraticProgram`
//!
//! The output is meant for offline inspection of a solved tick and can be
//! loaded by any solver that reads the LP format.

use super::{QuadraticProgram, Sense};
use std::fmt;

/// Display adapter that renders a program in LP format
pub struct LpFormat<'a>(pub &'a QuadraticProgram);

/// Render a program as LP text
pub fn to_lp_string(problem: &QuadraticProgram) -> String {
    LpFormat(problem).to_string()
}

impl fmt::Display for LpFormat<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let problem = self.0;
        let names: Vec<&str> = problem.variables.iter().map(|v| v.name.as_str()).collect();

        writeln!(f, "\\ Problem: {}", problem.name)?;
        writeln!(f, "Minimize")?;

        let objective = &problem.objective;
        let linear: Vec<(f64, String)> = objective
            .linear
            .iter()
            .zip(&names)
            .filter(|(c, _)| **c != 0.0)
            .map(|(c, name)| (*c, name.to_string()))
            .collect();

        let mut quadratic = Vec::new();
        for i in 0..names.len() {
            let diagonal = objective.hessian[(i, i)];
            if diagonal != 0.0 {
                quadratic.push((diagonal, format!("{} ^ 2", names[i])));
            }
            for j in i + 1..names.len() {
                let cross = objective.hessian[(i, j)] + objective.hessian[(j, i)];
                if cross != 0.0 {
                    quadratic.push((cross, format!("{} * {}", names[i], names[j])));
                }
            }
        }

        write!(f, " obj:")?;
        if linear.is_empty() && quadratic.is_empty() && objective.constant == 0.0 {
            write!(f, " 0")?;
        }
        if !linear.is_empty() {
            write!(f, " {}", signed_terms(&linear))?;
        }
        if !quadratic.is_empty() {
            let lead = if linear.is_empty() { "" } else { " +" };
            write!(f, "{} [ {} ] / 2", lead, signed_terms(&quadratic))?;
        }
        if objective.constant != 0.0 {
            write!(f, " {}", signed_constant(objective.constant, linear.is_empty() && quadratic.is_empty()))?;
        }
        writeln!(f)?;

        writeln!(f, "Subject To")?;
        for constraint in &problem.constraints {
            let mut terms: Vec<(f64, String)> = constraint
                .coefficients
                .iter()
                .zip(&names)
                .filter(|(c, _)| **c != 0.0)
                .map(|(c, name)| (*c, name.to_string()))
                .collect();
            if terms.is_empty() {
                terms.push((0.0, names[0].to_string()));
            }
            let relation = match constraint.sense {
                Sense::LessEqual => "<=",
                Sense::GreaterEqual => ">=",
            };
            writeln!(
                f,
                " {}: {} {} {}",
                constraint.name,
                signed_terms(&terms),
                relation,
                constraint.rhs
            )?;
        }

        writeln!(f, "Bounds")?;
        for variable in &problem.variables {
            match (variable.lower.is_finite(), variable.upper.is_finite()) {
                (false, false) => writeln!(f, " {} free", variable.name)?,
                (true, false) => writeln!(f, " {} >= {}", variable.name, variable.lower)?,
                (false, true) => writeln!(f, " -inf <= {} <= {}", variable.name, variable.upper)?,
                (true, true) => writeln!(
                    f,
                    " {} <= {} <= {}",
                    variable.lower, variable.name, variable.upper
                )?,
            }
        }

        writeln!(f, "End")
    }
}

/// Join `(coefficient, name)` pairs as `2 u1 - 3 u2 + u3`-style text
fn signed_terms(terms: &[(f64, String)]) -> String {
    let mut out = String::new();
    for (i, (coefficient, name)) in terms.iter().enumerate() {
        let negative = coefficient.is_sign_negative() && *coefficient != 0.0;
        let magnitude = coefficient.abs();
        match (i, negative) {
            (0, false) => out.push_str(&format!("{} {}", magnitude, name)),
            (0, true) => out.push_str(&format!("- {} {}", magnitude, name)),
            (_, false) => out.push_str(&format!(" + {} {}", magnitude, name)),
            (_, true) => out.push_str(&format!(" - {} {}", magnitude, name)),
        }
    }
    out
}

fn signed_constant(value: f64, leading: bool) -> String {
    match (leading, value < 0.0) {
        (true, false) => format!("{}", value),
        (true, true) => format!("- {}", value.abs()),
        (false, false) => format!("+ {}", value),
        (false, true) => format!("- {}", value.abs()),
    }
}
