use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::constraints::{ConstrainedProblem, ConstraintKind};
use super::objective::Objective;
use super::qp::{QpFailure, QuadraticProgram};
use crate::error::RiskKitError;
use crate::portfolio::metrics::equal_weights;
use crate::RiskKitResult;

/// Sufficient-decrease constant for the Armijo line search.
const ARMIJO: f64 = 1e-4;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Iteration and tolerance policy. Fixed values make runs reproducible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Outer SQP iterations before giving up.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Objective change / predicted decrease treated as converged.
    #[serde(default = "default_ftol")]
    pub ftol: f64,
    /// Step size (max abs weight change) treated as converged.
    #[serde(default = "default_xtol")]
    pub xtol: f64,
    /// Largest constraint or bound violation accepted in the answer.
    #[serde(default = "default_constraint_tol")]
    pub constraint_tol: f64,
    /// Halvings tried before the line search gives up.
    #[serde(default = "default_max_line_search_steps")]
    pub max_line_search_steps: u32,
}

fn default_max_iterations() -> u32 {
    200
}

fn default_ftol() -> f64 {
    1e-10
}

fn default_xtol() -> f64 {
    1e-9
}

fn default_constraint_tol() -> f64 {
    1e-8
}

fn default_max_line_search_steps() -> u32 {
    40
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            max_iterations: default_max_iterations(),
            ftol: default_ftol(),
            xtol: default_xtol(),
            constraint_tol: default_constraint_tol(),
            max_line_search_steps: default_max_line_search_steps(),
        }
    }
}

/// Converged solution of a constrained minimisation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub weights: Vec<f64>,
    /// Objective value at `weights`.
    pub objective: f64,
    /// Outer SQP iterations used.
    pub iterations: u32,
    /// Largest constraint or bound violation at `weights`.
    pub constraint_violation: f64,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Minimise `objective` subject to the linear constraints and bounds in
/// `problem` by sequential quadratic programming.
///
/// The initial guess is first projected onto the feasible polytope; every
/// later iterate stays feasible because all constraints are linear. Each
/// step solves a QP with a damped-BFGS Hessian model and is shortened by a
/// backtracking line search, which also rejects points where the objective
/// is undefined.
///
/// Fails with [`RiskKitError::OptimizationFailure`] when the constraints are
/// infeasible, the line search cannot make progress, or `max_iterations` is
/// reached.
pub fn minimize(
    objective: &dyn Objective,
    problem: &ConstrainedProblem,
    config: &SolverConfig,
) -> RiskKitResult<OptimizationResult> {
    let n = objective.dimension();
    problem.validate(n)?;
    validate_config(config)?;

    let solver = format!("sqp/{}", objective.name());
    let failure = |iterations: u32, message: String| RiskKitError::OptimizationFailure {
        solver: solver.clone(),
        iterations,
        message,
    };

    let start = problem
        .initial_guess
        .clone()
        .unwrap_or_else(|| equal_weights(n));
    let mut x = project_feasible(&start, problem).map_err(|e| failure(0, e.to_string()))?;

    let (mut f, grad) = objective.evaluate(x.as_slice())?;
    let mut g = DVector::from_vec(grad);
    let mut hessian = DMatrix::<f64>::identity(n, n);

    for iteration in 1..=config.max_iterations {
        let step_qp = linearized_qp(&hessian, &g, &x, problem);
        let d = step_qp
            .solve()
            .map_err(|e| failure(iteration, format!("QP subproblem: {}", e)))?
            .x;

        let predicted = g.dot(&d);
        let step_norm = d.amax();
        debug!(
            solver = %solver,
            iteration,
            objective = f,
            step = step_norm,
            predicted,
            "sqp iteration"
        );

        if step_norm <= config.xtol || predicted.abs() <= config.ftol {
            return finish(x, f, iteration, problem, config, &solver);
        }

        let Some((alpha, x_new, f_new, g_new)) =
            line_search(objective, &x, &d, f, predicted, config)
        else {
            return Err(failure(
                iteration,
                format!(
                    "line search could not reduce the objective (step {:.3e}, predicted decrease {:.3e})",
                    step_norm, predicted
                ),
            ));
        };

        let s = &x_new - &x;
        let y = &g_new - &g;
        damped_bfgs_update(&mut hessian, &s, &y);

        let improvement = (f - f_new).abs();
        x = x_new;
        f = f_new;
        g = g_new;

        if improvement <= config.ftol && alpha * step_norm <= config.xtol {
            return finish(x, f, iteration, problem, config, &solver);
        }
    }

    Err(failure(
        config.max_iterations,
        "iteration limit reached before convergence".into(),
    ))
}

// ---------------------------------------------------------------------------
// SQP internals
// ---------------------------------------------------------------------------

fn validate_config(config: &SolverConfig) -> RiskKitResult<()> {
    if config.max_iterations == 0 {
        return Err(RiskKitError::invalid(
            "max_iterations",
            "must be at least 1",
        ));
    }
    for (field, value) in [
        ("ftol", config.ftol),
        ("xtol", config.xtol),
        ("constraint_tol", config.constraint_tol),
    ] {
        if !(value.is_finite() && value > 0.0) {
            return Err(RiskKitError::invalid(field, "must be positive and finite"));
        }
    }
    Ok(())
}

/// Euclidean projection of `start` onto the feasible polytope.
fn project_feasible(start: &[f64], problem: &ConstrainedProblem) -> Result<DVector<f64>, QpFailure> {
    let n = start.len();
    let origin = DVector::<f64>::zeros(n);
    let target = DVector::from_column_slice(start);
    let qp = linearized_qp(&DMatrix::identity(n, n), &(-target), &origin, problem);
    Ok(qp.solve()?.x)
}

/// QP in the step d from `x`: min ½dᵀHd + gᵀd with every constraint and
/// bound written for the point x + d.
fn linearized_qp(
    hessian: &DMatrix<f64>,
    gradient: &DVector<f64>,
    x: &DVector<f64>,
    problem: &ConstrainedProblem,
) -> QuadraticProgram {
    let n = x.len();
    let mut equalities = Vec::new();
    let mut inequalities = Vec::new();

    for c in &problem.constraints {
        let a = DVector::from_column_slice(&c.coefficients);
        let remaining = c.rhs - a.dot(x);
        match c.kind {
            ConstraintKind::Equality => equalities.push((a, remaining)),
            // a·d <= remaining  <=>  -a·d >= -remaining
            ConstraintKind::Inequality => inequalities.push((-a, -remaining)),
        }
    }

    for (j, bound) in problem.bounds.iter().enumerate() {
        if bound.lower.is_finite() {
            let mut e = DVector::zeros(n);
            e[j] = 1.0;
            inequalities.push((e, bound.lower - x[j]));
        }
        if bound.upper.is_finite() {
            let mut e = DVector::zeros(n);
            e[j] = -1.0;
            inequalities.push((e, x[j] - bound.upper));
        }
    }

    QuadraticProgram {
        hessian: hessian.clone(),
        linear: gradient.clone(),
        equalities,
        inequalities,
    }
}

type Accepted = (f64, DVector<f64>, f64, DVector<f64>);

/// Backtracking Armijo search along `d`. Points where the objective is
/// undefined are skipped over like points with too little decrease.
fn line_search(
    objective: &dyn Objective,
    x: &DVector<f64>,
    d: &DVector<f64>,
    f: f64,
    predicted: f64,
    config: &SolverConfig,
) -> Option<Accepted> {
    let mut alpha = 1.0;
    for _ in 0..config.max_line_search_steps {
        let candidate = x + d * alpha;
        match objective.evaluate(candidate.as_slice()) {
            Ok((value, grad)) if value.is_finite() && value <= f + ARMIJO * alpha * predicted => {
                return Some((alpha, candidate, value, DVector::from_vec(grad)));
            }
            Ok(_) => {}
            Err(e) => debug!(alpha, reason = %e, "rejected line-search candidate"),
        }
        alpha *= 0.5;
    }
    None
}

/// Powell-damped BFGS update; keeps the model positive definite.
fn damped_bfgs_update(hessian: &mut DMatrix<f64>, s: &DVector<f64>, y: &DVector<f64>) {
    let bs = &*hessian * s;
    let sbs = s.dot(&bs);
    if sbs <= f64::MIN_POSITIVE {
        return;
    }
    let sy = s.dot(y);
    let y = if sy < 0.2 * sbs {
        let theta = 0.8 * sbs / (sbs - sy);
        y * theta + &bs * (1.0 - theta)
    } else {
        y.clone()
    };
    let sy = s.dot(&y);
    if sy <= f64::MIN_POSITIVE {
        return;
    }
    *hessian += &y * y.transpose() / sy - &bs * bs.transpose() / sbs;
}

fn finish(
    x: DVector<f64>,
    objective: f64,
    iterations: u32,
    problem: &ConstrainedProblem,
    config: &SolverConfig,
    solver: &str,
) -> RiskKitResult<OptimizationResult> {
    let weights: Vec<f64> = x
        .iter()
        .zip(problem.bounds.iter())
        .map(|(w, b)| w.clamp(b.lower, b.upper))
        .collect();
    let constraint_violation = problem.max_violation(&weights);
    if constraint_violation > config.constraint_tol {
        return Err(RiskKitError::OptimizationFailure {
            solver: solver.to_string(),
            iterations,
            message: format!(
                "constraint violation {:.3e} exceeds tolerance {:.3e}",
                constraint_violation, config.constraint_tol
            ),
        });
    }
    debug!(solver, iterations, objective, constraint_violation, "sqp converged");
    Ok(OptimizationResult {
        weights,
        objective,
        iterations,
        constraint_violation,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::constraints::{Bound, LinearConstraint};
    use crate::optimizer::objective::PortfolioVolatility;
    use approx::assert_abs_diff_eq;

    /// ½|w - p|² as an objective, for checking against closed forms.
    struct Distance {
        p: Vec<f64>,
    }

    impl Objective for Distance {
        fn name(&self) -> &'static str {
            "distance"
        }

        fn dimension(&self) -> usize {
            self.p.len()
        }

        fn evaluate(&self, w: &[f64]) -> RiskKitResult<(f64, Vec<f64>)> {
            let diff: Vec<f64> = w.iter().zip(self.p.iter()).map(|(a, b)| a - b).collect();
            let value = 0.5 * diff.iter().map(|d| d * d).sum::<f64>();
            Ok((value, diff))
        }
    }

    // ------------------------------------------------------------------
    // 1. Quadratic objective converges to the simplex projection
    // ------------------------------------------------------------------
    #[test]
    fn test_distance_to_simplex() {
        let obj = Distance {
            p: vec![0.9, 0.6, -0.4],
        };
        let problem = ConstrainedProblem::long_only(3);
        let res = minimize(&obj, &problem, &SolverConfig::default()).unwrap();
        assert_abs_diff_eq!(res.weights[0], 0.65, epsilon = 1e-8);
        assert_abs_diff_eq!(res.weights[1], 0.35, epsilon = 1e-8);
        assert_abs_diff_eq!(res.weights[2], 0.0, epsilon = 1e-8);
        assert!(res.constraint_violation <= 1e-8);
    }

    // ------------------------------------------------------------------
    // 2. Two-asset minimum volatility matches the closed form
    // ------------------------------------------------------------------
    #[test]
    fn test_two_asset_min_vol_closed_form() {
        // w1* = (s2² - c) / (s1² + s2² - 2c)
        let (s1, s2, rho) = (0.10_f64, 0.20_f64, 0.3_f64);
        let c = rho * s1 * s2;
        let cov = vec![vec![s1 * s1, c], vec![c, s2 * s2]];
        let expected = (s2 * s2 - c) / (s1 * s1 + s2 * s2 - 2.0 * c);

        let obj = PortfolioVolatility::new(&cov);
        let res = minimize(&obj, &ConstrainedProblem::long_only(2), &SolverConfig::default())
            .unwrap();
        assert_abs_diff_eq!(res.weights[0], expected, epsilon = 1e-4);
        assert_abs_diff_eq!(res.weights[0] + res.weights[1], 1.0, epsilon = 1e-10);
    }

    // ------------------------------------------------------------------
    // 3. General inequality descriptors are honoured
    // ------------------------------------------------------------------
    #[test]
    fn test_inequality_constraint_binds() {
        let obj = Distance {
            p: vec![0.8, 0.1, 0.1],
        };
        let problem = ConstrainedProblem::long_only(3).with_constraint(
            LinearConstraint::inequality("first_asset_cap", vec![1.0, 0.0, 0.0], 0.5),
        );
        let res = minimize(&obj, &problem, &SolverConfig::default()).unwrap();
        assert_abs_diff_eq!(res.weights[0], 0.5, epsilon = 1e-8);
        assert_abs_diff_eq!(res.weights[1], 0.25, epsilon = 1e-8);
        assert_abs_diff_eq!(res.weights[2], 0.25, epsilon = 1e-8);
    }

    // ------------------------------------------------------------------
    // 4. Infeasible constraint set fails before iterating
    // ------------------------------------------------------------------
    #[test]
    fn test_infeasible_problem() {
        let obj = Distance { p: vec![0.5, 0.5] };
        let problem = ConstrainedProblem::long_only(2)
            .with_constraint(LinearConstraint::target_return(&[0.05, 0.10], 0.2));
        match minimize(&obj, &problem, &SolverConfig::default()).unwrap_err() {
            RiskKitError::OptimizationFailure {
                iterations, message, ..
            } => {
                assert_eq!(iterations, 0);
                assert!(message.contains("infeasible"), "message: {}", message);
            }
            other => panic!("expected optimization failure, got {:?}", other),
        }
    }

    // ------------------------------------------------------------------
    // 5. Iteration cap is reported as a failure
    // ------------------------------------------------------------------
    #[test]
    fn test_iteration_cap() {
        let cov = vec![
            vec![0.0225, 0.009, 0.00375],
            vec![0.009, 0.04, 0.025],
            vec![0.00375, 0.025, 0.0625],
        ];
        let obj = PortfolioVolatility::new(&cov);
        let config = SolverConfig {
            max_iterations: 1,
            ..SolverConfig::default()
        };
        let err = minimize(&obj, &ConstrainedProblem::long_only(3), &config).unwrap_err();
        assert!(matches!(
            err,
            RiskKitError::OptimizationFailure { iterations: 1, .. }
        ));
    }

    // ------------------------------------------------------------------
    // 6. Unbounded weights allow shorting
    // ------------------------------------------------------------------
    #[test]
    fn test_unbounded_weights() {
        let obj = Distance {
            p: vec![1.5, -0.5],
        };
        let problem = ConstrainedProblem {
            constraints: vec![LinearConstraint::budget(2)],
            bounds: vec![
                Bound {
                    lower: f64::NEG_INFINITY,
                    upper: f64::INFINITY,
                };
                2
            ],
            initial_guess: None,
        };
        let res = minimize(&obj, &problem, &SolverConfig::default()).unwrap();
        assert_abs_diff_eq!(res.weights[0], 1.5, epsilon = 1e-8);
        assert_abs_diff_eq!(res.weights[1], -0.5, epsilon = 1e-8);
    }

    #[test]
    fn test_bfgs_update_stays_positive_definite() {
        let mut b = DMatrix::<f64>::identity(2, 2);
        let s = DVector::from_vec(vec![1.0, 0.0]);
        let y = DVector::from_vec(vec![-1.0, 0.5]);
        damped_bfgs_update(&mut b, &s, &y);
        assert!(b.clone().cholesky().is_some());
    }

    #[test]
    fn test_config_defaults_from_empty_json() {
        let config: SolverConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.max_iterations, 200);
        assert_eq!(config.constraint_tol, 1e-8);
    }
}
