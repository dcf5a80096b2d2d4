//! Dense dual active-set solver (Goldfarb–Idnani) for strictly convex QPs:
//!
//! ```text
//! min  ½ xᵀ G x + aᵀ x
//! s.t. nᵢᵀ x  = bᵢ   (equalities)
//!      nⱼᵀ x >= bⱼ   (inequalities)
//! ```
//!
//! Starts from the unconstrained minimiser and adds violated constraints one
//! at a time, so no feasible starting point is needed and infeasibility is
//! detected rather than iterated on.

use nalgebra::{DMatrix, DVector};
use thiserror::Error;

/// Relative slack within which a constraint counts as satisfied; scaled by
/// [`feasibility_tol`].
const FEASIBILITY_TOL: f64 = 1e-9;

/// Primal direction norm (relative to the normal) below which the new normal
/// is treated as linearly dependent on the active set.
const DEPENDENCE_TOL: f64 = 1e-10;

/// Dual direction entries closer to zero than this do not limit the step.
const DUAL_TOL: f64 = 1e-14;

#[derive(Debug, Clone, PartialEq, Error)]
pub(crate) enum QpFailure {
    #[error("constraints are infeasible ({0})")]
    Infeasible(String),

    #[error("Hessian is not positive definite")]
    NotPositiveDefinite,

    #[error("KKT system is singular")]
    Singular,

    #[error("active-set iteration limit {0} exceeded")]
    IterationLimit(usize),
}

pub(crate) struct QuadraticProgram {
    pub hessian: DMatrix<f64>,
    pub linear: DVector<f64>,
    /// (n, b) with nᵀx = b.
    pub equalities: Vec<(DVector<f64>, f64)>,
    /// (n, b) with nᵀx >= b.
    pub inequalities: Vec<(DVector<f64>, f64)>,
}

#[derive(Debug, Clone)]
pub(crate) struct QpSolution {
    pub x: DVector<f64>,
    pub iterations: usize,
}

struct ActiveConstraint {
    normal: DVector<f64>,
    multiplier: f64,
    equality: bool,
    index: usize,
}

impl QuadraticProgram {
    pub fn solve(&self) -> Result<QpSolution, QpFailure> {
        let n = self.linear.len();
        let max_iterations = 10 * (n + self.equalities.len() + self.inequalities.len()) + 100;

        let chol = self
            .hessian
            .clone()
            .cholesky()
            .ok_or(QpFailure::NotPositiveDefinite)?;
        let mut x = -chol.solve(&self.linear);
        let mut active: Vec<ActiveConstraint> = Vec::new();
        let mut iterations = 0usize;

        // Equalities go in first and are never dropped.
        for (index, (normal, rhs)) in self.equalities.iter().enumerate() {
            let slack = normal.dot(&x) - rhs;
            let (normal, rhs) = if slack > 0.0 {
                (-normal, -rhs)
            } else {
                (normal.clone(), *rhs)
            };
            self.add_constraint(
                &mut x,
                &mut active,
                normal,
                rhs,
                true,
                index,
                &mut iterations,
                max_iterations,
            )?;
        }

        loop {
            let mut worst: Option<(usize, f64)> = None;
            for (index, (normal, rhs)) in self.inequalities.iter().enumerate() {
                if active.iter().any(|c| !c.equality && c.index == index) {
                    continue;
                }
                let slack = normal.dot(&x) - rhs;
                let violated = slack < -feasibility_tol(normal, *rhs, &x);
                if violated && worst.map_or(true, |(_, s)| slack < s) {
                    worst = Some((index, slack));
                }
            }
            let Some((index, _)) = worst else {
                break;
            };
            let (normal, rhs) = &self.inequalities[index];
            self.add_constraint(
                &mut x,
                &mut active,
                normal.clone(),
                *rhs,
                false,
                index,
                &mut iterations,
                max_iterations,
            )?;
        }

        Ok(QpSolution { x, iterations })
    }

    /// Step primal and dual variables until constraint (normal, rhs) becomes
    /// active, dropping inequalities whose multipliers would turn negative.
    #[allow(clippy::too_many_arguments)]
    fn add_constraint(
        &self,
        x: &mut DVector<f64>,
        active: &mut Vec<ActiveConstraint>,
        normal: DVector<f64>,
        rhs: f64,
        equality: bool,
        index: usize,
        iterations: &mut usize,
        max_iterations: usize,
    ) -> Result<(), QpFailure> {
        let mut multiplier = 0.0;
        loop {
            *iterations += 1;
            if *iterations > max_iterations {
                return Err(QpFailure::IterationLimit(max_iterations));
            }

            let (z, v) = self.directions(active, &normal)?;
            let slack = normal.dot(x) - rhs;

            let dependent = z.norm() <= DEPENDENCE_TOL * normal.norm().max(1.0);
            let tol = feasibility_tol(&normal, rhs, x);
            let full_step = if dependent {
                None
            } else {
                let zn = z.dot(&normal);
                if zn > 0.0 {
                    Some((-slack / zn).max(0.0))
                } else {
                    None
                }
            };

            if dependent && slack >= -tol && (!equality || slack <= tol) {
                // Implied by the active set up to round-off.
                return Ok(());
            }

            let mut partial: Option<(usize, f64)> = None;
            for (k, (c, vk)) in active.iter().zip(v.iter()).enumerate() {
                if c.equality || *vk >= -DUAL_TOL {
                    continue;
                }
                let t = (-c.multiplier / vk).max(0.0);
                if partial.map_or(true, |(_, best)| t < best) {
                    partial = Some((k, t));
                }
            }

            match (full_step, partial) {
                (None, None) => {
                    let kind = if equality { "equality" } else { "inequality" };
                    return Err(QpFailure::Infeasible(format!(
                        "{} {} conflicts with the active set, residual {:.3e}",
                        kind, index, slack
                    )));
                }
                (None, Some((k, t))) => {
                    // Dual-only step: free up the blocking constraint.
                    for (c, vk) in active.iter_mut().zip(v.iter()) {
                        c.multiplier += t * vk;
                    }
                    multiplier += t;
                    active.remove(k);
                }
                (Some(t2), Some((k, t1))) if t1 < t2 => {
                    // Partial step: the blocking inequality leaves first.
                    x.axpy(t1, &z, 1.0);
                    for (c, vk) in active.iter_mut().zip(v.iter()) {
                        c.multiplier += t1 * vk;
                    }
                    multiplier += t1;
                    active.remove(k);
                }
                (Some(t2), _) => {
                    x.axpy(t2, &z, 1.0);
                    for (c, vk) in active.iter_mut().zip(v.iter()) {
                        c.multiplier += t2 * vk;
                    }
                    multiplier += t2;
                    active.push(ActiveConstraint {
                        normal,
                        multiplier,
                        equality,
                        index,
                    });
                    return Ok(());
                }
            }
        }
    }

    /// Primal step z and multiplier change v per unit increase of the new
    /// constraint's multiplier: G z - N v = normal, Nᵀ z = 0.
    fn directions(
        &self,
        active: &[ActiveConstraint],
        normal: &DVector<f64>,
    ) -> Result<(DVector<f64>, DVector<f64>), QpFailure> {
        let n = self.linear.len();
        let q = active.len();

        let mut kkt = DMatrix::<f64>::zeros(n + q, n + q);
        kkt.view_mut((0, 0), (n, n)).copy_from(&self.hessian);
        for (j, c) in active.iter().enumerate() {
            for i in 0..n {
                kkt[(i, n + j)] = -c.normal[i];
                kkt[(n + j, i)] = c.normal[i];
            }
        }

        let mut rhs = DVector::<f64>::zeros(n + q);
        rhs.rows_mut(0, n).copy_from(normal);

        let solution = kkt.lu().solve(&rhs).ok_or(QpFailure::Singular)?;
        let z = solution.rows(0, n).into_owned();
        let v = solution.rows(n, q).into_owned();
        Ok((z, v))
    }
}

/// Slack tolerance for constraint (normal, rhs) at x, scaled to the size of
/// the terms in nᵀx - b.
fn feasibility_tol(normal: &DVector<f64>, rhs: f64, x: &DVector<f64>) -> f64 {
    FEASIBILITY_TOL * 1f64.max(rhs.abs()).max(normal.norm() * x.norm())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
