use serde::{Deserialize, Serialize};

use crate::error::RiskKitError;
use crate::RiskKitResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Whether a linear constraint must hold with equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    /// `coefficients · w = rhs`
    Equality,
    /// `coefficients · w <= rhs`
    Inequality,
}

/// A linear constraint on the weight vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearConstraint {
    /// Label used in diagnostics.
    pub name: String,
    pub kind: ConstraintKind,
    /// One coefficient per asset.
    pub coefficients: Vec<f64>,
    pub rhs: f64,
}

/// Box bound on a single weight. Infinite ends are unconstrained.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    pub lower: f64,
    pub upper: f64,
}

/// Constraints, bounds and starting point for one optimisation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstrainedProblem {
    #[serde(default)]
    pub constraints: Vec<LinearConstraint>,
    /// One bound per asset.
    pub bounds: Vec<Bound>,
    /// Starting weights; equal weighting when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_guess: Option<Vec<f64>>,
}

// ---------------------------------------------------------------------------
// Constructors
// ---------------------------------------------------------------------------

impl LinearConstraint {
    pub fn equality(name: &str, coefficients: Vec<f64>, rhs: f64) -> Self {
        LinearConstraint {
            name: name.to_string(),
            kind: ConstraintKind::Equality,
            coefficients,
            rhs,
        }
    }

    pub fn inequality(name: &str, coefficients: Vec<f64>, rhs: f64) -> Self {
        LinearConstraint {
            name: name.to_string(),
            kind: ConstraintKind::Inequality,
            coefficients,
            rhs,
        }
    }

    /// Fully invested: weights sum to one.
    pub fn budget(n: usize) -> Self {
        Self::equality("budget", vec![1.0; n], 1.0)
    }

    /// Portfolio return equals `target`.
    pub fn target_return(expected_returns: &[f64], target: f64) -> Self {
        Self::equality("target_return", expected_returns.to_vec(), target)
    }

    /// `coefficients · w - rhs`
    pub fn residual(&self, weights: &[f64]) -> f64 {
        self.coefficients
            .iter()
            .zip(weights.iter())
            .map(|(a, w)| a * w)
            .sum::<f64>()
            - self.rhs
    }

    /// Amount by which `weights` violate this constraint (zero when satisfied).
    pub fn violation(&self, weights: &[f64]) -> f64 {
        let r = self.residual(weights);
        match self.kind {
            ConstraintKind::Equality => r.abs(),
            ConstraintKind::Inequality => r.max(0.0),
        }
    }
}

impl Bound {
    /// Long-only, unlevered: [0, 1].
    pub const UNIT: Bound = Bound {
        lower: 0.0,
        upper: 1.0,
    };

    pub fn violation(&self, w: f64) -> f64 {
        (self.lower - w).max(w - self.upper).max(0.0)
    }
}

impl ConstrainedProblem {
    /// Budget constraint with [0, 1] bounds on every asset.
    pub fn long_only(n: usize) -> Self {
        ConstrainedProblem {
            constraints: vec![LinearConstraint::budget(n)],
            bounds: vec![Bound::UNIT; n],
            initial_guess: None,
        }
    }

    pub fn with_constraint(mut self, constraint: LinearConstraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn with_initial_guess(mut self, guess: Vec<f64>) -> Self {
        self.initial_guess = Some(guess);
        self
    }

    /// Largest constraint or bound violation at `weights`.
    pub fn max_violation(&self, weights: &[f64]) -> f64 {
        let from_constraints = self
            .constraints
            .iter()
            .map(|c| c.violation(weights))
            .fold(0.0, f64::max);
        let from_bounds = self
            .bounds
            .iter()
            .zip(weights.iter())
            .map(|(b, w)| b.violation(*w))
            .fold(0.0, f64::max);
        from_constraints.max(from_bounds)
    }

    /// Check every record against an `n`-asset universe.
    pub fn validate(&self, n: usize) -> RiskKitResult<()> {
        if n == 0 {
            return Err(RiskKitError::InsufficientData(
                "At least one asset required".into(),
            ));
        }
        if self.bounds.len() != n {
            return Err(RiskKitError::shape(
                "bounds",
                format!("Expected {} bounds but got {}", n, self.bounds.len()),
            ));
        }
        for (i, b) in self.bounds.iter().enumerate() {
            if b.lower.is_nan() || b.upper.is_nan() || b.lower > b.upper {
                return Err(RiskKitError::invalid(
                    &format!("bounds[{}]", i),
                    format!("lower {} must not exceed upper {}", b.lower, b.upper),
                ));
            }
        }
        for (ci, c) in self.constraints.iter().enumerate() {
            if c.coefficients.len() != n {
                return Err(RiskKitError::shape(
                    &format!("constraints[{}] ({})", ci, c.name),
                    format!(
                        "Expected {} coefficients but got {}",
                        n,
                        c.coefficients.len()
                    ),
                ));
            }
            if !c.rhs.is_finite() || c.coefficients.iter().any(|a| !a.is_finite()) {
                return Err(RiskKitError::invalid(
                    &format!("constraints[{}] ({})", ci, c.name),
                    "coefficients and rhs must be finite",
                ));
            }
        }
        if let Some(ref guess) = self.initial_guess {
            if guess.len() != n {
                return Err(RiskKitError::shape(
                    "initial_guess",
                    format!("Expected {} weights but got {}", n, guess.len()),
                ));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_budget_residual() {
        let c = LinearConstraint::budget(3);
        assert!((c.residual(&[0.2, 0.3, 0.5])).abs() < 1e-15);
        assert!((c.violation(&[0.2, 0.3, 0.4]) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_inequality_violation_one_sided() {
        let c = LinearConstraint::inequality("cap_first_two", vec![1.0, 1.0, 0.0], 0.6);
        assert_eq!(c.violation(&[0.2, 0.3, 0.5]), 0.0);
        assert!((c.violation(&[0.4, 0.4, 0.2]) - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_descriptor_serialises_tagged() {
        let c = LinearConstraint::target_return(&[0.05, 0.10], 0.075);
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["kind"], "equality");
        assert_eq!(json["name"], "target_return");
        let back: LinearConstraint = serde_json::from_value(json).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn test_validate_coefficient_length() {
        let problem = ConstrainedProblem::long_only(3)
            .with_constraint(LinearConstraint::target_return(&[0.1, 0.2], 0.15));
        assert!(matches!(
            problem.validate(3).unwrap_err(),
            RiskKitError::ShapeMismatch { .. }
        ));
    }

    #[test]
    fn test_validate_inverted_bound() {
        let mut problem = ConstrainedProblem::long_only(2);
        problem.bounds[1] = Bound {
            lower: 0.8,
            upper: 0.2,
        };
        assert!(matches!(
            problem.validate(2).unwrap_err(),
            RiskKitError::InvalidInput { .. }
        ));
    }

    #[test]
    fn test_max_violation_includes_bounds() {
        let problem = ConstrainedProblem::long_only(2);
        assert!((problem.max_violation(&[1.2, -0.2]) - 0.2).abs() < 1e-12);
    }
}
