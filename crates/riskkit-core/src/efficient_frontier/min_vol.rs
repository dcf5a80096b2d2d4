use crate::error::RiskKitError;
use crate::optimizer::{
    minimize, Bound, ConstrainedProblem, LinearConstraint, OptimizationResult,
    PortfolioVolatility, SolverConfig,
};
use crate::portfolio::metrics::validate_market_inputs;
use crate::types::Weights;
use crate::RiskKitResult;

/// Lowest-volatility long-only portfolio whose expected return equals
/// `target_return`.
///
/// Targets the bounds cannot reach (for a long-only book, anything outside
/// `[min(er), max(er)]`) fail with [`RiskKitError::OptimizationFailure`].
pub fn minimize_vol(
    target_return: f64,
    expected_returns: &[f64],
    covariance: &[Vec<f64>],
) -> RiskKitResult<Weights> {
    minimize_vol_with(
        target_return,
        expected_returns,
        covariance,
        &SolverConfig::default(),
    )
    .map(|res| res.weights)
}

/// [`minimize_vol`] with an explicit solver policy and full diagnostics.
pub fn minimize_vol_with(
    target_return: f64,
    expected_returns: &[f64],
    covariance: &[Vec<f64>],
    config: &SolverConfig,
) -> RiskKitResult<OptimizationResult> {
    validate_market_inputs(expected_returns, covariance)?;
    if !target_return.is_finite() {
        return Err(RiskKitError::invalid(
            "target_return",
            "must be a finite number",
        ));
    }
    let problem = min_vol_problem(target_return, expected_returns);
    minimize(&PortfolioVolatility::new(covariance), &problem, config)
}

/// Return target and budget equalities with [0, 1] bounds.
pub fn min_vol_problem(target_return: f64, expected_returns: &[f64]) -> ConstrainedProblem {
    let n = expected_returns.len();
    ConstrainedProblem {
        constraints: vec![
            LinearConstraint::target_return(expected_returns, target_return),
            LinearConstraint::budget(n),
        ],
        bounds: vec![Bound::UNIT; n],
        initial_guess: None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portfolio::metrics::{portfolio_return, portfolio_volatility};
    use approx::assert_abs_diff_eq;

    fn two_asset() -> (Vec<f64>, Vec<Vec<f64>>) {
        let (s1, s2, rho) = (0.10, 0.20, 0.3);
        (
            vec![0.05, 0.10],
            vec![vec![s1 * s1, rho * s1 * s2], vec![rho * s1 * s2, s2 * s2]],
        )
    }

    fn three_asset() -> (Vec<f64>, Vec<Vec<f64>>) {
        let (v1, v2, v3) = (0.15, 0.20, 0.25);
        let c12 = 0.3 * v1 * v2;
        let c13 = 0.1 * v1 * v3;
        let c23 = 0.5 * v2 * v3;
        (
            vec![0.10, 0.04, 0.07],
            vec![
                vec![v1 * v1, c12, c13],
                vec![c12, v2 * v2, c23],
                vec![c13, c23, v3 * v3],
            ],
        )
    }

    // ------------------------------------------------------------------
    // 1. Midpoint of the two-asset line
    // ------------------------------------------------------------------
    #[test]
    fn test_two_asset_midpoint() {
        // Budget and return equalities pin w = [0.5, 0.5]:
        // 0.05 w1 + 0.10 (1 - w1) = 0.075  =>  w1 = 0.5
        let (er, cov) = two_asset();
        let w = minimize_vol(0.075, &er, &cov).unwrap();
        assert_abs_diff_eq!(w[0], 0.5, epsilon = 1e-4);
        assert_abs_diff_eq!(w[1], 0.5, epsilon = 1e-4);
    }

    // ------------------------------------------------------------------
    // 2. Constraints hold at the solution
    // ------------------------------------------------------------------
    #[test]
    fn test_three_asset_constraints_hold() {
        let (er, cov) = three_asset();
        for target in [0.05, 0.06, 0.07, 0.08, 0.09] {
            let w = minimize_vol(target, &er, &cov).unwrap();
            let total: f64 = w.iter().sum();
            assert_abs_diff_eq!(total, 1.0, epsilon = 1e-8);
            assert_abs_diff_eq!(portfolio_return(&w, &er).unwrap(), target, epsilon = 1e-8);
            assert!(w.iter().all(|x| (0.0..=1.0).contains(x)), "weights {:?}", w);
        }
    }

    // ------------------------------------------------------------------
    // 3. Solution beats neighbouring feasible portfolios
    // ------------------------------------------------------------------
    #[test]
    fn test_three_asset_is_local_minimum() {
        let (er, cov) = three_asset();
        let target = 0.07;
        let w = minimize_vol(target, &er, &cov).unwrap();
        let best = portfolio_volatility(&w, &cov).unwrap();

        // Null space of [1 1 1; er]: direction keeping sum and return fixed.
        let dir = [er[1] - er[2], er[2] - er[0], er[0] - er[1]];
        for eps in [-0.02, -0.005, 0.005, 0.02] {
            let moved: Vec<f64> = w.iter().zip(dir.iter()).map(|(a, d)| a + eps * d).collect();
            if moved.iter().any(|x| *x < 0.0) {
                continue;
            }
            let vol = portfolio_volatility(&moved, &cov).unwrap();
            assert!(vol >= best - 1e-9, "vol {} < optimum {}", vol, best);
        }
    }

    // ------------------------------------------------------------------
    // 4. Endpoints of the achievable range
    // ------------------------------------------------------------------
    #[test]
    fn test_max_return_target_is_single_asset() {
        let (er, cov) = three_asset();
        let w = minimize_vol(0.10, &er, &cov).unwrap();
        assert_abs_diff_eq!(w[0], 1.0, epsilon = 1e-8);
    }

    // ------------------------------------------------------------------
    // 5. Infeasible target
    // ------------------------------------------------------------------
    #[test]
    fn test_target_above_max_fails() {
        let (er, cov) = three_asset();
        let err = minimize_vol(0.12, &er, &cov).unwrap_err();
        assert!(matches!(err, RiskKitError::OptimizationFailure { .. }), "got {:?}", err);
    }

    #[test]
    fn test_target_below_min_fails() {
        let (er, cov) = two_asset();
        let err = minimize_vol(0.01, &er, &cov).unwrap_err();
        assert!(matches!(err, RiskKitError::OptimizationFailure { .. }));
    }

    // ------------------------------------------------------------------
    // 6. Single asset
    // ------------------------------------------------------------------
    #[test]
    fn test_single_asset_exact_target() {
        let w = minimize_vol(0.07, &[0.07], &[vec![0.04]]).unwrap();
        assert_eq!(w.len(), 1);
        assert_abs_diff_eq!(w[0], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_single_asset_other_target_fails() {
        for target in [0.0, 0.05, 0.08] {
            let err = minimize_vol(target, &[0.07], &[vec![0.04]]).unwrap_err();
            assert!(matches!(err, RiskKitError::OptimizationFailure { .. }));
        }
    }

    // ------------------------------------------------------------------
    // 7. Shape errors surface before optimisation
    // ------------------------------------------------------------------
    #[test]
    fn test_shape_error() {
        let (er, _) = three_asset();
        let (_, cov) = two_asset();
        let err = minimize_vol(0.07, &er, &cov).unwrap_err();
        assert!(matches!(err, RiskKitError::ShapeMismatch { .. }));
    }

    // ------------------------------------------------------------------
    // 8. Riskless asset (zero-variance row in a PSD covariance)
    // ------------------------------------------------------------------
    #[test]
    fn test_riskless_asset_at_min_return() {
        let er = [0.02, 0.08];
        let cov = [vec![0.0, 0.0], vec![0.0, 0.04]];
        let w = minimize_vol(0.02, &er, &cov).unwrap();
        assert_abs_diff_eq!(w[0], 1.0, epsilon = 1e-8);
        assert_abs_diff_eq!(w[1], 0.0, epsilon = 1e-8);
        assert_abs_diff_eq!(portfolio_volatility(&w, &cov).unwrap(), 0.0, epsilon = 1e-8);
    }

    #[test]
    fn test_riskless_asset_interior_target() {
        let er = [0.02, 0.06, 0.09];
        let cov = [
            vec![0.0, 0.0, 0.0],
            vec![0.0, 0.04, 0.01],
            vec![0.0, 0.01, 0.09],
        ];
        let w = minimize_vol(0.04, &er, &cov).unwrap();
        let total: f64 = w.iter().sum();
        assert_abs_diff_eq!(total, 1.0, epsilon = 1e-8);
        assert_abs_diff_eq!(portfolio_return(&w, &er).unwrap(), 0.04, epsilon = 1e-8);
        assert!(w[0] > 0.5, "weights {:?}", w);
    }

    #[test]
    fn test_diagnostics_reported() {
        let (er, cov) = three_asset();
        let res = minimize_vol_with(0.07, &er, &cov, &SolverConfig::default()).unwrap();
        assert!(res.iterations >= 1);
        assert!(res.constraint_violation <= 1e-8);
        assert_abs_diff_eq!(
            res.objective,
            portfolio_volatility(&res.weights, &cov).unwrap(),
            epsilon = 1e-12
        );
    }
}
