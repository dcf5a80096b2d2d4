use serde::{Deserialize, Serialize};
use tracing::warn;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::min_vol::minimize_vol_with;
use crate::error::RiskKitError;
use crate::optimizer::SolverConfig;
use crate::portfolio::metrics::{
    validate_market_inputs, variance_unchecked, vec_dot, volatility_from_variance,
};
use crate::types::Weights;
use crate::RiskKitResult;

pub const DEFAULT_FRONTIER_POINTS: usize = 25;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// What to do when one target return on the grid fails to optimise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrontierFailurePolicy {
    /// Return the first failure (in target order).
    #[default]
    Abort,
    /// Drop the point and list it in [`Frontier::skipped`].
    SkipAndReport,
}

/// One optimised point on the frontier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontierPoint {
    pub target_return: f64,
    /// Realised w' * er (equal to the target up to solver tolerance).
    pub expected_return: f64,
    pub volatility: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sharpe_ratio: Option<f64>,
    pub weights: Weights,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedPoint {
    /// Position on the target grid.
    pub index: usize,
    pub target_return: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Frontier {
    /// Solved points in increasing target order.
    pub points: Vec<FrontierPoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedPoint>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// `n_points` evenly spaced targets from `min(er)` to `max(er)` inclusive.
/// A single point sits at `min(er)`.
pub fn target_returns(expected_returns: &[f64], n_points: usize) -> RiskKitResult<Vec<f64>> {
    if n_points == 0 {
        return Err(RiskKitError::invalid("n_points", "must be at least 1"));
    }
    if expected_returns.is_empty() {
        return Err(RiskKitError::InsufficientData(
            "expected_returns is empty".into(),
        ));
    }
    let lo = expected_returns.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = expected_returns
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    if n_points == 1 {
        return Ok(vec![lo]);
    }
    let step = (hi - lo) / (n_points - 1) as f64;
    Ok((0..n_points)
        .map(|i| if i == n_points - 1 { hi } else { lo + step * i as f64 })
        .collect())
}

/// Minimum-volatility weights for each target in [`target_returns`].
/// Any failing target fails the whole call.
pub fn optimal_weights(
    n_points: usize,
    expected_returns: &[f64],
    covariance: &[Vec<f64>],
) -> RiskKitResult<Vec<Weights>> {
    let frontier = efficient_frontier(
        expected_returns,
        covariance,
        n_points,
        FrontierFailurePolicy::Abort,
    )?;
    Ok(frontier.points.into_iter().map(|p| p.weights).collect())
}

/// Solve the frontier with the default solver policy.
pub fn efficient_frontier(
    expected_returns: &[f64],
    covariance: &[Vec<f64>],
    n_points: usize,
    policy: FrontierFailurePolicy,
) -> RiskKitResult<Frontier> {
    efficient_frontier_with(
        expected_returns,
        covariance,
        n_points,
        policy,
        &SolverConfig::default(),
    )
}

/// Solve one minimum-volatility problem per target return.
///
/// Targets are independent; with the `parallel` feature they are solved on
/// the rayon pool. Results are always reported in target order.
pub fn efficient_frontier_with(
    expected_returns: &[f64],
    covariance: &[Vec<f64>],
    n_points: usize,
    policy: FrontierFailurePolicy,
    config: &SolverConfig,
) -> RiskKitResult<Frontier> {
    validate_market_inputs(expected_returns, covariance)?;
    let targets = target_returns(expected_returns, n_points)?;

    let solve = |target: f64| -> RiskKitResult<FrontierPoint> {
        let res = minimize_vol_with(target, expected_returns, covariance, config)?;
        let expected_return = vec_dot(&res.weights, expected_returns);
        let volatility = volatility_from_variance(variance_unchecked(&res.weights, covariance))?;
        Ok(FrontierPoint {
            target_return: target,
            expected_return,
            volatility,
            sharpe_ratio: None,
            weights: res.weights,
        })
    };

    #[cfg(feature = "parallel")]
    let outcomes: Vec<RiskKitResult<FrontierPoint>> = targets.par_iter().map(|&t| solve(t)).collect();
    #[cfg(not(feature = "parallel"))]
    let outcomes: Vec<RiskKitResult<FrontierPoint>> = targets.iter().map(|&t| solve(t)).collect();

    let mut frontier = Frontier::default();
    for (index, (outcome, &target_return)) in outcomes.into_iter().zip(targets.iter()).enumerate() {
        match (outcome, policy) {
            (Ok(point), _) => frontier.points.push(point),
            (Err(e), FrontierFailurePolicy::Abort) => return Err(e),
            (Err(e), FrontierFailurePolicy::SkipAndReport) => {
                warn!(index, target_return, error = %e, "skipping frontier point");
                frontier.skipped.push(SkippedPoint {
                    index,
                    target_return,
                    reason: e.to_string(),
                });
            }
        }
    }
    Ok(frontier)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::efficient_frontier::max_sharpe::gmv;
    use crate::portfolio::metrics::portfolio_volatility;
    use approx::assert_abs_diff_eq;
    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    fn three_asset() -> (Vec<f64>, Vec<Vec<f64>>) {
        (
            vec![0.10, 0.04, 0.07],
            vec![
                vec![0.0225, 0.009, 0.00375],
                vec![0.009, 0.04, 0.025],
                vec![0.00375, 0.025, 0.0625],
            ],
        )
    }

    // ------------------------------------------------------------------
    // 1. Target grid
    // ------------------------------------------------------------------
    #[test]
    fn test_target_grid_spans_range() {
        let targets = target_returns(&[0.07, 0.02, 0.12], 5).unwrap();
        assert_eq!(targets.len(), 5);
        assert_abs_diff_eq!(targets[0], 0.02, epsilon = 1e-15);
        assert_abs_diff_eq!(targets[2], 0.07, epsilon = 1e-15);
        assert_eq!(targets[4], 0.12);
    }

    #[test]
    fn test_target_grid_single_point() {
        assert_eq!(target_returns(&[0.07, 0.02], 1).unwrap(), vec![0.02]);
    }

    #[test]
    fn test_zero_points_rejected() {
        let (er, cov) = three_asset();
        let err = optimal_weights(0, &er, &cov).unwrap_err();
        assert!(matches!(err, RiskKitError::InvalidInput { .. }));
    }

    // ------------------------------------------------------------------
    // 2. Frontier shape
    // ------------------------------------------------------------------
    #[test]
    fn test_frontier_25_points_increasing() {
        let (er, cov) = three_asset();
        let frontier = efficient_frontier(&er, &cov, 25, FrontierFailurePolicy::Abort).unwrap();
        assert_eq!(frontier.points.len(), 25);
        assert!(frontier.skipped.is_empty());
        for pair in frontier.points.windows(2) {
            assert!(pair[1].target_return > pair[0].target_return);
        }
        for p in &frontier.points {
            assert_abs_diff_eq!(p.expected_return, p.target_return, epsilon = 1e-8);
            let total: f64 = p.weights.iter().sum();
            assert_abs_diff_eq!(total, 1.0, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_gmv_below_every_frontier_point() {
        let (er, cov) = three_asset();
        let gmv_vol = portfolio_volatility(&gmv(&cov).unwrap(), &cov).unwrap();
        let frontier = efficient_frontier(&er, &cov, 15, FrontierFailurePolicy::Abort).unwrap();
        for p in &frontier.points {
            assert!(gmv_vol <= p.volatility + 1e-7, "gmv {} > {}", gmv_vol, p.volatility);
        }
    }

    #[test]
    fn test_optimal_weights_matches_frontier() {
        let (er, cov) = three_asset();
        let weights = optimal_weights(5, &er, &cov).unwrap();
        assert_eq!(weights.len(), 5);
        assert_abs_diff_eq!(weights[4][0], 1.0, epsilon = 1e-8);
        assert_abs_diff_eq!(weights[0][1], 1.0, epsilon = 1e-8);
    }

    // ------------------------------------------------------------------
    // 3. Failure policy
    // ------------------------------------------------------------------
    #[test]
    fn test_abort_and_skip_policies() {
        // A single-iteration budget cannot reach the interior targets.
        let (er, cov) = three_asset();
        let config = SolverConfig {
            max_iterations: 1,
            ..SolverConfig::default()
        };
        let aborted =
            efficient_frontier_with(&er, &cov, 7, FrontierFailurePolicy::Abort, &config);
        assert!(matches!(
            aborted,
            Err(RiskKitError::OptimizationFailure { .. })
        ));

        let skipped =
            efficient_frontier_with(&er, &cov, 7, FrontierFailurePolicy::SkipAndReport, &config)
                .unwrap();
        assert!(!skipped.skipped.is_empty());
        assert_eq!(skipped.points.len() + skipped.skipped.len(), 7);
        // Both endpoints are single-asset portfolios and need no iterations.
        assert_eq!(skipped.points.first().unwrap().target_return, 0.04);
        assert_eq!(skipped.points.last().unwrap().target_return, 0.10);
    }

    #[test]
    #[traced_test]
    fn test_skipped_point_logged() {
        let (er, cov) = three_asset();
        let config = SolverConfig {
            max_iterations: 1,
            ..SolverConfig::default()
        };
        efficient_frontier_with(&er, &cov, 3, FrontierFailurePolicy::SkipAndReport, &config)
            .unwrap();
        assert!(logs_contain("skipping frontier point"));
    }

    // ------------------------------------------------------------------
    // 4. Degenerate inputs
    // ------------------------------------------------------------------
    #[test]
    fn test_single_asset_frontier() {
        let frontier =
            efficient_frontier(&[0.06], &[vec![0.01]], 3, FrontierFailurePolicy::Abort).unwrap();
        assert_eq!(frontier.points.len(), 3);
        for p in &frontier.points {
            assert_eq!(p.weights, vec![1.0]);
            assert_abs_diff_eq!(p.volatility, 0.1, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_frontier_with_riskless_asset() {
        let er = [0.02, 0.08];
        let cov = [vec![0.0, 0.0], vec![0.0, 0.04]];
        let frontier = efficient_frontier(&er, &cov, 25, FrontierFailurePolicy::Abort).unwrap();
        assert_eq!(frontier.points.len(), 25);
        let first = &frontier.points[0];
        assert_abs_diff_eq!(first.volatility, 0.0, epsilon = 1e-8);
        assert_abs_diff_eq!(first.weights[0], 1.0, epsilon = 1e-8);
        // Volatility grows linearly with the risky weight.
        let mid = &frontier.points[12];
        assert_abs_diff_eq!(mid.weights[1], 0.5, epsilon = 1e-8);
        assert_abs_diff_eq!(mid.volatility, 0.1, epsilon = 1e-8);
    }
}
