use crate::error::RiskKitError;
use crate::optimizer::{
    minimize, ConstrainedProblem, NegativeSharpeRatio, OptimizationResult, SolverConfig,
};
use crate::portfolio::metrics::validate_market_inputs;
use crate::types::{Rate, Weights};
use crate::RiskKitResult;

/// Long-only, fully invested portfolio with the highest Sharpe ratio for the
/// given risk-free rate.
pub fn msr(
    riskfree_rate: Rate,
    expected_returns: &[f64],
    covariance: &[Vec<f64>],
) -> RiskKitResult<Weights> {
    msr_with(
        riskfree_rate,
        expected_returns,
        covariance,
        &SolverConfig::default(),
    )
    .map(|res| res.weights)
}

/// [`msr`] with an explicit solver policy and full diagnostics. The reported
/// objective is the negated Sharpe ratio.
pub fn msr_with(
    riskfree_rate: Rate,
    expected_returns: &[f64],
    covariance: &[Vec<f64>],
    config: &SolverConfig,
) -> RiskKitResult<OptimizationResult> {
    let n = validate_market_inputs(expected_returns, covariance)?;
    if !riskfree_rate.is_finite() {
        return Err(RiskKitError::invalid(
            "riskfree_rate",
            "must be a finite number",
        ));
    }
    let objective = NegativeSharpeRatio::new(riskfree_rate, expected_returns, covariance);
    minimize(&objective, &ConstrainedProblem::long_only(n), config)
}

/// Global minimum variance portfolio.
///
/// Computed as `msr(0, [1; N], covariance)`: with identical expected returns
/// and a zero risk-free rate, maximising Sharpe is minimising volatility.
pub fn gmv(covariance: &[Vec<f64>]) -> RiskKitResult<Weights> {
    gmv_with(covariance, &SolverConfig::default()).map(|res| res.weights)
}

/// [`gmv`] with an explicit solver policy.
pub fn gmv_with(covariance: &[Vec<f64>], config: &SolverConfig) -> RiskKitResult<OptimizationResult> {
    let ones = vec![1.0; covariance.len()];
    msr_with(0.0, &ones, covariance, config)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
