use napi::Result as NapiResult;
use napi_derive::napi;
use serde::Deserialize;

use riskkit_core::efficient_frontier::frontier::{self, FrontierFailurePolicy};
use riskkit_core::optimizer::SolverConfig;

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

// ---------------------------------------------------------------------------
// Portfolio optimisation
// ---------------------------------------------------------------------------

#[napi]
pub fn minimize_vol(input_json: String) -> NapiResult<String> {
    let input: riskkit_core::efficient_frontier::portfolios::MinVolInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output =
        riskkit_core::efficient_frontier::solve_min_vol(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn max_sharpe(input_json: String) -> NapiResult<String> {
    let input: riskkit_core::efficient_frontier::portfolios::MsrInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = riskkit_core::efficient_frontier::solve_msr(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn global_minimum_variance(input_json: String) -> NapiResult<String> {
    let input: riskkit_core::efficient_frontier::portfolios::GmvInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = riskkit_core::efficient_frontier::solve_gmv(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Efficient frontier
// ---------------------------------------------------------------------------

#[napi]
pub fn efficient_frontier(input_json: String) -> NapiResult<String> {
    let input: riskkit_core::efficient_frontier::EfficientFrontierInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = riskkit_core::efficient_frontier::build_efficient_frontier(&input)
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

/// Bare weight vectors along the frontier, for callers that chart on their own.
#[derive(Deserialize)]
struct OptimalWeightsRequest {
    expected_returns: Vec<f64>,
    covariance: Vec<Vec<f64>>,
    #[serde(default = "default_points")]
    n_points: usize,
    #[serde(default)]
    failure_policy: FrontierFailurePolicy,
    #[serde(default)]
    solver: SolverConfig,
}

fn default_points() -> usize {
    frontier::DEFAULT_FRONTIER_POINTS
}

#[napi]
pub fn optimal_weights(input_json: String) -> NapiResult<String> {
    let req: OptimalWeightsRequest = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = frontier::efficient_frontier_with(
        &req.expected_returns,
        &req.covariance,
        req.n_points,
        req.failure_policy,
        &req.solver,
    )
    .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Risk kit
// ---------------------------------------------------------------------------

#[napi]
pub fn risk_summary(input_json: String) -> NapiResult<String> {
    let input: riskkit_core::risk_kit::RiskSummaryInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = riskkit_core::risk_kit::summary_stats(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn estimate_market_inputs(input_json: String, periods_per_year: f64) -> NapiResult<String> {
    let table: riskkit_core::risk_kit::ReturnsTable =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output =
        riskkit_core::risk_kit::estimate_market_inputs(&table, periods_per_year, true)
            .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn drawdown(returns_json: String, start_value: Option<f64>) -> NapiResult<String> {
    let returns: Vec<f64> = serde_json::from_str(&returns_json).map_err(to_napi_error)?;
    let output = riskkit_core::risk_kit::drawdown(
        &returns,
        None,
        start_value.unwrap_or(riskkit_core::risk_kit::drawdown::DEFAULT_START_VALUE),
    )
    .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}
