use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::analysis::{describe_portfolio, PortfolioPoint, CONCENTRATION_THRESHOLD};
use super::max_sharpe::{gmv_with, msr_with};
use super::min_vol::minimize_vol_with;
use crate::optimizer::{OptimizationResult, SolverConfig};
use crate::portfolio::metrics::MarketInputs;
use crate::types::{with_metadata, ComputationOutput, Rate};
use crate::RiskKitResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinVolInput {
    #[serde(flatten)]
    pub market: MarketInputs,
    pub target_return: Rate,
    #[serde(default)]
    pub solver: SolverConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MsrInput {
    #[serde(flatten)]
    pub market: MarketInputs,
    #[serde(default)]
    pub risk_free_rate: Rate,
    #[serde(default)]
    pub solver: SolverConfig,
}

/// GMV needs only the covariance; expected returns, when given, are used
/// to report the portfolio return.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GmvInput {
    #[serde(default)]
    pub asset_names: Vec<String>,
    #[serde(default)]
    pub expected_returns: Vec<f64>,
    pub covariance: Vec<Vec<f64>>,
    #[serde(default)]
    pub solver: SolverConfig,
}

/// An optimised portfolio with solver diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioSolution {
    #[serde(flatten)]
    pub portfolio: PortfolioPoint,
    pub iterations: u32,
    pub constraint_violation: f64,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

pub fn solve_min_vol(input: &MinVolInput) -> RiskKitResult<ComputationOutput<PortfolioSolution>> {
    let start = Instant::now();
    let market = &input.market;
    let n = market.validate()?;
    let res = minimize_vol_with(
        input.target_return,
        &market.expected_returns,
        &market.covariance,
        &input.solver,
    )?;
    envelope(
        "Minimum-volatility portfolio for a target return (long-only SQP)",
        serde_json::json!({
            "n_assets": n,
            "target_return": input.target_return,
            "bounds": [0.0, 1.0],
        }),
        market,
        res,
        None,
        start,
    )
}

pub fn solve_msr(input: &MsrInput) -> RiskKitResult<ComputationOutput<PortfolioSolution>> {
    let start = Instant::now();
    let market = &input.market;
    let n = market.validate()?;
    let res = msr_with(
        input.risk_free_rate,
        &market.expected_returns,
        &market.covariance,
        &input.solver,
    )?;
    envelope(
        "Maximum Sharpe ratio portfolio (long-only SQP)",
        serde_json::json!({
            "n_assets": n,
            "risk_free_rate": input.risk_free_rate,
            "bounds": [0.0, 1.0],
        }),
        market,
        res,
        Some(input.risk_free_rate),
        start,
    )
}

pub fn solve_gmv(input: &GmvInput) -> RiskKitResult<ComputationOutput<PortfolioSolution>> {
    let start = Instant::now();
    let expected_returns = if input.expected_returns.is_empty() {
        vec![0.0; input.covariance.len()]
    } else {
        input.expected_returns.clone()
    };
    let market = MarketInputs {
        asset_names: input.asset_names.clone(),
        expected_returns,
        covariance: input.covariance.clone(),
    };
    let n = market.validate()?;
    let res = gmv_with(&market.covariance, &input.solver)?;
    envelope(
        "Global minimum variance portfolio (max Sharpe with flat returns, zero rate)",
        serde_json::json!({
            "n_assets": n,
            "bounds": [0.0, 1.0],
            "expected_returns_supplied": !input.expected_returns.is_empty(),
        }),
        &market,
        res,
        None,
        start,
    )
}

fn envelope(
    methodology: &str,
    assumptions: serde_json::Value,
    market: &MarketInputs,
    res: OptimizationResult,
    rf: Option<Rate>,
    start: Instant,
) -> RiskKitResult<ComputationOutput<PortfolioSolution>> {
    let portfolio = describe_portfolio(market, &res.weights, rf)?;
    let warnings = portfolio
        .weights
        .iter()
        .filter(|aw| aw.weight > CONCENTRATION_THRESHOLD)
        .map(|aw| format!("Concentrated position: {} has weight {:.4}", aw.name, aw.weight))
        .collect();
    let output = PortfolioSolution {
        portfolio,
        iterations: res.iterations,
        constraint_violation: res.constraint_violation,
    };
    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(methodology, &assumptions, warnings, elapsed, output))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const MARKET: &str = r#"
        "asset_names": ["Low", "High"],
        "expected_returns": [0.05, 0.10],
        "covariance": [[0.01, 0.006], [0.006, 0.04]]
    "#;

    // ------------------------------------------------------------------
    // 1. JSON inputs
    // ------------------------------------------------------------------
    #[test]
    fn test_min_vol_from_json() {
        let input: MinVolInput =
            serde_json::from_str(&format!("{{{}, \"target_return\": 0.075}}", MARKET)).unwrap();
        let out = solve_min_vol(&input).unwrap();
        let p = &out.result.portfolio;
        assert_abs_diff_eq!(p.weights[0].weight, 0.5, epsilon = 1e-4);
        assert_abs_diff_eq!(p.expected_return, 0.075, epsilon = 1e-8);
        assert!(out.warnings.iter().any(|w| w.contains("Low")));
    }

    #[test]
    fn test_msr_reports_sharpe() {
        let input: MsrInput =
            serde_json::from_str(&format!("{{{}, \"risk_free_rate\": 0.02}}", MARKET)).unwrap();
        let out = solve_msr(&input).unwrap();
        assert!(out.result.portfolio.sharpe_ratio.unwrap() > 0.0);
        assert_eq!(out.assumptions["risk_free_rate"], 0.02);
    }

    #[test]
    fn test_gmv_without_returns() {
        let input: GmvInput =
            serde_json::from_str(r#"{"covariance": [[0.01, 0.006], [0.006, 0.04]]}"#).unwrap();
        let out = solve_gmv(&input).unwrap();
        let p = &out.result.portfolio;
        assert_eq!(p.expected_return, 0.0);
        assert_eq!(p.weights[0].name, "asset_0");
        // Interior two-asset GMV: (s2^2 - c) / (s1^2 + s2^2 - 2c)
        assert_abs_diff_eq!(p.weights[0].weight, 0.034 / 0.038, epsilon = 1e-4);
    }

    // ------------------------------------------------------------------
    // 2. Serialised shape
    // ------------------------------------------------------------------
    #[test]
    fn test_solution_flattens_portfolio() {
        let input: GmvInput =
            serde_json::from_str(r#"{"covariance": [[0.04, 0.0], [0.0, 0.04]]}"#).unwrap();
        let json = serde_json::to_value(solve_gmv(&input).unwrap()).unwrap();
        assert!(json["result"]["weights"].is_array());
        assert!(json["result"]["iterations"].is_number());
        assert!(json["result"].get("portfolio").is_none());
    }
}
