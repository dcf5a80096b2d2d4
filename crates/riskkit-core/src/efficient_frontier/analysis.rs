use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::frontier::{
    efficient_frontier_with, target_returns, FrontierFailurePolicy, FrontierPoint, SkippedPoint,
    DEFAULT_FRONTIER_POINTS,
};
use super::max_sharpe::{gmv_with, msr_with};
use crate::error::RiskKitError;
use crate::optimizer::SolverConfig;
use crate::portfolio::metrics::{
    equal_weights, mat_vec_multiply, portfolio_return, portfolio_variance,
    validate_market_inputs, variance_unchecked, vec_dot, volatility_from_variance, MarketInputs,
};
use crate::types::{with_metadata, ComputationOutput, Rate};
use crate::RiskKitResult;

/// Weight above which an MSR position is flagged as concentrated.
pub(crate) const CONCENTRATION_THRESHOLD: f64 = 0.40;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EfficientFrontierInput {
    #[serde(flatten)]
    pub market: MarketInputs,
    /// Number of target returns on the grid (default 25).
    #[serde(default = "default_n_points")]
    pub n_points: usize,
    /// When set, Sharpe ratios are reported for every point.
    #[serde(default)]
    pub risk_free_rate: Option<Rate>,
    #[serde(default)]
    pub show_equal_weight: bool,
    #[serde(default)]
    pub show_gmv: bool,
    /// Include the MSR portfolio and the capital market line.
    #[serde(default)]
    pub show_cml: bool,
    #[serde(default)]
    pub failure_policy: FrontierFailurePolicy,
    #[serde(default)]
    pub solver: SolverConfig,
}

fn default_n_points() -> usize {
    DEFAULT_FRONTIER_POINTS
}

/// A single asset weight with risk/return contribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetWeight {
    pub name: String,
    pub weight: f64,
    /// Weight times expected return.
    pub contribution_to_return: f64,
    /// w_i * (Cw)_i / sigma; sums to portfolio volatility.
    pub contribution_to_risk: f64,
}

/// A named reference portfolio (equal-weight, GMV or MSR).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioPoint {
    pub weights: Vec<AssetWeight>,
    pub expected_return: f64,
    pub volatility: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sharpe_ratio: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CmlPoint {
    pub volatility: f64,
    pub expected_return: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EfficientFrontierOutput {
    pub frontier: Vec<FrontierPoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equal_weight: Option<PortfolioPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gmv: Option<PortfolioPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msr: Option<PortfolioPoint>,
    /// `[(0, rf), (sigma_msr, r_msr)]` when the CML is requested.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capital_market_line: Vec<CmlPoint>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Build the efficient frontier together with the reference portfolios
/// needed to chart it.
pub fn build_efficient_frontier(
    input: &EfficientFrontierInput,
) -> RiskKitResult<ComputationOutput<EfficientFrontierOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let market = &input.market;
    let n = market.validate()?;
    let er = &market.expected_returns;
    let cov = &market.covariance;
    let rf = input.risk_free_rate;

    let targets = target_returns(er, input.n_points)?;
    if input.n_points > 1 && targets[0] == targets[targets.len() - 1] {
        warnings.push(format!(
            "All expected returns equal {:.4}; the frontier collapses to a single return level",
            targets[0]
        ));
    }

    let mut frontier =
        efficient_frontier_with(er, cov, input.n_points, input.failure_policy, &input.solver)?;
    for point in frontier.points.iter_mut() {
        point.sharpe_ratio = rf.and_then(|r| sharpe(point.expected_return, r, point.volatility));
    }
    for s in &frontier.skipped {
        warnings.push(format!(
            "Frontier point {} (target {:.4}) skipped: {}",
            s.index, s.target_return, s.reason
        ));
    }

    let equal_weight = if input.show_equal_weight {
        Some(describe_portfolio(market, &equal_weights(n), rf)?)
    } else {
        None
    };

    let gmv = if input.show_gmv {
        let res = gmv_with(cov, &input.solver)?;
        Some(describe_portfolio(market, &res.weights, rf)?)
    } else {
        None
    };

    let (msr, capital_market_line) = if input.show_cml {
        let cml_rf = rf.unwrap_or(0.0);
        let res = msr_with(cml_rf, er, cov, &input.solver)?;
        let point = describe_portfolio(market, &res.weights, Some(cml_rf))?;
        for aw in &point.weights {
            if aw.weight > CONCENTRATION_THRESHOLD {
                warnings.push(format!(
                    "Concentrated position: {} has MSR weight {:.4}",
                    aw.name, aw.weight
                ));
            }
        }
        let line = vec![
            CmlPoint {
                volatility: 0.0,
                expected_return: cml_rf,
            },
            CmlPoint {
                volatility: point.volatility,
                expected_return: point.expected_return,
            },
        ];
        (Some(point), line)
    } else {
        (None, Vec::new())
    };

    let output = EfficientFrontierOutput {
        frontier: frontier.points,
        skipped: frontier.skipped,
        equal_weight,
        gmv,
        msr,
        capital_market_line,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Markowitz Efficient Frontier (long-only SQP)",
        &serde_json::json!({
            "n_assets": n,
            "n_points": input.n_points,
            "risk_free_rate": rf,
            "bounds": [0.0, 1.0],
            "failure_policy": input.failure_policy,
            "max_iterations": input.solver.max_iterations,
        }),
        warnings,
        elapsed,
        output,
    ))
}

/// Two-asset frontier swept directly over `w = [a, 1 - a]`, `a` evenly
/// spaced on [0, 1]. No optimisation is involved.
pub fn two_asset_frontier(
    expected_returns: &[f64],
    covariance: &[Vec<f64>],
    n_points: usize,
) -> RiskKitResult<Vec<FrontierPoint>> {
    let n = validate_market_inputs(expected_returns, covariance)?;
    if n != 2 {
        return Err(RiskKitError::shape(
            "expected_returns",
            format!("A two-asset frontier needs exactly 2 assets but got {}", n),
        ));
    }
    if n_points == 0 {
        return Err(RiskKitError::invalid("n_points", "must be at least 1"));
    }

    let step = if n_points > 1 {
        1.0 / (n_points - 1) as f64
    } else {
        0.0
    };
    (0..n_points)
        .map(|i| {
            let a = if i == n_points - 1 && n_points > 1 {
                1.0
            } else {
                step * i as f64
            };
            let weights = vec![a, 1.0 - a];
            let expected_return = vec_dot(&weights, expected_returns);
            let volatility = volatility_from_variance(variance_unchecked(&weights, covariance))?;
            Ok(FrontierPoint {
                target_return: expected_return,
                expected_return,
                volatility,
                sharpe_ratio: None,
                weights,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn sharpe(ret: f64, rf: f64, volatility: f64) -> Option<f64> {
    if volatility > 0.0 {
        Some((ret - rf) / volatility)
    } else {
        None
    }
}

/// Return, volatility, Sharpe and per-asset contributions of `weights`.
pub fn describe_portfolio(
    market: &MarketInputs,
    weights: &[f64],
    rf: Option<Rate>,
) -> RiskKitResult<PortfolioPoint> {
    let er = &market.expected_returns;
    let cov = &market.covariance;
    let expected_return = portfolio_return(weights, er)?;
    let volatility = volatility_from_variance(portfolio_variance(weights, cov)?)?;
    let cov_w = mat_vec_multiply(cov, weights);

    let weights = weights
        .iter()
        .enumerate()
        .map(|(i, &w)| AssetWeight {
            name: market.asset_name(i),
            weight: w,
            contribution_to_return: w * er[i],
            contribution_to_risk: if volatility > 0.0 {
                w * cov_w[i] / volatility
            } else {
                0.0
            },
        })
        .collect();

    Ok(PortfolioPoint {
        weights,
        expected_return,
        volatility,
        sharpe_ratio: rf.and_then(|r| sharpe(expected_return, r, volatility)),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
