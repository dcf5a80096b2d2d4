use crate::error::RiskKitError;
use crate::portfolio::metrics::{mat_vec_multiply, vec_dot, volatility_from_variance};
use crate::RiskKitResult;

/// Volatilities at or below this are treated as zero; ratios and gradients
/// that divide by volatility are undefined there.
const MIN_VOLATILITY: f64 = 1e-12;

/// A smooth scalar function of the weight vector, with its gradient.
pub trait Objective {
    /// Short label used in logs and errors.
    fn name(&self) -> &'static str;

    /// Number of weights the objective expects.
    fn dimension(&self) -> usize;

    /// Value and gradient at `weights`.
    ///
    /// An `Err` marks the point as outside the objective's domain; the
    /// solver rejects such candidates instead of stepping onto them.
    fn evaluate(&self, weights: &[f64]) -> RiskKitResult<(f64, Vec<f64>)>;
}

/// sqrt(w' * C * w)
pub struct PortfolioVolatility<'a> {
    covariance: &'a [Vec<f64>],
}

/// -(w' * er - rf) / sqrt(w' * C * w)
pub struct NegativeSharpeRatio<'a> {
    riskfree_rate: f64,
    expected_returns: &'a [f64],
    covariance: &'a [Vec<f64>],
}

impl<'a> PortfolioVolatility<'a> {
    /// `covariance` must already be validated as square.
    pub fn new(covariance: &'a [Vec<f64>]) -> Self {
        PortfolioVolatility { covariance }
    }
}

impl<'a> NegativeSharpeRatio<'a> {
    /// Inputs must already be validated as matching shapes.
    pub fn new(riskfree_rate: f64, expected_returns: &'a [f64], covariance: &'a [Vec<f64>]) -> Self {
        NegativeSharpeRatio {
            riskfree_rate,
            expected_returns,
            covariance,
        }
    }
}

/// Returns (sigma, C * w).
fn volatility_and_sigma_w(weights: &[f64], covariance: &[Vec<f64>]) -> RiskKitResult<(f64, Vec<f64>)> {
    let sigma_w = mat_vec_multiply(covariance, weights);
    let vol = volatility_from_variance(vec_dot(weights, &sigma_w))?;
    Ok((vol, sigma_w))
}

impl Objective for PortfolioVolatility<'_> {
    fn name(&self) -> &'static str {
        "volatility"
    }

    fn dimension(&self) -> usize {
        self.covariance.len()
    }

    fn evaluate(&self, weights: &[f64]) -> RiskKitResult<(f64, Vec<f64>)> {
        let (vol, sigma_w) = volatility_and_sigma_w(weights, self.covariance)?;
        if vol <= MIN_VOLATILITY {
            // Global minimum of sqrt(w'Cw); C w = 0 there for PSD C, so zero
            // is a valid subgradient.
            return Ok((vol, vec![0.0; weights.len()]));
        }
        let grad = sigma_w.iter().map(|v| v / vol).collect();
        Ok((vol, grad))
    }
}

impl Objective for NegativeSharpeRatio<'_> {
    fn name(&self) -> &'static str {
        "negative_sharpe"
    }

    fn dimension(&self) -> usize {
        self.expected_returns.len()
    }

    fn evaluate(&self, weights: &[f64]) -> RiskKitResult<(f64, Vec<f64>)> {
        let (vol, sigma_w) = volatility_and_sigma_w(weights, self.covariance)?;
        if vol <= MIN_VOLATILITY {
            return Err(RiskKitError::Numerical(
                "Sharpe ratio undefined at a zero-volatility portfolio".into(),
            ));
        }
        let excess = vec_dot(weights, self.expected_returns) - self.riskfree_rate;
        let vol_cubed = vol * vol * vol;
        // d/dw [-(excess / vol)] = -er / vol + excess * C w / vol^3
        let grad = self
            .expected_returns
            .iter()
            .zip(sigma_w.iter())
            .map(|(er, sw)| -er / vol + excess * sw / vol_cubed)
            .collect();
        Ok((-excess / vol, grad))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
