use serde::{Deserialize, Serialize};

use crate::error::RiskKitError;
use crate::types::CovarianceMatrix;
use crate::RiskKitResult;

/// Variance below this is treated as round-off on a PSD matrix and clamped to zero.
const VARIANCE_ROUNDOFF: f64 = -1e-14;

/// Maximum tolerated |C[i][j] - C[j][i]|.
const SYMMETRY_TOLERANCE: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Expected returns and covariance for an ordered asset universe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketInputs {
    /// Optional asset labels, positional with the returns vector.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub asset_names: Vec<String>,
    /// Per-period (or annualised) expected return per asset.
    pub expected_returns: Vec<f64>,
    /// N x N covariance matrix.
    pub covariance: CovarianceMatrix,
}

impl MarketInputs {
    /// Check shapes and values; returns the number of assets.
    pub fn validate(&self) -> RiskKitResult<usize> {
        let n = validate_market_inputs(&self.expected_returns, &self.covariance)?;
        if !self.asset_names.is_empty() && self.asset_names.len() != n {
            return Err(RiskKitError::shape(
                "asset_names",
                format!("Expected {} names but got {}", n, self.asset_names.len()),
            ));
        }
        Ok(n)
    }

    /// Label for asset `i`, falling back to its position.
    pub fn asset_name(&self, i: usize) -> String {
        self.asset_names
            .get(i)
            .cloned()
            .unwrap_or_else(|| format!("asset_{}", i))
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Portfolio return: w' * er.
pub fn portfolio_return(weights: &[f64], expected_returns: &[f64]) -> RiskKitResult<f64> {
    if weights.len() != expected_returns.len() {
        return Err(RiskKitError::shape(
            "weights",
            format!(
                "Expected {} weights to match expected_returns but got {}",
                expected_returns.len(),
                weights.len()
            ),
        ));
    }
    Ok(vec_dot(weights, expected_returns))
}

/// Portfolio variance: w' * C * w.
pub fn portfolio_variance(weights: &[f64], covariance: &[Vec<f64>]) -> RiskKitResult<f64> {
    check_square(covariance, weights.len())?;
    Ok(variance_unchecked(weights, covariance))
}

/// Portfolio volatility: sqrt(w' * C * w).
///
/// Fails with [`RiskKitError::Numerical`] when the quadratic form is
/// negative, which only happens for a covariance matrix that is not
/// positive semi-definite.
pub fn portfolio_volatility(weights: &[f64], covariance: &[Vec<f64>]) -> RiskKitResult<f64> {
    let variance = portfolio_variance(weights, covariance)?;
    volatility_from_variance(variance)
}

/// Validate an expected-returns vector against a covariance matrix.
/// Returns the number of assets.
#[allow(clippy::needless_range_loop)]
pub fn validate_market_inputs(
    expected_returns: &[f64],
    covariance: &[Vec<f64>],
) -> RiskKitResult<usize> {
    let n = expected_returns.len();
    if n == 0 {
        return Err(RiskKitError::InsufficientData(
            "At least one asset required".into(),
        ));
    }
    if let Some(i) = expected_returns.iter().position(|r| !r.is_finite()) {
        return Err(RiskKitError::invalid(
            "expected_returns",
            format!("Entry {} is not finite", i),
        ));
    }

    check_square(covariance, n)?;

    for i in 0..n {
        for j in 0..n {
            if !covariance[i][j].is_finite() {
                return Err(RiskKitError::invalid(
                    "covariance",
                    format!("Entry [{},{}] is not finite", i, j),
                ));
            }
        }
        if covariance[i][i] < 0.0 {
            return Err(RiskKitError::invalid(
                "covariance",
                format!("Negative variance on diagonal [{},{}]", i, i),
            ));
        }
        for j in (i + 1)..n {
            if (covariance[i][j] - covariance[j][i]).abs() > SYMMETRY_TOLERANCE {
                return Err(RiskKitError::invalid(
                    "covariance",
                    format!(
                        "Not symmetric: [{},{}]={} != [{},{}]={}",
                        i, j, covariance[i][j], j, i, covariance[j][i]
                    ),
                ));
            }
        }
    }
    Ok(n)
}

/// Equal weights for n assets.
pub fn equal_weights(n: usize) -> Vec<f64> {
    vec![1.0 / n as f64; n]
}

// ---------------------------------------------------------------------------
// Crate-internal helpers
// ---------------------------------------------------------------------------

/// Shape check only: `covariance` must be n x n.
pub(crate) fn check_square(covariance: &[Vec<f64>], n: usize) -> RiskKitResult<()> {
    if covariance.len() != n {
        return Err(RiskKitError::shape(
            "covariance",
            format!("Expected {}x{} matrix but got {} rows", n, n, covariance.len()),
        ));
    }
    for (i, row) in covariance.iter().enumerate() {
        if row.len() != n {
            return Err(RiskKitError::shape(
                "covariance",
                format!("Row {} has {} columns, expected {}", i, row.len(), n),
            ));
        }
    }
    Ok(())
}

pub(crate) fn variance_unchecked(weights: &[f64], covariance: &[Vec<f64>]) -> f64 {
    vec_dot(weights, &mat_vec_multiply(covariance, weights))
}

pub(crate) fn volatility_from_variance(variance: f64) -> RiskKitResult<f64> {
    if variance.is_nan() {
        return Err(RiskKitError::Numerical("portfolio variance is NaN".into()));
    }
    if variance < VARIANCE_ROUNDOFF {
        return Err(RiskKitError::Numerical(format!(
            "negative portfolio variance {:e}: covariance matrix is not positive semi-definite",
            variance
        )));
    }
    Ok(variance.max(0.0).sqrt())
}

/// Matrix-vector multiplication.
pub(crate) fn mat_vec_multiply(mat: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
    mat.iter().map(|row| vec_dot(row, v)).collect()
}

/// Dot product.
pub(crate) fn vec_dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
