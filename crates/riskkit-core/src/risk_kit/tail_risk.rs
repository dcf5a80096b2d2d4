use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF, Normal};
use std::time::Instant;

use super::drawdown::{drawdown, DrawdownSummary, DEFAULT_START_VALUE};
use super::returns::{annualize_rets, annualize_vol, mean, require_non_empty, sharpe_ratio, std_dev};
use crate::error::RiskKitError;
use crate::types::{with_metadata, ComputationOutput, Rate};
use crate::RiskKitResult;

/// Default p-value threshold for the Jarque-Bera test.
pub const DEFAULT_NORMALITY_LEVEL: f64 = 0.01;

/// Fewer observations than this make the Jarque-Bera asymptotics unreliable.
const MIN_OBS_FOR_NORMALITY: usize = 30;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskSummaryInput {
    /// Periodic returns as decimals.
    pub returns: Vec<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dates: Vec<NaiveDate>,
    /// VaR / CVaR level in percent (default 5).
    #[serde(default = "default_level")]
    pub level: f64,
    #[serde(default = "default_periods_per_year")]
    pub periods_per_year: f64,
    /// Annual risk-free rate for the Sharpe ratio.
    #[serde(default)]
    pub risk_free_rate: Rate,
    /// Jarque-Bera p-value threshold (default 0.01).
    #[serde(default = "default_normality_level")]
    pub normality_level: f64,
}

impl RiskSummaryInput {
    /// Input with the default level, frequency and thresholds.
    pub fn from_returns(returns: Vec<f64>) -> Self {
        RiskSummaryInput {
            returns,
            dates: Vec::new(),
            level: default_level(),
            periods_per_year: default_periods_per_year(),
            risk_free_rate: 0.0,
            normality_level: default_normality_level(),
        }
    }
}

fn default_level() -> f64 {
    5.0
}

fn default_periods_per_year() -> f64 {
    12.0
}

fn default_normality_level() -> f64 {
    DEFAULT_NORMALITY_LEVEL
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskSummaryOutput {
    pub n_observations: usize,
    pub annualized_return: Rate,
    pub annualized_volatility: Rate,
    /// None when the series has zero volatility.
    pub sharpe_ratio: Option<f64>,
    pub skewness: f64,
    pub kurtosis: f64,
    pub semideviation: f64,
    pub var_historic: f64,
    pub cvar_historic: f64,
    pub var_gaussian: f64,
    pub var_cornish_fisher: f64,
    pub jarque_bera: f64,
    pub jarque_bera_p_value: f64,
    pub is_normal: bool,
    pub drawdown: DrawdownSummary,
}

// ---------------------------------------------------------------------------
// Moments
// ---------------------------------------------------------------------------

/// Population standard deviation of the negative returns. Zero when no
/// return is negative.
pub fn semideviation(returns: &[f64]) -> RiskKitResult<f64> {
    require_non_empty(returns, 1)?;
    let negatives: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    if negatives.is_empty() {
        return Ok(0.0);
    }
    Ok(std_dev(&negatives, 0))
}

/// Third standardised moment, population (biased) form.
pub fn skewness(returns: &[f64]) -> RiskKitResult<f64> {
    standardized_moment(returns, 3)
}

/// Fourth standardised moment, population form. Not excess: a normal
/// distribution gives 3.
pub fn kurtosis(returns: &[f64]) -> RiskKitResult<f64> {
    standardized_moment(returns, 4)
}

fn standardized_moment(returns: &[f64], order: i32) -> RiskKitResult<f64> {
    require_non_empty(returns, 2)?;
    let m = mean(returns);
    let sigma = std_dev(returns, 0);
    if sigma == 0.0 {
        return Err(RiskKitError::Numerical(
            "Higher moments undefined for a series with zero dispersion".into(),
        ));
    }
    let moment = returns.iter().map(|r| (r - m).powi(order)).sum::<f64>() / returns.len() as f64;
    Ok(moment / sigma.powi(order))
}

// ---------------------------------------------------------------------------
// Value at Risk
// ---------------------------------------------------------------------------

/// Historic VaR: the loss exceeded in only `level` percent of periods,
/// reported as a positive number.
pub fn var_historic(returns: &[f64], level: f64) -> RiskKitResult<f64> {
    require_non_empty(returns, 1)?;
    check_level(level)?;
    Ok(-percentile(returns, level))
}

/// Mean loss over the periods at or beyond the historic VaR.
pub fn cvar_historic(returns: &[f64], level: f64) -> RiskKitResult<f64> {
    let var = var_historic(returns, level)?;
    let beyond: Vec<f64> = returns.iter().copied().filter(|r| *r <= -var).collect();
    Ok(-mean(&beyond))
}

/// Parametric VaR from the mean and population standard deviation. With
/// `modified` the normal quantile gets the Cornish-Fisher adjustment for
/// the sample skewness and kurtosis.
pub fn var_gaussian(returns: &[f64], level: f64, modified: bool) -> RiskKitResult<f64> {
    require_non_empty(returns, 2)?;
    check_level(level)?;
    let normal = Normal::new(0.0, 1.0).map_err(|e| RiskKitError::Numerical(e.to_string()))?;
    let mut z = normal.inverse_cdf(level / 100.0);
    if modified {
        z = cornish_fisher_z(z, skewness(returns)?, kurtosis(returns)?);
    }
    Ok(-(mean(returns) + z * std_dev(returns, 0)))
}

pub(crate) fn cornish_fisher_z(z: f64, s: f64, k: f64) -> f64 {
    z + (z.powi(2) - 1.0) * s / 6.0
        + (z.powi(3) - 3.0 * z) * (k - 3.0) / 24.0
        + (2.0 * z.powi(3) - 5.0 * z) * s.powi(2) / 36.0
}

/// Percentile with linear interpolation between order statistics.
fn percentile(values: &[f64], level: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let h = (sorted.len() - 1) as f64 * level / 100.0;
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

fn check_level(level: f64) -> RiskKitResult<()> {
    if !(level > 0.0 && level < 100.0) {
        return Err(RiskKitError::invalid(
            "level",
            format!("must lie strictly between 0 and 100, got {}", level),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Normality
// ---------------------------------------------------------------------------

/// Jarque-Bera statistic `n/6 (S^2 + (K-3)^2/4)` and its chi-squared(2)
/// p-value.
pub fn jarque_bera(returns: &[f64]) -> RiskKitResult<(f64, f64)> {
    let s = skewness(returns)?;
    let k = kurtosis(returns)?;
    let n = returns.len() as f64;
    let statistic = n / 6.0 * (s.powi(2) + (k - 3.0).powi(2) / 4.0);
    let chi2 = ChiSquared::new(2.0).map_err(|e| RiskKitError::Numerical(e.to_string()))?;
    Ok((statistic, chi2.sf(statistic)))
}

/// True when Jarque-Bera does not reject normality at p-value `level`.
pub fn is_normal(returns: &[f64], level: f64) -> RiskKitResult<bool> {
    if !(level > 0.0 && level < 1.0) {
        return Err(RiskKitError::invalid(
            "level",
            format!("p-value threshold must lie strictly between 0 and 1, got {}", level),
        ));
    }
    let (_, p_value) = jarque_bera(returns)?;
    Ok(p_value > level)
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// Every risk-kit statistic for one return series.
pub fn summary_stats(
    input: &RiskSummaryInput,
) -> RiskKitResult<ComputationOutput<RiskSummaryOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let r = &input.returns;
    require_non_empty(r, 2)?;
    check_level(input.level)?;

    let (jb, jb_p) = jarque_bera(r)?;
    let normal = is_normal(r, input.normality_level)?;
    let sharpe = match sharpe_ratio(r, input.risk_free_rate, input.periods_per_year) {
        Ok(s) => Some(s),
        Err(RiskKitError::Numerical(_)) => None,
        Err(e) => return Err(e),
    };
    let dates = if input.dates.is_empty() {
        None
    } else {
        Some(input.dates.as_slice())
    };
    let dd = drawdown(r, dates, DEFAULT_START_VALUE)?;

    let output = RiskSummaryOutput {
        n_observations: r.len(),
        annualized_return: annualize_rets(r, input.periods_per_year)?,
        annualized_volatility: annualize_vol(r, input.periods_per_year)?,
        sharpe_ratio: sharpe,
        skewness: skewness(r)?,
        kurtosis: kurtosis(r)?,
        semideviation: semideviation(r)?,
        var_historic: var_historic(r, input.level)?,
        cvar_historic: cvar_historic(r, input.level)?,
        var_gaussian: var_gaussian(r, input.level, false)?,
        var_cornish_fisher: var_gaussian(r, input.level, true)?,
        jarque_bera: jb,
        jarque_bera_p_value: jb_p,
        is_normal: normal,
        drawdown: dd.summary,
    };

    if r.len() < MIN_OBS_FOR_NORMALITY {
        warnings.push(format!(
            "Only {} observations: Jarque-Bera p-value is unreliable",
            r.len()
        ));
    }
    if !output.is_normal {
        warnings.push(format!(
            "Normality rejected at {:.2}% (JB = {:.2}); Gaussian VaR understates tail risk",
            input.normality_level * 100.0,
            jb
        ));
    }
    if output.kurtosis > 3.0 && output.var_cornish_fisher > output.var_gaussian {
        warnings.push(format!(
            "Fat tails: kurtosis {:.2}, Cornish-Fisher VaR {:.4} exceeds Gaussian VaR {:.4}",
            output.kurtosis, output.var_cornish_fisher, output.var_gaussian
        ));
    }
    if output.drawdown.max_drawdown < -0.20 {
        warnings.push(format!(
            "Severe drawdown: {:.2}%",
            output.drawdown.max_drawdown * 100.0
        ));
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Return-series risk summary (historic, Gaussian and Cornish-Fisher VaR)",
        &serde_json::json!({
            "level_pct": input.level,
            "periods_per_year": input.periods_per_year,
            "risk_free_rate": input.risk_free_rate,
            "normality_level": input.normality_level,
            "volatility": "sample (ddof=1) for annualisation, population for moments and VaR",
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
