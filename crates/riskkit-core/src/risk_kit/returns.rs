use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::RiskKitError;
use crate::portfolio::metrics::MarketInputs;
use crate::types::{CovarianceMatrix, Rate};
use crate::RiskKitResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Frequency of return observations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnFrequency {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Annual,
}

impl ReturnFrequency {
    /// Number of periods in a year for annualisation
    pub fn periods_per_year(&self) -> f64 {
        match self {
            ReturnFrequency::Daily => 252.0,
            ReturnFrequency::Weekly => 52.0,
            ReturnFrequency::Monthly => 12.0,
            ReturnFrequency::Quarterly => 4.0,
            ReturnFrequency::Annual => 1.0,
        }
    }
}

impl FromStr for ReturnFrequency {
    type Err = RiskKitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "daily" | "d" => Ok(ReturnFrequency::Daily),
            "weekly" | "w" => Ok(ReturnFrequency::Weekly),
            "monthly" | "m" => Ok(ReturnFrequency::Monthly),
            "quarterly" | "q" => Ok(ReturnFrequency::Quarterly),
            "annual" | "yearly" | "a" | "y" => Ok(ReturnFrequency::Annual),
            other => Err(RiskKitError::invalid(
                "frequency",
                format!("Unknown return frequency '{}'", other),
            )),
        }
    }
}

/// Periodic returns for several assets, one row per period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnsTable {
    pub asset_names: Vec<String>,
    /// Period labels; empty when the source had none.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dates: Vec<NaiveDate>,
    /// `rows[t][j]` is the return of asset `j` in period `t`, as a decimal.
    pub rows: Vec<Vec<f64>>,
}

impl ReturnsTable {
    /// Check the table is rectangular and finite; returns (periods, assets).
    pub fn validate(&self) -> RiskKitResult<(usize, usize)> {
        let n_assets = self.asset_names.len();
        if n_assets == 0 {
            return Err(RiskKitError::InsufficientData(
                "Returns table has no assets".into(),
            ));
        }
        if self.rows.len() < 2 {
            return Err(RiskKitError::InsufficientData(
                "At least 2 return observations required".into(),
            ));
        }
        if !self.dates.is_empty() && self.dates.len() != self.rows.len() {
            return Err(RiskKitError::shape(
                "dates",
                format!("Expected {} dates but got {}", self.rows.len(), self.dates.len()),
            ));
        }
        for (t, row) in self.rows.iter().enumerate() {
            if row.len() != n_assets {
                return Err(RiskKitError::shape(
                    "rows",
                    format!("Row {} has {} values but there are {} assets", t, row.len(), n_assets),
                ));
            }
            if row.iter().any(|r| !r.is_finite()) {
                return Err(RiskKitError::invalid(
                    "rows",
                    format!("Row {} contains a non-finite return", t),
                ));
            }
        }
        Ok((self.rows.len(), n_assets))
    }

    /// Returns of asset `j` across all periods.
    pub fn column(&self, j: usize) -> Vec<f64> {
        self.rows.iter().map(|row| row[j]).collect()
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Compounded annual growth: `prod(1 + r)^(ppy / n) - 1`.
pub fn annualize_rets(returns: &[f64], periods_per_year: f64) -> RiskKitResult<Rate> {
    require_non_empty(returns, 1)?;
    check_periods(periods_per_year)?;
    let growth: f64 = returns.iter().map(|r| 1.0 + r).product();
    if growth < 0.0 {
        return Err(RiskKitError::Numerical(format!(
            "Compounded growth {:.6} is negative and cannot be annualised",
            growth
        )));
    }
    Ok(growth.powf(periods_per_year / returns.len() as f64) - 1.0)
}

/// Sample standard deviation (ddof = 1) scaled by `sqrt(ppy)`.
pub fn annualize_vol(returns: &[f64], periods_per_year: f64) -> RiskKitResult<Rate> {
    require_non_empty(returns, 2)?;
    check_periods(periods_per_year)?;
    Ok(std_dev(returns, 1) * periods_per_year.sqrt())
}

/// Annualised Sharpe ratio. The annual risk-free rate is converted to a
/// per-period compounded rate before computing excess returns.
pub fn sharpe_ratio(returns: &[f64], riskfree_rate: Rate, periods_per_year: f64) -> RiskKitResult<f64> {
    let ann_vol = annualize_vol(returns, periods_per_year)?;
    if ann_vol == 0.0 {
        return Err(RiskKitError::Numerical(
            "Sharpe ratio undefined for a series with zero volatility".into(),
        ));
    }
    let rf_per_period = (1.0 + riskfree_rate).powf(1.0 / periods_per_year) - 1.0;
    let excess: Vec<f64> = returns.iter().map(|r| r - rf_per_period).collect();
    Ok(annualize_rets(&excess, periods_per_year)? / ann_vol)
}

/// Sample covariance (ddof = 1) of equally long return columns.
pub fn sample_covariance(columns: &[Vec<f64>]) -> RiskKitResult<CovarianceMatrix> {
    let Some(first) = columns.first() else {
        return Err(RiskKitError::InsufficientData("No return columns".into()));
    };
    let len = first.len();
    if let Some((j, col)) = columns.iter().enumerate().find(|(_, c)| c.len() != len) {
        return Err(RiskKitError::shape(
            "columns",
            format!("Column {} has {} observations, expected {}", j, col.len(), len),
        ));
    }
    for col in columns {
        require_non_empty(col, 2)?;
    }

    let means: Vec<f64> = columns.iter().map(|c| mean(c)).collect();
    let denom = (len - 1) as f64;
    let n = columns.len();
    let mut cov = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in i..n {
            let c: f64 = columns[i]
                .iter()
                .zip(columns[j].iter())
                .map(|(a, b)| (a - means[i]) * (b - means[j]))
                .sum::<f64>()
                / denom;
            cov[i][j] = c;
            cov[j][i] = c;
        }
    }
    Ok(cov)
}

/// Annualised expected returns and covariance for every asset in `table`.
///
/// The covariance is scaled by `periods_per_year` only when
/// `annualize_covariance` is set, so it can be paired with per-period
/// expected returns if the caller prefers.
pub fn estimate_market_inputs(
    table: &ReturnsTable,
    periods_per_year: f64,
    annualize_covariance: bool,
) -> RiskKitResult<MarketInputs> {
    let (_, n_assets) = table.validate()?;
    check_periods(periods_per_year)?;

    let columns: Vec<Vec<f64>> = (0..n_assets).map(|j| table.column(j)).collect();
    let expected_returns = columns
        .iter()
        .map(|c| annualize_rets(c, periods_per_year))
        .collect::<RiskKitResult<Vec<f64>>>()?;

    let mut covariance = sample_covariance(&columns)?;
    if annualize_covariance {
        for row in covariance.iter_mut() {
            for c in row.iter_mut() {
                *c *= periods_per_year;
            }
        }
    }

    Ok(MarketInputs {
        asset_names: table.asset_names.clone(),
        expected_returns,
        covariance,
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(crate) fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Standard deviation with `ddof` delta degrees of freedom.
pub(crate) fn std_dev(values: &[f64], ddof: usize) -> f64 {
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    (ss / (values.len() - ddof) as f64).sqrt()
}

pub(crate) fn require_non_empty(values: &[f64], min_len: usize) -> RiskKitResult<()> {
    if values.len() < min_len {
        return Err(RiskKitError::InsufficientData(format!(
            "At least {} return observation(s) required, got {}",
            min_len,
            values.len()
        )));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(RiskKitError::invalid("returns", "contains a non-finite value"));
    }
    Ok(())
}

fn check_periods(periods_per_year: f64) -> RiskKitResult<()> {
    if !(periods_per_year.is_finite() && periods_per_year > 0.0) {
        return Err(RiskKitError::invalid(
            "periods_per_year",
            "must be positive and finite",
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
