use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::returns::require_non_empty;
use crate::error::RiskKitError;
use crate::RiskKitResult;

/// Initial value of the wealth index.
pub const DEFAULT_START_VALUE: f64 = 1000.0;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Wealth index, running peak and drawdown for one period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrawdownRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    pub wealth: f64,
    pub peak: f64,
    /// (wealth - peak) / peak; zero or negative.
    pub drawdown: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrawdownSummary {
    /// Deepest drawdown as a negative decimal (-0.25 = 25% below peak).
    pub max_drawdown: f64,
    pub peak_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peak_date: Option<NaiveDate>,
    pub trough_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trough_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrawdownOutput {
    pub records: Vec<DrawdownRecord>,
    pub summary: DrawdownSummary,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Wealth index `start_value * cumprod(1 + r)`, its running maximum and
/// the percentage drawdown from that maximum.
///
/// The running peak starts at the first period's wealth, not at
/// `start_value`, so a loss in the first period is not a drawdown.
/// A return of -1 is a total loss (drawdown -100%); anything below is
/// rejected. `dates`, when supplied, must have one entry per return.
pub fn drawdown(
    returns: &[f64],
    dates: Option<&[NaiveDate]>,
    start_value: f64,
) -> RiskKitResult<DrawdownOutput> {
    require_non_empty(returns, 1)?;
    if !(start_value.is_finite() && start_value > 0.0) {
        return Err(RiskKitError::invalid(
            "start_value",
            "must be positive and finite",
        ));
    }
    if let Some(d) = dates {
        if d.len() != returns.len() {
            return Err(RiskKitError::shape(
                "dates",
                format!("Expected {} dates but got {}", returns.len(), d.len()),
            ));
        }
    }
    if let Some(t) = returns.iter().position(|r| r.is_nan() || *r < -1.0) {
        return Err(RiskKitError::invalid(
            "returns",
            format!("Return at period {} is below -100%", t),
        ));
    }

    let date_at = |i: usize| dates.map(|d| d[i]);
    let mut records = Vec::with_capacity(returns.len());
    let mut wealth = start_value;
    let mut peak = f64::NEG_INFINITY;
    let mut peak_index = 0;
    let mut summary = DrawdownSummary {
        max_drawdown: 0.0,
        peak_index: 0,
        peak_date: date_at(0),
        trough_index: 0,
        trough_date: date_at(0),
    };

    for (i, r) in returns.iter().enumerate() {
        wealth *= 1.0 + r;
        if wealth > peak {
            peak = wealth;
            peak_index = i;
        }
        // A total loss in the first period leaves nothing to fall from.
        let dd = if peak > 0.0 { (wealth - peak) / peak } else { 0.0 };
        if dd < summary.max_drawdown {
            summary = DrawdownSummary {
                max_drawdown: dd,
                peak_index,
                peak_date: date_at(peak_index),
                trough_index: i,
                trough_date: date_at(i),
            };
        }
        records.push(DrawdownRecord {
            date: date_at(i),
            wealth,
            peak,
            drawdown: dd,
        });
    }

    Ok(DrawdownOutput { records, summary })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
