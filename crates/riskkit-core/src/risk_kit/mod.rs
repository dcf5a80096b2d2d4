//! Return-series statistics used to feed and judge the optimizers:
//! annualisation and covariance estimation, drawdowns, and tail risk.

pub mod drawdown;
pub mod returns;
pub mod tail_risk;

pub use drawdown::{drawdown, DrawdownOutput};
pub use returns::{estimate_market_inputs, ReturnFrequency, ReturnsTable};
pub use tail_risk::{summary_stats, RiskSummaryInput, RiskSummaryOutput};
