use clap::Args;
use serde_json::Value;
use tracing::debug;

use riskkit_core::risk_kit::returns::estimate_market_inputs;
use riskkit_core::risk_kit::{summary_stats, ReturnFrequency, ReturnsTable, RiskSummaryInput};

use crate::input;
use crate::input::returns_csv::parse_returns_csv;

/// Arguments for return-series risk statistics
#[derive(Args)]
pub struct RiskSummaryArgs {
    /// Path to JSON (RiskSummaryInput) or CSV (period, returns...) file
    #[arg(long)]
    pub input: Option<String>,

    /// CSV column to analyse when the file has several
    #[arg(long)]
    pub column: Option<String>,

    /// VaR / CVaR level in percent (e.g. 5 for the worst 5% of periods)
    #[arg(long)]
    pub level: Option<f64>,

    /// Return frequency for annualisation: daily, weekly, monthly, quarterly, annual
    #[arg(long)]
    pub frequency: Option<String>,

    /// Risk-free rate (annualised)
    #[arg(long, allow_hyphen_values = true)]
    pub risk_free_rate: Option<f64>,

    /// CSV values are percentages (5.0 = 5%)
    #[arg(long)]
    pub percent: bool,
}

/// Arguments for expected return / covariance estimation
#[derive(Args)]
pub struct EstimateArgs {
    /// Path to CSV file of periodic returns, one column per asset
    #[arg(long)]
    pub input: Option<String>,

    /// Return frequency for annualisation: daily, weekly, monthly, quarterly, annual
    #[arg(long, default_value = "monthly")]
    pub frequency: String,

    /// CSV values are percentages (5.0 = 5%)
    #[arg(long)]
    pub percent: bool,

    /// Keep the covariance per period instead of annualising it
    #[arg(long)]
    pub per_period_covariance: bool,
}

enum Source {
    Json(Value),
    Csv(String),
}

fn read_source(path: &Option<String>) -> Result<Source, Box<dyn std::error::Error>> {
    if let Some(ref path) = path {
        let (_, text) = input::file::read_text(path)?;
        if input::file::is_csv(path) {
            return Ok(Source::Csv(text));
        }
        return Ok(Source::Json(serde_json::from_str(&text)?));
    }
    match input::stdin::read_stdin_text()? {
        Some(text) if text.trim_start().starts_with(['{', '[']) => {
            Ok(Source::Json(serde_json::from_str(&text)?))
        }
        Some(text) => Ok(Source::Csv(text)),
        None => Err("--input <file> or piped JSON/CSV on stdin required".into()),
    }
}

fn pick_column(
    table: &ReturnsTable,
    column: &Option<String>,
) -> Result<usize, Box<dyn std::error::Error>> {
    match column {
        Some(name) => table
            .asset_names
            .iter()
            .position(|a| a == name)
            .ok_or_else(|| {
                format!(
                    "Column '{}' not found; available: {}",
                    name,
                    table.asset_names.join(", ")
                )
                .into()
            }),
        None if table.asset_names.len() == 1 => Ok(0),
        None => Err(format!(
            "CSV has {} return columns; choose one with --column ({})",
            table.asset_names.len(),
            table.asset_names.join(", ")
        )
        .into()),
    }
}

pub fn run_risk_summary(args: RiskSummaryArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut req: RiskSummaryInput = match read_source(&args.input)? {
        Source::Json(data) => {
            // A bare array is accepted as the return series.
            if data.is_array() {
                RiskSummaryInput::from_returns(serde_json::from_value(data)?)
            } else {
                serde_json::from_value(data)?
            }
        }
        Source::Csv(text) => {
            let table = parse_returns_csv(&text, args.percent)?;
            let j = pick_column(&table, &args.column)?;
            debug!(column = %table.asset_names[j], "risk summary for csv column");
            RiskSummaryInput {
                dates: table.dates.clone(),
                ..RiskSummaryInput::from_returns(table.column(j))
            }
        }
    };

    if let Some(level) = args.level {
        req.level = level;
    }
    if let Some(ref freq) = args.frequency {
        req.periods_per_year = freq.parse::<ReturnFrequency>()?.periods_per_year();
    }
    if let Some(rf) = args.risk_free_rate {
        req.risk_free_rate = rf;
    }

    let result = summary_stats(&req)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_estimate(args: EstimateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let text = match read_source(&args.input)? {
        Source::Csv(text) => text,
        Source::Json(_) => return Err("estimate expects CSV returns, not JSON".into()),
    };
    let table = parse_returns_csv(&text, args.percent)?;
    let frequency: ReturnFrequency = args.frequency.parse()?;
    let market = estimate_market_inputs(
        &table,
        frequency.periods_per_year(),
        !args.per_period_covariance,
    )?;
    Ok(serde_json::to_value(market)?)
}
