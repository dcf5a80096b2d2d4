use clap::Args;
use serde_json::Value;

use riskkit_core::efficient_frontier::portfolios::{GmvInput, MinVolInput, MsrInput};
use riskkit_core::efficient_frontier::{
    build_efficient_frontier, solve_gmv, solve_min_vol, solve_msr, EfficientFrontierInput,
    FrontierFailurePolicy,
};

use crate::input;

/// Arguments for the minimum-volatility portfolio
#[derive(Args)]
pub struct MinVolArgs {
    /// Path to JSON input file (expected_returns, covariance, target_return)
    #[arg(long)]
    pub input: Option<String>,

    /// Target return; overrides the value in the input file
    #[arg(long, allow_hyphen_values = true)]
    pub target_return: Option<f64>,
}

/// Arguments for the maximum Sharpe ratio portfolio
#[derive(Args)]
pub struct MsrArgs {
    /// Path to JSON input file (expected_returns, covariance, risk_free_rate)
    #[arg(long)]
    pub input: Option<String>,

    /// Risk-free rate; overrides the value in the input file
    #[arg(long, allow_hyphen_values = true)]
    pub risk_free_rate: Option<f64>,
}

/// Arguments for the global minimum variance portfolio
#[derive(Args)]
pub struct GmvArgs {
    /// Path to JSON input file (covariance; expected_returns optional)
    #[arg(long)]
    pub input: Option<String>,
}

/// Arguments for the efficient frontier
#[derive(Args)]
pub struct FrontierArgs {
    /// Path to JSON input file
    #[arg(long)]
    pub input: Option<String>,

    /// Number of frontier points; overrides the value in the input file
    #[arg(long)]
    pub points: Option<usize>,

    /// Skip targets that fail to optimise instead of aborting
    #[arg(long)]
    pub skip_failures: bool,
}

/// Raw JSON request from `--input` or stdin.
fn read_request(path: &Option<String>, what: &str) -> Result<Value, Box<dyn std::error::Error>> {
    if let Some(ref path) = path {
        input::file::read_json(path)
    } else if let Some(data) = input::stdin::read_stdin()? {
        Ok(data)
    } else {
        Err(format!("--input <file.json> or stdin required for {}", what).into())
    }
}

/// Overwrite `key` in a JSON object request with a command-line value.
fn override_field(request: &mut Value, key: &str, value: Option<f64>) {
    if let (Some(v), Some(obj)) = (value, request.as_object_mut()) {
        obj.insert(key.to_string(), Value::from(v));
    }
}

pub fn run_min_vol(args: MinVolArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut request = read_request(&args.input, "min-vol")?;
    override_field(&mut request, "target_return", args.target_return);
    let req: MinVolInput = serde_json::from_value(request)?;
    let result = solve_min_vol(&req)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_msr(args: MsrArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut request = read_request(&args.input, "msr")?;
    override_field(&mut request, "risk_free_rate", args.risk_free_rate);
    let req: MsrInput = serde_json::from_value(request)?;
    let result = solve_msr(&req)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_gmv(args: GmvArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let req: GmvInput = serde_json::from_value(read_request(&args.input, "gmv")?)?;
    let result = solve_gmv(&req)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_frontier(args: FrontierArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut req: EfficientFrontierInput =
        serde_json::from_value(read_request(&args.input, "frontier")?)?;
    if let Some(points) = args.points {
        req.n_points = points;
    }
    if args.skip_failures {
        req.failure_policy = FrontierFailurePolicy::SkipAndReport;
    }
    let result = build_efficient_frontier(&req)?;
    Ok(serde_json::to_value(result)?)
}
