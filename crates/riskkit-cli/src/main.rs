mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::EnvFilter;

use commands::optimize::{FrontierArgs, GmvArgs, MinVolArgs, MsrArgs};
use commands::risk::{EstimateArgs, RiskSummaryArgs};

/// Long-only portfolio optimization and return-series risk analytics
#[derive(Parser)]
#[command(
    name = "riskkit",
    version,
    about = "Long-only portfolio optimization and return-series risk analytics",
    long_about = "A CLI for minimum-volatility, maximum-Sharpe and global minimum variance \
                  portfolios, efficient frontiers, and historic / parametric risk statistics \
                  of return series. Inputs are JSON (file or stdin) or CSV return tables."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Print solver diagnostics to stderr
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Minimum-volatility portfolio for a target return
    MinVol(MinVolArgs),
    /// Maximum Sharpe ratio portfolio
    Msr(MsrArgs),
    /// Global minimum variance portfolio
    Gmv(GmvArgs),
    /// Efficient frontier with optional EW / GMV / MSR / CML overlays
    Frontier(FrontierArgs),
    /// Risk statistics (VaR, CVaR, moments, drawdown) for one return series
    RiskSummary(RiskSummaryArgs),
    /// Estimate expected returns and covariance from a CSV of returns
    Estimate(EstimateArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_tracing(verbose: bool) {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) if verbose => EnvFilter::new("riskkit_core=debug,riskkit_cli=debug"),
        Err(_) => return,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::MinVol(args) => commands::optimize::run_min_vol(args),
        Commands::Msr(args) => commands::optimize::run_msr(args),
        Commands::Gmv(args) => commands::optimize::run_gmv(args),
        Commands::Frontier(args) => commands::optimize::run_frontier(args),
        Commands::RiskSummary(args) => commands::risk::run_risk_summary(args),
        Commands::Estimate(args) => commands::risk::run_estimate(args),
        Commands::Version => {
            println!("riskkit {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
