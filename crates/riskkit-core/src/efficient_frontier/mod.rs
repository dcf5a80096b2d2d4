//! Minimum-volatility, maximum-Sharpe and efficient-frontier solvers built on
//! [`crate::optimizer`].
//!
//! All solvers are long-only and fully invested: every weight lies in [0, 1]
//! and the weights sum to one. The global minimum variance portfolio is not a
//! separate routine; [`max_sharpe::gmv`] calls [`max_sharpe::msr`] with a zero
//! risk-free rate and a flat expected-return vector, which turns the Sharpe
//! objective into `-1 / volatility`.

pub mod analysis;
pub mod frontier;
pub mod max_sharpe;
pub mod min_vol;
pub mod portfolios;

pub use analysis::{
    build_efficient_frontier, describe_portfolio, two_asset_frontier, EfficientFrontierInput,
    PortfolioPoint,
};
pub use frontier::{efficient_frontier, optimal_weights, FrontierFailurePolicy, FrontierPoint};
pub use max_sharpe::{gmv, msr};
pub use min_vol::minimize_vol;
pub use portfolios::{solve_gmv, solve_min_vol, solve_msr, PortfolioSolution};
