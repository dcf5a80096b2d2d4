pub mod error;
pub mod portfolio;
pub mod types;

#[cfg(feature = "optimization")]
pub mod optimizer;

#[cfg(feature = "optimization")]
pub mod efficient_frontier;

#[cfg(feature = "risk_kit")]
pub mod risk_kit;

pub use error::RiskKitError;
pub use types::*;

/// Standard result type for all riskkit operations
pub type RiskKitResult<T> = Result<T, RiskKitError>;
