//! Constrained minimisation of smooth portfolio objectives.
//!
//! Constraints are plain [`LinearConstraint`] records rather than closures, so
//! a problem can be serialised, inspected and tested without running the
//! solver. The solver itself is a sequential quadratic programming loop over a
//! dense dual active-set QP.

pub mod constraints;
pub mod objective;
pub(crate) mod qp;
pub mod sqp;

pub use constraints::{Bound, ConstrainedProblem, ConstraintKind, LinearConstraint};
pub use objective::{NegativeSharpeRatio, Objective, PortfolioVolatility};
pub use sqp::{minimize, OptimizationResult, SolverConfig};
