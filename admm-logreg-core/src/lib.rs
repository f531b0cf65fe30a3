//! admm-logreg-core
//!
//! Consensus ADMM for regularized logistic regression over partitioned data.
//! Each outer iteration solves one smooth local subproblem per partition in
//! parallel, reduces the results into a global consensus vector, and updates
//! the per-partition scaled duals.
//!
//! # Functionality
//!
//! - Numerically stable logistic loss and gradient
//! - Warm-started L-BFGS local solves
//! - L2 (ridge) and L1 (soft threshold) consensus steps
//! - Tokio, sequential or rayon execution of the partition map
//! - Optional residual-based early stopping
//! - Timing, logging and compressed dataset storage
//!
//! # Features
//!
//! - `rayon` - Run the x-update on a dedicated rayon pool
//!
//! # Example
//!
//! ```rust,no_run
//! use admm_logreg_core::{train, state::LabeledPoint, subproblem::Partitions};
//!
//! # async fn example() -> Result<(), admm_logreg_core::utils::AdmmError> {
//! let points = vec![
//!     LabeledPoint::from_slice(1.0, &[1.0, 2.0]),
//!     LabeledPoint::from_slice(0.0, &[-1.0, -2.0]),
//! ];
//! let partitions = Partitions::from_points(points, 2)?;
//! let weights = train(&partitions, 20, 0.01, 1.0).await?;
//! # Ok(())
//! # }
//! ```

/// Limited-memory BFGS local solver
pub mod lbfgs;

/// Logistic regression model and training front end
pub mod model;

/// Local logistic objective and stable sigmoid helpers
pub mod objective;

/// ADMM configuration and solver loop
pub mod problem;

/// Resource management for stored datasets
pub mod resource;

/// Labeled points and per-partition ADMM state
pub mod state;

/// Storage backends
pub(crate) mod storage;

/// Partitioned data collection and the parallel partition map
pub mod subproblem;

/// Timing and logging utilities
pub mod timing;

/// Model-family plug-ins
pub mod updater;

/// Error type and shared helpers
pub mod utils;

pub use model::{LogisticRegressionModel, LogisticRegressionWithAdmm, train};
pub use problem::{AdmmConfig, AdmmReport, AdmmSolver};
pub use utils::AdmmError;
