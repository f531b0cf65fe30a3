extern crate nalgebra as na;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::lbfgs::{LbfgsConfig, minimize};
use crate::objective::LogisticObjective;
use crate::state::PartitionState;
use crate::utils::{AdmmError, ensure_positive};

/// Model-family plug-in for the ADMM driver.
///
/// An updater supplies the local x-update and the global z-update. The
/// driver is generic over this trait and never inspects which model or
/// regularizer is active. The dual update has a default implementation
/// shared by every consensus formulation.
pub trait Updater: Send + Sync + 'static {
    /// Variant-specific per-partition state. `()` when not needed.
    type Extension: Clone + Default + Send + Sync + 'static;

    /// Solves the local subproblem of one partition and returns its new `x`.
    ///
    /// Must not touch `z`, `u` or the points. Warm-starts from `state.x`.
    fn x_update(&self, state: &PartitionState<Self::Extension>) -> na::DVector<f64>;

    /// Reduces every partition's `(x, u)` into the next consensus vector.
    fn z_update(&self, states: &[PartitionState<Self::Extension>]) -> na::DVector<f64>;

    /// Scaled dual ascent `u += x - z`. A no-op when `x == z`.
    fn dual_update(&self, state: &mut PartitionState<Self::Extension>) {
        let gap = &state.x - &state.z;
        state.u += gap;
    }

    /// ADMM penalty parameter, used for residual bookkeeping.
    fn rho(&self) -> f64;

    /// Rejects settings the updates cannot run with. Called by the driver
    /// before the first iteration.
    fn validate(&self) -> Result<(), AdmmError> {
        ensure_positive("rho", self.rho())
    }
}

/// Regularizer applied in the consensus step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Regularization {
    /// `λ/2 ‖z‖²`, ridge shrinkage of the averaged iterate
    #[default]
    L2,
    /// `λ ‖z‖₁`, soft thresholding of the averaged iterate
    L1,
}

/// Logistic regression updater.
///
/// x-update: L-BFGS on the augmented logistic objective of the partition.
/// z-update: closed-form proximal step of the configured regularizer.
#[derive(Clone, Debug)]
pub struct LogisticUpdater {
    pub lambda: f64,
    pub rho: f64,
    pub regularization: Regularization,
    pub lbfgs: LbfgsConfig,
}

impl LogisticUpdater {
    pub fn new(lambda: f64, rho: f64, regularization: Regularization, lbfgs: LbfgsConfig) -> Self {
        LogisticUpdater {
            lambda,
            rho,
            regularization,
            lbfgs,
        }
    }
}

impl Updater for LogisticUpdater {
    type Extension = ();

    fn x_update(&self, state: &PartitionState) -> na::DVector<f64> {
        let objective = LogisticObjective::new(&state.points, &state.z, &state.u, self.rho);
        let result = minimize(&objective, &state.x, &self.lbfgs);
        debug!(
            "[LogisticUpdater] partition {}: {} steps, objective {:.6e}, converged {}",
            state.id, result.iterations, result.value, result.converged
        );
        result.x
    }

    fn z_update(&self, states: &[PartitionState]) -> na::DVector<f64> {
        let sum = sum_x_plus_u(states);
        let n_partitions = states.len() as f64;
        match self.regularization {
            Regularization::L2 => sum * (self.rho / (self.lambda + self.rho * n_partitions)),
            Regularization::L1 => {
                let threshold = self.lambda / (self.rho * n_partitions);
                soft_threshold(&(sum / n_partitions), threshold)
            }
        }
    }

    fn rho(&self) -> f64 {
        self.rho
    }

    fn validate(&self) -> Result<(), AdmmError> {
        ensure_positive("lambda", self.lambda)?;
        ensure_positive("rho", self.rho)?;
        self.lbfgs.validate()
    }
}

/// `Σ_p (x_p + u_p)`, folded in partition order so results are reproducible.
pub fn sum_x_plus_u<E>(states: &[PartitionState<E>]) -> na::DVector<f64> {
    let dim = states.first().map_or(0, |s| s.dim());
    states.iter().fold(na::DVector::zeros(dim), |mut acc, s| {
        acc += &s.x;
        acc += &s.u;
        acc
    })
}

/// Soft thresholding operation for L1 regularization.
/// Computes sign(v) * max(|v| - threshold, 0) component-wise.
pub fn soft_threshold(v: &na::DVector<f64>, threshold: f64) -> na::DVector<f64> {
    v.map(|x| x.signum() * (x.abs() - threshold).max(0.0))
}
