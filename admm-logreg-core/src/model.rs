//! Logistic regression trained with consensus ADMM.
extern crate nalgebra as na;

use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    objective::phi,
    problem::{AdmmConfig, AdmmReport, AdmmSolver},
    state::LabeledPoint,
    subproblem::Partitions,
    timing::TimingTracker,
    updater::LogisticUpdater,
    utils::AdmmError,
};

/// A linear classifier over the learned weight vector. No intercept: fold a
/// constant feature into the points if one is needed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegressionModel {
    pub weights: na::DVector<f64>,
    /// Probability cut-off for the positive class
    pub threshold: f64,
}

impl LogisticRegressionModel {
    pub fn new(weights: na::DVector<f64>) -> Self {
        LogisticRegressionModel {
            weights,
            threshold: 0.5,
        }
    }

    pub fn margin(&self, features: &na::DVector<f64>) -> f64 {
        self.weights.dot(features)
    }

    pub fn predict_probability(&self, features: &na::DVector<f64>) -> f64 {
        phi(self.margin(features))
    }

    /// Predicted class label, 0 or 1.
    pub fn predict(&self, features: &na::DVector<f64>) -> f64 {
        if self.predict_probability(features) > self.threshold {
            1.0
        } else {
            0.0
        }
    }

    /// Fraction of `points` classified correctly. `0.0` for an empty slice.
    pub fn accuracy(&self, points: &[LabeledPoint]) -> f64 {
        if points.is_empty() {
            return 0.0;
        }
        let correct = points
            .iter()
            .filter(|p| self.predict(&p.features) == p.label)
            .count();
        correct as f64 / points.len() as f64
    }
}

/// Training front end: validates the configuration, builds the logistic
/// updater and runs the ADMM solver.
pub struct LogisticRegressionWithAdmm {
    config: AdmmConfig,
    timing: Option<TimingTracker>,
}

impl LogisticRegressionWithAdmm {
    pub fn new(config: AdmmConfig) -> Self {
        LogisticRegressionWithAdmm {
            config,
            timing: None,
        }
    }

    pub fn config(&self) -> &AdmmConfig {
        &self.config
    }

    /// Timings of the most recent run.
    pub fn timing(&self) -> Option<&TimingTracker> {
        self.timing.as_ref()
    }

    /// Builds the solver for the current configuration.
    pub fn solver(&self) -> Result<AdmmSolver<LogisticUpdater>, AdmmError> {
        self.config.validate()?;
        let updater = LogisticUpdater::new(
            self.config.lambda,
            self.config.rho,
            self.config.regularization,
            self.config.lbfgs_config(),
        );
        Ok(AdmmSolver::new(updater, self.config.num_iterations)
            .with_execution_mode(self.config.execution_mode)
            .with_stopping_criteria(self.config.stopping))
    }

    /// Trains from `initial_weights`. Pass `None` to start from zeros.
    pub async fn run(
        &mut self,
        partitions: &Partitions,
        initial_weights: Option<na::DVector<f64>>,
    ) -> Result<(LogisticRegressionModel, AdmmReport), AdmmError> {
        let mut solver = self.solver()?;
        let initial = match initial_weights {
            Some(weights) => weights,
            None => na::DVector::zeros(partitions.num_features().unwrap_or(0)),
        };
        let solution = solver.solve(partitions, &initial).await?;
        info!(
            "[LogisticRegressionWithAdmm] finished after {} iterations",
            solution.report.iterations_run
        );
        self.timing = Some(std::mem::take(solver.timing_tracker_mut()));
        Ok((LogisticRegressionModel::new(solution.weights), solution.report))
    }
}

/// Trains an L2-regularized logistic regression with default inner-solver
/// settings and returns the consensus weight vector.
///
/// Labels must be 0 or 1. Errors are reported before any iteration runs.
pub async fn train(
    partitions: &Partitions,
    num_iterations: usize,
    lambda: f64,
    rho: f64,
) -> Result<na::DVector<f64>, AdmmError> {
    let mut trainer = LogisticRegressionWithAdmm::new(AdmmConfig::new(num_iterations, lambda, rho));
    let (model, _) = trainer.run(partitions, None).await?;
    Ok(model.weights)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicts_by_sign_of_margin() {
        let model = LogisticRegressionModel::new(na::DVector::from_vec(vec![1.0, -1.0]));
        assert_eq!(model.predict(&na::DVector::from_vec(vec![2.0, 1.0])), 1.0);
        assert_eq!(model.predict(&na::DVector::from_vec(vec![1.0, 2.0])), 0.0);
        assert_eq!(model.predict_probability(&na::DVector::from_vec(vec![1.0, 1.0])), 0.5);
    }

    #[test]
    fn accuracy_counts_matching_labels() {
        let model = LogisticRegressionModel::new(na::DVector::from_vec(vec![1.0]));
        let points = [
            LabeledPoint::from_slice(1.0, &[2.0]),
            LabeledPoint::from_slice(0.0, &[-2.0]),
            LabeledPoint::from_slice(1.0, &[-1.0]),
            LabeledPoint::from_slice(0.0, &[3.0]),
        ];
        assert_eq!(model.accuracy(&points), 0.5);
        assert_eq!(model.accuracy(&[]), 0.0);
    }

    #[tokio::test]
    async fn invalid_rho_fails_before_training() {
        let partitions = Partitions::new(vec![vec![LabeledPoint::from_slice(1.0, &[1.0])]]);
        let err = train(&partitions, 10, 0.1, 0.0).await.unwrap_err();
        assert!(matches!(err, AdmmError::InvalidParameter { name: "rho", .. }));
    }

    #[tokio::test]
    async fn run_keeps_timings_of_the_last_run() {
        let partitions = Partitions::new(vec![vec![
            LabeledPoint::from_slice(1.0, &[1.0]),
            LabeledPoint::from_slice(0.0, &[-1.0]),
        ]]);
        let mut trainer = LogisticRegressionWithAdmm::new(AdmmConfig::new(3, 0.1, 1.0));
        assert!(trainer.timing().is_none());
        trainer.run(&partitions, None).await.unwrap();
        assert_eq!(trainer.timing().unwrap().partition_timings().len(), 3);
    }
}
