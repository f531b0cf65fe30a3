extern crate nalgebra as na;

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{
    lbfgs::LbfgsConfig,
    state::{PartitionState, validate_points},
    subproblem::{ExecutionMode, Partitions, map_partitions},
    timing::{TimingTracker, time_async_fn, time_fn},
    updater::{Regularization, Updater},
    utils::{AdmmError, ensure_positive},
};

/// Configuration settings for ADMM training.
///
/// Field names serialize in camelCase, so a JSON config uses the familiar
/// option names:
///
/// ```rust
/// # use admm_logreg_core::problem::AdmmConfig;
/// let config = AdmmConfig::from_json_str(r#"{
///     "numIterations": 50,
///     "lambda": 0.1,
///     "rho": 1.0,
///     "lbfgsMaxNumIterations": 10
/// }"#).unwrap();
/// assert_eq!(config.num_iterations, 50);
/// assert_eq!(config.lbfgs_history, 10);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdmmConfig {
    /// Number of outer ADMM iterations
    pub num_iterations: usize,
    /// Regularization strength
    pub lambda: f64,
    /// ADMM penalty parameter
    pub rho: f64,
    /// Inner solver iteration cap
    pub lbfgs_max_num_iterations: usize,
    /// Inner solver memory size
    pub lbfgs_history: usize,
    /// Inner solver stopping tolerance
    pub lbfgs_tolerance: f64,
    /// Regularizer used by the consensus step
    pub regularization: Regularization,
    /// How the x-update map is executed
    pub execution_mode: ExecutionMode,
    /// Residual-based early stopping. `None` runs exactly `num_iterations`.
    pub stopping: Option<StoppingCriteria>,
}

impl Default for AdmmConfig {
    fn default() -> Self {
        let lbfgs = LbfgsConfig::default();
        AdmmConfig {
            num_iterations: 20,
            lambda: 0.01,
            rho: 1.0,
            lbfgs_max_num_iterations: lbfgs.max_iterations,
            lbfgs_history: lbfgs.history,
            lbfgs_tolerance: lbfgs.tolerance,
            regularization: Regularization::default(),
            execution_mode: ExecutionMode::default(),
            stopping: None,
        }
    }
}

impl AdmmConfig {
    pub fn new(num_iterations: usize, lambda: f64, rho: f64) -> Self {
        AdmmConfig {
            num_iterations,
            lambda,
            rho,
            ..AdmmConfig::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, AdmmError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, AdmmError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn with_regularization(mut self, regularization: Regularization) -> Self {
        self.regularization = regularization;
        self
    }

    pub fn with_execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = mode;
        self
    }

    pub fn with_lbfgs(mut self, max_iterations: usize, history: usize, tolerance: f64) -> Self {
        self.lbfgs_max_num_iterations = max_iterations;
        self.lbfgs_history = history;
        self.lbfgs_tolerance = tolerance;
        self
    }

    pub fn with_stopping(mut self, stopping: StoppingCriteria) -> Self {
        self.stopping = Some(stopping);
        self
    }

    pub fn lbfgs_config(&self) -> LbfgsConfig {
        LbfgsConfig {
            max_iterations: self.lbfgs_max_num_iterations,
            history: self.lbfgs_history,
            tolerance: self.lbfgs_tolerance,
        }
    }

    /// Rejects non-positive `rho`/`lambda` and invalid solver settings.
    pub fn validate(&self) -> Result<(), AdmmError> {
        ensure_positive("rho", self.rho)?;
        ensure_positive("lambda", self.lambda)?;
        self.lbfgs_config().validate()?;
        if let Some(stopping) = &self.stopping {
            stopping.validate()?;
        }
        Ok(())
    }
}

/// Primal/dual residual tolerances for optional early stopping.
///
/// Uses the absolute/relative test of Boyd et al., "Distributed Optimization
/// and Statistical Learning via ADMM", section 3.3.1.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoppingCriteria {
    pub abs_tolerance: f64,
    pub rel_tolerance: f64,
}

impl Default for StoppingCriteria {
    fn default() -> Self {
        StoppingCriteria {
            abs_tolerance: 1e-4,
            rel_tolerance: 1e-3,
        }
    }
}

impl StoppingCriteria {
    pub fn validate(&self) -> Result<(), AdmmError> {
        ensure_positive("absTolerance", self.abs_tolerance)?;
        ensure_positive("relTolerance", self.rel_tolerance)
    }

    fn is_satisfied(&self, record: &IterationRecord) -> bool {
        let scale = record.num_variables.sqrt() * self.abs_tolerance;
        let eps_primal = scale + self.rel_tolerance * record.primal_scale;
        let eps_dual = scale + self.rel_tolerance * record.dual_scale;
        record.primal_residual <= eps_primal && record.dual_residual <= eps_dual
    }
}

/// Residual bookkeeping for one outer iteration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// Zero-based outer iteration
    pub iteration: usize,
    /// `sqrt(Σ_p ‖x_p - z‖²)`
    pub primal_residual: f64,
    /// `ρ sqrt(P) ‖z - z_prev‖`
    pub dual_residual: f64,
    /// `‖z‖`
    pub consensus_norm: f64,
    /// `max(sqrt(Σ_p ‖x_p‖²), sqrt(P) ‖z‖)`
    primal_scale: f64,
    /// `ρ sqrt(Σ_p ‖u_p‖²)`
    dual_scale: f64,
    /// `P · n`, as a float
    num_variables: f64,
}

impl IterationRecord {
    fn compute<E>(
        iteration: usize,
        states: &[PartitionState<E>],
        z: &na::DVector<f64>,
        z_prev: &na::DVector<f64>,
        rho: f64,
    ) -> Self {
        let n_partitions = states.len() as f64;
        let primal_sq: f64 = states.iter().map(PartitionState::primal_gap_squared).sum();
        let x_sq: f64 = states.iter().map(|s| s.x.norm_squared()).sum();
        let u_sq: f64 = states.iter().map(|s| s.u.norm_squared()).sum();
        let consensus_norm = z.norm();

        IterationRecord {
            iteration,
            primal_residual: primal_sq.sqrt(),
            dual_residual: rho * n_partitions.sqrt() * (z - z_prev).norm(),
            consensus_norm,
            primal_scale: x_sq.sqrt().max(n_partitions.sqrt() * consensus_norm),
            dual_scale: rho * u_sq.sqrt(),
            num_variables: n_partitions * z.len() as f64,
        }
    }
}

/// Summary of an ADMM run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AdmmReport {
    /// Outer iterations actually executed
    pub iterations_run: usize,
    /// Whether the residual test ended the run before the iteration budget
    pub stopped_early: bool,
    /// One record per executed iteration
    pub history: Vec<IterationRecord>,
}

/// Final consensus vector plus run report.
#[derive(Clone, Debug)]
pub struct AdmmSolution {
    pub weights: na::DVector<f64>,
    pub report: AdmmReport,
}

/// ADMM solver that orchestrates the outer iterations.
///
/// Each iteration runs the x-update on every partition through
/// [`map_partitions`] (the join is the barrier), reduces the snapshot with
/// the z-update, broadcasts the new consensus vector, then applies the dual
/// update locally. The solver is generic over [`Updater`] and never looks at
/// which model family it drives.
///
/// # Example
///
/// ```rust,no_run
/// # use admm_logreg_core::problem::AdmmSolver;
/// # use admm_logreg_core::updater::{LogisticUpdater, Regularization};
/// # use admm_logreg_core::lbfgs::LbfgsConfig;
/// # use admm_logreg_core::subproblem::Partitions;
/// # async fn example(partitions: Partitions) -> Result<(), admm_logreg_core::utils::AdmmError> {
/// let updater = LogisticUpdater::new(0.01, 1.0, Regularization::L2, LbfgsConfig::default());
/// let mut solver = AdmmSolver::new(updater, 100);
/// let initial = nalgebra::DVector::zeros(partitions.num_features().unwrap_or(0));
/// let solution = solver.solve(&partitions, &initial).await?;
/// solver.print_timing_summary();
/// solver.export_all_timings("results")?;
/// # Ok(())
/// # }
/// ```
pub struct AdmmSolver<U: Updater> {
    /// Model-family plug-in, shared with the worker tasks
    updater: Arc<U>,
    /// Number of outer iterations
    max_iter: usize,
    /// Executor for the x-update map
    mode: ExecutionMode,
    /// Optional residual-based early stopping
    stopping: Option<StoppingCriteria>,
    /// Tracks timing information for performance analysis
    timing_tracker: TimingTracker,
}

impl<U: Updater> AdmmSolver<U> {
    pub fn new(updater: U, max_iter: usize) -> Self {
        AdmmSolver {
            updater: Arc::new(updater),
            max_iter,
            mode: ExecutionMode::default(),
            stopping: None,
            timing_tracker: TimingTracker::new(),
        }
    }

    pub fn with_execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_stopping_criteria(mut self, stopping: Option<StoppingCriteria>) -> Self {
        self.stopping = stopping;
        self
    }

    pub fn updater(&self) -> &U {
        &self.updater
    }

    /// Validates the input and builds one state per partition.
    ///
    /// Every check happens here, before any iteration runs.
    pub fn initialize(
        &self,
        partitions: &Partitions,
        initial: &na::DVector<f64>,
    ) -> Result<Vec<PartitionState<U::Extension>>, AdmmError> {
        if partitions.is_empty() {
            return Err(AdmmError::NoPartitions);
        }
        self.updater.validate()?;
        if let Some(stopping) = &self.stopping {
            stopping.validate()?;
        }

        let dim = initial.len();
        partitions
            .iter()
            .enumerate()
            .map(|(id, points)| {
                validate_points(id, points, dim)?;
                Ok(PartitionState::new(id, Arc::clone(points), initial))
            })
            .collect()
    }

    /// Runs the outer loop and returns the final consensus vector.
    ///
    /// With `max_iter == 0` the initial weights are returned unchanged.
    /// Timings from a previous `solve` on this solver are discarded.
    pub async fn solve(
        &mut self,
        partitions: &Partitions,
        initial: &na::DVector<f64>,
    ) -> Result<AdmmSolution, AdmmError> {
        let mut states = self.initialize(partitions, initial)?;
        let updater = Arc::clone(&self.updater);
        let rho = updater.rho();
        let mut z = initial.clone();
        let mut report = AdmmReport::default();
        self.timing_tracker = TimingTracker::new();

        info!(
            "[AdmmSolver] {} partitions, {} points, {} features, {} iterations",
            states.len(),
            partitions.total_points(),
            initial.len(),
            self.max_iter
        );

        for i in 0..self.max_iter {
            self.timing_tracker.start_iteration(i);
            info!("[AdmmSolver] ===== Iteration: {} =====", i);

            let updated = time_async_fn(
                &mut self.timing_tracker,
                "update_x",
                Self::update_x(&updater, states, self.mode),
            )
            .await?;
            states = Vec::with_capacity(updated.len());
            for (state, elapsed) in updated {
                self.timing_tracker.record_partition(state.id, elapsed);
                states.push(state);
            }

            let z_prev = std::mem::replace(
                &mut z,
                time_fn(&mut self.timing_tracker, "update_z", || updater.z_update(&states)),
            );

            time_fn(&mut self.timing_tracker, "update_u", || {
                for state in states.iter_mut() {
                    state.broadcast(&z);
                    updater.dual_update(state);
                }
            });

            let record = time_fn(&mut self.timing_tracker, "update_residuals", || {
                IterationRecord::compute(i, &states, &z, &z_prev, rho)
            });
            info!(
                "[AdmmSolver] primal residual {:.6e}, dual residual {:.6e}, |z| {:.6e}",
                record.primal_residual, record.dual_residual, record.consensus_norm
            );

            let should_stop = self
                .stopping
                .as_ref()
                .is_some_and(|criteria| criteria.is_satisfied(&record));
            report.history.push(record);
            report.iterations_run = i + 1;
            if should_stop {
                info!("[AdmmSolver] residuals within tolerance after {} iterations", i + 1);
                report.stopped_early = true;
                break;
            }
        }

        debug!(
            "[AdmmSolver] final consensus |z| {:.6e}, {} of {} non-zero",
            z.norm(),
            z.iter().filter(|w| **w != 0.0).count(),
            z.len()
        );
        Ok(AdmmSolution { weights: z, report })
    }

    /// Parallel x-update over all partitions. Each worker also reports how
    /// long its local solve took.
    async fn update_x(
        updater: &Arc<U>,
        states: Vec<PartitionState<U::Extension>>,
        mode: ExecutionMode,
    ) -> Result<Vec<(PartitionState<U::Extension>, Duration)>, AdmmError> {
        let updater = Arc::clone(updater);
        map_partitions(
            states,
            mode,
            Arc::new(move |mut state: PartitionState<U::Extension>| {
                let start = Instant::now();
                state.x = updater.x_update(&state);
                (state, start.elapsed())
            }),
        )
        .await
    }

    pub fn timing_tracker(&self) -> &TimingTracker {
        &self.timing_tracker
    }

    pub fn timing_tracker_mut(&mut self) -> &mut TimingTracker {
        &mut self.timing_tracker
    }

    /// Exports step and partition timings as `{prefix}_steps.csv` and
    /// `{prefix}_partitions.csv`.
    pub fn export_all_timings(&self, filename_prefix: &str) -> Result<(), AdmmError> {
        let step_filename = format!("{}_steps.csv", filename_prefix);
        let partition_filename = format!("{}_partitions.csv", filename_prefix);

        self.timing_tracker.write_step_timings_to_csv(&step_filename)?;
        self.timing_tracker
            .write_partition_timings_to_csv(&partition_filename)?;

        info!("Exported step timings to: {}", step_filename);
        info!("Exported partition timings to: {}", partition_filename);

        Ok(())
    }

    /// Prints timing statistics to the console in a formatted summary.
    pub fn print_timing_summary(&self) {
        println!("\n=== ADMM Step Timing Summary ===");
        let mut step_stats: Vec<_> = self.timing_tracker.get_step_statistics().into_iter().collect();
        step_stats.sort_by(|a, b| a.0.cmp(&b.0));
        for (step, (avg, max, count)) in step_stats {
            println!("{}: avg={:.2}ms, max={:.2}ms, count={}", step, avg, max, count);
        }

        println!("\n=== Partition x-update Timing Summary ===");
        let mut partition_stats: Vec<_> = self
            .timing_tracker
            .get_partition_statistics()
            .into_iter()
            .collect();
        partition_stats.sort_by_key(|(partition, _)| *partition);
        for (partition, (avg, max, count)) in partition_stats {
            println!(
                "partition {}: avg={:.2}ms, max={:.2}ms, count={}",
                partition, avg, max, count
            );
        }
        println!();
    }
}
