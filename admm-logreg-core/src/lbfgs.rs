//! Limited-memory BFGS for the smooth local subproblems.
//!
//! The solver is warm-started from the previous outer iterate and run for a
//! small, bounded number of steps. It is fully deterministic and always
//! returns the best point it has evaluated, so an inexact solve is a valid
//! result rather than a failure.
extern crate nalgebra as na;

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::objective::DiffFunction;
use crate::utils::{AdmmError, ensure_positive};

/// Armijo sufficient-decrease constant.
const ARMIJO_C1: f64 = 1e-4;
/// Maximum number of step halvings per line search.
const MAX_LINE_SEARCH_STEPS: usize = 40;
/// Curvature pairs with `s.y` at or below this are discarded.
const CURVATURE_EPS: f64 = 1e-10;

/// Settings for the inner quasi-Newton solve.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LbfgsConfig {
    /// Maximum number of quasi-Newton steps
    pub max_iterations: usize,
    /// Number of curvature pairs kept in memory
    pub history: usize,
    /// Relative tolerance on the gradient norm and on objective improvement
    pub tolerance: f64,
}

impl Default for LbfgsConfig {
    fn default() -> Self {
        LbfgsConfig {
            max_iterations: 5,
            history: 10,
            tolerance: 1e-4,
        }
    }
}

impl LbfgsConfig {
    pub fn validate(&self) -> Result<(), AdmmError> {
        if self.history == 0 {
            return Err(AdmmError::InvalidParameter {
                name: "lbfgsHistory",
                value: 0.0,
                reason: "must be at least 1",
            });
        }
        ensure_positive("lbfgsTolerance", self.tolerance)
    }
}

/// Outcome of [`minimize`].
#[derive(Clone, Debug)]
pub struct LbfgsResult {
    /// Best iterate found
    pub x: na::DVector<f64>,
    /// Objective value at `x`
    pub value: f64,
    /// Number of quasi-Newton steps taken
    pub iterations: usize,
    /// Whether a tolerance test fired before the budget ran out
    pub converged: bool,
}

/// Bounded history of `(s, y, 1 / s.y)` curvature pairs.
struct History {
    pairs: VecDeque<(na::DVector<f64>, na::DVector<f64>, f64)>,
    capacity: usize,
}

impl History {
    fn new(capacity: usize) -> Self {
        History {
            pairs: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, s: na::DVector<f64>, y: na::DVector<f64>) {
        let sy = s.dot(&y);
        if sy <= CURVATURE_EPS {
            return;
        }
        if self.pairs.len() == self.capacity {
            self.pairs.pop_front();
        }
        self.pairs.push_back((s, y, 1.0 / sy));
    }

    /// Two-loop recursion: returns `-H g`.
    fn direction(&self, grad: &na::DVector<f64>) -> na::DVector<f64> {
        let Some((s_last, y_last, _)) = self.pairs.back() else {
            return -grad;
        };

        let mut q = grad.clone();
        let mut alpha = vec![0.0; self.pairs.len()];
        for (i, (s, y, rho)) in self.pairs.iter().enumerate().rev() {
            alpha[i] = rho * s.dot(&q);
            q.axpy(-alpha[i], y, 1.0);
        }

        let yy = y_last.norm_squared();
        let gamma = if yy > 1e-30 { s_last.dot(y_last) / yy } else { 1.0 };
        let mut r = q * gamma;

        for (i, (s, y, rho)) in self.pairs.iter().enumerate() {
            let beta = rho * y.dot(&r);
            r.axpy(alpha[i] - beta, s, 1.0);
        }
        -r
    }
}

/// Minimizes `f` starting from `x0`.
///
/// Stops when `‖∇f‖ ≤ tol · max(1, ‖x‖)`, when the relative objective
/// improvement of a step drops below `tol`, or after `max_iterations` steps.
/// A failed line search ends the solve early with the current point.
pub fn minimize<F: DiffFunction>(f: &F, x0: &na::DVector<f64>, config: &LbfgsConfig) -> LbfgsResult {
    let mut x = x0.clone();
    let (mut value, mut grad) = f.calculate(&x);
    let mut history = History::new(config.history.max(1));

    if !value.is_finite() || grad.iter().any(|g| !g.is_finite()) {
        return LbfgsResult {
            x,
            value,
            iterations: 0,
            converged: false,
        };
    }

    for iteration in 0..config.max_iterations {
        if grad.norm() <= config.tolerance * x.norm().max(1.0) {
            return LbfgsResult {
                x,
                value,
                iterations: iteration,
                converged: true,
            };
        }

        let mut direction = history.direction(&grad);
        let mut slope = grad.dot(&direction);
        if slope >= 0.0 {
            // Stale curvature information; restart from steepest descent
            direction = -&grad;
            slope = -grad.norm_squared();
        }

        let Some((next_x, next_value, next_grad)) = line_search(f, &x, value, slope, &direction) else {
            return LbfgsResult {
                x,
                value,
                iterations: iteration,
                converged: false,
            };
        };

        let improvement = (value - next_value) / value.abs().max(1.0);
        history.push(&next_x - &x, &next_grad - &grad);
        x = next_x;
        value = next_value;
        grad = next_grad;

        if improvement < config.tolerance {
            return LbfgsResult {
                x,
                value,
                iterations: iteration + 1,
                converged: true,
            };
        }
    }

    let converged = grad.norm() <= config.tolerance * x.norm().max(1.0);
    LbfgsResult {
        x,
        value,
        iterations: config.max_iterations,
        converged,
    }
}

/// Backtracking line search with the Armijo condition, starting at a unit step.
fn line_search<F: DiffFunction>(
    f: &F,
    x: &na::DVector<f64>,
    value: f64,
    slope: f64,
    direction: &na::DVector<f64>,
) -> Option<(na::DVector<f64>, f64, na::DVector<f64>)> {
    let mut step = 1.0;
    for _ in 0..MAX_LINE_SEARCH_STEPS {
        let candidate = x + direction * step;
        let (candidate_value, candidate_grad) = f.calculate(&candidate);
        if candidate_value.is_finite() && candidate_value <= value + ARMIJO_C1 * step * slope {
            return Some((candidate, candidate_value, candidate_grad));
        }
        step *= 0.5;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objective::LogisticObjective;
    use crate::state::LabeledPoint;
    use approx::assert_abs_diff_eq;

    /// `f(x) = Σ c_i (x_i - t_i)²`
    struct Quadratic {
        scales: na::DVector<f64>,
        target: na::DVector<f64>,
    }

    impl DiffFunction for Quadratic {
        fn calculate(&self, w: &na::DVector<f64>) -> (f64, na::DVector<f64>) {
            let diff = w - &self.target;
            let value = diff.component_mul(&diff).dot(&self.scales);
            (value, diff.component_mul(&self.scales) * 2.0)
        }
    }

    fn quadratic() -> Quadratic {
        Quadratic {
            scales: na::DVector::from_vec(vec![1.0, 10.0, 0.5]),
            target: na::DVector::from_vec(vec![3.0, -2.0, 1.0]),
        }
    }

    #[test]
    fn solves_an_ill_conditioned_quadratic() {
        let f = quadratic();
        let config = LbfgsConfig {
            max_iterations: 100,
            history: 10,
            tolerance: 1e-14,
        };
        let result = minimize(&f, &na::DVector::zeros(3), &config);
        assert!(result.converged);
        for i in 0..3 {
            assert_abs_diff_eq!(result.x[i], f.target[i], epsilon = 1e-5);
        }
    }

    #[test]
    fn budget_exhaustion_still_improves_on_warm_start() {
        let f = quadratic();
        let x0 = na::DVector::zeros(3);
        let config = LbfgsConfig {
            max_iterations: 2,
            history: 10,
            tolerance: 1e-12,
        };
        let result = minimize(&f, &x0, &config);
        assert_eq!(result.iterations, 2);
        assert!(result.value < f.value(&x0));
    }

    #[test]
    fn zero_budget_returns_warm_start() {
        let f = quadratic();
        let x0 = na::DVector::from_vec(vec![1.0, 1.0, 1.0]);
        let config = LbfgsConfig {
            max_iterations: 0,
            ..LbfgsConfig::default()
        };
        let result = minimize(&f, &x0, &config);
        assert_eq!(result.x, x0);
        assert_eq!(result.iterations, 0);
    }

    #[test]
    fn stationary_warm_start_converges_immediately() {
        let f = quadratic();
        let result = minimize(&f, &f.target, &LbfgsConfig::default());
        assert!(result.converged);
        assert_eq!(result.iterations, 0);
        assert_eq!(result.x, f.target);
    }

    #[test]
    fn minimizes_the_local_logistic_objective() {
        let points = [
            LabeledPoint::from_slice(1.0, &[1.0, 0.5]),
            LabeledPoint::from_slice(0.0, &[-1.0, 0.2]),
            LabeledPoint::from_slice(1.0, &[0.3, -0.4]),
        ];
        let z = na::DVector::from_vec(vec![0.1, 0.1]);
        let u = na::DVector::zeros(2);
        let f = LogisticObjective::new(&points, &z, &u, 1.0);
        let config = LbfgsConfig {
            max_iterations: 50,
            history: 5,
            tolerance: 1e-12,
        };
        let result = minimize(&f, &na::DVector::zeros(2), &config);
        let (_, grad) = f.calculate(&result.x);
        assert!(grad.norm() < 1e-4, "gradient norm {}", grad.norm());
    }

    #[test]
    fn solves_are_deterministic() {
        let f = quadratic();
        let x0 = na::DVector::from_vec(vec![-4.0, 7.0, 0.25]);
        let a = minimize(&f, &x0, &LbfgsConfig::default());
        let b = minimize(&f, &x0, &LbfgsConfig::default());
        assert_eq!(a.x, b.x);
        assert_eq!(a.value.to_bits(), b.value.to_bits());
    }

    #[test]
    fn rejects_zero_history() {
        let config = LbfgsConfig {
            history: 0,
            ..LbfgsConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(LbfgsConfig::default().validate().is_ok());
    }
}
