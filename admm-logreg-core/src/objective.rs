//! Local logistic objective for the per-partition x-update.
extern crate nalgebra as na;

use crate::state::LabeledPoint;

/// Margins are clamped to `[-MARGIN_CLAMP, MARGIN_CLAMP]` before exponentiation.
pub const MARGIN_CLAMP: f64 = 10_000.0;

/// A smooth function that reports its value and gradient together.
pub trait DiffFunction {
    /// Returns `(f(w), ∇f(w))`.
    fn calculate(&self, w: &na::DVector<f64>) -> (f64, na::DVector<f64>);

    fn value(&self, w: &na::DVector<f64>) -> f64 {
        self.calculate(w).0
    }
}

/// Numerically stable `log(1 / (1 + exp(-t)))`.
#[inline]
pub fn log_phi(t: f64) -> f64 {
    if t > 0.0 {
        -(-t).exp().ln_1p()
    } else {
        t - t.exp().ln_1p()
    }
}

/// Numerically stable sigmoid `1 / (1 + exp(-t))`.
#[inline]
pub fn phi(t: f64) -> f64 {
    if t > 0.0 {
        1.0 / (1.0 + (-t).exp())
    } else {
        let e = t.exp();
        e / (1.0 + e)
    }
}

/// `y * (w . a)` clamped to the safe exponentiation range.
#[inline]
pub fn clamped_margin(signed_label: f64, w: &na::DVector<f64>, features: &na::DVector<f64>) -> f64 {
    (signed_label * w.dot(features)).clamp(-MARGIN_CLAMP, MARGIN_CLAMP)
}

/// Sum of logistic losses over `points`, without the proximal term.
pub fn logistic_loss(points: &[LabeledPoint], w: &na::DVector<f64>) -> f64 {
    points
        .iter()
        .map(|p| -log_phi(clamped_margin(p.signed_label(), w, &p.features)))
        .sum()
}

/// Augmented local objective of one partition:
///
/// `f(w) = Σ_i -log_phi(y_i w·a_i) + ρ/2 ‖w - z + u‖²`
///
/// Borrows everything; building one per x-update is free.
pub struct LogisticObjective<'a> {
    points: &'a [LabeledPoint],
    z: &'a na::DVector<f64>,
    u: &'a na::DVector<f64>,
    rho: f64,
}

impl<'a> LogisticObjective<'a> {
    pub fn new(
        points: &'a [LabeledPoint],
        z: &'a na::DVector<f64>,
        u: &'a na::DVector<f64>,
        rho: f64,
    ) -> Self {
        LogisticObjective { points, z, u, rho }
    }
}

impl DiffFunction for LogisticObjective<'_> {
    fn calculate(&self, w: &na::DVector<f64>) -> (f64, na::DVector<f64>) {
        // prox = w - z + u
        let prox = w - self.z + self.u;
        let mut value = 0.5 * self.rho * prox.norm_squared();
        let mut grad = prox * self.rho;

        for point in self.points {
            let y = point.signed_label();
            let margin = clamped_margin(y, w, &point.features);
            value -= log_phi(margin);
            grad.axpy(y * (phi(margin) - 1.0), &point.features, 1.0);
        }

        (value, grad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn phi_stays_in_open_unit_interval() {
        for t in [-700.0, -30.0, -1.0, 0.0, 1.0, 30.0] {
            let p = phi(t);
            assert!(p > 0.0 && p < 1.0, "phi({}) = {}", t, p);
        }
        assert_abs_diff_eq!(phi(0.0), 0.5, epsilon = 1e-15);
    }

    #[test]
    fn log_phi_matches_log_of_phi() {
        for t in [-30.0, -5.0, -0.5, 0.0, 0.5, 5.0, 30.0] {
            assert_abs_diff_eq!(log_phi(t), phi(t).ln(), epsilon = 1e-12);
        }
    }

    #[test]
    fn extreme_margins_are_finite() {
        for t in [-1e6, 1e6, -MARGIN_CLAMP, MARGIN_CLAMP] {
            assert!(phi(t).is_finite());
            assert!(log_phi(t).is_finite());
        }
        assert_abs_diff_eq!(log_phi(1e6), 0.0);
        assert_abs_diff_eq!(log_phi(-1e6), -1e6);
    }

    #[test]
    fn huge_weights_do_not_overflow_the_objective() {
        let points = [LabeledPoint::from_slice(0.0, &[1e3]), LabeledPoint::from_slice(1.0, &[1e3])];
        let z = na::DVector::zeros(1);
        let u = na::DVector::zeros(1);
        let objective = LogisticObjective::new(&points, &z, &u, 1.0);
        let (value, grad) = objective.calculate(&na::DVector::from_element(1, 1e6));
        assert!(value.is_finite());
        assert!(grad.iter().all(|g| g.is_finite()));
        // The misclassified point contributes exactly the clamped margin
        assert_abs_diff_eq!(logistic_loss(&points, &na::DVector::from_element(1, 1e6)), MARGIN_CLAMP);
    }

    #[test]
    fn gradient_matches_central_differences() {
        let points = [
            LabeledPoint::from_slice(1.0, &[0.5, -1.0, 2.0]),
            LabeledPoint::from_slice(0.0, &[-1.5, 0.3, 0.7]),
            LabeledPoint::from_slice(1.0, &[2.0, 1.0, -0.4]),
            LabeledPoint::from_slice(0.0, &[0.1, -2.2, 0.0]),
        ];
        let z = na::DVector::from_vec(vec![0.2, -0.1, 0.3]);
        let u = na::DVector::from_vec(vec![-0.05, 0.4, 0.1]);
        let objective = LogisticObjective::new(&points, &z, &u, 1.7);
        let w = na::DVector::from_vec(vec![0.3, -0.7, 1.1]);

        let (_, grad) = objective.calculate(&w);
        let eps = 1e-6;
        for i in 0..w.len() {
            let mut plus = w.clone();
            let mut minus = w.clone();
            plus[i] += eps;
            minus[i] -= eps;
            let numeric = (objective.value(&plus) - objective.value(&minus)) / (2.0 * eps);
            assert_abs_diff_eq!(grad[i], numeric, epsilon = 1e-6);
        }
    }

    #[test]
    fn objective_is_convex_along_a_line() {
        let points = [
            LabeledPoint::from_slice(1.0, &[1.0, 2.0]),
            LabeledPoint::from_slice(0.0, &[2.0, -1.0]),
        ];
        let z = na::DVector::zeros(2);
        let u = na::DVector::zeros(2);
        let objective = LogisticObjective::new(&points, &z, &u, 0.5);
        let a = na::DVector::from_vec(vec![-3.0, 1.0]);
        let b = na::DVector::from_vec(vec![2.0, 4.0]);
        for k in 1..10 {
            let t = k as f64 / 10.0;
            let mid = &a * t + &b * (1.0 - t);
            let chord = t * objective.value(&a) + (1.0 - t) * objective.value(&b);
            assert!(objective.value(&mid) <= chord + 1e-12);
        }
    }
}
