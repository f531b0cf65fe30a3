extern crate nalgebra as na;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::utils::AdmmError;

/// A labeled training example.
///
/// Public labels live in {0, 1}. The optimizer works with {-1, +1} labels,
/// obtained explicitly through [`LabeledPoint::signed_label`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabeledPoint {
    /// Class label, 0 or 1
    pub label: f64,
    /// Feature vector. A bias term must be folded in here by the caller.
    pub features: na::DVector<f64>,
}

impl LabeledPoint {
    pub fn new(label: f64, features: na::DVector<f64>) -> Self {
        LabeledPoint { label, features }
    }

    /// Convenience constructor from a feature slice.
    pub fn from_slice(label: f64, features: &[f64]) -> Self {
        LabeledPoint::new(label, na::DVector::from_column_slice(features))
    }

    /// The label mapped from {0, 1} to {-1, +1}.
    #[inline]
    pub fn signed_label(&self) -> f64 {
        if self.label > 0.5 { 1.0 } else { -1.0 }
    }

    pub fn dim(&self) -> usize {
        self.features.len()
    }
}

/// Per-partition ADMM state threaded through the outer iterations.
///
/// `points` is fixed for the whole run. `x` is the partition's private
/// estimate, `z` the broadcast consensus vector and `u` the scaled dual.
/// `extension` holds whatever extra coupling state a model variant needs;
/// the baseline logistic updater uses `()`.
#[derive(Clone, Debug)]
pub struct PartitionState<E = ()> {
    /// Index of the partition within its collection
    pub id: usize,
    /// Training points owned by this partition
    pub points: Arc<[LabeledPoint]>,
    /// Local primal variable
    pub x: na::DVector<f64>,
    /// Consensus variable, identical across partitions at iteration start
    pub z: na::DVector<f64>,
    /// Scaled dual variable
    pub u: na::DVector<f64>,
    /// Variant-specific secondary dual
    pub extension: E,
}

impl<E: Default> PartitionState<E> {
    /// Builds the initial state: `x = z = initial`, `u = 0`.
    pub fn new(id: usize, points: Arc<[LabeledPoint]>, initial: &na::DVector<f64>) -> Self {
        PartitionState {
            id,
            points,
            x: initial.clone(),
            z: initial.clone(),
            u: na::DVector::zeros(initial.len()),
            extension: E::default(),
        }
    }
}

impl<E> PartitionState<E> {
    pub fn dim(&self) -> usize {
        self.x.len()
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    /// Overwrites the consensus variable with the broadcast vector.
    pub fn broadcast(&mut self, z: &na::DVector<f64>) {
        self.z.copy_from(z);
    }

    /// Squared norm of the local disagreement `x - z`.
    pub fn primal_gap_squared(&self) -> f64 {
        (&self.x - &self.z).norm_squared()
    }
}

/// Checks that every point carries a {0, 1} label and `dim` features.
pub fn validate_points(partition: usize, points: &[LabeledPoint], dim: usize) -> Result<(), AdmmError> {
    for (index, point) in points.iter().enumerate() {
        if point.label != 0.0 && point.label != 1.0 {
            return Err(AdmmError::InvalidLabel {
                partition,
                index,
                label: point.label,
            });
        }
        if point.dim() != dim {
            return Err(AdmmError::DimensionMismatch {
                expected: dim,
                found: point.dim(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_label_maps_zero_one() {
        assert_eq!(LabeledPoint::from_slice(0.0, &[1.0]).signed_label(), -1.0);
        assert_eq!(LabeledPoint::from_slice(1.0, &[1.0]).signed_label(), 1.0);
    }

    #[test]
    fn new_state_starts_from_initial_weights() {
        let points: Arc<[LabeledPoint]> = vec![LabeledPoint::from_slice(1.0, &[1.0, 2.0])].into();
        let initial = na::DVector::from_vec(vec![0.5, -0.5]);
        let state: PartitionState = PartitionState::new(3, points, &initial);

        assert_eq!(state.id, 3);
        assert_eq!(state.x, initial);
        assert_eq!(state.z, initial);
        assert_eq!(state.u, na::DVector::zeros(2));
        assert_eq!(state.num_points(), 1);
        assert_eq!(state.primal_gap_squared(), 0.0);
    }

    #[test]
    fn validation_rejects_bad_labels_and_dims() {
        let bad_label = [LabeledPoint::from_slice(1.0, &[1.0]), LabeledPoint::from_slice(-1.0, &[1.0])];
        assert!(matches!(
            validate_points(4, &bad_label, 1),
            Err(AdmmError::InvalidLabel { partition: 4, index: 1, .. })
        ));

        let bad_dim = [LabeledPoint::from_slice(0.0, &[1.0, 2.0])];
        assert!(matches!(
            validate_points(0, &bad_dim, 1),
            Err(AdmmError::DimensionMismatch { expected: 1, found: 2 })
        ));
    }
}
