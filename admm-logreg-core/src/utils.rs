use thiserror::Error;

/// Error type for ADMM training, partition handling and dataset storage.
///
/// Configuration problems are reported before the first outer iteration runs.
/// Numerical edge cases (margin overflow) and inexact local solves are never
/// errors. A failed partition task aborts the whole run.
///
/// # Example
///
/// ```rust
/// # use admm_logreg_core::utils::AdmmError;
///
/// fn might_fail() -> Result<(), AdmmError> {
///     Err(AdmmError::from_string("Something went wrong".to_string()))
/// }
/// ```
#[derive(Error, Debug)]
pub enum AdmmError {
    /// A numeric parameter is out of its admissible range
    #[error("Invalid parameter {name}: {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },

    /// Training was requested over an empty partition collection
    #[error("At least one partition is required")]
    NoPartitions,

    /// A label outside of the two-class {0, 1} domain
    #[error("Invalid label {label} at point {index} of partition {partition}: labels must be 0 or 1")]
    InvalidLabel {
        partition: usize,
        index: usize,
        label: f64,
    },

    /// Feature vectors or weights of differing dimensionality
    #[error("Dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    /// A partition worker panicked or was cancelled
    #[error("Partition task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bincode encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("Bincode decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("Config parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// A resource was read before it was ever written
    #[error("Resource {0} not found in any storage location")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

impl AdmmError {
    /// Creates a free-form error from a message.
    pub fn from_string(message: String) -> Self {
        AdmmError::Other(message)
    }
}

/// Checks that `value` is finite and strictly positive.
pub(crate) fn ensure_positive(name: &'static str, value: f64) -> Result<(), AdmmError> {
    if !value.is_finite() {
        return Err(AdmmError::InvalidParameter {
            name,
            value,
            reason: "must be finite",
        });
    }
    if value <= 0.0 {
        return Err(AdmmError::InvalidParameter {
            name,
            value,
            reason: "must be positive",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_parameters_pass() {
        assert!(ensure_positive("rho", 1.0).is_ok());
        assert!(ensure_positive("lambda", 1e-12).is_ok());
    }

    #[test]
    fn non_positive_or_non_finite_parameters_fail() {
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = ensure_positive("rho", bad).unwrap_err();
            assert!(matches!(err, AdmmError::InvalidParameter { name: "rho", .. }));
        }
    }

    #[test]
    fn messages_name_the_offending_point() {
        let err = AdmmError::InvalidLabel {
            partition: 2,
            index: 7,
            label: 3.0,
        };
        assert_eq!(
            err.to_string(),
            "Invalid label 3 at point 7 of partition 2: labels must be 0 or 1"
        );
    }
}
