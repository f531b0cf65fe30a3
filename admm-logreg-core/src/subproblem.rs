use std::sync::Arc;

#[cfg(feature = "rayon")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::state::LabeledPoint;
use crate::utils::AdmmError;

/// How the per-partition map steps are executed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// One `spawn_blocking` task per partition, joined before returning
    #[default]
    Tokio,
    /// Partitions processed one after another on the calling task
    Sequential,
    /// A dedicated rayon pool with the given number of threads
    #[cfg(feature = "rayon")]
    Rayon { threads: usize },
}

/// A fixed collection of data partitions.
///
/// Points never move between partitions once the collection is built. Each
/// partition is reference counted so worker tasks can share it read-only.
#[derive(Clone, Debug)]
pub struct Partitions {
    parts: Vec<Arc<[LabeledPoint]>>,
}

impl Partitions {
    /// Wraps already partitioned data.
    pub fn new(parts: Vec<Vec<LabeledPoint>>) -> Self {
        Partitions {
            parts: parts.into_iter().map(Arc::<[LabeledPoint]>::from).collect(),
        }
    }

    /// Splits `points` into `n_partitions` contiguous chunks.
    ///
    /// Chunk sizes differ by at most one; the first `len % n` chunks get the
    /// extra point.
    pub fn from_points(points: Vec<LabeledPoint>, n_partitions: usize) -> Result<Self, AdmmError> {
        if n_partitions == 0 {
            return Err(AdmmError::NoPartitions);
        }
        let base_chunk_size = points.len() / n_partitions;
        let remainder = points.len() % n_partitions;

        let mut parts = Vec::with_capacity(n_partitions);
        let mut rest = points.into_iter();
        for i in 0..n_partitions {
            let chunk_size = if i < remainder {
                base_chunk_size + 1
            } else {
                base_chunk_size
            };
            parts.push(rest.by_ref().take(chunk_size).collect::<Vec<_>>());
        }
        Ok(Partitions::new(parts))
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Dimensionality of the first point found, if any.
    pub fn num_features(&self) -> Option<usize> {
        self.parts
            .iter()
            .flat_map(|p| p.iter())
            .map(LabeledPoint::dim)
            .next()
    }

    pub fn total_points(&self) -> usize {
        self.parts.iter().map(|p| p.len()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<[LabeledPoint]>> {
        self.parts.iter()
    }

    /// Concatenates every partition back into one point set, in partition order.
    pub fn combine(&self) -> Vec<LabeledPoint> {
        self.parts.iter().flat_map(|p| p.iter().cloned()).collect()
    }
}

/// Applies `f` to every item and returns the results in input order.
///
/// This is the map side of each ADMM round; returning from it is the
/// synchronization barrier. A panicking task fails the whole map.
pub async fn map_partitions<T, R, F>(
    items: Vec<T>,
    mode: ExecutionMode,
    f: Arc<F>,
) -> Result<Vec<R>, AdmmError>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> R + Send + Sync + 'static,
{
    match mode {
        ExecutionMode::Tokio => {
            let handles = items
                .into_iter()
                .map(|item| {
                    let f = Arc::clone(&f);
                    tokio::task::spawn_blocking(move || f(item))
                })
                .collect::<Vec<_>>();

            futures::future::join_all(handles)
                .await
                .into_iter()
                .map(|joined| joined.map_err(AdmmError::from))
                .collect()
        }
        ExecutionMode::Sequential => Ok(items.into_iter().map(|item| f(item)).collect()),
        #[cfg(feature = "rayon")]
        ExecutionMode::Rayon { threads } => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(|e| AdmmError::from_string(format!("Failed to create thread pool: {}", e)))?;
            Ok(pool.install(|| items.into_par_iter().map(|item| f(item)).collect()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(n: usize) -> Vec<LabeledPoint> {
        (0..n)
            .map(|i| LabeledPoint::from_slice((i % 2) as f64, &[i as f64]))
            .collect()
    }

    #[test]
    fn split_spreads_remainder_over_first_partitions() {
        let partitions = Partitions::from_points(points(10), 4).unwrap();
        let sizes: Vec<usize> = partitions.iter().map(|p| p.len()).collect();
        assert_eq!(sizes, vec![3, 3, 2, 2]);
        assert_eq!(partitions.total_points(), 10);
        assert_eq!(partitions.num_features(), Some(1));
    }

    #[test]
    fn split_then_combine_preserves_order() {
        let original = points(7);
        let partitions = Partitions::from_points(original.clone(), 3).unwrap();
        assert_eq!(partitions.combine(), original);
    }

    #[test]
    fn more_partitions_than_points_leaves_empty_partitions() {
        let partitions = Partitions::from_points(points(2), 4).unwrap();
        assert_eq!(partitions.len(), 4);
        assert_eq!(partitions.iter().filter(|p| p.is_empty()).count(), 2);
    }

    #[test]
    fn zero_partitions_is_rejected() {
        assert!(matches!(
            Partitions::from_points(points(3), 0),
            Err(AdmmError::NoPartitions)
        ));
    }

    #[tokio::test]
    async fn tokio_map_keeps_input_order() {
        let squares = map_partitions((0..32u64).collect(), ExecutionMode::Tokio, Arc::new(|i: u64| i * i))
            .await
            .unwrap();
        assert_eq!(squares, (0..32u64).map(|i| i * i).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn sequential_and_tokio_maps_agree() {
        let f = Arc::new(|i: i32| i - 3);
        let a = map_partitions(vec![5, 1, 9], ExecutionMode::Sequential, f.clone())
            .await
            .unwrap();
        let b = map_partitions(vec![5, 1, 9], ExecutionMode::Tokio, f).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn panicking_partition_fails_the_map() {
        let result = map_partitions(
            vec![1, 2, 3],
            ExecutionMode::Tokio,
            Arc::new(|i: i32| {
                if i == 2 {
                    panic!("worker lost");
                }
                i
            }),
        )
        .await;
        assert!(matches!(result, Err(AdmmError::Task(_))));
    }

    #[cfg(feature = "rayon")]
    #[tokio::test]
    async fn rayon_map_keeps_input_order() {
        let out = map_partitions(
            (0..16).collect::<Vec<i32>>(),
            ExecutionMode::Rayon { threads: 2 },
            Arc::new(|i: i32| i + 1),
        )
        .await
        .unwrap();
        assert_eq!(out, (1..17).collect::<Vec<_>>());
    }
}
