use crate::utils::AdmmError;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs::OpenOptions,
    io::Write,
    time::{Duration, Instant},
};

/// A record of timing information for an ADMM algorithm step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingRecord {
    /// Name of the ADMM step (e.g., "update_x", "update_z")
    pub step_name: String,
    /// The iteration number when this step was executed
    pub iteration: usize,
    /// Duration of the step in milliseconds
    pub duration_ms: f64,
    /// Unix timestamp when the step was recorded
    pub timestamp: u64,
}

/// A record of how long one partition's local solve took.
///
/// These are measured inside the worker, so their maximum per iteration is
/// the straggler that the x-update barrier waits for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionTimingRecord {
    /// Index of the partition
    pub partition: usize,
    /// The iteration number of the x-update
    pub iteration: usize,
    /// Duration of the local solve in milliseconds
    pub duration_ms: f64,
    /// Unix timestamp when the record was taken
    pub timestamp: u64,
}

/// Performance tracking for the ADMM driver.
///
/// Collects per-step timings on the driver side and per-partition x-update
/// timings reported by the workers. Supports summary statistics and CSV
/// export.
#[derive(Debug, Default)]
pub struct TimingTracker {
    step_timings: Vec<TimingRecord>,
    partition_timings: Vec<PartitionTimingRecord>,
    current_iteration: usize,
}

fn unix_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl TimingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tags subsequent records with `iteration`, the zero-based outer
    /// iteration also used by the solver's report.
    pub fn start_iteration(&mut self, iteration: usize) {
        self.current_iteration = iteration;
    }

    pub fn current_iteration(&self) -> usize {
        self.current_iteration
    }

    pub fn record_step(&mut self, step_name: &str, duration: Duration) {
        self.step_timings.push(TimingRecord {
            step_name: step_name.to_string(),
            iteration: self.current_iteration,
            duration_ms: duration.as_secs_f64() * 1000.0,
            timestamp: unix_timestamp(),
        });
    }

    pub fn record_partition(&mut self, partition: usize, duration: Duration) {
        self.partition_timings.push(PartitionTimingRecord {
            partition,
            iteration: self.current_iteration,
            duration_ms: duration.as_secs_f64() * 1000.0,
            timestamp: unix_timestamp(),
        });
    }

    pub fn step_timings(&self) -> &[TimingRecord] {
        &self.step_timings
    }

    pub fn partition_timings(&self) -> &[PartitionTimingRecord] {
        &self.partition_timings
    }

    pub fn write_step_timings_to_csv(&self, filename: &str) -> Result<(), AdmmError> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(filename)?;

        writeln!(file, "step_name,iteration,duration_ms,timestamp")?;
        for record in &self.step_timings {
            writeln!(
                file,
                "{},{},{:.3},{}",
                record.step_name, record.iteration, record.duration_ms, record.timestamp
            )?;
        }

        Ok(())
    }

    pub fn write_partition_timings_to_csv(&self, filename: &str) -> Result<(), AdmmError> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(filename)?;

        writeln!(file, "partition,iteration,duration_ms,timestamp")?;
        for record in &self.partition_timings {
            writeln!(
                file,
                "{},{},{:.3},{}",
                record.partition, record.iteration, record.duration_ms, record.timestamp
            )?;
        }

        Ok(())
    }

    /// Per step name: (average ms, max ms, count).
    pub fn get_step_statistics(&self) -> HashMap<String, (f64, f64, usize)> {
        let mut stats = HashMap::new();

        for record in &self.step_timings {
            let entry = stats
                .entry(record.step_name.clone())
                .or_insert((0.0f64, 0.0f64, 0));
            entry.0 += record.duration_ms;
            entry.1 = entry.1.max(record.duration_ms);
            entry.2 += 1;
        }

        for (_, stats) in stats.iter_mut() {
            stats.0 /= stats.2 as f64;
        }

        stats
    }

    /// Per partition: (average ms, max ms, count).
    pub fn get_partition_statistics(&self) -> HashMap<usize, (f64, f64, usize)> {
        let mut stats = HashMap::new();

        for record in &self.partition_timings {
            let entry = stats.entry(record.partition).or_insert((0.0f64, 0.0f64, 0));
            entry.0 += record.duration_ms;
            entry.1 = entry.1.max(record.duration_ms);
            entry.2 += 1;
        }

        for (_, stats) in stats.iter_mut() {
            stats.0 /= stats.2 as f64;
        }

        stats
    }
}

pub async fn time_async_fn<F, R>(
    tracker: &mut TimingTracker,
    name: &str,
    f: F,
) -> Result<R, AdmmError>
where
    F: std::future::Future<Output = Result<R, AdmmError>>,
{
    let start = Instant::now();
    let result = f.await;
    tracker.record_step(name, start.elapsed());
    result
}

pub fn time_fn<F, R>(tracker: &mut TimingTracker, name: &str, f: F) -> R
where
    F: FnOnce() -> R,
{
    let start = Instant::now();
    let result = f();
    tracker.record_step(name, start.elapsed());
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_statistics_average_and_max() {
        let mut tracker = TimingTracker::new();
        tracker.start_iteration(0);
        tracker.record_step("update_x", Duration::from_millis(10));
        tracker.start_iteration(1);
        tracker.record_step("update_x", Duration::from_millis(30));
        tracker.record_step("update_z", Duration::from_millis(1));

        let stats = tracker.get_step_statistics();
        let (avg, max, count) = stats["update_x"];
        assert!((avg - 20.0).abs() < 1e-9);
        assert!((max - 30.0).abs() < 1e-9);
        assert_eq!(count, 2);
        assert_eq!(stats["update_z"].2, 1);
        assert_eq!(tracker.step_timings()[0].iteration, 0);
        assert_eq!(tracker.step_timings()[1].iteration, 1);
    }

    #[test]
    fn partition_statistics_group_by_partition() {
        let mut tracker = TimingTracker::new();
        tracker.start_iteration(0);
        tracker.record_partition(0, Duration::from_millis(4));
        tracker.record_partition(1, Duration::from_millis(8));
        tracker.start_iteration(1);
        tracker.record_partition(0, Duration::from_millis(6));

        let stats = tracker.get_partition_statistics();
        assert_eq!(stats[&0].2, 2);
        assert!((stats[&0].0 - 5.0).abs() < 1e-9);
        assert!((stats[&1].1 - 8.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn timed_future_records_even_on_error() {
        let mut tracker = TimingTracker::new();
        let result: Result<(), AdmmError> = time_async_fn(&mut tracker, "update_z", async {
            Err(AdmmError::NoPartitions)
        })
        .await;
        assert!(result.is_err());
        assert_eq!(tracker.step_timings().len(), 1);
    }

    #[test]
    fn csv_export_writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("steps.csv");
        let mut tracker = TimingTracker::new();
        tracker.start_iteration(3);
        time_fn(&mut tracker, "update_u", || ());
        tracker.write_step_timings_to_csv(path.to_str().unwrap()).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(lines.next(), Some("step_name,iteration,duration_ms,timestamp"));
        assert!(lines.next().unwrap().starts_with("update_u,3,"));
    }
}
