//! Online statistics.
//!
//! Welford's algorithm with the inverse update, so a fixed-size rolling
//! window can keep its mean and variance current in O(1) per sample.

use crate::core::Timestamp;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// One observed execution of an operation.
#[derive(Clone, Debug)]
pub struct PerformanceSample {
    /// Operation name
    pub operation_name: Arc<str>,
    /// Wall-clock duration
    pub duration: Duration,
    /// Whether the execution succeeded
    pub success: bool,
    /// When the sample was recorded
    pub timestamp: Timestamp,
}

impl PerformanceSample {
    /// Duration in milliseconds.
    pub fn duration_ms(&self) -> f64 {
        duration_ms(self.duration)
    }
}

/// Convert a duration to fractional milliseconds.
pub fn duration_ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// Running count, mean and sum of squared deviations.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    /// Create empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observation.
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    /// Remove an observation previously added.
    pub fn remove(&mut self, value: f64) {
        match self.count {
            0 => {}
            1 => *self = Self::default(),
            n => {
                let remaining = (n - 1) as f64;
                let new_mean = (self.mean * n as f64 - value) / remaining;
                self.m2 -= (value - self.mean) * (value - new_mean);
                // Rounding can push m2 slightly negative.
                if self.m2 < 0.0 {
                    self.m2 = 0.0;
                }
                self.mean = new_mean;
                self.count = n - 1;
            }
        }
    }

    /// Number of observations.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Mean (0 when empty).
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample variance (0 with fewer than two observations).
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// Sample standard deviation.
    pub fn stddev(&self) -> f64 {
        self.variance().sqrt()
    }
}

/// Fixed-capacity FIFO of samples with incremental statistics.
#[derive(Debug)]
pub struct RollingWindow {
    samples: VecDeque<PerformanceSample>,
    capacity: usize,
    stats: RunningStats,
    failures: usize,
}

impl RollingWindow {
    /// Create an empty window. A zero capacity is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
            stats: RunningStats::new(),
            failures: 0,
        }
    }

    /// Add a sample, returning the evicted one when the window was full.
    pub fn push(&mut self, sample: PerformanceSample) -> Option<PerformanceSample> {
        let evicted = if self.samples.len() == self.capacity {
            self.samples.pop_front()
        } else {
            None
        };
        if let Some(old) = &evicted {
            self.stats.remove(old.duration_ms());
            if !old.success {
                self.failures -= 1;
            }
        }

        self.stats.push(sample.duration_ms());
        if !sample.success {
            self.failures += 1;
        }
        self.samples.push_back(sample);
        evicted
    }

    /// Number of samples held.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the window is empty.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Statistics over the samples currently held.
    pub fn stats(&self) -> &RunningStats {
        &self.stats
    }

    /// Fraction of held samples that failed.
    pub fn error_rate(&self) -> f64 {
        if self.samples.is_empty() {
            0.0
        } else {
            self.failures as f64 / self.samples.len() as f64
        }
    }

    /// Durations (ms) and failure count of the `n` most recent samples.
    pub fn recent(&self, n: usize) -> (Vec<f64>, usize) {
        let skip = self.samples.len().saturating_sub(n);
        let mut failures = 0;
        let durations = self
            .samples
            .iter()
            .skip(skip)
            .map(|s| {
                if !s.success {
                    failures += 1;
                }
                s.duration_ms()
            })
            .collect();
        (durations, failures)
    }

    /// Iterate samples oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &PerformanceSample> {
        self.samples.iter()
    }
}

/// Nearest-rank percentile (`p` in 0..=100). Sorts `values` in place.
pub fn percentile(values: &mut [f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    let rank = ((p / 100.0) * n as f64).ceil() as usize;
    Some(values[rank.clamp(1, n) - 1])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::now;

    fn sample(ms: u64, success: bool) -> PerformanceSample {
        PerformanceSample {
            operation_name: Arc::from("op"),
            duration: Duration::from_millis(ms),
            success,
            timestamp: now(),
        }
    }

    fn naive(values: &[f64]) -> (f64, f64) {
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        (mean, var.sqrt())
    }

    #[test]
    fn test_running_stats_matches_naive() {
        let values = [10.0, 12.0, 23.0, 23.0, 16.0, 23.0, 21.0, 16.0];
        let mut stats = RunningStats::new();
        for v in values {
            stats.push(v);
        }
        let (mean, sd) = naive(&values);
        assert!((stats.mean() - mean).abs() < 1e-9);
        assert!((stats.stddev() - sd).abs() < 1e-9);
    }

    #[test]
    fn test_running_stats_remove() {
        let mut stats = RunningStats::new();
        for v in [5.0, 7.0, 9.0, 100.0] {
            stats.push(v);
        }
        stats.remove(5.0);
        let (mean, sd) = naive(&[7.0, 9.0, 100.0]);
        assert_eq!(stats.count(), 3);
        assert!((stats.mean() - mean).abs() < 1e-9);
        assert!((stats.stddev() - sd).abs() < 1e-9);

        stats.remove(7.0);
        stats.remove(9.0);
        stats.remove(100.0);
        assert_eq!(stats, RunningStats::default());
    }

    #[test]
    fn test_single_value_has_zero_variance() {
        let mut stats = RunningStats::new();
        stats.push(42.0);
        assert_eq!(stats.variance(), 0.0);
    }

    #[test]
    fn test_window_evicts_fifo() {
        let mut window = RollingWindow::new(3);
        assert!(window.push(sample(1, true)).is_none());
        window.push(sample(2, true));
        window.push(sample(3, true));
        let evicted = window.push(sample(4, true)).unwrap();
        assert_eq!(evicted.duration, Duration::from_millis(1));

        let held: Vec<u128> = window.iter().map(|s| s.duration.as_millis()).collect();
        assert_eq!(held, vec![2, 3, 4]);
        assert!((window.stats().mean() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_window_stats_stay_exact_over_long_runs() {
        let mut window = RollingWindow::new(50);
        let mut all = Vec::new();
        for i in 0..5000u64 {
            let ms = (i * 37) % 211;
            window.push(sample(ms, true));
            all.push(ms as f64);
        }
        let (mean, sd) = naive(&all[all.len() - 50..]);
        assert!((window.stats().mean() - mean).abs() < 1e-6);
        assert!((window.stats().stddev() - sd).abs() < 1e-6);
    }

    #[test]
    fn test_window_error_rate() {
        let mut window = RollingWindow::new(4);
        window.push(sample(1, false));
        window.push(sample(1, true));
        assert!((window.error_rate() - 0.5).abs() < 1e-9);

        window.push(sample(1, true));
        window.push(sample(1, true));
        window.push(sample(1, true));
        assert_eq!(window.error_rate(), 0.0);
    }

    #[test]
    fn test_recent() {
        let mut window = RollingWindow::new(10);
        for (ms, ok) in [(1, true), (2, false), (3, true), (4, false)] {
            window.push(sample(ms, ok));
        }
        let (durations, failures) = window.recent(3);
        assert_eq!(durations, vec![2.0, 3.0, 4.0]);
        assert_eq!(failures, 2);
    }

    #[test]
    fn test_percentile_nearest_rank() {
        let mut values: Vec<f64> = (1..=20).map(|v| v as f64).collect();
        assert_eq!(percentile(&mut values, 95.0), Some(19.0));
        assert_eq!(percentile(&mut values, 100.0), Some(20.0));
        assert_eq!(percentile(&mut values, 0.0), Some(1.0));
        assert_eq!(percentile(&mut [], 95.0), None);
        assert_eq!(percentile(&mut [500.0], 95.0), Some(500.0));
    }
}
