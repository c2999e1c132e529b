//! Where the monitor reads samples from.

use crate::core::now;
use crate::performance::{PerformanceSample, PerformanceTracker, RollingWindow, WindowSnapshot};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Supplies recent samples per operation.
pub trait MetricSource: Send + Sync {
    /// Operations with recorded samples.
    fn operation_names(&self) -> Vec<String>;

    /// The `n` most recent samples of an operation.
    fn recent_samples(&self, operation_name: &str, n: usize) -> Option<WindowSnapshot>;
}

impl MetricSource for PerformanceTracker {
    fn operation_names(&self) -> Vec<String> {
        PerformanceTracker::operation_names(self)
    }

    fn recent_samples(&self, operation_name: &str, n: usize) -> Option<WindowSnapshot> {
        self.recent_window(operation_name, n)
    }
}

struct BufferedOperation {
    name: Arc<str>,
    window: RollingWindow,
    total_recorded: u64,
}

/// Plain per-operation sample buffer, for monitoring without baselines.
pub struct SampleBuffer {
    capacity: usize,
    operations: Mutex<HashMap<String, BufferedOperation>>,
}

impl SampleBuffer {
    /// Keep at most `capacity` samples per operation.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            operations: Mutex::new(HashMap::new()),
        }
    }

    /// Record one execution.
    pub fn record(&self, operation_name: &str, duration: Duration, success: bool) {
        let mut operations = self
            .operations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let op = operations
            .entry(operation_name.to_string())
            .or_insert_with(|| BufferedOperation {
                name: Arc::from(operation_name),
                window: RollingWindow::new(self.capacity),
                total_recorded: 0,
            });
        op.window.push(PerformanceSample {
            operation_name: Arc::clone(&op.name),
            duration,
            success,
            timestamp: now(),
        });
        op.total_recorded += 1;
    }
}

impl MetricSource for SampleBuffer {
    fn operation_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .operations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    fn recent_samples(&self, operation_name: &str, n: usize) -> Option<WindowSnapshot> {
        let operations = self
            .operations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let op = operations.get(operation_name)?;
        let (durations_ms, failures) = op.window.recent(n);
        Some(WindowSnapshot {
            durations_ms,
            failures,
            total_recorded: op.total_recorded,
        })
    }
}
