//! Per-operation rolling windows, baselines and degradation checks.

use crate::config::TrackerConfig;
use crate::core::{now, Result, Severity};
use crate::monitoring::ReliabilityMetrics;
use crate::performance::baseline::{
    Baseline, BaselineMap, BaselineStore, JsonFileBaselineStore, MemoryBaselineStore,
};
use crate::performance::stats::{PerformanceSample, RollingWindow, RunningStats};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tracing::{info, warn};

/// Outcome of a degradation check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DegradationStatus {
    /// No baseline has been established yet
    NoBaseline,
    /// Current mean is within the baseline threshold
    Ok,
    /// Current mean exceeds the baseline threshold
    Degraded,
}

/// Result of [`PerformanceTracker::check_degradation`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DegradationReport {
    /// Verdict
    pub status: DegradationStatus,
    /// Standard deviations above the threshold (0 unless degraded)
    pub severity: f64,
    /// Severity bucket
    pub level: Severity,
    /// Current rolling mean (ms); `None` when the window is empty
    pub current_mean: Option<f64>,
    /// `baseline.mean + k * baseline.stddev` (ms)
    pub threshold: Option<f64>,
}

impl DegradationReport {
    fn no_baseline(current_mean: Option<f64>) -> Self {
        Self {
            status: DegradationStatus::NoBaseline,
            severity: 0.0,
            level: Severity::Info,
            current_mean,
            threshold: None,
        }
    }

    /// Whether the operation is degraded.
    pub fn is_degraded(&self) -> bool {
        self.status == DegradationStatus::Degraded
    }
}

/// Point-in-time statistics for one operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperationSnapshot {
    /// Operation name
    pub operation_name: String,
    /// Samples in the rolling window
    pub window_len: usize,
    /// Window mean (ms)
    pub mean: f64,
    /// Window sample standard deviation (ms)
    pub stddev: f64,
    /// Window error rate
    pub error_rate: f64,
    /// Samples recorded since the process started
    pub total_recorded: u64,
    /// Established baseline, if any
    pub baseline: Option<Baseline>,
}

/// The most recent samples of one operation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WindowSnapshot {
    /// Durations (ms), oldest first
    pub durations_ms: Vec<f64>,
    /// Failed samples among them
    pub failures: usize,
    /// Samples recorded for the operation so far
    pub total_recorded: u64,
}

impl WindowSnapshot {
    /// Number of samples in the snapshot.
    pub fn len(&self) -> usize {
        self.durations_ms.len()
    }

    /// Whether the snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.durations_ms.is_empty()
    }

    /// Failure fraction of the snapshot.
    pub fn error_rate(&self) -> f64 {
        if self.durations_ms.is_empty() {
            0.0
        } else {
            self.failures as f64 / self.durations_ms.len() as f64
        }
    }
}

struct OperationState {
    name: Arc<str>,
    window: RollingWindow,
    /// Samples accumulated towards the next baseline.
    seen: RunningStats,
    total_recorded: u64,
    baseline: Option<Baseline>,
}

impl OperationState {
    fn new(name: &str, window_size: usize) -> Self {
        Self {
            name: Arc::from(name),
            window: RollingWindow::new(window_size),
            seen: RunningStats::new(),
            total_recorded: 0,
            baseline: None,
        }
    }
}

/// Tracks operation durations and detects drift from an established baseline.
pub struct PerformanceTracker {
    config: TrackerConfig,
    operations: RwLock<HashMap<String, Arc<Mutex<OperationState>>>>,
    store: Arc<dyn BaselineStore>,
    metrics: Arc<ReliabilityMetrics>,
    persist_lock: Mutex<()>,
}

impl PerformanceTracker {
    /// Create a tracker, loading any baselines already in `store`.
    pub fn new(
        config: TrackerConfig,
        store: Arc<dyn BaselineStore>,
        metrics: Arc<ReliabilityMetrics>,
    ) -> Result<Self> {
        config.validate()?;
        let loaded = store.load()?;

        let mut operations = HashMap::with_capacity(loaded.len());
        for (name, baseline) in loaded {
            let mut state = OperationState::new(&name, config.window_size);
            state.baseline = Some(baseline);
            operations.insert(name, Arc::new(Mutex::new(state)));
        }
        if !operations.is_empty() {
            info!(
                store = %store.describe(),
                count = operations.len(),
                "Loaded persisted baselines"
            );
        }

        Ok(Self {
            config,
            operations: RwLock::new(operations),
            store,
            metrics,
            persist_lock: Mutex::new(()),
        })
    }

    /// Create a tracker whose store follows `config.baseline_path`.
    pub fn from_config(config: TrackerConfig, metrics: Arc<ReliabilityMetrics>) -> Result<Self> {
        let store: Arc<dyn BaselineStore> = match &config.baseline_path {
            Some(path) => Arc::new(JsonFileBaselineStore::new(path)),
            None => Arc::new(MemoryBaselineStore::new()),
        };
        Self::new(config, store, metrics)
    }

    /// Create a tracker that keeps baselines in memory.
    pub fn in_memory(config: TrackerConfig) -> Result<Self> {
        Self::new(
            config,
            Arc::new(MemoryBaselineStore::new()),
            Arc::new(ReliabilityMetrics::new()),
        )
    }

    /// Tracker configuration.
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    fn state(&self, operation_name: &str) -> Arc<Mutex<OperationState>> {
        if let Some(state) = self
            .operations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(operation_name)
        {
            return Arc::clone(state);
        }

        let mut operations = self
            .operations
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let window_size = self.config.window_size;
        Arc::clone(
            operations
                .entry(operation_name.to_string())
                .or_insert_with(|| {
                    Arc::new(Mutex::new(OperationState::new(operation_name, window_size)))
                }),
        )
    }

    fn existing(&self, operation_name: &str) -> Option<Arc<Mutex<OperationState>>> {
        self.operations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(operation_name)
            .cloned()
    }

    /// Record one execution of `operation_name`.
    pub fn record(&self, operation_name: &str, duration: Duration, success: bool) {
        let state = self.state(operation_name);
        let established = {
            let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
            let sample = PerformanceSample {
                operation_name: Arc::clone(&state.name),
                duration,
                success,
                timestamp: now(),
            };
            let value = sample.duration_ms();
            state.window.push(sample);
            state.total_recorded += 1;

            if state.baseline.is_none() {
                state.seen.push(value);
                if state.seen.count() >= self.config.min_samples {
                    let baseline = Baseline::from_stats(operation_name, &state.seen);
                    state.baseline = Some(baseline.clone());
                    Some(baseline)
                } else {
                    None
                }
            } else {
                None
            }
        };
        self.metrics.samples_recorded.inc();

        if let Some(baseline) = established {
            self.metrics.baselines_established.inc();
            info!(
                operation = %operation_name,
                mean_ms = baseline.mean,
                stddev_ms = baseline.stddev,
                samples = baseline.sample_count,
                "Baseline established"
            );
            self.persist_logged();
        }
    }

    /// Compare the current rolling mean against the baseline threshold.
    pub fn check_degradation(&self, operation_name: &str) -> DegradationReport {
        let Some(state) = self.existing(operation_name) else {
            return DegradationReport::no_baseline(None);
        };
        let state = state.lock().unwrap_or_else(PoisonError::into_inner);
        let current_mean = (!state.window.is_empty()).then(|| state.window.stats().mean());

        let Some(baseline) = &state.baseline else {
            return DegradationReport::no_baseline(current_mean);
        };
        let threshold = baseline.threshold(self.config.degradation_k);

        let (status, severity) = match current_mean {
            Some(mean) if mean > threshold => {
                let scale = if baseline.stddev > 0.0 {
                    baseline.stddev
                } else {
                    baseline.mean.abs().max(1.0)
                };
                (DegradationStatus::Degraded, (mean - threshold) / scale)
            }
            _ => (DegradationStatus::Ok, 0.0),
        };

        DegradationReport {
            status,
            severity,
            level: Severity::from_score(severity),
            current_mean,
            threshold: Some(threshold),
        }
    }

    /// Drop the baseline so the next `min_samples` samples establish a new one.
    ///
    /// Returns whether a baseline existed.
    pub fn reset_baseline(&self, operation_name: &str) -> Result<bool> {
        let Some(state) = self.existing(operation_name) else {
            return Ok(false);
        };
        let existed = {
            let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
            state.seen = RunningStats::new();
            state.baseline.take().is_some()
        };
        if existed {
            info!(operation = %operation_name, "Baseline reset");
            self.persist()?;
        }
        Ok(existed)
    }

    /// Established baseline for an operation.
    pub fn baseline(&self, operation_name: &str) -> Option<Baseline> {
        let state = self.existing(operation_name)?;
        let state = state.lock().unwrap_or_else(PoisonError::into_inner);
        state.baseline.clone()
    }

    /// Every established baseline.
    pub fn baselines(&self) -> BaselineMap {
        let states: Vec<_> = self
            .operations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        states
            .iter()
            .filter_map(|state| {
                let state = state.lock().unwrap_or_else(PoisonError::into_inner);
                state
                    .baseline
                    .as_ref()
                    .map(|b| (state.name.to_string(), b.clone()))
            })
            .collect()
    }

    /// Window statistics for an operation.
    pub fn stats(&self, operation_name: &str) -> Option<OperationSnapshot> {
        let state = self.existing(operation_name)?;
        let state = state.lock().unwrap_or_else(PoisonError::into_inner);
        Some(OperationSnapshot {
            operation_name: state.name.to_string(),
            window_len: state.window.len(),
            mean: state.window.stats().mean(),
            stddev: state.window.stats().stddev(),
            error_rate: state.window.error_rate(),
            total_recorded: state.total_recorded,
            baseline: state.baseline.clone(),
        })
    }

    /// The `n` most recent samples of an operation.
    pub fn recent_window(&self, operation_name: &str, n: usize) -> Option<WindowSnapshot> {
        let state = self.existing(operation_name)?;
        let state = state.lock().unwrap_or_else(PoisonError::into_inner);
        let (durations_ms, failures) = state.window.recent(n);
        Some(WindowSnapshot {
            durations_ms,
            failures,
            total_recorded: state.total_recorded,
        })
    }

    /// Names of every operation seen or loaded, sorted.
    pub fn operation_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .operations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Persist every baseline now.
    pub fn flush(&self) -> Result<()> {
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        let _guard = self
            .persist_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let baselines = self.baselines();
        self.store.save(&baselines)
    }

    fn persist_logged(&self) {
        if let Err(e) = self.persist() {
            self.metrics.baseline_persist_failures.inc();
            warn!(store = %self.store.describe(), error = %e, "Failed to persist baselines");
        }
    }
}
