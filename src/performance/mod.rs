//! Performance tracking.
//!
//! Rolling windows of operation durations, frozen baselines and
//! degradation checks against them.

pub mod baseline;
pub mod stats;
pub mod tracker;

pub use baseline::{Baseline, BaselineMap, BaselineStore, JsonFileBaselineStore, MemoryBaselineStore};
pub use stats::{duration_ms, percentile, PerformanceSample, RollingWindow, RunningStats};
pub use tracker::{
    DegradationReport, DegradationStatus, OperationSnapshot, PerformanceTracker, WindowSnapshot,
};
