//! Startup configuration.
//!
//! One [`ReliabilityConfig`] is loaded at process start and handed to
//! [`crate::ReliabilityContext::new`]. Every default lives in the constants
//! below so that constructing a component directly and constructing it from a
//! config file produce the same behaviour.

use crate::core::{Error, Result};
use crate::sla::SlaThreshold;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default seed for trail genesis hashes.
pub const DEFAULT_GENESIS_SEED: &str = "opsledger";
/// Default rolling window capacity per operation.
pub const DEFAULT_WINDOW_SIZE: usize = 1000;
/// Default number of samples before a baseline is frozen.
pub const DEFAULT_MIN_SAMPLES: u64 = 100;
/// Default degradation multiplier (stddevs above the baseline mean).
pub const DEFAULT_DEGRADATION_K: f64 = 3.0;
/// Default duration percentile evaluated against `max_duration`.
pub const DEFAULT_PERCENTILE: f64 = 95.0;
/// Default SLA evaluation window.
pub const DEFAULT_EVALUATION_WINDOW: usize = 20;
/// Default number of consecutive good evaluations before resolving.
pub const DEFAULT_HYSTERESIS_COUNT: u32 = 3;
/// Default period of the evaluation loop.
pub const DEFAULT_EVALUATION_INTERVAL_MS: u64 = 10_000;
/// Default capacity of the pending alert queue.
pub const DEFAULT_ALERT_QUEUE_CAPACITY: usize = 1024;
/// Default number of resolved violations kept in memory.
pub const DEFAULT_HISTORY_LIMIT: usize = 1000;

/// Top-level configuration object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReliabilityConfig {
    /// Provenance parameters
    pub provenance: ProvenanceConfig,
    /// Performance tracker parameters
    pub tracker: TrackerConfig,
    /// SLA thresholds and monitor parameters
    pub sla: SlaConfig,
}

impl ReliabilityConfig {
    /// Parse and validate a JSON configuration string.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.tracker.validate()?;
        self.sla.validate()?;
        Ok(())
    }
}

/// Provenance configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvenanceConfig {
    /// Seed the genesis hash of every trail is derived from
    pub genesis_seed: String,
}

impl Default for ProvenanceConfig {
    fn default() -> Self {
        Self {
            genesis_seed: DEFAULT_GENESIS_SEED.to_string(),
        }
    }
}

/// Performance tracker configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Rolling window capacity per operation
    pub window_size: usize,
    /// Samples required before a baseline is established
    pub min_samples: u64,
    /// Degradation multiplier `k`
    pub degradation_k: f64,
    /// Baseline file; baselines stay in memory when unset
    pub baseline_path: Option<PathBuf>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            min_samples: DEFAULT_MIN_SAMPLES,
            degradation_k: DEFAULT_DEGRADATION_K,
            baseline_path: None,
        }
    }
}

impl TrackerConfig {
    /// Set the baseline file.
    pub fn with_baseline_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.baseline_path = Some(path.into());
        self
    }

    /// Check tracker parameters.
    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            return Err(Error::config("tracker.window_size must be at least 1"));
        }
        if self.min_samples < 2 {
            return Err(Error::config("tracker.min_samples must be at least 2"));
        }
        if !self.degradation_k.is_finite() || self.degradation_k < 0.0 {
            return Err(Error::config(
                "tracker.degradation_k must be a non-negative number",
            ));
        }
        Ok(())
    }
}

/// Serialized form of one SLA threshold.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ThresholdSpec {
    /// Maximum acceptable duration percentile (milliseconds)
    pub max_duration_ms: f64,
    /// Maximum acceptable error rate in [0, 1]
    pub max_error_rate: f64,
    /// Number of most recent samples evaluated
    #[serde(default = "default_evaluation_window")]
    pub window_size: usize,
    /// Consecutive good evaluations before a violation resolves
    #[serde(default = "default_hysteresis_count")]
    pub hysteresis_count: u32,
    /// Duration percentile compared against `max_duration_ms`
    #[serde(default = "default_percentile")]
    pub percentile: f64,
}

fn default_evaluation_window() -> usize {
    DEFAULT_EVALUATION_WINDOW
}

fn default_hysteresis_count() -> u32 {
    DEFAULT_HYSTERESIS_COUNT
}

fn default_percentile() -> f64 {
    DEFAULT_PERCENTILE
}

impl ThresholdSpec {
    /// Build a validated threshold for an operation.
    pub fn to_threshold(&self, operation_name: &str) -> Result<SlaThreshold> {
        if !self.max_duration_ms.is_finite() || self.max_duration_ms < 0.0 {
            return Err(Error::config(format!(
                "{operation_name}: max_duration_ms must be a non-negative number"
            )));
        }
        let max_duration = Duration::try_from_secs_f64(self.max_duration_ms / 1000.0)
            .map_err(|e| Error::config(format!("{operation_name}: max_duration_ms {e}")))?;
        let threshold = SlaThreshold::new(
            operation_name,
            max_duration,
            self.max_error_rate,
            self.window_size,
            self.hysteresis_count,
        )?;
        threshold.with_percentile(self.percentile)
    }
}

/// SLA monitor configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SlaConfig {
    /// Threshold applied to operations without their own entry
    pub default: Option<ThresholdSpec>,
    /// Per-operation thresholds
    pub operations: HashMap<String, ThresholdSpec>,
    /// Period of the evaluation loop (milliseconds)
    pub evaluation_interval_ms: u64,
    /// Capacity of the pending alert queue
    pub alert_queue_capacity: usize,
    /// Resolved violations kept in memory
    pub history_limit: usize,
}

impl Default for SlaConfig {
    fn default() -> Self {
        Self {
            default: None,
            operations: HashMap::new(),
            evaluation_interval_ms: DEFAULT_EVALUATION_INTERVAL_MS,
            alert_queue_capacity: DEFAULT_ALERT_QUEUE_CAPACITY,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl SlaConfig {
    /// Evaluation period as a [`Duration`].
    pub fn evaluation_interval(&self) -> Duration {
        Duration::from_millis(self.evaluation_interval_ms)
    }

    /// Check monitor parameters and every threshold.
    pub fn validate(&self) -> Result<()> {
        if self.evaluation_interval_ms == 0 {
            return Err(Error::config("sla.evaluation_interval_ms must be positive"));
        }
        if self.alert_queue_capacity == 0 {
            return Err(Error::config("sla.alert_queue_capacity must be at least 1"));
        }
        if let Some(default) = &self.default {
            default.to_threshold(crate::sla::DEFAULT_THRESHOLD_NAME)?;
        }
        for (name, spec) in &self.operations {
            spec.to_threshold(name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ReliabilityConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tracker.window_size, DEFAULT_WINDOW_SIZE);
        assert_eq!(config.tracker.min_samples, DEFAULT_MIN_SAMPLES);
        assert_eq!(config.provenance.genesis_seed, DEFAULT_GENESIS_SEED);
    }

    #[test]
    fn test_from_json_partial() {
        let json = r#"{
            "tracker": { "window_size": 50 },
            "sla": {
                "operations": {
                    "extract_entities": { "max_duration_ms": 200, "max_error_rate": 0.05 }
                }
            }
        }"#;
        let config = ReliabilityConfig::from_json(json).unwrap();
        assert_eq!(config.tracker.window_size, 50);
        assert_eq!(config.tracker.min_samples, DEFAULT_MIN_SAMPLES);

        let spec = &config.sla.operations["extract_entities"];
        assert_eq!(spec.window_size, DEFAULT_EVALUATION_WINDOW);
        assert_eq!(spec.hysteresis_count, DEFAULT_HYSTERESIS_COUNT);
    }

    #[test]
    fn test_rejects_zero_window() {
        let json = r#"{ "tracker": { "window_size": 0 } }"#;
        assert!(matches!(
            ReliabilityConfig::from_json(json),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_rejects_negative_duration() {
        let json = r#"{ "sla": { "operations": {
            "op": { "max_duration_ms": -5, "max_error_rate": 0.1 }
        } } }"#;
        assert!(matches!(
            ReliabilityConfig::from_json(json),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_rejects_unrepresentable_duration() {
        let json = r#"{ "sla": { "operations": {
            "op": { "max_duration_ms": 1e30, "max_error_rate": 0.1 }
        } } }"#;
        assert!(matches!(
            ReliabilityConfig::from_json(json),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_rejects_bad_error_rate_in_default() {
        let json = r#"{ "sla": { "default": { "max_duration_ms": 100, "max_error_rate": 1.5 } } }"#;
        assert!(ReliabilityConfig::from_json(json).is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("opsledger.json");
        std::fs::write(&path, r#"{ "provenance": { "genesis_seed": "pipeline-a" } }"#).unwrap();

        let config = ReliabilityConfig::from_file(&path).unwrap();
        assert_eq!(config.provenance.genesis_seed, "pipeline-a");
    }
}
