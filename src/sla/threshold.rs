//! SLA thresholds.

use crate::config::{DEFAULT_EVALUATION_WINDOW, DEFAULT_HYSTERESIS_COUNT, DEFAULT_PERCENTILE};
use crate::core::{Error, Result};
use crate::performance::duration_ms;
use std::time::Duration;

/// Name under which the global default threshold is reported.
pub const DEFAULT_THRESHOLD_NAME: &str = "*";

/// Limits for one operation.
#[derive(Clone, Debug, PartialEq)]
pub struct SlaThreshold {
    /// Operation name, or [`DEFAULT_THRESHOLD_NAME`]
    pub operation_name: String,
    /// Maximum acceptable duration percentile
    pub max_duration: Duration,
    /// Maximum acceptable error rate in [0, 1]
    pub max_error_rate: f64,
    /// Number of most recent samples evaluated
    pub window_size: usize,
    /// Consecutive good evaluations before a violation resolves
    pub hysteresis_count: u32,
    /// Duration percentile compared against `max_duration`
    pub percentile: f64,
}

impl SlaThreshold {
    /// Create a validated threshold with the default percentile.
    pub fn new(
        operation_name: &str,
        max_duration: Duration,
        max_error_rate: f64,
        window_size: usize,
        hysteresis_count: u32,
    ) -> Result<Self> {
        let threshold = Self {
            operation_name: operation_name.to_string(),
            max_duration,
            max_error_rate,
            window_size,
            hysteresis_count,
            percentile: DEFAULT_PERCENTILE,
        };
        threshold.validate()?;
        Ok(threshold)
    }

    /// Threshold with the default window and hysteresis.
    pub fn with_defaults(
        operation_name: &str,
        max_duration: Duration,
        max_error_rate: f64,
    ) -> Result<Self> {
        Self::new(
            operation_name,
            max_duration,
            max_error_rate,
            DEFAULT_EVALUATION_WINDOW,
            DEFAULT_HYSTERESIS_COUNT,
        )
    }

    /// Evaluate a different duration percentile.
    pub fn with_percentile(mut self, percentile: f64) -> Result<Self> {
        self.percentile = percentile;
        self.validate()?;
        Ok(self)
    }

    /// `max_duration` in milliseconds.
    pub fn max_duration_ms(&self) -> f64 {
        duration_ms(self.max_duration)
    }

    /// Check every limit.
    pub fn validate(&self) -> Result<()> {
        let name = &self.operation_name;
        if !self.max_error_rate.is_finite() || !(0.0..=1.0).contains(&self.max_error_rate) {
            return Err(Error::config(format!(
                "{name}: max_error_rate must be within [0, 1], got {}",
                self.max_error_rate
            )));
        }
        if self.window_size == 0 {
            return Err(Error::config(format!("{name}: window_size must be at least 1")));
        }
        if self.hysteresis_count == 0 {
            return Err(Error::config(format!(
                "{name}: hysteresis_count must be at least 1"
            )));
        }
        if !self.percentile.is_finite() || self.percentile <= 0.0 || self.percentile > 100.0 {
            return Err(Error::config(format!(
                "{name}: percentile must be within (0, 100], got {}",
                self.percentile
            )));
        }
        Ok(())
    }

    /// Same limits, applied to another operation.
    pub(crate) fn for_operation(&self, operation_name: &str) -> Self {
        Self {
            operation_name: operation_name.to_string(),
            ..self.clone()
        }
    }
}
