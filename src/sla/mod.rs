//! SLA Module
//!
//! Provides Service Level Agreement monitoring:
//! - Per-operation duration and error-rate thresholds
//! - Hysteresis-based violation lifecycle
//! - Alert handlers behind a bounded dispatch queue

mod dispatch;
pub mod handler;
pub mod monitor;
pub mod source;
pub mod threshold;
pub mod violation;

pub use handler::{AlertHandler, FnHandler, HandlerId};
pub use monitor::{EvaluationSummary, MonitorHandle, SlaMonitor};
pub use source::{MetricSource, SampleBuffer};
pub use threshold::{SlaThreshold, DEFAULT_THRESHOLD_NAME};
pub use violation::{ViolationEvent, ViolationKind, ViolationState};
