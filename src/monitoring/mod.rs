//! Monitoring Module
//!
//! Observability for the reliability layer itself:
//! - Counters and gauges with Prometheus export
//! - Structured logging setup

pub mod logging;
pub mod metrics;

pub use logging::{init_tracing, init_tracing_with_filter};
pub use metrics::{Counter, Gauge, MetricsSnapshot, ReliabilityMetrics};
