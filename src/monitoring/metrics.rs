//! Prometheus-style counters and gauges for the reliability layer.
//!
//! Every component shares one [`ReliabilityMetrics`] through an `Arc`, so
//! conditions such as dropped alerts are observable rather than swallowed.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// A counter metric (monotonically increasing).
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    /// Create a new counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment by 1.
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment by amount.
    pub fn add(&self, amount: u64) {
        self.value.fetch_add(amount, Ordering::Relaxed);
    }

    /// Get current value.
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// A gauge metric (can go up or down).
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicI64,
}

impl Gauge {
    /// Create a new gauge.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the gauge value.
    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Relaxed);
    }

    /// Get current value.
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Increment by 1.
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement by 1.
    pub fn dec(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Point-in-time copy of every metric.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub entries_appended: u64,
    pub unknown_tokens: u64,
    pub samples_recorded: u64,
    pub baselines_established: u64,
    pub baseline_persist_failures: u64,
    pub violations_opened: u64,
    pub violations_resolved: u64,
    pub alerts_dispatched: u64,
    pub alerts_dropped: u64,
    pub handler_failures: u64,
    pub in_flight_operations: i64,
    pub open_violations: i64,
}

/// Metrics shared by the provenance manager, tracker and SLA monitor.
#[derive(Debug, Default)]
pub struct ReliabilityMetrics {
    /// Audit entries committed through the provenance manager
    pub entries_appended: Counter,
    /// `complete_operation` calls rejected with an unknown token
    pub unknown_tokens: Counter,
    /// Performance samples recorded
    pub samples_recorded: Counter,
    /// Baselines frozen
    pub baselines_established: Counter,
    /// Baseline writes that failed
    pub baseline_persist_failures: Counter,
    /// Violations opened
    pub violations_opened: Counter,
    /// Violations resolved
    pub violations_resolved: Counter,
    /// Events delivered to handlers
    pub alerts_dispatched: Counter,
    /// Pending events dropped because the alert queue was full
    pub alerts_dropped: Counter,
    /// Handler invocations that returned an error or panicked
    pub handler_failures: Counter,
    /// Operations started but not yet completed
    pub in_flight_operations: Gauge,
    /// Violations currently open
    pub open_violations: Gauge,
}

impl ReliabilityMetrics {
    /// Create a zeroed registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy every value.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            entries_appended: self.entries_appended.get(),
            unknown_tokens: self.unknown_tokens.get(),
            samples_recorded: self.samples_recorded.get(),
            baselines_established: self.baselines_established.get(),
            baseline_persist_failures: self.baseline_persist_failures.get(),
            violations_opened: self.violations_opened.get(),
            violations_resolved: self.violations_resolved.get(),
            alerts_dispatched: self.alerts_dispatched.get(),
            alerts_dropped: self.alerts_dropped.get(),
            handler_failures: self.handler_failures.get(),
            in_flight_operations: self.in_flight_operations.get(),
            open_violations: self.open_violations.get(),
        }
    }

    /// Export metrics in Prometheus text format.
    pub fn export_prometheus(&self) -> String {
        let counters: [(&str, &str, u64); 10] = [
            ("opsledger_entries_appended_total", "Audit entries committed", self.entries_appended.get()),
            ("opsledger_unknown_tokens_total", "Completions with unknown tokens", self.unknown_tokens.get()),
            ("opsledger_samples_recorded_total", "Performance samples recorded", self.samples_recorded.get()),
            ("opsledger_baselines_established_total", "Baselines established", self.baselines_established.get()),
            ("opsledger_baseline_persist_failures_total", "Failed baseline writes", self.baseline_persist_failures.get()),
            ("opsledger_violations_opened_total", "SLA violations opened", self.violations_opened.get()),
            ("opsledger_violations_resolved_total", "SLA violations resolved", self.violations_resolved.get()),
            ("opsledger_alerts_dispatched_total", "Alert events delivered", self.alerts_dispatched.get()),
            ("opsledger_alerts_dropped_total", "Alert events dropped on queue overflow", self.alerts_dropped.get()),
            ("opsledger_handler_failures_total", "Alert handler failures", self.handler_failures.get()),
        ];
        let gauges: [(&str, &str, i64); 2] = [
            ("opsledger_in_flight_operations", "Operations started but not completed", self.in_flight_operations.get()),
            ("opsledger_open_violations", "SLA violations currently open", self.open_violations.get()),
        ];

        let mut output = String::new();
        for (name, help, value) in counters {
            let _ = writeln!(output, "# HELP {name} {help}");
            let _ = writeln!(output, "# TYPE {name} counter");
            let _ = writeln!(output, "{name} {value}");
        }
        for (name, help, value) in gauges {
            let _ = writeln!(output, "# HELP {name} {help}");
            let _ = writeln!(output, "# TYPE {name} gauge");
            let _ = writeln!(output, "{name} {value}");
        }
        output
    }
}
