//! Wiring of the reliability components.

use crate::audit::{AuditEntry, References};
use crate::config::ReliabilityConfig;
use crate::core::{Result, Status};
use crate::monitoring::ReliabilityMetrics;
use crate::performance::PerformanceTracker;
use crate::provenance::{OperationToken, ProvenanceManager};
use crate::sla::{EvaluationSummary, MetricSource, MonitorHandle, SlaMonitor};
use std::sync::Arc;
use tracing::info;

/// Provenance, performance tracking and SLA monitoring built from one config.
///
/// Completing an operation through the context both commits its audit entry
/// and records its duration, so the monitor sees every tracked step.
pub struct ReliabilityContext {
    config: ReliabilityConfig,
    metrics: Arc<ReliabilityMetrics>,
    provenance: ProvenanceManager,
    tracker: Arc<PerformanceTracker>,
    monitor: Arc<SlaMonitor>,
}

impl ReliabilityContext {
    /// Build every component. Fails on invalid configuration or an unreadable
    /// baseline file.
    pub fn new(config: ReliabilityConfig) -> Result<Self> {
        config.validate()?;
        let metrics = Arc::new(ReliabilityMetrics::new());
        let provenance = ProvenanceManager::new(&config.provenance, Arc::clone(&metrics));
        let tracker = Arc::new(PerformanceTracker::from_config(
            config.tracker.clone(),
            Arc::clone(&metrics),
        )?);
        let source: Arc<dyn MetricSource> = tracker.clone();
        let monitor = Arc::new(SlaMonitor::new(source, &config.sla, Arc::clone(&metrics))?);

        info!(
            genesis = %provenance.genesis_hash(),
            thresholds = config.sla.operations.len(),
            "Reliability context ready"
        );
        Ok(Self {
            config,
            metrics,
            provenance,
            tracker,
            monitor,
        })
    }

    /// Configuration the context was built from.
    pub fn config(&self) -> &ReliabilityConfig {
        &self.config
    }

    /// Shared metrics registry.
    pub fn metrics(&self) -> &Arc<ReliabilityMetrics> {
        &self.metrics
    }

    /// Provenance manager.
    pub fn provenance(&self) -> &ProvenanceManager {
        &self.provenance
    }

    /// Performance tracker.
    pub fn tracker(&self) -> &Arc<PerformanceTracker> {
        &self.tracker
    }

    /// SLA monitor.
    pub fn monitor(&self) -> &Arc<SlaMonitor> {
        &self.monitor
    }

    /// Begin an operation on a trail.
    pub fn start_operation(
        &self,
        trail_id: &str,
        operation_type: &str,
        used: References,
    ) -> OperationToken {
        self.provenance.start_operation(trail_id, operation_type, used)
    }

    /// Commit the operation's audit entry and record its duration.
    pub fn complete_operation(
        &self,
        token: &OperationToken,
        generated: References,
        status: Status,
    ) -> Result<AuditEntry> {
        let entry = self
            .provenance
            .complete_operation(token, generated, status)?;
        self.tracker.record(
            entry.operation_type(),
            entry.duration().unwrap_or_default(),
            status.is_success(),
        );
        Ok(entry)
    }

    /// Run one SLA evaluation now.
    pub fn evaluate(&self) -> Result<EvaluationSummary> {
        self.monitor.evaluate()
    }

    /// Start periodic evaluation at the configured interval.
    pub fn start_monitor(&self) -> MonitorHandle {
        self.monitor.start(self.config.sla.evaluation_interval())
    }

    /// Persist baselines now.
    pub fn flush(&self) -> Result<()> {
        self.tracker.flush()
    }

    /// Stop the monitor (if running), deliver queued alerts and persist
    /// baselines.
    pub async fn shutdown(&self, monitor: Option<MonitorHandle>) -> Result<()> {
        match monitor {
            Some(handle) => handle.stop().await?,
            None => {
                self.monitor.drain_alerts();
            }
        }
        self.flush()?;
        info!("Reliability context shut down");
        Ok(())
    }
}
