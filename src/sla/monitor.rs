//! SLA evaluation with hysteresis.
//!
//! Each (operation, kind) pair is a two-state machine. The first breaching
//! evaluation opens a violation; it resolves only after `hysteresis_count`
//! consecutive clean evaluations.

use crate::config::SlaConfig;
use crate::core::{Error, Result};
use crate::monitoring::ReliabilityMetrics;
use crate::performance::percentile;
use crate::sla::dispatch::{run_dispatcher, AlertQueue};
use crate::sla::handler::{AlertHandler, HandlerId, HandlerRegistry};
use crate::sla::source::MetricSource;
use crate::sla::threshold::{SlaThreshold, DEFAULT_THRESHOLD_NAME};
use crate::sla::violation::{ViolationEvent, ViolationKind};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// What one call to [`SlaMonitor::evaluate`] did.
#[derive(Clone, Debug, Default)]
pub struct EvaluationSummary {
    /// Operations that received a verdict
    pub evaluated: Vec<String>,
    /// Operations without enough new samples
    pub skipped: Vec<String>,
    /// Violations opened
    pub opened: Vec<ViolationEvent>,
    /// Violations resolved
    pub resolved: Vec<ViolationEvent>,
}

impl EvaluationSummary {
    /// Whether any violation changed state.
    pub fn has_transitions(&self) -> bool {
        !self.opened.is_empty() || !self.resolved.is_empty()
    }
}

#[derive(Default)]
struct KindState {
    open: Option<ViolationEvent>,
    good_streak: u32,
}

impl KindState {
    fn advance(
        &mut self,
        operation_name: &str,
        kind: ViolationKind,
        observed: f64,
        limit: f64,
        hysteresis_count: u32,
    ) -> Option<ViolationEvent> {
        let breached = observed > limit;
        if breached {
            self.good_streak = 0;
            if self.open.is_some() {
                return None;
            }
            let event = ViolationEvent::open(operation_name, kind, observed, limit);
            self.open = Some(event.clone());
            return Some(event);
        }

        if self.open.is_none() {
            return None;
        }
        self.good_streak += 1;
        if self.good_streak < hysteresis_count {
            return None;
        }
        self.good_streak = 0;
        self.open.take().map(|event| event.resolve(observed))
    }
}

#[derive(Default)]
struct OperationState {
    last_total: Option<u64>,
    duration: KindState,
    error_rate: KindState,
}

impl OperationState {
    fn open_events(&self) -> impl Iterator<Item = &ViolationEvent> {
        self.duration.open.iter().chain(self.error_rate.open.iter())
    }
}

#[derive(Default)]
struct MonitorState {
    thresholds: HashMap<String, SlaThreshold>,
    default: Option<SlaThreshold>,
    operations: HashMap<String, OperationState>,
    history: VecDeque<ViolationEvent>,
}

/// Evaluates SLA thresholds against a [`MetricSource`] and emits violations.
pub struct SlaMonitor {
    source: Arc<dyn MetricSource>,
    state: Mutex<MonitorState>,
    handlers: Arc<HandlerRegistry>,
    queue: Arc<AlertQueue>,
    metrics: Arc<ReliabilityMetrics>,
    history_limit: usize,
    stopped: AtomicBool,
}

impl SlaMonitor {
    /// Create a monitor with the thresholds from `config`.
    pub fn new(
        source: Arc<dyn MetricSource>,
        config: &SlaConfig,
        metrics: Arc<ReliabilityMetrics>,
    ) -> Result<Self> {
        config.validate()?;
        let monitor = Self::build(
            source,
            config.alert_queue_capacity,
            config.history_limit,
            metrics,
        );
        {
            let mut state = monitor.lock_state();
            if let Some(spec) = &config.default {
                state.default = Some(spec.to_threshold(DEFAULT_THRESHOLD_NAME)?);
            }
            for (name, spec) in &config.operations {
                state.thresholds.insert(name.clone(), spec.to_threshold(name)?);
            }
        }
        Ok(monitor)
    }

    /// Create a monitor with default queue and history sizes and no thresholds.
    pub fn with_source(source: Arc<dyn MetricSource>) -> Self {
        let defaults = SlaConfig::default();
        Self::build(
            source,
            defaults.alert_queue_capacity,
            defaults.history_limit,
            Arc::new(ReliabilityMetrics::new()),
        )
    }

    fn build(
        source: Arc<dyn MetricSource>,
        queue_capacity: usize,
        history_limit: usize,
        metrics: Arc<ReliabilityMetrics>,
    ) -> Self {
        Self {
            source,
            state: Mutex::new(MonitorState::default()),
            handlers: Arc::new(HandlerRegistry::new(Arc::clone(&metrics))),
            queue: Arc::new(AlertQueue::new(queue_capacity, Arc::clone(&metrics))),
            metrics,
            history_limit,
            stopped: AtomicBool::new(false),
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the threshold for one operation.
    pub fn configure(
        &self,
        operation_name: &str,
        max_duration: Duration,
        max_error_rate: f64,
        window_size: usize,
        hysteresis_count: u32,
    ) -> Result<()> {
        let threshold = SlaThreshold::new(
            operation_name,
            max_duration,
            max_error_rate,
            window_size,
            hysteresis_count,
        )?;
        self.configure_threshold(threshold)
    }

    /// Set a prepared threshold.
    pub fn configure_threshold(&self, threshold: SlaThreshold) -> Result<()> {
        threshold.validate()?;
        if threshold.operation_name == DEFAULT_THRESHOLD_NAME {
            return Err(Error::config(format!(
                "'{DEFAULT_THRESHOLD_NAME}' is reserved; use configure_default"
            )));
        }
        debug!(operation = %threshold.operation_name, "SLA threshold configured");
        self.lock_state()
            .thresholds
            .insert(threshold.operation_name.clone(), threshold);
        Ok(())
    }

    /// Set the threshold applied to operations without their own.
    pub fn configure_default(
        &self,
        max_duration: Duration,
        max_error_rate: f64,
        window_size: usize,
        hysteresis_count: u32,
    ) -> Result<()> {
        let threshold = SlaThreshold::new(
            DEFAULT_THRESHOLD_NAME,
            max_duration,
            max_error_rate,
            window_size,
            hysteresis_count,
        )?;
        self.lock_state().default = Some(threshold);
        Ok(())
    }

    /// Stop evaluating an operation's explicit threshold.
    ///
    /// Open violations of the operation are resolved with their last observed
    /// value and delivered like any other resolution. Returns whether a
    /// threshold was configured.
    pub fn remove(&self, operation_name: &str) -> bool {
        let mut rejected = Vec::new();
        let removed = {
            let mut state = self.lock_state();
            let removed = state.thresholds.remove(operation_name).is_some();
            if let Some(mut op) = state.operations.remove(operation_name) {
                let open = [op.duration.open.take(), op.error_rate.open.take()];
                for event in open.into_iter().flatten() {
                    let observed = event.observed_value;
                    let event = event.resolve(observed);
                    info!(
                        operation = %operation_name,
                        kind = %event.kind,
                        violation = %event.id,
                        "Resolved open violation of removed threshold"
                    );
                    self.note_resolved(&mut state.history, &event);
                    self.enqueue(event, &mut rejected);
                }
            }
            removed
        };
        self.deliver_rejected(rejected);
        removed
    }

    fn note_resolved(&self, history: &mut VecDeque<ViolationEvent>, event: &ViolationEvent) {
        self.metrics.violations_resolved.inc();
        self.metrics.open_violations.dec();
        history.push_back(event.clone());
        while history.len() > self.history_limit {
            history.pop_front();
        }
    }

    fn enqueue(&self, event: ViolationEvent, rejected: &mut Vec<ViolationEvent>) {
        if let Err(event) = self.queue.push(event) {
            rejected.push(event);
        }
    }

    /// Deliver events the closed queue refused. Runs without the state lock.
    fn deliver_rejected(&self, rejected: Vec<ViolationEvent>) {
        for event in rejected {
            warn!(
                operation = %event.operation_name,
                violation = %event.id,
                state = ?event.state,
                "Alert queue closed, delivering on the calling thread"
            );
            self.handlers.deliver(&event);
        }
    }

    /// Threshold in effect for an operation.
    pub fn threshold(&self, operation_name: &str) -> Option<SlaThreshold> {
        let state = self.lock_state();
        state
            .thresholds
            .get(operation_name)
            .cloned()
            .or_else(|| state.default.as_ref().map(|d| d.for_operation(operation_name)))
    }

    /// Register a handler for OPEN and RESOLVED transitions.
    pub fn register_alert_handler(&self, handler: Arc<dyn AlertHandler>) -> HandlerId {
        self.handlers.register(handler)
    }

    /// Remove a handler. Returns whether it was registered.
    pub fn unregister_alert_handler(&self, id: HandlerId) -> bool {
        self.handlers.unregister(id)
    }

    /// Evaluate every configured operation once.
    pub fn evaluate(&self) -> Result<EvaluationSummary> {
        let mut rejected = Vec::new();
        let summary = self.evaluate_locked(&mut rejected)?;
        self.deliver_rejected(rejected);
        Ok(summary)
    }

    fn evaluate_locked(&self, rejected: &mut Vec<ViolationEvent>) -> Result<EvaluationSummary> {
        let mut summary = EvaluationSummary::default();
        let mut state = self.lock_state();
        // Checked under the lock so that `stop` never closes the queue mid-evaluation.
        if self.stopped.load(Ordering::Acquire) {
            return Err(Error::MonitorStopped);
        }
        let state = &mut *state;

        let mut targets: Vec<SlaThreshold> = state.thresholds.values().cloned().collect();
        if let Some(default) = &state.default {
            for name in self.source.operation_names() {
                if !state.thresholds.contains_key(&name) {
                    targets.push(default.for_operation(&name));
                }
            }
        }
        targets.sort_by(|a, b| a.operation_name.cmp(&b.operation_name));

        for threshold in targets {
            let name = threshold.operation_name.clone();
            let window = match self.source.recent_samples(&name, threshold.window_size) {
                Some(window) if window.len() >= threshold.window_size => window,
                _ => {
                    summary.skipped.push(name);
                    continue;
                }
            };

            let op = state.operations.entry(name.clone()).or_default();
            if op.last_total == Some(window.total_recorded) {
                summary.skipped.push(name);
                continue;
            }
            op.last_total = Some(window.total_recorded);

            let mut durations = window.durations_ms.clone();
            let observed_duration = percentile(&mut durations, threshold.percentile).unwrap_or(0.0);
            let observed_error_rate = window.error_rate();

            let transitions = [
                op.duration.advance(
                    &name,
                    ViolationKind::Duration,
                    observed_duration,
                    threshold.max_duration_ms(),
                    threshold.hysteresis_count,
                ),
                op.error_rate.advance(
                    &name,
                    ViolationKind::ErrorRate,
                    observed_error_rate,
                    threshold.max_error_rate,
                    threshold.hysteresis_count,
                ),
            ];

            for event in transitions.into_iter().flatten() {
                if event.is_open() {
                    self.metrics.violations_opened.inc();
                    self.metrics.open_violations.inc();
                    warn!(
                        operation = %event.operation_name,
                        kind = %event.kind,
                        observed = event.observed_value,
                        threshold = event.threshold_value,
                        violation = %event.id,
                        "SLA violation opened"
                    );
                    summary.opened.push(event.clone());
                } else {
                    info!(
                        operation = %event.operation_name,
                        kind = %event.kind,
                        observed = event.observed_value,
                        violation = %event.id,
                        "SLA violation resolved"
                    );
                    self.note_resolved(&mut state.history, &event);
                    summary.resolved.push(event.clone());
                }
                self.enqueue(event, rejected);
            }
            summary.evaluated.push(name);
        }

        Ok(summary)
    }

    /// Currently open violations, oldest first.
    pub fn open_violations(&self) -> Vec<ViolationEvent> {
        let state = self.lock_state();
        let mut open: Vec<ViolationEvent> = state
            .operations
            .values()
            .flat_map(|op| op.open_events().cloned())
            .collect();
        open.sort_by(|a, b| a.opened_at.cmp(&b.opened_at));
        open
    }

    /// Resolved violations, oldest first, bounded by the history limit.
    pub fn history(&self) -> Vec<ViolationEvent> {
        self.lock_state().history.iter().cloned().collect()
    }

    /// Deliver every queued alert on the calling thread.
    ///
    /// Returns the number of events delivered.
    pub fn drain_alerts(&self) -> usize {
        let events = self.queue.take_all();
        for event in &events {
            self.handlers.deliver(event);
        }
        events.len()
    }

    /// Events waiting for delivery.
    pub fn pending_alerts(&self) -> usize {
        self.queue.len()
    }

    /// Whether the periodic loop has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Spawn the periodic evaluation loop and the alert dispatcher.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self: &Arc<Self>, interval: Duration) -> MonitorHandle {
        let interval = interval.max(Duration::from_millis(1));
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let monitor = Arc::clone(self);
        let evaluator = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = monitor.evaluate() {
                            debug!(error = %e, "Evaluation loop exiting");
                            break;
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
        });
        let dispatcher = tokio::spawn(run_dispatcher(
            Arc::clone(&self.queue),
            Arc::clone(&self.handlers),
        ));

        info!(interval_ms = interval.as_millis() as u64, "SLA monitor started");
        MonitorHandle {
            monitor: Arc::clone(self),
            shutdown,
            evaluator,
            dispatcher,
        }
    }
}

/// Controls a running monitor.
pub struct MonitorHandle {
    monitor: Arc<SlaMonitor>,
    shutdown: watch::Sender<bool>,
    evaluator: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
}

impl MonitorHandle {
    /// Stop evaluating, then wait until every queued alert is delivered.
    pub async fn stop(self) -> Result<()> {
        self.monitor.stopped.store(true, Ordering::Release);
        // The receiver may already be gone if the loop exited on its own.
        let _ = self.shutdown.send(true);
        self.evaluator
            .await
            .map_err(|e| Error::Internal(format!("evaluation loop failed: {e}")))?;

        {
            // Evaluations already holding the state lock enqueue before the close.
            let _state = self.monitor.lock_state();
            self.monitor.queue.close();
        }
        self.dispatcher
            .await
            .map_err(|e| Error::Internal(format!("alert dispatcher failed: {e}")))?;
        info!("SLA monitor stopped");
        Ok(())
    }
}
