//! Bounded alert queue between evaluation and handlers.
//!
//! Evaluation only enqueues. When the queue is full the oldest pending event
//! is dropped and counted.

use crate::monitoring::ReliabilityMetrics;
use crate::sla::handler::HandlerRegistry;
use crate::sla::violation::ViolationEvent;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Notify;
use tracing::{debug, error, warn};

struct QueueState {
    events: VecDeque<ViolationEvent>,
    closed: bool,
}

pub(crate) struct AlertQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    capacity: usize,
    metrics: Arc<ReliabilityMetrics>,
}

impl AlertQueue {
    pub(crate) fn new(capacity: usize, metrics: Arc<ReliabilityMetrics>) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                events: VecDeque::with_capacity(capacity.min(1024)),
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
            metrics,
        }
    }

    /// Enqueue an event. A closed queue hands the event back.
    pub(crate) fn push(&self, event: ViolationEvent) -> Result<(), ViolationEvent> {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.closed {
                return Err(event);
            }
            if state.events.len() >= self.capacity {
                if let Some(dropped) = state.events.pop_front() {
                    self.metrics.alerts_dropped.inc();
                    warn!(
                        violation = %dropped.id,
                        operation = %dropped.operation_name,
                        capacity = self.capacity,
                        "Alert queue full, dropped oldest event"
                    );
                }
            }
            state.events.push_back(event);
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Take everything currently queued.
    pub(crate) fn take_all(&self) -> Vec<ViolationEvent> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .events
            .drain(..)
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .events
            .len()
    }

    /// Refuse further events and wake the dispatcher.
    pub(crate) fn close(&self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .closed = true;
        self.notify.notify_one();
    }

    /// Wait for queued events. `None` once closed and empty.
    pub(crate) async fn next_batch(&self) -> Option<Vec<ViolationEvent>> {
        loop {
            {
                let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
                if !state.events.is_empty() {
                    return Some(state.events.drain(..).collect());
                }
                if state.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }
}

/// Deliver queued events until the queue is closed and drained.
///
/// Handlers are synchronous, so each batch runs on the blocking pool.
pub(crate) async fn run_dispatcher(queue: Arc<AlertQueue>, handlers: Arc<HandlerRegistry>) {
    while let Some(batch) = queue.next_batch().await {
        let handlers = Arc::clone(&handlers);
        let delivery = tokio::task::spawn_blocking(move || {
            for event in &batch {
                handlers.deliver(event);
            }
        });
        if let Err(e) = delivery.await {
            error!(error = %e, "Alert delivery task failed");
        }
    }
    debug!("Alert dispatcher drained");
}
