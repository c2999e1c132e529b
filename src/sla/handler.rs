//! Alert handlers.

use crate::core::Result;
use crate::monitoring::ReliabilityMetrics;
use crate::sla::violation::ViolationEvent;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{error, warn};

/// Receives violation transitions.
pub trait AlertHandler: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Handle one OPEN or RESOLVED event.
    ///
    /// A started monitor calls this from tokio's blocking pool, so blocking
    /// I/O is acceptable here.
    fn handle(&self, event: &ViolationEvent) -> Result<()>;
}

/// Adapts a closure into an [`AlertHandler`].
pub struct FnHandler<F> {
    name: String,
    handler: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&ViolationEvent) -> Result<()> + Send + Sync,
{
    /// Wrap `handler` under `name`.
    pub fn new(name: &str, handler: F) -> Self {
        Self {
            name: name.to_string(),
            handler,
        }
    }
}

impl<F> AlertHandler for FnHandler<F>
where
    F: Fn(&ViolationEvent) -> Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self, event: &ViolationEvent) -> Result<()> {
        (self.handler)(event)
    }
}

/// Identifies a registered handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl std::fmt::Display for HandlerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "handler-{}", self.0)
    }
}

/// Registered handlers and the isolation boundary around them.
pub(crate) struct HandlerRegistry {
    next_id: AtomicU64,
    handlers: RwLock<Vec<(HandlerId, Arc<dyn AlertHandler>)>>,
    metrics: Arc<ReliabilityMetrics>,
}

impl HandlerRegistry {
    pub(crate) fn new(metrics: Arc<ReliabilityMetrics>) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            handlers: RwLock::new(Vec::new()),
            metrics,
        }
    }

    pub(crate) fn register(&self, handler: Arc<dyn AlertHandler>) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, handler));
        id
    }

    pub(crate) fn unregister(&self, id: HandlerId) -> bool {
        let mut handlers = self
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Invoke every handler once. Errors and panics are logged and counted.
    pub(crate) fn deliver(&self, event: &ViolationEvent) {
        let handlers: Vec<Arc<dyn AlertHandler>> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();

        for handler in handlers {
            match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    self.metrics.handler_failures.inc();
                    warn!(
                        handler = handler.name(),
                        violation = %event.id,
                        error = %e,
                        "Alert handler failed"
                    );
                }
                Err(payload) => {
                    self.metrics.handler_failures.inc();
                    error!(
                        handler = handler.name(),
                        violation = %event.id,
                        panic = %panic_message(payload.as_ref()),
                        "Alert handler panicked"
                    );
                }
            }
        }
        self.metrics.alerts_dispatched.inc();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Error;
    use crate::sla::violation::ViolationKind;
    use std::sync::atomic::AtomicUsize;

    fn event() -> ViolationEvent {
        ViolationEvent::open("op", ViolationKind::Duration, 500.0, 200.0)
    }

    #[test]
    fn test_register_and_unregister() {
        let registry = HandlerRegistry::new(Arc::new(ReliabilityMetrics::new()));
        let a = registry.register(Arc::new(FnHandler::new("a", |_| Ok(()))));
        let b = registry.register(Arc::new(FnHandler::new("b", |_| Ok(()))));
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);

        assert!(registry.unregister(a));
        assert!(!registry.unregister(a));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_failures_are_isolated() {
        let metrics = Arc::new(ReliabilityMetrics::new());
        let registry = HandlerRegistry::new(Arc::clone(&metrics));
        let delivered = Arc::new(AtomicUsize::new(0));

        registry.register(Arc::new(FnHandler::new("erroring", |_| {
            Err(Error::handler("erroring", "webhook unreachable"))
        })));
        registry.register(Arc::new(FnHandler::new("panicking", |_| {
            panic!("handler bug")
        })));
        let counter = Arc::clone(&delivered);
        registry.register(Arc::new(FnHandler::new("counting", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })));

        registry.deliver(&event());
        registry.deliver(&event());

        assert_eq!(delivered.load(Ordering::SeqCst), 2);
        assert_eq!(metrics.handler_failures.get(), 4);
        assert_eq!(metrics.alerts_dispatched.get(), 2);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new(String::from("boom"));
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
