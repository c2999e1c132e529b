//! Violation events.

use crate::core::{now, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which limit was breached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationKind {
    /// Duration percentile above `max_duration`
    Duration,
    /// Error rate above `max_error_rate`
    ErrorRate,
}

impl ViolationKind {
    /// Stable label for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::Duration => "DURATION",
            ViolationKind::ErrorRate => "ERROR_RATE",
        }
    }
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a violation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationState {
    /// Breach is ongoing
    Open,
    /// Breach cleared after the hysteresis streak
    Resolved,
}

/// An SLA violation.
///
/// Handlers receive one copy when it opens and one when it resolves; both
/// carry the same `id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViolationEvent {
    /// Correlates the OPEN and RESOLVED deliveries
    pub id: Uuid,
    /// Operation name
    pub operation_name: String,
    /// Breached limit
    pub kind: ViolationKind,
    /// Value that caused the transition
    pub observed_value: f64,
    /// Configured limit
    pub threshold_value: f64,
    /// When the violation opened
    pub opened_at: Timestamp,
    /// When the violation resolved
    pub resolved_at: Option<Timestamp>,
    /// Current state
    pub state: ViolationState,
}

impl ViolationEvent {
    pub(crate) fn open(
        operation_name: &str,
        kind: ViolationKind,
        observed_value: f64,
        threshold_value: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation_name: operation_name.to_string(),
            kind,
            observed_value,
            threshold_value,
            opened_at: now(),
            resolved_at: None,
            state: ViolationState::Open,
        }
    }

    pub(crate) fn resolve(mut self, observed_value: f64) -> Self {
        self.observed_value = observed_value;
        self.resolved_at = Some(now());
        self.state = ViolationState::Resolved;
        self
    }

    /// Whether the violation is still open.
    pub fn is_open(&self) -> bool {
        self.state == ViolationState::Open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_then_resolve_keeps_id() {
        let open = ViolationEvent::open("op", ViolationKind::Duration, 500.0, 200.0);
        assert!(open.is_open());
        assert!(open.resolved_at.is_none());

        let resolved = open.clone().resolve(150.0);
        assert_eq!(resolved.id, open.id);
        assert_eq!(resolved.state, ViolationState::Resolved);
        assert_eq!(resolved.observed_value, 150.0);
        assert!(resolved.resolved_at.unwrap() >= resolved.opened_at);
    }

    #[test]
    fn test_wire_labels() {
        let event = ViolationEvent::open("op", ViolationKind::ErrorRate, 0.5, 0.1);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "ERROR_RATE");
        assert_eq!(json["state"], "OPEN");
        assert!(json["resolved_at"].is_null());
    }
}
