//! In-flight operation tokens.

use crate::audit::References;
use crate::core::Timestamp;
use std::time::Instant;
use uuid::Uuid;

/// Opaque handle for an operation that has started but not completed.
///
/// Issued by [`crate::provenance::ProvenanceManager::start_operation`] and
/// accepted exactly once by `complete_operation`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OperationToken {
    id: Uuid,
    trail_id: String,
}

impl OperationToken {
    pub(crate) fn issue(trail_id: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            trail_id: trail_id.to_string(),
        }
    }

    /// Token ID.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Trail the operation will be recorded in.
    pub fn trail_id(&self) -> &str {
        &self.trail_id
    }
}

impl std::fmt::Display for OperationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.trail_id, self.id)
    }
}

/// What `start_operation` remembers until completion.
#[derive(Clone, Debug)]
pub(crate) struct InFlight {
    pub trail_id: String,
    pub operation_type: String,
    pub used: References,
    pub started: Instant,
    pub started_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_unique() {
        let a = OperationToken::issue("doc-1");
        let b = OperationToken::issue("doc-1");
        assert_ne!(a, b);
        assert_eq!(a.trail_id(), "doc-1");
    }

    #[test]
    fn test_token_display() {
        let token = OperationToken::issue("doc-1");
        assert!(token.to_string().starts_with("doc-1/"));
    }
}
