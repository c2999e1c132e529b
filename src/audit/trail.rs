//! Hash-chained audit trail.
//!
//! Maintains an append-only, verifiable chain of entries for one subject.

use crate::audit::entry::{AuditEntry, EntryDraft, References};
use crate::core::{now, Error, Hash256, Result, Status, Timestamp};
use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::debug;

/// Why verification stopped at an entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityFailure {
    /// Stored hash does not match the entry content
    HashMismatch,
    /// `previous_hash` does not match the preceding entry (or genesis)
    BrokenLink,
    /// Sequence number out of order
    SequenceGap,
}

/// Result of trail verification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    /// Whether the whole chain verified
    pub ok: bool,
    /// Index of the first entry that failed
    pub first_bad_index: Option<u64>,
    /// Number of entries that verified before the first failure
    pub entries_checked: u64,
    /// Failure kind at `first_bad_index`
    pub failure: Option<IntegrityFailure>,
}

impl IntegrityReport {
    fn valid(entries_checked: u64) -> Self {
        Self {
            ok: true,
            first_bad_index: None,
            entries_checked,
            failure: None,
        }
    }

    fn invalid(index: u64, failure: IntegrityFailure) -> Self {
        Self {
            ok: false,
            first_bad_index: Some(index),
            entries_checked: index,
            failure: Some(failure),
        }
    }
}

/// Verify a chain of entries from its genesis hash forward.
///
/// Needs nothing but the entries themselves, so exported trails can be
/// checked by a process that does not trust the exporter.
pub fn verify_entries(genesis_hash: &Hash256, entries: &[AuditEntry]) -> IntegrityReport {
    let mut expected_previous = genesis_hash;

    for (i, entry) in entries.iter().enumerate() {
        let index = i as u64;
        if entry.sequence() != index {
            return IntegrityReport::invalid(index, IntegrityFailure::SequenceGap);
        }
        if entry.previous_hash() != expected_previous {
            return IntegrityReport::invalid(index, IntegrityFailure::BrokenLink);
        }
        if !entry.verify_hash() {
            return IntegrityReport::invalid(index, IntegrityFailure::HashMismatch);
        }
        expected_previous = entry.entry_hash();
    }

    IntegrityReport::valid(entries.len() as u64)
}

/// Append-only audit trail for one subject.
pub struct AuditTrail {
    trail_id: String,
    genesis_hash: Hash256,
    created: Timestamp,
    entries: RwLock<Vec<AuditEntry>>,
}

impl AuditTrail {
    /// Create an empty trail.
    pub fn new(trail_id: &str, genesis_hash: Hash256) -> Self {
        Self {
            trail_id: trail_id.to_string(),
            genesis_hash,
            created: now(),
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Trail ID.
    pub fn trail_id(&self) -> &str {
        &self.trail_id
    }

    /// Genesis hash used as `previous_hash` of the first entry.
    pub fn genesis_hash(&self) -> &Hash256 {
        &self.genesis_hash
    }

    /// Creation time of this in-memory trail.
    pub fn created(&self) -> Timestamp {
        self.created
    }

    // Entries are only ever pushed after being fully built, so a poisoned
    // lock still guards a consistent vector.
    fn read(&self) -> RwLockReadGuard<'_, Vec<AuditEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<AuditEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of committed entries.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the trail has no entries.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Hash of the last entry, or genesis when empty.
    pub fn head_hash(&self) -> Hash256 {
        self.read()
            .last()
            .map(|e| *e.entry_hash())
            .unwrap_or(self.genesis_hash)
    }

    /// Append a new entry and return it.
    pub fn append(
        &self,
        operation_type: &str,
        used: References,
        generated: References,
        status: Status,
    ) -> AuditEntry {
        self.append_draft(EntryDraft {
            trail_id: self.trail_id.clone(),
            operation_type: operation_type.to_string(),
            used,
            generated,
            status,
            duration: None,
        })
    }

    /// Append an entry that also records how long the operation took.
    pub fn append_timed(
        &self,
        operation_type: &str,
        used: References,
        generated: References,
        status: Status,
        duration: Duration,
    ) -> AuditEntry {
        self.append_draft(EntryDraft {
            trail_id: self.trail_id.clone(),
            operation_type: operation_type.to_string(),
            used,
            generated,
            status,
            duration: Some(duration),
        })
    }

    fn append_draft(&self, draft: EntryDraft) -> AuditEntry {
        let mut entries = self.write();
        let previous_hash = entries
            .last()
            .map(|e| *e.entry_hash())
            .unwrap_or(self.genesis_hash);
        let sequence = entries.len() as u64;

        let entry = AuditEntry::seal(draft, sequence, previous_hash);
        entries.push(entry.clone());
        drop(entries);

        debug!(
            trail_id = %self.trail_id,
            sequence,
            operation_type = entry.operation_type(),
            entry_hash = %entry.entry_hash(),
            "audit entry appended"
        );
        entry
    }

    /// Get entry by index.
    pub fn get(&self, index: usize) -> Option<AuditEntry> {
        self.read().get(index).cloned()
    }

    /// Snapshot of all entries.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.read().clone()
    }

    /// Snapshot of entries starting at `from_index`.
    ///
    /// Callers resume a traversal by passing the index after the last entry
    /// they saw.
    pub fn entries_from(&self, from_index: usize) -> Vec<AuditEntry> {
        self.read().iter().skip(from_index).cloned().collect()
    }

    /// Recompute every hash from the genesis value forward.
    pub fn verify_integrity(&self) -> IntegrityReport {
        verify_entries(&self.genesis_hash, &self.read())
    }

    /// Load previously exported entries into an empty trail.
    ///
    /// Committed entries are never replaced.
    pub fn restore(&self, restored: Vec<AuditEntry>) -> Result<()> {
        let mut entries = self.write();
        if let Some(first) = entries.first() {
            return Err(Error::ImmutabilityViolation {
                entry_id: first.entry_id().to_string(),
            });
        }

        let report = verify_entries(&self.genesis_hash, &restored);
        if let Some(index) = report.first_bad_index {
            return Err(Error::ChainIntegrityViolated(index));
        }
        if let Some(foreign) = restored.iter().find(|e| e.trail_id() != self.trail_id) {
            return Err(Error::ChainIntegrityViolated(foreign.sequence()));
        }

        *entries = restored;
        Ok(())
    }

    /// Serialize all entries to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&*self.read())?)
    }

    #[cfg(test)]
    pub(crate) fn tamper_entry(&self, index: usize, operation_type: &str) {
        let mut entries = self.write();
        entries[index].tamper_operation_type(operation_type);
    }
}
