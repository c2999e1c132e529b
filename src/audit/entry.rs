//! Audit entry structure.
//!
//! Content-addressed, immutable operation records for an audit trail.

use crate::core::crypto::sha3_256_multi;
use crate::core::{now, Hash256, Status, Timestamp};
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Named input or output references of an operation.
///
/// Ordered so that hashing and export are deterministic.
pub type References = BTreeMap<String, String>;

/// Build a [`References`] map from borrowed pairs.
pub fn references<K, V, I>(pairs: I) -> References
where
    K: Into<String>,
    V: Into<String>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Everything an entry records except its chain position and hashes.
#[derive(Clone, Debug)]
pub(crate) struct EntryDraft {
    pub trail_id: String,
    pub operation_type: String,
    pub used: References,
    pub generated: References,
    pub status: Status,
    pub duration: Option<Duration>,
}

/// One committed record in an audit trail.
///
/// Fields are private and there are no mutators: an entry is sealed with its
/// hash when it is created and never changes afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    entry_id: String,
    trail_id: String,
    sequence: u64,
    operation_type: String,
    used: References,
    generated: References,
    status: Status,
    timestamp: Timestamp,
    duration_micros: Option<u64>,
    previous_hash: Hash256,
    entry_hash: Hash256,
}

impl AuditEntry {
    /// Seal a draft at the given chain position.
    pub(crate) fn seal(draft: EntryDraft, sequence: u64, previous_hash: Hash256) -> Self {
        let mut entry = Self {
            entry_id: uuid::Uuid::new_v4().to_string(),
            trail_id: draft.trail_id,
            sequence,
            operation_type: draft.operation_type,
            used: draft.used,
            generated: draft.generated,
            status: draft.status,
            timestamp: now(),
            duration_micros: draft
                .duration
                .map(|d| u64::try_from(d.as_micros()).unwrap_or(u64::MAX)),
            previous_hash,
            entry_hash: Hash256::zero(),
        };
        entry.entry_hash = entry.compute_hash();
        entry
    }

    /// Unique entry ID.
    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    /// Trail this entry belongs to.
    pub fn trail_id(&self) -> &str {
        &self.trail_id
    }

    /// Position in the trail, starting at 0.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Operation type.
    pub fn operation_type(&self) -> &str {
        &self.operation_type
    }

    /// Inputs the operation used.
    pub fn used(&self) -> &References {
        &self.used
    }

    /// Outputs the operation generated.
    pub fn generated(&self) -> &References {
        &self.generated
    }

    /// Outcome.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Commit time.
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Elapsed time between start and completion, when known.
    pub fn duration(&self) -> Option<Duration> {
        self.duration_micros.map(Duration::from_micros)
    }

    /// Hash of the preceding entry, or the trail genesis for the first one.
    pub fn previous_hash(&self) -> &Hash256 {
        &self.previous_hash
    }

    /// Stored content hash.
    pub fn entry_hash(&self) -> &Hash256 {
        &self.entry_hash
    }

    /// Recompute the content hash (SHA3-256).
    /// Hash includes all fields except the hash itself.
    pub fn compute_hash(&self) -> Hash256 {
        let sequence = self.sequence.to_le_bytes();
        let timestamp = self.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true);
        let duration = match self.duration_micros {
            Some(micros) => {
                let mut bytes = [0u8; 9];
                bytes[0] = 1;
                bytes[1..].copy_from_slice(&micros.to_le_bytes());
                bytes
            }
            None => [0u8; 9],
        };
        let used_len = (self.used.len() as u64).to_le_bytes();
        let generated_len = (self.generated.len() as u64).to_le_bytes();

        let mut chunks: Vec<&[u8]> = Vec::with_capacity(10 + 2 * (self.used.len() + self.generated.len()));
        chunks.push(self.previous_hash.as_bytes());
        chunks.push(self.entry_id.as_bytes());
        chunks.push(self.trail_id.as_bytes());
        chunks.push(&sequence);
        chunks.push(self.operation_type.as_bytes());
        chunks.push(&used_len);
        for (name, reference) in &self.used {
            chunks.push(name.as_bytes());
            chunks.push(reference.as_bytes());
        }
        chunks.push(&generated_len);
        for (name, reference) in &self.generated {
            chunks.push(name.as_bytes());
            chunks.push(reference.as_bytes());
        }
        chunks.push(self.status.as_str().as_bytes());
        chunks.push(timestamp.as_bytes());
        chunks.push(&duration);

        sha3_256_multi(&chunks)
    }

    /// Whether the stored hash matches the content.
    pub fn verify_hash(&self) -> bool {
        self.compute_hash() == self.entry_hash
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> crate::core::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> crate::core::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    #[cfg(test)]
    pub(crate) fn tamper_operation_type(&mut self, operation_type: &str) {
        self.operation_type = operation_type.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> EntryDraft {
        EntryDraft {
            trail_id: "doc-1".to_string(),
            operation_type: "extract_entities".to_string(),
            used: references([("source", "doc-1.txt")]),
            generated: references([("entities", "3 found")]),
            status: Status::Success,
            duration: Some(Duration::from_millis(12)),
        }
    }

    #[test]
    fn test_entry_creation() {
        let entry = AuditEntry::seal(draft(), 0, Hash256::zero());
        assert_eq!(entry.trail_id(), "doc-1");
        assert_eq!(entry.sequence(), 0);
        assert_eq!(entry.used()["source"], "doc-1.txt");
        assert_eq!(entry.duration(), Some(Duration::from_millis(12)));
        assert_ne!(*entry.entry_hash(), Hash256::zero());
        assert!(entry.verify_hash());
    }

    #[test]
    fn test_entry_ids_unique() {
        let a = AuditEntry::seal(draft(), 0, Hash256::zero());
        let b = AuditEntry::seal(draft(), 0, Hash256::zero());
        assert_ne!(a.entry_id(), b.entry_id());
        assert_ne!(a.entry_hash(), b.entry_hash());
    }

    #[test]
    fn test_hash_covers_previous_hash() {
        let entry = AuditEntry::seal(draft(), 0, Hash256::zero());
        let mut relinked = entry.clone();
        relinked.previous_hash = Hash256::new([9u8; 32]);
        assert!(!relinked.verify_hash());
    }

    #[test]
    fn test_tampered_entry_detected() {
        let mut entry = AuditEntry::seal(draft(), 0, Hash256::zero());
        entry.tamper_operation_type("delete_everything");
        assert!(!entry.verify_hash());
    }

    #[test]
    fn test_reference_boundaries_are_hashed() {
        let mut a = draft();
        a.used = references([("ab", "c")]);
        let mut b = draft();
        b.used = references([("a", "bc")]);

        let a = AuditEntry::seal(a, 0, Hash256::zero());
        let mut b = AuditEntry::seal(b, 0, Hash256::zero());
        b.entry_id = a.entry_id.clone();
        b.timestamp = a.timestamp;
        assert_ne!(a.compute_hash(), b.compute_hash());
    }

    #[test]
    fn test_entry_serialization_preserves_hash() {
        let entry = AuditEntry::seal(draft(), 4, Hash256::new([3u8; 32]));
        let parsed = AuditEntry::from_json(&entry.to_json().unwrap()).unwrap();
        assert_eq!(parsed, entry);
        assert!(parsed.verify_hash());
    }
}
