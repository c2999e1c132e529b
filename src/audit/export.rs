//! Audit trail export for offline verification.

use crate::audit::entry::AuditEntry;
use crate::audit::trail::{verify_entries, AuditTrail, IntegrityReport};
use crate::core::{now, Hash256, Result, Timestamp};
use serde::{Deserialize, Serialize};

/// Export format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportFormat {
    /// One pretty-printed JSON document
    Json,
    /// Header line followed by one entry per line
    JsonLines,
}

/// A self-contained copy of a trail.
///
/// Carries the genesis hash and every entry's hashes, so it can be verified
/// with [`verify_export`] without access to the exporting process.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrailExport {
    /// Trail ID
    pub trail_id: String,
    /// Genesis hash of the trail
    pub genesis_hash: Hash256,
    /// Export timestamp
    pub exported_at: Timestamp,
    /// Integrity verdict at export time
    pub integrity: IntegrityReport,
    /// Entries in append order
    pub entries: Vec<AuditEntry>,
}

#[derive(Serialize, Deserialize)]
struct ExportHeader {
    trail_id: String,
    genesis_hash: Hash256,
    exported_at: Timestamp,
    integrity: IntegrityReport,
}

impl TrailExport {
    /// Snapshot a trail.
    pub fn from_trail(trail: &AuditTrail) -> Self {
        let entries = trail.entries();
        let integrity = verify_entries(trail.genesis_hash(), &entries);
        Self {
            trail_id: trail.trail_id().to_string(),
            genesis_hash: *trail.genesis_hash(),
            exported_at: now(),
            integrity,
            entries,
        }
    }

    /// Encode in the requested format.
    pub fn encode(&self, format: ExportFormat) -> Result<Vec<u8>> {
        match format {
            ExportFormat::Json => Ok(serde_json::to_vec_pretty(self)?),
            ExportFormat::JsonLines => {
                let header = ExportHeader {
                    trail_id: self.trail_id.clone(),
                    genesis_hash: self.genesis_hash,
                    exported_at: self.exported_at,
                    integrity: self.integrity.clone(),
                };
                let mut output = serde_json::to_vec(&header)?;
                output.push(b'\n');
                for entry in &self.entries {
                    output.extend(serde_json::to_vec(entry)?);
                    output.push(b'\n');
                }
                Ok(output)
            }
        }
    }

    /// Decode data produced by [`TrailExport::encode`].
    pub fn decode(data: &[u8], format: ExportFormat) -> Result<Self> {
        match format {
            ExportFormat::Json => Ok(serde_json::from_slice(data)?),
            ExportFormat::JsonLines => {
                let text = std::str::from_utf8(data)
                    .map_err(|e| crate::core::Error::Serialization(e.to_string()))?;
                let mut lines = text.lines().filter(|l| !l.trim().is_empty());
                let header: ExportHeader = match lines.next() {
                    Some(line) => serde_json::from_str(line)?,
                    None => {
                        return Err(crate::core::Error::Serialization(
                            "empty trail export".into(),
                        ))
                    }
                };
                let entries = lines
                    .map(serde_json::from_str)
                    .collect::<std::result::Result<Vec<AuditEntry>, _>>()?;
                Ok(Self {
                    trail_id: header.trail_id,
                    genesis_hash: header.genesis_hash,
                    exported_at: header.exported_at,
                    integrity: header.integrity,
                    entries,
                })
            }
        }
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Independently re-verify an export.
///
/// Ignores the embedded `integrity` verdict and recomputes the chain. An
/// entry that claims a different trail counts as a broken link.
pub fn verify_export(export: &TrailExport) -> IntegrityReport {
    let report = verify_entries(&export.genesis_hash, &export.entries);
    match export
        .entries
        .iter()
        .position(|e| e.trail_id() != export.trail_id)
    {
        Some(index) if report.first_bad_index.map_or(true, |bad| index < bad as usize) => {
            IntegrityReport {
                ok: false,
                first_bad_index: Some(index as u64),
                entries_checked: index as u64,
                failure: Some(crate::audit::IntegrityFailure::BrokenLink),
            }
        }
        _ => report,
    }
}

impl AuditTrail {
    /// Export this trail.
    pub fn export(&self) -> TrailExport {
        TrailExport::from_trail(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::entry::references;
    use crate::core::crypto::genesis_hash;
    use crate::core::Status;

    fn sample_trail() -> AuditTrail {
        let trail = AuditTrail::new("doc-9", genesis_hash("export"));
        trail.append(
            "ingest",
            references([("source", "doc-9.pdf")]),
            references([("text", "doc-9.txt")]),
            Status::Success,
        );
        trail.append(
            "extract_entities",
            references([("text", "doc-9.txt")]),
            references([("entities", "7 found")]),
            Status::Success,
        );
        trail
    }

    #[test]
    fn test_export_contains_chain() {
        let trail = sample_trail();
        let export = trail.export();
        assert_eq!(export.trail_id, "doc-9");
        assert_eq!(export.entries.len(), 2);
        assert_eq!(export.genesis_hash, genesis_hash("export"));
        assert!(export.integrity.ok);
    }

    #[test]
    fn test_export_json_verifies_offline() {
        let json = sample_trail().export().to_json().unwrap();
        assert!(json.contains("entry_hash"));
        assert!(json.contains("previous_hash"));

        let parsed = TrailExport::from_json(&json).unwrap();
        assert!(verify_export(&parsed).ok);
    }

    #[test]
    fn test_json_lines_format() {
        let export = sample_trail().export();
        let data = export.encode(ExportFormat::JsonLines).unwrap();
        let text = String::from_utf8(data.clone()).unwrap();
        assert_eq!(text.lines().count(), 3);

        let decoded = TrailExport::decode(&data, ExportFormat::JsonLines).unwrap();
        assert_eq!(decoded.entries, export.entries);
        assert!(verify_export(&decoded).ok);
    }

    #[test]
    fn test_edited_export_fails_verification() {
        let json = sample_trail().export().to_json().unwrap();
        let mut value: serde_json::Value = serde_json::from_str(&json).unwrap();
        value["entries"][1]["generated"]["entities"] = serde_json::json!("0 found");

        let edited: TrailExport = serde_json::from_value(value).unwrap();
        assert!(edited.integrity.ok, "stale verdict is carried as-is");

        let report = verify_export(&edited);
        assert!(!report.ok);
        assert_eq!(report.first_bad_index, Some(1));
    }

    #[test]
    fn test_foreign_entry_flagged() {
        let mut export = sample_trail().export();
        export.trail_id = "doc-10".to_string();
        let report = verify_export(&export);
        assert_eq!(report.first_bad_index, Some(0));
    }

    #[test]
    fn test_decode_empty_json_lines() {
        assert!(TrailExport::decode(b"", ExportFormat::JsonLines).is_err());
    }
}
