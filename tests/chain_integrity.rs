//! Integration tests for audit trail export and offline verification.
//!
//! Covers: export round-trips, single-field tampering detected at the exact
//! index, restore after restart, and rejection of tampered or conflicting
//! restores.

use opsledger::audit::{verify_entries, verify_export, ExportFormat, IntegrityFailure};
use opsledger::config::ProvenanceConfig;
use opsledger::monitoring::ReliabilityMetrics;
use opsledger::{references, Error, ProvenanceManager, Status, TrailExport};
use serde_json::Value;
use std::sync::Arc;

const STEPS: usize = 8;

fn manager() -> ProvenanceManager {
    ProvenanceManager::new(
        &ProvenanceConfig::default(),
        Arc::new(ReliabilityMetrics::new()),
    )
}

fn populated(manager: &ProvenanceManager, trail_id: &str) -> TrailExport {
    for step in 0..STEPS {
        let token = manager.start_operation(
            trail_id,
            &format!("step_{step}"),
            references([("input", format!("blob-{step}"))]),
        );
        let status = if step % 3 == 2 {
            Status::Failure
        } else {
            Status::Success
        };
        manager
            .complete_operation(
                &token,
                references([("output", format!("blob-{}", step + 1))]),
                status,
            )
            .unwrap();
    }
    manager.export_trail(trail_id).unwrap()
}

fn tampered(export: &TrailExport, index: usize, field: &str, value: Value) -> TrailExport {
    let mut json: Value = serde_json::from_str(&export.to_json().unwrap()).unwrap();
    json["entries"][index][field] = value;
    serde_json::from_value(json).unwrap()
}

#[test]
fn export_round_trip_verifies() {
    let manager = manager();
    let export = populated(&manager, "doc-7");
    assert!(export.integrity.ok);
    assert_eq!(export.entries.len(), STEPS);

    for format in [ExportFormat::Json, ExportFormat::JsonLines] {
        let bytes = export.encode(format).unwrap();
        let decoded = TrailExport::decode(&bytes, format).unwrap();
        let report = verify_export(&decoded);
        assert!(report.ok);
        assert_eq!(report.entries_checked, STEPS as u64);
    }
}

#[test]
fn tampering_any_entry_is_reported_at_its_index() {
    let manager = manager();
    let export = populated(&manager, "doc-7");

    for index in 0..STEPS {
        let forged = tampered(&export, index, "operation_type", Value::from("forged"));
        let report = verify_export(&forged);
        assert!(!report.ok);
        assert_eq!(report.first_bad_index, Some(index as u64));
        assert_eq!(report.entries_checked, index as u64);
        assert_eq!(report.failure, Some(IntegrityFailure::HashMismatch));
    }
}

#[test]
fn tampering_status_is_detected() {
    let manager = manager();
    let export = populated(&manager, "doc-7");
    let forged = tampered(&export, 2, "status", Value::from("success"));
    assert_eq!(verify_export(&forged).first_bad_index, Some(2));
}

#[test]
fn verification_needs_only_the_entries() {
    let manager = manager();
    let export = populated(&manager, "doc-9");
    let report = verify_entries(&export.genesis_hash, &export.entries);
    assert!(report.ok);

    let other_genesis = opsledger::core::crypto::genesis_hash("another-deployment");
    let report = verify_entries(&other_genesis, &export.entries);
    assert_eq!(report.first_bad_index, Some(0));
    assert_eq!(report.failure, Some(IntegrityFailure::BrokenLink));
}

#[test]
fn restore_after_restart() {
    let export = populated(&manager(), "doc-7");

    let restarted = manager();
    let trail = restarted.restore_trail(&export).unwrap();
    assert_eq!(trail.len(), STEPS);
    assert_eq!(trail.head_hash(), *export.entries[STEPS - 1].entry_hash());

    // The chain keeps growing from the restored head.
    let token = restarted.start_operation("doc-7", "step_8", references([("input", "blob-8")]));
    let entry = restarted
        .complete_operation(&token, references([("output", "blob-9")]), Status::Success)
        .unwrap();
    assert_eq!(entry.sequence(), STEPS as u64);
    assert_eq!(entry.previous_hash(), export.entries[STEPS - 1].entry_hash());
    assert!(trail.verify_integrity().ok);
}

#[test]
fn restore_rejects_tampered_export() {
    let export = populated(&manager(), "doc-7");
    let forged = tampered(&export, 5, "operation_type", Value::from("forged"));

    let restarted = manager();
    assert!(matches!(
        restarted.restore_trail(&forged),
        Err(Error::ChainIntegrityViolated(5))
    ));
    assert!(restarted.get_trail("doc-7").is_empty());
}

#[test]
fn restore_over_committed_entries_is_refused() {
    let manager = manager();
    let export = populated(&manager, "doc-7");
    assert!(matches!(
        manager.restore_trail(&export),
        Err(Error::ImmutabilityViolation { .. })
    ));
    assert_eq!(manager.get_trail("doc-7").len(), STEPS);
}
