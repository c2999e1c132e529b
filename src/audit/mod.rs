//! Audit Layer
//!
//! Tamper-evident record of what each pipeline step did:
//! - Content-addressed, immutable entries
//! - Hash-chained, append-only trails
//! - Export and offline chain verification

pub mod entry;
pub mod export;
pub mod trail;

pub use entry::{references, AuditEntry, References};
pub use export::{verify_export, ExportFormat, TrailExport};
pub use trail::{verify_entries, AuditTrail, IntegrityFailure, IntegrityReport};
