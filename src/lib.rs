//! # opsledger - Operational reliability for data pipelines
//!
//! A library layer that records and watches what pipeline steps do:
//! - **Audit**: hash-chained, append-only trails of operation records
//! - **Provenance**: start/complete bracketing of steps onto trails
//! - **Performance**: rolling duration windows and frozen baselines
//! - **SLA**: threshold evaluation with hysteresis and alert handlers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use opsledger::{references, ReliabilityConfig, ReliabilityContext, Status};
//!
//! let ctx = ReliabilityContext::new(ReliabilityConfig::default()).unwrap();
//! let token = ctx.start_operation("doc-42", "extract_entities", references([("text", "blob-7")]));
//! // ... run the step ...
//! let entry = ctx
//!     .complete_operation(&token, references([("entities", "blob-8")]), Status::Success)
//!     .unwrap();
//! println!("committed {}", entry.entry_hash());
//! ```

pub mod audit;
pub mod config;
pub mod context;
pub mod core;
pub mod monitoring;
pub mod performance;
pub mod provenance;
pub mod sla;

pub use audit::{references, AuditEntry, AuditTrail, IntegrityReport, References, TrailExport};
pub use config::ReliabilityConfig;
pub use context::ReliabilityContext;
pub use crate::core::error::{Error, Result};
pub use crate::core::{Hash256, Severity, Status};
pub use performance::{DegradationReport, DegradationStatus, PerformanceTracker};
pub use provenance::{OperationToken, ProvenanceManager};
pub use sla::{AlertHandler, FnHandler, SlaMonitor, ViolationEvent};
