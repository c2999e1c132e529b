//! Provenance Module
//!
//! Brackets pipeline steps with start/complete calls and records each
//! finished step in its subject's audit trail.

pub mod manager;
pub mod token;

pub use manager::ProvenanceManager;
pub use token::OperationToken;
