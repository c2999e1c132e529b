//! Error types for opsledger.

use thiserror::Error;

/// Result type alias for opsledger operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in opsledger operations.
///
/// Data-quality conditions (a tampered trail, an operation without a
/// baseline, a window that is not yet full) are not errors: they come back as
/// typed results such as [`crate::audit::IntegrityReport`] and
/// [`crate::performance::DegradationStatus`].
#[derive(Error, Debug)]
pub enum Error {
    // Ledger errors
    #[error("Immutability violation: entry {entry_id} is already committed")]
    ImmutabilityViolation { entry_id: String },

    #[error("Chain integrity violated at index {0}")]
    ChainIntegrityViolated(u64),

    #[error("Trail not found: {0}")]
    TrailNotFound(String),

    // Provenance errors
    #[error("Unknown operation token: {0}")]
    UnknownToken(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    // Alerting errors
    #[error("Alert handler '{handler}' failed: {message}")]
    Handler { handler: String, message: String },

    #[error("SLA monitor has been stopped")]
    MonitorStopped,

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }

    /// Shorthand for an error raised by an alert handler.
    pub fn handler(handler: &str, message: impl Into<String>) -> Self {
        Error::Handler {
            handler: handler.to_string(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
