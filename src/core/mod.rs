//! Core utilities and common types for opsledger.

pub mod crypto;
pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;
