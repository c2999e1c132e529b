//! Common types used across opsledger modules.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A 256-bit hash value (SHA3-256).
///
/// Serialized as a lowercase hex string so exported trails stay readable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// Create a new Hash256 from bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Create a zero hash.
    pub fn zero() -> Self {
        Self([0u8; 32])
    }

    /// Get the bytes of the hash.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl std::fmt::Display for Hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Default for Hash256 {
    fn default() -> Self {
        Self::zero()
    }
}

impl Serialize for Hash256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Hash256::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Timestamp wrapper for consistent serialization.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Get current UTC timestamp.
pub fn now() -> Timestamp {
    chrono::Utc::now()
}

/// Outcome of a tracked pipeline operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Failure,
}

impl Status {
    /// Whether this is a successful outcome.
    pub fn is_success(&self) -> bool {
        matches!(self, Status::Success)
    }

    /// Stable label used in hashing and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::Failure => "failure",
        }
    }
}

impl From<bool> for Status {
    fn from(success: bool) -> Self {
        if success {
            Status::Success
        } else {
            Status::Failure
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity level attached to degradation signals.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Informational
    Info,
    /// Warning
    Warning,
    /// Critical
    Critical,
    /// Emergency
    Emergency,
}

impl Severity {
    /// Bucket a "standard deviations above threshold" score.
    pub fn from_score(score: f64) -> Self {
        if score <= 0.0 {
            Severity::Info
        } else if score < 1.0 {
            Severity::Warning
        } else if score < 3.0 {
            Severity::Critical
        } else {
            Severity::Emergency
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_buckets() {
        assert_eq!(Severity::from_score(0.0), Severity::Info);
        assert_eq!(Severity::from_score(0.5), Severity::Warning);
        assert_eq!(Severity::from_score(2.0), Severity::Critical);
        assert_eq!(Severity::from_score(7.5), Severity::Emergency);
        assert!(Severity::Warning < Severity::Emergency);
    }

    #[test]
    fn test_hash256_zero() {
        let hash = Hash256::zero();
        assert_eq!(hash.0, [0u8; 32]);
    }

    #[test]
    fn test_hash256_hex_roundtrip() {
        let hash = Hash256::new([7u8; 32]);
        let parsed = Hash256::from_hex(&hash.to_hex()).unwrap();
        assert_eq!(hash, parsed);
    }

    #[test]
    fn test_hash256_rejects_short_hex() {
        assert!(Hash256::from_hex("abcd").is_err());
    }

    #[test]
    fn test_hash256_serializes_as_hex() {
        let hash = Hash256::new([1u8; 32]);
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", "01".repeat(32)));
    }

    #[test]
    fn test_status_from_bool() {
        assert_eq!(Status::from(true), Status::Success);
        assert_eq!(Status::from(false), Status::Failure);
        assert_eq!(Status::Failure.to_string(), "failure");
    }
}
