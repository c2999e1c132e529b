//! SHA3-256 hashing helpers.

use crate::core::Hash256;
use sha3::{Digest, Sha3_256};

/// Compute SHA3-256 hash of data.
pub fn sha3_256(data: &[u8]) -> Hash256 {
    sha3_256_multi(&[data])
}

/// Compute SHA3-256 hash of multiple data chunks.
///
/// Each chunk is prefixed with its length so that moving bytes between
/// adjacent fields changes the digest.
pub fn sha3_256_multi(chunks: &[&[u8]]) -> Hash256 {
    let mut hasher = Sha3_256::new();
    for chunk in chunks {
        hasher.update((chunk.len() as u64).to_le_bytes());
        hasher.update(chunk);
    }
    let result = hasher.finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&result);
    Hash256::new(bytes)
}

/// Derive the genesis hash for trails from a configured seed.
pub fn genesis_hash(seed: &str) -> Hash256 {
    sha3_256_multi(&[b"opsledger-genesis", seed.as_bytes()])
}
