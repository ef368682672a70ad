//! # Hashing Utilities
//!
//! Two hash functions, two jobs:
//!
//! - **SHA-256**: share fingerprints. The recovery configuration is a
//!   long-lived public artifact that other tooling (and other languages)
//!   may need to verify, so the fingerprint uses the digest everyone has.
//!
//! - **BLAKE3**: internal key derivation and the secret check. Nothing
//!   outside this crate ever needs to recompute those, so we use the faster,
//!   natively domain-separated hash.

use sha2::{Digest, Sha256};

/// Compute the SHA-256 hash and return a fixed-size array.
///
/// # Example
///
/// ```
/// use keymaster_recovery::crypto::sha256_array;
///
/// let hash = sha256_array(b"keymaster");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn sha256_array(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Domain-separated BLAKE3 over several parts, fed in order without an
/// intermediate buffer.
///
/// Uses BLAKE3's `derive_key` mode: the context string selects a different
/// internal IV, so outputs under different contexts never collide.
pub fn domain_separated_hash(context: &str, parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    for part in parts {
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}
