//! # Cryptographic Primitives for Keymaster
//!
//! Everything secret-shaped in a recovery ceremony flows through here:
//! splitting, sealing to custodians, fingerprinting, and passphrase-wrapped
//! key files.
//!
//! The building blocks are boring on purpose:
//!
//! - **Shamir over GF(256)** for the threshold split.
//! - **X25519** for sealing a share to a custodian.
//! - **AES-256-GCM** for every symmetric layer.
//! - **SHA-256** for share fingerprints that outside tooling can recompute.
//! - **BLAKE3** for internal key derivation and the secret check.
//! - **Argon2id** for custodian passphrases.
//!
//! Only the GF(256) arithmetic is written here, and it is small enough to
//! test exhaustively. Everything else wraps audited crates.

pub mod armor;
pub mod encryption;
pub mod hash;
pub mod keys;
pub mod sealed;
pub mod shamir;

pub use hash::{domain_separated_hash, sha256_array};
pub use keys::{CustodianKeypair, CustodianPublicKey};
pub use sealed::{EncryptionService, SealError, SealedBox};
pub use shamir::{recover_secret, split_secret, ShamirConfig, ShamirError, Share};
