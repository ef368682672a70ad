//! # Recovery Configuration & Constants
//!
//! Every magic number in the recovery subsystem lives here. If you're
//! hardcoding a constant somewhere else, you're doing it wrong.
//!
//! Several of these values are baked into artifacts that outlive the
//! binary: share documents sit encrypted in custodians' mailboxes for years,
//! and the recovery configuration is published alongside them. Changing a
//! constant that feeds a fingerprint or a ciphertext after a ceremony means
//! that ceremony can no longer be recovered with the new build.

// ---------------------------------------------------------------------------
// Secret & Share Parameters
// ---------------------------------------------------------------------------

/// Length of a generated master secret in bytes. 256 bits, enough to seal
/// the CA key with AES-256 directly.
pub const SHARED_KEY_SIZE_BYTES: usize = 32;

/// Format tag written into every share document. Bump only together with a
/// parser that still understands version 1, or old ceremonies become
/// unrecoverable.
pub const SHARE_DOC_VERSION: u32 = 1;

/// Maximum number of shares in a ceremony. Share x-coordinates are non-zero
/// elements of GF(256), so 255 is a hard ceiling.
pub const MAX_SHARES: usize = 255;

/// Length of the share prefix carrying the x-coordinate.
pub const SHARE_INDEX_LENGTH: usize = 1;

/// Upper bound on K-subsets a session tries when the full set of accepted
/// shares fails the secret check. Reached only when several stale or
/// foreign-but-registered shares were submitted.
pub const MAX_COMBINE_SUBSETS: usize = 4096;

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// Fingerprint digest. SHA-256 over the canonical share document.
pub const FINGERPRINT_ALGORITHM: &str = "SHA-256";

/// Fingerprint length in bytes.
pub const FINGERPRINT_LENGTH: usize = 32;

/// X25519 for wrapping shares to custodians.
pub const KEY_AGREEMENT_ALGORITHM: &str = "X25519";

/// X25519 public and secret key length in bytes.
pub const X25519_KEY_LENGTH: usize = 32;

/// AES-256-GCM for symmetric encryption.
pub const SYMMETRIC_ALGORITHM: &str = "AES-256-GCM";

/// AES-256-GCM key length in bytes.
pub const AES_KEY_LENGTH: usize = 32;

/// AES-256-GCM nonce length in bytes. 96 bits. Not 16. Not 8. Twelve.
pub const AES_NONCE_LENGTH: usize = 12;

/// AES-256-GCM authentication tag length in bytes.
pub const AES_TAG_LENGTH: usize = 16;

/// Wire version byte prefixed to every sealed message.
pub const SEALED_MESSAGE_VERSION: u8 = 1;

/// BLAKE3 `derive_key` context for sealed-box session keys.
pub const SEAL_KDF_CONTEXT: &str = "keymaster-recovery v1 sealed box session key";

/// BLAKE3 `derive_key` context for the embedded secret check.
pub const SECRET_CHECK_CONTEXT: &str = "keymaster-recovery v1 secret check";

// ---------------------------------------------------------------------------
// Passphrase Protection
// ---------------------------------------------------------------------------

/// Argon2id memory cost in KiB. 19 MiB matches the OWASP baseline and keeps
/// a laptop-side decrypt under a second.
pub const ARGON2_M_COST_KIB: u32 = 19 * 1024;

/// Argon2id iterations.
pub const ARGON2_T_COST: u32 = 2;

/// Argon2id lanes.
pub const ARGON2_P_COST: u32 = 1;

/// Salt length for passphrase-protected private keys.
pub const PASSPHRASE_SALT_LENGTH: usize = 16;

// ---------------------------------------------------------------------------
// Armor Labels
// ---------------------------------------------------------------------------

/// Label for armored sealed messages (encrypted share documents).
pub const ARMOR_SEALED_MESSAGE: &str = "KEYMASTER SEALED MESSAGE";

/// Label for armored custodian public keys.
pub const ARMOR_PUBLIC_KEY: &str = "KEYMASTER CUSTODIAN PUBLIC KEY";

/// Label for armored, passphrase-protected custodian private keys.
pub const ARMOR_PRIVATE_KEY: &str = "KEYMASTER CUSTODIAN PRIVATE KEY";

/// Base64 line width inside armor blocks.
pub const ARMOR_LINE_WIDTH: usize = 64;
