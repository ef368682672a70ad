//! # AES-256-GCM Encryption
//!
//! Authenticated encryption for sealed share documents and for
//! passphrase-protected custodian keys.
//!
//! Every call binds additional authenticated data (AAD). Callers pass the
//! header bytes that travel next to the ciphertext (version tag, ephemeral
//! public key, key identity), so swapping a header onto a different body
//! fails authentication instead of decrypting under the wrong context.
//!
//! ## Nonce management
//!
//! Random 96-bit nonces from the OS CSPRNG. Every key used here is
//! single-purpose: sealed-box keys are derived from a fresh ephemeral
//! exchange per message, passphrase keys from a fresh salt per export. A
//! key never sees more than one nonce, so the birthday bound is moot.
//!
//! ## Wire format
//!
//! [`encrypt`] returns `nonce || ciphertext || tag`. [`decrypt`] expects the
//! same layout.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use thiserror::Error;

use crate::config::{AES_KEY_LENGTH, AES_NONCE_LENGTH, AES_TAG_LENGTH};

/// Errors that can occur during encryption/decryption.
///
/// Deliberately vague: "wrong key" and "corrupted ciphertext" look the same
/// from the outside.
#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("encryption failed")]
    EncryptFailed,

    #[error("decryption failed -- wrong key or corrupted ciphertext")]
    DecryptFailed,

    #[error("ciphertext too short: must be at least {} bytes", AES_NONCE_LENGTH + AES_TAG_LENGTH)]
    CiphertextTooShort,
}

/// Encrypt `plaintext` under `key`, authenticating `aad` alongside it.
///
/// # Example
///
/// ```
/// use keymaster_recovery::crypto::encryption::{decrypt, encrypt};
///
/// let key = [0x42u8; 32];
/// let sealed = encrypt(&key, b"share document", b"header").unwrap();
/// let opened = decrypt(&key, &sealed, b"header").unwrap();
/// assert_eq!(opened, b"share document");
/// ```
pub fn encrypt(
    key: &[u8; AES_KEY_LENGTH],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, EncryptionError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::EncryptFailed)?;

    let mut nonce_bytes = [0u8; AES_NONCE_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| EncryptionError::EncryptFailed)?;

    let mut out = Vec::with_capacity(AES_NONCE_LENGTH + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt data produced by [`encrypt`] with the same key and AAD.
///
/// Returns [`EncryptionError::DecryptFailed`] for a wrong key, a wrong AAD,
/// or any modification of the nonce, body, or tag. We don't distinguish.
pub fn decrypt(
    key: &[u8; AES_KEY_LENGTH],
    data: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, EncryptionError> {
    if data.len() < AES_NONCE_LENGTH + AES_TAG_LENGTH {
        return Err(EncryptionError::CiphertextTooShort);
    }

    let (nonce_bytes, ciphertext) = data.split_at(AES_NONCE_LENGTH);
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::DecryptFailed)?;
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| EncryptionError::DecryptFailed)
}
