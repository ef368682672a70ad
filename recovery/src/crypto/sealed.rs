//! # Sealed Boxes for Custodian Shares
//!
//! The asymmetric encryption service behind share issuance. The recovery
//! core only ever talks to the [`EncryptionService`] trait; [`SealedBox`] is
//! the implementation this crate ships.
//!
//! ## Construction
//!
//! Anonymous-sender public-key encryption, the same shape as a PFS handshake
//! where one side only ever sends a single message:
//!
//! 1. Generate an ephemeral X25519 keypair.
//! 2. ECDH with the recipient's static public key.
//! 3. Session key = BLAKE3-derive-key(context, shared || eph_pub || recipient_pub).
//! 4. AES-256-GCM over the plaintext with AAD = version || eph_pub || recipient_pub.
//!
//! Wire format: `version(1) || eph_pub(32) || nonce(12) || ciphertext || tag(16)`,
//! ASCII-armored as `KEYMASTER SEALED MESSAGE`.
//!
//! Binding the recipient key into both the KDF and the AAD means a sealed
//! message re-addressed to someone else does not open, even for a
//! recipient who happens to share the ephemeral point.

use rand::rngs::OsRng;
use thiserror::Error;
use x25519_dalek::{EphemeralSecret, PublicKey};
use zeroize::Zeroizing;

use crate::config::{
    AES_KEY_LENGTH, ARMOR_SEALED_MESSAGE, SEALED_MESSAGE_VERSION, SEAL_KDF_CONTEXT,
    X25519_KEY_LENGTH,
};
use crate::crypto::armor::{armor, dearmor, ArmorError};
use crate::crypto::encryption::{self, EncryptionError};
use crate::crypto::hash::domain_separated_hash;
use crate::crypto::keys::{CustodianKeypair, CustodianPublicKey};

/// Length of the `version || eph_pub` header.
const HEADER_LENGTH: usize = 1 + X25519_KEY_LENGTH;

/// Errors from the encryption service and custodian key handling.
#[derive(Debug, Error)]
pub enum SealError {
    #[error("armor: {0}")]
    Armor(#[from] ArmorError),

    #[error(transparent)]
    Encryption(#[from] EncryptionError),

    #[error("malformed key file: {0}")]
    KeyFormat(String),

    #[error("unsupported format version {0}")]
    UnsupportedVersion(u32),

    #[error("passphrase key derivation failed: {0}")]
    Kdf(String),

    #[error("wrong passphrase or corrupted private key")]
    BadPassphrase,

    #[error("sealed message is truncated")]
    Truncated,

    #[error("key agreement produced a non-contributory shared secret")]
    WeakKeyAgreement,
}

/// Public-key encryption as seen by the recovery core.
///
/// Implementations must be usable from several threads at once: issuance
/// seals every custodian's share in parallel.
pub trait EncryptionService: Send + Sync {
    /// Encrypt `plaintext` so that only `recipient` can read it. Returns
    /// ASCII-armored text.
    fn encrypt_armored(
        &self,
        recipient: &CustodianPublicKey,
        plaintext: &[u8],
    ) -> Result<String, SealError>;

    /// Decrypt `ciphertext` with an armored private key unlocked by
    /// `passphrase`. Runs on the custodian's side, never inside a session.
    fn decrypt_armored(
        &self,
        private_key: &str,
        passphrase: &str,
        ciphertext: &str,
    ) -> Result<Zeroizing<Vec<u8>>, SealError>;
}

/// X25519 + BLAKE3 + AES-256-GCM sealed boxes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SealedBox;

impl SealedBox {
    /// Create the service. Stateless; cheap to copy.
    pub fn new() -> Self {
        Self
    }

    /// Seal `plaintext` for `recipient` and return the raw wire bytes.
    pub fn seal(
        &self,
        recipient: &CustodianPublicKey,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, SealError> {
        let recipient_pk = recipient.to_x25519();
        let ephemeral = EphemeralSecret::random_from_rng(OsRng);
        let ephemeral_pk = PublicKey::from(&ephemeral);

        let shared = ephemeral.diffie_hellman(&recipient_pk);
        if !shared.was_contributory() {
            return Err(SealError::WeakKeyAgreement);
        }

        let key = session_key(shared.as_bytes(), &ephemeral_pk, &recipient_pk);
        let mut header = Vec::with_capacity(HEADER_LENGTH);
        header.push(SEALED_MESSAGE_VERSION);
        header.extend_from_slice(ephemeral_pk.as_bytes());

        let body = encryption::encrypt(&key, plaintext, &aad(&header, &recipient_pk))?;

        let mut out = header;
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Open raw wire bytes with an already-unlocked keypair.
    pub fn open(
        &self,
        keypair: &CustodianKeypair,
        sealed: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, SealError> {
        if sealed.len() < HEADER_LENGTH {
            return Err(SealError::Truncated);
        }
        let (header, body) = sealed.split_at(HEADER_LENGTH);
        if header[0] != SEALED_MESSAGE_VERSION {
            return Err(SealError::UnsupportedVersion(u32::from(header[0])));
        }

        let mut eph = [0u8; X25519_KEY_LENGTH];
        eph.copy_from_slice(&header[1..]);
        let ephemeral_pk = PublicKey::from(eph);
        let recipient_pk = PublicKey::from(keypair.secret());

        let shared = keypair.secret().diffie_hellman(&ephemeral_pk);
        if !shared.was_contributory() {
            return Err(SealError::WeakKeyAgreement);
        }

        let key = session_key(shared.as_bytes(), &ephemeral_pk, &recipient_pk);
        let plaintext = encryption::decrypt(&key, body, &aad(header, &recipient_pk))?;
        Ok(Zeroizing::new(plaintext))
    }

    /// Open an armored sealed message with an already-unlocked keypair.
    ///
    /// Useful when one custodian opens several messages: the Argon2 unlock
    /// in [`EncryptionService::decrypt_armored`] is paid once.
    pub fn open_armored(
        &self,
        keypair: &CustodianKeypair,
        ciphertext: &str,
    ) -> Result<Zeroizing<Vec<u8>>, SealError> {
        let sealed = dearmor(ARMOR_SEALED_MESSAGE, ciphertext)?;
        self.open(keypair, &sealed)
    }
}

impl EncryptionService for SealedBox {
    fn encrypt_armored(
        &self,
        recipient: &CustodianPublicKey,
        plaintext: &[u8],
    ) -> Result<String, SealError> {
        let sealed = self.seal(recipient, plaintext)?;
        Ok(armor(ARMOR_SEALED_MESSAGE, &sealed))
    }

    fn decrypt_armored(
        &self,
        private_key: &str,
        passphrase: &str,
        ciphertext: &str,
    ) -> Result<Zeroizing<Vec<u8>>, SealError> {
        let keypair = CustodianKeypair::from_protected_armored(private_key, passphrase)?;
        self.open_armored(&keypair, ciphertext)
    }
}

fn session_key(
    shared: &[u8; 32],
    ephemeral: &PublicKey,
    recipient: &PublicKey,
) -> Zeroizing<[u8; AES_KEY_LENGTH]> {
    Zeroizing::new(domain_separated_hash(
        SEAL_KDF_CONTEXT,
        &[shared, ephemeral.as_bytes(), recipient.as_bytes()],
    ))
}

fn aad(header: &[u8], recipient: &PublicKey) -> Vec<u8> {
    let mut aad = Vec::with_capacity(header.len() + X25519_KEY_LENGTH);
    aad.extend_from_slice(header);
    aad.extend_from_slice(recipient.as_bytes());
    aad
}
