//! # Custodian Key Management
//!
//! Each custodian holds an X25519 keypair. The public half is handed to the
//! ceremony operator and ends up as a recipient of one sealed share; the
//! private half never leaves the custodian and is stored on disk wrapped
//! under a passphrase.
//!
//! ## Key files
//!
//! Both halves are armored JSON so they survive email and clipboards:
//!
//! - public: `{ version, identity, publicKey(hex) }` under
//!   `KEYMASTER CUSTODIAN PUBLIC KEY`
//! - private: `{ version, identity, publicKey(hex), salt(hex), sealedKey(hex) }`
//!   under `KEYMASTER CUSTODIAN PRIVATE KEY`, where `sealedKey` is the
//!   X25519 secret encrypted with AES-256-GCM under
//!   Argon2id(passphrase, salt), authenticated together with the identity
//!   and public key.
//!
//! ## Security Notes
//!
//! - `Debug` output never includes secret key material.
//! - The X25519 secret is zeroized on drop by `x25519-dalek`; the derived
//!   passphrase key is held in a `Zeroizing` buffer.

use std::fmt;

use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::config::{
    AES_KEY_LENGTH, ARGON2_M_COST_KIB, ARGON2_P_COST, ARGON2_T_COST, ARMOR_PRIVATE_KEY,
    ARMOR_PUBLIC_KEY, PASSPHRASE_SALT_LENGTH, X25519_KEY_LENGTH,
};
use crate::crypto::armor::{armor, dearmor};
use crate::crypto::encryption;
use crate::crypto::sealed::SealError;

/// Key file format version.
const KEY_FILE_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Public key
// ---------------------------------------------------------------------------

/// A custodian's public key together with the identity it belongs to.
///
/// The identity is what ends up in `keyIdentity` of the custodian's share
/// document, so it should be stable and human-meaningful (an email address
/// or a username).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CustodianPublicKey {
    identity: String,
    key: [u8; X25519_KEY_LENGTH],
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublicKeyFile {
    version: u32,
    identity: String,
    public_key: String,
}

impl CustodianPublicKey {
    /// Pair raw X25519 public key bytes with an identity.
    pub fn new(identity: impl Into<String>, key: [u8; X25519_KEY_LENGTH]) -> Self {
        Self {
            identity: identity.into(),
            key,
        }
    }

    /// The custodian identity this key belongs to.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Raw X25519 public key bytes.
    pub fn as_bytes(&self) -> &[u8; X25519_KEY_LENGTH] {
        &self.key
    }

    pub(crate) fn to_x25519(&self) -> PublicKey {
        PublicKey::from(self.key)
    }

    /// Hex-encoded public key bytes.
    pub fn to_hex(&self) -> String {
        hex::encode(self.key)
    }

    /// Export as an armored public key block.
    pub fn to_armored(&self) -> Result<String, SealError> {
        let file = PublicKeyFile {
            version: KEY_FILE_VERSION,
            identity: self.identity.clone(),
            public_key: self.to_hex(),
        };
        let json = serde_json::to_vec(&file).map_err(|e| SealError::KeyFormat(e.to_string()))?;
        Ok(armor(ARMOR_PUBLIC_KEY, &json))
    }

    /// Parse an armored public key block.
    pub fn from_armored(text: &str) -> Result<Self, SealError> {
        let json = dearmor(ARMOR_PUBLIC_KEY, text)?;
        let file: PublicKeyFile =
            serde_json::from_slice(&json).map_err(|e| SealError::KeyFormat(e.to_string()))?;
        if file.version != KEY_FILE_VERSION {
            return Err(SealError::UnsupportedVersion(file.version));
        }
        if file.identity.is_empty() {
            return Err(SealError::KeyFormat("empty identity".into()));
        }
        Ok(Self::new(file.identity, decode_key_hex(&file.public_key)?))
    }
}

impl fmt::Debug for CustodianPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CustodianPublicKey({}, {})", self.identity, self.to_hex())
    }
}

impl fmt::Display for CustodianPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.identity, &self.to_hex()[..16])
    }
}

// ---------------------------------------------------------------------------
// Keypair
// ---------------------------------------------------------------------------

/// A custodian's X25519 keypair.
pub struct CustodianKeypair {
    identity: String,
    secret: StaticSecret,
    public: PublicKey,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PrivateKeyFile {
    version: u32,
    identity: String,
    public_key: String,
    salt: String,
    sealed_key: String,
}

impl CustodianKeypair {
    /// Generate a fresh keypair from the OS CSPRNG.
    pub fn generate(identity: impl Into<String>) -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self {
            identity: identity.into(),
            secret,
            public,
        }
    }

    /// Rebuild a keypair from raw secret bytes.
    pub fn from_secret_bytes(identity: impl Into<String>, bytes: [u8; X25519_KEY_LENGTH]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Self {
            identity: identity.into(),
            secret,
            public,
        }
    }

    /// The custodian identity.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// The public half, ready to hand to the ceremony operator.
    pub fn public_key(&self) -> CustodianPublicKey {
        CustodianPublicKey::new(self.identity.clone(), self.public.to_bytes())
    }

    pub(crate) fn secret(&self) -> &StaticSecret {
        &self.secret
    }

    /// Export the keypair as an armored block protected by `passphrase`.
    pub fn to_protected_armored(&self, passphrase: &str) -> Result<String, SealError> {
        let mut salt = [0u8; PASSPHRASE_SALT_LENGTH];
        OsRng.fill_bytes(&mut salt);

        let key = stretch_passphrase(passphrase, &salt)?;
        let public_hex = hex::encode(self.public.to_bytes());
        let aad = private_key_aad(&self.identity, &public_hex);
        let secret_bytes = Zeroizing::new(self.secret.to_bytes());
        let sealed = encryption::encrypt(&key, secret_bytes.as_slice(), &aad)?;

        let file = PrivateKeyFile {
            version: KEY_FILE_VERSION,
            identity: self.identity.clone(),
            public_key: public_hex,
            salt: hex::encode(salt),
            sealed_key: hex::encode(sealed),
        };
        let json = serde_json::to_vec(&file).map_err(|e| SealError::KeyFormat(e.to_string()))?;
        Ok(armor(ARMOR_PRIVATE_KEY, &json))
    }

    /// Unlock an armored private key block with `passphrase`.
    ///
    /// A wrong passphrase and a tampered file are indistinguishable and both
    /// return [`SealError::BadPassphrase`].
    pub fn from_protected_armored(text: &str, passphrase: &str) -> Result<Self, SealError> {
        let json = Zeroizing::new(dearmor(ARMOR_PRIVATE_KEY, text)?);
        let file: PrivateKeyFile =
            serde_json::from_slice(&json).map_err(|e| SealError::KeyFormat(e.to_string()))?;
        if file.version != KEY_FILE_VERSION {
            return Err(SealError::UnsupportedVersion(file.version));
        }

        let salt = hex::decode(&file.salt).map_err(|e| SealError::KeyFormat(e.to_string()))?;
        let sealed =
            hex::decode(&file.sealed_key).map_err(|e| SealError::KeyFormat(e.to_string()))?;

        let key = stretch_passphrase(passphrase, &salt)?;
        let aad = private_key_aad(&file.identity, &file.public_key);
        let secret = Zeroizing::new(
            encryption::decrypt(&key, &sealed, &aad).map_err(|_| SealError::BadPassphrase)?,
        );
        let secret: [u8; X25519_KEY_LENGTH] = secret
            .as_slice()
            .try_into()
            .map_err(|_| SealError::KeyFormat("wrong secret key length".into()))?;

        let keypair = Self::from_secret_bytes(file.identity, secret);
        if hex::encode(keypair.public.to_bytes()) != file.public_key {
            return Err(SealError::KeyFormat("public key does not match secret".into()));
        }
        Ok(keypair)
    }
}

impl fmt::Debug for CustodianKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustodianKeypair")
            .field("identity", &self.identity)
            .field("public", &hex::encode(self.public.to_bytes()))
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn decode_key_hex(s: &str) -> Result<[u8; X25519_KEY_LENGTH], SealError> {
    let bytes = hex::decode(s).map_err(|e| SealError::KeyFormat(e.to_string()))?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| SealError::KeyFormat(format!("expected {X25519_KEY_LENGTH} key bytes")))
}

fn private_key_aad(identity: &str, public_hex: &str) -> Vec<u8> {
    let mut aad = Vec::with_capacity(identity.len() + public_hex.len() + 1);
    aad.extend_from_slice(identity.as_bytes());
    aad.push(0);
    aad.extend_from_slice(public_hex.as_bytes());
    aad
}

/// Argon2id(passphrase, salt) -> AES-256 key.
fn stretch_passphrase(
    passphrase: &str,
    salt: &[u8],
) -> Result<Zeroizing<[u8; AES_KEY_LENGTH]>, SealError> {
    let params = Params::new(
        ARGON2_M_COST_KIB,
        ARGON2_T_COST,
        ARGON2_P_COST,
        Some(AES_KEY_LENGTH),
    )
    .map_err(|e| SealError::Kdf(e.to_string()))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = Zeroizing::new([0u8; AES_KEY_LENGTH]);
    argon2
        .hash_password_into(passphrase.as_bytes(), salt, &mut key[..])
        .map_err(|e| SealError::Kdf(e.to_string()))?;
    Ok(key)
}
