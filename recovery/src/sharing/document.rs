//! # Share Documents & Recovery Configuration
//!
//! Three document types, two audiences:
//!
//! - [`SharePrivateDoc`] is what a custodian holds after decrypting their
//!   sealed share. It is the thing they submit during recovery.
//! - [`SharePublicDescriptor`] and [`RecoveryConfiguration`] are public. The
//!   configuration is written once at issuance and published next to the
//!   sealed shares; anyone can read it, nobody can learn the secret from it.
//!
//! ## Canonical form and fingerprints
//!
//! A share document serializes as compact JSON with its fields in a fixed
//! order:
//!
//! ```text
//! {"version":1,"keyIdentity":"alice@example.com","secretShare":"AZ3m...="}
//! ```
//!
//! The fingerprint is SHA-256 over exactly those bytes, so the version and
//! the identity are covered by the same integrity check as the share itself.
//! A session fingerprints a submission *as submitted*: anything other than
//! the canonical bytes simply does not match.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::config::{FINGERPRINT_LENGTH, MAX_SHARES, SECRET_CHECK_CONTEXT, SHARE_DOC_VERSION};
use crate::crypto::hash::{domain_separated_hash, sha256_array};
use crate::crypto::shamir::{ShamirError, Share};

/// Errors from parsing or validating share documents and configurations.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("requiredShares must be between 1 and {available}, got {required}")]
    ThresholdOutOfRange { required: usize, available: usize },

    #[error("too many shares: {0} (max {max})", max = MAX_SHARES)]
    TooManyShares(usize),

    #[error("shareInfo key {key} does not match its descriptor's fingerprint")]
    FingerprintKeyMismatch { key: String },

    #[error("keyIdentity must not be empty")]
    EmptyIdentity,

    #[error("keyIdentity {0} appears more than once")]
    DuplicateIdentity(String),

    #[error("secretCheck requires a ceremonyId")]
    SecretCheckWithoutCeremony,
}

// ---------------------------------------------------------------------------
// Fingerprint
// ---------------------------------------------------------------------------

/// SHA-256 digest of a canonical share document.
///
/// Serialized as standard base64 inside descriptors. Used as a map key in
/// its URL-safe form, see [`Fingerprint::to_key`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(#[serde(with = "base64_bytes")] [u8; FINGERPRINT_LENGTH]);

impl Fingerprint {
    /// Fingerprint arbitrary bytes. Sessions call this on submissions
    /// before parsing anything.
    pub fn of(bytes: &[u8]) -> Self {
        Self(sha256_array(bytes))
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_LENGTH] {
        &self.0
    }

    /// URL-safe padded base64, the form used for `shareInfo` keys.
    pub fn to_key(&self) -> String {
        URL_SAFE.encode(self.0)
    }

    /// Parse a `shareInfo` key back into a fingerprint.
    pub fn from_key(key: &str) -> Option<Self> {
        let bytes = URL_SAFE.decode(key).ok()?;
        bytes.try_into().ok().map(Self)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_key())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_key())
    }
}

// ---------------------------------------------------------------------------
// Private share document
// ---------------------------------------------------------------------------

/// One custodian's share, as they hold it after decryption.
///
/// Field order is part of the format: `serde` emits fields in declaration
/// order, which is what makes [`SharePrivateDoc::canonical_bytes`]
/// reproducible. Share bytes are wiped on drop.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct SharePrivateDoc {
    #[zeroize(skip)]
    version: u32,
    #[zeroize(skip)]
    key_identity: String,
    #[serde(with = "base64_bytes")]
    secret_share: Vec<u8>,
}

impl SharePrivateDoc {
    /// Build a current-version document.
    pub fn new(key_identity: impl Into<String>, secret_share: Vec<u8>) -> Self {
        Self {
            version: SHARE_DOC_VERSION,
            key_identity: key_identity.into(),
            secret_share,
        }
    }

    /// Parse a submitted document. Does not check the version; that is the
    /// session's call.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, DocumentError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn key_identity(&self) -> &str {
        &self.key_identity
    }

    /// Encoded share: x-coordinate followed by one byte per secret byte.
    pub fn secret_share(&self) -> &[u8] {
        &self.secret_share
    }

    /// Decode the embedded share for interpolation.
    pub fn share(&self) -> Result<Share, ShamirError> {
        Share::from_bytes(&self.secret_share)
    }

    /// Compact JSON in canonical field order. This is what gets sealed to
    /// the custodian, and what they submit back.
    pub fn canonical_bytes(&self) -> Result<Zeroizing<Vec<u8>>, DocumentError> {
        Ok(Zeroizing::new(serde_json::to_vec(self)?))
    }

    /// SHA-256 of [`SharePrivateDoc::canonical_bytes`].
    pub fn fingerprint(&self) -> Result<Fingerprint, DocumentError> {
        Ok(Fingerprint::of(&self.canonical_bytes()?))
    }
}

impl fmt::Debug for SharePrivateDoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharePrivateDoc")
            .field("version", &self.version)
            .field("key_identity", &self.key_identity)
            .field("secret_share_len", &self.secret_share.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Public descriptor
// ---------------------------------------------------------------------------

/// Public record of one issued share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharePublicDescriptor {
    pub fingerprint: Fingerprint,
    pub key_identity: String,
    /// Armored sealed message holding the canonical [`SharePrivateDoc`].
    pub encrypted_share: String,
}

// ---------------------------------------------------------------------------
// Secret check
// ---------------------------------------------------------------------------

/// Keyed digest of the secret, bound to one ceremony.
///
/// Lets a recovery confirm that the interpolated value is the secret that
/// was issued, rather than trusting that K validated shares always
/// interpolate correctly. It is public: anyone holding the configuration
/// can test guesses against it, so it only belongs next to high-entropy
/// secrets such as generated keys.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretCheck(#[serde(with = "base64_bytes")] [u8; 32]);

impl SecretCheck {
    pub fn compute(ceremony_id: &Uuid, secret: &[u8]) -> Self {
        Self(domain_separated_hash(
            SECRET_CHECK_CONTEXT,
            &[ceremony_id.as_bytes(), secret],
        ))
    }

    /// Constant-time comparison against a candidate secret.
    pub fn matches(&self, ceremony_id: &Uuid, secret: &[u8]) -> bool {
        let candidate = Self::compute(ceremony_id, secret);
        blake3::Hash::from(self.0) == blake3::Hash::from(candidate.0)
    }
}

impl fmt::Debug for SecretCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretCheck({})", STANDARD.encode(self.0))
    }
}

// ---------------------------------------------------------------------------
// Recovery configuration
// ---------------------------------------------------------------------------

/// Everything needed to run a recovery, and nothing that reveals the secret.
///
/// Every deserialized configuration has passed [`RecoveryConfiguration::validate`];
/// an invalid file fails to parse rather than producing a session that can
/// never succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "ConfigurationFile")]
pub struct RecoveryConfiguration {
    required_shares: usize,
    share_info: BTreeMap<String, SharePublicDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ceremony_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    secret_check: Option<SecretCheck>,
}

/// Unvalidated wire shape of [`RecoveryConfiguration`].
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigurationFile {
    required_shares: usize,
    share_info: BTreeMap<String, SharePublicDescriptor>,
    #[serde(default)]
    ceremony_id: Option<Uuid>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    secret_check: Option<SecretCheck>,
}

impl TryFrom<ConfigurationFile> for RecoveryConfiguration {
    type Error = DocumentError;

    fn try_from(file: ConfigurationFile) -> Result<Self, Self::Error> {
        let config = Self {
            required_shares: file.required_shares,
            share_info: file.share_info,
            ceremony_id: file.ceremony_id,
            created_at: file.created_at,
            secret_check: file.secret_check,
        };
        config.validate()?;
        Ok(config)
    }
}

impl RecoveryConfiguration {
    /// Assemble a configuration from issued descriptors. Keys are derived
    /// from the fingerprints here, so they cannot disagree.
    pub(crate) fn from_descriptors(
        required_shares: usize,
        descriptors: Vec<SharePublicDescriptor>,
        ceremony_id: Uuid,
        secret_check: Option<SecretCheck>,
    ) -> Result<Self, DocumentError> {
        let share_info = descriptors
            .into_iter()
            .map(|d| (d.fingerprint.to_key(), d))
            .collect();
        let config = Self {
            required_shares,
            share_info,
            ceremony_id: Some(ceremony_id),
            created_at: Some(Utc::now()),
            secret_check,
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a configuration file.
    pub fn from_json(json: &str) -> Result<Self, DocumentError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Pretty JSON, the format configurations are published in.
    pub fn to_json_pretty(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check the structural invariants of a configuration.
    pub fn validate(&self) -> Result<(), DocumentError> {
        let available = self.share_info.len();
        if available > MAX_SHARES {
            return Err(DocumentError::TooManyShares(available));
        }
        if self.required_shares < 1 || self.required_shares > available {
            return Err(DocumentError::ThresholdOutOfRange {
                required: self.required_shares,
                available,
            });
        }

        let mut identities = HashSet::with_capacity(available);
        for (key, descriptor) in &self.share_info {
            if Fingerprint::from_key(key) != Some(descriptor.fingerprint) {
                return Err(DocumentError::FingerprintKeyMismatch { key: key.clone() });
            }
            if descriptor.key_identity.is_empty() {
                return Err(DocumentError::EmptyIdentity);
            }
            if !identities.insert(descriptor.key_identity.as_str()) {
                return Err(DocumentError::DuplicateIdentity(
                    descriptor.key_identity.clone(),
                ));
            }
        }

        if self.secret_check.is_some() && self.ceremony_id.is_none() {
            return Err(DocumentError::SecretCheckWithoutCeremony);
        }
        Ok(())
    }

    /// K: how many shares a recovery needs.
    pub fn required_shares(&self) -> usize {
        self.required_shares
    }

    /// N: how many shares were issued.
    pub fn total_shares(&self) -> usize {
        self.share_info.len()
    }

    pub fn ceremony_id(&self) -> Option<Uuid> {
        self.ceremony_id
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn secret_check(&self) -> Option<&SecretCheck> {
        self.secret_check.as_ref()
    }

    /// Look up the descriptor issued under `fingerprint`.
    pub fn descriptor(&self, fingerprint: &Fingerprint) -> Option<&SharePublicDescriptor> {
        self.share_info.get(&fingerprint.to_key())
    }

    /// Descriptor issued to `identity`, if any.
    pub fn descriptor_for_identity(&self, identity: &str) -> Option<&SharePublicDescriptor> {
        self.share_info
            .values()
            .find(|d| d.key_identity == identity)
    }

    /// All descriptors, ordered by `shareInfo` key.
    pub fn descriptors(&self) -> impl Iterator<Item = &SharePublicDescriptor> {
        self.share_info.values()
    }

    /// `true` if there is no secret check to fail, or `secret` passes it.
    pub fn verify_secret(&self, secret: &[u8]) -> bool {
        match (&self.secret_check, &self.ceremony_id) {
            (Some(check), Some(id)) => check.matches(id, secret),
            _ => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

/// Standard padded base64 for byte fields.
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S, T>(bytes: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: AsRef<[u8]>,
    {
        serializer.serialize_str(&STANDARD.encode(bytes.as_ref()))
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: TryFrom<Vec<u8>>,
    {
        let encoded = String::deserialize(deserializer)?;
        let bytes = STANDARD.decode(encoded.as_bytes()).map_err(de::Error::custom)?;
        let len = bytes.len();
        T::try_from(bytes).map_err(|_| de::Error::invalid_length(len, &"a fixed-size byte field"))
    }
}
