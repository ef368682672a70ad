//! # Share Issuer
//!
//! Runs the issuance half of a ceremony: split the secret K-of-N, wrap one
//! share document per custodian, and emit the public
//! [`RecoveryConfiguration`].
//!
//! ```text
//!                    ┌──────────── per recipient, in parallel ────────────┐
//! secret ─► split ─► │ SharePrivateDoc ─► canonical JSON ─┬─► SHA-256      │ ─► RecoveryConfiguration
//!                    │                                    └─► seal(pubkey) │
//!                    └────────────────────────────────────────────────────┘
//! ```
//!
//! Issuance is all-or-nothing. If sealing fails for any single custodian the
//! caller gets an error and no configuration; a ceremony missing one share
//! silently turns K-of-N into K-of-(N-1).

use rand::rngs::OsRng;
use rand::RngCore;
use rayon::prelude::*;
use tracing::{debug, info, info_span};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::config::{MAX_SHARES, SHARED_KEY_SIZE_BYTES};
use crate::crypto::keys::CustodianPublicKey;
use crate::crypto::sealed::{EncryptionService, SealedBox};
use crate::crypto::shamir::{split_secret, ShamirConfig, Share};
use crate::sharing::document::{
    Fingerprint, RecoveryConfiguration, SecretCheck, SharePrivateDoc, SharePublicDescriptor,
};
use crate::sharing::error::{RecoveryError, Result};

/// Issuance knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssueOptions {
    /// Publish a [`SecretCheck`] in the configuration. Turn this off when
    /// the secret is low-entropy (a passphrase rather than a key).
    pub embed_secret_check: bool,
}

impl Default for IssueOptions {
    fn default() -> Self {
        Self {
            embed_secret_check: true,
        }
    }
}

/// Splits secrets and seals the pieces to custodians.
#[derive(Debug, Clone, Default)]
pub struct ShareIssuer<S = SealedBox> {
    service: S,
    options: IssueOptions,
}

impl<S: EncryptionService> ShareIssuer<S> {
    /// Issuer with default options.
    pub fn new(service: S) -> Self {
        Self::with_options(service, IssueOptions::default())
    }

    pub fn with_options(service: S, options: IssueOptions) -> Self {
        Self { service, options }
    }

    /// The encryption service shares are sealed with.
    pub fn service(&self) -> &S {
        &self.service
    }

    /// Split `secret` (or a freshly generated 32-byte secret when `None`)
    /// into one sealed share per recipient, any `threshold` of which
    /// reconstruct it.
    ///
    /// # Errors
    ///
    /// - [`RecoveryError::Precondition`] for a bad threshold, an empty,
    ///   oversized or duplicated recipient list, or an empty secret.
    /// - [`RecoveryError::Encryption`] if sealing fails for any recipient.
    pub fn issue_shares(
        &self,
        secret: Option<&[u8]>,
        threshold: usize,
        recipients: &[CustodianPublicKey],
    ) -> Result<RecoveryConfiguration> {
        match secret {
            Some(secret) => self.issue(secret, threshold, recipients),
            None => {
                let generated = generate_secret();
                self.issue(&generated, threshold, recipients)
            }
        }
    }

    /// Issue shares of a freshly generated secret and hand the secret back,
    /// for callers that go on to seal something with it.
    pub fn issue_with_generated_secret(
        &self,
        threshold: usize,
        recipients: &[CustodianPublicKey],
    ) -> Result<(RecoveryConfiguration, Zeroizing<Vec<u8>>)> {
        let secret = generate_secret();
        let config = self.issue(&secret, threshold, recipients)?;
        Ok((config, secret))
    }

    fn issue(
        &self,
        secret: &[u8],
        threshold: usize,
        recipients: &[CustodianPublicKey],
    ) -> Result<RecoveryConfiguration> {
        check_preconditions(secret, threshold, recipients)?;

        let ceremony_id = Uuid::new_v4();
        let span = info_span!("issue_shares", %ceremony_id);
        let _enter = span.enter();
        info!(
            threshold,
            custodians = recipients.len(),
            "issuing recovery shares"
        );

        // Bounds were checked above, both fit in a u8.
        let shamir = ShamirConfig::new(threshold as u8, recipients.len() as u8)
            .map_err(RecoveryError::Split)?;
        let shares = split_secret(secret, &shamir).map_err(RecoveryError::Split)?;
        if shares.len() != recipients.len() {
            return Err(RecoveryError::Precondition(format!(
                "split produced {} shares for {} recipients",
                shares.len(),
                recipients.len()
            )));
        }

        // Indexed parallel iterators keep recipient order through collect.
        let descriptors = recipients
            .par_iter()
            .zip(shares.par_iter())
            .map(|(recipient, share)| span.in_scope(|| self.seal_share(recipient, share)))
            .collect::<Result<Vec<_>>>()?;

        let secret_check = self
            .options
            .embed_secret_check
            .then(|| SecretCheck::compute(&ceremony_id, secret));

        let config =
            RecoveryConfiguration::from_descriptors(threshold, descriptors, ceremony_id, secret_check)?;
        info!(
            secret_check = config.secret_check().is_some(),
            "recovery configuration issued"
        );
        Ok(config)
    }

    fn seal_share(
        &self,
        recipient: &CustodianPublicKey,
        share: &Share,
    ) -> Result<SharePublicDescriptor> {
        let doc = SharePrivateDoc::new(recipient.identity(), share.to_bytes());
        let canonical = doc.canonical_bytes()?;
        let fingerprint = Fingerprint::of(&canonical);

        let encrypted_share = self
            .service
            .encrypt_armored(recipient, &canonical)
            .map_err(|source| RecoveryError::Encryption {
                identity: recipient.identity().to_string(),
                source,
            })?;

        debug!(custodian = recipient.identity(), %fingerprint, "share sealed");
        Ok(SharePublicDescriptor {
            fingerprint,
            key_identity: recipient.identity().to_string(),
            encrypted_share,
        })
    }
}

fn generate_secret() -> Zeroizing<Vec<u8>> {
    let mut secret = Zeroizing::new(vec![0u8; SHARED_KEY_SIZE_BYTES]);
    OsRng.fill_bytes(&mut secret);
    secret
}

fn check_preconditions(
    secret: &[u8],
    threshold: usize,
    recipients: &[CustodianPublicKey],
) -> Result<()> {
    if secret.is_empty() {
        return Err(RecoveryError::Precondition("secret must not be empty".into()));
    }
    if recipients.len() > MAX_SHARES {
        return Err(RecoveryError::Precondition(format!(
            "at most {MAX_SHARES} recipients are supported, got {}",
            recipients.len()
        )));
    }
    if threshold < 1 || threshold > recipients.len() {
        return Err(RecoveryError::Precondition(format!(
            "threshold must be between 1 and {} recipients, got {threshold}",
            recipients.len()
        )));
    }

    let mut seen = std::collections::HashSet::with_capacity(recipients.len());
    for recipient in recipients {
        if recipient.identity().is_empty() {
            return Err(RecoveryError::Precondition(
                "recipient identity must not be empty".into(),
            ));
        }
        if !seen.insert(recipient.identity()) {
            return Err(RecoveryError::Precondition(format!(
                "recipient {} appears more than once",
                recipient.identity()
            )));
        }
    }
    Ok(())
}
