//! Error types for share issuance and recovery.
//!
//! Every issuer and session operation returns a [`RecoveryError`]. The
//! variants split into two groups that callers treat very differently:
//!
//! - **Ceremony-fatal**: bad parameters or a failing encryption service
//!   during issuance. Nothing partial is ever returned.
//! - **Per-submission**: a custodian sent something wrong. The session is
//!   untouched and keeps accepting other submissions.
//!
//! [`RecoveryError::disposition`] makes that split explicit for transports.

use thiserror::Error;

use crate::crypto::{SealError, ShamirError};
use crate::sharing::document::DocumentError;

/// Convenience alias for results in the sharing module.
pub type Result<T> = std::result::Result<T, RecoveryError>;

/// Errors that can occur while issuing or recovering shares.
#[derive(Debug, Error)]
pub enum RecoveryError {
    /// Issuance parameters are invalid (threshold, recipients, secret).
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// The encryption service failed for one recipient. The whole
    /// ceremony is aborted.
    #[error("encryption failed for {identity}")]
    Encryption {
        /// Identity of the recipient whose share could not be sealed.
        identity: String,
        /// Underlying service error.
        #[source]
        source: SealError,
    },

    /// The threshold primitive refused to split the secret.
    #[error("secret splitting failed: {0}")]
    Split(#[source] ShamirError),

    /// The issued configuration failed its own validation.
    #[error("recovery configuration: {0}")]
    Document(#[from] DocumentError),

    /// A share with this fingerprint has already been accepted.
    #[error("share {fingerprint} was already submitted")]
    DuplicateShare {
        /// URL-safe base64 fingerprint of the submission.
        fingerprint: String,
    },

    /// The submission does not match any share of this ceremony. Also what
    /// a single flipped byte in a genuine share looks like.
    #[error("share {fingerprint} is not part of this recovery configuration")]
    UnknownShare {
        /// URL-safe base64 fingerprint of the submission.
        fingerprint: String,
    },

    /// The fingerprint matched but the document could not be used.
    #[error("malformed share document: {0}")]
    MalformedShare(String),

    /// Not enough shares yet. Expected while custodians trickle in.
    #[error("insufficient shares: have {have}, need {need}")]
    InsufficientShares {
        /// Shares accepted so far.
        have: usize,
        /// Shares required by the configuration.
        need: usize,
    },

    /// Interpolation rejected the collected shares.
    #[error("share combination failed: {0}")]
    CombinationFailed(#[source] ShamirError),

    /// The reconstructed secret does not match the configuration's
    /// secret check.
    #[error("reconstructed secret does not match the recovery configuration's secret check")]
    SecretCheckMismatch,

    /// The session already produced the secret and accepts no more shares.
    #[error("recovery session already combined")]
    SessionCombined,
}

/// How a transport should react to a [`RecoveryError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Client error: reject the submission, the session carries on.
    Rejected,
    /// Not an error from the user's point of view: wait for more shares.
    Waiting,
    /// Shares validated yet did not reconstruct. Someone should look.
    Alert,
    /// The operation is aborted and must be restarted.
    Fatal,
}

impl RecoveryError {
    /// Classify this error for callers that map errors onto responses.
    pub fn disposition(&self) -> Disposition {
        match self {
            Self::Precondition(_)
            | Self::Encryption { .. }
            | Self::Split(_)
            | Self::Document(_) => Disposition::Fatal,
            Self::DuplicateShare { .. }
            | Self::UnknownShare { .. }
            | Self::MalformedShare(_)
            | Self::SessionCombined => Disposition::Rejected,
            Self::InsufficientShares { .. } => Disposition::Waiting,
            Self::CombinationFailed(_) | Self::SecretCheckMismatch => Disposition::Alert,
        }
    }
}
