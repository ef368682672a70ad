//! # Threshold Share Issuance & Recovery
//!
//! The ceremony layer on top of the primitives in [`crate::crypto`].
//!
//! ```text
//! document.rs: share documents, fingerprints, the public recovery configuration
//! issuer.rs  : split, seal, and publish (IssueShares)
//! session.rs : collect, validate, and combine (AddShare / Combine)
//! error.rs   : RecoveryError and how transports should treat it
//! ```

pub mod document;
pub mod error;
pub mod issuer;
pub mod session;

pub use document::{
    DocumentError, Fingerprint, RecoveryConfiguration, SecretCheck, SharePrivateDoc,
    SharePublicDescriptor,
};
pub use error::{Disposition, RecoveryError, Result};
pub use issuer::{IssueOptions, ShareIssuer};
pub use session::{RecoverySession, SessionStatus};
