// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Keymaster Recovery Core Library
//!
//! Disaster recovery for a signing key nobody should hold alone. The master
//! secret is split K-of-N with Shamir's scheme, each share is sealed to one
//! custodian's public key, and a public recovery configuration records what
//! was issued. Recovering means collecting K custodian submissions in a
//! session and interpolating.
//!
//! ## Architecture
//!
//! - **config**: Protocol constants: sizes, versions, KDF contexts, Argon2 cost.
//! - **crypto**: GF(256) Shamir, sealed boxes, custodian key files, hashing.
//! - **sharing**: The ceremony: issuer, share documents, recovery session.
//!
//! ## Quick tour
//!
//! ```
//! use keymaster_recovery::crypto::{CustodianKeypair, SealedBox};
//! use keymaster_recovery::sharing::{RecoverySession, ShareIssuer};
//!
//! let custodians: Vec<_> = ["alice", "bob", "carol"]
//!     .iter()
//!     .map(|id| CustodianKeypair::generate(*id))
//!     .collect();
//! let public: Vec<_> = custodians.iter().map(|c| c.public_key()).collect();
//!
//! let issuer = ShareIssuer::new(SealedBox::new());
//! let (config, secret) = issuer.issue_with_generated_secret(2, &public).unwrap();
//!
//! // Any two custodians open their sealed share and submit it.
//! let session = RecoverySession::new(config.clone());
//! for custodian in &custodians[1..] {
//!     let descriptor = config.descriptor_for_identity(custodian.identity()).unwrap();
//!     let doc = SealedBox::new()
//!         .open_armored(custodian, &descriptor.encrypted_share)
//!         .unwrap();
//!     session.add_share(&doc).unwrap();
//! }
//! assert_eq!(session.combine().unwrap(), secret);
//! ```
//!
//! ## Ground rules
//!
//! 1. Secret material is zeroized on drop and never appears in `Debug` or logs.
//! 2. Nothing partial escapes issuance: one failed recipient aborts the ceremony.
//! 3. A rejected submission never changes a session's state.

pub mod config;
pub mod crypto;
pub mod sharing;
