//! # Recovery Session
//!
//! The combining half of a ceremony. A session is created from a
//! [`RecoveryConfiguration`], accepts share documents as custodians submit
//! them, and reconstructs the secret once enough have arrived.
//!
//! ## State machine
//!
//! ```text
//!   Collecting ──(known == K)──► Ready ──(combine ok)──► Combined
//!       ▲  │                      ▲  │                      │
//!       └──┘ add_share            └──┘ add_share            └─► combine returns cached secret
//! ```
//!
//! Rejected submissions (duplicate, unknown, malformed) never change state.
//! A failed combination leaves the session in `Ready`; the operator can keep
//! collecting shares and retry.
//!
//! ## Concurrency
//!
//! Both operations take `&self`. Accepted shares and the cached secret sit
//! behind one mutex, so an `Arc<RecoverySession>` can be fed from any number
//! of request handlers at once.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, field, info, info_span, warn, Span};
use zeroize::Zeroizing;

use crate::config::{MAX_COMBINE_SUBSETS, SHARE_DOC_VERSION};
use crate::crypto::shamir::{recover_secret, Share};
use crate::sharing::document::{Fingerprint, RecoveryConfiguration, SharePrivateDoc};
use crate::sharing::error::{RecoveryError, Result};

/// Where a session stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Fewer than `required` shares accepted.
    Collecting { known: usize, required: usize },
    /// Enough shares to attempt [`RecoverySession::combine`].
    Ready { known: usize, required: usize },
    /// The secret has been reconstructed and cached.
    Combined { known: usize },
}

#[derive(Default)]
struct SessionState {
    known: BTreeMap<Fingerprint, SharePrivateDoc>,
    secret: Option<Zeroizing<Vec<u8>>>,
}

/// One in-memory recovery attempt. Never persisted; drop it to abandon.
pub struct RecoverySession {
    config: Arc<RecoveryConfiguration>,
    span: Span,
    state: Mutex<SessionState>,
}

impl RecoverySession {
    /// Start a session. Log events are recorded under a
    /// `recovery_session` span carrying the ceremony id.
    pub fn new(config: impl Into<Arc<RecoveryConfiguration>>) -> Self {
        let config = config.into();
        let span = info_span!("recovery_session", ceremony_id = field::Empty);
        if let Some(id) = config.ceremony_id() {
            span.record("ceremony_id", field::display(id));
        }
        Self::with_span(config, span)
    }

    /// Start a session that logs under a caller-supplied span, e.g. one
    /// carrying a request id.
    pub fn with_span(config: impl Into<Arc<RecoveryConfiguration>>, span: Span) -> Self {
        Self {
            config: config.into(),
            span,
            state: Mutex::new(SessionState::default()),
        }
    }

    /// The configuration this session validates against.
    pub fn config(&self) -> &RecoveryConfiguration {
        &self.config
    }

    /// Validate and store one submitted share document.
    ///
    /// `raw` is fingerprinted exactly as given, before any parsing. Returns
    /// the number of distinct shares accepted so far.
    pub fn add_share(&self, raw: &[u8]) -> Result<usize> {
        let _enter = self.span.enter();
        let fingerprint = Fingerprint::of(raw);

        let mut state = self.state.lock();
        if state.secret.is_some() {
            return Err(RecoveryError::SessionCombined);
        }
        if state.known.contains_key(&fingerprint) {
            debug!(%fingerprint, "duplicate share submission");
            return Err(RecoveryError::DuplicateShare {
                fingerprint: fingerprint.to_key(),
            });
        }

        let Some(descriptor) = self.config.descriptor(&fingerprint) else {
            warn!(%fingerprint, "share does not belong to this ceremony");
            return Err(RecoveryError::UnknownShare {
                fingerprint: fingerprint.to_key(),
            });
        };

        let doc = SharePrivateDoc::from_slice(raw).map_err(|e| {
            warn!(%fingerprint, custodian = %descriptor.key_identity, "unparseable share document");
            RecoveryError::MalformedShare(e.to_string())
        })?;
        if doc.version() != SHARE_DOC_VERSION {
            warn!(%fingerprint, version = doc.version(), "unsupported share document version");
            return Err(RecoveryError::MalformedShare(format!(
                "unsupported version {}",
                doc.version()
            )));
        }
        if doc.key_identity() != descriptor.key_identity {
            warn!(
                %fingerprint,
                expected = %descriptor.key_identity,
                got = doc.key_identity(),
                "share identity disagrees with configuration"
            );
            return Err(RecoveryError::MalformedShare(format!(
                "keyIdentity {} does not match issued identity {}",
                doc.key_identity(),
                descriptor.key_identity
            )));
        }
        if let Err(e) = doc.share() {
            warn!(%fingerprint, "undecodable share bytes");
            return Err(RecoveryError::MalformedShare(e.to_string()));
        }

        state.known.insert(fingerprint, doc);
        let known = state.known.len();
        let required = self.config.required_shares();
        debug!(custodian = %descriptor.key_identity, known, required, "share accepted");
        if known == required {
            info!(known, "share threshold reached");
        }
        Ok(known)
    }

    /// Reconstruct the secret from the accepted shares.
    ///
    /// All shares are interpolated together first. When the configuration
    /// carries a secret check and that attempt fails, K-subsets are tried in
    /// fingerprint order until one passes, so a single stale share cannot
    /// block recovery once K good ones have arrived.
    ///
    /// The first success is cached; later calls return the same bytes
    /// without interpolating again.
    pub fn combine(&self) -> Result<Zeroizing<Vec<u8>>> {
        let _enter = self.span.enter();
        let mut state = self.state.lock();

        if let Some(secret) = &state.secret {
            return Ok(secret.clone());
        }

        let have = state.known.len();
        let need = self.config.required_shares();
        if have < need {
            return Err(RecoveryError::InsufficientShares { have, need });
        }

        let shares = state
            .known
            .values()
            .map(SharePrivateDoc::share)
            .collect::<std::result::Result<Vec<Share>, _>>()
            .map_err(RecoveryError::CombinationFailed)?;

        let secret = match self.reconstruct(&shares) {
            Ok(secret) => secret,
            Err(e) => match self.reconstruct_from_subset(&shares, need) {
                Some(secret) => {
                    warn!(shares = have, used = need, "full share set failed; recovered from a subset");
                    secret
                }
                None => {
                    error!(shares = have, error = %e, "share combination failed");
                    return Err(e);
                }
            },
        };

        info!(shares = have, "secret reconstructed");
        state.secret = Some(secret.clone());
        Ok(secret)
    }

    /// Interpolate `shares` and hold the result against the secret check.
    fn reconstruct(&self, shares: &[Share]) -> Result<Zeroizing<Vec<u8>>> {
        let secret = recover_secret(shares).map_err(RecoveryError::CombinationFailed)?;
        if !self.config.verify_secret(&secret) {
            return Err(RecoveryError::SecretCheckMismatch);
        }
        Ok(secret)
    }

    /// Walk K-subsets in lexicographic order and return the first secret
    /// that passes the check. Without a check there is nothing to tell a
    /// good subset from a bad one.
    fn reconstruct_from_subset(&self, shares: &[Share], k: usize) -> Option<Zeroizing<Vec<u8>>> {
        if self.config.secret_check().is_none() || shares.len() <= k {
            return None;
        }

        let mut picks: Vec<usize> = (0..k).collect();
        for _ in 0..MAX_COMBINE_SUBSETS {
            let subset: Vec<Share> = picks.iter().map(|&i| shares[i].clone()).collect();
            if let Ok(secret) = self.reconstruct(&subset) {
                return Some(secret);
            }
            if !next_combination(&mut picks, shares.len()) {
                return None;
            }
        }
        warn!(limit = MAX_COMBINE_SUBSETS, "gave up searching share subsets");
        None
    }

    pub fn status(&self) -> SessionStatus {
        let state = self.state.lock();
        let known = state.known.len();
        let required = self.config.required_shares();
        if state.secret.is_some() {
            SessionStatus::Combined { known }
        } else if known >= required {
            SessionStatus::Ready { known, required }
        } else {
            SessionStatus::Collecting { known, required }
        }
    }

    /// Distinct shares accepted so far.
    pub fn known_count(&self) -> usize {
        self.state.lock().known.len()
    }

    /// Custodians whose shares have been accepted, in fingerprint order.
    pub fn known_identities(&self) -> Vec<String> {
        self.state
            .lock()
            .known
            .values()
            .map(|doc| doc.key_identity().to_string())
            .collect()
    }
}

/// Advance `picks` (strictly increasing indices below `n`) to the next
/// combination in lexicographic order. Returns `false` after the last one.
fn next_combination(picks: &mut [usize], n: usize) -> bool {
    let k = picks.len();
    for i in (0..k).rev() {
        if picks[i] < n - k + i {
            picks[i] += 1;
            for j in i + 1..k {
                picks[j] = picks[j - 1] + 1;
            }
            return true;
        }
    }
    false
}

impl std::fmt::Debug for RecoverySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoverySession")
            .field("ceremony_id", &self.config.ceremony_id())
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::shamir::{split_secret, ShamirConfig};
    use crate::sharing::document::{SecretCheck, SharePublicDescriptor};
    use uuid::Uuid;

    /// Build a configuration and the matching canonical share documents
    /// without going through encryption.
    fn ceremony(secret: &[u8], k: u8, names: &[&str]) -> (RecoveryConfiguration, Vec<Vec<u8>>) {
        let shares = split_secret(secret, &ShamirConfig::new(k, names.len() as u8).unwrap()).unwrap();
        let id = Uuid::new_v4();
        let mut raws = Vec::new();
        let mut descriptors = Vec::new();
        for (name, share) in names.iter().zip(&shares) {
            let doc = SharePrivateDoc::new(*name, share.to_bytes());
            let raw = doc.canonical_bytes().unwrap().to_vec();
            descriptors.push(SharePublicDescriptor {
                fingerprint: Fingerprint::of(&raw),
                key_identity: name.to_string(),
                encrypted_share: String::new(),
            });
            raws.push(raw);
        }
        let check = SecretCheck::compute(&id, secret);
        let config =
            RecoveryConfiguration::from_descriptors(k as usize, descriptors, id, Some(check))
                .unwrap();
        (config, raws)
    }

    /// A configuration whose only share is the given raw bytes.
    fn single_raw_config(identity: &str, raw: &[u8]) -> RecoveryConfiguration {
        RecoveryConfiguration::from_descriptors(
            1,
            vec![SharePublicDescriptor {
                fingerprint: Fingerprint::of(raw),
                key_identity: identity.to_string(),
                encrypted_share: String::new(),
            }],
            Uuid::new_v4(),
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_collect_then_combine() {
        let secret = [0x2A; 32];
        let (config, raws) = ceremony(&secret, 2, &["alice", "bob", "carol"]);
        let session = RecoverySession::new(config);

        assert_eq!(
            session.status(),
            SessionStatus::Collecting {
                known: 0,
                required: 2
            }
        );
        assert_eq!(session.add_share(&raws[2]).unwrap(), 1);
        assert!(matches!(
            session.combine(),
            Err(RecoveryError::InsufficientShares { have: 1, need: 2 })
        ));
        assert_eq!(session.add_share(&raws[0]).unwrap(), 2);
        assert_eq!(
            session.status(),
            SessionStatus::Ready {
                known: 2,
                required: 2
            }
        );

        let recovered = session.combine().unwrap();
        assert_eq!(recovered.as_slice(), &secret);
        assert_eq!(session.status(), SessionStatus::Combined { known: 2 });
    }

    #[test]
    fn test_duplicate_leaves_count_unchanged() {
        let (config, raws) = ceremony(b"dup", 2, &["alice", "bob"]);
        let session = RecoverySession::new(config);
        session.add_share(&raws[0]).unwrap();
        assert!(matches!(
            session.add_share(&raws[0]),
            Err(RecoveryError::DuplicateShare { .. })
        ));
        assert_eq!(session.known_count(), 1);
    }

    #[test]
    fn test_unknown_share_rejected() {
        let (config, _) = ceremony(b"one", 2, &["alice", "bob"]);
        let (_, other_raws) = ceremony(b"two", 2, &["alice", "bob"]);
        let session = RecoverySession::new(config);

        // Well-formed, but from a different ceremony.
        assert!(matches!(
            session.add_share(&other_raws[0]),
            Err(RecoveryError::UnknownShare { .. })
        ));
        assert_eq!(session.known_count(), 0);
    }

    #[test]
    fn test_reformatted_share_is_unknown() {
        let (config, raws) = ceremony(b"fmt", 1, &["alice"]);
        let session = RecoverySession::new(config);
        let value: serde_json::Value = serde_json::from_slice(&raws[0]).unwrap();
        let pretty = serde_json::to_vec_pretty(&value).unwrap();
        assert!(matches!(
            session.add_share(&pretty),
            Err(RecoveryError::UnknownShare { .. })
        ));
    }

    #[test]
    fn test_unparseable_known_share_is_malformed() {
        let raw = b"definitely not json";
        let session = RecoverySession::new(single_raw_config("alice", raw));
        assert!(matches!(
            session.add_share(raw),
            Err(RecoveryError::MalformedShare(_))
        ));
        assert_eq!(session.known_count(), 0);
    }

    #[test]
    fn test_future_version_is_malformed() {
        let raw = br#"{"version":2,"keyIdentity":"alice","secretShare":"AQID"}"#;
        let session = RecoverySession::new(single_raw_config("alice", raw));
        let err = session.add_share(raw).unwrap_err();
        assert!(err.to_string().contains("unsupported version 2"));
    }

    #[test]
    fn test_identity_mismatch_is_malformed() {
        let raw = SharePrivateDoc::new("mallory", vec![1, 2, 3])
            .canonical_bytes()
            .unwrap()
            .to_vec();
        let session = RecoverySession::new(single_raw_config("alice", &raw));
        let err = session.add_share(&raw).unwrap_err();
        assert!(matches!(err, RecoveryError::MalformedShare(ref m) if m.contains("mallory")));
    }

    #[test]
    fn test_zero_index_share_is_malformed() {
        let raw = SharePrivateDoc::new("alice", vec![0, 2, 3])
            .canonical_bytes()
            .unwrap()
            .to_vec();
        let session = RecoverySession::new(single_raw_config("alice", &raw));
        assert!(matches!(
            session.add_share(&raw),
            Err(RecoveryError::MalformedShare(_))
        ));
    }

    #[test]
    fn test_combine_is_idempotent_and_closes_session() {
        let (config, raws) = ceremony(b"idempotent secret", 2, &["a", "b", "c"]);
        let session = RecoverySession::new(config);
        session.add_share(&raws[0]).unwrap();
        session.add_share(&raws[1]).unwrap();

        let first = session.combine().unwrap();
        let second = session.combine().unwrap();
        assert_eq!(first, second);

        assert!(matches!(
            session.add_share(&raws[2]),
            Err(RecoveryError::SessionCombined)
        ));
    }

    #[test]
    fn test_more_than_threshold_uses_all_shares() {
        let (config, raws) = ceremony(b"over threshold", 2, &["a", "b", "c", "d"]);
        let session = RecoverySession::new(config);
        for raw in &raws {
            session.add_share(raw).unwrap();
        }
        assert_eq!(session.combine().unwrap().as_slice(), b"over threshold");
    }

    #[test]
    fn test_secret_check_mismatch_is_not_cached() {
        // Shares of one secret published under another secret's check.
        let shares = split_secret(b"real", &ShamirConfig::new(1, 1).unwrap()).unwrap();
        let raw = SharePrivateDoc::new("alice", shares[0].to_bytes())
            .canonical_bytes()
            .unwrap()
            .to_vec();
        let id = Uuid::new_v4();
        let config = RecoveryConfiguration::from_descriptors(
            1,
            vec![SharePublicDescriptor {
                fingerprint: Fingerprint::of(&raw),
                key_identity: "alice".into(),
                encrypted_share: String::new(),
            }],
            id,
            Some(SecretCheck::compute(&id, b"fake")),
        )
        .unwrap();

        let session = RecoverySession::new(config);
        session.add_share(&raw).unwrap();
        assert!(matches!(
            session.combine(),
            Err(RecoveryError::SecretCheckMismatch)
        ));
        assert!(matches!(session.status(), SessionStatus::Ready { .. }));
    }

    #[test]
    fn test_stale_share_does_not_block_recovery() {
        // Slots a and b hold shares of the published secret. Slot c was
        // registered from an older split that was never rotated out.
        let current = split_secret(b"real secret", &ShamirConfig::new(2, 3).unwrap()).unwrap();
        let stale = split_secret(b"old secret!", &ShamirConfig::new(2, 3).unwrap()).unwrap();
        let raws: Vec<Vec<u8>> = [("a", &current[0]), ("b", &current[1]), ("c", &stale[2])]
            .iter()
            .map(|(name, share)| {
                SharePrivateDoc::new(*name, share.to_bytes())
                    .canonical_bytes()
                    .unwrap()
                    .to_vec()
            })
            .collect();
        let id = Uuid::new_v4();
        let descriptors = ["a", "b", "c"]
            .iter()
            .zip(&raws)
            .map(|(name, raw)| SharePublicDescriptor {
                fingerprint: Fingerprint::of(raw),
                key_identity: name.to_string(),
                encrypted_share: String::new(),
            })
            .collect();
        let config = RecoveryConfiguration::from_descriptors(
            2,
            descriptors,
            id,
            Some(SecretCheck::compute(&id, b"real secret")),
        )
        .unwrap();

        let session = RecoverySession::new(config);
        session.add_share(&raws[2]).unwrap();
        session.add_share(&raws[0]).unwrap();
        assert!(matches!(
            session.combine(),
            Err(RecoveryError::SecretCheckMismatch)
        ));

        session.add_share(&raws[1]).unwrap();
        assert_eq!(session.combine().unwrap().as_slice(), b"real secret");
        assert_eq!(session.status(), SessionStatus::Combined { known: 3 });
    }

    #[test]
    fn test_subset_search_needs_a_secret_check() {
        let current = split_secret(b"unchecked", &ShamirConfig::new(2, 3).unwrap()).unwrap();
        let stale = split_secret(b"stale one", &ShamirConfig::new(2, 3).unwrap()).unwrap();
        let raws: Vec<Vec<u8>> = [("a", &current[0]), ("b", &current[1]), ("c", &stale[2])]
            .iter()
            .map(|(name, share)| {
                SharePrivateDoc::new(*name, share.to_bytes())
                    .canonical_bytes()
                    .unwrap()
                    .to_vec()
            })
            .collect();
        let descriptors = ["a", "b", "c"]
            .iter()
            .zip(&raws)
            .map(|(name, raw)| SharePublicDescriptor {
                fingerprint: Fingerprint::of(raw),
                key_identity: name.to_string(),
                encrypted_share: String::new(),
            })
            .collect();
        let config =
            RecoveryConfiguration::from_descriptors(2, descriptors, Uuid::new_v4(), None).unwrap();

        let session = RecoverySession::new(config);
        for raw in &raws {
            session.add_share(raw).unwrap();
        }
        // Nothing to check against, so the full-set result stands.
        assert_ne!(session.combine().unwrap().as_slice(), b"unchecked");
    }

    #[test]
    fn test_next_combination_order() {
        let mut picks = vec![0, 1];
        let mut seen = vec![picks.clone()];
        while next_combination(&mut picks, 4) {
            seen.push(picks.clone());
        }
        assert_eq!(
            seen,
            vec![
                vec![0, 1],
                vec![0, 2],
                vec![0, 3],
                vec![1, 2],
                vec![1, 3],
                vec![2, 3]
            ]
        );
    }

    #[test]
    fn test_known_identities() {
        let (config, raws) = ceremony(b"who", 2, &["alice", "bob", "carol"]);
        let session = RecoverySession::with_span(config, Span::none());
        session.add_share(&raws[1]).unwrap();
        session.add_share(&raws[2]).unwrap();
        let mut ids = session.known_identities();
        ids.sort();
        assert_eq!(ids, vec!["bob", "carol"]);
    }
}
