//! # Shamir's Secret Sharing over GF(256)
//!
//! The threshold primitive behind key-recovery ceremonies. A secret is split
//! byte-by-byte: each byte becomes the constant term of a fresh random
//! polynomial of degree `threshold - 1`, evaluated at x = 1..=n. Any
//! `threshold` evaluations pin the polynomial down; `threshold - 1` of them
//! are consistent with every possible constant term, so they carry zero
//! information about the secret.
//!
//! ## Finite Field Arithmetic
//!
//! GF(2^8) with the AES polynomial `x^8 + x^4 + x^3 + x + 1` (0x11B).
//! Multiplication goes through log/exp tables with generator 3.
//!
//! ## Share encoding
//!
//! A share serializes as `x || y_0 || y_1 || ... || y_{len-1}`: one byte of
//! x-coordinate followed by one byte per secret byte. The x-coordinate
//! travels with the share, so recovery never depends on which custodian
//! submitted what, or in which order.
//!
//! ## Usage
//!
//! ```
//! use keymaster_recovery::crypto::shamir::{recover_secret, split_secret, ShamirConfig};
//!
//! let secret = [0x2Au8; 32];
//! let config = ShamirConfig::new(2, 3).unwrap();
//! let shares = split_secret(&secret, &config).unwrap();
//!
//! let recovered = recover_secret(&shares[1..]).unwrap();
//! assert_eq!(secret.as_slice(), recovered.as_slice());
//! ```

use rand::RngCore;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::config::SHARE_INDEX_LENGTH;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during secret sharing operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShamirError {
    /// The threshold must be at least 1.
    #[error("threshold must be >= 1, got {0}")]
    ThresholdTooLow(u8),

    /// The number of shares must be at least equal to the threshold.
    #[error("total shares ({total}) must be >= threshold ({threshold})")]
    TotalBelowThreshold {
        /// The configured threshold.
        threshold: u8,
        /// The configured total.
        total: u8,
    },

    /// The secret is empty.
    #[error("secret must not be empty")]
    EmptySecret,

    /// No shares were provided for reconstruction.
    #[error("no shares provided for reconstruction")]
    NoShares,

    /// A serialized share is too short to hold an index and data.
    #[error("share encoding too short: {0} bytes")]
    TruncatedShare(usize),

    /// Shares have inconsistent data lengths.
    #[error("share data lengths are inconsistent: expected {expected}, got {got}")]
    InconsistentShareLengths {
        /// Expected length from the first share.
        expected: usize,
        /// Actual length of the offending share.
        got: usize,
    },

    /// The x-coordinate zero is reserved for the secret itself.
    #[error("share index 0 is reserved")]
    ZeroShareIndex,

    /// Two shares were evaluated at the same point.
    #[error("duplicate share index: {0}")]
    DuplicateShareIndex(u8),
}

// ---------------------------------------------------------------------------
// GF(256) Arithmetic
// ---------------------------------------------------------------------------

mod gf256 {
    /// Irreducible polynomial: x^8 + x^4 + x^3 + x + 1.
    const MODULUS: u16 = 0x11B;

    /// EXP[i] = 3^i. Doubled in length so `LOG[a] + LOG[b]` never needs
    /// reducing mod 255.
    const fn build_exp_table() -> [u8; 510] {
        let mut table = [0u8; 510];
        let mut val: u16 = 1;
        let mut i = 0;
        while i < 255 {
            table[i] = val as u8;
            table[i + 255] = val as u8;
            val = (val << 1) ^ val;
            if val >= 256 {
                val ^= MODULUS;
            }
            i += 1;
        }
        table
    }

    const fn build_log_table() -> [u8; 256] {
        let exp = build_exp_table();
        let mut table = [0u8; 256];
        let mut i = 0;
        while i < 255 {
            table[exp[i] as usize] = i as u8;
            i += 1;
        }
        table
    }

    static EXP: [u8; 510] = build_exp_table();
    static LOG: [u8; 256] = build_log_table();

    /// Addition and subtraction are both XOR in characteristic 2.
    #[inline]
    pub fn add(a: u8, b: u8) -> u8 {
        a ^ b
    }

    #[inline]
    pub fn mul(a: u8, b: u8) -> u8 {
        if a == 0 || b == 0 {
            return 0;
        }
        EXP[LOG[a as usize] as usize + LOG[b as usize] as usize]
    }

    /// Multiplicative inverse. Callers guarantee `a != 0`.
    #[inline]
    pub fn inv(a: u8) -> u8 {
        debug_assert!(a != 0, "inverse of zero in GF(256)");
        EXP[255 - LOG[a as usize] as usize]
    }

    /// Horner evaluation; `coefficients[0]` is the constant term.
    pub fn eval_polynomial(coefficients: &[u8], x: u8) -> u8 {
        coefficients
            .iter()
            .rev()
            .fold(0u8, |acc, &coeff| add(mul(acc, x), coeff))
    }

    /// Lagrange basis values `L_i(0)` for distinct, non-zero x-coordinates.
    ///
    /// The x-coordinates are shared by every byte position of a secret, so
    /// the basis is computed once and reused: recovery becomes one
    /// multiply-accumulate per share per byte.
    pub fn lagrange_basis_at_zero(xs: &[u8]) -> Vec<u8> {
        xs.iter()
            .enumerate()
            .map(|(i, &xi)| {
                let mut numerator = 1u8;
                let mut denominator = 1u8;
                for (j, &xj) in xs.iter().enumerate() {
                    if i == j {
                        continue;
                    }
                    // (0 - x_j) == x_j in GF(2^8)
                    numerator = mul(numerator, xj);
                    denominator = mul(denominator, add(xi, xj));
                }
                mul(numerator, inv(denominator))
            })
            .collect()
    }

}

// ---------------------------------------------------------------------------
// Public Types
// ---------------------------------------------------------------------------

/// Threshold parameters for a split: any `threshold` of `total_shares`
/// reconstruct the secret, `threshold - 1` reveal nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShamirConfig {
    /// Minimum number of shares required to reconstruct the secret.
    pub threshold: u8,
    /// Total number of shares to generate.
    pub total_shares: u8,
}

impl ShamirConfig {
    /// Create a new configuration, validating the parameters.
    ///
    /// A threshold of 1 is legal: every share is then a copy of the secret
    /// behind its own custodian's encryption, which is what a 1-of-N
    /// "any single custodian can recover" policy means.
    pub fn new(threshold: u8, total_shares: u8) -> Result<Self, ShamirError> {
        if threshold < 1 {
            return Err(ShamirError::ThresholdTooLow(threshold));
        }
        if total_shares < threshold {
            return Err(ShamirError::TotalBelowThreshold {
                threshold,
                total: total_shares,
            });
        }
        Ok(Self {
            threshold,
            total_shares,
        })
    }
}

/// A single share of a split secret. Wiped from memory on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Share {
    /// The x-coordinate of this share's evaluation point (1-based).
    pub index: u8,
    /// One y-value per byte of the original secret.
    pub data: Vec<u8>,
}

impl Share {
    /// Serialize as `index || data`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SHARE_INDEX_LENGTH + self.data.len());
        out.push(self.index);
        out.extend_from_slice(&self.data);
        out
    }

    /// Parse the `index || data` encoding produced by [`Share::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ShamirError> {
        if bytes.len() <= SHARE_INDEX_LENGTH {
            return Err(ShamirError::TruncatedShare(bytes.len()));
        }
        let (index, data) = bytes.split_at(SHARE_INDEX_LENGTH);
        if index[0] == 0 {
            return Err(ShamirError::ZeroShareIndex);
        }
        Ok(Self {
            index: index[0],
            data: data.to_vec(),
        })
    }
}

impl std::fmt::Debug for Share {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Share")
            .field("index", &self.index)
            .field("len", &self.data.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Split and Recover
// ---------------------------------------------------------------------------

/// Split a secret into `config.total_shares` shares.
pub fn split_secret(secret: &[u8], config: &ShamirConfig) -> Result<Vec<Share>, ShamirError> {
    if secret.is_empty() {
        return Err(ShamirError::EmptySecret);
    }
    // Re-validate: the fields are public and may have been built by hand.
    ShamirConfig::new(config.threshold, config.total_shares)?;

    let threshold = config.threshold as usize;
    let mut shares: Vec<Share> = (1..=config.total_shares)
        .map(|index| Share {
            index,
            data: Vec::with_capacity(secret.len()),
        })
        .collect();

    let mut rng = rand::rngs::OsRng;
    let mut coefficients = Zeroizing::new(vec![0u8; threshold]);

    for &secret_byte in secret {
        // [secret_byte, c_1, ..., c_{t-1}], higher terms uniform over the field.
        coefficients[0] = secret_byte;
        rng.fill_bytes(&mut coefficients[1..]);

        for share in shares.iter_mut() {
            share
                .data
                .push(gf256::eval_polynomial(&coefficients, share.index));
        }
    }

    Ok(shares)
}

/// Recover a secret from shares produced by [`split_secret`].
///
/// The result does not depend on the order of `shares`, nor on which
/// subset of a ceremony's shares is supplied, as long as there are at least
/// `threshold` of them.
///
/// **Note**: below the threshold this returns *some* value without error.
/// Shares alone cannot tell you what the threshold was; callers enforce it.
pub fn recover_secret(shares: &[Share]) -> Result<Zeroizing<Vec<u8>>, ShamirError> {
    let first = shares.first().ok_or(ShamirError::NoShares)?;
    let expected_len = first.data.len();

    let mut seen = [false; 256];
    for share in shares {
        if share.data.len() != expected_len {
            return Err(ShamirError::InconsistentShareLengths {
                expected: expected_len,
                got: share.data.len(),
            });
        }
        if share.index == 0 {
            return Err(ShamirError::ZeroShareIndex);
        }
        if seen[share.index as usize] {
            return Err(ShamirError::DuplicateShareIndex(share.index));
        }
        seen[share.index as usize] = true;
    }

    let xs: Vec<u8> = shares.iter().map(|s| s.index).collect();
    let basis = gf256::lagrange_basis_at_zero(&xs);

    let secret = (0..expected_len)
        .map(|byte_idx| {
            shares
                .iter()
                .zip(&basis)
                .fold(0u8, |acc, (share, &l)| {
                    gf256::add(acc, gf256::mul(share.data[byte_idx], l))
                })
        })
        .collect();

    Ok(Zeroizing::new(secret))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
