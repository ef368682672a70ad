//! ASCII armor for keys and sealed messages.
//!
//! Custodians receive their encrypted share by email, chat, or printed
//! paper, so everything that crosses that boundary is plain text:
//!
//! ```text
//! -----BEGIN KEYMASTER SEALED MESSAGE-----
//! AZ3m...base64, 64 columns...
//! -----END KEYMASTER SEALED MESSAGE-----
//! ```
//!
//! Whitespace and line breaks inside the body are ignored on the way in, so
//! re-wrapped or indented pastes still decode.

use base64::{engine::general_purpose::STANDARD, Engine};
use thiserror::Error;

use crate::config::ARMOR_LINE_WIDTH;

/// Errors from [`dearmor`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArmorError {
    #[error("missing armor header for {0}")]
    MissingHeader(&'static str),

    #[error("missing armor footer for {0}")]
    MissingFooter(&'static str),

    #[error("armor body is not valid base64")]
    InvalidBase64,
}

/// Wrap `bytes` in an armor block labelled `label`.
pub fn armor(label: &str, bytes: &[u8]) -> String {
    let encoded = STANDARD.encode(bytes);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / ARMOR_LINE_WIDTH + 96);
    out.push_str("-----BEGIN ");
    out.push_str(label);
    out.push_str("-----\n");
    // base64 output is pure ASCII, so byte chunks are valid str slices.
    for line in encoded.as_bytes().chunks(ARMOR_LINE_WIDTH) {
        out.push_str(std::str::from_utf8(line).unwrap_or_default());
        out.push('\n');
    }
    out.push_str("-----END ");
    out.push_str(label);
    out.push_str("-----\n");
    out
}

/// Extract the payload of the first armor block labelled `label`.
///
/// Text before the header and after the footer is ignored, so a block can
/// be pasted out of a longer email.
pub fn dearmor(label: &'static str, text: &str) -> Result<Vec<u8>, ArmorError> {
    let header = format!("-----BEGIN {label}-----");
    let footer = format!("-----END {label}-----");

    let start = text
        .find(&header)
        .map(|i| i + header.len())
        .ok_or(ArmorError::MissingHeader(label))?;
    let len = text[start..]
        .find(&footer)
        .ok_or(ArmorError::MissingFooter(label))?;

    let body: String = text[start..start + len]
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    STANDARD
        .decode(body.as_bytes())
        .map_err(|_| ArmorError::InvalidBase64)
}
