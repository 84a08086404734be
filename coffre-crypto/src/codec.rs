// SPDX-License-Identifier: MIT OR Apache-2.0

//! The signed envelope around a serialized vault.
//!
//! A vault file is `SIG || BODY`: a fixed 8-byte ASCII magic identifying
//! the format version, then the ciphertext. Signing and stripping are an
//! involution on well-formed inputs.

use thiserror::Error;

/// ASCII magic of the textual command-log format.
pub const SIGNATURE: &[u8; 8] = b"coffre-a";

/// Known envelope formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatKind {
    /// The command-log format this crate implements.
    A,
    Unknown,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("input does not carry a vault signature")]
    MissingSignature,

    #[error("input carries an unknown format signature")]
    UnknownFormat,
}

/// Inspect the leading magic.
pub fn detect(bytes: &[u8]) -> FormatKind {
    if bytes.starts_with(SIGNATURE) {
        FormatKind::A
    } else {
        FormatKind::Unknown
    }
}

/// Like [`detect`], but unknown input is an error. The load path uses this
/// as the router point for future formats.
pub fn require_format(bytes: &[u8]) -> Result<FormatKind, CodecError> {
    match detect(bytes) {
        FormatKind::Unknown => Err(CodecError::UnknownFormat),
        kind => Ok(kind),
    }
}

/// True iff the input starts with a recognised signature.
pub fn is_encrypted(bytes: &[u8]) -> bool {
    detect(bytes) != FormatKind::Unknown
}

pub fn has_valid_signature(bytes: &[u8]) -> bool {
    is_encrypted(bytes)
}

/// Prepend the signature.
pub fn sign(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(SIGNATURE.len() + body.len());
    out.extend_from_slice(SIGNATURE);
    out.extend_from_slice(body);
    out
}

/// Verify and remove the signature.
pub fn strip_signature(bytes: &[u8]) -> Result<&[u8], CodecError> {
    bytes
        .strip_prefix(SIGNATURE.as_slice())
        .ok_or(CodecError::MissingSignature)
}
