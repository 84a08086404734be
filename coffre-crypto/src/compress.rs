// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic text compression for history blobs.
//!
//! Raw DEFLATE at a pinned level: the same input always produces the same
//! bytes, and the round-trip is byte-preserving. The algorithm is an
//! implementation detail of this layer; callers only rely on the contract.

use std::io::{Read, Write};

use async_trait::async_trait;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use thiserror::Error;

/// Pinned compression level; changing it would break determinism across
/// builds.
const LEVEL: u32 = 6;

#[derive(Debug, Error)]
pub enum CompressError {
    #[error("failed to compress text: {0}")]
    Compress(#[source] std::io::Error),

    #[error("failed to decompress: input is not a valid deflate stream: {0}")]
    Decompress(#[source] std::io::Error),

    #[error("decompressed payload is not valid utf-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

pub fn compress_text(text: &str) -> Result<Vec<u8>, CompressError> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::new(LEVEL));
    encoder
        .write_all(text.as_bytes())
        .map_err(CompressError::Compress)?;
    encoder.finish().map_err(CompressError::Compress)
}

pub fn decompress_text(bytes: &[u8]) -> Result<String, CompressError> {
    let mut decoder = DeflateDecoder::new(bytes);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(CompressError::Decompress)?;
    Ok(String::from_utf8(out)?)
}

/// Object-safe compressor capability.
#[async_trait]
pub trait Compressor: Send + Sync {
    async fn compress_text(&self, text: &str) -> Result<Vec<u8>, CompressError>;
    async fn decompress_text(&self, bytes: &[u8]) -> Result<String, CompressError>;
}

/// In-process compressor over the module functions.
#[derive(Debug, Default)]
pub struct DeflateCompressor;

#[async_trait]
impl Compressor for DeflateCompressor {
    async fn compress_text(&self, text: &str) -> Result<Vec<u8>, CompressError> {
        compress_text(text)
    }

    async fn decompress_text(&self, bytes: &[u8]) -> Result<String, CompressError> {
        decompress_text(bytes)
    }
}
