// SPDX-License-Identifier: MIT OR Apache-2.0

//! Envelope codec, password-based encryption and compression.
//!
//! A serialized vault is `SIG || CIPHERTEXT`: an 8-byte ASCII magic
//! followed by an authenticated ciphertext whose decryption and
//! decompression yield the textual command log. This crate owns all three
//! layers plus the process-wide capability registry through which an
//! embedder can replace the cryptor or compressor implementation.

pub mod codec;
pub mod compress;
pub mod cryptor;
pub mod env;
mod rng;

pub use codec::{
    detect, has_valid_signature, is_encrypted, require_format, sign, strip_signature, CodecError,
    FormatKind, SIGNATURE,
};
pub use compress::{compress_text, decompress_text, CompressError, Compressor, DeflateCompressor};
pub use cryptor::{
    derivation_rounds, set_derivation_rounds, CryptoError, Cryptor, StandardCryptor,
    DEFAULT_DERIVATION_ROUNDS,
};
pub use env::{app_env, AppEnv};
pub use rng::{Rng, RngError};
