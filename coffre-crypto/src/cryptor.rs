// SPDX-License-Identifier: MIT OR Apache-2.0

//! Password-based authenticated encryption.
//!
//! A 256-bit key is derived from the password with PBKDF2-HMAC-SHA256 and
//! the payload is sealed with XChaCha20-Poly1305. The ciphertext carries
//! everything needed to decrypt it again: algorithm tag, iteration count,
//! salt and nonce, all bound as associated data so a tampered header fails
//! authentication just like a tampered body.

use std::string::FromUtf8Error;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chacha20poly1305::{AeadInPlace, Key, KeyInit, XChaCha20Poly1305, XNonce};
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::rng::{Rng, RngError};

/// Default PBKDF2 iteration count.
pub const DEFAULT_DERIVATION_ROUNDS: u32 = 250_000;

const ALG_XCHACHA20_POLY1305: u8 = 1;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 24;
const TAG_LEN: usize = 16;
const HEADER_LEN: usize = 1 + 4 + SALT_LEN + NONCE_LEN;

/// Process-wide override of the iteration count; zero means "use the
/// default".
static DERIVATION_ROUNDS_OVERRIDE: AtomicU32 = AtomicU32::new(0);

/// Override the PBKDF2 iteration count process-wide. Passing `0` restores
/// the default.
pub fn set_derivation_rounds(rounds: u32) {
    DERIVATION_ROUNDS_OVERRIDE.store(rounds, Ordering::SeqCst);
}

/// The iteration count new ciphertexts are produced with.
pub fn derivation_rounds() -> u32 {
    match DERIVATION_ROUNDS_OVERRIDE.load(Ordering::SeqCst) {
        0 => DEFAULT_DERIVATION_ROUNDS,
        rounds => rounds,
    }
}

#[derive(Debug, Error)]
pub enum CryptoError {
    /// Authentication failed: the ciphertext was tampered with, or the
    /// password is wrong. The two are deliberately indistinguishable.
    #[error("ciphertext authentication failed")]
    AuthFailed,

    #[error("ciphertext is truncated")]
    Truncated,

    #[error("unsupported cipher algorithm tag {0}")]
    UnsupportedAlgorithm(u8),

    #[error("decrypted payload is not valid utf-8")]
    InvalidUtf8(#[from] FromUtf8Error),

    #[error(transparent)]
    Rng(#[from] RngError),
}

/// Seal `plaintext` under a key derived from `password`.
pub fn encrypt_buffer(plaintext: &[u8], password: &str, rng: &Rng) -> Result<Vec<u8>, CryptoError> {
    let salt: [u8; SALT_LEN] = rng.random_array()?;
    let nonce: [u8; NONCE_LEN] = rng.random_array()?;
    let rounds = derivation_rounds();

    let mut header = Vec::with_capacity(HEADER_LEN);
    header.push(ALG_XCHACHA20_POLY1305);
    header.extend_from_slice(&rounds.to_be_bytes());
    header.extend_from_slice(&salt);
    header.extend_from_slice(&nonce);

    let key = derive_key(password, &salt, rounds);
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_ref()));

    let mut body = plaintext.to_vec();
    cipher
        .encrypt_in_place(XNonce::from_slice(&nonce), &header, &mut body)
        .map_err(|_| CryptoError::AuthFailed)?;

    let mut out = header;
    out.extend_from_slice(&body);
    Ok(out)
}

/// Open a ciphertext produced by [`encrypt_buffer`].
pub fn decrypt_buffer(ciphertext: &[u8], password: &str) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() < HEADER_LEN + TAG_LEN {
        return Err(CryptoError::Truncated);
    }
    let (header, body) = ciphertext.split_at(HEADER_LEN);

    let alg = header[0];
    if alg != ALG_XCHACHA20_POLY1305 {
        return Err(CryptoError::UnsupportedAlgorithm(alg));
    }
    let rounds = u32::from_be_bytes(
        header[1..5].try_into().map_err(|_| CryptoError::Truncated)?,
    );
    let salt = &header[5..5 + SALT_LEN];
    let nonce = &header[5 + SALT_LEN..HEADER_LEN];

    let key = derive_key(password, salt, rounds);
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_ref()));

    let mut plaintext = body.to_vec();
    cipher
        .decrypt_in_place(XNonce::from_slice(nonce), header, &mut plaintext)
        .map_err(|_| CryptoError::AuthFailed)?;

    Ok(plaintext)
}

pub fn encrypt_text(plaintext: &str, password: &str, rng: &Rng) -> Result<Vec<u8>, CryptoError> {
    encrypt_buffer(plaintext.as_bytes(), password, rng)
}

pub fn decrypt_text(ciphertext: &[u8], password: &str) -> Result<String, CryptoError> {
    let bytes = decrypt_buffer(ciphertext, password)?;
    Ok(String::from_utf8(bytes)?)
}

fn derive_key(password: &str, salt: &[u8], rounds: u32) -> Zeroizing<[u8; 32]> {
    let mut key = Zeroizing::new([0u8; 32]);
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, rounds, key.as_mut());
    key
}

/// Object-safe cryptor capability; the seam through which an embedder may
/// register an out-of-process implementation.
#[async_trait]
pub trait Cryptor: Send + Sync {
    async fn encrypt_text(&self, plaintext: &str, password: &str) -> Result<Vec<u8>, CryptoError>;
    async fn decrypt_text(&self, ciphertext: &[u8], password: &str)
        -> Result<String, CryptoError>;
    async fn encrypt_buffer(
        &self,
        plaintext: &[u8],
        password: &str,
    ) -> Result<Vec<u8>, CryptoError>;
    async fn decrypt_buffer(
        &self,
        ciphertext: &[u8],
        password: &str,
    ) -> Result<Vec<u8>, CryptoError>;
    async fn random_string(&self, length: usize) -> Result<String, CryptoError>;
}

/// In-process cryptor over the module functions.
#[derive(Debug, Default)]
pub struct StandardCryptor {
    rng: Rng,
}

impl StandardCryptor {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(any(test, feature = "test_utils"))]
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            rng: Rng::from_seed(seed),
        }
    }
}

#[async_trait]
impl Cryptor for StandardCryptor {
    async fn encrypt_text(&self, plaintext: &str, password: &str) -> Result<Vec<u8>, CryptoError> {
        encrypt_text(plaintext, password, &self.rng)
    }

    async fn decrypt_text(
        &self,
        ciphertext: &[u8],
        password: &str,
    ) -> Result<String, CryptoError> {
        decrypt_text(ciphertext, password)
    }

    async fn encrypt_buffer(
        &self,
        plaintext: &[u8],
        password: &str,
    ) -> Result<Vec<u8>, CryptoError> {
        encrypt_buffer(plaintext, password, &self.rng)
    }

    async fn decrypt_buffer(
        &self,
        ciphertext: &[u8],
        password: &str,
    ) -> Result<Vec<u8>, CryptoError> {
        decrypt_buffer(ciphertext, password)
    }

    async fn random_string(&self, length: usize) -> Result<String, CryptoError> {
        Ok(self.rng.random_string(length)?)
    }
}
