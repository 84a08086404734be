// SPDX-License-Identifier: MIT OR Apache-2.0

//! Random material for salts, nonces and generated keys.

use std::sync::{Mutex, PoisonError};

use rand_chacha::rand_core::{SeedableRng, TryRngCore};
use rand_chacha::ChaCha20Rng;
use thiserror::Error;

/// Alphabet for generated random strings (attachment keys and friends).
pub(crate) const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// ChaCha20-backed CSPRNG, OS-seeded.
///
/// One instance serves a whole cryptor: the generator sits behind a mutex
/// so salts, nonces and key strings can be drawn through a shared
/// reference. A poisoned lock is recovered rather than surfaced, the same
/// policy the engine applies to its other process-wide state.
#[derive(Debug)]
pub struct Rng {
    inner: Mutex<ChaCha20Rng>,
}

/// The random source failed to produce bytes.
#[derive(Debug, Error)]
#[error("random source failed to produce bytes")]
pub struct RngError;

impl Rng {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ChaCha20Rng::from_os_rng()),
        }
    }

    /// Deterministic generator for reproducible tests.
    #[cfg(any(test, feature = "test_utils"))]
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            inner: Mutex::new(ChaCha20Rng::from_seed(seed)),
        }
    }

    /// Every public method funnels through here, taking the lock exactly
    /// once per draw.
    fn fill(&self, buf: &mut [u8]) -> Result<(), RngError> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_fill_bytes(buf)
            .map_err(|_| RngError)
    }

    pub fn random_array<const N: usize>(&self) -> Result<[u8; N], RngError> {
        let mut out = [0u8; N];
        self.fill(&mut out)?;
        Ok(out)
    }

    pub fn random_vec(&self, len: usize) -> Result<Vec<u8>, RngError> {
        let mut out = vec![0u8; len];
        self.fill(&mut out)?;
        Ok(out)
    }

    /// Random string over `A–Z a–z 0–9`.
    ///
    /// Bytes are rejection-sampled so every character of the alphabet is
    /// equally likely.
    pub fn random_string(&self, len: usize) -> Result<String, RngError> {
        // Largest multiple of the alphabet size below 256.
        let limit = (u8::MAX as usize / ALPHABET.len() * ALPHABET.len()) as u8;
        let mut out = String::with_capacity(len);
        while out.len() < len {
            for byte in self.random_array::<32>()? {
                if byte < limit {
                    out.push(ALPHABET[(byte as usize) % ALPHABET.len()] as char);
                    if out.len() == len {
                        break;
                    }
                }
            }
        }
        Ok(out)
    }
}

impl Default for Rng {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{Rng, ALPHABET};

    #[test]
    fn equal_seeds_agree_step_for_step() {
        let left = Rng::from_seed([9; 32]);
        let right = Rng::from_seed([9; 32]);

        assert_eq!(
            left.random_array::<24>().unwrap(),
            right.random_array::<24>().unwrap()
        );
        assert_eq!(left.random_vec(100).unwrap(), right.random_vec(100).unwrap());
        assert_eq!(left.random_string(48).unwrap(), right.random_string(48).unwrap());
    }

    #[test]
    fn different_seeds_diverge() {
        let left = Rng::from_seed([1; 32]);
        let right = Rng::from_seed([2; 32]);
        assert_ne!(left.random_vec(64).unwrap(), right.random_vec(64).unwrap());
    }

    #[test]
    fn random_string_stays_in_alphabet() {
        let rng = Rng::from_seed([2; 32]);
        let value = rng.random_string(48).unwrap();
        assert_eq!(value.len(), 48);
        assert!(value.bytes().all(|b| ALPHABET.contains(&b)));
    }

    #[test]
    fn random_string_zero_length() {
        let rng = Rng::from_seed([3; 32]);
        assert_eq!(rng.random_string(0).unwrap(), "");
    }
}
