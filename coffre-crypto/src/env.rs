// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process-wide capability registry.
//!
//! The vault source resolves its cryptor and compressor through this
//! registry instead of constructing them directly, which is the seam for
//! embedders that offload crypto elsewhere. Each slot holds exactly one
//! implementation; registration replaces the previous one.

use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use crate::compress::{Compressor, DeflateCompressor};
use crate::cryptor::{Cryptor, StandardCryptor};

/// The shared application environment.
pub struct AppEnv {
    cryptor: RwLock<Arc<dyn Cryptor>>,
    compressor: RwLock<Arc<dyn Compressor>>,
}

impl AppEnv {
    fn with_defaults() -> Self {
        Self {
            cryptor: RwLock::new(Arc::new(StandardCryptor::new())),
            compressor: RwLock::new(Arc::new(DeflateCompressor)),
        }
    }

    pub fn cryptor(&self) -> Arc<dyn Cryptor> {
        self.cryptor
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_cryptor(&self, cryptor: Arc<dyn Cryptor>) {
        *self.cryptor.write().unwrap_or_else(PoisonError::into_inner) = cryptor;
    }

    pub fn compressor(&self) -> Arc<dyn Compressor> {
        self.compressor
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_compressor(&self, compressor: Arc<dyn Compressor>) {
        *self
            .compressor
            .write()
            .unwrap_or_else(PoisonError::into_inner) = compressor;
    }
}

static APP_ENV: LazyLock<AppEnv> = LazyLock::new(AppEnv::with_defaults);

/// The process-wide environment, with in-process defaults installed.
pub fn app_env() -> &'static AppEnv {
    &APP_ENV
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::cryptor::CryptoError;

    struct UppercaseCryptor;

    #[async_trait]
    impl Cryptor for UppercaseCryptor {
        async fn encrypt_text(
            &self,
            plaintext: &str,
            _password: &str,
        ) -> Result<Vec<u8>, CryptoError> {
            Ok(plaintext.to_uppercase().into_bytes())
        }

        async fn decrypt_text(
            &self,
            ciphertext: &[u8],
            _password: &str,
        ) -> Result<String, CryptoError> {
            Ok(String::from_utf8(ciphertext.to_vec())?)
        }

        async fn encrypt_buffer(
            &self,
            plaintext: &[u8],
            _password: &str,
        ) -> Result<Vec<u8>, CryptoError> {
            Ok(plaintext.to_vec())
        }

        async fn decrypt_buffer(
            &self,
            ciphertext: &[u8],
            _password: &str,
        ) -> Result<Vec<u8>, CryptoError> {
            Ok(ciphertext.to_vec())
        }

        async fn random_string(&self, length: usize) -> Result<String, CryptoError> {
            Ok("x".repeat(length))
        }
    }

    #[tokio::test]
    async fn registration_replaces() {
        // A private env instance; the global one is shared across tests.
        let env = AppEnv::with_defaults();
        env.set_cryptor(Arc::new(UppercaseCryptor));
        let out = env.cryptor().encrypt_text("abc", "pw").await.unwrap();
        assert_eq!(out, b"ABC");
    }

    #[test]
    fn global_env_has_defaults() {
        // Just resolving the slots must work without any registration.
        let _ = app_env().cryptor();
        let _ = app_env().compressor();
    }
}
