// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process-wide registry of unlocked credentials.
//!
//! An entry is created when a vault is being unlocked and dropped when it
//! is locked; the payload is zeroized when the last copy goes away. Keys
//! are caller-chosen credentials ids, one per vault source.

use std::collections::HashMap;
use std::fmt;
use std::sync::{LazyLock, Mutex, PoisonError};

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Secrets held while a vault is unlocked.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    pub password: String,
}

impl Credentials {
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("password", &"[REDACTED]")
            .finish()
    }
}

static REGISTRY: LazyLock<Mutex<HashMap<String, Credentials>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Namespace for the registry operations.
pub struct CredentialStore;

impl CredentialStore {
    /// Register credentials under `id`, replacing any previous entry.
    pub fn put(id: &str, credentials: Credentials) {
        REGISTRY
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string(), credentials);
    }

    pub fn get(id: &str) -> Option<Credentials> {
        REGISTRY
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Drop the entry for `id`. Returns whether one existed.
    pub fn remove(id: &str) -> bool {
        REGISTRY
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle() {
        CredentialStore::put("vault-1", Credentials::new("hunter2"));
        assert_eq!(
            CredentialStore::get("vault-1").map(|c| c.password.clone()),
            Some("hunter2".to_string())
        );

        assert!(CredentialStore::remove("vault-1"));
        assert!(CredentialStore::get("vault-1").is_none());
        assert!(!CredentialStore::remove("vault-1"));
    }

    #[test]
    fn put_replaces() {
        CredentialStore::put("vault-2", Credentials::new("old"));
        CredentialStore::put("vault-2", Credentials::new("new"));
        assert_eq!(
            CredentialStore::get("vault-2").map(|c| c.password.clone()),
            Some("new".to_string())
        );
        CredentialStore::remove("vault-2");
    }

    #[test]
    fn debug_redacts() {
        let credentials = Credentials::new("topsecret");
        assert!(!format!("{credentials:?}").contains("topsecret"));
    }
}
