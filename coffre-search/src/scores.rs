// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persisted per-domain hit counts.
//!
//! Counts live in a host-provided key/value store, one JSON document per
//! vault under `bcup_search_<vault id>`, shaped `entry id → domain → count`.
//! The document is read on every access; the store is the source of truth
//! so several indices can share it.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};

use tracing::warn;

type ScoreMap = BTreeMap<String, BTreeMap<String, u64>>;

/// Key of the score document for one vault.
pub fn score_store_key(vault_id: &str) -> String {
    format!("bcup_search_{vault_id}")
}

/// Host-provided key/value storage for search scores.
pub trait ScoreStore: Send + Sync {
    fn get_value(&self, key: &str) -> Option<String>;
    fn set_value(&self, key: &str, value: &str);

    /// Current hit count for `(vault, entry, domain)`.
    fn domain_hits(&self, vault_id: &str, entry_id: &str, domain: &str) -> u64 {
        self.load(vault_id)
            .get(entry_id)
            .and_then(|domains| domains.get(domain))
            .copied()
            .unwrap_or(0)
    }

    /// Add one hit. Saturates instead of wrapping.
    fn increment(&self, vault_id: &str, entry_id: &str, domain: &str) {
        let mut scores = self.load(vault_id);
        let count = scores
            .entry(entry_id.to_string())
            .or_default()
            .entry(domain.to_string())
            .or_insert(0);
        *count = count.saturating_add(1);
        match serde_json::to_string(&scores) {
            Ok(json) => self.set_value(&score_store_key(vault_id), &json),
            Err(err) => warn!(%err, "failed to serialize search scores"),
        }
    }

    #[doc(hidden)]
    fn load(&self, vault_id: &str) -> ScoreMap {
        let Some(raw) = self.get_value(&score_store_key(vault_id)) else {
            return ScoreMap::new();
        };
        match serde_json::from_str(&raw) {
            Ok(scores) => scores,
            Err(err) => {
                warn!(%err, "discarding malformed search score document");
                ScoreMap::new()
            }
        }
    }
}

/// Plain in-memory score store for tests and single-process hosts.
#[derive(Debug, Default)]
pub struct MemoryScoreStore {
    values: Mutex<HashMap<String, String>>,
}

impl ScoreStore for MemoryScoreStore {
    fn get_value(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set_value(&self, key: &str, value: &str) {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increments_persist_as_json() {
        let store = MemoryScoreStore::default();
        store.increment("v1", "e1", "example.com");
        store.increment("v1", "e1", "example.com");
        store.increment("v1", "e2", "other.org");

        assert_eq!(store.domain_hits("v1", "e1", "example.com"), 2);
        assert_eq!(store.domain_hits("v1", "e2", "other.org"), 1);
        assert_eq!(store.domain_hits("v1", "e1", "other.org"), 0);
        assert_eq!(store.domain_hits("v2", "e1", "example.com"), 0);

        let raw = store.get_value(&score_store_key("v1")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["e1"]["example.com"], 2);
    }

    #[test]
    fn malformed_documents_reset() {
        let store = MemoryScoreStore::default();
        store.set_value(&score_store_key("v1"), "not json");
        assert_eq!(store.domain_hits("v1", "e1", "example.com"), 0);
        store.increment("v1", "e1", "example.com");
        assert_eq!(store.domain_hits("v1", "e1", "example.com"), 1);
    }
}
