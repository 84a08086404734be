// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end load/save round-trips through the full pipeline:
//! envelope → encryption → compression → command log → replay.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use coffre::core::{EngineState, VaultEvent};
use coffre::crypto::{detect, set_derivation_rounds, FormatKind};
use coffre::source::{SourceError, SourceStatus, VaultSource};
use coffre::store::{DatasourceBackend, MemoryBackend};

fn new_source(backend: &Arc<MemoryBackend>, id: &str) -> VaultSource<MemoryBackend> {
    set_derivation_rounds(10);
    VaultSource::new(backend.clone(), "vault.cfr", id)
}

#[tokio::test]
async fn empty_vault_roundtrip() {
    let backend = Arc::new(MemoryBackend::new());
    let cancel = CancellationToken::new();

    let mut source = new_source(&backend, "rt-empty");
    source.initialise("pw").unwrap();
    source.save(&cancel).await.unwrap();
    source.lock();

    let mut reopened = new_source(&backend, "rt-empty");
    reopened.unlock("pw", &cancel).await.unwrap();
    assert_eq!(reopened.status(), SourceStatus::Unlocked);

    // A fresh history is exactly `fmt` then `aid`, no padding.
    let text = reopened.engine().history().to_text();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("fmt "));
    assert!(lines[1].starts_with("aid "));
}

#[tokio::test]
async fn create_and_read_back() {
    let backend = Arc::new(MemoryBackend::new());
    let cancel = CancellationToken::new();

    let mut source = new_source(&backend, "rt-create");
    source.initialise("pw").unwrap();
    {
        let engine = source.engine_mut();
        engine.create_group("0", "G1").unwrap();
        engine.set_group_title("G1", "Home").unwrap();
        engine.create_entry("G1", "E1").unwrap();
        engine.set_entry_property("E1", "username", "alice").unwrap();
    }
    source.save(&cancel).await.unwrap();

    let mut reopened = new_source(&backend, "rt-create");
    reopened.unlock("pw", &cancel).await.unwrap();

    let vault = reopened.engine().vault();
    assert_eq!(vault.groups.len(), 1);
    assert_eq!(vault.groups[0].title, "Home");
    assert_eq!(vault.groups[0].entries.len(), 1);
    assert_eq!(
        vault
            .find_entry("E1")
            .and_then(|e| e.properties.get("username"))
            .map(String::as_str),
        Some("alice")
    );
}

#[tokio::test]
async fn replayed_tree_equals_saved_tree() {
    let backend = Arc::new(MemoryBackend::new());
    let cancel = CancellationToken::new();

    let mut source = new_source(&backend, "rt-equal");
    source.initialise("pw").unwrap();
    {
        let engine = source.engine_mut();
        engine.create_group("0", "g1").unwrap();
        engine.set_group_title("g1", "With spaces & symbols!").unwrap();
        engine.create_entry("g1", "e1").unwrap();
        engine
            .set_entry_property("e1", "password", "p@ss \"quoted\"")
            .unwrap();
        engine.set_entry_attribute("e1", "meta", "").unwrap();
        engine.set_vault_attribute("colour", "dark blue").unwrap();
    }
    source.save(&cancel).await.unwrap();

    let mut reopened = new_source(&backend, "rt-equal");
    reopened.unlock("pw", &cancel).await.unwrap();
    assert_eq!(reopened.engine().vault(), source.engine().vault());
}

#[tokio::test]
async fn saved_bytes_carry_the_envelope() {
    let backend = Arc::new(MemoryBackend::new());
    let cancel = CancellationToken::new();

    let mut source = new_source(&backend, "rt-envelope");
    source.initialise("pw").unwrap();
    source.save(&cancel).await.unwrap();

    let bytes = backend
        .get_file_contents("vault.cfr", &cancel)
        .await
        .unwrap();
    assert_eq!(detect(&bytes), FormatKind::A);
    // The command log must not be readable from the envelope body.
    let body = String::from_utf8_lossy(&bytes);
    assert!(!body.contains("fmt "));
    assert!(!body.contains("aid "));
}

#[tokio::test]
async fn wrong_password_is_auth_failure() {
    let backend = Arc::new(MemoryBackend::new());
    let cancel = CancellationToken::new();

    let mut source = new_source(&backend, "rt-wrongpw");
    source.initialise("correct horse").unwrap();
    source.save(&cancel).await.unwrap();
    source.lock();

    let mut reopened = new_source(&backend, "rt-wrongpw");
    let err = reopened.unlock("battery staple", &cancel).await.unwrap_err();
    assert!(matches!(err, SourceError::Crypto(_)));
    assert_eq!(reopened.status(), SourceStatus::Locked);

    // A failed unlock must not leave credentials behind: saving is
    // impossible until unlock succeeds.
    assert!(matches!(
        reopened.save(&cancel).await.unwrap_err(),
        SourceError::Locked
    ));
}

#[tokio::test]
async fn updated_fires_after_save() {
    use std::sync::atomic::{AtomicUsize, Ordering};

    let backend = Arc::new(MemoryBackend::new());
    let cancel = CancellationToken::new();

    let mut source = new_source(&backend, "rt-updated");
    source.initialise("pw").unwrap();

    let updates = Arc::new(AtomicUsize::new(0));
    let seen = updates.clone();
    source.subscribe(Arc::new(move |event: &VaultEvent| {
        if matches!(event, VaultEvent::Updated) {
            seen.fetch_add(1, Ordering::SeqCst);
        }
    }));

    assert_eq!(updates.load(Ordering::SeqCst), 0);
    source.save(&cancel).await.unwrap();
    assert_eq!(updates.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn lock_seals_the_engine() {
    let backend = Arc::new(MemoryBackend::new());
    let cancel = CancellationToken::new();

    let mut source = new_source(&backend, "rt-lock");
    source.initialise("pw").unwrap();
    source.save(&cancel).await.unwrap();
    source.lock();

    assert_eq!(source.engine().state(), EngineState::Sealed);
    assert!(source.engine_mut().create_group("0", "g1").is_err());
}

#[tokio::test]
async fn read_only_freezes_mutators() {
    let backend = Arc::new(MemoryBackend::new());

    let mut source = new_source(&backend, "rt-ro");
    source.initialise("pw").unwrap();
    source.set_read_only(true);
    assert!(source.is_read_only());
    assert!(source.engine_mut().create_group("0", "g1").is_err());

    source.set_read_only(false);
    source.engine_mut().create_group("0", "g1").unwrap();
}

#[tokio::test]
async fn cancelled_load_surfaces() {
    let backend = Arc::new(MemoryBackend::new());
    let cancel = CancellationToken::new();

    let mut source = new_source(&backend, "rt-cancel");
    source.initialise("pw").unwrap();
    source.save(&cancel).await.unwrap();

    let cancelled = CancellationToken::new();
    cancelled.cancel();
    let err = source.load(&cancelled).await.unwrap_err();
    assert!(matches!(err, SourceError::Store(_)));
}
