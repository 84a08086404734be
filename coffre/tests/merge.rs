// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reconciling replicas that diverged while offline.

use std::sync::Arc;

use rstest::{fixture, rstest};
use tokio_util::sync::CancellationToken;

use coffre::core::Opcode;
use coffre::crypto::set_derivation_rounds;
use coffre::source::VaultSource;
use coffre::store::{DatasourceBackend, MemoryBackend};

struct Devices {
    local: VaultSource<MemoryBackend>,
    local_backend: Arc<MemoryBackend>,
    remote: VaultSource<MemoryBackend>,
    remote_backend: Arc<MemoryBackend>,
    cancel: CancellationToken,
}

/// Two devices that both start from the same saved vault containing one
/// entry `E1` inside group `G1`.
#[fixture]
async fn devices() -> Devices {
    set_derivation_rounds(10);
    let cancel = CancellationToken::new();

    let local_backend = Arc::new(MemoryBackend::new());
    let mut local = VaultSource::new(local_backend.clone(), "vault.cfr", "merge-local");
    local.initialise("pw").unwrap();
    {
        let engine = local.engine_mut();
        engine.create_group("0", "G1").unwrap();
        engine.create_entry("G1", "E1").unwrap();
        engine.set_entry_property("E1", "username", "alice").unwrap();
    }
    local.save(&cancel).await.unwrap();

    // Second device: same bytes, separate datasource.
    let bytes = local_backend
        .get_file_contents("vault.cfr", &cancel)
        .await
        .unwrap();
    let remote_backend = Arc::new(MemoryBackend::new());
    remote_backend
        .put_file_contents("vault.cfr", &bytes, &cancel)
        .await
        .unwrap();
    let mut remote = VaultSource::new(remote_backend.clone(), "vault.cfr", "merge-remote");
    remote.unlock("pw", &cancel).await.unwrap();

    Devices {
        local,
        local_backend,
        remote,
        remote_backend,
        cancel,
    }
}

/// Simulate sync: the remote's saved file lands in the local datasource.
async fn push_remote_file(devices: &Devices) {
    let bytes = devices
        .remote_backend
        .get_file_contents("vault.cfr", &devices.cancel)
        .await
        .unwrap();
    devices
        .local_backend
        .put_file_contents("vault.cfr", &bytes, &devices.cancel)
        .await
        .unwrap();
}

#[rstest]
#[tokio::test]
async fn concurrent_delete_loses_against_edit(#[future] devices: Devices) {
    let mut devices = devices.await;

    // Local edits the password; the other device deletes the entry.
    devices
        .local
        .engine_mut()
        .set_entry_property("E1", "password", "x")
        .unwrap();
    devices.remote.engine_mut().delete_entry("E1").unwrap();
    devices.remote.save(&devices.cancel).await.unwrap();

    push_remote_file(&devices).await;
    devices
        .local
        .merge_from_remote(&devices.cancel)
        .await
        .unwrap();

    let vault = devices.local.engine().vault();
    let entry = vault.find_entry("E1").expect("concurrent delete is dropped");
    assert_eq!(entry.properties.get("password").map(String::as_str), Some("x"));
}

#[rstest]
#[tokio::test]
async fn disjoint_edits_both_survive(#[future] devices: Devices) {
    let mut devices = devices.await;

    devices.local.engine_mut().create_entry("G1", "E2").unwrap();
    {
        let engine = devices.remote.engine_mut();
        engine.create_group("0", "G2").unwrap();
        engine.set_group_title("G2", "From Remote").unwrap();
    }
    devices.remote.save(&devices.cancel).await.unwrap();

    push_remote_file(&devices).await;
    devices
        .local
        .merge_from_remote(&devices.cancel)
        .await
        .unwrap();

    let vault = devices.local.engine().vault();
    assert!(vault.entry_exists("E2"));
    assert_eq!(
        vault.find_group("G2").map(|g| g.title.as_str()),
        Some("From Remote")
    );
}

#[rstest]
#[tokio::test]
async fn merged_vault_saves_and_reloads(#[future] devices: Devices) {
    let mut devices = devices.await;

    devices
        .local
        .engine_mut()
        .set_entry_property("E1", "password", "local-pass")
        .unwrap();
    devices
        .remote
        .engine_mut()
        .set_entry_property("E1", "url", "https://example.com")
        .unwrap();
    devices.remote.save(&devices.cancel).await.unwrap();

    push_remote_file(&devices).await;
    devices
        .local
        .merge_from_remote(&devices.cancel)
        .await
        .unwrap();
    devices.local.save(&devices.cancel).await.unwrap();

    let mut reopened = VaultSource::new(
        devices.local_backend.clone(),
        "vault.cfr",
        "merge-reopen",
    );
    reopened.unlock("pw", &devices.cancel).await.unwrap();

    let entry = reopened.engine().vault().find_entry("E1").unwrap();
    assert_eq!(
        entry.properties.get("password").map(String::as_str),
        Some("local-pass")
    );
    assert_eq!(
        entry.properties.get("url").map(String::as_str),
        Some("https://example.com")
    );
}

#[rstest]
#[tokio::test]
async fn remote_edit_on_locally_deleted_entry_becomes_comment(#[future] devices: Devices) {
    let mut devices = devices.await;

    devices.local.engine_mut().delete_entry("E1").unwrap();
    devices
        .remote
        .engine_mut()
        .set_entry_property("E1", "password", "too-late")
        .unwrap();
    devices.remote.save(&devices.cancel).await.unwrap();

    push_remote_file(&devices).await;
    devices
        .local
        .merge_from_remote(&devices.cancel)
        .await
        .unwrap();

    let vault = devices.local.engine().vault();
    assert!(!vault.entry_exists("E1"));
    assert!(devices
        .local
        .engine()
        .history()
        .iter()
        .any(|c| c.opcode == Opcode::Cmm));
}
