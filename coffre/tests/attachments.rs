// SPDX-License-Identifier: MIT OR Apache-2.0

//! Attachment subsystem: key management, quota and bookkeeping.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use coffre::crypto::set_derivation_rounds;
use coffre::source::VaultSource;
use coffre::store::{DatasourceBackend, MemoryBackend, StoreError};
use coffre::{AttachmentError, ATTACHMENT_ATTRIBUTE_PREFIX, ATTACHMENT_KEY_ATTRIBUTE};

async fn unlocked_source(
    backend: &Arc<MemoryBackend>,
    credentials_id: &str,
) -> (VaultSource<MemoryBackend>, CancellationToken) {
    set_derivation_rounds(10);
    let cancel = CancellationToken::new();
    let mut source = VaultSource::new(backend.clone(), "vault.cfr", credentials_id);
    source.initialise("pw").unwrap();
    source.engine_mut().create_group("0", "G1").unwrap();
    source.engine_mut().create_entry("G1", "E1").unwrap();
    source.save(&cancel).await.unwrap();
    (source, cancel)
}

#[tokio::test]
async fn put_get_roundtrip() {
    let backend = Arc::new(MemoryBackend::new());
    let (mut source, cancel) = unlocked_source(&backend, "att-roundtrip").await;

    let data = b"%PDF-1.4 pretend this is a scan".to_vec();
    let details = source
        .attachments()
        .put("E1", "a1", "scan.pdf", "application/pdf", &data, &cancel)
        .await
        .unwrap();

    assert_eq!(details.id, "a1");
    assert_eq!(details.size_original, data.len() as u64);
    assert!(details.size_encrypted > details.size_original);
    assert_eq!(details.created, details.updated);

    let read_back = source.attachments().get("E1", "a1", &cancel).await.unwrap();
    assert_eq!(read_back, data);

    // The blob at rest is ciphertext, not the original bytes.
    let at_rest = backend.get_attachment("v-ignored", "a1", &cancel).await;
    assert!(at_rest.is_err() || at_rest.unwrap() != data);
}

#[tokio::test]
async fn key_created_once_and_persisted_first() {
    let backend = Arc::new(MemoryBackend::new());
    let (mut source, cancel) = unlocked_source(&backend, "att-key").await;

    assert!(source
        .engine()
        .vault()
        .attributes
        .get(ATTACHMENT_KEY_ATTRIBUTE)
        .is_none());

    source
        .attachments()
        .put("E1", "a1", "one.bin", "application/octet-stream", b"one", &cancel)
        .await
        .unwrap();

    let key = source
        .engine()
        .vault()
        .attributes
        .get(ATTACHMENT_KEY_ATTRIBUTE)
        .cloned()
        .expect("key created on first attachment");
    assert_eq!(key.len(), 48);
    assert!(key.bytes().all(|b| b.is_ascii_alphanumeric()));

    source
        .attachments()
        .put("E1", "a2", "two.bin", "application/octet-stream", b"two", &cancel)
        .await
        .unwrap();
    let key_again = source
        .engine()
        .vault()
        .attributes
        .get(ATTACHMENT_KEY_ATTRIBUTE)
        .cloned()
        .unwrap();
    assert_eq!(key, key_again, "the key is immutable once created");
}

#[tokio::test]
async fn quota_rejects_before_bookkeeping() {
    let backend = Arc::new(MemoryBackend::new());
    let (mut source, cancel) = unlocked_source(&backend, "att-quota").await;
    backend.set_available_storage(Some(100));

    // 89 plaintext bytes encrypt to exactly 150: 45 bytes of header plus a
    // 16-byte authentication tag.
    let data = vec![0u8; 89];
    let err = source
        .attachments()
        .put("E1", "a1", "big.bin", "application/octet-stream", &data, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AttachmentError::OutOfSpace {
            needed: 150,
            available: 100,
        }
    ));

    // No detail record was written and no blob landed in the datasource.
    let entry = source.engine().vault().find_entry("E1").unwrap();
    assert!(!entry
        .attributes
        .keys()
        .any(|k| k.starts_with(ATTACHMENT_ATTRIBUTE_PREFIX)));
    assert_eq!(backend.attachment_count(), 0);

    // The attachment key however was created and saved before the blob
    // write was even attempted.
    assert!(source
        .engine()
        .vault()
        .attributes
        .contains_key(ATTACHMENT_KEY_ATTRIBUTE));
}

#[tokio::test]
async fn replacing_counts_only_the_growth() {
    let backend = Arc::new(MemoryBackend::new());
    let (mut source, cancel) = unlocked_source(&backend, "att-replace").await;

    source
        .attachments()
        .put("E1", "a1", "note.txt", "text/plain", &vec![1u8; 80], &cancel)
        .await
        .unwrap();

    // 90 bytes replace 80: with the old blob reclaimed the net growth is
    // 10 bytes, which fits a 64-byte budget.
    backend.set_available_storage(Some(64));
    let details = source
        .attachments()
        .put("E1", "a1", "note.txt", "text/plain", &vec![2u8; 90], &cancel)
        .await
        .unwrap();
    assert_eq!(details.size_original, 90);

    let read_back = source.attachments().get("E1", "a1", &cancel).await.unwrap();
    assert_eq!(read_back, vec![2u8; 90]);
}

#[tokio::test]
async fn list_and_remove() {
    let backend = Arc::new(MemoryBackend::new());
    let (mut source, cancel) = unlocked_source(&backend, "att-list").await;

    source
        .attachments()
        .put("E1", "a1", "beta.txt", "text/plain", b"b", &cancel)
        .await
        .unwrap();
    source
        .attachments()
        .put("E1", "a2", "alpha.txt", "text/plain", b"a", &cancel)
        .await
        .unwrap();

    let listed = source.attachments().list("E1").unwrap();
    assert_eq!(listed.len(), 2);
    // Sorted by name.
    assert_eq!(listed[0].name, "alpha.txt");
    assert_eq!(listed[1].name, "beta.txt");

    source
        .attachments()
        .remove("E1", "a1", &cancel)
        .await
        .unwrap();
    assert_eq!(source.attachments().list("E1").unwrap().len(), 1);
    assert_eq!(backend.attachment_count(), 1);

    assert!(matches!(
        source.attachments().get("E1", "a1", &cancel).await,
        Err(AttachmentError::NotFound(_))
    ));
}

#[tokio::test]
async fn missing_records_and_entries() {
    let backend = Arc::new(MemoryBackend::new());
    let (mut source, cancel) = unlocked_source(&backend, "att-missing").await;

    assert!(matches!(
        source.attachments().get("E1", "ghost", &cancel).await,
        Err(AttachmentError::NotFound(_))
    ));
    assert!(matches!(
        source.attachments().get_details("E1", "ghost"),
        Err(AttachmentError::NotFound(_))
    ));
    assert!(matches!(
        source.attachments().list("nope"),
        Err(AttachmentError::UnknownEntry(_))
    ));
    assert!(matches!(
        source
            .attachments()
            .put("nope", "a1", "x", "text/plain", b"x", &cancel)
            .await,
        Err(AttachmentError::UnknownEntry(_))
    ));
}

#[tokio::test]
async fn attachments_survive_reload() {
    let backend = Arc::new(MemoryBackend::new());
    let (mut source, cancel) = unlocked_source(&backend, "att-reload").await;

    source
        .attachments()
        .put("E1", "a1", "keepme.txt", "text/plain", b"payload", &cancel)
        .await
        .unwrap();
    source.lock();

    let mut reopened = VaultSource::new(backend.clone(), "vault.cfr", "att-reload");
    reopened.unlock("pw", &cancel).await.unwrap();

    let read_back = reopened
        .attachments()
        .get("E1", "a1", &cancel)
        .await
        .unwrap();
    assert_eq!(read_back, b"payload");
}

/// A backend that refuses attachments outright.
struct NoAttachments(MemoryBackend);

#[async_trait]
impl DatasourceBackend for NoAttachments {
    async fn get_file_contents(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, StoreError> {
        self.0.get_file_contents(path, cancel).await
    }

    async fn put_file_contents(
        &self,
        path: &str,
        bytes: &[u8],
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        self.0.put_file_contents(path, bytes, cancel).await
    }

    async fn get_available_storage(&self) -> Result<Option<u64>, StoreError> {
        self.0.get_available_storage().await
    }

    async fn get_attachment(
        &self,
        vault_id: &str,
        attachment_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, StoreError> {
        self.0.get_attachment(vault_id, attachment_id, cancel).await
    }

    async fn put_attachment(
        &self,
        vault_id: &str,
        attachment_id: &str,
        bytes: &[u8],
        details_json: &str,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        self.0
            .put_attachment(vault_id, attachment_id, bytes, details_json, cancel)
            .await
    }

    async fn remove_attachment(
        &self,
        vault_id: &str,
        attachment_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        self.0.remove_attachment(vault_id, attachment_id, cancel).await
    }

    fn supports_attachments(&self) -> bool {
        false
    }
}

#[tokio::test]
async fn unsupported_backend_is_rejected() {
    set_derivation_rounds(10);
    let backend = Arc::new(NoAttachments(MemoryBackend::new()));
    let cancel = CancellationToken::new();

    let mut source = VaultSource::new(backend, "vault.cfr", "att-unsupported");
    source.initialise("pw").unwrap();
    source.engine_mut().create_group("0", "G1").unwrap();
    source.engine_mut().create_entry("G1", "E1").unwrap();

    assert!(matches!(
        source
            .attachments()
            .put("E1", "a1", "x", "text/plain", b"x", &cancel)
            .await,
        Err(AttachmentError::Unsupported)
    ));
}
