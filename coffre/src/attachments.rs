// SPDX-License-Identifier: MIT OR Apache-2.0

//! Encrypted binary blobs referenced by vault entries.
//!
//! Attachment blobs never enter the history. They are encrypted under a
//! dedicated per-vault key (a random string stored as the vault attribute
//! `bc_attachments_key`) and written out-of-band by the datasource, keyed
//! by `(vault id, attachment id)`. The entry side only carries a JSON
//! detail record in a `BC_ATTACHMENT:<id>` attribute.
//!
//! Ordering matters twice here: the attachment key is persisted through a
//! normal vault save before the first blob is written, and the detail
//! attribute is only set after the blob write succeeded, so a failed write
//! can never leave an attribute pointing at nothing.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use coffre_core::{EngineError, EngineState};
use coffre_crypto::CryptoError;
use coffre_store::{DatasourceBackend, StoreError};

use crate::source::{SourceError, VaultSource};

/// Vault attribute holding the attachment key.
pub const ATTACHMENT_KEY_ATTRIBUTE: &str = "bc_attachments_key";

/// Entry attribute prefix for attachment detail records.
pub const ATTACHMENT_ATTRIBUTE_PREFIX: &str = "BC_ATTACHMENT:";

/// Length of the generated attachment key.
pub const ATTACHMENT_KEY_LENGTH: usize = 48;

/// Hard cap for a single blob: 200 MiB.
pub const MAX_ATTACHMENT_SIZE: u64 = 200 * 1024 * 1024;

/// Detail record stored in the entry attribute, JSON-encoded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentDetails {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub mime: String,
    #[serde(rename = "sizeOriginal")]
    pub size_original: u64,
    #[serde(rename = "sizeEncrypted")]
    pub size_encrypted: u64,
    /// Milliseconds since the Unix epoch.
    pub created: u64,
    pub updated: u64,
}

#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("unknown entry {0:?}")]
    UnknownEntry(String),

    #[error("attachment {0:?} not found")]
    NotFound(String),

    #[error("attachment needs {needed} bytes but only {available} are available")]
    OutOfSpace { needed: u64, available: u64 },

    #[error("attachment of {0} bytes exceeds the single-blob limit")]
    TooLarge(u64),

    #[error("datasource does not support attachments")]
    Unsupported,

    #[error("vault has no attachment key")]
    MissingKey,

    #[error("malformed attachment details: {0}")]
    Details(#[from] serde_json::Error),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Attachment operations over one vault source.
///
/// Obtained through [`VaultSource::attachments`]; borrows the source
/// mutably because puts and removes run the normal save path.
pub struct AttachmentManager<'a, B: DatasourceBackend> {
    source: &'a mut VaultSource<B>,
}

impl<B: DatasourceBackend> VaultSource<B> {
    pub fn attachments(&mut self) -> AttachmentManager<'_, B> {
        AttachmentManager { source: self }
    }
}

impl<B: DatasourceBackend> AttachmentManager<'_, B> {
    /// Generate a fresh attachment id.
    pub fn generate_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Detail records of every attachment on the entry, sorted by name.
    pub fn list(&self, entry_id: &str) -> Result<Vec<AttachmentDetails>, AttachmentError> {
        let entry = self
            .source
            .engine()
            .vault()
            .find_entry(entry_id)
            .ok_or_else(|| AttachmentError::UnknownEntry(entry_id.to_string()))?;

        let mut details = Vec::new();
        for (key, value) in &entry.attributes {
            if key.starts_with(ATTACHMENT_ATTRIBUTE_PREFIX) {
                details.push(serde_json::from_str::<AttachmentDetails>(value)?);
            }
        }
        details.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(details)
    }

    /// Detail record of one attachment.
    pub fn get_details(
        &self,
        entry_id: &str,
        attachment_id: &str,
    ) -> Result<AttachmentDetails, AttachmentError> {
        let entry = self
            .source
            .engine()
            .vault()
            .find_entry(entry_id)
            .ok_or_else(|| AttachmentError::UnknownEntry(entry_id.to_string()))?;
        let raw = entry
            .attributes
            .get(&attribute_key(attachment_id))
            .ok_or_else(|| AttachmentError::NotFound(attachment_id.to_string()))?;
        Ok(serde_json::from_str(raw)?)
    }

    /// Fetch and decrypt an attachment buffer.
    pub async fn get(
        &self,
        entry_id: &str,
        attachment_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, AttachmentError> {
        // The detail record is authoritative; without it the attachment
        // does not exist no matter what the datasource holds.
        self.get_details(entry_id, attachment_id)?;

        let key = self.attachment_key().ok_or(AttachmentError::MissingKey)?;
        let vault_id = self.source.vault_id()?;
        let encrypted = self
            .source
            .backend()
            .get_attachment(&vault_id, attachment_id, cancel)
            .await
            .map_err(|err| match err {
                StoreError::NotFound(_) => {
                    AttachmentError::NotFound(attachment_id.to_string())
                }
                other => AttachmentError::Store(other),
            })?;

        let cryptor = coffre_crypto::app_env().cryptor();
        Ok(cryptor.decrypt_buffer(&encrypted, &key).await?)
    }

    /// Encrypt and store a buffer, then record it on the entry.
    ///
    /// Writing an existing id replaces the blob and updates the record.
    pub async fn put(
        &mut self,
        entry_id: &str,
        attachment_id: &str,
        name: &str,
        mime: &str,
        data: &[u8],
        cancel: &CancellationToken,
    ) -> Result<AttachmentDetails, AttachmentError> {
        if !self.source.backend().supports_attachments() {
            return Err(AttachmentError::Unsupported);
        }
        // Fail before any blob write; a late engine error would orphan the
        // blob in the datasource.
        match self.source.engine().state() {
            EngineState::ReadOnly => {
                return Err(SourceError::from(EngineError::ReadOnly).into());
            }
            EngineState::Sealed => {
                return Err(SourceError::from(EngineError::Sealed).into());
            }
            EngineState::Empty => {
                return Err(SourceError::from(EngineError::NotInitialised).into());
            }
            EngineState::Initialised | EngineState::Mutable => {}
        }
        if self
            .source
            .engine()
            .vault()
            .find_entry(entry_id)
            .is_none()
        {
            return Err(AttachmentError::UnknownEntry(entry_id.to_string()));
        }
        let size_original = data.len() as u64;
        if size_original > MAX_ATTACHMENT_SIZE {
            return Err(AttachmentError::TooLarge(size_original));
        }

        let vault_id = self.source.vault_id()?;
        let key = self.ensure_attachment_key(cancel).await?;

        let cryptor = coffre_crypto::app_env().cryptor();
        let encrypted = cryptor.encrypt_buffer(data, &key).await?;
        let size_encrypted = encrypted.len() as u64;

        // Net growth against the datasource quota; replacing a blob only
        // counts the difference.
        let existing = self.get_details(entry_id, attachment_id).ok();
        if let Some(available) = self.source.backend().get_available_storage().await? {
            let replaced = existing.as_ref().map_or(0, |d| d.size_encrypted);
            let needed = size_encrypted.saturating_sub(replaced);
            if needed > available {
                return Err(AttachmentError::OutOfSpace { needed, available });
            }
        }

        let now = now_ms();
        let details = AttachmentDetails {
            id: attachment_id.to_string(),
            name: name.to_string(),
            mime: mime.to_string(),
            size_original,
            size_encrypted,
            created: existing.map_or(now, |d| d.created),
            updated: now,
        };
        let details_json = serde_json::to_string(&details)?;

        self.source
            .backend()
            .put_attachment(&vault_id, attachment_id, &encrypted, &details_json, cancel)
            .await?;

        self.source
            .engine_mut()
            .set_entry_attribute(entry_id, &attribute_key(attachment_id), &details_json)
            .map_err(SourceError::from)?;
        self.source.save(cancel).await?;

        debug!(attachment_id, size_encrypted, "attachment stored");
        Ok(details)
    }

    /// Delete the blob and unlink its record from the entry.
    pub async fn remove(
        &mut self,
        entry_id: &str,
        attachment_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(), AttachmentError> {
        self.get_details(entry_id, attachment_id)?;
        let vault_id = self.source.vault_id()?;

        // A blob that is already gone must not block unlinking the record.
        match self
            .source
            .backend()
            .remove_attachment(&vault_id, attachment_id, cancel)
            .await
        {
            Ok(()) | Err(StoreError::NotFound(_)) => {}
            Err(other) => return Err(other.into()),
        }

        self.source
            .engine_mut()
            .delete_entry_attribute(entry_id, &attribute_key(attachment_id))
            .map_err(SourceError::from)?;
        self.source.save(cancel).await?;

        debug!(attachment_id, "attachment removed");
        Ok(())
    }

    fn attachment_key(&self) -> Option<String> {
        self.source
            .engine()
            .vault()
            .attributes
            .get(ATTACHMENT_KEY_ATTRIBUTE)
            .cloned()
    }

    /// The key is created lazily on first use and saved through the normal
    /// vault save path before any blob is written under it.
    async fn ensure_attachment_key(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<String, AttachmentError> {
        if let Some(key) = self.attachment_key() {
            return Ok(key);
        }
        let cryptor = coffre_crypto::app_env().cryptor();
        let key = cryptor.random_string(ATTACHMENT_KEY_LENGTH).await?;
        self.source
            .engine_mut()
            .set_vault_attribute(ATTACHMENT_KEY_ATTRIBUTE, &key)
            .map_err(SourceError::from)?;
        self.source.save(cancel).await?;
        debug!("attachment key created");
        Ok(key)
    }
}

fn attribute_key(attachment_id: &str) -> String {
    format!("{ATTACHMENT_ATTRIBUTE_PREFIX}{attachment_id}")
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
