// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory datasource backend.
//!
//! Backs tests and fully-local embedding. Files and attachment blobs live
//! in plain maps; the available-storage figure is whatever the caller
//! configures, `None` meaning unlimited.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::traits::{DatasourceBackend, StoreError};

#[derive(Debug, Default)]
pub struct MemoryBackend {
    files: Mutex<HashMap<String, Vec<u8>>>,
    attachments: Mutex<HashMap<(String, String), (Vec<u8>, String)>>,
    available_storage: Mutex<Option<u64>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the figure reported by `get_available_storage`.
    pub fn set_available_storage(&self, bytes: Option<u64>) {
        *self
            .available_storage
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = bytes;
    }

    pub fn file_exists(&self, path: &str) -> bool {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(path)
    }

    pub fn attachment_count(&self) -> usize {
        self.attachments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), StoreError> {
    if cancel.is_cancelled() {
        Err(StoreError::Cancelled)
    } else {
        Ok(())
    }
}

#[async_trait]
impl DatasourceBackend for MemoryBackend {
    async fn get_file_contents(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, StoreError> {
        check_cancelled(cancel)?;
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    async fn put_file_contents(
        &self,
        path: &str,
        bytes: &[u8],
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        check_cancelled(cancel)?;
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn get_available_storage(&self) -> Result<Option<u64>, StoreError> {
        Ok(*self
            .available_storage
            .lock()
            .unwrap_or_else(PoisonError::into_inner))
    }

    async fn get_attachment(
        &self,
        vault_id: &str,
        attachment_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, StoreError> {
        check_cancelled(cancel)?;
        self.attachments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(vault_id.to_string(), attachment_id.to_string()))
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| StoreError::NotFound(attachment_id.to_string()))
    }

    async fn put_attachment(
        &self,
        vault_id: &str,
        attachment_id: &str,
        bytes: &[u8],
        details_json: &str,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        check_cancelled(cancel)?;
        self.attachments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                (vault_id.to_string(), attachment_id.to_string()),
                (bytes.to_vec(), details_json.to_string()),
            );
        Ok(())
    }

    async fn remove_attachment(
        &self,
        vault_id: &str,
        attachment_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        check_cancelled(cancel)?;
        self.attachments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(vault_id.to_string(), attachment_id.to_string()))
            .map(drop)
            .ok_or_else(|| StoreError::NotFound(attachment_id.to_string()))
    }

    fn supports_attachments(&self) -> bool {
        true
    }
}
